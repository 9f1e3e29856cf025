//! Component compilation
//!
//! Compiles one component section of one virtual server. Named
//! sub-policies (`Auth-Type PAP { ... }`) are validated against the
//! dictionary and compiled first, so they exist by the time the enclosing
//! section is compiled and may refer to them.

use crate::error::{VirtualServerError, VirtualServerResult};
use crate::interpreter::{CompiledSection, Interpreter};
use crate::server::{CompiledComponent, VirtualServer};
use crate::types::TypeRegistrar;
use radius_policy::Component;
use std::collections::HashMap;
use tracing::debug;

pub struct ComponentCompiler<'a> {
    registrar: &'a TypeRegistrar,
    interpreter: &'a dyn Interpreter,
}

impl<'a> ComponentCompiler<'a> {
    pub fn new(registrar: &'a TypeRegistrar, interpreter: &'a dyn Interpreter) -> Self {
        ComponentCompiler { registrar, interpreter }
    }

    /// Compile `component` for `server` and cache the result on the server
    ///
    /// Returns `Ok(false)` when the server has no section for the component,
    /// or the section has no items; nothing is cached in that case.
    /// Compiling the same component twice is an error.
    pub fn compile(
        &self,
        server: &mut VirtualServer,
        component: Component,
    ) -> VirtualServerResult<bool> {
        if server.compiled.contains_key(&component) {
            return Err(VirtualServerError::Lifecycle(format!(
                "Section {} of virtual server \"{}\" is already compiled",
                component,
                server.name()
            )));
        }

        let Some(cs) = server.section().find_section(component.section()) else {
            return Ok(false);
        };
        if cs.is_empty() {
            debug!(server = %server.name(), component = %component, "Skipping empty section");
            return Ok(false);
        }

        let mut subsections = HashMap::new();
        if let Some(ta) = component.type_attribute() {
            let da = self.registrar.attribute(ta, &cs.location)?;

            for subcs in cs.sections_named(ta.name) {
                let Some(name) = subcs.name2.as_deref() else {
                    return Err(VirtualServerError::schema(
                        &subcs.location,
                        format!("Invalid '{} {{ ... }}' section, it must have a name", ta.name),
                    ));
                };

                if self.registrar.resolve(&da, name).is_none() {
                    return Err(VirtualServerError::dictionary(
                        &subcs.location,
                        format!("The {} attribute has no VALUE defined for {}", ta.name, name),
                    ));
                }

                if subsections.contains_key(name) {
                    return Err(VirtualServerError::schema(
                        &subcs.location,
                        format!("Duplicate configuration section {} {}", ta.name, name),
                    ));
                }

                debug!(
                    server = %server.name(),
                    section = %subcs.display_name(),
                    "Compiling subsection"
                );
                let compiled = self.compile_section(server.name(), subcs, component)?;
                subsections.insert(name.to_string(), compiled);
            }
        }

        let section = self.compile_section(server.name(), cs, component)?;
        server
            .compiled
            .insert(component, CompiledComponent { section, subsections });
        Ok(true)
    }

    fn compile_section(
        &self,
        server: &str,
        cs: &radius_policy::ConfigSection,
        component: Component,
    ) -> VirtualServerResult<CompiledSection> {
        self.interpreter
            .compile(cs, component)
            .map_err(|source| VirtualServerError::Compile {
                server: server.to_string(),
                section: cs.display_name(),
                source,
            })
    }
}
