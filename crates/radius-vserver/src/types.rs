//! Dynamic subtype registration
//!
//! Named sub-policies such as `Auth-Type PAP { ... }` are dispatched on a
//! numeric value of the component's type attribute. Those values are not
//! known when the configuration is written, so they are minted here and
//! added to the dictionary as enumeration values.
//!
//! Values are drawn at random from `1..=0x0100_0000` and retried until one
//! is unused for the attribute. They never leave the process.

use crate::error::{VirtualServerError, VirtualServerResult};
use parking_lot::Mutex;
use radius_policy::{
    ConfigSection, DictAttr, Dictionary, DictionaryError, Location, TypeAttribute,
};
use rand::Rng;
use std::sync::Arc;
use tracing::debug;

/// Mask applied to random candidates before adding one
const TYPE_VALUE_MASK: u32 = 0x00ff_ffff;

/// Mints and resolves dynamic subtype values
pub struct TypeRegistrar {
    dict: Arc<dyn Dictionary>,
    /// Serialises the check-then-insert in `define`
    define_lock: Mutex<()>,
}

impl TypeRegistrar {
    pub fn new(dict: Arc<dyn Dictionary>) -> Self {
        TypeRegistrar {
            dict,
            define_lock: Mutex::new(()),
        }
    }

    pub fn dictionary(&self) -> &Arc<dyn Dictionary> {
        &self.dict
    }

    /// Find the dictionary attribute for a component type attribute
    pub fn attribute(
        &self,
        ta: TypeAttribute,
        location: &Location,
    ) -> VirtualServerResult<DictAttr> {
        self.dict.attr_by_num(ta.number).ok_or_else(|| {
            VirtualServerError::dictionary(location, format!("No such attribute {}", ta.name))
        })
    }

    /// Make sure `name` has a value under `attr`, and return it
    ///
    /// An existing value is kept as-is, unless it is the reserved value 0.
    pub fn define(&self, attr: &DictAttr, name: &str) -> VirtualServerResult<u32> {
        let _guard = self.define_lock.lock();

        if let Some(existing) = self.dict.enum_by_alias(attr, name) {
            if existing.value == 0 {
                return Err(VirtualServerError::dictionary(
                    &Location::default(),
                    format!("The dictionaries must not define VALUE {} {} 0", attr.name, name),
                ));
            }
            return Ok(existing.value);
        }

        let mut rng = rand::rng();
        loop {
            let candidate = (rng.random::<u32>() & TYPE_VALUE_MASK) + 1;
            if self.dict.enum_by_value(attr, candidate).is_some() {
                continue;
            }

            match self.dict.add_enum_alias(attr, name, candidate) {
                Ok(()) => {
                    debug!(
                        attribute = %attr.name,
                        name = name,
                        value = candidate,
                        "Creating dynamic type"
                    );
                    return Ok(candidate);
                }
                // Taken by a writer that does not go through this registrar
                Err(DictionaryError::DuplicateValue { .. }) => continue,
                Err(DictionaryError::DuplicateAlias { .. }) => {
                    return self
                        .dict
                        .enum_by_alias(attr, name)
                        .map(|e| e.value)
                        .ok_or_else(|| {
                            VirtualServerError::dictionary(
                                &Location::default(),
                                format!(
                                    "VALUE {} {} vanished while being defined",
                                    attr.name, name
                                ),
                            )
                        });
                }
                Err(e) => {
                    return Err(VirtualServerError::dictionary(
                        &Location::default(),
                        e.to_string(),
                    ));
                }
            }
        }
    }

    /// Value registered for `name` under `attr`, if any
    pub fn resolve(&self, attr: &DictAttr, name: &str) -> Option<u32> {
        self.dict.enum_by_alias(attr, name).map(|e| e.value)
    }

    /// Define a value for every `subsection_name <name> { ... }` in a server
    ///
    /// Lets code outside the component table (a module with its own
    /// `Foo-Type` attribute, say) register types for the sections it owns.
    pub fn define_sections(
        &self,
        server: &ConfigSection,
        subsection_name: &str,
        attr: &DictAttr,
    ) -> VirtualServerResult<()> {
        if server.name1 != "server" {
            return Err(VirtualServerError::schema(
                &server.location,
                format!("Expected a server section, got '{}'", server.display_name()),
            ));
        }

        for subcs in server.sections_named(subsection_name) {
            let Some(name) = subcs.name2.as_deref() else {
                return Err(VirtualServerError::schema(
                    &subcs.location,
                    format!("Invalid '{} {{ ... }}' section, it must have a name", subsection_name),
                ));
            };
            self.define(attr, name).map_err(|e| relocate(e, &subcs.location))?;
        }

        Ok(())
    }
}

/// Attach a section location to a dictionary error raised without one
pub(crate) fn relocate(err: VirtualServerError, at: &Location) -> VirtualServerError {
    match err {
        VirtualServerError::Dictionary { location, message } if location == Location::default() => {
            VirtualServerError::Dictionary {
                location: at.clone(),
                message,
            }
        }
        other => other,
    }
}
