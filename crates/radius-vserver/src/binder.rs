//! Configuration binding
//!
//! Walks the `server` blocks of a configuration tree and builds the
//! in-memory model: one [`VirtualServer`] per block, each with its
//! listeners in configuration order.
//!
//! A `listen` section only gets a protocol module when its server sets
//! `namespace`. Listeners of old-style servers are kept as inert
//! placeholders; their sections are handled by the legacy listener path
//! during bootstrap instead.

use crate::error::{VirtualServerError, VirtualServerResult};
use crate::module::{ModuleResolver, ProtocolModule};
use crate::server::VirtualServer;
use radius_policy::{ConfigItem, ConfigSection};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, warn};

/// A `listen` section of a virtual server
pub struct Listener {
    namespace: Option<String>,
    pub(crate) section: ConfigSection,
    pub(crate) module: Option<Box<dyn ProtocolModule>>,
}

impl Listener {
    fn placeholder(section: ConfigSection) -> Self {
        Listener {
            namespace: None,
            section,
            module: None,
        }
    }

    /// Namespace of the protocol module, `None` for placeholders
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// The `listen` section, which is also the module's configuration
    pub fn section(&self) -> &ConfigSection {
        &self.section
    }

    /// Old-style listener with no module; skipped by every lifecycle phase
    pub fn is_placeholder(&self) -> bool {
        self.module.is_none()
    }

    pub fn module(&self) -> Option<&dyn ProtocolModule> {
        self.module.as_deref()
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("namespace", &self.namespace)
            .field("section", &self.section.display_name())
            .field("loaded", &self.module.is_some())
            .finish()
    }
}

/// Result of binding a configuration tree
#[derive(Debug)]
pub struct Binding {
    pub servers: Vec<VirtualServer>,
    /// At least one namespace-style listener was configured
    pub namespace_listeners: bool,
}

/// Builds virtual servers from a configuration tree
pub struct ConfigBinder<'a> {
    modules: &'a dyn ModuleResolver,
}

impl<'a> ConfigBinder<'a> {
    pub fn new(modules: &'a dyn ModuleResolver) -> Self {
        ConfigBinder { modules }
    }

    /// Bind every `server` block under `config`
    ///
    /// Other top-level items are ignored. Fails on a nameless or duplicate
    /// server, or on a protocol module that cannot be loaded.
    pub fn bind(&self, config: ConfigSection) -> VirtualServerResult<Binding> {
        let mut servers = Vec::new();
        let mut names = HashSet::new();
        let mut namespace_listeners = false;

        for item in config.items {
            let ConfigItem::Section(cs) = item else {
                continue;
            };
            if cs.name1 != "server" {
                continue;
            }

            let Some(name) = cs.name2.clone() else {
                return Err(VirtualServerError::schema(
                    &cs.location,
                    "server sections must have a name",
                ));
            };
            if !names.insert(name.clone()) {
                return Err(VirtualServerError::schema(
                    &cs.location,
                    format!("Duplicate virtual server \"{}\"", name),
                ));
            }

            let server = self.bind_server(name, cs)?;
            namespace_listeners |= server.listeners().iter().any(|l| !l.is_placeholder());
            servers.push(server);
        }

        Ok(Binding {
            servers,
            namespace_listeners,
        })
    }

    fn bind_server(&self, name: String, cs: ConfigSection) -> VirtualServerResult<VirtualServer> {
        let namespace = cs.pair_value("namespace").map(str::to_string);
        let mut listeners = Vec::new();

        for listen_cs in cs.sections_named("listen") {
            let Some(server_ns) = namespace.as_deref() else {
                warn!(
                    server = %name,
                    location = %listen_cs.location,
                    "Skipping listener in old style server"
                );
                listeners.push(Listener::placeholder(listen_cs.clone()));
                continue;
            };

            // The second name is only a label; a `namespace` pair overrides
            // the server's
            let listener_ns = listen_cs
                .pair_value("namespace")
                .unwrap_or(server_ns)
                .to_string();

            debug!(server = %name, namespace = %listener_ns, "Loading listener");
            let module = self
                .modules
                .load(&listener_ns, listen_cs)
                .map_err(|source| VirtualServerError::Module {
                    server: name.clone(),
                    namespace: listener_ns.clone(),
                    phase: "load",
                    location: listen_cs.location.clone(),
                    source,
                })?;

            listeners.push(Listener {
                namespace: Some(listener_ns),
                section: listen_cs.clone(),
                module: Some(module),
            });
        }

        Ok(VirtualServer::new(name, namespace, cs, listeners))
    }
}
