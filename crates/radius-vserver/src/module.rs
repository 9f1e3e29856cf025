//! Protocol module interface
//!
//! A `listen` section in a namespace-style virtual server is served by a
//! protocol module, located by namespace (`radius`, `dhcpv4`, ...). The core
//! drives three optional hooks on it:
//!
//! - `bootstrap` - after every listener is loaded
//! - `instantiate` - after every virtual server is compiled
//! - `open` - once the caller is ready to schedule I/O
//!
//! Loading is behind [`ModuleResolver`]; [`ModuleLoader`] is a static table of
//! factories keyed by namespace.

use radius_policy::ConfigSection;
use std::collections::HashMap;
use std::future::Future;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModuleError {
    /// No module is registered for the namespace
    #[error("No protocol module for namespace \"{0}\"")]
    NotFound(String),
    /// A hook reported failure
    #[error("{0}")]
    Failed(String),
    /// No runtime to schedule I/O on
    #[error("No I/O scheduler available: {0}")]
    NoScheduler(String),
}

/// Handle used by protocol modules to schedule their I/O
#[derive(Debug, Clone)]
pub struct Scheduler {
    handle: Handle,
}

impl Scheduler {
    pub fn new(handle: Handle) -> Self {
        Scheduler { handle }
    }

    /// Scheduler for the runtime the caller is running on
    pub fn current() -> Result<Self, ModuleError> {
        Handle::try_current()
            .map(Scheduler::new)
            .map_err(|e| ModuleError::NoScheduler(e.to_string()))
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }
}

/// A loaded protocol module
///
/// `self` is the module's private instance data; `conf` is the `listen`
/// section it was loaded from.
pub trait ProtocolModule: Send + Sync {
    /// Namespace the module serves
    fn name(&self) -> &str;

    fn bootstrap(&mut self, _conf: &ConfigSection) -> Result<(), ModuleError> {
        Ok(())
    }

    fn instantiate(&mut self, _conf: &ConfigSection) -> Result<(), ModuleError> {
        Ok(())
    }

    fn open(&mut self, _scheduler: &Scheduler, _conf: &ConfigSection) -> Result<(), ModuleError> {
        Ok(())
    }
}

/// Locates and loads protocol modules by namespace
pub trait ModuleResolver: Send + Sync {
    fn load(
        &self,
        namespace: &str,
        conf: &ConfigSection,
    ) -> Result<Box<dyn ProtocolModule>, ModuleError>;
}

/// Builds a module instance from its `listen` section
pub type ModuleFactory =
    Box<dyn Fn(&ConfigSection) -> Result<Box<dyn ProtocolModule>, ModuleError> + Send + Sync>;

/// Static table of protocol modules
#[derive(Default)]
pub struct ModuleLoader {
    factories: HashMap<String, ModuleFactory>,
}

impl ModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the factory for a namespace, replacing any previous one
    pub fn register<F>(mut self, namespace: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ConfigSection) -> Result<Box<dyn ProtocolModule>, ModuleError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(namespace.into(), Box::new(factory));
        self
    }

    /// Registered namespaces, sorted
    pub fn namespaces(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl ModuleResolver for ModuleLoader {
    fn load(
        &self,
        namespace: &str,
        conf: &ConfigSection,
    ) -> Result<Box<dyn ProtocolModule>, ModuleError> {
        let factory = self
            .factories
            .get(namespace)
            .ok_or_else(|| ModuleError::NotFound(namespace.to_string()))?;
        debug!(namespace = namespace, "Loading protocol module");
        factory(conf)
    }
}

/// Old-style `listen` sections inside servers without a namespace
pub trait LegacyListeners: Send + Sync {
    fn bootstrap(
        &self,
        server: &ConfigSection,
        listen: &ConfigSection,
        server_name: &str,
    ) -> Result<(), ModuleError>;

    fn compile(&self, server: &ConfigSection, listen: &ConfigSection) -> Result<(), ModuleError>;
}

/// Accepts old-style listeners without doing anything with them
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLegacyListeners;

impl LegacyListeners for NoLegacyListeners {
    fn bootstrap(
        &self,
        _server: &ConfigSection,
        listen: &ConfigSection,
        server_name: &str,
    ) -> Result<(), ModuleError> {
        debug!(
            server = server_name,
            listen = %listen.display_name(),
            "Ignoring old-style listener"
        );
        Ok(())
    }

    fn compile(&self, _server: &ConfigSection, _listen: &ConfigSection) -> Result<(), ModuleError> {
        Ok(())
    }
}
