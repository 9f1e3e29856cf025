//! Virtual servers and their lifecycle
//!
//! [`VirtualServers`] owns every virtual server of the process. It is built
//! by [`VirtualServers::bootstrap`] and then taken through the remaining
//! phases, strictly in order:
//!
//! 1. `bootstrap` - bind the configuration, load protocol modules, register
//!    dynamic types of old-style servers, run module bootstrap hooks
//! 2. `compile` - compile the component sections of old-style servers
//! 3. `instantiate` - run module instantiate hooks
//! 4. `open` - run module open hooks with the caller's I/O scheduler
//!
//! Each phase finishes for every server before the next one starts. Any
//! failure aborts the phase. Once open, the registry is read-only and
//! requests are dispatched against it concurrently (see `dispatch`).

use crate::binder::{Binding, ConfigBinder, Listener};
use crate::compile::ComponentCompiler;
use crate::error::{VirtualServerError, VirtualServerResult};
use crate::interpreter::{CompiledSection, Interpreter};
use crate::legacy::define_types_deprecated;
use crate::module::{LegacyListeners, ModuleResolver, NoLegacyListeners, Scheduler};
use crate::types::TypeRegistrar;
use radius_policy::{Capabilities, Component, ConfigItem, ConfigSection, DictAttr, Dictionary};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Compiled form of one component section and its named sub-policies
#[derive(Debug, Clone)]
pub struct CompiledComponent {
    pub(crate) section: CompiledSection,
    pub(crate) subsections: HashMap<String, CompiledSection>,
}

impl CompiledComponent {
    /// The component section itself
    pub fn section(&self) -> &CompiledSection {
        &self.section
    }

    /// A named sub-policy, e.g. `PAP` for `Auth-Type PAP { ... }`
    pub fn subsection(&self, name: &str) -> Option<&CompiledSection> {
        self.subsections.get(name)
    }

    /// Names of all compiled sub-policies, sorted
    pub fn subsection_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.subsections.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// One `server <name> { ... }` block
pub struct VirtualServer {
    name: String,
    namespace: Option<String>,
    section: ConfigSection,
    listeners: Vec<Listener>,
    pub(crate) compiled: HashMap<Component, CompiledComponent>,
}

impl VirtualServer {
    pub(crate) fn new(
        name: String,
        namespace: Option<String>,
        section: ConfigSection,
        listeners: Vec<Listener>,
    ) -> Self {
        VirtualServer {
            name,
            namespace,
            section,
            listeners,
            compiled: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Protocol namespace; `None` for old-style servers
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn section(&self) -> &ConfigSection {
        &self.section
    }

    pub fn listeners(&self) -> &[Listener] {
        &self.listeners
    }

    pub fn compiled(&self, component: Component) -> Option<&CompiledComponent> {
        self.compiled.get(&component)
    }

    /// Components with a compiled section, in component order
    pub fn compiled_components(&self) -> Vec<Component> {
        let mut components: Vec<Component> = self.compiled.keys().copied().collect();
        components.sort();
        components
    }
}

impl fmt::Debug for VirtualServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualServer")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("listeners", &self.listeners)
            .field("compiled", &self.compiled_components())
            .finish()
    }
}

/// External collaborators of the virtual-server core
#[derive(Clone)]
pub struct Environment {
    pub dictionary: Arc<dyn Dictionary>,
    pub interpreter: Arc<dyn Interpreter>,
    pub modules: Arc<dyn ModuleResolver>,
    pub legacy: Arc<dyn LegacyListeners>,
    pub capabilities: Capabilities,
}

impl Environment {
    pub fn new(
        dictionary: Arc<dyn Dictionary>,
        interpreter: Arc<dyn Interpreter>,
        modules: Arc<dyn ModuleResolver>,
    ) -> Self {
        Environment {
            dictionary,
            interpreter,
            modules,
            legacy: Arc::new(NoLegacyListeners),
            capabilities: Capabilities::default(),
        }
    }

    pub fn with_legacy(mut self, legacy: Arc<dyn LegacyListeners>) -> Self {
        self.legacy = legacy;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

/// Last lifecycle phase completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Bootstrapped,
    Compiled,
    Instantiated,
    Open,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Bootstrapped => "bootstrap",
            Phase::Compiled => "compile",
            Phase::Instantiated => "instantiate",
            Phase::Open => "open",
        };
        f.write_str(name)
    }
}

/// Every virtual server of the process
pub struct VirtualServers {
    servers: Vec<VirtualServer>,
    index: HashMap<String, usize>,
    env: Environment,
    registrar: TypeRegistrar,
    namespace_listeners: bool,
    phase: Phase,
}

impl VirtualServers {
    /// Bind `config` and bootstrap every virtual server in it
    ///
    /// Nothing is returned on failure; no server of a failed bootstrap is
    /// usable.
    pub fn bootstrap(config: ConfigSection, env: Environment) -> VirtualServerResult<Self> {
        debug!("#### Bootstrapping listeners ####");

        let Binding {
            mut servers,
            namespace_listeners,
        } = ConfigBinder::new(env.modules.as_ref()).bind(config)?;
        let registrar = TypeRegistrar::new(Arc::clone(&env.dictionary));

        for server in servers.iter_mut().filter(|s| s.namespace.is_none()) {
            bootstrap_legacy_server(server, &registrar, &env)?;
        }

        for server in &mut servers {
            for listener in &mut server.listeners {
                let Some(module) = listener.module.as_mut() else {
                    continue;
                };
                module
                    .bootstrap(&listener.section)
                    .map_err(|source| VirtualServerError::Module {
                        server: server.name.clone(),
                        namespace: module.name().to_string(),
                        phase: "bootstrap",
                        location: listener.section.location.clone(),
                        source,
                    })?;
            }
        }

        let index = servers
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i))
            .collect();

        Ok(VirtualServers {
            servers,
            index,
            env,
            registrar,
            namespace_listeners,
            phase: Phase::Bootstrapped,
        })
    }

    /// Load the configuration tree from a JSON file and bootstrap it
    pub fn bootstrap_file<P: AsRef<Path>>(path: P, env: Environment) -> VirtualServerResult<Self> {
        let config = ConfigSection::from_file(path)?;
        Self::bootstrap(config, env)
    }

    /// Compile the component sections of every old-style server
    ///
    /// Servers with a `namespace` must not contain component sections; that
    /// is checked for all servers before anything is compiled.
    pub fn compile(&mut self) -> VirtualServerResult<()> {
        self.advance(Phase::Bootstrapped, Phase::Compiled)?;
        debug!("#### Compiling virtual servers ####");

        let caps = self.env.capabilities;
        for server in self.servers.iter().filter(|s| s.namespace.is_some()) {
            for comp in caps.components() {
                if let Some(cs) = server.section.find_section(comp.section()) {
                    return Err(VirtualServerError::schema(
                        &cs.location,
                        format!(
                            "Old-style configuration section '{}' found in new namespace server \"{}\"",
                            comp.section(),
                            server.name
                        ),
                    ));
                }
            }
            warn!(
                server = %server.name,
                "Virtual server uses new namespace.  Skipping old-style configuration"
            );
        }

        let compiler = ComponentCompiler::new(&self.registrar, self.env.interpreter.as_ref());
        for server in self.servers.iter_mut().filter(|s| s.namespace.is_none()) {
            debug!("server {} {{", server.name);
            let mut found = false;

            for comp in caps.components() {
                if !caps.compiles(comp) {
                    continue;
                }
                match compiler.compile(server, comp) {
                    Ok(compiled) => found |= compiled,
                    Err(e) => {
                        error!(
                            server = %server.name,
                            component = %comp,
                            "Failed to load virtual server"
                        );
                        return Err(e);
                    }
                }
            }

            // No policy sections: a server for some other protocol, which
            // only has listeners
            if !found {
                for listen in server.section.sections_named("listen") {
                    self.env
                        .legacy
                        .compile(&server.section, listen)
                        .map_err(|source| VirtualServerError::Module {
                            server: server.name.clone(),
                            namespace: listen.display_name(),
                            phase: "compile",
                            location: listen.location.clone(),
                            source,
                        })?;
                }
            }

            debug!("}} # server {}", server.name);
            info!("Loaded virtual server {}", server.name);
        }

        Ok(())
    }

    /// Run the instantiate hook of every loaded listener
    pub fn instantiate(&mut self) -> VirtualServerResult<()> {
        self.advance(Phase::Compiled, Phase::Instantiated)?;
        debug!("#### Instantiating listeners ####");

        for server in &mut self.servers {
            for listener in &mut server.listeners {
                let Some(module) = listener.module.as_mut() else {
                    continue;
                };
                module
                    .instantiate(&listener.section)
                    .map_err(|source| VirtualServerError::Module {
                        server: server.name.clone(),
                        namespace: module.name().to_string(),
                        phase: "instantiate",
                        location: listener.section.location.clone(),
                        source,
                    })?;
            }
        }

        Ok(())
    }

    /// Run the open hook of every loaded listener
    pub fn open(&mut self, scheduler: &Scheduler) -> VirtualServerResult<()> {
        self.advance(Phase::Instantiated, Phase::Open)?;
        debug!("#### Opening listener interfaces ####");

        for server in &mut self.servers {
            for listener in &mut server.listeners {
                let Some(module) = listener.module.as_mut() else {
                    continue;
                };
                module
                    .open(scheduler, &listener.section)
                    .map_err(|source| VirtualServerError::Module {
                        server: server.name.clone(),
                        namespace: module.name().to_string(),
                        phase: "open",
                        location: listener.section.location.clone(),
                        source,
                    })?;
            }
        }

        Ok(())
    }

    fn advance(&mut self, expected: Phase, next: Phase) -> VirtualServerResult<()> {
        if self.phase != expected {
            return Err(VirtualServerError::Lifecycle(format!(
                "{} must run right after {}, but the last phase was {}",
                next, expected, self.phase
            )));
        }
        self.phase = next;
        Ok(())
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn find_server(&self, name: &str) -> Option<&VirtualServer> {
        self.index.get(name).map(|&i| &self.servers[i])
    }

    /// All servers, in configuration order
    pub fn servers(&self) -> &[VirtualServer] {
        &self.servers
    }

    /// Whether any namespace-style listener was configured
    pub fn uses_namespaces(&self) -> bool {
        self.namespace_listeners
    }

    pub fn capabilities(&self) -> Capabilities {
        self.env.capabilities
    }

    pub fn registrar(&self) -> &TypeRegistrar {
        &self.registrar
    }

    pub(crate) fn env(&self) -> &Environment {
        &self.env
    }

    /// Register a value of `attr` for every `subsection_name <name> { }` in a server
    pub fn define_dynamic_type(
        &self,
        server: &str,
        subsection_name: &str,
        attr: &DictAttr,
    ) -> VirtualServerResult<()> {
        let vs = self.find_server(server).ok_or_else(|| {
            VirtualServerError::schema(
                &Default::default(),
                format!("No such virtual server \"{}\"", server),
            )
        })?;
        self.registrar.define_sections(&vs.section, subsection_name, attr)
    }
}

impl fmt::Debug for VirtualServers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualServers")
            .field("servers", &self.servers)
            .field("namespace_listeners", &self.namespace_listeners)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

/// Bootstrap the direct subsections of an old-style server
fn bootstrap_legacy_server(
    server: &mut VirtualServer,
    registrar: &TypeRegistrar,
    env: &Environment,
) -> VirtualServerResult<()> {
    for i in 0..server.section.items.len() {
        let ConfigItem::Section(subcs) = &server.section.items[i] else {
            continue;
        };

        if subcs.name1 == "listen" {
            env.legacy
                .bootstrap(&server.section, subcs, &server.name)
                .map_err(|source| VirtualServerError::Module {
                    server: server.name.clone(),
                    namespace: subcs.display_name(),
                    phase: "bootstrap",
                    location: subcs.location.clone(),
                    source,
                })?;
            continue;
        }

        let Some(comp) = env
            .capabilities
            .components()
            .find(|c| c.section() == subcs.name1)
        else {
            continue;
        };

        if let ConfigItem::Section(subcs) = &mut server.section.items[i] {
            define_types_deprecated(registrar, subcs, comp)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::CompileError;
    use crate::module::{ModuleLoader, ProtocolModule};
    use radius_policy::{MemoryDictionary, Rcode, Request};

    struct Accept;

    impl Interpreter for Accept {
        fn compile(
            &self,
            section: &ConfigSection,
            _component: Component,
        ) -> Result<CompiledSection, CompileError> {
            Ok(CompiledSection::new(section, ()))
        }

        fn run(
            &self,
            _section: &CompiledSection,
            _request: &mut Request,
            _default: Rcode,
        ) -> Rcode {
            Rcode::Ok
        }
    }

    struct Null;

    impl ProtocolModule for Null {
        fn name(&self) -> &str {
            "radius"
        }
    }

    fn env() -> Environment {
        let loader = ModuleLoader::new()
            .register("radius", |_| Ok(Box::new(Null) as Box<dyn ProtocolModule>));
        Environment::new(
            Arc::new(MemoryDictionary::internal()),
            Arc::new(Accept),
            Arc::new(loader),
        )
    }

    fn config() -> ConfigSection {
        ConfigSection::new("config")
            .with_section(
                ConfigSection::named("server", "default")
                    .with_pair("namespace", "radius")
                    .with_section(ConfigSection::new("listen")),
            )
            .with_section(
                ConfigSection::named("server", "inner")
                    .with_section(ConfigSection::new("authorize").with_bare("files"))
                    .with_section(ConfigSection::new("authenticate").with_bare("pap")),
            )
    }

    #[test]
    fn test_phases_run_in_order() {
        let mut servers = VirtualServers::bootstrap(config(), env()).unwrap();
        assert_eq!(servers.phase(), Phase::Bootstrapped);
        assert!(servers.uses_namespaces());

        assert!(matches!(servers.instantiate(), Err(VirtualServerError::Lifecycle(_))));
        servers.compile().unwrap();
        assert!(matches!(servers.compile(), Err(VirtualServerError::Lifecycle(_))));
        servers.instantiate().unwrap();
        assert_eq!(servers.phase(), Phase::Instantiated);
    }

    #[test]
    fn test_find_server() {
        let servers = VirtualServers::bootstrap(config(), env()).unwrap();
        assert_eq!(servers.find_server("inner").unwrap().namespace(), None);
        assert_eq!(servers.find_server("default").unwrap().namespace(), Some("radius"));
        assert!(servers.find_server("outer").is_none());
        assert_eq!(servers.servers().len(), 2);
    }

    #[test]
    fn test_compile_skips_namespace_servers() {
        let mut servers = VirtualServers::bootstrap(config(), env()).unwrap();
        servers.compile().unwrap();

        let inner = servers.find_server("inner").unwrap();
        assert_eq!(
            inner.compiled_components(),
            vec![Component::Authenticate, Component::Authorize]
        );
        assert_eq!(
            inner.compiled(Component::Authenticate).unwrap().subsection_names(),
            vec!["pap"]
        );
        assert!(servers.find_server("default").unwrap().compiled_components().is_empty());
    }

    #[test]
    fn test_capabilities_gate_compilation() {
        let config = ConfigSection::new("config").with_section(
            ConfigSection::named("server", "inner")
                .with_section(ConfigSection::new("pre-proxy").with_bare("attr_filter"))
                .with_section(ConfigSection::new("accounting").with_bare("detail"))
                .with_section(ConfigSection::new("session").with_bare("radutmp")),
        );
        let caps = Capabilities {
            accounting: false,
            session: true,
            proxy: false,
            coa: true,
        };

        let mut servers = VirtualServers::bootstrap(config, env().with_capabilities(caps)).unwrap();
        servers.compile().unwrap();
        assert_eq!(
            servers.find_server("inner").unwrap().compiled_components(),
            vec![Component::Session]
        );
    }

    #[test]
    fn test_define_dynamic_type_for_unknown_server() {
        let servers = VirtualServers::bootstrap(config(), env()).unwrap();
        let da = servers.registrar().dictionary().attr_by_name("Auth-Type").unwrap();
        assert!(servers.define_dynamic_type("nowhere", "Auth-Type", &da).is_err());
        assert!(servers.define_dynamic_type("inner", "Auth-Type", &da).is_ok());
    }
}
