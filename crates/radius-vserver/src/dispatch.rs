//! Request dispatch
//!
//! Routes a request to the compiled section for a (component, subtype)
//! pair of its current virtual server, and runs it.
//!
//! A subtype of 0 selects the component section itself. Any other value
//! is looked up in the dictionary under the component's type attribute and
//! selects the sub-policy of that name. Missing sections fall back to the
//! component's default result; a subtype the dictionary does not know is a
//! failure.

use crate::server::VirtualServers;
use radius_policy::{Component, Rcode, Request, SimulState};
use tracing::{debug, warn};

impl VirtualServers {
    /// Run `component` for `request` in the request's current virtual server
    ///
    /// The request's module, component and server fields are restored
    /// before returning, whatever the section did with them.
    pub fn dispatch(&self, component: Component, subtype: u32, request: &mut Request) -> Rcode {
        let Some(server_name) = request.server.as_deref() else {
            warn!(request = request.id, component = %component, "Request has no virtual server");
            return Rcode::Fail;
        };
        let Some(server) = self.find_server(server_name) else {
            warn!(request = request.id, server = server_name, "No such virtual server");
            return Rcode::Fail;
        };

        let default = component.default_result();
        let Some(compiled) = server.compiled(component) else {
            debug!(
                request = request.id,
                "Empty {} section in virtual server \"{}\".  Using default return value {}.",
                component,
                server.name(),
                default
            );
            return default;
        };

        let section = if subtype == 0 {
            debug!(
                request = request.id,
                "Running section {} from file {}",
                component,
                compiled.section().location()
            );
            compiled.section()
        } else {
            let env = self.env();
            let Some(ta) = component.type_attribute() else {
                return Rcode::Fail;
            };
            let Some(da) = env.dictionary.attr_by_num(ta.number) else {
                return Rcode::Fail;
            };
            let Some(dv) = env.dictionary.enum_by_value(&da, subtype) else {
                return Rcode::Fail;
            };

            let Some(subcs) = compiled.subsection(&dv.alias) else {
                debug!(
                    request = request.id,
                    "{} {} sub-section not found.  Using default return values.",
                    da.name,
                    dv.alias
                );
                return default;
            };
            debug!(
                request = request.id,
                "Running {} {} from file {}",
                da.name,
                dv.alias,
                subcs.location()
            );
            subcs
        };

        let saved_server = request.server.clone();
        let saved_module = request.module.take();
        let saved_component = request.component.replace(component.section());

        let rcode = self.env().interpreter.run(section, request, default);

        request.component = saved_component;
        request.module = saved_module;
        request.server = saved_server;

        rcode
    }

    pub fn authorize(&self, autz_type: u32, request: &mut Request) -> Rcode {
        self.dispatch(Component::Authorize, autz_type, request)
    }

    pub fn authenticate(&self, auth_type: u32, request: &mut Request) -> Rcode {
        self.dispatch(Component::Authenticate, auth_type, request)
    }

    pub fn preacct(&self, request: &mut Request) -> Rcode {
        self.dispatch(Component::PreAccounting, 0, request)
    }

    pub fn accounting(&self, acct_type: u32, request: &mut Request) -> Rcode {
        self.dispatch(Component::Accounting, acct_type, request)
    }

    /// Check whether the user is already logged in
    ///
    /// Returns 0 when the login is allowed, otherwise the multilink indicator
    /// left by the `session` section: 1 for a double login, 2 for a multilink
    /// attempt. A request without a user name, or a session section that
    /// does not return `ok`, always allows the login.
    pub fn check_simultaneous(
        &self,
        sess_type: u32,
        request: &mut Request,
        max_sessions: u32,
    ) -> u32 {
        if request.username.is_none() {
            return 0;
        }

        request.simul = SimulState {
            count: 0,
            max: max_sessions,
            mpp: 1,
        };

        let rcode = self.dispatch(Component::Session, sess_type, request);
        if rcode != Rcode::Ok {
            return 0;
        }

        if request.simul.count < max_sessions {
            0
        } else {
            request.simul.mpp
        }
    }

    pub fn pre_proxy(&self, pre_proxy_type: u32, request: &mut Request) -> Rcode {
        if !request.proxied {
            warn!(request = request.id, "pre-proxy called for a request that is not being proxied");
            return Rcode::Invalid;
        }
        self.dispatch(Component::PreProxy, pre_proxy_type, request)
    }

    pub fn post_proxy(&self, post_proxy_type: u32, request: &mut Request) -> Rcode {
        if !request.proxied {
            warn!(
                request = request.id,
                "post-proxy called for a request that is not being proxied"
            );
            return Rcode::Invalid;
        }
        self.dispatch(Component::PostProxy, post_proxy_type, request)
    }

    pub fn post_auth(&self, post_auth_type: u32, request: &mut Request) -> Rcode {
        self.dispatch(Component::PostAuth, post_auth_type, request)
    }

    pub fn recv_coa(&self, recv_coa_type: u32, request: &mut Request) -> Rcode {
        self.dispatch(Component::RecvCoA, recv_coa_type, request)
    }

    pub fn send_coa(&self, send_coa_type: u32, request: &mut Request) -> Rcode {
        self.dispatch(Component::SendCoA, send_coa_type, request)
    }
}

#[cfg(test)]
mod tests {
    use crate::interpreter::{CompileError, CompiledSection, Interpreter};
    use crate::module::ModuleLoader;
    use crate::server::{Environment, VirtualServers};
    use radius_policy::{
        Capabilities, Component, ConfigSection, Dictionary, MemoryDictionary, Rcode, Request,
    };
    use std::sync::Arc;

    /// Each section compiles to the rcode named by its `result` pair.
    /// A `sessions` pair sets the simultaneous-use count; a `hop` pair moves
    /// the request to another server and clobbers the module name.
    struct Scripted;

    struct Script {
        result: Option<Rcode>,
        sessions: Option<u32>,
        hop: Option<String>,
    }

    impl Interpreter for Scripted {
        fn compile(
            &self,
            section: &ConfigSection,
            _component: Component,
        ) -> Result<CompiledSection, CompileError> {
            let result = match section.pair_value("result") {
                Some(name) => Some(
                    name.parse::<Rcode>()
                        .map_err(|_| CompileError::new(section, "bad rcode"))?,
                ),
                None => None,
            };
            let sessions = section.pair_value("sessions").and_then(|v| v.parse().ok());
            let hop = section.pair_value("hop").map(str::to_string);
            Ok(CompiledSection::new(section, Script { result, sessions, hop }))
        }

        fn run(&self, section: &CompiledSection, request: &mut Request, default: Rcode) -> Rcode {
            let Some(script) = section.program::<Script>() else {
                return Rcode::Fail;
            };
            if let Some(count) = script.sessions {
                request.simul.count = count;
                request.simul.mpp = 2;
            }
            if let Some(hop) = &script.hop {
                request.server = Some(hop.clone());
                request.module = Some("eap".to_string());
            }
            script.result.unwrap_or(default)
        }
    }

    fn servers(server: ConfigSection, caps: Capabilities) -> VirtualServers {
        let env = Environment::new(
            Arc::new(MemoryDictionary::internal()),
            Arc::new(Scripted),
            Arc::new(ModuleLoader::new()),
        )
        .with_capabilities(caps);
        let mut servers =
            VirtualServers::bootstrap(ConfigSection::new("config").with_section(server), env)
                .unwrap();
        servers.compile().unwrap();
        servers.instantiate().unwrap();
        servers
    }

    fn auth_value(servers: &VirtualServers, name: &str) -> u32 {
        let dict = servers.registrar().dictionary();
        let da = dict.attr_by_name("Auth-Type").unwrap();
        dict.enum_by_alias(&da, name).unwrap().value
    }

    #[test]
    fn test_absent_components_return_defaults() {
        let vs = servers(ConfigSection::named("server", "empty"), Capabilities::all());
        for comp in Component::ALL {
            let mut request = Request::new(1, "empty");
            assert_eq!(vs.dispatch(comp, 0, &mut request), comp.default_result(), "{}", comp);
        }
    }

    #[test]
    fn test_empty_section_returns_default() {
        let vs = servers(
            ConfigSection::named("server", "inner").with_section(ConfigSection::new("authorize")),
            Capabilities::default(),
        );
        let mut request = Request::new(1, "inner");
        assert_eq!(vs.authorize(0, &mut request), Rcode::NotFound);
    }

    #[test]
    fn test_top_level_section_runs() {
        let vs = servers(
            ConfigSection::named("server", "inner")
                .with_section(ConfigSection::new("authorize").with_pair("result", "updated")),
            Capabilities::default(),
        );
        let mut request = Request::new(1, "inner");
        assert_eq!(vs.authorize(0, &mut request), Rcode::Updated);
    }

    #[test]
    fn test_subtype_selects_subsection() {
        let vs = servers(
            ConfigSection::named("server", "inner").with_section(
                ConfigSection::new("authenticate")
                    .with_section(
                        ConfigSection::named("Auth-Type", "PAP").with_pair("result", "ok"),
                    )
                    .with_section(
                        ConfigSection::named("Auth-Type", "CHAP").with_pair("result", "reject"),
                    ),
            ),
            Capabilities::default(),
        );
        let pap = auth_value(&vs, "PAP");
        let chap = auth_value(&vs, "CHAP");

        let mut request = Request::new(1, "inner");
        assert_eq!(vs.authenticate(pap, &mut request), Rcode::Ok);
        assert_eq!(vs.authenticate(chap, &mut request), Rcode::Reject);
    }

    #[test]
    fn test_unknown_subtype_fails() {
        let vs = servers(
            ConfigSection::named("server", "inner").with_section(
                ConfigSection::new("authenticate").with_section(
                    ConfigSection::named("Auth-Type", "PAP").with_pair("result", "ok"),
                ),
            ),
            Capabilities::default(),
        );
        let pap = auth_value(&vs, "PAP");
        let unknown = if pap == 0x0100_0000 { pap - 1 } else { pap + 1 };

        let mut request = Request::new(1, "inner");
        assert_eq!(vs.authenticate(unknown, &mut request), Rcode::Fail);
    }

    #[test]
    fn test_registered_but_unmatched_subtype_returns_default() {
        let vs = servers(
            ConfigSection::named("server", "inner").with_section(
                ConfigSection::new("authenticate").with_section(
                    ConfigSection::named("Auth-Type", "PAP").with_pair("result", "ok"),
                ),
            ),
            Capabilities::default(),
        );
        // Known to the dictionary, but this server has no such sub-policy
        let dict = vs.registrar().dictionary();
        let da = dict.attr_by_name("Auth-Type").unwrap();
        let ldap = vs.registrar().define(&da, "LDAP").unwrap();

        let mut request = Request::new(1, "inner");
        assert_eq!(vs.authenticate(ldap, &mut request), Rcode::Reject);
    }

    #[test]
    fn test_subtype_for_component_without_type_attribute_fails() {
        let vs = servers(
            ConfigSection::named("server", "inner")
                .with_section(ConfigSection::new("preacct").with_pair("result", "ok")),
            Capabilities::default(),
        );
        let mut request = Request::new(1, "inner");
        assert_eq!(vs.dispatch(Component::PreAccounting, 5, &mut request), Rcode::Fail);
        assert_eq!(vs.preacct(&mut request), Rcode::Ok);
    }

    #[test]
    fn test_unknown_server_fails() {
        let vs = servers(ConfigSection::named("server", "inner"), Capabilities::default());
        let mut request = Request::new(1, "outer");
        assert_eq!(vs.authorize(0, &mut request), Rcode::Fail);

        let mut request = Request::default();
        assert_eq!(vs.authorize(0, &mut request), Rcode::Fail);
    }

    #[test]
    fn test_context_restored_after_run() {
        let vs = servers(
            ConfigSection::named("server", "inner").with_section(
                ConfigSection::new("post-auth")
                    .with_pair("hop", "outer")
                    .with_pair("result", "ok"),
            ),
            Capabilities::default(),
        );
        let mut request = Request::new(1, "inner");
        request.module = Some("rest".to_string());
        request.component = Some("authorize");

        assert_eq!(vs.post_auth(0, &mut request), Rcode::Ok);
        assert_eq!(request.server.as_deref(), Some("inner"));
        assert_eq!(request.module.as_deref(), Some("rest"));
        assert_eq!(request.component, Some("authorize"));
    }

    #[test]
    fn test_check_simultaneous() {
        let server = |sessions: &str, result: &str| {
            ConfigSection::named("server", "inner").with_section(
                ConfigSection::new("session")
                    .with_pair("sessions", sessions)
                    .with_pair("result", result),
            )
        };

        let vs = servers(server("1", "ok"), Capabilities::default());
        let mut request = Request::new(1, "inner").with_username("bob");
        assert_eq!(vs.check_simultaneous(0, &mut request, 2), 0);
        assert_eq!(request.simul.max, 2);

        let vs = servers(server("2", "ok"), Capabilities::default());
        let mut request = Request::new(1, "inner").with_username("bob");
        assert_eq!(vs.check_simultaneous(0, &mut request, 2), 2);

        // Anything but ok allows the login
        let vs = servers(server("5", "fail"), Capabilities::default());
        let mut request = Request::new(1, "inner").with_username("bob");
        assert_eq!(vs.check_simultaneous(0, &mut request, 2), 0);

        // No user name, nothing to check
        let vs = servers(server("5", "ok"), Capabilities::default());
        let mut request = Request::new(1, "inner");
        assert_eq!(vs.check_simultaneous(0, &mut request, 1), 0);
    }

    #[test]
    fn test_session_disabled_allows_login() {
        let caps = Capabilities {
            session: false,
            ..Capabilities::default()
        };
        let vs = servers(
            ConfigSection::named("server", "inner").with_section(
                ConfigSection::new("session")
                    .with_pair("sessions", "9")
                    .with_pair("result", "ok"),
            ),
            caps,
        );
        let mut request = Request::new(1, "inner").with_username("bob");
        // Session section never compiled, default is fail
        assert_eq!(vs.check_simultaneous(0, &mut request, 1), 0);
    }

    #[test]
    fn test_proxy_components_require_proxied_request() {
        let vs = servers(
            ConfigSection::named("server", "inner")
                .with_section(ConfigSection::new("pre-proxy").with_pair("result", "updated"))
                .with_section(ConfigSection::new("post-proxy").with_pair("result", "ok")),
            Capabilities::all(),
        );

        let mut request = Request::new(1, "inner");
        assert_eq!(vs.pre_proxy(0, &mut request), Rcode::Invalid);
        assert_eq!(vs.post_proxy(0, &mut request), Rcode::Invalid);

        let mut request = Request::new(1, "inner").with_proxy();
        assert_eq!(vs.pre_proxy(0, &mut request), Rcode::Updated);
        assert_eq!(vs.post_proxy(0, &mut request), Rcode::Ok);
    }

    #[test]
    fn test_coa_components() {
        let vs = servers(
            ConfigSection::named("server", "coa")
                .with_section(ConfigSection::new("recv-coa").with_pair("result", "ok")),
            Capabilities::default(),
        );
        let mut request = Request::new(1, "coa");
        assert_eq!(vs.recv_coa(0, &mut request), Rcode::Ok);
        assert_eq!(vs.send_coa(0, &mut request), Rcode::Noop);
    }
}
