//! Processing components
//!
//! A component is one fixed stage of request processing. Each one maps to
//! a named configuration section inside a virtual server, has a default
//! outcome used when that section is missing, and (for most of them) a
//! dictionary attribute whose values select named sub-policies, e.g.
//! `Auth-Type PAP { ... }` inside `authenticate { ... }`.

use crate::rcode::Rcode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dictionary attribute numbers of the component type attributes
pub mod attr {
    pub const AUTH_TYPE: u32 = 1000;
    pub const AUTZ_TYPE: u32 = 1011;
    pub const ACCT_TYPE: u32 = 1017;
    pub const SESSION_TYPE: u32 = 1018;
    pub const POST_PROXY_TYPE: u32 = 1026;
    pub const PRE_PROXY_TYPE: u32 = 1085;
    pub const POST_AUTH_TYPE: u32 = 1086;
    pub const RECV_COA_TYPE: u32 = 1131;
    pub const SEND_COA_TYPE: u32 = 1132;
}

/// Processing stage of a virtual server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Component {
    /// `authenticate` - verify credentials, selected by Auth-Type
    Authenticate = 0,
    /// `authorize` - look up the user and decide how to authenticate
    Authorize = 1,
    /// `preacct` - normalise accounting requests
    PreAccounting = 2,
    /// `accounting` - record accounting data
    Accounting = 3,
    /// `session` - simultaneous-use checking
    Session = 4,
    /// `pre-proxy` - rewrite a request before it is proxied
    PreProxy = 5,
    /// `post-proxy` - process the reply from a home server
    PostProxy = 6,
    /// `post-auth` - run after the authentication decision
    PostAuth = 7,
    /// `recv-coa` - receive a CoA/Disconnect request
    RecvCoA = 8,
    /// `send-coa` - send a CoA/Disconnect request
    SendCoA = 9,
}

/// The dictionary attribute that names a component's sub-policies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeAttribute {
    pub name: &'static str,
    pub number: u32,
}

impl Component {
    /// All components, in compile order
    pub const ALL: [Component; 10] = [
        Component::Authenticate,
        Component::Authorize,
        Component::PreAccounting,
        Component::Accounting,
        Component::Session,
        Component::PreProxy,
        Component::PostProxy,
        Component::PostAuth,
        Component::RecvCoA,
        Component::SendCoA,
    ];

    /// Name of the configuration section holding this component's policy
    pub fn section(self) -> &'static str {
        match self {
            Component::Authenticate => "authenticate",
            Component::Authorize => "authorize",
            Component::PreAccounting => "preacct",
            Component::Accounting => "accounting",
            Component::Session => "session",
            Component::PreProxy => "pre-proxy",
            Component::PostProxy => "post-proxy",
            Component::PostAuth => "post-auth",
            Component::RecvCoA => "recv-coa",
            Component::SendCoA => "send-coa",
        }
    }

    /// Look up a component by its section name
    pub fn from_section(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.section() == name)
    }

    /// Outcome used when the component (or the selected sub-policy) has no section
    pub fn default_result(self) -> Rcode {
        match self {
            Component::Authenticate => Rcode::Reject,
            Component::Authorize => Rcode::NotFound,
            Component::Session => Rcode::Fail,
            Component::PreAccounting
            | Component::Accounting
            | Component::PreProxy
            | Component::PostProxy
            | Component::PostAuth
            | Component::RecvCoA
            | Component::SendCoA => Rcode::Noop,
        }
    }

    /// Dictionary attribute used for dynamic subtypes, if the component has one
    pub fn type_attribute(self) -> Option<TypeAttribute> {
        let (name, number) = match self {
            Component::Authenticate => ("Auth-Type", attr::AUTH_TYPE),
            Component::Authorize => ("Autz-Type", attr::AUTZ_TYPE),
            Component::PreAccounting => return None,
            Component::Accounting => ("Acct-Type", attr::ACCT_TYPE),
            Component::Session => ("Session-Type", attr::SESSION_TYPE),
            Component::PreProxy => ("Pre-Proxy-Type", attr::PRE_PROXY_TYPE),
            Component::PostProxy => ("Post-Proxy-Type", attr::POST_PROXY_TYPE),
            Component::PostAuth => ("Post-Auth-Type", attr::POST_AUTH_TYPE),
            Component::RecvCoA => ("Recv-CoA-Type", attr::RECV_COA_TYPE),
            Component::SendCoA => ("Send-CoA-Type", attr::SEND_COA_TYPE),
        };
        Some(TypeAttribute { name, number })
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.section())
    }
}

/// Optional server features that gate which components are compiled
///
/// Replaces build-time switches: a component whose capability is off is
/// never compiled, so dispatching to it always yields its default result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Accounting support (`accounting`)
    #[serde(default = "default_true")]
    pub accounting: bool,
    /// Session management (`session`)
    #[serde(default = "default_true")]
    pub session: bool,
    /// Requests may be proxied (`pre-proxy`, `post-proxy`)
    #[serde(default)]
    pub proxy: bool,
    /// Change-of-Authorization support (`recv-coa`, `send-coa`)
    #[serde(default = "default_true")]
    pub coa: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities {
            accounting: true,
            session: true,
            proxy: false,
            coa: true,
        }
    }
}

impl Capabilities {
    /// Everything enabled, including proxying
    pub fn all() -> Self {
        Capabilities {
            accounting: true,
            session: true,
            proxy: true,
            coa: true,
        }
    }

    /// Components known to this server at all
    ///
    /// CoA components do not exist without CoA support; their sections are
    /// then not recognised during bootstrap or compile.
    pub fn components(&self) -> impl Iterator<Item = Component> + '_ {
        Component::ALL
            .into_iter()
            .filter(|c| self.coa || !matches!(c, Component::RecvCoA | Component::SendCoA))
    }

    /// Whether a present, non-empty section for `component` gets compiled
    pub fn compiles(&self, component: Component) -> bool {
        match component {
            Component::PreProxy | Component::PostProxy => self.proxy,
            Component::Accounting => self.accounting,
            Component::Session => self.session,
            Component::RecvCoA | Component::SendCoA => self.coa,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_names_round_trip() {
        for comp in Component::ALL {
            assert_eq!(Component::from_section(comp.section()), Some(comp));
        }
        assert_eq!(Component::from_section("listen"), None);
    }

    #[test]
    fn test_default_results() {
        assert_eq!(Component::Authenticate.default_result(), Rcode::Reject);
        assert_eq!(Component::Authorize.default_result(), Rcode::NotFound);
        assert_eq!(Component::Session.default_result(), Rcode::Fail);
        assert_eq!(Component::PostAuth.default_result(), Rcode::Noop);
    }

    #[test]
    fn test_preacct_has_no_type_attribute() {
        assert!(Component::PreAccounting.type_attribute().is_none());
        let auth = Component::Authenticate.type_attribute().unwrap();
        assert_eq!(auth.name, "Auth-Type");
        assert_eq!(auth.number, attr::AUTH_TYPE);
    }

    #[test]
    fn test_capability_gating() {
        let caps = Capabilities::default();
        assert!(!caps.compiles(Component::PreProxy));
        assert!(caps.compiles(Component::Accounting));

        let caps = Capabilities {
            coa: false,
            ..Capabilities::default()
        };
        assert_eq!(caps.components().count(), 8);
        assert!(!caps.compiles(Component::RecvCoA));
    }
}
