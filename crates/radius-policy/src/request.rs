//! Per-request processing context
//!
//! Only the fields the virtual-server core reads or restores live here; the
//! packet itself and its attribute lists belong to the protocol layer.

/// Simultaneous-use counters filled in by the `session` section
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulState {
    /// Sessions found for this user
    pub count: u32,
    /// Maximum sessions allowed
    pub max: u32,
    /// 1 for a plain double login, 2 for a multilink attempt
    pub mpp: u32,
}

/// Context of one in-flight request
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Request number, for log correlation
    pub id: u64,
    /// Virtual server the request is currently being processed by
    pub server: Option<String>,
    /// Module currently running, if any
    pub module: Option<String>,
    /// Section currently running, if any
    pub component: Option<&'static str>,
    /// User-Name of the request
    pub username: Option<String>,
    /// Whether the request is being proxied to a home server
    pub proxied: bool,
    pub simul: SimulState,
}

impl Request {
    pub fn new(id: u64, server: impl Into<String>) -> Self {
        Request {
            id,
            server: Some(server.into()),
            ..Request::default()
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_proxy(mut self) -> Self {
        self.proxied = true;
        self
    }
}
