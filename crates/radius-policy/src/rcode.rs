//! Section return codes
//!
//! Every compiled section, and every component that has no section to run,
//! produces exactly one of these outcomes. Precedence between outcomes is
//! the interpreter's business; this module only names them.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Outcome of running a policy section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Rcode {
    /// The request was rejected
    Reject = 0,
    /// A module failed, the request could not be processed
    Fail = 1,
    /// The section ran successfully
    Ok = 2,
    /// A module handled the request itself, stop processing
    Handled = 3,
    /// The request was malformed
    Invalid = 4,
    /// The user is locked out
    Userlock = 5,
    /// The user or data was not found
    NotFound = 6,
    /// Nothing was done
    Noop = 7,
    /// The request was modified
    Updated = 8,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown return code: {0}")]
pub struct UnknownRcode(pub String);

impl Rcode {
    /// All outcomes, ordered by numeric value
    pub const ALL: [Rcode; 9] = [
        Rcode::Reject,
        Rcode::Fail,
        Rcode::Ok,
        Rcode::Handled,
        Rcode::Invalid,
        Rcode::Userlock,
        Rcode::NotFound,
        Rcode::Noop,
        Rcode::Updated,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Configuration-file name of the outcome
    pub fn as_str(self) -> &'static str {
        match self {
            Rcode::Reject => "reject",
            Rcode::Fail => "fail",
            Rcode::Ok => "ok",
            Rcode::Handled => "handled",
            Rcode::Invalid => "invalid",
            Rcode::Userlock => "userlock",
            Rcode::NotFound => "notfound",
            Rcode::Noop => "noop",
            Rcode::Updated => "updated",
        }
    }
}

impl fmt::Display for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rcode {
    type Err = UnknownRcode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|rcode| rcode.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownRcode(s.to_string()))
    }
}
