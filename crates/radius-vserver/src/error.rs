//! Virtual server error types

use crate::interpreter::CompileError;
use crate::module::ModuleError;
use radius_policy::{ConfigError, Location};
use thiserror::Error;

/// Errors raised while loading virtual servers
///
/// Every one of these is fatal to the lifecycle call that produced it.
/// Dispatch never returns an error; lookup failures there become an
/// [`Rcode`](radius_policy::Rcode) instead.
#[derive(Error, Debug)]
pub enum VirtualServerError {
    /// Missing or duplicate names, nameless sections, mixed configuration styles
    #[error("Schema error: {location}: {message}")]
    Schema { location: Location, message: String },

    /// Missing attribute, reserved value, unresolvable type name
    #[error("Dictionary error: {location}: {message}")]
    Dictionary { location: Location, message: String },

    /// The interpreter rejected a section
    #[error("Compile error: failed to load virtual server \"{server}\": errors parsing {section} section: {source}")]
    Compile {
        server: String,
        section: String,
        #[source]
        source: CompileError,
    },

    /// A protocol module could not be loaded, or one of its hooks failed
    #[error("Module error: {phase} failed for listener {namespace} in virtual server \"{server}\" ({location}): {source}")]
    Module {
        server: String,
        namespace: String,
        phase: &'static str,
        location: Location,
        #[source]
        source: ModuleError,
    },

    /// Lifecycle phases called out of order, or a precondition was violated
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// The configuration could not be read
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl VirtualServerError {
    pub(crate) fn schema(location: &Location, message: impl Into<String>) -> Self {
        VirtualServerError::Schema {
            location: location.clone(),
            message: message.into(),
        }
    }

    pub(crate) fn dictionary(location: &Location, message: impl Into<String>) -> Self {
        VirtualServerError::Dictionary {
            location: location.clone(),
            message: message.into(),
        }
    }
}

/// Result type for virtual server operations
pub type VirtualServerResult<T> = Result<T, VirtualServerError>;
