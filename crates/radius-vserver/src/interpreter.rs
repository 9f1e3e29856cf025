//! Policy interpreter interface
//!
//! The interpreter turns a configuration section into something it can run,
//! and runs it against a request. The virtual-server core never looks inside
//! a compiled program; it only stores it and hands it back.

use radius_policy::{Component, ConfigSection, Location, Rcode, Request};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// The interpreter rejected a section
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{location}: {message}")]
pub struct CompileError {
    pub location: Location,
    pub message: String,
}

impl CompileError {
    pub fn new(section: &ConfigSection, message: impl Into<String>) -> Self {
        CompileError {
            location: section.location.clone(),
            message: message.into(),
        }
    }
}

/// Executable form of one configuration section
///
/// Immutable once built. Cloning shares the program.
#[derive(Clone)]
pub struct CompiledSection {
    name: String,
    location: Location,
    program: Arc<dyn Any + Send + Sync>,
}

impl CompiledSection {
    pub fn new<P: Any + Send + Sync>(section: &ConfigSection, program: P) -> Self {
        CompiledSection {
            name: section.display_name(),
            location: section.location.clone(),
            program: Arc::new(program),
        }
    }

    /// `name1 name2` of the section this was compiled from
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// The interpreter's program, if it is of type `P`
    pub fn program<P: Any>(&self) -> Option<&P> {
        self.program.downcast_ref::<P>()
    }
}

impl fmt::Debug for CompiledSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSection")
            .field("name", &self.name)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

/// Compiles and runs policy sections
///
/// `run` is called concurrently from many requests and must not mutate
/// shared state.
pub trait Interpreter: Send + Sync {
    /// Compile `section` for use by `component`
    fn compile(
        &self,
        section: &ConfigSection,
        component: Component,
    ) -> Result<CompiledSection, CompileError>;

    /// Run a compiled section, using `default` where the section itself has no opinion
    fn run(&self, section: &CompiledSection, request: &mut Request, default: Rcode) -> Rcode;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_downcast() {
        let section =
            ConfigSection::named("Auth-Type", "PAP").at(Location::new("sites/default", 40));
        let compiled = CompiledSection::new(&section, vec!["pap".to_string()]);

        assert_eq!(compiled.name(), "Auth-Type PAP");
        assert_eq!(compiled.location().line, Some(40));
        assert_eq!(compiled.program::<Vec<String>>().unwrap()[0], "pap");
        assert!(compiled.program::<u32>().is_none());
    }

    #[test]
    fn test_compile_error_names_location() {
        let section = ConfigSection::new("authorize").at(Location::new("sites/inner", 7));
        let err = CompileError::new(&section, "unknown module 'filez'");
        assert_eq!(err.to_string(), "sites/inner:7: unknown module 'filez'");
    }
}
