//! RADIUS Virtual Servers
//!
//! Loads named virtual servers from a configuration tree, takes them through
//! the bootstrap, compile, instantiate and open phases, and routes requests
//! to their compiled policy sections.
//!
//! # Features
//!
//! - Namespace servers backed by pluggable protocol modules
//! - Old-style servers with `authorize`, `authenticate`, ... sections
//! - Dynamic `Auth-Type`-style values minted at bootstrap
//! - Pluggable policy interpreter
//! - JSON configuration
//!
//! # Example
//!
//! ```rust
//! use radius_policy::{Component, ConfigSection, MemoryDictionary, Rcode, Request};
//! use radius_vserver::{
//!     CompileError, CompiledSection, Environment, Interpreter, ModuleLoader, VirtualServers,
//! };
//! use std::sync::Arc;
//!
//! struct AlwaysOk;
//!
//! impl Interpreter for AlwaysOk {
//!     fn compile(
//!         &self,
//!         cs: &ConfigSection,
//!         _: Component,
//!     ) -> Result<CompiledSection, CompileError> {
//!         Ok(CompiledSection::new(cs, ()))
//!     }
//!
//!     fn run(&self, _: &CompiledSection, _: &mut Request, _: Rcode) -> Rcode {
//!         Rcode::Ok
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigSection::new("config").with_section(
//!     ConfigSection::named("server", "inner")
//!         .with_section(ConfigSection::new("authorize").with_bare("files")),
//! );
//! let env = Environment::new(
//!     Arc::new(MemoryDictionary::internal()),
//!     Arc::new(AlwaysOk),
//!     Arc::new(ModuleLoader::new()),
//! );
//!
//! let mut servers = VirtualServers::bootstrap(config, env)?;
//! servers.compile()?;
//! servers.instantiate()?;
//!
//! let mut request = Request::new(1, "inner");
//! assert_eq!(servers.authorize(0, &mut request), Rcode::Ok);
//! assert_eq!(servers.post_auth(0, &mut request), Rcode::Noop);
//! # Ok(())
//! # }
//! ```

pub mod binder;
pub mod compile;
pub mod config;
mod dispatch;
pub mod error;
pub mod interpreter;
pub mod legacy;
pub mod module;
pub mod server;
pub mod types;

pub use binder::{Binding, ConfigBinder, Listener};
pub use compile::ComponentCompiler;
pub use config::{Config, ValueDef};
pub use error::{VirtualServerError, VirtualServerResult};
pub use interpreter::{CompileError, CompiledSection, Interpreter};
pub use module::{
    LegacyListeners, ModuleError, ModuleFactory, ModuleLoader, ModuleResolver, NoLegacyListeners,
    ProtocolModule, Scheduler,
};
pub use server::{CompiledComponent, Environment, Phase, VirtualServer, VirtualServers};
pub use types::TypeRegistrar;
