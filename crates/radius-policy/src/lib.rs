//! RADIUS Policy Data Model
//!
//! Shared types for building and running virtual-server policies:
//!
//! - [`Component`] - the fixed processing stages and their defaults
//! - [`Rcode`] - section return codes
//! - [`ConfigSection`] - the parsed configuration tree
//! - [`Dictionary`] - attribute and enumeration lookups
//! - [`Request`] - per-request processing context
//!
//! # Example
//!
//! ```rust
//! use radius_policy::{Component, Dictionary, MemoryDictionary, Rcode};
//!
//! let dict = MemoryDictionary::internal();
//! let auth_type = Component::Authenticate.type_attribute().unwrap();
//! let da = dict.attr_by_num(auth_type.number).unwrap();
//! assert_eq!(da.name, "Auth-Type");
//!
//! assert_eq!(Component::Authorize.default_result(), Rcode::NotFound);
//! ```

pub mod component;
pub mod conf;
pub mod dict;
pub mod rcode;
pub mod request;

pub use component::{Capabilities, Component, TypeAttribute};
pub use conf::{ConfigError, ConfigItem, ConfigPair, ConfigSection, Location};
pub use dict::{DictAttr, DictEnum, Dictionary, DictionaryError, MemoryDictionary};
pub use rcode::{Rcode, UnknownRcode};
pub use request::{Request, SimulState};
