//! Attribute dictionary
//!
//! Maps attribute names to numbers, and enumeration aliases to values
//! (`VALUE Auth-Type PAP 1`). The virtual-server code only relies on the
//! [`Dictionary`] trait; [`MemoryDictionary`] is a thread-safe in-process
//! implementation.

use crate::component::Component;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DictionaryError {
    #[error("No such attribute {0}")]
    UnknownAttribute(String),
    #[error("Attribute {name} ({number}) is already defined")]
    DuplicateAttribute { name: String, number: u32 },
    #[error("Duplicate VALUE {alias} for attribute {attr}")]
    DuplicateAlias { attr: String, alias: String },
    #[error("Value {value} of attribute {attr} is already used by {existing}")]
    DuplicateValue {
        attr: String,
        value: u32,
        existing: String,
    },
}

/// A dictionary attribute
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DictAttr {
    pub name: String,
    pub number: u32,
}

/// One enumeration value of an attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictEnum {
    pub alias: String,
    pub value: u32,
}

/// Dictionary lookups needed by the virtual-server core
pub trait Dictionary: Send + Sync {
    fn attr_by_num(&self, number: u32) -> Option<DictAttr>;

    fn attr_by_name(&self, name: &str) -> Option<DictAttr>;

    fn enum_by_alias(&self, attr: &DictAttr, alias: &str) -> Option<DictEnum>;

    fn enum_by_value(&self, attr: &DictAttr, value: u32) -> Option<DictEnum>;

    /// Add `alias = value` to an attribute
    ///
    /// Fails if either the alias or the value is already in use.
    fn add_enum_alias(
        &self,
        attr: &DictAttr,
        alias: &str,
        value: u32,
    ) -> Result<(), DictionaryError>;
}

#[derive(Debug, Default)]
struct EnumTable {
    by_alias: HashMap<String, u32>,
    by_value: HashMap<u32, String>,
}

#[derive(Debug)]
struct AttrEntry {
    attr: DictAttr,
    values: RwLock<EnumTable>,
}

/// In-memory dictionary
#[derive(Debug, Default)]
pub struct MemoryDictionary {
    attrs: DashMap<u32, Arc<AttrEntry>>,
    names: DashMap<String, u32>,
}

impl MemoryDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dictionary preloaded with the type attribute of every component
    pub fn internal() -> Self {
        let dict = Self::new();
        for comp in Component::ALL {
            if let Some(ta) = comp.type_attribute() {
                // Numbers and names in the component table are distinct
                let _ = dict.add_attribute(ta.name, ta.number);
            }
        }
        dict
    }

    pub fn add_attribute(
        &self,
        name: impl Into<String>,
        number: u32,
    ) -> Result<DictAttr, DictionaryError> {
        let name = name.into();
        if self.attrs.contains_key(&number) || self.names.contains_key(&name) {
            return Err(DictionaryError::DuplicateAttribute { name, number });
        }

        let attr = DictAttr {
            name: name.clone(),
            number,
        };
        self.attrs.insert(
            number,
            Arc::new(AttrEntry {
                attr: attr.clone(),
                values: RwLock::new(EnumTable::default()),
            }),
        );
        self.names.insert(name, number);
        Ok(attr)
    }

    /// Define `VALUE <attr> <alias> <value>` by attribute name
    pub fn add_value(&self, attr: &str, alias: &str, value: u32) -> Result<(), DictionaryError> {
        let da = self
            .attr_by_name(attr)
            .ok_or_else(|| DictionaryError::UnknownAttribute(attr.to_string()))?;
        self.add_enum_alias(&da, alias, value)
    }

    /// All values of an attribute, sorted by alias
    pub fn values(&self, attr: &DictAttr) -> Vec<DictEnum> {
        let Some(entry) = self.entry(attr) else {
            return Vec::new();
        };
        let table = entry.values.read();
        let mut values: Vec<DictEnum> = table
            .by_alias
            .iter()
            .map(|(alias, value)| DictEnum {
                alias: alias.clone(),
                value: *value,
            })
            .collect();
        values.sort_by(|a, b| a.alias.cmp(&b.alias));
        values
    }

    fn entry(&self, attr: &DictAttr) -> Option<Arc<AttrEntry>> {
        self.attrs.get(&attr.number).map(|e| Arc::clone(e.value()))
    }
}

impl Dictionary for MemoryDictionary {
    fn attr_by_num(&self, number: u32) -> Option<DictAttr> {
        self.attrs.get(&number).map(|e| e.attr.clone())
    }

    fn attr_by_name(&self, name: &str) -> Option<DictAttr> {
        let number = *self.names.get(name)?;
        self.attr_by_num(number)
    }

    fn enum_by_alias(&self, attr: &DictAttr, alias: &str) -> Option<DictEnum> {
        let entry = self.entry(attr)?;
        let table = entry.values.read();
        table.by_alias.get(alias).map(|value| DictEnum {
            alias: alias.to_string(),
            value: *value,
        })
    }

    fn enum_by_value(&self, attr: &DictAttr, value: u32) -> Option<DictEnum> {
        let entry = self.entry(attr)?;
        let table = entry.values.read();
        table.by_value.get(&value).map(|alias| DictEnum {
            alias: alias.clone(),
            value,
        })
    }

    fn add_enum_alias(
        &self,
        attr: &DictAttr,
        alias: &str,
        value: u32,
    ) -> Result<(), DictionaryError> {
        let entry = self
            .entry(attr)
            .ok_or_else(|| DictionaryError::UnknownAttribute(attr.name.clone()))?;
        let mut table = entry.values.write();

        if table.by_alias.contains_key(alias) {
            return Err(DictionaryError::DuplicateAlias {
                attr: attr.name.clone(),
                alias: alias.to_string(),
            });
        }
        if let Some(existing) = table.by_value.get(&value) {
            return Err(DictionaryError::DuplicateValue {
                attr: attr.name.clone(),
                value,
                existing: existing.clone(),
            });
        }

        debug!(attribute = %attr.name, alias = alias, value = value, "Adding dictionary value");
        table.by_alias.insert(alias.to_string(), value);
        table.by_value.insert(value, alias.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::attr;

    #[test]
    fn test_internal_dictionary_has_component_attributes() {
        let dict = MemoryDictionary::internal();
        let auth = dict.attr_by_num(attr::AUTH_TYPE).unwrap();
        assert_eq!(auth.name, "Auth-Type");
        assert_eq!(dict.attr_by_name("Send-CoA-Type").unwrap().number, attr::SEND_COA_TYPE);
        assert!(dict.attr_by_name("Pre-Acct-Type").is_none());
    }

    #[test]
    fn test_enum_lookup_both_ways() {
        let dict = MemoryDictionary::internal();
        dict.add_value("Auth-Type", "PAP", 1).unwrap();
        let auth = dict.attr_by_name("Auth-Type").unwrap();

        assert_eq!(dict.enum_by_alias(&auth, "PAP").unwrap().value, 1);
        assert_eq!(dict.enum_by_value(&auth, 1).unwrap().alias, "PAP");
        assert!(dict.enum_by_value(&auth, 2).is_none());
    }

    #[test]
    fn test_duplicates_rejected() {
        let dict = MemoryDictionary::internal();
        dict.add_value("Auth-Type", "PAP", 1).unwrap();

        assert!(matches!(
            dict.add_value("Auth-Type", "PAP", 2),
            Err(DictionaryError::DuplicateAlias { .. })
        ));
        assert!(matches!(
            dict.add_value("Auth-Type", "CHAP", 1),
            Err(DictionaryError::DuplicateValue { .. })
        ));
        assert!(matches!(
            dict.add_attribute("Auth-Type", 4000),
            Err(DictionaryError::DuplicateAttribute { .. })
        ));
    }

    #[test]
    fn test_values_are_per_attribute() {
        let dict = MemoryDictionary::internal();
        dict.add_value("Auth-Type", "Local", 7).unwrap();
        dict.add_value("Acct-Type", "Local", 7).unwrap();

        let acct = dict.attr_by_name("Acct-Type").unwrap();
        assert_eq!(dict.values(&acct).len(), 1);
    }

    #[test]
    fn test_unknown_attribute() {
        let dict = MemoryDictionary::new();
        assert_eq!(
            dict.add_value("Auth-Type", "PAP", 1),
            Err(DictionaryError::UnknownAttribute("Auth-Type".to_string()))
        );
    }
}
