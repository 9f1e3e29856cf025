//! Configuration section tree
//!
//! The parsed form of a server configuration: named sections holding an
//! ordered list of pairs and subsections. A section has a first name (its
//! kind, e.g. `server`, `listen`, `Auth-Type`) and an optional second name
//! (its identity, e.g. the server name or `PAP`).
//!
//! ```text
//! server inner {
//!     authorize {
//!         files
//!     }
//!     authenticate {
//!         Auth-Type PAP {
//!             pap
//!         }
//!     }
//! }
//! ```
//!
//! Trees are normally produced by a configuration parser. They can also be
//! loaded from JSON, where each item is either `{"pair": {...}}` or
//! `{"section": {...}}`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Where an item was defined
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl Location {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Location {
            file: Some(file.into()),
            line: Some(line),
        }
    }

    fn is_unknown(&self) -> bool {
        self.file.is_none() && self.line.is_none()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "{}:{}", file, line),
            (Some(file), None) => f.write_str(file),
            (None, Some(line)) => write!(f, "<config>:{}", line),
            (None, None) => f.write_str("<config>"),
        }
    }
}

/// `attr = value`, or a bare word when `value` is absent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPair {
    pub attr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Location::is_unknown")]
    pub location: Location,
}

impl ConfigPair {
    pub fn new(attr: impl Into<String>, value: impl Into<String>) -> Self {
        ConfigPair {
            attr: attr.into(),
            value: Some(value.into()),
            location: Location::default(),
        }
    }

    pub fn bare(word: impl Into<String>) -> Self {
        ConfigPair {
            attr: word.into(),
            value: None,
            location: Location::default(),
        }
    }
}

/// One child of a section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigItem {
    Pair(ConfigPair),
    Section(ConfigSection),
}

/// A named configuration section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSection {
    pub name1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name2: Option<String>,
    #[serde(default)]
    pub items: Vec<ConfigItem>,
    #[serde(default, skip_serializing_if = "Location::is_unknown")]
    pub location: Location,
}

impl ConfigSection {
    pub fn new(name1: impl Into<String>) -> Self {
        ConfigSection {
            name1: name1.into(),
            name2: None,
            items: Vec::new(),
            location: Location::default(),
        }
    }

    pub fn named(name1: impl Into<String>, name2: impl Into<String>) -> Self {
        ConfigSection {
            name2: Some(name2.into()),
            ..ConfigSection::new(name1)
        }
    }

    /// Builder: append `attr = value`
    pub fn with_pair(mut self, attr: impl Into<String>, value: impl Into<String>) -> Self {
        self.items.push(ConfigItem::Pair(ConfigPair::new(attr, value)));
        self
    }

    /// Builder: append a bare word
    pub fn with_bare(mut self, word: impl Into<String>) -> Self {
        self.items.push(ConfigItem::Pair(ConfigPair::bare(word)));
        self
    }

    /// Builder: append a subsection
    pub fn with_section(mut self, section: ConfigSection) -> Self {
        self.items.push(ConfigItem::Section(section));
        self
    }

    /// Builder: set the location
    pub fn at(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    /// Name used in diagnostics: `name1 name2` or just `name1`
    pub fn display_name(&self) -> String {
        match &self.name2 {
            Some(name2) => format!("{} {}", self.name1, name2),
            None => self.name1.clone(),
        }
    }

    /// A section with no items at all
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn pairs(&self) -> impl Iterator<Item = &ConfigPair> {
        self.items.iter().filter_map(|item| match item {
            ConfigItem::Pair(pair) => Some(pair),
            ConfigItem::Section(_) => None,
        })
    }

    pub fn subsections(&self) -> impl Iterator<Item = &ConfigSection> {
        self.items.iter().filter_map(|item| match item {
            ConfigItem::Section(section) => Some(section),
            ConfigItem::Pair(_) => None,
        })
    }

    /// First pair called `attr`
    pub fn find_pair(&self, attr: &str) -> Option<&ConfigPair> {
        self.pairs().find(|pair| pair.attr == attr)
    }

    /// Value of the first pair called `attr`
    pub fn pair_value(&self, attr: &str) -> Option<&str> {
        self.find_pair(attr).and_then(|pair| pair.value.as_deref())
    }

    /// First subsection whose first name is `name1`, whatever its second name
    pub fn find_section(&self, name1: &str) -> Option<&ConfigSection> {
        self.subsections().find(|s| s.name1 == name1)
    }

    /// First subsection matching both names exactly
    pub fn find_section_named(&self, name1: &str, name2: Option<&str>) -> Option<&ConfigSection> {
        self.subsections()
            .find(|s| s.name1 == name1 && s.name2.as_deref() == name2)
    }

    /// All subsections whose first name is `name1`, in configuration order
    pub fn sections_named<'a>(
        &'a self,
        name1: &'a str,
    ) -> impl Iterator<Item = &'a ConfigSection> + 'a {
        self.subsections().filter(move |s| s.name1 == name1)
    }

    /// Load a section tree from a JSON file, stamping the file name into every node
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(&path)?;
        let mut section: ConfigSection = serde_json::from_str(&contents)?;
        section.set_file(&path.as_ref().display().to_string());
        Ok(section)
    }

    fn set_file(&mut self, file: &str) {
        if self.location.file.is_none() {
            self.location.file = Some(file.to_string());
        }
        for item in &mut self.items {
            match item {
                ConfigItem::Pair(pair) => {
                    if pair.location.file.is_none() {
                        pair.location.file = Some(file.to_string());
                    }
                }
                ConfigItem::Section(section) => section.set_file(file),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sample() -> ConfigSection {
        ConfigSection::named("server", "inner")
            .with_pair("namespace", "radius")
            .with_section(ConfigSection::new("authorize").with_bare("files"))
            .with_section(
                ConfigSection::new("authenticate")
                    .with_section(ConfigSection::named("Auth-Type", "PAP").with_bare("pap"))
                    .with_section(ConfigSection::named("Auth-Type", "CHAP").with_bare("chap")),
            )
    }

    #[test]
    fn test_lookup() {
        let server = sample();
        assert_eq!(server.pair_value("namespace"), Some("radius"));
        assert!(server.find_section("authorize").is_some());
        assert!(server.find_section("accounting").is_none());

        let auth = server.find_section("authenticate").unwrap();
        assert_eq!(auth.sections_named("Auth-Type").count(), 2);
        assert!(auth.find_section_named("Auth-Type", Some("CHAP")).is_some());
        assert!(auth.find_section_named("Auth-Type", None).is_none());
    }

    #[test]
    fn test_bare_word_has_no_value() {
        let server = sample();
        let authorize = server.find_section("authorize").unwrap();
        let files = authorize.find_pair("files").unwrap();
        assert!(files.value.is_none());
        assert!(authorize.pair_value("files").is_none());
    }

    #[test]
    fn test_display_name_and_location() {
        let section = ConfigSection::named("server", "inner").at(Location::new("sites/inner", 12));
        assert_eq!(section.display_name(), "server inner");
        assert_eq!(section.location.to_string(), "sites/inner:12");
        assert_eq!(Location::default().to_string(), "<config>");
    }

    #[test]
    fn test_from_file_stamps_location() {
        let json = r#"{
            "name1": "config",
            "items": [
                {"section": {"name1": "server", "name2": "inner", "items": [
                    {"pair": {"attr": "namespace", "value": "radius"}}
                ]}}
            ]
        }"#;
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let root = ConfigSection::from_file(file.path()).unwrap();
        let server = root.find_section("server").unwrap();
        let expected = file.path().display().to_string();
        assert_eq!(server.location.file.as_deref(), Some(expected.as_str()));
        assert_eq!(
            server.find_pair("namespace").unwrap().location.file.as_deref(),
            Some(expected.as_str())
        );
    }

    #[test]
    fn test_from_file_rejects_bad_json() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();
        assert!(matches!(
            ConfigSection::from_file(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
