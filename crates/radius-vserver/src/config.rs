use radius_policy::{Capabilities, ConfigError, MemoryDictionary};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Extra `VALUE` definition loaded into the dictionary at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueDef {
    /// Attribute the value belongs to, e.g. "Auth-Type"
    pub attribute: String,
    /// Value name, e.g. "PAP"
    pub name: String,
    pub value: u32,
}

/// Runtime configuration of the virtual-server host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level: "trace", "debug", "info", "warn", "error" (default: "info")
    #[serde(default)]
    pub log_level: Option<String>,

    /// Path of the virtual server definitions (JSON section tree)
    #[serde(default = "default_servers")]
    pub servers: String,

    /// Compile `pre-proxy` and `post-proxy` sections (default: false)
    #[serde(default)]
    pub proxy_requests: bool,

    /// Compile `accounting` sections (default: true)
    #[serde(default = "default_enabled")]
    pub accounting: bool,

    /// Compile `session` sections (default: true)
    #[serde(default = "default_enabled")]
    pub session: bool,

    /// Recognise `recv-coa` and `send-coa` sections (default: true)
    #[serde(default = "default_enabled")]
    pub coa: bool,

    /// Protocol namespaces listeners may use
    #[serde(default = "default_protocols")]
    pub protocols: Vec<String>,

    /// Values preloaded into the dictionary before bootstrap
    #[serde(default)]
    pub dictionary: Vec<ValueDef>,
}

fn default_servers() -> String {
    "sites-enabled.json".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_protocols() -> Vec<String> {
    vec!["radius".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: None,
            servers: default_servers(),
            proxy_requests: false,
            accounting: true,
            session: true,
            coa: true,
            protocols: default_protocols(),
            dictionary: vec![],
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Components this host compiles
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            accounting: self.accounting,
            session: self.session,
            proxy: self.proxy_requests,
            coa: self.coa,
        }
    }

    /// Build the dictionary: internal attributes plus the configured values
    pub fn dictionary(&self) -> Result<MemoryDictionary, ConfigError> {
        let dict = MemoryDictionary::internal();
        for def in &self.dictionary {
            dict.add_value(&def.attribute, &def.name, def.value)
                .map_err(|e| {
                    ConfigError::Invalid(format!(
                        "VALUE {} {} {}: {}",
                        def.attribute, def.name, def.value, e
                    ))
                })?;
        }
        Ok(dict)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.servers.is_empty() {
            return Err(ConfigError::Invalid("Servers path cannot be empty".to_string()));
        }

        if let Some(level) = &self.log_level
            && !matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error")
        {
            return Err(ConfigError::Invalid(format!("Invalid log level: {}", level)));
        }

        let mut seen = HashSet::new();
        for protocol in &self.protocols {
            if protocol.is_empty() {
                return Err(ConfigError::Invalid("Protocol namespace cannot be empty".to_string()));
            }
            if !seen.insert(protocol.as_str()) {
                return Err(ConfigError::Invalid(format!("Duplicate protocol: {}", protocol)));
            }
        }

        for def in &self.dictionary {
            if def.name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "VALUE for {} has an empty name",
                    def.attribute
                )));
            }
        }

        Ok(())
    }

    /// Create an example configuration file
    pub fn example() -> Self {
        Config {
            log_level: Some("info".to_string()),
            servers: "/etc/radius/sites-enabled.json".to_string(),
            proxy_requests: true,
            accounting: true,
            session: true,
            coa: true,
            protocols: vec!["radius".to_string(), "dhcpv4".to_string()],
            dictionary: vec![ValueDef {
                attribute: "Auth-Type".to_string(),
                name: "Accept".to_string(),
                value: 254,
            }],
        }
    }
}
