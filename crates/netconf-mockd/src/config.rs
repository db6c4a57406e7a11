//! Server configuration

use crate::{Result, ServerError};
use netconf_proto::capability::{BASE_1_0, BASE_1_1, INTERLEAVE_1_0};
use netconf_proto::Element;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Simulated device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// TCP listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Session identifier handed to the first client
    #[serde(default = "default_session_id_start")]
    pub session_id_start: u32,

    /// Maximum concurrent sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Capabilities advertised in the server hello
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<String>,

    /// Withhold base:1.1 so every session uses end-of-message framing
    #[serde(default)]
    pub force_base_1_0: bool,

    /// Running datastore content: zero or more XML elements
    #[serde(default = "default_running")]
    pub running: String,

    /// Candidate datastore content; the datastore does not exist when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<String>,

    /// YANG module text served by `<get-schema>`, keyed by module name
    #[serde(default)]
    pub schemas: BTreeMap<String, String>,

    /// Event elements replayed to each new subscriber
    #[serde(default)]
    pub notifications: Vec<String>,
}

fn default_listen() -> String {
    "127.0.0.1:8300".to_string()
}

fn default_session_id_start() -> u32 {
    1
}

fn default_max_sessions() -> usize {
    16
}

fn default_capabilities() -> Vec<String> {
    vec![
        BASE_1_0.to_string(),
        BASE_1_1.to_string(),
        "urn:ietf:params:netconf:capability:notification:1.0?module=ietf-notifications".to_string(),
        INTERLEAVE_1_0.to_string(),
        "urn:ietf:params:xml:ns:yang:ietf-netconf-monitoring?module=ietf-netconf-monitoring&revision=2010-10-04"
            .to_string(),
    ]
}

fn default_running() -> String {
    r#"<system xmlns="urn:example:system"><hostname>mockd</hostname></system>"#.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            session_id_start: default_session_id_start(),
            max_sessions: default_max_sessions(),
            capabilities: default_capabilities(),
            force_base_1_0: false,
            running: default_running(),
            candidate: None,
            schemas: BTreeMap::new(),
            notifications: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: ServerConfig = toml::from_str(&contents)
            .map_err(|e| ServerError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ServerError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }

    /// Check that every XML snippet parses
    pub fn validate(&self) -> Result<()> {
        parse_fragment("running", &self.running)?;
        if let Some(candidate) = &self.candidate {
            parse_fragment("candidate", candidate)?;
        }
        for (i, event) in self.notifications.iter().enumerate() {
            Element::parse(event).map_err(|e| {
                ServerError::Config(format!("notification #{} is not valid XML: {}", i + 1, e))
            })?;
        }
        if self.capabilities.iter().all(|c| c != BASE_1_0 && c != BASE_1_1) {
            tracing::warn!("No base capability advertised; every client will be refused");
        }
        Ok(())
    }

    /// Capabilities as sent in the hello
    pub fn advertised_capabilities(&self) -> Vec<String> {
        self.capabilities
            .iter()
            .filter(|c| !(self.force_base_1_0 && c.as_str() == BASE_1_1))
            .cloned()
            .collect()
    }
}

/// Parse a sequence of sibling elements
pub(crate) fn parse_fragment(name: &str, xml: &str) -> Result<Vec<Element>> {
    Element::parse(&format!("<fragment>{}</fragment>", xml))
        .map(|wrapper| wrapper.children)
        .map_err(|e| ServerError::Config(format!("{} datastore is not valid XML: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.session_id_start, 1);
        assert!(config.capabilities.iter().any(|c| c == BASE_1_1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_force_base_1_0() {
        let config = ServerConfig {
            force_base_1_0: true,
            ..Default::default()
        };
        let advertised = config.advertised_capabilities();
        assert!(advertised.iter().any(|c| c == BASE_1_0));
        assert!(!advertised.iter().any(|c| c == BASE_1_1));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mockd.toml");
        std::fs::write(
            &path,
            r#"
listen = "127.0.0.1:0"
running = "<interfaces xmlns='urn:x'><interface><name>eth0</name></interface></interfaces>"
notifications = ["<link-down xmlns='urn:x'><if>eth0</if></link-down>"]

[schemas]
acme = "module acme { }"
"#,
        )
        .unwrap();

        let config = ServerConfig::load_from_file(&path).unwrap();
        assert_eq!(config.listen, "127.0.0.1:0");
        assert_eq!(config.schemas.get("acme").map(String::as_str), Some("module acme { }"));
        assert_eq!(config.notifications.len(), 1);
    }

    #[test]
    fn test_invalid_xml_rejected() {
        let config = ServerConfig {
            running: "<system>".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ServerError::Config(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mockd.toml");
        let config = ServerConfig {
            candidate: Some("<system/>".to_string()),
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();

        let loaded = ServerConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.candidate.as_deref(), Some("<system/>"));
        assert_eq!(loaded.capabilities, config.capabilities);
    }
}
