//! Client configuration

use crate::{DeviceProfile, NetconfError, Result, SessionOptions};
use netconf_transport::{Credentials, Target, TransportKind, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Device address
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Private key for public key authentication; takes precedence over the password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_passphrase: Option<String>,

    #[serde(default)]
    pub device_profile: DeviceProfile,

    /// Require the device host key to be in `known_hosts`
    #[serde(default)]
    pub verify_host_key: bool,

    #[serde(default)]
    pub transport: TransportKind,

    /// Connection timeout (seconds)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Hello exchange timeout (seconds)
    #[serde(default = "default_hello_timeout")]
    pub hello_timeout: u64,

    /// Per-RPC timeout (seconds)
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout: u64,

    /// Notifications buffered before new ones are dropped
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_hello_timeout() -> u64 {
    10
}

fn default_rpc_timeout() -> u64 {
    30
}

fn default_notification_capacity() -> usize {
    1024
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: None,
            password: None,
            key_path: None,
            key_passphrase: None,
            device_profile: DeviceProfile::default(),
            verify_host_key: false,
            transport: TransportKind::default(),
            connect_timeout: default_connect_timeout(),
            hello_timeout: default_hello_timeout(),
            rpc_timeout: default_rpc_timeout(),
            notification_capacity: default_notification_capacity(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| NetconfError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| NetconfError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }

    /// Credentials from the configured username, key and password
    pub fn credentials(&self) -> Credentials {
        let Some(username) = self.username.clone() else {
            return Credentials::None;
        };

        match (&self.key_path, &self.password) {
            (Some(path), _) => Credentials::KeyFile {
                username,
                path: path.clone(),
                passphrase: self.key_passphrase.clone(),
            },
            (None, Some(password)) => Credentials::Password {
                username,
                password: password.clone(),
            },
            (None, None) => Credentials::Password {
                username,
                password: String::new(),
            },
        }
    }

    pub fn target(&self) -> Target {
        Target::new(self.host.clone(), self.port)
            .with_credentials(self.credentials())
            .with_host_key_verification(self.verify_host_key)
            .with_timeout(Duration::from_secs(self.connect_timeout))
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            profile: self.device_profile,
            hello_timeout: Duration::from_secs(self.hello_timeout),
            rpc_timeout: Duration::from_secs(self.rpc_timeout),
            notification_capacity: self.notification_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = ClientConfig::load_from_file(file.path()).unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 830);
        assert_eq!(config.device_profile, DeviceProfile::Default);
        assert_eq!(config.transport, TransportKind::Ssh);
        assert_eq!(config.rpc_timeout, 30);
        assert!(matches!(config.credentials(), Credentials::None));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("netconf-tool.toml");

        let config = ClientConfig {
            host: "10.0.0.1".to_string(),
            username: Some("admin".to_string()),
            password: Some("admin".to_string()),
            device_profile: DeviceProfile::Junos,
            transport: TransportKind::Tcp,
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();

        let loaded = ClientConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.host, "10.0.0.1");
        assert_eq!(loaded.device_profile, DeviceProfile::Junos);
        assert_eq!(loaded.transport, TransportKind::Tcp);
        assert!(matches!(loaded.credentials(), Credentials::Password { .. }));
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.toml");
        std::fs::write(
            &path,
            "host = \"router1\"\nusername = \"ops\"\nkey_path = \"/home/ops/.ssh/id_ed25519\"\ndevice_profile = \"nexus\"\nhello_timeout = 3\n",
        )
        .unwrap();

        let config = ClientConfig::load_from_file(&path).unwrap();
        let target = config.target();
        assert_eq!(target.peer(), "router1:830");
        assert!(matches!(target.credentials, Credentials::KeyFile { .. }));
        assert_eq!(config.session_options().hello_timeout, Duration::from_secs(3));
        assert_eq!(config.session_options().profile, DeviceProfile::Nexus);
    }

    #[test]
    fn test_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.toml");
        std::fs::write(&path, "port = \"not a number\"").unwrap();

        let err = ClientConfig::load_from_file(&path).unwrap_err();
        assert!(matches!(err, NetconfError::Config(_)));
    }
}
