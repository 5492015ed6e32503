//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name used inside the configuration directory.
pub const CONFIG_FILE_NAME: &str = "config.ron";

/// Top-level process configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Transport and polling settings.
    pub network: NetworkConfig,
    /// Channels of the cluster roles this process talks to.
    pub cluster: ClusterConfig,
    /// DC schema location and handshake settings.
    pub schema: SchemaConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address of the message director or client agent.
    pub host: String,
    /// Message director port used by internal (AI/UberDOG) connections.
    pub internal_port: u16,
    /// Client agent port used by client connections.
    pub client_port: u16,
    /// Datagram polls per second in `poll_forever`.
    pub poll_rate_hz: f64,
    /// Seconds between client heartbeats.
    pub heartbeat_seconds: u32,
    /// Largest datagram payload accepted or sent, in bytes.
    pub max_datagram_size: u16,
}

/// Channels of the Astron roles an internal repository addresses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClusterConfig {
    /// Fixed AI channel; a unique channel is allocated when `None`.
    pub ai_channel: Option<u64>,
    /// State server channel.
    pub state_server_channel: u64,
    /// Database state server channel.
    pub dbss_channel: u64,
    /// Name announced to the message director for its logs.
    pub connection_name: Option<String>,
}

/// DC schema settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchemaConfig {
    /// Path of the DC file shared with the cluster.
    pub dc_file: PathBuf,
    /// Version string sent in the client hello.
    pub client_version: String,
    /// Handshake hash override; computed from the parsed schema when `None`.
    pub dc_hash: Option<u32>,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "astron_net=trace").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            internal_port: 7199,
            client_port: 6667,
            poll_rate_hz: 30.0,
            heartbeat_seconds: 10,
            max_datagram_size: u16::MAX,
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            ai_channel: None,
            state_server_channel: 400_000,
            dbss_channel: 400_001,
            connection_name: None,
        }
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            dc_file: PathBuf::from("example.dc"),
            client_version: "astron-dev".to_string(),
            dc_hash: None,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

// --- Persistence ---

impl Config {
    /// Per-user configuration directory, `<config_dir>/astron`.
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("astron"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Where `config.ron` lives inside `config_dir`.
    pub fn file_path(config_dir: &Path) -> PathBuf {
        config_dir.join(CONFIG_FILE_NAME)
    }

    /// Read `config.ron` from `config_dir`; a missing file is replaced by a
    /// freshly written default.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = Self::file_path(config_dir);
        if !path.exists() {
            let config = Self::default();
            config.save(config_dir)?;
            log::info!("wrote default configuration to {}", path.display());
            return Ok(config);
        }
        let config = Self::read(&path)?;
        log::info!("configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Write this configuration as pretty RON, creating `config_dir` if needed.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        let style = ron::ser::PrettyConfig::new()
            .depth_limit(2)
            .struct_names(false)
            .enumerate_arrays(false);
        let text = ron::ser::to_string_pretty(self, style).map_err(ConfigError::SerializeError)?;

        std::fs::create_dir_all(config_dir)
            .and_then(|()| std::fs::write(Self::file_path(config_dir), text))
            .map_err(ConfigError::WriteError)
    }

    /// Re-read the file; `Some` only when it differs from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let fresh = Self::read(&Self::file_path(config_dir))?;
        if fresh == *self {
            return Ok(None);
        }
        log::info!("configuration changed on disk");
        Ok(Some(fresh))
    }

    /// Reject values no repository can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let rate = self.network.poll_rate_hz;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "network.poll_rate_hz",
                reason: format!("{rate} is not a positive rate"),
            });
        }
        if self.network.internal_port == 0 || self.network.client_port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "network",
                reason: "ports must be non-zero".to_string(),
            });
        }
        if self.network.max_datagram_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "network.max_datagram_size",
                reason: "must allow at least one byte".to_string(),
            });
        }
        Ok(())
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        ron::from_str(&contents).map_err(ConfigError::ParseError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_cluster_ports() {
        let text = ron::ser::to_string(&Config::default()).unwrap();
        for expected in ["internal_port:7199", "client_port:6667", "state_server_channel:400000"] {
            assert!(text.contains(expected), "{expected} missing from {text}");
        }
    }

    #[test]
    fn test_optional_channels_survive_ron() {
        let mut config = Config::default();
        config.cluster.ai_channel = Some(5_000);
        config.cluster.connection_name = Some("ai-1".to_string());
        config.schema.dc_hash = Some(0xDEAD_BEEF);

        let back: Config = ron::from_str(&ron::ser::to_string(&config).unwrap()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = ron::from_str("(network: (host: \"10.0.0.2\"))").unwrap();
        assert_eq!(config.network.host, "10.0.0.2");
        assert_eq!(config.network.internal_port, 7199);
        assert_eq!(config.cluster, ClusterConfig::default());
        assert_eq!(config.schema, SchemaConfig::default());
    }

    #[test]
    fn test_unknown_keys_tolerated() {
        let config: Config = ron::from_str("(future_setting: true, debug: (log_level: \"trace\"))").unwrap();
        assert_eq!(config.debug.log_level, "trace");
    }

    #[test]
    fn test_saved_file_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("astron");
        let mut config = Config::default();
        config.network.host = "10.0.0.1".to_string();
        config.network.poll_rate_hz = 60.0;
        config.schema.dc_file = PathBuf::from("game.dc");

        config.save(&nested).unwrap();
        assert_eq!(Config::load_or_create(&nested).unwrap(), config);
    }

    #[test]
    fn test_first_run_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Config::load_or_create(dir.path()).unwrap(), Config::default());
        assert!(Config::file_path(dir.path()).exists());
    }

    #[test]
    fn test_reload_reports_only_changes() {
        let dir = tempfile::tempdir().unwrap();
        let original = Config::default();
        original.save(dir.path()).unwrap();
        assert!(original.reload(dir.path()).unwrap().is_none());

        let mut edited = original.clone();
        edited.network.poll_rate_hz = 10.0;
        edited.save(dir.path()).unwrap();
        let reloaded = original.reload(dir.path()).unwrap();
        assert_eq!(reloaded.map(|c| c.network.poll_rate_hz), Some(10.0));
    }

    #[test]
    fn test_reload_missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::default().reload(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { ref path, .. } if path.ends_with(CONFIG_FILE_NAME)));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(Config::file_path(dir.path()), "(network: [oops").unwrap();
        assert!(matches!(
            Config::load_or_create(dir.path()),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_poll_rate() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.network.poll_rate_hz = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "network.poll_rate_hz",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_port() {
        let mut config = Config::default();
        config.network.client_port = 0;
        assert!(config.validate().is_err());
    }
}
