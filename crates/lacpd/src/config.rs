//! Daemon configuration file support.
//!
//! Loads and validates lacpd settings from TOML.
//! Default location: /etc/sonic/lacpd.conf

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sonic_types::MacAddress;
use tracing::warn;

use crate::error::{LacpError, LacpResult};
use crate::system::SystemContext;
use crate::types::{DEFAULT_MAX_LAG_MEMBERS, DEFAULT_SYSTEM_PRIORITY};

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sonic/lacpd.conf";

/// System identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// System MAC; usually provided later through LACP_SYSTEM|global
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<MacAddress>,

    /// System priority
    #[serde(default = "default_system_priority")]
    pub priority: u16,
}

/// Engine limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum simultaneously selected members per LAG
    #[serde(default = "default_max_lag_members")]
    pub max_lag_members: usize,
}

/// Daemon loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Timer resolution of the main loop in milliseconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Default log filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Complete lacpd configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LacpdConfig {
    #[serde(default)]
    pub system: SystemConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub daemon: DaemonConfig,
}

fn default_system_priority() -> u16 {
    DEFAULT_SYSTEM_PRIORITY
}

fn default_max_lag_members() -> usize {
    DEFAULT_MAX_LAG_MEMBERS
}

fn default_tick_interval() -> u64 {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            mac: None,
            priority: default_system_priority(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_lag_members: default_max_lag_members(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            log_level: default_log_level(),
        }
    }
}

impl LacpdConfig {
    /// Loads configuration from `path`, falling back to defaults if the file
    /// does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> LacpResult<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| LacpError::ConfigFile {
                path: PathBuf::from(path),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(LacpError::Io(e)),
        }
    }

    /// Saves configuration to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> LacpResult<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| LacpError::ConfigFile {
            path: PathBuf::from(path),
            message: e.to_string(),
        })?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.daemon.tick_interval_ms)
    }

    /// Initial system identity.
    pub fn system_context(&self) -> SystemContext {
        SystemContext::new(
            self.system.mac.unwrap_or(MacAddress::ZERO),
            self.system.priority,
        )
    }

    pub fn validate(&self) -> LacpResult<()> {
        if let Some(mac) = self.system.mac {
            if mac.is_multicast() {
                return Err(LacpError::invalid_config(
                    "system.mac",
                    format!("{} is a multicast address", mac),
                ));
            }
        }

        if self.engine.max_lag_members == 0 {
            return Err(LacpError::invalid_config(
                "engine.max_lag_members",
                "must be > 0",
            ));
        }

        if !(10..=1000).contains(&self.daemon.tick_interval_ms) {
            return Err(LacpError::invalid_config(
                "daemon.tick_interval_ms",
                "must be 10-1000",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = LacpdConfig::default();
        assert_eq!(config.system.mac, None);
        assert_eq!(config.system.priority, 65534);
        assert_eq!(config.engine.max_lag_members, 8);
        assert_eq!(config.tick_interval(), Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[system]
mac = "70:72:cf:52:a1:10"

[engine]
max_lag_members = 4
"#;
        let config: LacpdConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(
            config.system_context(),
            SystemContext::new("70:72:cf:52:a1:10".parse().unwrap(), 65534)
        );
        assert_eq!(config.engine.max_lag_members, 4);
        // Unspecified values use defaults
        assert_eq!(config.daemon.log_level, "info");
    }

    #[test]
    fn test_toml_rejects_bad_mac() {
        let toml_str = r#"
[system]
mac = "70:72:cf"
"#;
        assert!(toml::from_str::<LacpdConfig>(toml_str).is_err());
    }

    #[test]
    fn test_validate() {
        let mut config = LacpdConfig::default();
        config.engine.max_lag_members = 0;
        assert!(config.validate().is_err());

        let mut config = LacpdConfig::default();
        config.daemon.tick_interval_ms = 5;
        assert!(config.validate().is_err());

        let mut config = LacpdConfig::default();
        config.system.mac = Some(MacAddress::SLOW_PROTOCOLS);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lacpd.conf");

        let mut config = LacpdConfig::default();
        config.system.mac = Some("52:54:00:12:34:56".parse().unwrap());
        config.system.priority = 100;
        config.save(&path).unwrap();

        let loaded = LacpdConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded.system_context(), config.system_context());
    }

    #[test]
    fn test_load_nonexistent_file_defaults() {
        let config = LacpdConfig::load_or_default("/nonexistent/lacpd.conf").unwrap();
        assert_eq!(config.system.priority, 65534);
    }

    #[test]
    fn test_load_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lacpd.conf");
        fs::write(&path, "[engine\nmax_lag_members = ").unwrap();

        let err = LacpdConfig::load_or_default(&path).unwrap_err();
        assert!(matches!(err, LacpError::ConfigFile { .. }));
    }
}
