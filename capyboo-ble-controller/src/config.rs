//! Controller configuration, stored as `config.json` in CAPYBOO_HOME

use std::path::{Path, PathBuf};
use std::time::Duration;

use capyboo_proto::ble::DEFAULT_DEVICE_NAME;
use serde::{Deserialize, Serialize};

use crate::adapter::Timeouts;
use crate::radio::WireEncoding;

pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine home directory, set CAPYBOO_HOME")]
    NoHome,
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Advertised name to look for
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// Give up scanning after this many seconds; `null` scans forever
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: Option<u64>,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    #[serde(default)]
    pub write_timeout_secs: Option<u64>,
    /// Which system adapter to use; the first one when unset
    #[serde(default)]
    pub adapter_index: Option<usize>,
    #[serde(default)]
    pub encoding: WireEncoding,
}

fn default_device_name() -> String {
    DEFAULT_DEVICE_NAME.to_string()
}

fn default_scan_timeout_secs() -> Option<u64> {
    Some(10)
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            scan_timeout_secs: default_scan_timeout_secs(),
            connect_timeout_secs: None,
            write_timeout_secs: None,
            adapter_index: None,
            encoding: WireEncoding::default(),
        }
    }
}

impl ControllerConfig {
    pub fn scan_timeout(&self) -> Option<Duration> {
        self.scan_timeout_secs.map(Duration::from_secs)
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: self.connect_timeout_secs.map(Duration::from_secs),
            write: self.write_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Like [`ControllerConfig::load`], but a missing file means defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        let data = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, data).map_err(io_error)
    }
}

/// CAPYBOO_HOME, or `~/.capyboo`
pub fn capyboo_home() -> Result<PathBuf, ConfigError> {
    match std::env::var_os("CAPYBOO_HOME") {
        Some(home) => Ok(PathBuf::from(home)),
        None => dirs::home_dir()
            .map(|home| home.join(".capyboo"))
            .ok_or(ConfigError::NoHome),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{ConfigError, ControllerConfig};
    use crate::radio::WireEncoding;

    fn scratch(name: &str) -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("capyboo-config-{}-{name}", std::process::id()))
            .join(super::CONFIG_FILE)
    }

    #[test]
    fn defaults() {
        let config: ControllerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ControllerConfig::default());
        assert_eq!(config.device_name, "Capyboo");
        assert_eq!(config.scan_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(config.timeouts().connect, None);
        assert_eq!(config.encoding, WireEncoding::Raw);
    }

    #[test]
    fn overrides() {
        let config: ControllerConfig = serde_json::from_str(
            r#"{
                "device_name": "Capyboo-2",
                "scan_timeout_secs": null,
                "connect_timeout_secs": 15,
                "write_timeout_secs": 5,
                "adapter_index": 1,
                "encoding": "base64"
            }"#,
        )
        .unwrap();

        assert_eq!(config.device_name, "Capyboo-2");
        assert_eq!(config.scan_timeout(), None);
        assert_eq!(config.timeouts().connect, Some(Duration::from_secs(15)));
        assert_eq!(config.timeouts().write, Some(Duration::from_secs(5)));
        assert_eq!(config.adapter_index, Some(1));
        assert_eq!(config.encoding, WireEncoding::Base64);
    }

    #[test]
    fn save_then_load() {
        let path = scratch("save");
        let config = ControllerConfig {
            device_name: "Robot".to_string(),
            encoding: WireEncoding::Base64,
            ..ControllerConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(ControllerConfig::load(&path).unwrap(), config);
        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[test]
    fn missing_file_means_defaults() {
        let path = scratch("missing");
        assert_eq!(
            ControllerConfig::load_or_default(&path).unwrap(),
            ControllerConfig::default()
        );
        assert!(matches!(
            ControllerConfig::load(&path),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn rejects_bad_encoding() {
        let err = serde_json::from_str::<ControllerConfig>(r#"{"encoding": "hex"}"#);
        assert!(err.is_err());
    }
}
