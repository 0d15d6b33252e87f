use crate::serial_service::SerialConfig;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub port_name: String,
    pub baud_rate: u32,
    pub connect_timeout_ms: u64,
    pub response_timeout_ms: u64,
    pub traffic_log_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let serial = SerialConfig::default();
        Self {
            port_name: serial.port_name,
            baud_rate: serial.baud_rate,
            connect_timeout_ms: serial.connect_timeout.as_millis() as u64,
            response_timeout_ms: serial.response_timeout.as_millis() as u64,
            traffic_log_capacity: serial.log_capacity,
        }
    }
}

impl ClientConfig {
    /// `<config dir>/vudial/config.json`, when the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("vudial").join("config.json"))
    }

    /// Read `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn serial_config(&self) -> SerialConfig {
        SerialConfig {
            port_name: self.port_name.clone(),
            baud_rate: self.baud_rate,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            response_timeout: Duration::from_millis(self.response_timeout_ms),
            log_capacity: self.traffic_log_capacity,
            ..Default::default()
        }
    }
}
