//! Agent console configuration management
//! Handles loading and saving the config file

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::api::{TransportOptions, DEFAULT_BASE_URL};
use crate::session::UpdateSettings;
use crate::vnc::RemoteDesktopSettings;

/// Overrides the config file location
pub const CONFIG_PATH_ENV: &str = "AGENT_CONSOLE_CONFIG";
/// Overrides `api.base_url`
pub const API_URL_ENV: &str = "AGENT_CONSOLE_API_URL";

/// Agent console configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Backend connection
    #[serde(default)]
    pub api: ApiConfig,

    /// Live-update timings
    #[serde(default)]
    pub updates: UpdatesConfig,

    /// Remote desktop viewer
    #[serde(default)]
    pub remote_desktop: RemoteDesktopConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    5
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatesConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_reconnect_backoff")]
    pub reconnect_backoff_ms: u64,
    #[serde(default = "default_stream_ceiling")]
    pub stream_ceiling_secs: u64,
    #[serde(default = "default_max_reconnects")]
    pub max_reconnects: u32,
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_settle_delay() -> u64 {
    1000
}

fn default_reconnect_backoff() -> u64 {
    2000
}

fn default_stream_ceiling() -> u64 {
    60
}

fn default_max_reconnects() -> u32 {
    1
}

impl Default for UpdatesConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            settle_delay_ms: default_settle_delay(),
            reconnect_backoff_ms: default_reconnect_backoff(),
            stream_ceiling_secs: default_stream_ceiling(),
            max_reconnects: default_max_reconnects(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDesktopConfig {
    #[serde(default = "default_vnc_host")]
    pub host: String,
    #[serde(default = "default_vnc_port")]
    pub port: u16,
    #[serde(default = "default_vnc_settle_delay")]
    pub settle_delay_ms: u64,
}

fn default_vnc_host() -> String {
    "localhost".to_string()
}

// Docker maps the viewer's 6080 to 8080
fn default_vnc_port() -> u16 {
    8080
}

fn default_vnc_settle_delay() -> u64 {
    3000
}

impl Default for RemoteDesktopConfig {
    fn default() -> Self {
        Self {
            host: default_vnc_host(),
            port: default_vnc_port(),
            settle_delay_ms: default_vnc_settle_delay(),
        }
    }
}

impl Config {
    /// Load config from the default location or specified path
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = Self::config_path(path)?;

        let mut config = if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Config::default();
            config.save(path)?;
            config
        } else {
            let raw = fs::read_to_string(&config_path).context("Failed to read config file")?;
            let config: Config =
                serde_yaml::from_str(&raw).context("Failed to parse config file")?;
            debug!("Loaded config from {:?}", config_path);
            config
        };

        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                debug!("Using API URL from {}: {}", API_URL_ENV, url);
                config.api.base_url = url;
            }
        }

        Ok(config)
    }

    /// Save config to the default location
    pub fn save(&self, path: Option<&str>) -> Result<()> {
        let config_path = Self::config_path(path)?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(&self)?;
        fs::write(&config_path, content).context("Failed to write config file")?;

        info!("Saved config to {:?}", config_path);
        Ok(())
    }

    /// Get the config file path
    fn config_path(path: Option<&str>) -> Result<PathBuf> {
        // Check env override first
        if let Ok(env_path) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(env_path));
        }

        if let Some(p) = path {
            return Ok(PathBuf::from(p));
        }

        let home = dirs::home_dir().context("Cannot find home directory")?;
        Ok(home.join(".agent-console").join("config.yml"))
    }

    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            request_timeout: Duration::from_secs(self.api.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.api.connect_timeout_secs),
        }
    }

    pub fn update_settings(&self) -> UpdateSettings {
        UpdateSettings {
            poll_interval: Duration::from_millis(self.updates.poll_interval_ms.max(1)),
            settle_delay: Duration::from_millis(self.updates.settle_delay_ms),
            reconnect_backoff: Duration::from_millis(self.updates.reconnect_backoff_ms),
            stream_ceiling: Duration::from_secs(self.updates.stream_ceiling_secs),
            max_reconnects: self.updates.max_reconnects,
        }
    }

    pub fn remote_desktop_settings(&self) -> RemoteDesktopSettings {
        RemoteDesktopSettings {
            host: self.remote_desktop.host.clone(),
            port: self.remote_desktop.port,
            settle_delay: Duration::from_millis(self.remote_desktop.settle_delay_ms),
        }
    }
}
