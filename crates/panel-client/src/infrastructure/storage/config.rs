//! TOML configuration for the panel client.
//!
//! Every field carries a serde default, so a missing file, an empty file and
//! a file written by an older version all load into a usable config:
//!
//! ```toml
//! [device]
//! host = "192.168.4.1"
//! web_port = 80
//! ota_port = 82
//! ws_path = "/ws"
//!
//! [connection]
//! heartbeat_secs = 5
//! reconnect_delay_ms = 1000
//!
//! [[connection.channels]]
//! name = "control"
//!
//! [[connection.channels]]
//! name = "audio"
//! audio = true
//!
//! [audio]
//! target_rate = 16000
//! frame_samples = 320
//! playback_buffer_ms = 1000
//! ```
//!
//! The default location is `<config dir>/devicepanel/config.toml`; the CLI
//! accepts `--config` to point elsewhere.

use std::path::{Path, PathBuf};
use std::time::Duration;

use panel_core::audio::{DEFAULT_FRAME_SAMPLES, DEFAULT_TARGET_RATE};
use panel_core::ChannelSpec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The config parsed but cannot drive a session.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PanelConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub audio: AudioConfig,
}

/// Where the device is reached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    /// Host name or IP address.  The default is the device's own access point.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port serving `/status`, `/control`, `/update`, `/web` and `/ws`.
    #[serde(default = "default_web_port")]
    pub web_port: u16,
    /// Port of the firmware upload server.
    #[serde(default = "default_ota_port")]
    pub ota_port: u16,
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
    /// Timeout applied to every HTTP request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// WebSocket channel list and timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelSpec>,
    /// Interval between `H` frames on open channels, and between status
    /// refreshes in watch mode.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Polls made by `send` while waiting for a channel to open.
    #[serde(default = "default_send_retry_attempts")]
    pub send_retry_attempts: u32,
    #[serde(default = "default_send_retry_interval_ms")]
    pub send_retry_interval_ms: u64,
    /// Pause between the `K` sentinel and the close frame.
    #[serde(default = "default_close_grace_ms")]
    pub close_grace_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioConfig {
    /// Rate the device expects mic audio at and sends speaker audio at.
    #[serde(default = "default_target_rate")]
    pub target_rate: u32,
    #[serde(default = "default_frame_samples")]
    pub frame_samples: usize,
    /// Playback ring buffer length.
    #[serde(default = "default_playback_buffer_ms")]
    pub playback_buffer_ms: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_host() -> String {
    "192.168.4.1".to_string()
}
fn default_web_port() -> u16 {
    80
}
fn default_ota_port() -> u16 {
    82
}
fn default_ws_path() -> String {
    "/ws".to_string()
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_channels() -> Vec<ChannelSpec> {
    vec![ChannelSpec::new("control", false), ChannelSpec::new("audio", true)]
}
fn default_heartbeat_secs() -> u64 {
    5
}
fn default_reconnect_delay_ms() -> u64 {
    1000
}
fn default_send_retry_attempts() -> u32 {
    10
}
fn default_send_retry_interval_ms() -> u64 {
    100
}
fn default_close_grace_ms() -> u64 {
    500
}
fn default_target_rate() -> u32 {
    DEFAULT_TARGET_RATE
}
fn default_frame_samples() -> usize {
    DEFAULT_FRAME_SAMPLES
}
fn default_playback_buffer_ms() -> u64 {
    1000
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            web_port: default_web_port(),
            ota_port: default_ota_port(),
            ws_path: default_ws_path(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            channels: default_channels(),
            heartbeat_secs: default_heartbeat_secs(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            send_retry_attempts: default_send_retry_attempts(),
            send_retry_interval_ms: default_send_retry_interval_ms(),
            close_grace_ms: default_close_grace_ms(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            target_rate: default_target_rate(),
            frame_samples: default_frame_samples(),
            playback_buffer_ms: default_playback_buffer_ms(),
        }
    }
}

// ── Derived values ────────────────────────────────────────────────────────────

impl DeviceConfig {
    /// `http://host[:port]`, without a trailing slash.
    pub fn base_url(&self) -> String {
        authority_url("http", &self.host, self.web_port, 80)
    }

    pub fn ws_url(&self) -> String {
        let path = if self.ws_path.starts_with('/') {
            self.ws_path.clone()
        } else {
            format!("/{}", self.ws_path)
        };
        format!("{}{path}", authority_url("ws", &self.host, self.web_port, 80))
    }

    /// Upload endpoint of the OTA server.
    pub fn ota_url(&self) -> String {
        format!("{}/upload", authority_url("http", &self.host, self.ota_port, 80))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl ConnectionConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn send_retry_interval(&self) -> Duration {
        Duration::from_millis(self.send_retry_interval_ms)
    }

    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }
}

impl AudioConfig {
    /// Ring buffer capacity in samples at the target rate.
    pub fn playback_capacity(&self) -> usize {
        (u64::from(self.target_rate) * self.playback_buffer_ms / 1000) as usize
    }
}

impl PanelConfig {
    /// Rejects configs that parse but cannot drive a session.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.host.trim().is_empty() {
            return Err(ConfigError::Invalid("device.host is empty".into()));
        }
        if self.connection.channels.is_empty() {
            return Err(ConfigError::Invalid(
                "connection.channels must name at least one channel".into(),
            ));
        }
        if self.connection.heartbeat_secs == 0 {
            return Err(ConfigError::Invalid("connection.heartbeat_secs must be > 0".into()));
        }
        if self.audio.target_rate == 0 || self.audio.frame_samples == 0 {
            return Err(ConfigError::Invalid(
                "audio.target_rate and audio.frame_samples must be > 0".into(),
            ));
        }
        Ok(())
    }
}

fn authority_url(scheme: &str, host: &str, port: u16, default_port: u16) -> String {
    if port == default_port {
        format!("{scheme}://{host}")
    } else {
        format!("{scheme}://{host}:{port}")
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the default config file path.
///
/// # Errors
///
/// [`ConfigError::NoPlatformConfigDir`] when neither the platform variable nor
/// `HOME` is set.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the config at `path`, returning the defaults if the file does not
/// exist yet.
///
/// # Errors
///
/// [`ConfigError::Io`] for file-system errors other than "not found",
/// [`ConfigError::Parse`] for malformed TOML.
pub fn load_config(path: &Path) -> Result<PanelConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PanelConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories.
///
/// # Errors
///
/// [`ConfigError::Io`] or [`ConfigError::Serialize`].
pub fn save_config(path: &Path, config: &PanelConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("DevicePanel"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("DevicePanel")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("devicepanel"))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
