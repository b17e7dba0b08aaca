//! Config modules for the application.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::supervisor::Backoff;

/// Overrides `[speaker].address` when set.
pub const ADDRESS_ENV: &str = "SPEAKERLINK_SPEAKER_ADDRESS";

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub speaker: SpeakerConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

impl AppConfig {
    pub fn from_toml_str(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> eyre::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = Self::from_toml_str(&contents)
            .map_err(|e| eyre::eyre!("Failed to parse config file: {e}"))?;
        Ok(config)
    }

    /// Load configuration with fallback to defaults
    pub fn load_or_default() -> Self {
        // Try to load from standard locations in order: CWD > .config > /etc
        let config_paths = [
            PathBuf::from("speakerlink.toml"),
            dirs::config_dir()
                .map(|config_dir| config_dir.join("speakerlink.toml"))
                .unwrap_or_else(|| PathBuf::from("speakerlink.toml")),
            PathBuf::from("/etc/speakerlink/speakerlink.toml"),
        ];

        let mut config = None;
        for path in &config_paths {
            if path.exists() {
                match Self::from_file(path) {
                    Ok(loaded) => {
                        tracing::info!("Loaded configuration from: {}", path.display());
                        config = Some(loaded);
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Failed to load config from {}: {}. Using defaults.",
                            path.display(),
                            e
                        );
                    }
                }
                // Only try the first existing config file
                break;
            }
        }

        let mut config = config.unwrap_or_else(|| {
            tracing::info!("No usable configuration file found, using defaults");
            Self::default()
        });
        config.apply_address_override(std::env::var(ADDRESS_ENV).ok());
        config.validate_and_fix();
        config
    }

    fn apply_address_override(&mut self, address: Option<String>) {
        if let Some(address) = address.filter(|a| !a.trim().is_empty()) {
            tracing::info!("Speaker address overridden by {ADDRESS_ENV}: {address}");
            self.speaker.address = Some(address.trim().to_string());
        }
    }

    /// Validate and fix configuration inconsistencies
    pub fn validate_and_fix(&mut self) {
        if self
            .speaker
            .address
            .as_deref()
            .is_some_and(|a| a.trim().is_empty())
        {
            tracing::warn!("Empty speaker.address ignored; waiting for a device to be selected");
            self.speaker.address = None;
        }

        if self.speaker.request_timeout_ms == 0 {
            tracing::warn!(
                "speaker.request_timeout_ms must be positive, using {}",
                default_request_timeout_ms()
            );
            self.speaker.request_timeout_ms = default_request_timeout_ms();
        }

        let sync = &mut self.sync;
        if sync.backoff_floor_ms == 0 {
            tracing::warn!(
                "sync.backoff_floor_ms must be positive, using {}",
                default_backoff_floor_ms()
            );
            sync.backoff_floor_ms = default_backoff_floor_ms();
        }
        if sync.backoff_ceiling_ms < sync.backoff_floor_ms {
            tracing::warn!(
                "sync.backoff_ceiling_ms ({}) is below the floor ({}); clamping",
                sync.backoff_ceiling_ms,
                sync.backoff_floor_ms
            );
            sync.backoff_ceiling_ms = sync.backoff_floor_ms;
        }
        if sync.heartbeat_secs == 0 {
            tracing::warn!(
                "sync.heartbeat_secs must be positive, using {}",
                default_heartbeat_secs()
            );
            sync.heartbeat_secs = default_heartbeat_secs();
        }
        if sync.client_queue_capacity == 0 {
            tracing::warn!(
                "sync.client_queue_capacity must be positive, using {}",
                default_client_queue_capacity()
            );
            sync.client_queue_capacity = default_client_queue_capacity();
        }
    }
}

// set enabled = false in [web] to run headless (no push channels, no REST)
#[derive(Debug, Deserialize, Serialize)]
pub struct WebConfig {
    #[serde(default = "default_web_enabled")]
    pub enabled: bool,
    #[serde(default = "default_web_port")]
    pub port: u16,
    #[serde(default = "default_web_host")]
    pub host: String,
    /// Directory of static UI files served for unknown paths
    #[serde(default)]
    pub assets_path: Option<PathBuf>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: default_web_enabled(),
            port: default_web_port(),
            host: default_web_host(),
            assets_path: None,
        }
    }
}

fn default_web_enabled() -> bool {
    true
}

fn default_web_port() -> u16 {
    8000
}

fn default_web_host() -> String {
    "0.0.0.0".to_string()
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SpeakerConfig {
    /// Host or host:port of the speaker. No session starts until one is known.
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Timeout for property reads and control requests
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for SpeakerConfig {
    fn default() -> Self {
        Self {
            address: None,
            name: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl SpeakerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_request_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SyncConfig {
    #[serde(default = "default_backoff_floor_ms")]
    pub backoff_floor_ms: u64,
    #[serde(default = "default_backoff_ceiling_ms")]
    pub backoff_ceiling_ms: u64,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// Frames buffered per push client before new ones are dropped
    #[serde(default = "default_client_queue_capacity")]
    pub client_queue_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            backoff_floor_ms: default_backoff_floor_ms(),
            backoff_ceiling_ms: default_backoff_ceiling_ms(),
            heartbeat_secs: default_heartbeat_secs(),
            client_queue_capacity: default_client_queue_capacity(),
        }
    }
}

impl SyncConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.backoff_floor_ms),
            Duration::from_millis(self.backoff_ceiling_ms),
        )
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}

fn default_backoff_floor_ms() -> u64 {
    crate::supervisor::DEFAULT_BACKOFF_FLOOR.as_millis() as u64
}

fn default_backoff_ceiling_ms() -> u64 {
    crate::supervisor::DEFAULT_BACKOFF_CEILING.as_millis() as u64
}

fn default_heartbeat_secs() -> u64 {
    crate::hub::DEFAULT_HEARTBEAT_INTERVAL.as_secs()
}

fn default_client_queue_capacity() -> usize {
    crate::hub::DEFAULT_QUEUE_CAPACITY
}
