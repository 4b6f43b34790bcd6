// ============================
// crates/backend-lib/src/config.rs
// ============================
//! Configuration management.
use crate::error::RelayError;
use axum::http::HeaderValue;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Prefix for environment overrides, e.g. `SKETCH_RELAY_RELAY__OUTBOUND_BUFFER=64`
pub const ENV_PREFIX: &str = "SKETCH_RELAY_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const MIN_MESSAGE_BYTES: usize = 1024;

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Log level
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
    /// Origin allowed by CORS; any origin when unset
    pub client_origin: Option<String>,
    /// Relay tuning
    pub relay: RelaySettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Queue sizes and frame limits for the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Capacity of the coordinator command queue
    pub command_buffer: usize,
    /// Capacity of each connection's outbound queue; a full queue drops events for that peer only
    pub outbound_buffer: usize,
    /// Largest inbound WebSocket frame accepted
    pub max_message_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            client_origin: None,
            relay: RelaySettings::default(),
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            command_buffer: 1024,
            outbound_buffer: 256,
            max_message_bytes: 1024 * 1024,
        }
    }
}

impl Settings {
    /// Load settings from `config.toml` in the working directory and the environment
    pub fn load() -> Result<Self, RelayError> {
        Self::load_from("config.toml")
    }

    /// Load settings from a specific TOML file, then the environment.
    /// A missing file leaves the defaults in place.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, RelayError> {
        let settings: Settings = Self::figment(path.as_ref()).extract()?;
        settings.validate()?;
        Ok(settings)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Reject settings the relay cannot run with
    pub fn validate(&self) -> Result<(), RelayError> {
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(RelayError::Config(format!(
                "log_level must be one of {LOG_LEVELS:?}, got {}",
                self.log_level
            )));
        }

        if self.relay.command_buffer == 0 || self.relay.outbound_buffer == 0 {
            return Err(RelayError::Config(
                "relay queue capacities must be greater than zero".to_string(),
            ));
        }

        if self.relay.max_message_bytes < MIN_MESSAGE_BYTES {
            return Err(RelayError::Config(format!(
                "relay.max_message_bytes must be at least {MIN_MESSAGE_BYTES}"
            )));
        }

        if let Some(origin) = &self.client_origin {
            if origin.trim().is_empty() {
                return Err(RelayError::Config(
                    "client_origin must not be blank".to_string(),
                ));
            }
            if HeaderValue::from_str(origin).is_err() {
                return Err(RelayError::Config(format!(
                    "client_origin is not a valid header value: {origin}"
                )));
            }
        }

        Ok(())
    }
}
