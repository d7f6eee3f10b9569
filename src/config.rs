//! # Configuration Management
//!
//! Centralized configuration for the session engine.
//!
//! This module provides structured configuration for the orchestrator and
//! the sessions it spawns: connection parameters, timeouts, admission and
//! startup pacing, auth retry policy and codec limits.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-specific overrides via `from_env()`
//!
//! Collaborators (CLI, persisted profiles) are expected to build an
//! [`EngineConfig`] and hand it to the orchestrator; nothing in the core
//! reads configuration ambiently.

use crate::error::{Result, SessionError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Max allowed frame length on the wire (8 MB).
///
/// A declared length above this is classified as framing corruption, not a
/// large packet: no legitimate peer sends frames this big.
pub const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

/// Compression threshold applied when the server does not negotiate one.
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 256;

/// Main engine configuration containing all configurable settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct EngineConfig {
    /// Per-session connection settings
    #[serde(default)]
    pub session: SessionSettings,

    /// Orchestrator admission/startup/teardown settings
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,

    /// Auth provider retry and refresh settings
    #[serde(default)]
    pub auth: AuthSettings,

    /// Wire codec limits
    #[serde(default)]
    pub codec: CodecSettings,
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SessionError::Config(format!("Failed to read config file: {e}")))?;
        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| SessionError::Config(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables, on top of defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SWARMLINK_MAX_SESSIONS") {
            if let Ok(v) = val.parse::<usize>() {
                config.orchestrator.max_sessions = v;
            }
        }

        if let Ok(val) = std::env::var("SWARMLINK_MAX_CONNECTING") {
            if let Ok(v) = val.parse::<usize>() {
                config.orchestrator.max_connecting = v;
            }
        }

        if let Ok(val) = std::env::var("SWARMLINK_CONNECT_TIMEOUT_MS") {
            if let Ok(v) = val.parse::<u64>() {
                config.session.connect_timeout_ms = v;
            }
        }

        if let Ok(val) = std::env::var("SWARMLINK_READ_TIMEOUT_MS") {
            if let Ok(v) = val.parse::<u64>() {
                config.session.read_timeout_ms = v;
            }
        }

        config
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Validate the configuration for common misconfigurations.
    ///
    /// Returns a list of validation errors. Empty list means the
    /// configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.orchestrator.max_sessions == 0 {
            errors.push("orchestrator.max_sessions must be at least 1".into());
        }
        if self.orchestrator.max_connecting == 0 {
            errors.push("orchestrator.max_connecting must be at least 1".into());
        }
        if self.orchestrator.join_delay_min_ms > self.orchestrator.join_delay_max_ms {
            errors.push("orchestrator.join_delay_min_ms exceeds join_delay_max_ms".into());
        }
        if self.session.connect_timeout_ms == 0 {
            errors.push("session.connect_timeout_ms must be nonzero".into());
        }
        if self.codec.max_frame_len > MAX_FRAME_LEN {
            errors.push(format!(
                "codec.max_frame_len exceeds hard limit of {MAX_FRAME_LEN}"
            ));
        }
        if self.auth.max_attempts == 0 {
            errors.push("auth.max_attempts must be at least 1".into());
        }

        errors
    }
}

/// Per-session connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionSettings {
    /// Connect timeout in milliseconds
    pub connect_timeout_ms: u64,

    /// Inactivity timeout in milliseconds; no inbound frame for this long
    /// fails the session with a read timeout
    pub read_timeout_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 30_000,
            read_timeout_ms: 30_000,
        }
    }
}

impl SessionSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Orchestrator admission, pacing and teardown settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrchestratorSettings {
    /// Maximum concurrently established sessions
    pub max_sessions: usize,

    /// Maximum sessions simultaneously in Handshake/Login.
    ///
    /// Independent of `max_sessions`: it bounds how hard the engine hits
    /// the local network stack and the auth service, not how many sessions
    /// may exist.
    pub max_connecting: usize,

    /// Minimum delay between staged session starts, in milliseconds
    pub join_delay_min_ms: u64,

    /// Maximum delay between staged session starts, in milliseconds
    pub join_delay_max_ms: u64,

    /// How long `stop`/`stop_all` waits for a graceful close before
    /// forcing teardown, in milliseconds
    pub stop_timeout_ms: u64,

    /// Capacity of the lifecycle event channel
    pub event_buffer: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_sessions: 1000,
            max_connecting: 20,
            join_delay_min_ms: 1_000,
            join_delay_max_ms: 3_000,
            stop_timeout_ms: 5_000,
            event_buffer: 256,
        }
    }
}

impl OrchestratorSettings {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// Auth provider retry and refresh settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthSettings {
    /// Refresh a token proactively when its remaining validity falls under
    /// this margin, in seconds
    pub refresh_margin_secs: u64,

    /// Attempt ceiling for a single acquisition/refresh flow
    pub max_attempts: u32,

    /// First backoff delay, in milliseconds; doubles per attempt
    pub backoff_base_ms: u64,

    /// Backoff ceiling, in milliseconds
    pub backoff_max_ms: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            refresh_margin_secs: 60,
            max_attempts: 3,
            backoff_base_ms: 250,
            backoff_max_ms: 5_000,
        }
    }
}

impl AuthSettings {
    pub fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_margin_secs)
    }
}

/// Wire codec limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CodecSettings {
    /// Maximum accepted frame length in bytes
    pub max_frame_len: usize,
}

impl Default for CodecSettings {
    fn default() -> Self {
        Self {
            max_frame_len: MAX_FRAME_LEN,
        }
    }
}
