//! Configuration file support
//!
//! Loads server configuration from TOML files.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::{DiagnosticsConfig, HlsConfig, ServerConfig, SupervisionConfig};

/// Configuration file format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Server settings
    pub server: ServerSettings,
    /// HLS output settings
    pub hls: Option<HlsSettings>,
    /// Diagnostics settings
    pub diagnostics: Option<DiagnosticsSettings>,
    /// Supervision settings
    pub supervision: Option<SupervisionSettings>,
    /// Logging settings
    pub logging: Option<LoggingSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Enable CORS
    pub cors_enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HlsSettings {
    /// Target segment duration in seconds
    pub segment_duration_secs: f64,
    /// Sliding window size in segments
    pub max_segments: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsSettings {
    /// Track keyframe cadence per moof
    pub keyframe_tracking: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisionSettings {
    /// Idle teardown timeout in seconds
    pub idle_timeout_secs: Option<u64>,
    /// No-moov capture timeout in seconds
    pub no_moov_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: Option<String>,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ConfigFile = toml::from_str(&content)?;
        Ok(config)
    }

    /// Convert to runtime ServerConfig, filling gaps with defaults
    pub fn into_server_config(self) -> ServerConfig {
        let defaults = ServerConfig::default();
        ServerConfig {
            host: self.server.host,
            port: self.server.port,
            cors_enabled: self.server.cors_enabled.unwrap_or(defaults.cors_enabled),
            hls: self
                .hls
                .map(|h| HlsConfig {
                    segment_duration_secs: h.segment_duration_secs,
                    max_segments: h.max_segments,
                })
                .unwrap_or(defaults.hls),
            diagnostics: self
                .diagnostics
                .map(|d| DiagnosticsConfig {
                    keyframe_tracking: d.keyframe_tracking.unwrap_or(false),
                })
                .unwrap_or(defaults.diagnostics),
            supervision: self
                .supervision
                .map(|s| SupervisionConfig {
                    idle_timeout_secs: s
                        .idle_timeout_secs
                        .unwrap_or(defaults.supervision.idle_timeout_secs),
                    no_moov_timeout_secs: s
                        .no_moov_timeout_secs
                        .unwrap_or(defaults.supervision.no_moov_timeout_secs),
                })
                .unwrap_or(defaults.supervision),
            log_level: self
                .logging
                .map(|l| l.level)
                .unwrap_or(defaults.log_level),
        }
    }
}
