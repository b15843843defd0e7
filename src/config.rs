//! Server configuration

use serde::{Deserialize, Serialize};

/// HLS output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HlsConfig {
    /// Target segment duration in seconds (cut interval)
    pub segment_duration_secs: f64,

    /// Number of segments kept in the sliding window
    pub max_segments: usize,
}

impl Default for HlsConfig {
    fn default() -> Self {
        Self {
            segment_duration_secs: 4.0,
            max_segments: 10,
        }
    }
}

/// Diagnostics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Track keyframe cadence per moof (adds a per-fragment inspection pass)
    pub keyframe_tracking: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            keyframe_tracking: false,
        }
    }
}

/// Supervision configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisionConfig {
    /// Tear a stream down after this long without a client request
    pub idle_timeout_secs: u64,

    /// Give up on a capture that never produces a moov
    pub no_moov_timeout_secs: u64,
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 60,
            no_moov_timeout_secs: 30,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// HLS output configuration
    pub hls: HlsConfig,

    /// Diagnostics configuration
    pub diagnostics: DiagnosticsConfig,

    /// Supervision configuration
    pub supervision: SupervisionConfig,

    /// Enable CORS
    pub cors_enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5004,
            hls: HlsConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
            supervision: SupervisionConfig::default(),
            cors_enabled: true,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
