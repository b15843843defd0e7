//! Application state management
//!
//! Holds the registry of active streams: one supervisor (and its segment
//! store) per tuned channel, shared between the ingest side and the HTTP
//! handlers.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ServerConfig;
use crate::pipeline::StreamSupervisor;

/// Shared application state
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Active streams by stream id
    streams: DashMap<String, Arc<StreamSupervisor>>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            streams: DashMap::new(),
        }
    }

    /// Get the supervisor for a stream, creating it on first tune.
    pub fn get_or_create_stream(&self, stream_id: &str) -> Arc<StreamSupervisor> {
        self.streams
            .entry(stream_id.to_string())
            .or_insert_with(|| {
                tracing::info!(stream = %stream_id, "creating stream supervisor");
                StreamSupervisor::new(stream_id, self.config.clone())
            })
            .clone()
    }

    /// Get an existing stream's supervisor.
    pub fn get_stream(&self, stream_id: &str) -> Option<Arc<StreamSupervisor>> {
        self.streams.get(stream_id).map(|s| s.clone())
    }

    /// Stop and remove a stream.
    pub fn remove_stream(&self, stream_id: &str) -> bool {
        match self.streams.remove(stream_id) {
            Some((_, supervisor)) => {
                supervisor.stop();
                true
            }
            None => false,
        }
    }

    /// Ids of all active streams.
    pub fn stream_ids(&self) -> Vec<String> {
        self.streams.iter().map(|e| e.key().clone()).collect()
    }

    /// Stop and remove streams idle for longer than `timeout`.
    /// Returns the ids that were torn down.
    pub fn reap_idle(&self, timeout: Duration) -> Vec<String> {
        let idle: Vec<String> = self
            .streams
            .iter()
            .filter(|e| e.value().idle_for() > timeout)
            .map(|e| e.key().clone())
            .collect();
        for stream_id in &idle {
            tracing::info!(stream = %stream_id, "tearing down idle stream");
            self.remove_stream(stream_id);
        }
        idle
    }

    /// Stop and remove streams whose current capture has run for longer
    /// than `timeout` without producing a moov.
    pub fn reap_stalled(&self, timeout: Duration) -> Vec<String> {
        let stalled: Vec<String> = self
            .streams
            .iter()
            .filter(|e| e.value().moov_overdue(timeout))
            .map(|e| e.key().clone())
            .collect();
        for stream_id in &stalled {
            tracing::warn!(stream = %stream_id, "tearing down stream with no init from capture");
            self.remove_stream(stream_id);
        }
        stalled
    }
}
