//! Keyframe cadence diagnostics
//!
//! Optional per-moof bookkeeping for operational health: how often sync
//! samples arrive and whether segments open on one. Snapshots are read-only
//! and never influence the cut policy.

use serde::Serialize;
use std::time::Instant;

use crate::mp4::SyncStatus;

/// Rolling keyframe statistics for one stream.
#[derive(Debug, Default)]
pub struct KeyframeDiagnostics {
    keyframe_count: u64,
    non_keyframe_count: u64,
    indeterminate_count: u64,
    segments_without_leading_keyframe: u64,
    last_keyframe_at: Option<Instant>,
    min_interval_ms: Option<u64>,
    max_interval_ms: Option<u64>,
    interval_sum_ms: u64,
    interval_count: u64,
}

/// Read-only snapshot for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct KeyframeStats {
    pub keyframe_count: u64,
    pub non_keyframe_count: u64,
    pub indeterminate_count: u64,
    pub segments_without_leading_keyframe: u64,
    pub min_interval_ms: Option<u64>,
    pub max_interval_ms: Option<u64>,
    pub avg_interval_ms: Option<u64>,
}

impl KeyframeDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one moof's keyframe status.
    pub fn record_moof(&mut self, status: SyncStatus, now: Instant) {
        match status {
            SyncStatus::Sync => {
                self.keyframe_count += 1;
                if let Some(previous) = self.last_keyframe_at {
                    let interval = now.duration_since(previous).as_millis() as u64;
                    self.min_interval_ms =
                        Some(self.min_interval_ms.map_or(interval, |m| m.min(interval)));
                    self.max_interval_ms =
                        Some(self.max_interval_ms.map_or(interval, |m| m.max(interval)));
                    self.interval_sum_ms += interval;
                    self.interval_count += 1;
                }
                self.last_keyframe_at = Some(now);
            }
            SyncStatus::NonSync => self.non_keyframe_count += 1,
            SyncStatus::Indeterminate => self.indeterminate_count += 1,
        }
    }

    /// Record the status of the first moof of a new segment.
    pub fn record_segment_leading(&mut self, status: SyncStatus) {
        if status == SyncStatus::NonSync {
            self.segments_without_leading_keyframe += 1;
        }
    }

    pub fn snapshot(&self) -> KeyframeStats {
        KeyframeStats {
            keyframe_count: self.keyframe_count,
            non_keyframe_count: self.non_keyframe_count,
            indeterminate_count: self.indeterminate_count,
            segments_without_leading_keyframe: self.segments_without_leading_keyframe,
            min_interval_ms: self.min_interval_ms,
            max_interval_ms: self.max_interval_ms,
            avg_interval_ms: (self.interval_count > 0)
                .then(|| self.interval_sum_ms / self.interval_count),
        }
    }
}
