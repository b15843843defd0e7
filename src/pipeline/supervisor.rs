//! Stream supervision
//!
//! Owns the lifecycle of a stream's pipeline: attach a capture source,
//! replace it on restart (handoff) while carrying timestamps, indices and
//! init version forward, and expose health for the status endpoint.

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::diagnostics::KeyframeStats;
use super::segmenter::{PipelineSeed, PipelineSnapshot, Segmenter, SegmenterConfig};
use super::store::{SegmentStore, StoreStats};
use super::Pipeline;
use crate::config::ServerConfig;

/// Health snapshot for one stream, serialized by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub stream_id: String,
    pub running: bool,
    pub saw_moov: bool,
    pub init_version: u32,
    pub next_segment_index: u64,
    pub segments_emitted: u64,
    pub fragment_faults: u64,
    pub duration_clamps: u64,
    pub handoffs: u64,
    pub store: StoreStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyframes: Option<KeyframeStats>,
}

struct ActivePipeline {
    pipeline: Arc<Mutex<Pipeline>>,
    task: tokio::task::JoinHandle<()>,
    spawned_at: Instant,
}

/// Supervises the pipeline serving one stream.
pub struct StreamSupervisor {
    stream_id: String,
    config: ServerConfig,
    store: Arc<SegmentStore>,
    active: Mutex<Option<ActivePipeline>>,
    handoffs: AtomicU64,
}

impl StreamSupervisor {
    pub fn new(stream_id: impl Into<String>, config: ServerConfig) -> Arc<Self> {
        Arc::new(Self {
            stream_id: stream_id.into(),
            config,
            store: Arc::new(SegmentStore::new()),
            active: Mutex::new(None),
            handoffs: AtomicU64::new(0),
        })
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn store(&self) -> Arc<SegmentStore> {
        self.store.clone()
    }

    /// Attach a capture source. A fresh attach starts from zero; if a
    /// pipeline is already running this is a handoff.
    pub fn attach(&self, source: mpsc::Receiver<Bytes>) {
        let seed = match self.teardown_current(true) {
            Some(snapshot) => {
                self.handoffs.fetch_add(1, Ordering::Relaxed);
                PipelineSeed {
                    initial_track_timestamps: snapshot.track_timestamps,
                    starting_segment_index: snapshot.next_segment_index,
                    starting_init_version: snapshot.init_version,
                    previous_init: snapshot.init_segment,
                    pending_discontinuity: true,
                }
            }
            None => PipelineSeed::default(),
        };
        self.spawn_pipeline(seed, source);
    }

    /// Stop the pipeline and detach from its source. Idempotent.
    pub fn stop(&self) {
        self.teardown_current(false);
    }

    /// Snapshot of the running pipeline, if any.
    pub fn snapshot(&self) -> Option<PipelineSnapshot> {
        let active = self.active.lock();
        active.as_ref().map(|a| a.pipeline.lock().snapshot())
    }

    /// Time since an HTTP reader last touched this stream's store.
    pub fn idle_for(&self) -> Duration {
        self.store.idle_for()
    }

    /// True when the current capture has run for longer than `timeout`
    /// without ever producing a moov. A stream with no pipeline attached is
    /// never overdue (the idle timeout covers it).
    pub fn moov_overdue(&self, timeout: Duration) -> bool {
        let active = self.active.lock();
        match active.as_ref() {
            Some(a) => a.spawned_at.elapsed() > timeout && !a.pipeline.lock().stats().saw_moov,
            None => false,
        }
    }

    pub fn health(&self) -> HealthSnapshot {
        let active = self.active.lock();
        let (running, stats, keyframes, snapshot) = match active.as_ref() {
            Some(a) => {
                let pipeline = a.pipeline.lock();
                (
                    !pipeline.is_stopped(),
                    pipeline.stats(),
                    pipeline.keyframe_stats(),
                    Some(pipeline.snapshot()),
                )
            }
            None => (false, Default::default(), None, None),
        };
        HealthSnapshot {
            stream_id: self.stream_id.clone(),
            running,
            saw_moov: stats.saw_moov,
            init_version: snapshot.as_ref().map(|s| s.init_version).unwrap_or(0),
            next_segment_index: snapshot
                .as_ref()
                .map(|s| s.next_segment_index)
                .unwrap_or(0),
            segments_emitted: stats.segments_emitted,
            fragment_faults: stats.fragment_faults,
            duration_clamps: stats.duration_clamps,
            handoffs: self.handoffs.load(Ordering::Relaxed),
            store: self.store.stats(),
            keyframes,
        }
    }

    /// Stop the current pipeline. With `for_handoff` the buffered fragment
    /// is flushed as a short segment and the snapshot is returned for
    /// seeding the replacement.
    fn teardown_current(&self, for_handoff: bool) -> Option<PipelineSnapshot> {
        let active = self.active.lock().take()?;
        let snapshot = {
            let mut pipeline = active.pipeline.lock();
            if for_handoff {
                pipeline.mark_discontinuity();
            }
            let snapshot = pipeline.snapshot();
            pipeline.stop();
            snapshot
        };
        // The ingest task sees the stopped pipeline and drains to exit.
        active.task.abort();
        Some(snapshot)
    }

    fn spawn_pipeline(&self, seed: PipelineSeed, mut source: mpsc::Receiver<Bytes>) {
        let segmenter = Segmenter::new(
            SegmenterConfig {
                target_duration_secs: self.config.hls.segment_duration_secs,
                max_segments: self.config.hls.max_segments,
                keyframe_tracking: self.config.diagnostics.keyframe_tracking,
            },
            self.store.clone(),
            seed,
        );
        let pipeline = Arc::new(Mutex::new(Pipeline::new(segmenter)));
        self.store.touch();

        let instance = Uuid::new_v4();
        let stream_id = self.stream_id.clone();
        let ingest_pipeline = pipeline.clone();
        let task = tokio::spawn(async move {
            tracing::info!(stream = %stream_id, %instance, "pipeline ingest started");
            while let Some(chunk) = source.recv().await {
                let result = ingest_pipeline.lock().push(&chunk);
                match result {
                    Ok(()) => {
                        if ingest_pipeline.lock().is_stopped() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(
                            stream = %stream_id,
                            %instance,
                            error = %e,
                            "pipeline stopped on parse error"
                        );
                        return;
                    }
                }
            }
            // Source closed: flush the tail as a final short segment.
            ingest_pipeline.lock().finish();
            tracing::info!(stream = %stream_id, %instance, "pipeline ingest finished");
        });

        *self.active.lock() = Some(ActivePipeline {
            pipeline,
            task,
            spawned_at: Instant::now(),
        });
    }
}

impl Drop for StreamSupervisor {
    fn drop(&mut self) {
        if let Some(active) = self.active.lock().take() {
            active.pipeline.lock().stop();
            active.task.abort();
        }
    }
}
