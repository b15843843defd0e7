//! Segmenter: the per-stream orchestrator
//!
//! Consumes parsed top-level boxes, rewrites fragment timestamps onto a
//! continuous per-track timeline, groups fragments into media segments of
//! roughly the target duration, versions the init segment, and publishes
//! everything to the stream's segment store.

use bytes::{Bytes, BytesMut};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use super::diagnostics::{KeyframeDiagnostics, KeyframeStats};
use super::playlist::{render_media_playlist, PlaylistContext};
use super::store::SegmentStore;
use crate::mp4::{self, boxes, MediaBox, TrexDefaults};

/// Cut policy and window size for one segmenter.
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    pub target_duration_secs: f64,
    pub max_segments: usize,
    pub keyframe_tracking: bool,
}

/// Values carried into a pipeline at creation.
///
/// A fresh tune uses the default; a supervised handoff seeds the new
/// pipeline from the outgoing one's snapshot so indices, init versions and
/// decode timestamps stay monotonic across the restart.
#[derive(Debug, Clone, Default)]
pub struct PipelineSeed {
    pub initial_track_timestamps: BTreeMap<u32, u64>,
    pub starting_segment_index: u64,
    pub starting_init_version: u32,
    pub previous_init: Option<Bytes>,
    pub pending_discontinuity: bool,
}

/// Snapshot handed to supervision for a handoff.
#[derive(Debug, Clone)]
pub struct PipelineSnapshot {
    pub init_segment: Option<Bytes>,
    pub init_version: u32,
    pub next_segment_index: u64,
    pub track_timestamps: BTreeMap<u32, u64>,
}

/// Ingest-side counters, read by supervision for the status endpoint.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SegmenterStats {
    pub segments_emitted: u64,
    pub fragment_faults: u64,
    pub duration_clamps: u64,
    pub saw_moov: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingInit,
    Running,
    Stopped,
}

pub struct Segmenter {
    config: SegmenterConfig,
    store: Arc<SegmentStore>,
    state: State,

    // Init assembly
    ftyp: Option<Bytes>,
    previous_init: Option<Bytes>,
    init_version: u32,

    // Parsed once from the moov
    timescales: BTreeMap<u32, u32>,
    trex: BTreeMap<u32, TrexDefaults>,

    // Per-track running decode timestamps and clamp baselines
    counters: BTreeMap<u32, u64>,
    baselines: BTreeMap<u32, u64>,

    // Current segment under assembly
    buffer: Vec<Bytes>,
    buffer_bytes: usize,
    buffer_has_moof: bool,
    accumulated: BTreeMap<u32, u64>,
    segment_start: Option<Instant>,
    first_moof_checked: bool,

    // Window bookkeeping
    next_index: u64,
    emitted_any: bool,
    window_durations: BTreeMap<u64, f64>,
    discontinuity_indices: BTreeSet<u64>,
    pending_discontinuity: bool,

    diagnostics: Option<KeyframeDiagnostics>,
    stats: SegmenterStats,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig, store: Arc<SegmentStore>, seed: PipelineSeed) -> Self {
        let diagnostics = config.keyframe_tracking.then(KeyframeDiagnostics::new);
        Self {
            config,
            store,
            state: State::AwaitingInit,
            ftyp: None,
            previous_init: seed.previous_init,
            init_version: seed.starting_init_version,
            timescales: BTreeMap::new(),
            trex: BTreeMap::new(),
            counters: seed.initial_track_timestamps,
            baselines: BTreeMap::new(),
            buffer: Vec::new(),
            buffer_bytes: 0,
            buffer_has_moof: false,
            accumulated: BTreeMap::new(),
            segment_start: None,
            first_moof_checked: false,
            next_index: seed.starting_segment_index,
            emitted_any: false,
            window_durations: BTreeMap::new(),
            discontinuity_indices: BTreeSet::new(),
            pending_discontinuity: seed.pending_discontinuity,
            diagnostics,
            stats: SegmenterStats::default(),
        }
    }

    /// Feed one parsed top-level box through the state machine.
    pub fn handle_box(&mut self, media_box: MediaBox) {
        match self.state {
            State::Stopped => {}
            State::AwaitingInit => self.handle_awaiting_init(media_box),
            State::Running => self.handle_running(media_box),
        }
    }

    fn handle_awaiting_init(&mut self, media_box: MediaBox) {
        match media_box.kind {
            boxes::FTYP => self.ftyp = Some(media_box.data.freeze()),
            boxes::MOOV => self.on_moov(media_box.data),
            other => {
                tracing::trace!(
                    kind = %boxes::fourcc_display(&other),
                    "discarding box before init"
                );
            }
        }
    }

    fn handle_running(&mut self, media_box: MediaBox) {
        match media_box.kind {
            boxes::MOOF => self.on_moof(media_box.data),
            boxes::MOOV | boxes::FTYP => {
                // The ingest contract promises exactly one init sequence.
                tracing::warn!(
                    kind = %boxes::fourcc_display(&media_box.kind),
                    "unexpected init box mid-stream, ignoring"
                );
            }
            // mdat and pass-through minor boxes (styp, sidx, ...) join the
            // current fragment buffer.
            _ => self.append(media_box.data.freeze()),
        }
    }

    fn on_moov(&mut self, data: BytesMut) {
        let moov = data.freeze();
        self.timescales = mp4::parse_timescales(&moov);
        self.trex = mp4::parse_trex_defaults(&moov);
        if self.timescales.is_empty() {
            tracing::warn!("moov carries no usable tracks, EXTINF will use wall clock");
        }

        let mut init = BytesMut::new();
        match &self.ftyp {
            Some(ftyp) => init.extend_from_slice(ftyp),
            None => tracing::warn!("moov arrived without a preceding ftyp"),
        }
        init.extend_from_slice(&moov);
        let init = init.freeze();

        let identical = self.previous_init.as_deref() == Some(&init[..]);
        if identical {
            // Codec parameters unchanged: clients can keep their decoder
            // state, so a pending discontinuity is dropped.
            self.pending_discontinuity = false;
        } else {
            self.init_version += 1;
        }

        self.previous_init = Some(init.clone());
        self.store.publish_init(self.init_version, init);
        self.state = State::Running;
        self.stats.saw_moov = true;
        tracing::info!(
            init_version = self.init_version,
            tracks = self.timescales.len(),
            identical_init = identical,
            "init segment published"
        );
    }

    fn on_moof(&mut self, mut data: BytesMut) {
        // Cut decision comes first: the arriving moof starts a new fragment,
        // so the buffered fragments form a complete segment. A buffer that
        // holds only pass-through boxes (styp without its fragment yet) is
        // never cut.
        if self.buffer_has_moof && self.should_cut() {
            self.emit_segment();
        }

        if let Some(diag) = &mut self.diagnostics {
            let status = mp4::first_sample_sync_status(&data, &self.trex);
            diag.record_moof(status, Instant::now());
            if !self.first_moof_checked {
                diag.record_segment_leading(status);
            }
        }
        self.first_moof_checked = true;

        match mp4::rewrite_timestamps(&mut data, &mut self.counters, &self.trex) {
            Ok(advanced) => {
                for (track_id, duration) in advanced {
                    self.record_track_duration(track_id, duration);
                }
            }
            Err(e) => {
                // The fragment keeps its source timestamps and still ships;
                // only this moof's counter advance is lost.
                self.stats.fragment_faults += 1;
                tracing::warn!(error = %e, "moof rewrite failed, passing fragment through");
            }
        }

        self.append(data.freeze());
        self.buffer_has_moof = true;
    }

    /// Apply the sanity clamp and accumulate the segment's media time.
    fn record_track_duration(&mut self, track_id: u32, duration: u64) {
        let recorded = match self.baselines.get(&track_id) {
            None => {
                // Baseline anchors to the first nonzero duration and never
                // moves, so one bursty fragment cannot poison it.
                if duration > 0 {
                    self.baselines.insert(track_id, duration);
                }
                duration
            }
            Some(&baseline) => {
                let too_long = duration > baseline.saturating_mul(20);
                let too_short = duration.saturating_mul(20) < baseline;
                if too_long || too_short {
                    let counter = self
                        .counters
                        .entry(track_id)
                        .or_insert(duration);
                    // Safe: the rewriter advanced this counter by `duration`
                    // just before we got here.
                    *counter = *counter - duration + baseline;
                    self.stats.duration_clamps += 1;
                    tracing::debug!(
                        track_id,
                        duration,
                        baseline,
                        "implausible fragment duration, clamped to baseline"
                    );
                    baseline
                } else {
                    duration
                }
            }
        };
        *self.accumulated.entry(track_id).or_insert(0) += recorded;
    }

    fn append(&mut self, data: Bytes) {
        if self.segment_start.is_none() {
            self.segment_start = Some(Instant::now());
        }
        self.buffer_bytes += data.len();
        self.buffer.push(data);
    }

    fn should_cut(&self) -> bool {
        // Nothing emitted yet: ship the very first moof+mdat pair as-is to
        // minimize time-to-first-byte.
        if !self.emitted_any {
            return true;
        }
        if self.buffered_media_secs() >= self.config.target_duration_secs {
            return true;
        }
        match self.segment_start {
            Some(start) => start.elapsed().as_secs_f64() >= self.config.target_duration_secs,
            None => false,
        }
    }

    /// Media time buffered so far, from rewritten (clamped) trun durations.
    fn buffered_media_secs(&self) -> f64 {
        self.accumulated
            .iter()
            .filter_map(|(track_id, units)| {
                let timescale = *self.timescales.get(track_id)?;
                (timescale > 0).then(|| *units as f64 / timescale as f64)
            })
            .fold(0.0f64, f64::max)
    }

    fn emit_segment(&mut self) {
        let index = self.next_index;

        if self.pending_discontinuity {
            self.discontinuity_indices.insert(index);
            self.pending_discontinuity = false;
        }

        let mut duration = self.buffered_media_secs();
        if duration <= 0.0 {
            duration = self
                .segment_start
                .map(|start| start.elapsed().as_secs_f64())
                .unwrap_or(0.0);
        }
        if duration < 0.1 {
            duration = 0.1;
        }

        let mut bytes = BytesMut::with_capacity(self.buffer_bytes);
        for chunk in &self.buffer {
            bytes.extend_from_slice(chunk);
        }
        let bytes = bytes.freeze();

        self.next_index += 1;
        self.emitted_any = true;
        self.stats.segments_emitted += 1;
        self.window_durations.insert(index, duration);

        let cutoff = self.next_index.saturating_sub(self.config.max_segments as u64);
        self.window_durations.retain(|&i, _| i >= cutoff);
        self.discontinuity_indices.retain(|&i| i >= cutoff);

        let segments: Vec<(u64, f64)> = self
            .window_durations
            .iter()
            .map(|(&i, &d)| (i, d))
            .collect();
        let playlist = render_media_playlist(&PlaylistContext {
            target_duration_secs: self.config.target_duration_secs,
            init_version: self.init_version,
            segments: &segments,
            discontinuities: &self.discontinuity_indices,
        });

        self.store
            .publish_segment(index, bytes, playlist, self.config.max_segments);
        tracing::debug!(index, duration, size = self.buffer_bytes, "segment emitted");

        self.buffer.clear();
        self.buffer_bytes = 0;
        self.buffer_has_moof = false;
        self.accumulated.clear();
        self.segment_start = None;
        self.first_moof_checked = false;
    }

    /// Flush the current buffer as a short segment and flag the next one.
    ///
    /// Called by supervision right before a disruptive source restart.
    pub fn mark_discontinuity(&mut self) {
        if self.state == State::Running && !self.buffer.is_empty() {
            self.emit_segment();
        }
        self.pending_discontinuity = true;
    }

    /// Natural end of the ingest stream: flush what is buffered.
    pub fn finish(&mut self) {
        if self.state == State::Running && !self.buffer.is_empty() {
            self.emit_segment();
        }
        self.state = State::Stopped;
    }

    /// Hard stop: the buffered fragment is dropped, further input discarded.
    pub fn stop(&mut self) {
        self.buffer.clear();
        self.buffer_bytes = 0;
        self.buffer_has_moof = false;
        self.state = State::Stopped;
    }

    pub fn is_stopped(&self) -> bool {
        self.state == State::Stopped
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            init_segment: self.previous_init.clone(),
            init_version: self.init_version,
            next_segment_index: self.next_index,
            track_timestamps: self.counters.clone(),
        }
    }

    pub fn stats(&self) -> SegmenterStats {
        self.stats.clone()
    }

    pub fn keyframe_stats(&self) -> Option<KeyframeStats> {
        self.diagnostics.as_ref().map(|d| d.snapshot())
    }
}
