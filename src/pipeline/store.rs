//! Per-stream segment store
//!
//! The only shared mutable surface between a pipeline and its HTTP readers:
//! a bounded ring of recent media segments, the current init segment, and
//! the current playlist text. The owning segmenter is the single writer;
//! a publish installs a segment and the playlist revision naming it under
//! one write lock, so a reader never sees a playlist entry whose bytes are
//! not yet fetchable.

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Current init segment with its cache-bust version.
#[derive(Debug, Clone)]
pub struct InitSegment {
    pub version: u32,
    pub bytes: Bytes,
}

#[derive(Default)]
struct StoreInner {
    /// (index, bytes), oldest first; evicted FIFO by index.
    segments: VecDeque<(u64, Bytes)>,
    init: Option<InitSegment>,
    playlist: Option<String>,
}

/// Store statistics for the status endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreStats {
    pub segment_count: usize,
    pub segment_bytes: usize,
    pub init_version: Option<u32>,
    pub oldest_index: Option<u64>,
    pub newest_index: Option<u64>,
}

/// In-memory store for one stream.
pub struct SegmentStore {
    inner: RwLock<StoreInner>,
    last_access: Mutex<Instant>,
}

impl SegmentStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            last_access: Mutex::new(Instant::now()),
        }
    }

    /// Install the init segment.
    pub fn publish_init(&self, version: u32, bytes: Bytes) {
        let mut inner = self.inner.write();
        inner.init = Some(InitSegment { version, bytes });
    }

    /// Install a media segment together with the playlist revision naming it,
    /// evicting segments that fell out of the window. Atomic for readers.
    pub fn publish_segment(&self, index: u64, bytes: Bytes, playlist: String, max_segments: usize) {
        let mut inner = self.inner.write();
        inner.segments.push_back((index, bytes));
        while inner.segments.len() > max_segments {
            inner.segments.pop_front();
        }
        inner.playlist = Some(playlist);
    }

    /// Current init segment, if the moov has been seen.
    pub fn init_segment(&self) -> Option<InitSegment> {
        self.touch();
        self.inner.read().init.clone()
    }

    /// Bytes for segment `index`, if still inside the ring.
    pub fn segment(&self, index: u64) -> Option<Bytes> {
        self.touch();
        let inner = self.inner.read();
        inner
            .segments
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, bytes)| bytes.clone())
    }

    /// Current playlist text, if any segment has been emitted.
    pub fn playlist(&self) -> Option<String> {
        self.touch();
        self.inner.read().playlist.clone()
    }

    /// Time since the last reader access.
    pub fn idle_for(&self) -> Duration {
        self.last_access.lock().elapsed()
    }

    /// Reset the idle clock (called on reader access and on attach).
    pub fn touch(&self) {
        *self.last_access.lock() = Instant::now();
    }

    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.read();
        StoreStats {
            segment_count: inner.segments.len(),
            segment_bytes: inner.segments.iter().map(|(_, b)| b.len()).sum(),
            init_version: inner.init.as_ref().map(|i| i.version),
            oldest_index: inner.segments.front().map(|(i, _)| *i),
            newest_index: inner.segments.back().map(|(i, _)| *i),
        }
    }
}

impl Default for SegmentStore {
    fn default() -> Self {
        Self::new()
    }
}
