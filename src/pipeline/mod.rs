//! Per-stream re-segmentation pipeline
//!
//! One pipeline per tuned channel: bytes from the capture go in, versioned
//! init segments, media segments and playlist revisions come out through the
//! stream's segment store.

pub mod diagnostics;
pub mod playlist;
pub mod segmenter;
pub mod store;
pub mod supervisor;

pub use segmenter::{PipelineSeed, PipelineSnapshot, Segmenter, SegmenterConfig, SegmenterStats};
pub use store::{InitSegment, SegmentStore};
pub use supervisor::StreamSupervisor;

use crate::error::Result;
use crate::mp4::BoxParser;

/// Parser plus segmenter: the synchronous core of one capture session.
///
/// All state mutation happens on the ingest path; the segment store is the
/// only surface readers touch.
pub struct Pipeline {
    parser: BoxParser,
    segmenter: Segmenter,
}

impl Pipeline {
    pub fn new(segmenter: Segmenter) -> Self {
        Self {
            parser: BoxParser::new(),
            segmenter,
        }
    }

    /// Ingest one chunk of the capture byte stream.
    ///
    /// A parse error is unrecoverable: the pipeline stops itself and the
    /// error propagates to supervision exactly once.
    pub fn push(&mut self, chunk: &[u8]) -> Result<()> {
        if self.segmenter.is_stopped() {
            return Ok(());
        }
        match self.parser.push(chunk) {
            Ok(boxes) => {
                for media_box in boxes {
                    self.segmenter.handle_box(media_box);
                }
                Ok(())
            }
            Err(e) => {
                self.parser.flush();
                self.segmenter.stop();
                Err(e)
            }
        }
    }

    /// Natural end of the capture stream: flush the buffered fragment.
    pub fn finish(&mut self) {
        self.parser.flush();
        self.segmenter.finish();
    }

    /// Hard stop: drop buffered data, discard further input. Idempotent.
    pub fn stop(&mut self) {
        self.parser.flush();
        self.segmenter.stop();
    }

    pub fn mark_discontinuity(&mut self) {
        self.segmenter.mark_discontinuity();
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        self.segmenter.snapshot()
    }

    pub fn stats(&self) -> SegmenterStats {
        self.segmenter.stats()
    }

    pub fn keyframe_stats(&self) -> Option<diagnostics::KeyframeStats> {
        self.segmenter.keyframe_stats()
    }

    pub fn is_stopped(&self) -> bool {
        self.segmenter.is_stopped()
    }
}
