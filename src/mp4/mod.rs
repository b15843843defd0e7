//! ISO BMFF (MP4) parsing and rewriting primitives
//!
//! This module handles the container-level work of the pipeline:
//! - Incremental top-level box extraction from a live byte stream
//! - One-shot moov inspection (track timescales, trex defaults)
//! - In-place moof timestamp rewriting and sync-sample inspection

pub mod boxes;
pub mod moof;
pub mod moov;
pub mod parser;

pub use boxes::FourCc;
pub use moof::{first_sample_sync_status, rewrite_timestamps, SyncStatus};
pub use moov::{parse_timescales, parse_trex_defaults, TrexDefaults};
pub use parser::{BoxParser, MediaBox};
