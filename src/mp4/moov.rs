//! One-shot moov inspection
//!
//! The moov is parsed exactly once per pipeline, right before the init
//! segment is published. Only the fields the segmenter needs come out:
//! per-track timescales for EXTINF math and trex defaults for the moof
//! rewriter and keyframe diagnostics.
//!
//! Both walks are deliberately forgiving: a malformed trak or trex is
//! skipped and the remaining tracks still contribute, so a partial (or
//! empty) map is a valid result.

use std::collections::BTreeMap;

use super::boxes::{self, BoxWalker};

/// Defaults carried by a track's `trex` box.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrexDefaults {
    pub sample_duration: u32,
    pub sample_flags: u32,
}

/// Extract `track_ID → timescale` from a complete moov box (header included).
pub fn parse_timescales(moov: &[u8]) -> BTreeMap<u32, u32> {
    let mut timescales = BTreeMap::new();

    let payload = match moov_payload(moov) {
        Some(p) => p,
        None => return timescales,
    };

    let mut walker = BoxWalker::new(payload);
    while let Ok(Some(child)) = walker.next_box() {
        if child.kind != boxes::TRAK {
            continue;
        }
        let trak = &payload[child.payload_start..child.end];
        if let Some((track_id, timescale)) = inspect_trak(trak) {
            timescales.insert(track_id, timescale);
        }
    }

    timescales
}

/// Extract `track_ID → trex defaults` from a complete moov box.
pub fn parse_trex_defaults(moov: &[u8]) -> BTreeMap<u32, TrexDefaults> {
    let mut defaults = BTreeMap::new();

    let payload = match moov_payload(moov) {
        Some(p) => p,
        None => return defaults,
    };

    let mut walker = BoxWalker::new(payload);
    while let Ok(Some(child)) = walker.next_box() {
        if child.kind != boxes::MVEX {
            continue;
        }
        let mvex = &payload[child.payload_start..child.end];
        let mut inner = BoxWalker::new(mvex);
        while let Ok(Some(trex)) = inner.next_box() {
            if trex.kind != boxes::TREX {
                continue;
            }
            let body = &mvex[trex.payload_start..trex.end];
            // version+flags(4), track_ID(4), default_sample_description_index(4),
            // default_sample_duration(4), default_sample_size(4), default_sample_flags(4)
            let track_id = match boxes::be_u32(body, 4) {
                Some(id) => id,
                None => continue,
            };
            let sample_duration = boxes::be_u32(body, 12).unwrap_or(0);
            let sample_flags = boxes::be_u32(body, 20).unwrap_or(0);
            defaults.insert(
                track_id,
                TrexDefaults {
                    sample_duration,
                    sample_flags,
                },
            );
        }
    }

    defaults
}

/// Strip the moov header, verifying the box really is a moov.
fn moov_payload(moov: &[u8]) -> Option<&[u8]> {
    let header = boxes::parse_header(moov).ok()??;
    if header.kind != boxes::MOOV || header.total_len > moov.len() as u64 {
        return None;
    }
    Some(&moov[header.header_len..header.total_len as usize])
}

/// Pair `tkhd.track_ID` with `mdhd.timescale` inside one trak payload.
fn inspect_trak(trak: &[u8]) -> Option<(u32, u32)> {
    let mut track_id = None;
    let mut timescale = None;

    let mut walker = BoxWalker::new(trak);
    while let Ok(Some(child)) = walker.next_box() {
        match child.kind {
            boxes::TKHD => {
                let body = &trak[child.payload_start..child.end];
                let version = *body.first()?;
                // v0: version+flags(4), creation(4), modification(4), track_ID(4)
                // v1: version+flags(4), creation(8), modification(8), track_ID(4)
                let offset = if version == 1 { 20 } else { 12 };
                track_id = boxes::be_u32(body, offset);
            }
            boxes::MDIA => {
                let mdia = &trak[child.payload_start..child.end];
                let mut inner = BoxWalker::new(mdia);
                while let Ok(Some(grand)) = inner.next_box() {
                    if grand.kind != boxes::MDHD {
                        continue;
                    }
                    let body = &mdia[grand.payload_start..grand.end];
                    let version = *body.first()?;
                    // v0: version+flags(4), creation(4), modification(4), timescale(4)
                    // v1: version+flags(4), creation(8), modification(8), timescale(4)
                    let offset = if version == 1 { 20 } else { 12 };
                    timescale = boxes::be_u32(body, offset);
                }
            }
            _ => {}
        }
    }

    Some((track_id?, timescale?))
}
