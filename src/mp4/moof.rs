//! In-place moof timestamp rewriting and sync-sample inspection
//!
//! Capture restarts reset the source's decode timeline, so every moof that
//! flows through the pipeline gets its `tfdt.baseMediaDecodeTime` overwritten
//! with a per-track running counter. Only fixed-width fields are touched, so
//! box sizes never move and the surrounding headers stay valid.

use std::collections::BTreeMap;

use super::boxes::{self, BoxWalker};
use super::moov::TrexDefaults;
use crate::error::{PrismError, Result};

// tfhd flag bits (ISO/IEC 14496-12 8.8.7)
const TFHD_BASE_DATA_OFFSET: u32 = 0x00_0001;
const TFHD_SAMPLE_DESC_INDEX: u32 = 0x00_0002;
const TFHD_DEFAULT_DURATION: u32 = 0x00_0008;
const TFHD_DEFAULT_SIZE: u32 = 0x00_0010;
const TFHD_DEFAULT_FLAGS: u32 = 0x00_0020;

// trun flag bits (8.8.8)
const TRUN_DATA_OFFSET: u32 = 0x00_0001;
const TRUN_FIRST_SAMPLE_FLAGS: u32 = 0x00_0004;
const TRUN_SAMPLE_DURATION: u32 = 0x00_0100;
const TRUN_SAMPLE_SIZE: u32 = 0x00_0200;
const TRUN_SAMPLE_FLAGS: u32 = 0x00_0400;
const TRUN_SAMPLE_CTS: u32 = 0x00_0800;

/// Keyframe status of a moof, from its first traf's first sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Sync,
    NonSync,
    /// No sample flags anywhere in the resolution chain.
    Indeterminate,
}

/// Everything learned about one traf during the validation pass.
#[derive(Debug)]
struct TrafPlan {
    track_id: u32,
    /// Absolute offset of baseMediaDecodeTime within the moof buffer.
    tfdt_value_offset: usize,
    tfdt_is_64bit: bool,
    /// Total sample duration across this traf's trun boxes, in track units.
    duration: u64,
}

/// Parsed tfhd fields relevant to the rewriter and diagnostics.
#[derive(Debug, Default, Clone, Copy)]
struct TfhdInfo {
    track_id: u32,
    default_duration: Option<u32>,
    default_flags: Option<u32>,
}

/// Rewrite every traf's `tfdt.baseMediaDecodeTime` to the running counter for
/// its track, then advance the counter by the traf's total trun duration.
///
/// Returns the advance applied per track. The whole moof is validated before
/// anything is written: on error the buffer is untouched and no counter has
/// moved, so the caller can pass the fragment through with its source
/// timestamps intact.
pub fn rewrite_timestamps(
    moof: &mut [u8],
    counters: &mut BTreeMap<u32, u64>,
    trex: &BTreeMap<u32, TrexDefaults>,
) -> Result<BTreeMap<u32, u64>> {
    let plans = plan_moof(moof, trex)?;

    let mut advanced: BTreeMap<u32, u64> = BTreeMap::new();
    for plan in plans {
        let counter = counters.entry(plan.track_id).or_insert(0);
        if plan.tfdt_is_64bit {
            moof[plan.tfdt_value_offset..plan.tfdt_value_offset + 8]
                .copy_from_slice(&counter.to_be_bytes());
        } else {
            // Version 0 tfdt carries 32 bits; the low word is what fits.
            moof[plan.tfdt_value_offset..plan.tfdt_value_offset + 4]
                .copy_from_slice(&(*counter as u32).to_be_bytes());
        }
        *counter += plan.duration;
        *advanced.entry(plan.track_id).or_insert(0) += plan.duration;
    }

    Ok(advanced)
}

/// Validation pass: locate and check every traf without writing anything.
fn plan_moof(moof: &[u8], trex: &BTreeMap<u32, TrexDefaults>) -> Result<Vec<TrafPlan>> {
    let header = boxes::parse_header(moof)?
        .ok_or_else(|| PrismError::Fragment("truncated moof header".into()))?;
    if header.kind != boxes::MOOF || header.total_len > moof.len() as u64 {
        return Err(PrismError::Fragment("not a complete moof box".into()));
    }

    let payload_base = header.header_len;
    let payload = &moof[payload_base..header.total_len as usize];

    let mut plans = Vec::new();
    let mut walker = BoxWalker::new(payload);
    while let Some(child) = walker
        .next_box()
        .map_err(|e| PrismError::Fragment(e.to_string()))?
    {
        if child.kind != boxes::TRAF {
            continue;
        }
        let traf = &payload[child.payload_start..child.end];
        let traf_base = payload_base + child.payload_start;
        plans.push(plan_traf(traf, traf_base, trex)?);
    }

    Ok(plans)
}

fn plan_traf(traf: &[u8], base: usize, trex: &BTreeMap<u32, TrexDefaults>) -> Result<TrafPlan> {
    let mut tfhd: Option<TfhdInfo> = None;
    let mut tfdt: Option<(usize, bool)> = None;
    let mut trun_bodies: Vec<&[u8]> = Vec::new();

    let mut walker = BoxWalker::new(traf);
    while let Some(child) = walker
        .next_box()
        .map_err(|e| PrismError::Fragment(e.to_string()))?
    {
        let body = &traf[child.payload_start..child.end];
        match child.kind {
            boxes::TFHD => tfhd = Some(parse_tfhd(body)?),
            boxes::TFDT => {
                let version = *body
                    .first()
                    .ok_or_else(|| PrismError::Fragment("empty tfdt".into()))?;
                let is_64bit = version == 1;
                let width = if is_64bit { 8 } else { 4 };
                if body.len() < 4 + width {
                    return Err(PrismError::Fragment("tfdt too short for its version".into()));
                }
                tfdt = Some((base + child.payload_start + 4, is_64bit));
            }
            boxes::TRUN => trun_bodies.push(body),
            _ => {}
        }
    }

    let tfhd = tfhd.ok_or_else(|| PrismError::Fragment("traf missing tfhd".into()))?;
    let (tfdt_value_offset, tfdt_is_64bit) =
        tfdt.ok_or_else(|| PrismError::Fragment("traf missing tfdt".into()))?;

    // Fallback chain for sample duration: trun per-sample, then the tfhd
    // default, then the trex default, then zero.
    let default_duration = tfhd
        .default_duration
        .or_else(|| trex.get(&tfhd.track_id).map(|t| t.sample_duration))
        .unwrap_or(0);

    let mut duration: u64 = 0;
    for body in trun_bodies {
        duration += trun_duration(body, default_duration)?;
    }

    Ok(TrafPlan {
        track_id: tfhd.track_id,
        tfdt_value_offset,
        tfdt_is_64bit,
        duration,
    })
}

fn parse_tfhd(body: &[u8]) -> Result<TfhdInfo> {
    let flags = boxes::be_u32(body, 0)
        .ok_or_else(|| PrismError::Fragment("tfhd too short".into()))?
        & 0x00FF_FFFF;
    let track_id = boxes::be_u32(body, 4)
        .ok_or_else(|| PrismError::Fragment("tfhd missing track_ID".into()))?;

    let mut offset = 8;
    if flags & TFHD_BASE_DATA_OFFSET != 0 {
        offset += 8;
    }
    if flags & TFHD_SAMPLE_DESC_INDEX != 0 {
        offset += 4;
    }
    let mut default_duration = None;
    if flags & TFHD_DEFAULT_DURATION != 0 {
        default_duration = Some(
            boxes::be_u32(body, offset)
                .ok_or_else(|| PrismError::Fragment("tfhd truncated at default duration".into()))?,
        );
        offset += 4;
    }
    if flags & TFHD_DEFAULT_SIZE != 0 {
        offset += 4;
    }
    let mut default_flags = None;
    if flags & TFHD_DEFAULT_FLAGS != 0 {
        default_flags = Some(
            boxes::be_u32(body, offset)
                .ok_or_else(|| PrismError::Fragment("tfhd truncated at default flags".into()))?,
        );
    }

    Ok(TfhdInfo {
        track_id,
        default_duration,
        default_flags,
    })
}

/// Sum the sample durations of one trun body.
fn trun_duration(body: &[u8], default_duration: u32) -> Result<u64> {
    let flags = boxes::be_u32(body, 0)
        .ok_or_else(|| PrismError::Fragment("trun too short".into()))?
        & 0x00FF_FFFF;
    let sample_count = boxes::be_u32(body, 4)
        .ok_or_else(|| PrismError::Fragment("trun missing sample count".into()))?;

    if flags & TRUN_SAMPLE_DURATION == 0 {
        return Ok(sample_count as u64 * default_duration as u64);
    }

    let mut offset = 8;
    if flags & TRUN_DATA_OFFSET != 0 {
        offset += 4;
    }
    if flags & TRUN_FIRST_SAMPLE_FLAGS != 0 {
        offset += 4;
    }
    let entry_width = trun_entry_width(flags);

    let needed = offset as u64 + sample_count as u64 * entry_width as u64;
    if needed > body.len() as u64 {
        return Err(PrismError::Fragment(format!(
            "trun declares {} samples but holds {} bytes",
            sample_count,
            body.len()
        )));
    }

    let mut sum: u64 = 0;
    for i in 0..sample_count as usize {
        // The duration is always the first field of a sample entry.
        let duration = boxes::be_u32(body, offset + i * entry_width)
            .ok_or_else(|| PrismError::Fragment("trun truncated inside sample table".into()))?;
        sum += duration as u64;
    }
    Ok(sum)
}

fn trun_entry_width(flags: u32) -> usize {
    let mut width = 0;
    if flags & TRUN_SAMPLE_DURATION != 0 {
        width += 4;
    }
    if flags & TRUN_SAMPLE_SIZE != 0 {
        width += 4;
    }
    if flags & TRUN_SAMPLE_FLAGS != 0 {
        width += 4;
    }
    if flags & TRUN_SAMPLE_CTS != 0 {
        width += 4;
    }
    width
}

/// Keyframe status of the moof: first sample of the first traf.
///
/// The resolution chain for the sample flags is: trun first-sample-flags,
/// trun per-sample flags, tfhd default, trex default. A sample counts as a
/// sync sample when `sample_is_non_sync_sample == 0` and
/// `sample_depends_on != 1`. Any parse trouble yields `Indeterminate` —
/// diagnostics never interfere with the pipeline.
pub fn first_sample_sync_status(moof: &[u8], trex: &BTreeMap<u32, TrexDefaults>) -> SyncStatus {
    match first_sample_flags(moof, trex) {
        Some(flags) => {
            let non_sync = (flags >> 16) & 0x1;
            let depends_on = (flags >> 24) & 0x3;
            if non_sync == 0 && depends_on != 1 {
                SyncStatus::Sync
            } else {
                SyncStatus::NonSync
            }
        }
        None => SyncStatus::Indeterminate,
    }
}

fn first_sample_flags(moof: &[u8], trex: &BTreeMap<u32, TrexDefaults>) -> Option<u32> {
    let header = boxes::parse_header(moof).ok()??;
    if header.kind != boxes::MOOF || header.total_len > moof.len() as u64 {
        return None;
    }
    let payload = &moof[header.header_len..header.total_len as usize];

    let mut walker = BoxWalker::new(payload);
    while let Ok(Some(child)) = walker.next_box() {
        if child.kind != boxes::TRAF {
            continue;
        }
        let traf = &payload[child.payload_start..child.end];

        let mut tfhd: Option<TfhdInfo> = None;
        let mut first_trun: Option<&[u8]> = None;
        let mut inner = BoxWalker::new(traf);
        while let Ok(Some(grand)) = inner.next_box() {
            let body = &traf[grand.payload_start..grand.end];
            match grand.kind {
                boxes::TFHD => tfhd = parse_tfhd(body).ok(),
                boxes::TRUN if first_trun.is_none() => first_trun = Some(body),
                _ => {}
            }
        }

        if let Some(trun) = first_trun {
            let flags = boxes::be_u32(trun, 0)? & 0x00FF_FFFF;
            let sample_count = boxes::be_u32(trun, 4)?;

            let mut offset = 8;
            if flags & TRUN_DATA_OFFSET != 0 {
                offset += 4;
            }
            if flags & TRUN_FIRST_SAMPLE_FLAGS != 0 {
                return boxes::be_u32(trun, offset);
            }

            if flags & TRUN_SAMPLE_FLAGS != 0 && sample_count > 0 {
                let mut field = offset;
                if flags & TRUN_SAMPLE_DURATION != 0 {
                    field += 4;
                }
                if flags & TRUN_SAMPLE_SIZE != 0 {
                    field += 4;
                }
                return boxes::be_u32(trun, field);
            }
        }

        if let Some(info) = tfhd {
            if let Some(flags) = info.default_flags {
                return Some(flags);
            }
            return trex.get(&info.track_id).map(|t| t.sample_flags);
        }
        return None;
    }
    None
}
