//! Synthetic fMP4 fixtures
//!
//! Builders for minimal but structurally honest ISO BMFF byte streams:
//! every box carries a correct size, version and flag layout, so the
//! fixtures exercise the same code paths a browser capture does.

use crate::mp4::boxes::{self, BoxWalker};

/// Write a box with a backpatched 32-bit size.
fn write_box(out: &mut Vec<u8>, kind: &[u8; 4], content: impl FnOnce(&mut Vec<u8>)) {
    let start = out.len();
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(kind);
    content(out);
    let size = (out.len() - start) as u32;
    out[start..start + 4].copy_from_slice(&size.to_be_bytes());
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// One track of a synthetic moov.
#[derive(Debug, Clone)]
pub struct TrackSpec {
    pub track_id: u32,
    pub timescale: u32,
    pub handler: [u8; 4],
    pub trex_default_duration: Option<u32>,
    pub trex_default_flags: Option<u32>,
}

impl TrackSpec {
    pub fn video(track_id: u32, timescale: u32) -> Self {
        Self {
            track_id,
            timescale,
            handler: *b"vide",
            trex_default_duration: None,
            trex_default_flags: None,
        }
    }

    pub fn audio(track_id: u32, timescale: u32) -> Self {
        Self {
            track_id,
            timescale,
            handler: *b"soun",
            trex_default_duration: None,
            trex_default_flags: None,
        }
    }
}

/// A fixed ftyp box (iso5 brand).
pub fn ftyp() -> Vec<u8> {
    let mut out = Vec::new();
    write_box(&mut out, b"ftyp", |w| {
        w.extend_from_slice(b"iso5");
        put_u32(w, 0);
        w.extend_from_slice(b"iso5");
        w.extend_from_slice(b"iso6");
        w.extend_from_slice(b"mp41");
    });
    out
}

/// A moov with one trak per spec and a trex for every track that sets
/// trex defaults.
pub fn moov_with_tracks(tracks: &[TrackSpec]) -> Vec<u8> {
    let mut out = Vec::new();
    write_box(&mut out, b"moov", |moov| {
        write_box(moov, b"mvhd", |w| {
            put_u32(w, 0); // version 0 + flags
            put_u32(w, 0); // creation
            put_u32(w, 0); // modification
            put_u32(w, 1000); // movie timescale
            put_u32(w, 0); // duration (live)
            put_u32(w, 0x0001_0000); // rate 1.0
            put_u16(w, 0x0100); // volume 1.0
            put_u16(w, 0);
            put_u64(w, 0);
            for &m in &[0x0001_0000u32, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000] {
                put_u32(w, m);
            }
            for _ in 0..6 {
                put_u32(w, 0); // pre_defined
            }
            put_u32(w, u32::MAX); // next track id
        });

        for track in tracks {
            write_box(moov, b"trak", |trak| {
                write_box(trak, b"tkhd", |w| {
                    put_u32(w, 0x0000_0007); // version 0, enabled flags
                    put_u32(w, 0); // creation
                    put_u32(w, 0); // modification
                    put_u32(w, track.track_id);
                    put_u32(w, 0); // reserved
                    put_u32(w, 0); // duration
                    put_u64(w, 0); // reserved
                    put_u16(w, 0); // layer
                    put_u16(w, 0); // alternate group
                    put_u16(w, 0); // volume
                    put_u16(w, 0); // reserved
                    for &m in &[0x0001_0000u32, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000] {
                        put_u32(w, m);
                    }
                    put_u32(w, 0); // width
                    put_u32(w, 0); // height
                });
                write_box(trak, b"mdia", |mdia| {
                    write_box(mdia, b"mdhd", |w| {
                        put_u32(w, 0); // version 0 + flags
                        put_u32(w, 0); // creation
                        put_u32(w, 0); // modification
                        put_u32(w, track.timescale);
                        put_u32(w, 0); // duration
                        put_u16(w, 0x55C4); // language "und"
                        put_u16(w, 0);
                    });
                    write_box(mdia, b"hdlr", |w| {
                        put_u32(w, 0);
                        put_u32(w, 0);
                        w.extend_from_slice(&track.handler);
                        put_u32(w, 0);
                        put_u32(w, 0);
                        put_u32(w, 0);
                        w.push(0);
                    });
                });
            });
        }

        let with_trex: Vec<&TrackSpec> = tracks
            .iter()
            .filter(|t| t.trex_default_duration.is_some() || t.trex_default_flags.is_some())
            .collect();
        if !with_trex.is_empty() {
            write_box(moov, b"mvex", |mvex| {
                for track in with_trex {
                    write_box(mvex, b"trex", |w| {
                        put_u32(w, 0);
                        put_u32(w, track.track_id);
                        put_u32(w, 1); // default sample description index
                        put_u32(w, track.trex_default_duration.unwrap_or(0));
                        put_u32(w, 0); // default sample size
                        put_u32(w, track.trex_default_flags.unwrap_or(0));
                    });
                }
            });
        }
    });
    out
}

/// `ftyp || moov` for the given tracks — a complete init stream prefix.
pub fn init_stream(tracks: &[TrackSpec]) -> Vec<u8> {
    let mut out = ftyp();
    out.extend_from_slice(&moov_with_tracks(tracks));
    out
}

/// One traf of a synthetic moof.
#[derive(Debug, Clone)]
pub struct TrafSpec {
    pub track_id: u32,
    pub decode_time: u64,
    pub tfdt_version: u8,
    pub omit_tfhd: bool,
    pub omit_tfdt: bool,
    /// tfhd default_sample_duration
    pub default_duration: Option<u32>,
    /// tfhd default_sample_flags
    pub default_flags: Option<u32>,
    /// Per-sample durations carried in the trun
    pub sample_durations: Option<Vec<u32>>,
    /// A trun with only a sample count (no per-sample durations)
    pub sample_count_without_durations: Option<u32>,
    /// Per-sample flags carried in the trun
    pub per_sample_flags: Option<Vec<u32>>,
    /// trun first-sample-flags field
    pub first_sample_flags: Option<u32>,
}

impl TrafSpec {
    pub fn new(track_id: u32, decode_time: u64) -> Self {
        Self {
            track_id,
            decode_time,
            tfdt_version: 1,
            omit_tfhd: false,
            omit_tfdt: false,
            default_duration: None,
            default_flags: None,
            sample_durations: None,
            sample_count_without_durations: None,
            per_sample_flags: None,
            first_sample_flags: None,
        }
    }

    pub fn with_sample_durations(mut self, durations: &[u32]) -> Self {
        self.sample_durations = Some(durations.to_vec());
        self
    }
}

/// Build a complete moof box (mfhd + one traf per spec).
pub fn moof_box(trafs: &[TrafSpec]) -> Vec<u8> {
    let mut out = Vec::new();
    write_box(&mut out, b"moof", |moof| {
        write_box(moof, b"mfhd", |w| {
            put_u32(w, 0);
            put_u32(w, 1); // sequence number
        });
        for spec in trafs {
            write_box(moof, b"traf", |traf| {
                if !spec.omit_tfhd {
                    let mut flags = 0u32;
                    if spec.default_duration.is_some() {
                        flags |= 0x0000_0008;
                    }
                    if spec.default_flags.is_some() {
                        flags |= 0x0000_0020;
                    }
                    write_box(traf, b"tfhd", |w| {
                        put_u32(w, flags);
                        put_u32(w, spec.track_id);
                        if let Some(duration) = spec.default_duration {
                            put_u32(w, duration);
                        }
                        if let Some(default_flags) = spec.default_flags {
                            put_u32(w, default_flags);
                        }
                    });
                }
                if !spec.omit_tfdt {
                    write_box(traf, b"tfdt", |w| {
                        if spec.tfdt_version == 1 {
                            put_u32(w, 0x0100_0000);
                            put_u64(w, spec.decode_time);
                        } else {
                            put_u32(w, 0);
                            put_u32(w, spec.decode_time as u32);
                        }
                    });
                }

                let sample_count = spec
                    .sample_durations
                    .as_ref()
                    .map(|d| d.len() as u32)
                    .or(spec.sample_count_without_durations)
                    .unwrap_or(0);

                let mut flags = 0x0000_0001u32; // data-offset present
                if spec.sample_durations.is_some() {
                    flags |= 0x0000_0100;
                }
                if spec.per_sample_flags.is_some() {
                    flags |= 0x0000_0400;
                }
                if spec.first_sample_flags.is_some() {
                    flags |= 0x0000_0004;
                }
                write_box(traf, b"trun", |w| {
                    put_u32(w, flags);
                    put_u32(w, sample_count);
                    put_u32(w, 0); // data offset, patched by muxers; unused here
                    if let Some(first) = spec.first_sample_flags {
                        put_u32(w, first);
                    }
                    for i in 0..sample_count as usize {
                        if let Some(durations) = &spec.sample_durations {
                            put_u32(w, durations[i]);
                        }
                        if let Some(sample_flags) = &spec.per_sample_flags {
                            put_u32(w, sample_flags[i]);
                        }
                    }
                });
            });
        }
    });
    out
}

/// An mdat box with `len` payload bytes.
pub fn mdat(len: usize) -> Vec<u8> {
    let mut out = Vec::new();
    write_box(&mut out, b"mdat", |w| {
        w.extend(std::iter::repeat(0xA5u8).take(len));
    });
    out
}

/// A moof+mdat pair: one track, per-sample durations, `mdat_len` media bytes.
pub fn media_fragment(track_id: u32, sample_durations: &[u32], mdat_len: usize) -> Vec<u8> {
    let mut out = moof_box(&[TrafSpec::new(track_id, 0).with_sample_durations(sample_durations)]);
    out.extend_from_slice(&mdat(mdat_len));
    out
}

/// Read back `(track_ID, baseMediaDecodeTime)` per traf from a moof.
pub fn read_tfdt_values(moof: &[u8]) -> Vec<(u32, u64)> {
    let mut values = Vec::new();
    let header = boxes::parse_header(moof).unwrap().unwrap();
    let payload = &moof[header.header_len..header.total_len as usize];

    let mut walker = BoxWalker::new(payload);
    while let Some(child) = walker.next_box().unwrap() {
        if child.kind != boxes::TRAF {
            continue;
        }
        let traf = &payload[child.payload_start..child.end];
        let mut track_id = 0;
        let mut decode_time = 0;
        let mut inner = BoxWalker::new(traf);
        while let Some(grand) = inner.next_box().unwrap() {
            let body = &traf[grand.payload_start..grand.end];
            match grand.kind {
                boxes::TFHD => track_id = boxes::be_u32(body, 4).unwrap(),
                boxes::TFDT => {
                    decode_time = if body[0] == 1 {
                        boxes::be_u64(body, 4).unwrap()
                    } else {
                        boxes::be_u32(body, 4).unwrap() as u64
                    };
                }
                _ => {}
            }
        }
        values.push((track_id, decode_time));
    }
    values
}
