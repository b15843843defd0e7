//! Incremental top-level box extractor
//!
//! Capture streams arrive with arbitrary TCP chunking, so the parser
//! accumulates pushed bytes and drains complete top-level boxes as they
//! become available. Nested parsing is left to the inspectors.

use bytes::BytesMut;

use super::boxes::{self, FourCc};
use crate::error::Result;

/// A complete top-level box, header included.
///
/// The payload is handed out as `BytesMut` so the moof rewriter can patch
/// timestamp fields in place before the bytes are frozen into a segment.
#[derive(Debug)]
pub struct MediaBox {
    pub kind: FourCc,
    pub data: BytesMut,
}

impl MediaBox {
    /// Length of this box's header (8, or 16 with an extended size).
    pub fn header_len(&self) -> usize {
        if self.data.len() >= 8 && self.data[..4] == [0, 0, 0, 1] {
            16
        } else {
            8
        }
    }

    /// The box payload, header stripped.
    pub fn payload(&self) -> &[u8] {
        &self.data[self.header_len()..]
    }
}

/// Incremental length-prefixed box extractor.
#[derive(Default)]
pub struct BoxParser {
    buf: BytesMut,
}

impl BoxParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every complete top-level box.
    ///
    /// A malformed header (size 0 or smaller than the header itself) is
    /// unrecoverable: the stream offset is lost, so no resynchronization is
    /// attempted and the caller must stop the pipeline.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<MediaBox>> {
        self.buf.extend_from_slice(chunk);

        let mut out = Vec::new();
        loop {
            let header = match boxes::parse_header(&self.buf)? {
                Some(h) => h,
                None => break,
            };
            if header.total_len > self.buf.len() as u64 {
                break;
            }
            // One splice per box: split the front of the accumulator off.
            let data = self.buf.split_to(header.total_len as usize);
            out.push(MediaBox {
                kind: header.kind,
                data,
            });
        }
        Ok(out)
    }

    /// Discard any residual partial box.
    pub fn flush(&mut self) {
        self.buf.clear();
    }

    /// Bytes currently buffered waiting for a complete box.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }
}
