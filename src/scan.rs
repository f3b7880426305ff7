//! Tolerant block scanner for damaged containers.
//!
//! # How it works
//!
//! [`BlockCodec::decode`](crate::container::BlockCodec::decode) stops at the
//! first defect.  The scanner instead walks the block headers one by one and
//! grades each block.  When a header's magic is wrong it searches forward for
//! the next `E5 A1 ED FE` sequence and resumes there, counting the bytes it
//! had to skip.  It never returns an error for corrupt data; every defect is
//! recorded as a [`BlockHealth`] entry in the report.
//!
//! ## Block health
//!
//! - `Healthy`: magic valid, payload present, decompresses to the declared size
//! - `Oversized`: declares more than 512 KiB uncompressed; skipped
//! - `TruncatedPayload`: fewer bytes follow than `compressed_size` declares
//! - `Corrupt`: payload present but does not decompress to the declared size

use tracing::{debug, warn};

use crate::block::{decode_block, BlockHeader, BLOCK_HEADER_SIZE, BLOCK_MAGIC};
use crate::container::Layout;
use crate::header::{Header, HEADER_SIZE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockHealth {
    Healthy,
    Oversized { declared: u32 },
    TruncatedPayload { declared: u32, available: usize },
    Corrupt { reason: String },
}

impl BlockHealth {
    pub fn is_usable(&self) -> bool {
        matches!(self, BlockHealth::Healthy)
    }
}

/// Diagnostic record for one block position.
#[derive(Debug, Clone)]
pub struct ScannedBlock {
    /// Byte offset of the block header in the container.
    pub offset: usize,
    pub header: BlockHeader,
    pub health: BlockHealth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanQuality {
    /// Every block healthy and no bytes skipped.
    Full,
    /// At least one usable block, but something was skipped or damaged.
    Partial,
    /// Nothing usable.
    Empty,
}

#[derive(Debug, Clone)]
pub struct ScanReport {
    pub layout: Layout,
    pub header: Option<Header>,
    /// Why the header could not be read, for framed containers.
    pub header_error: Option<String>,
    pub blocks: Vec<ScannedBlock>,
    /// Bytes jumped over while searching for the next block magic.
    pub skipped_bytes: usize,
    /// Sum of `uncompressed_size` over healthy blocks.
    pub recoverable_bytes: u64,
    pub quality: ScanQuality,
}

impl ScanReport {
    pub fn healthy_blocks(&self) -> usize {
        self.blocks.iter().filter(|b| b.health.is_usable()).count()
    }

    pub fn summary(&self) -> String {
        format!(
            "{:?} scan: {}/{} blocks healthy, {} byte(s) skipped, {:.2} KiB recoverable",
            self.quality,
            self.healthy_blocks(),
            self.blocks.len(),
            self.skipped_bytes,
            self.recoverable_bytes as f64 / 1024.0,
        )
    }
}

/// Scan `raw` and grade every block it can find.
pub fn scan(raw: &[u8], layout: Layout) -> ScanReport {
    walk(raw, layout, None)
}

/// Scan `raw` and return the concatenated payloads of every healthy block
/// alongside the report.  The stream has gaps wherever blocks were lost.
pub fn salvage(raw: &[u8], layout: Layout) -> (Vec<u8>, ScanReport) {
    let mut stream = Vec::new();
    let report = walk(raw, layout, Some(&mut stream));
    (stream, report)
}

fn walk(raw: &[u8], layout: Layout, mut sink: Option<&mut Vec<u8>>) -> ScanReport {
    let (header, header_error, mut pos) = match layout {
        Layout::Bare => (None, None, 0),
        Layout::Framed => match Header::read(raw) {
            Ok(h)  => (Some(h), None, HEADER_SIZE),
            Err(e) => (None, Some(e.to_string()), HEADER_SIZE.min(raw.len())),
        },
    };

    let mut blocks            = Vec::new();
    let mut skipped_bytes     = 0usize;
    let mut recoverable_bytes = 0u64;

    while raw.len() - pos >= BLOCK_HEADER_SIZE {
        let header = match BlockHeader::read(&raw[pos..pos + BLOCK_HEADER_SIZE]) {
            Ok(h)  => h,
            Err(_) => break,
        };

        if !header.has_valid_magic() {
            // Resync on the next block magic.
            match find_magic(&raw[pos + 1..]) {
                Some(rel) => {
                    skipped_bytes += rel + 1;
                    pos += rel + 1;
                    continue;
                }
                None => {
                    skipped_bytes += raw.len() - pos;
                    pos = raw.len();
                    break;
                }
            }
        }

        let payload_start = pos + BLOCK_HEADER_SIZE;
        let available     = raw.len() - payload_start;
        let declared      = header.compressed_size as usize;

        let health = if header.is_oversized() {
            BlockHealth::Oversized { declared: header.uncompressed_size }
        } else if declared > available {
            BlockHealth::TruncatedPayload { declared: header.compressed_size, available }
        } else {
            match decode_block(&header, &raw[payload_start..payload_start + declared]) {
                Ok(chunk) => {
                    recoverable_bytes += chunk.len() as u64;
                    if let Some(out) = sink.as_deref_mut() {
                        out.extend_from_slice(&chunk);
                    }
                    BlockHealth::Healthy
                }
                Err(e) => BlockHealth::Corrupt { reason: e.to_string() },
            }
        };

        if !health.is_usable() {
            warn!(offset = pos, health = ?health, "damaged block");
        }
        blocks.push(ScannedBlock { offset: pos, header, health });

        // A truncated payload runs to the end of input; nothing follows it.
        pos = (payload_start + declared).min(raw.len());
    }
    skipped_bytes += raw.len() - pos;

    let healthy = blocks.iter().filter(|b| b.health.is_usable()).count();
    let quality = if healthy == 0 {
        ScanQuality::Empty
    } else if healthy == blocks.len() && skipped_bytes == 0 && header_error.is_none() {
        ScanQuality::Full
    } else {
        ScanQuality::Partial
    };

    debug!(blocks = blocks.len(), healthy, skipped_bytes, "scan complete");
    ScanReport {
        layout,
        header,
        header_error,
        blocks,
        skipped_bytes,
        recoverable_bytes,
        quality,
    }
}

fn find_magic(haystack: &[u8]) -> Option<usize> {
    let magic = BLOCK_MAGIC.to_le_bytes();
    haystack.windows(magic.len()).position(|w| w == magic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::encode_block;

    fn push_block(out: &mut Vec<u8>, data: &[u8]) {
        let (header, payload) = encode_block(data);
        header.write(&mut *out).unwrap();
        out.extend_from_slice(&payload);
    }

    #[test]
    fn clean_container_is_full() {
        let mut raw = Vec::new();
        Header::default().write(&mut raw).unwrap();
        push_block(&mut raw, b"{\"a\":");
        push_block(&mut raw, b"1}");
        let report = scan(&raw, Layout::Framed);
        assert_eq!(report.quality, ScanQuality::Full);
        assert_eq!(report.healthy_blocks(), 2);
        assert_eq!(report.recoverable_bytes, 7);
        assert_eq!(report.skipped_bytes, 0);
    }

    #[test]
    fn resyncs_past_garbage() {
        let mut raw = Vec::new();
        push_block(&mut raw, b"first");
        raw.extend_from_slice(b"garbage!");
        push_block(&mut raw, b"second");

        let (stream, report) = salvage(&raw, Layout::Bare);
        assert_eq!(stream, b"firstsecond".to_vec());
        assert_eq!(report.skipped_bytes, 8);
        assert_eq!(report.healthy_blocks(), 2);
        assert_eq!(report.quality, ScanQuality::Partial);
    }

    #[test]
    fn reports_truncated_tail() {
        let mut raw = Vec::new();
        push_block(&mut raw, b"complete block");
        push_block(&mut raw, b"this one loses its tail");
        raw.truncate(raw.len() - 4);

        let report = scan(&raw, Layout::Bare);
        assert_eq!(report.blocks.len(), 2);
        assert!(report.blocks[0].health.is_usable());
        assert!(matches!(
            report.blocks[1].health,
            BlockHealth::TruncatedPayload { .. }
        ));
        assert_eq!(report.quality, ScanQuality::Partial);
    }

    #[test]
    fn corrupt_payload_is_graded() {
        let mut raw = Vec::new();
        BlockHeader::new(4, 64).write(&mut raw).unwrap();
        raw.extend_from_slice(&[0xFF; 4]);
        let report = scan(&raw, Layout::Bare);
        assert!(matches!(report.blocks[0].health, BlockHealth::Corrupt { .. }));
        assert_eq!(report.quality, ScanQuality::Empty);
    }

    #[test]
    fn bad_header_is_reported_not_fatal() {
        let mut raw = vec![0u8; HEADER_SIZE];
        push_block(&mut raw, b"data");
        let report = scan(&raw, Layout::Framed);
        assert!(report.header.is_none());
        assert!(report.header_error.is_some());
        assert_eq!(report.healthy_blocks(), 1);
        assert_eq!(report.quality, ScanQuality::Partial);
    }
}
