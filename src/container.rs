//! Whole-container codec.
//!
//! # Layout
//! A framed container is an 18-byte [`Header`] followed by zero or more
//! blocks, each a 16-byte [`BlockHeader`] plus `compressed_size` bytes of
//! raw LZ4.  Bare containers (as written by the game itself) start with the
//! first block at offset 0.
//!
//! # Round-trip law
//! Block boundaries chosen by [`BlockCodec::encode`] need not match the
//! ones in the original file.  Only the concatenated decoded stream is
//! guaranteed: `decode(encode(d)).stream == d.stream`.

use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::block::{decode_block, encode_block, BlockHeader, BLOCK_HEADER_SIZE, MAX_BLOCK_SIZE};
use crate::codec::CodecError;
use crate::error::{Error, Result};
use crate::header::{Header, HEADER_SIZE};

/// Default per-block chunk size for encoding.
pub const DEFAULT_BLOCK_SIZE_LIMIT: usize = MAX_BLOCK_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    /// Header followed by blocks.
    #[default]
    Framed,
    /// Blocks from offset 0, no header.
    Bare,
}

impl Layout {
    pub fn name(self) -> &'static str {
        match self {
            Layout::Framed => "framed",
            Layout::Bare   => "bare",
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Layout {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "framed" => Ok(Layout::Framed),
            "bare"   => Ok(Layout::Bare),
            other    => Err(format!("unknown layout '{other}' (expected framed or bare)")),
        }
    }
}

/// Position and sizes of one block as found in the source container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub offset: usize,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodedContainer {
    /// `None` for bare containers.
    pub header: Option<Header>,
    /// Concatenation of every block's decompressed payload, in file order.
    pub stream: Vec<u8>,
    pub blocks: Vec<BlockInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockCodec {
    pub layout: Layout,
    pub block_size_limit: usize,
}

impl Default for BlockCodec {
    fn default() -> Self {
        Self::new(Layout::Framed)
    }
}

struct Frame<'a> {
    offset: usize,
    header: BlockHeader,
    payload: &'a [u8],
}

impl BlockCodec {
    pub fn new(layout: Layout) -> Self {
        Self { layout, block_size_limit: DEFAULT_BLOCK_SIZE_LIMIT }
    }

    /// Chunk size used by [`encode`](Self::encode), clamped to
    /// `1..=MAX_BLOCK_SIZE`.
    pub fn with_block_size_limit(mut self, limit: usize) -> Self {
        self.block_size_limit = limit.clamp(1, MAX_BLOCK_SIZE);
        self
    }

    pub fn decode(&self, raw: &[u8]) -> Result<DecodedContainer> {
        let (header, start) = match self.layout {
            Layout::Framed => (Some(Header::read(raw)?), HEADER_SIZE),
            Layout::Bare   => (None, 0),
        };

        let frames = split_frames(raw, start)?;
        let blocks: Vec<BlockInfo> = frames
            .iter()
            .map(|f| BlockInfo {
                offset: f.offset,
                compressed_size: f.header.compressed_size,
                uncompressed_size: f.header.uncompressed_size,
            })
            .collect();

        let total: usize = blocks.iter().map(|b| b.uncompressed_size as usize).sum();
        let mut stream = Vec::with_capacity(total);
        for chunk in decompress_frames(&frames)? {
            stream.extend_from_slice(&chunk);
        }

        debug!(
            layout = %self.layout,
            blocks = blocks.len(),
            compressed = raw.len(),
            decoded = stream.len(),
            "container decoded"
        );
        Ok(DecodedContainer { header, stream, blocks })
    }

    /// Emit `header` (when given) followed by one block per chunk of
    /// `stream`.  Never touches its inputs.
    pub fn encode(&self, header: Option<&Header>, stream: &[u8]) -> Result<Vec<u8>> {
        let limit = self.block_size_limit.clamp(1, MAX_BLOCK_SIZE);
        let chunks: Vec<&[u8]> = stream.chunks(limit).collect();
        let encoded = compress_chunks(&chunks);

        let payload_len: usize = encoded.iter().map(|(_, p)| BLOCK_HEADER_SIZE + p.len()).sum();
        let mut out = Vec::with_capacity(HEADER_SIZE + payload_len);
        if let Some(header) = header {
            header.write(&mut out)?;
        }
        for (block_header, payload) in &encoded {
            block_header.write(&mut out)?;
            out.extend_from_slice(payload);
        }

        debug!(
            blocks = encoded.len(),
            decoded = stream.len(),
            compressed = out.len(),
            "container encoded"
        );
        Ok(out)
    }
}

/// Decode a framed container with default settings.
pub fn decode(raw: &[u8]) -> Result<DecodedContainer> {
    BlockCodec::default().decode(raw)
}

/// Re-encode a decoded container, keeping its header.
pub fn encode(decoded: &DecodedContainer, block_size_limit: usize) -> Result<Vec<u8>> {
    BlockCodec::default()
        .with_block_size_limit(block_size_limit)
        .encode(decoded.header.as_ref(), &decoded.stream)
}

fn split_frames(raw: &[u8], start: usize) -> Result<Vec<Frame<'_>>> {
    let mut frames = Vec::new();
    let mut pos = start;

    while pos < raw.len() {
        let remaining = raw.len() - pos;
        if remaining < BLOCK_HEADER_SIZE {
            return Err(Error::TruncatedContainer(format!(
                "block header at offset {pos} needs {BLOCK_HEADER_SIZE} bytes, {remaining} available"
            )));
        }
        let header = BlockHeader::read(&raw[pos..pos + BLOCK_HEADER_SIZE])?;
        if !header.has_valid_magic() {
            return Err(Error::ContainerFormat(format!(
                "block magic {:#010x} at offset {pos}",
                header.magic
            )));
        }
        if header.is_oversized() {
            return Err(Error::ContainerFormat(format!(
                "block at offset {pos} declares {} uncompressed bytes (limit {MAX_BLOCK_SIZE})",
                header.uncompressed_size
            )));
        }

        let payload_start = pos + BLOCK_HEADER_SIZE;
        let declared = header.compressed_size as usize;
        let available = raw.len() - payload_start;
        if declared > available {
            return Err(Error::TruncatedContainer(format!(
                "block at offset {pos} declares {declared} payload bytes, {available} available"
            )));
        }

        frames.push(Frame {
            offset: pos,
            header,
            payload: &raw[payload_start..payload_start + declared],
        });
        pos = payload_start + declared;
    }
    Ok(frames)
}

fn decompress_frame(frame: &Frame<'_>) -> Result<Vec<u8>> {
    decode_block(&frame.header, frame.payload).map_err(|e| match e {
        CodecError::LengthMismatch { expected, actual } => Error::TruncatedContainer(format!(
            "block at offset {} decompressed to {actual} bytes, header declares {expected}",
            frame.offset
        )),
        CodecError::Decompression(reason) => Error::TruncatedContainer(format!(
            "block at offset {} does not decompress: {reason}",
            frame.offset
        )),
    })
}

#[cfg(feature = "parallel")]
fn decompress_frames(frames: &[Frame<'_>]) -> Result<Vec<Vec<u8>>> {
    use rayon::prelude::*;
    frames.par_iter().map(decompress_frame).collect()
}

#[cfg(not(feature = "parallel"))]
fn decompress_frames(frames: &[Frame<'_>]) -> Result<Vec<Vec<u8>>> {
    frames.iter().map(decompress_frame).collect()
}

#[cfg(feature = "parallel")]
fn compress_chunks(chunks: &[&[u8]]) -> Vec<(BlockHeader, Vec<u8>)> {
    use rayon::prelude::*;
    chunks.par_iter().map(|c| encode_block(c)).collect()
}

#[cfg(not(feature = "parallel"))]
fn compress_chunks(chunks: &[&[u8]]) -> Vec<(BlockHeader, Vec<u8>)> {
    chunks.iter().map(|c| encode_block(c)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BLOCK_MAGIC;

    fn raw_block(payload: &[u8]) -> Vec<u8> {
        let (header, packed) = encode_block(payload);
        let mut out = Vec::new();
        header.write(&mut out).unwrap();
        out.extend_from_slice(&packed);
        out
    }

    fn framed(blocks: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        Header::default().write(&mut out).unwrap();
        for b in blocks {
            out.extend(raw_block(b));
        }
        out
    }

    #[test]
    fn decodes_blocks_in_file_order() {
        let raw = framed(&[b"{\"a\":", b"[1,2],", b"\"b\":null}"]);
        let decoded = decode(&raw).unwrap();
        assert_eq!(decoded.stream, b"{\"a\":[1,2],\"b\":null}".to_vec());
        assert_eq!(decoded.blocks.len(), 3);
        assert_eq!(decoded.blocks[0].offset, HEADER_SIZE);
        assert_eq!(decoded.header, Some(Header::default()));
    }

    #[test]
    fn header_only_decodes_to_empty_stream() {
        let raw = framed(&[]);
        let decoded = decode(&raw).unwrap();
        assert!(decoded.stream.is_empty());
        assert!(decoded.blocks.is_empty());
    }

    #[test]
    fn bare_layout_has_no_header() {
        let raw = raw_block(b"{\"x\":1}");
        let decoded = BlockCodec::new(Layout::Bare).decode(&raw).unwrap();
        assert_eq!(decoded.header, None);
        assert_eq!(decoded.stream, b"{\"x\":1}".to_vec());
    }

    #[test]
    fn bad_block_magic_is_format_error() {
        let mut raw = framed(&[b"payload"]);
        raw[HEADER_SIZE] ^= 0xFF;
        assert!(matches!(decode(&raw), Err(Error::ContainerFormat(_))));
    }

    #[test]
    fn oversize_block_is_format_error() {
        let mut raw = Vec::new();
        Header::default().write(&mut raw).unwrap();
        BlockHeader::new(0, MAX_BLOCK_SIZE as u32 + 1).write(&mut raw).unwrap();
        assert!(matches!(decode(&raw), Err(Error::ContainerFormat(_))));
    }

    #[test]
    fn payload_past_end_is_truncated() {
        let mut raw = framed(&[b"some payload bytes"]);
        raw.truncate(raw.len() - 3);
        assert!(matches!(decode(&raw), Err(Error::TruncatedContainer(_))));
    }

    #[test]
    fn partial_block_header_is_truncated() {
        let mut raw = framed(&[b"ok"]);
        raw.extend_from_slice(&BLOCK_MAGIC.to_le_bytes());
        assert!(matches!(decode(&raw), Err(Error::TruncatedContainer(_))));
    }

    #[test]
    fn wrong_declared_length_is_truncated() {
        let data = b"twelve bytes";
        let packed = crate::codec::compress(data);
        let mut raw = Vec::new();
        Header::default().write(&mut raw).unwrap();
        BlockHeader::new(packed.len() as u32, data.len() as u32 + 4).write(&mut raw).unwrap();
        raw.extend_from_slice(&packed);
        assert!(matches!(decode(&raw), Err(Error::TruncatedContainer(_))));
    }

    #[test]
    fn encode_splits_on_limit() {
        let stream: Vec<u8> = (0u8..=255).cycle().take(1000).collect();
        let codec = BlockCodec::default().with_block_size_limit(300);
        let raw = codec.encode(Some(&Header::default()), &stream).unwrap();
        let decoded = codec.decode(&raw).unwrap();
        assert_eq!(decoded.stream, stream);
        let sizes: Vec<u32> = decoded.blocks.iter().map(|b| b.uncompressed_size).collect();
        assert_eq!(sizes, vec![300, 300, 300, 100]);
    }

    #[test]
    fn limit_is_clamped() {
        assert_eq!(BlockCodec::default().with_block_size_limit(0).block_size_limit, 1);
        assert_eq!(
            BlockCodec::default().with_block_size_limit(usize::MAX).block_size_limit,
            MAX_BLOCK_SIZE
        );
    }

    #[test]
    fn encode_keeps_header_metadata() {
        let header = Header::new([9; 14]);
        let decoded = DecodedContainer {
            header: Some(header),
            stream: b"{}".to_vec(),
            blocks: Vec::new(),
        };
        let raw = encode(&decoded, DEFAULT_BLOCK_SIZE_LIMIT).unwrap();
        assert_eq!(decode(&raw).unwrap().header, Some(header));
    }

    #[test]
    fn layout_parses_from_name() {
        assert_eq!("Bare".parse::<Layout>().unwrap(), Layout::Bare);
        assert_eq!("framed".parse::<Layout>().unwrap(), Layout::Framed);
        assert!("zip".parse::<Layout>().is_err());
    }
}
