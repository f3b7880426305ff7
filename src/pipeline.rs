//! Whole-save decode and encode.
//!
//! ```text
//! raw ─BlockCodec::decode─▶ stream ─Document::parse─▶ tree ─deobfuscate─▶ plain tree
//! plain tree ─obfuscate─▶ tree ─Document::to_stream─▶ stream ─BlockCodec::encode─▶ raw
//! ```
//!
//! Both directions are pure.  The `_cancellable` variants check a
//! [`CancelToken`] between phases and are what background jobs run.

use tracing::info;

use crate::container::{BlockCodec, BlockInfo};
use crate::document::Document;
use crate::error::Result;
use crate::header::Header;
use crate::keymap::{deobfuscate, obfuscate, KeyMapping, UnmappedKeys};
use crate::worker::CancelToken;

/// A fully decoded save, keys already in plain form.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSave {
    pub header: Option<Header>,
    pub document: Document,
    pub unmapped: UnmappedKeys,
    pub blocks: Vec<BlockInfo>,
    /// BLAKE3 of the raw container this was decoded from.
    pub source: blake3::Hash,
}

pub fn decode_save(raw: &[u8], codec: &BlockCodec, mapping: &KeyMapping) -> Result<DecodedSave> {
    decode_save_cancellable(raw, codec, mapping, &CancelToken::new())
}

pub fn decode_save_cancellable(
    raw: &[u8],
    codec: &BlockCodec,
    mapping: &KeyMapping,
    cancel: &CancelToken,
) -> Result<DecodedSave> {
    let container = codec.decode(raw)?;
    cancel.check()?;
    let parsed = Document::parse(&container.stream)?;
    cancel.check()?;
    let mapped = deobfuscate(parsed.tree, mapping);

    info!(
        blocks = container.blocks.len(),
        bytes = container.stream.len(),
        unmapped = mapped.unmapped.len(),
        "save decoded"
    );
    Ok(DecodedSave {
        header: container.header,
        document: Document { tree: mapped.tree, trailing_nuls: parsed.trailing_nuls },
        unmapped: mapped.unmapped,
        blocks: container.blocks,
        source: blake3::hash(raw),
    })
}

/// Obfuscate a copy of `document` and pack it.  `document` is unchanged.
pub fn encode_save(
    header: Option<&Header>,
    document: &Document,
    codec: &BlockCodec,
    mapping: &KeyMapping,
) -> Result<Vec<u8>> {
    encode_save_cancellable(header, document, codec, mapping, &CancelToken::new())
}

pub fn encode_save_cancellable(
    header: Option<&Header>,
    document: &Document,
    codec: &BlockCodec,
    mapping: &KeyMapping,
    cancel: &CancelToken,
) -> Result<Vec<u8>> {
    let mapped = obfuscate(document.tree.clone(), mapping);
    cancel.check()?;
    let stream = Document { tree: mapped.tree, trailing_nuls: document.trailing_nuls }.to_stream()?;
    cancel.check()?;
    let raw = codec.encode(header, &stream)?;

    info!(bytes = stream.len(), compressed = raw.len(), "save encoded");
    Ok(raw)
}
