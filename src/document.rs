//! Decoded byte stream ↔ [`Tree`].
//!
//! The game terminates the JSON text with one or more NUL bytes.  Their
//! count is kept in [`Document::trailing_nuls`] so a pure re-encode writes
//! back the same stream.  A stream holding more than one top-level value is
//! rejected rather than merged.

use serde_json::Deserializer;
use tracing::debug;

use crate::error::{Error, Result};
use crate::tree::Tree;

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub tree: Tree,
    pub trailing_nuls: usize,
}

impl Document {
    pub fn new(tree: Tree) -> Self {
        Self { tree, trailing_nuls: 0 }
    }

    /// Parse one decoded stream.
    pub fn parse(stream: &[u8]) -> Result<Self> {
        let trailing_nuls = stream.iter().rev().take_while(|&&b| b == 0).count();
        let body = &stream[..stream.len() - trailing_nuls];

        let mut values = Deserializer::from_slice(body).into_iter::<Tree>();
        let tree = match values.next() {
            Some(v) => v?,
            None => {
                return Err(Error::UnsupportedDocument(
                    "decoded stream holds no document".into(),
                ))
            }
        };
        let consumed = values.byte_offset();
        if body[consumed..].iter().any(|b| !b.is_ascii_whitespace()) {
            return Err(Error::UnsupportedDocument(format!(
                "{} byte(s) follow the first document at offset {consumed}; \
                 concatenated documents are not supported",
                body.len() - consumed
            )));
        }

        debug!(bytes = stream.len(), trailing_nuls, "document parsed");
        Ok(Self { tree, trailing_nuls })
    }

    /// Compact serialisation followed by the original NUL terminator.
    pub fn to_stream(&self) -> Result<Vec<u8>> {
        let mut out = serde_json::to_vec(&self.tree)?;
        out.resize(out.len() + self.trailing_nuls, 0);
        Ok(out)
    }
}

/// Pretty JSON with 4-space indentation, the copy-out format for a single
/// subtree.
pub fn to_pretty_json(tree: &Tree) -> Result<String> {
    use serde::Serialize;

    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    tree.serialize(&mut ser)?;
    String::from_utf8(out).map_err(|e| Error::UnsupportedDocument(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keeps_trailing_nuls() {
        let stream = b"{\"F2P\":\"1.0\"}\0".to_vec();
        let doc = Document::parse(&stream).unwrap();
        assert_eq!(doc.tree, json!({"F2P": "1.0"}));
        assert_eq!(doc.trailing_nuls, 1);
        assert_eq!(doc.to_stream().unwrap(), stream);
    }

    #[test]
    fn compact_reserialisation_is_byte_identical() {
        let stream = r#"{"b":1.50,"a":[true,null,"été"],"z":12345678901234567890}"#;
        let doc = Document::parse(stream.as_bytes()).unwrap();
        let out = doc.to_stream().unwrap();
        // key order and number text survive
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\"b\":1.50,\"a\":[true,null,\"été\"],\"z\":12345678901234567890}"
        );
    }

    #[test]
    fn trailing_whitespace_is_tolerated() {
        let doc = Document::parse(b"{\"a\":1}\n  ").unwrap();
        assert_eq!(doc.tree, json!({"a": 1}));
    }

    #[test]
    fn concatenated_documents_are_rejected() {
        let err = Document::parse(b"{\"a\":1}{\"b\":2}").unwrap_err();
        assert!(matches!(err, Error::UnsupportedDocument(_)));
    }

    #[test]
    fn empty_stream_is_rejected() {
        assert!(matches!(Document::parse(b"\0\0"), Err(Error::UnsupportedDocument(_))));
    }

    #[test]
    fn malformed_json_is_a_json_error() {
        assert!(matches!(Document::parse(b"{\"a\":"), Err(Error::Json(_))));
    }

    #[test]
    fn pretty_uses_four_spaces() {
        let text = to_pretty_json(&json!({"Name": "Home"})).unwrap();
        assert_eq!(text, "{\n    \"Name\": \"Home\"\n}");
    }
}
