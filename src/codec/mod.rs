//! Block compression.
//!
//! Every block payload is a raw LZ4 block: no frame, no prepended size.
//! The uncompressed length travels in the block header instead, so
//! decompression is told exactly how many bytes to produce and fails if the
//! payload disagrees.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Decompression error: {0}")]
    Decompression(String),
    #[error("Decompressed {actual} bytes, header declares {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Compress one chunk into a raw LZ4 block.
pub fn compress(data: &[u8]) -> Vec<u8> {
    lz4_flex::block::compress(data)
}

/// Decompress a raw LZ4 block that must expand to exactly `expected_len`
/// bytes.
pub fn decompress(data: &[u8], expected_len: usize) -> Result<Vec<u8>, CodecError> {
    let mut out = vec![0u8; expected_len];
    let written = lz4_flex::block::decompress_into(data, &mut out)
        .map_err(|e| CodecError::Decompression(e.to_string()))?;
    if written != expected_len {
        return Err(CodecError::LengthMismatch { expected: expected_len, actual: written });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lz4_roundtrip() {
        let data = br#"{"F2P":"1.0","8>q":"PS4","a":[1,1,1,1,1,1,1,1,1,1,1,1]}"#;
        let packed = compress(data);
        assert_eq!(decompress(&packed, data.len()).unwrap(), data.to_vec());
    }

    #[test]
    fn short_declared_length_fails() {
        let data = vec![0x42u8; 4096];
        let packed = compress(&data);
        assert!(decompress(&packed, 100).is_err());
    }

    #[test]
    fn long_declared_length_is_a_mismatch() {
        let data = b"hello block".to_vec();
        let packed = compress(&data);
        match decompress(&packed, data.len() + 5) {
            Err(CodecError::LengthMismatch { expected, actual }) => {
                assert_eq!(expected, data.len() + 5);
                assert_eq!(actual, data.len());
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn garbage_payload_fails() {
        assert!(decompress(&[0xFF, 0xFF, 0xFF, 0xFF], 64).is_err());
    }
}
