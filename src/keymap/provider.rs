//! Where a [`KeyMapping`] comes from.
//!
//! The mapping is published as MBINCompiler's `mapping.json`:
//!
//! ```json
//! {"libMBIN_version": "5.x", "Mapping": [{"Key": "F2P", "Value": "Version"}]}
//! ```
//!
//! Caches sometimes store only the bare `Mapping` list, so both shapes are
//! accepted.  Downloading and caching are left to the caller; a provider
//! only has to hand back a snapshot.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use super::KeyMapping;
use crate::error::{Error, Result};

pub trait MappingProvider {
    fn load(&self) -> Result<KeyMapping>;
}

/// A mapping already in memory is its own provider.
impl MappingProvider for KeyMapping {
    fn load(&self) -> Result<KeyMapping> {
        Ok(self.clone())
    }
}

#[derive(Debug, Clone)]
pub struct FileMappingProvider {
    path: PathBuf,
}

impl FileMappingProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MappingProvider for FileMappingProvider {
    fn load(&self) -> Result<KeyMapping> {
        let bytes = std::fs::read(&self.path)?;
        let mapping = parse_mapping(&bytes)
            .map_err(|e| Error::Mapping(format!("{}: {e}", self.path.display())))?;
        info!(path = %self.path.display(), entries = mapping.len(), "key mapping loaded");
        Ok(mapping)
    }
}

#[derive(Deserialize)]
struct MappingEntry {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Value")]
    value: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MappingFile {
    Wrapped {
        #[serde(rename = "Mapping")]
        mapping: Vec<MappingEntry>,
    },
    Bare(Vec<MappingEntry>),
}

/// Parse either shape of `mapping.json`.
pub fn parse_mapping(bytes: &[u8]) -> Result<KeyMapping> {
    let file: MappingFile = serde_json::from_slice(bytes).map_err(|e| {
        Error::Mapping(format!("expected a Mapping list of Key/Value entries ({e})"))
    })?;
    let entries = match file {
        MappingFile::Wrapped { mapping } => mapping,
        MappingFile::Bare(entries) => entries,
    };
    Ok(entries.into_iter().map(|e| (e.key, e.value)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn parses_wrapped_file() {
        let text = br#"{"libMBIN_version":"5.0","Mapping":[{"Key":"F2P","Value":"Version"}]}"#;
        let m = parse_mapping(text).unwrap();
        assert_eq!(m.plain("F2P"), Some("Version"));
    }

    #[test]
    fn parses_bare_list() {
        let text = br#"[{"Key":"8>q","Value":"Platform"},{"Key":"F2P","Value":"Version"}]"#;
        let m = parse_mapping(text).unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m.obfuscated("Platform"), Some("8>q"));
    }

    #[test]
    fn rejects_other_shapes() {
        assert!(matches!(parse_mapping(br#"{"F2P":"Version"}"#), Err(Error::Mapping(_))));
    }

    #[test]
    fn file_provider_reads_from_disk() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"{"Mapping":[{"Key":"F2P","Value":"Version"}]}"#).unwrap();
        let m = FileMappingProvider::new(file.path()).load().unwrap();
        assert_eq!(m.plain("F2P"), Some("Version"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let provider = FileMappingProvider::new("/nonexistent/mapping.json");
        assert!(matches!(provider.load(), Err(Error::Io(_))));
    }
}
