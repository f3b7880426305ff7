//! Crate-wide error taxonomy.
//!
//! Format and truncation errors are fatal to a load and never recovered
//! automatically.  Selection errors are recoverable by retrying with a
//! different filter or name.  Unmapped keys are not errors at all; see
//! [`crate::keymap::UnmappedKeys`].

use std::io;
use thiserror::Error;

use crate::locator::BaseFilter;
use crate::session::SessionState;
use crate::tree::{NodeKind, TreePath};

#[derive(Error, Debug)]
pub enum Error {
    /// Bad header or block magic, or a block that declares more than the
    /// per-block size limit.
    #[error("Container format error: {0}")]
    ContainerFormat(String),

    /// Declared sizes exceed the available bytes, or a payload does not
    /// decompress to its declared length.
    #[error("Truncated container: {0}")]
    TruncatedContainer(String),

    /// The decoded stream is not exactly one document.
    #[error("Unsupported document: {0}")]
    UnsupportedDocument(String),

    #[error("No {filter} base matches {query}")]
    BaseNotFound { filter: BaseFilter, query: String },

    #[error("{count} {filter} bases are named {name:?}; select by index instead")]
    AmbiguousBaseName { filter: BaseFilter, name: String, count: usize },

    /// Injection rejected; the target tree is left untouched.
    #[error("Cannot replace {expected} at {path} with {found}")]
    StructureMismatch { path: TreePath, expected: NodeKind, found: NodeKind },

    #[error("Path {0} no longer resolves; re-run base discovery")]
    StalePath(TreePath),

    #[error("No base is selected")]
    NoSelection,

    #[error("No edit is staged for the selected base")]
    NoPendingEdit,

    /// A background decode finished for bytes the session no longer holds.
    #[error("Decode result is for different container bytes than the ones loaded")]
    StaleDecode,

    /// No array under the schema's container key to add a base to.
    #[error("No {0:?} array found in the document")]
    NoBaseContainer(String),

    #[error("Cannot {op} while the session is {state}")]
    InvalidState { op: &'static str, state: SessionState },

    #[error("Key mapping error: {0}")]
    Mapping(String),

    #[error("Background job was cancelled")]
    Cancelled,

    #[error("Background job ended without reporting a result")]
    WorkerLost,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
