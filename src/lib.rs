pub mod error;
pub mod header;
pub mod codec;
pub mod block;
pub mod container;
pub mod scan;
pub mod tree;
pub mod document;
pub mod keymap;
pub mod locator;
pub mod inject;
pub mod pipeline;
pub mod session;
pub mod worker;

pub use error::{Error, Result};
pub use header::Header;
pub use container::{BlockCodec, DecodedContainer, Layout};
pub use tree::{diff, NodeKind, Tree, TreePath};
pub use document::Document;
pub use keymap::{deobfuscate, obfuscate, KeyMapping, MappingProvider, UnmappedKeys};
pub use locator::{find_all, BaseFilter, BaseHandle, BaseKind, BaseSchema};
pub use inject::{add_base, remove_base, replace};
pub use pipeline::{decode_save, encode_save, DecodedSave};
pub use session::{Session, SessionState};
