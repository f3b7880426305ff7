//! Interactive edit session.
//!
//! ```text
//! Unloaded ─load─▶ Loaded ─decode─▶ Decoded ─select─▶ BaseSelected
//!                    ▲                 ▲                  │ edit (dirty)
//!                    │                 ├────── inject ────┤
//!                    │                 └── remove_selected┘
//!                    └──────── save ───┘
//! ```
//!
//! `unload` returns to `Unloaded` from anywhere.  The state is derived from
//! which fields are populated, so it can never disagree with them.  The
//! session is dirty while the tree holds changes not yet saved or an edit
//! is staged.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::container::BlockCodec;
use crate::document::{to_pretty_json, Document};
use crate::error::{Error, Result};
use crate::header::Header;
use crate::inject::{self, replace_in_place};
use crate::keymap::{KeyMapping, UnmappedKeys};
use crate::locator::{self, BaseFilter, BaseHandle, BaseSchema, BaseSummary, Bases};
use crate::pipeline::{self, DecodedSave};
use crate::tree::{Tree, TreePath};
use crate::worker::{self, Job};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unloaded,
    Loaded,
    Decoded,
    BaseSelected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Unloaded     => "unloaded",
            SessionState::Loaded       => "loaded",
            SessionState::Decoded      => "decoded",
            SessionState::BaseSelected => "base-selected",
        })
    }
}

#[derive(Debug, Default)]
pub struct Session {
    codec: BlockCodec,
    schema: BaseSchema,

    raw: Option<Vec<u8>>,
    header: Option<Header>,
    document: Option<Document>,
    mapping: Option<Arc<KeyMapping>>,
    unmapped: UnmappedKeys,

    selected: Option<BaseHandle>,
    pending: Option<Tree>,
    /// The tree differs from the loaded bytes.
    modified: bool,
}

impl Session {
    pub fn new(codec: BlockCodec) -> Self {
        Self { codec, ..Self::default() }
    }

    pub fn with_schema(mut self, schema: BaseSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn state(&self) -> SessionState {
        match (&self.raw, &self.document, &self.selected) {
            (None, _, _)                => SessionState::Unloaded,
            (Some(_), None, _)          => SessionState::Loaded,
            (Some(_), Some(_), None)    => SessionState::Decoded,
            (Some(_), Some(_), Some(_)) => SessionState::BaseSelected,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.modified || self.pending.is_some()
    }

    pub fn codec(&self) -> &BlockCodec {
        &self.codec
    }

    pub fn schema(&self) -> &BaseSchema {
        &self.schema
    }

    pub fn raw_bytes(&self) -> Option<&[u8]> {
        self.raw.as_deref()
    }

    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    /// Plain-key tree, once decoded.
    pub fn tree(&self) -> Option<&Tree> {
        self.document.as_ref().map(|d| &d.tree)
    }

    /// Keys the last decode could not map.
    pub fn unmapped(&self) -> &UnmappedKeys {
        &self.unmapped
    }

    pub fn selected(&self) -> Option<&BaseHandle> {
        self.selected.as_ref()
    }

    /// Edit staged for the selected base, not yet injected.
    pub fn pending(&self) -> Option<&Tree> {
        self.pending.as_ref()
    }

    // ── Loading ──────────────────────────────────────────────────────────────

    /// Take ownership of a raw container.  Any previous session is dropped.
    pub fn load(&mut self, raw: Vec<u8>) {
        if self.is_dirty() {
            warn!(state = %self.state(), "discarding unsaved changes");
        }
        self.reset();
        info!(bytes = raw.len(), "container loaded");
        self.raw = Some(raw);
    }

    pub fn unload(&mut self) {
        if self.is_dirty() {
            warn!(state = %self.state(), "discarding unsaved changes");
        }
        self.reset();
    }

    fn reset(&mut self) {
        *self = Self {
            codec: self.codec,
            schema: std::mem::take(&mut self.schema),
            ..Self::default()
        };
    }

    pub fn decode(&mut self, mapping: Arc<KeyMapping>) -> Result<&UnmappedKeys> {
        let raw = self.raw_for("decode")?;
        let decoded = pipeline::decode_save(raw, &self.codec, &mapping)?;
        self.install_decoded(decoded, mapping)?;
        Ok(&self.unmapped)
    }

    /// Start decoding the loaded bytes on a worker thread.  Hand the
    /// result to [`install_decoded`](Self::install_decoded).
    pub fn decode_job(&self, mapping: Arc<KeyMapping>) -> Result<Job<DecodedSave>> {
        let raw = self.raw_for("decode")?;
        Ok(worker::spawn_decode(raw.to_vec(), self.codec, mapping))
    }

    /// Apply a decode produced for the currently loaded bytes.  A decode
    /// of any other bytes, such as one started before a reload, is refused
    /// with [`Error::StaleDecode`].
    pub fn install_decoded(&mut self, decoded: DecodedSave, mapping: Arc<KeyMapping>) -> Result<()> {
        let raw = self.raw_for("install a decode")?;
        if decoded.source != blake3::hash(raw) {
            warn!(source = %decoded.source, "decode result is for other bytes; ignored");
            return Err(Error::StaleDecode);
        }
        self.header = decoded.header;
        self.document = Some(decoded.document);
        self.unmapped = decoded.unmapped;
        self.mapping = Some(mapping);
        self.modified = false;
        Ok(())
    }

    fn raw_for(&self, op: &'static str) -> Result<&[u8]> {
        match (self.state(), &self.raw) {
            (SessionState::Loaded, Some(raw)) => Ok(raw.as_slice()),
            (state, _) => Err(Error::InvalidState { op, state }),
        }
    }

    // ── Selection ────────────────────────────────────────────────────────────

    fn decoded_tree(&self, op: &'static str) -> Result<&Tree> {
        self.tree()
            .ok_or(Error::InvalidState { op, state: self.state() })
    }

    pub fn bases(&self, filter: BaseFilter) -> Result<Bases<'_>> {
        let tree = self.decoded_tree("list bases")?;
        Ok(locator::find_all(tree, &self.schema, filter))
    }

    pub fn select(&mut self, filter: BaseFilter, name: &str) -> Result<&BaseHandle> {
        let handle = locator::select_by_name(self.decoded_tree("select")?, &self.schema, filter, name)?;
        Ok(self.set_selection(handle))
    }

    pub fn select_nth(&mut self, filter: BaseFilter, n: usize) -> Result<&BaseHandle> {
        let handle = locator::select_nth(self.decoded_tree("select")?, &self.schema, filter, n)?;
        Ok(self.set_selection(handle))
    }

    fn set_selection(&mut self, handle: BaseHandle) -> &BaseHandle {
        if self.pending.take().is_some() {
            warn!("staged edit dropped by new selection");
        }
        info!(name = %handle.name, kind = %handle.kind, path = %handle.path, "base selected");
        self.selected.insert(handle)
    }

    fn selection(&self) -> Result<&BaseHandle> {
        match self.state() {
            SessionState::BaseSelected => self.selected.as_ref().ok_or(Error::NoSelection),
            SessionState::Decoded => Err(Error::NoSelection),
            state => Err(Error::InvalidState { op: "use a selection", state }),
        }
    }

    /// The selected base as it currently stands in the tree.
    pub fn selected_base(&self) -> Result<&Tree> {
        let handle = self.selection()?;
        locator::resolve(self.decoded_tree("read a base")?, handle)
    }

    /// Selected base as 4-space pretty JSON.
    pub fn export_selected(&self) -> Result<String> {
        to_pretty_json(self.selected_base()?)
    }

    /// Every base matching `filter` as one pretty JSON array.
    pub fn export_bases(&self, filter: BaseFilter) -> Result<String> {
        let tree = self.decoded_tree("export bases")?;
        to_pretty_json(&locator::collect_bases(tree, &self.schema, filter))
    }

    pub fn summaries(&self, filter: BaseFilter) -> Result<Vec<BaseSummary>> {
        let tree = self.decoded_tree("list bases")?;
        Ok(locator::summarize(tree, &self.schema, filter))
    }

    // ── Editing ──────────────────────────────────────────────────────────────

    /// Stage a replacement for the selected base.  Nothing is checked until
    /// [`inject`](Self::inject).
    pub fn edit(&mut self, new: Tree) -> Result<()> {
        self.selection()?;
        self.pending = Some(new);
        Ok(())
    }

    pub fn edit_json(&mut self, text: &str) -> Result<()> {
        let new: Tree = serde_json::from_str(text)?;
        self.edit(new)
    }

    /// Write the staged edit into the tree.  On failure the tree, the
    /// selection and the staged edit are all left as they were.
    pub fn inject(&mut self) -> Result<()> {
        let path = self.selection()?.path.clone();
        let new = self.pending.clone().ok_or(Error::NoPendingEdit)?;
        let state = self.state();
        let document = self
            .document
            .as_mut()
            .ok_or(Error::InvalidState { op: "inject", state })?;

        replace_in_place(&mut document.tree, &path, new)?;
        info!(%path, "edit injected");
        self.pending = None;
        self.selected = None;
        self.modified = true;
        Ok(())
    }

    /// Append a base to the base array.  A current selection stays valid.
    pub fn add_base(&mut self, base: Tree) -> Result<TreePath> {
        let state = self.state();
        let document = self
            .document
            .as_mut()
            .ok_or(Error::InvalidState { op: "add a base", state })?;

        let path = inject::add_base(&mut document.tree, &self.schema, base)?;
        info!(%path, "base added");
        self.modified = true;
        Ok(path)
    }

    /// Take the selected base out of the tree and return it.  The selection
    /// and any staged edit go with it.
    pub fn remove_selected(&mut self) -> Result<Tree> {
        let handle = self.selection()?.clone();
        let state = self.state();
        let document = self
            .document
            .as_mut()
            .ok_or(Error::InvalidState { op: "remove a base", state })?;

        let removed = inject::remove_base(&mut document.tree, &self.schema, &handle)?;
        info!(name = %handle.name, path = %handle.path, "base removed");
        if self.pending.take().is_some() {
            warn!("staged edit dropped with its base");
        }
        self.selected = None;
        self.modified = true;
        Ok(removed)
    }

    // ── Saving ───────────────────────────────────────────────────────────────

    /// Re-encode the tree and go back to `Loaded` holding the new bytes.
    pub fn save(&mut self) -> Result<&[u8]> {
        self.save_with(|_| Ok(()))
    }

    /// Like [`save`](Self::save), handing the encoded bytes to `commit`
    /// first.  The session only moves on when `commit` succeeds; any error
    /// leaves it exactly as it was.
    pub fn save_with<F>(&mut self, commit: F) -> Result<&[u8]>
    where
        F: FnOnce(&[u8]) -> Result<()>,
    {
        let state = self.state();
        let ready = matches!(state, SessionState::Decoded | SessionState::BaseSelected);
        if !ready || self.pending.is_some() {
            return Err(Error::InvalidState { op: "save", state });
        }
        let (Some(document), Some(mapping)) = (&self.document, &self.mapping) else {
            return Err(Error::InvalidState { op: "save", state });
        };

        let raw = pipeline::encode_save(self.header.as_ref(), document, &self.codec, mapping)?;
        commit(&raw)?;

        info!(bytes = raw.len(), modified = self.modified, "session saved");
        self.document = None;
        self.selected = None;
        self.unmapped = UnmappedKeys::default();
        self.modified = false;
        let raw = self.raw.insert(raw);
        Ok(raw.as_slice())
    }
}
