//! Base discovery.
//!
//! Bases live in one array (by default `PersistentPlayerBases`) somewhere
//! near the top of the plain-key tree.  [`find_all`] locates that array
//! with a depth-bounded, document-order search and then yields a
//! [`BaseHandle`] for each element whose type tag matches the filter.
//! Handles are paths, not references; re-resolve them against the tree
//! after every edit.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::tree::{Tree, TreePath};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaseKind {
    ShipBase,
    PlanetBase,
}

impl fmt::Display for BaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            BaseKind::ShipBase   => "ship",
            BaseKind::PlanetBase => "planet",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BaseFilter {
    Ship,
    Planet,
    #[default]
    Either,
}

impl BaseFilter {
    pub fn matches(self, kind: BaseKind) -> bool {
        match self {
            BaseFilter::Ship   => kind == BaseKind::ShipBase,
            BaseFilter::Planet => kind == BaseKind::PlanetBase,
            BaseFilter::Either => true,
        }
    }
}

impl fmt::Display for BaseFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BaseFilter::Ship   => "ship",
            BaseFilter::Planet => "planet",
            BaseFilter::Either => "ship or planet",
        })
    }
}

impl FromStr for BaseFilter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ship" | "corvette" => Ok(BaseFilter::Ship),
            "planet"            => Ok(BaseFilter::Planet),
            "either" | "all"    => Ok(BaseFilter::Either),
            other => Err(format!("unknown base kind '{other}' (expected ship, planet or either)")),
        }
    }
}

/// Where bases live in the document and how they are tagged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseSchema {
    /// Object key holding the base array.
    pub container_key: String,
    /// How many levels below the root the container key may appear.
    pub max_depth: usize,
    /// Keys leading from a base to its type tag string.
    pub type_path: Vec<String>,
    /// Keys leading from a base to its display name.
    pub name_path: Vec<String>,
    pub ship_tag: String,
    pub planet_tag: String,
}

impl Default for BaseSchema {
    fn default() -> Self {
        Self {
            container_key: "PersistentPlayerBases".into(),
            max_depth: 6,
            type_path: vec!["BaseType".into(), "PersistentBaseTypes".into()],
            name_path: vec!["Name".into()],
            ship_tag: "PlayerShipBase".into(),
            planet_tag: "ExternalPlanetBase".into(),
        }
    }
}

impl BaseSchema {
    pub fn kind_of(&self, base: &Tree) -> Option<BaseKind> {
        let tag = follow(base, &self.type_path)?.as_str()?;
        if tag == self.ship_tag {
            Some(BaseKind::ShipBase)
        } else if tag == self.planet_tag {
            Some(BaseKind::PlanetBase)
        } else {
            None
        }
    }

    /// Display name, empty when the base has none.
    pub fn name_of(&self, base: &Tree) -> String {
        follow(base, &self.name_path)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned()
    }

    /// Path of the first array stored under `container_key`, in document
    /// order, no deeper than `max_depth`.
    pub fn locate_container(&self, tree: &Tree) -> Option<TreePath> {
        search(tree, &self.container_key, TreePath::root(), self.max_depth)
    }
}

fn follow<'a>(node: &'a Tree, keys: &[String]) -> Option<&'a Tree> {
    keys.iter().try_fold(node, |n, k| n.get(k.as_str()))
}

fn search(node: &Tree, key: &str, path: TreePath, depth: usize) -> Option<TreePath> {
    match node {
        Value::Object(map) => {
            for (k, v) in map {
                if k == key && v.is_array() {
                    return Some(path.key(k.as_str()));
                }
                if depth > 0 {
                    if let Some(found) = search(v, key, path.key(k.as_str()), depth - 1) {
                        return Some(found);
                    }
                }
            }
            None
        }
        Value::Array(items) if depth > 0 => items
            .iter()
            .enumerate()
            .find_map(|(i, v)| search(v, key, path.index(i), depth - 1)),
        _ => None,
    }
}

/// A located base.  Valid only against the tree it was found in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BaseHandle {
    pub path: TreePath,
    pub kind: BaseKind,
    pub name: String,
}

/// Lazy, restartable iterator over matching bases in document order.
#[derive(Debug, Clone)]
pub struct Bases<'a> {
    schema: &'a BaseSchema,
    filter: BaseFilter,
    container: TreePath,
    items: std::iter::Enumerate<std::slice::Iter<'a, Tree>>,
}

impl<'a> Iterator for Bases<'a> {
    type Item = BaseHandle;

    fn next(&mut self) -> Option<BaseHandle> {
        for (i, base) in self.items.by_ref() {
            let Some(kind) = self.schema.kind_of(base) else { continue };
            if self.filter.matches(kind) {
                return Some(BaseHandle {
                    path: self.container.index(i),
                    kind,
                    name: self.schema.name_of(base),
                });
            }
        }
        None
    }
}

pub fn find_all<'a>(tree: &'a Tree, schema: &'a BaseSchema, filter: BaseFilter) -> Bases<'a> {
    let container = schema.locate_container(tree).unwrap_or_default();
    let items: &'a [Tree] = match container.get(tree) {
        Some(Value::Array(items)) if !container.is_root() => items.as_slice(),
        _ => &[],
    };
    Bases {
        schema,
        filter,
        container,
        items: items.iter().enumerate(),
    }
}

pub fn resolve<'a>(tree: &'a Tree, handle: &BaseHandle) -> Result<&'a Tree> {
    handle
        .path
        .get(tree)
        .ok_or_else(|| Error::StalePath(handle.path.clone()))
}

/// Select the single base called `name`.  Two bases sharing the name is an
/// error, never a silent pick.
pub fn select_by_name(
    tree: &Tree,
    schema: &BaseSchema,
    filter: BaseFilter,
    name: &str,
) -> Result<BaseHandle> {
    let mut matches = find_all(tree, schema, filter).filter(|h| h.name == name);
    let first = matches.next().ok_or_else(|| Error::BaseNotFound {
        filter,
        query: format!("name {name:?}"),
    })?;
    let extra = matches.count();
    if extra > 0 {
        return Err(Error::AmbiguousBaseName {
            filter,
            name: name.to_owned(),
            count: extra + 1,
        });
    }
    Ok(first)
}

/// Select the `n`-th matching base (zero-based, document order).
pub fn select_nth(tree: &Tree, schema: &BaseSchema, filter: BaseFilter, n: usize) -> Result<BaseHandle> {
    find_all(tree, schema, filter)
        .nth(n)
        .ok_or_else(|| Error::BaseNotFound { filter, query: format!("index {n}") })
}

/// One row of a base listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BaseSummary {
    pub index: usize,
    pub name: String,
    pub kind: BaseKind,
    pub owner: String,
    pub owner_uid: String,
    pub game_mode: String,
    pub difficulty: String,
    pub objects: usize,
    pub path: String,
}

impl BaseSummary {
    pub fn new(index: usize, handle: &BaseHandle, base: &Tree) -> Self {
        let text = |keys: &[&str]| {
            keys.iter()
                .try_fold(base, |n, k| n.get(*k))
                .and_then(Value::as_str)
                .unwrap_or("Unknown")
                .to_owned()
        };
        Self {
            index,
            name: handle.name.clone(),
            kind: handle.kind,
            owner: text(&["Owner", "USN"]),
            owner_uid: text(&["Owner", "UID"]),
            game_mode: text(&["GameMode", "PresetGameMode"]),
            difficulty: text(&["Difficulty", "DifficultyPreset", "DifficultyPresetType"]),
            objects: base.get("Objects").and_then(Value::as_array).map_or(0, Vec::len),
            path: handle.path.to_string(),
        }
    }
}

/// Summaries of every matching base, numbered as [`select_nth`] counts.
pub fn summarize(tree: &Tree, schema: &BaseSchema, filter: BaseFilter) -> Vec<BaseSummary> {
    find_all(tree, schema, filter)
        .enumerate()
        .filter_map(|(i, h)| h.path.get(tree).map(|base| BaseSummary::new(i, &h, base)))
        .collect()
}

/// Copies of every matching base, in listing order, as one JSON array.
pub fn collect_bases(tree: &Tree, schema: &BaseSchema, filter: BaseFilter) -> Tree {
    Value::Array(
        find_all(tree, schema, filter)
            .filter_map(|h| h.path.get(tree).cloned())
            .collect(),
    )
}
