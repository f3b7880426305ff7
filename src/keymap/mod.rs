//! Key obfuscation mapping.
//!
//! Save documents store every object key as a short opaque string
//! (`"F2P"` for `"Version"`, `"8>q"` for `"Platform"`, …).  A
//! [`KeyMapping`] holds both directions of that association and the two
//! transforms here rewrite every object key in a tree through it.
//!
//! Keys without a counterpart pass through unchanged and are collected in
//! [`UnmappedKeys`]; a stale or partial mapping never stops processing.
//!
//! Renames inside one object are resolved together: `a→b` with `b→a`
//! swaps the two keys, and `a→b` with `b→c` shifts both.  Only when two
//! keys would end up with the same name is the renamed one kept as it was.
//!
//! For a bijective mapping, and trees whose unmapped keys do not collide
//! with mapped names, `obfuscate(deobfuscate(t, m), m) == t`.

pub mod provider;

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};
use tracing::warn;

use crate::tree::Tree;

pub use provider::{parse_mapping, FileMappingProvider, MappingProvider};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyMapping {
    to_plain: HashMap<String, String>,
    to_obfuscated: HashMap<String, String>,
}

impl KeyMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one association.  Returns `false` when either side was already
    /// taken; the earlier association is kept.
    pub fn insert(&mut self, obfuscated: impl Into<String>, plain: impl Into<String>) -> bool {
        let (obfuscated, plain) = (obfuscated.into(), plain.into());
        if self.to_plain.contains_key(&obfuscated) || self.to_obfuscated.contains_key(&plain) {
            warn!(%obfuscated, %plain, "duplicate mapping entry ignored");
            return false;
        }
        self.to_plain.insert(obfuscated.clone(), plain.clone());
        self.to_obfuscated.insert(plain, obfuscated);
        true
    }

    pub fn plain(&self, obfuscated: &str) -> Option<&str> {
        self.to_plain.get(obfuscated).map(String::as_str)
    }

    pub fn obfuscated(&self, plain: &str) -> Option<&str> {
        self.to_obfuscated.get(plain).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.to_plain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_plain.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for KeyMapping {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut mapping = KeyMapping::new();
        for (obfuscated, plain) in iter {
            mapping.insert(obfuscated, plain);
        }
        mapping
    }
}

/// Keys that had no counterpart during a rename pass, with occurrence
/// counts.  Iterates in key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnmappedKeys {
    counts: BTreeMap<String, usize>,
}

impl UnmappedKeys {
    fn record(&mut self, key: &str) {
        *self.counts.entry(key.to_owned()).or_default() += 1;
    }

    pub fn contains(&self, key: &str) -> bool {
        self.counts.contains_key(key)
    }

    pub fn count(&self, key: &str) -> usize {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Number of distinct unmapped keys.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Total occurrences across the tree.
    pub fn occurrences(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counts.iter().map(|(k, n)| (k.as_str(), *n))
    }
}

/// A renamed tree plus the keys that could not be renamed.
#[derive(Debug, Clone, PartialEq)]
pub struct Mapped {
    pub tree: Tree,
    pub unmapped: UnmappedKeys,
}

/// Replace obfuscated keys with plain ones.
pub fn deobfuscate(tree: Tree, mapping: &KeyMapping) -> Mapped {
    rename_tree(tree, &mapping.to_plain)
}

/// Replace plain keys with obfuscated ones.
pub fn obfuscate(tree: Tree, mapping: &KeyMapping) -> Mapped {
    rename_tree(tree, &mapping.to_obfuscated)
}

/// `true` when the tree already carries plain keys, judged by a top-level
/// `Version` field.
pub fn looks_plain(tree: &Tree) -> bool {
    tree.get("Version").is_some()
}

fn rename_tree(tree: Tree, table: &HashMap<String, String>) -> Mapped {
    let mut unmapped = UnmappedKeys::default();
    let tree = rename(tree, table, &mut unmapped);
    if !unmapped.is_empty() {
        warn!(
            distinct = unmapped.len(),
            occurrences = unmapped.occurrences(),
            "keys without a mapping kept verbatim"
        );
    }
    Mapped { tree, unmapped }
}

fn rename(node: Tree, table: &HashMap<String, String>, unmapped: &mut UnmappedKeys) -> Tree {
    match node {
        Value::Object(map) => {
            let targets = {
                let keys: Vec<&String> = map.keys().collect();
                resolve_targets(&keys, table)
            };
            let mut out = Map::with_capacity(map.len());
            for ((key, value), target) in map.into_iter().zip(targets) {
                let value = rename(value, table, unmapped);
                let key = match target {
                    Some(renamed) => renamed,
                    None => {
                        unmapped.record(&key);
                        key
                    }
                };
                out.insert(key, value);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items.into_iter().map(|item| rename(item, table, unmapped)).collect(),
        ),
        scalar => scalar,
    }
}

/// New name for each key of one object, `None` where the key stays as is.
///
/// Renames are judged on the names the object ends up with, so swaps and
/// chains go through.  A rename whose result coincides with another key's
/// result falls back to the original key; repeat until the names are unique.
fn resolve_targets(keys: &[&String], table: &HashMap<String, String>) -> Vec<Option<String>> {
    let mut targets: Vec<Option<String>> = keys.iter().map(|k| table.get(*k).cloned()).collect();
    loop {
        let clashing: Vec<usize> = {
            let mut uses: HashMap<&str, usize> = HashMap::with_capacity(keys.len());
            for (key, target) in keys.iter().zip(&targets) {
                *uses.entry(target.as_deref().unwrap_or(key.as_str())).or_default() += 1;
            }
            targets
                .iter()
                .enumerate()
                .filter(|(_, t)| t.as_deref().is_some_and(|t| uses[t] > 1))
                .map(|(i, _)| i)
                .collect()
        };
        if clashing.is_empty() {
            return targets;
        }
        for i in clashing {
            targets[i] = None;
        }
    }
}
