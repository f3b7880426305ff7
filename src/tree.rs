//! The decoded document model.
//!
//! A [`Tree`] is a `serde_json::Value`: a closed sum type over objects,
//! arrays and scalars.  The crate enables `preserve_order`, so object keys
//! keep their document order through every transform, and
//! `arbitrary_precision`, so numbers keep their exact textual form.

use std::fmt;

use serde_json::Value;

pub type Tree = Value;

/// Variant kind of a node, as compared by the injector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Object,
    Array,
    /// String, number, bool or null.
    Scalar,
}

impl NodeKind {
    pub fn of(node: &Tree) -> Self {
        match node {
            Value::Object(_) => NodeKind::Object,
            Value::Array(_)  => NodeKind::Array,
            _                => NodeKind::Scalar,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeKind::Object => "object",
            NodeKind::Array  => "array",
            NodeKind::Scalar => "scalar",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Location of a node, as a sequence of keys and indices from the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TreePath(Vec<Segment>);

impl TreePath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn key(&self, key: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.0.push(Segment::Key(key.into()));
        next
    }

    pub fn index(&self, index: usize) -> Self {
        let mut next = self.clone();
        next.0.push(Segment::Index(index));
        next
    }

    pub fn last(&self) -> Option<&Segment> {
        self.0.last()
    }

    /// Path one level up; `None` at the root.
    pub fn parent(&self) -> Option<TreePath> {
        let (_, up) = self.0.split_last()?;
        Some(TreePath(up.to_vec()))
    }

    /// `true` when `self` is `prefix` or lies below it.
    pub fn starts_with(&self, prefix: &TreePath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub fn get<'a>(&self, tree: &'a Tree) -> Option<&'a Tree> {
        self.0.iter().try_fold(tree, |node, seg| match (seg, node) {
            (Segment::Key(k), Value::Object(map)) => map.get(k),
            (Segment::Index(i), Value::Array(items)) => items.get(*i),
            _ => None,
        })
    }

    pub fn get_mut<'a>(&self, tree: &'a mut Tree) -> Option<&'a mut Tree> {
        self.0.iter().try_fold(tree, |node, seg| match (seg, node) {
            (Segment::Key(k), Value::Object(map)) => map.get_mut(k),
            (Segment::Index(i), Value::Array(items)) => items.get_mut(*i),
            _ => None,
        })
    }
}

impl FromIterator<Segment> for TreePath {
    fn from_iter<I: IntoIterator<Item = Segment>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for seg in &self.0 {
            match seg {
                Segment::Key(k)   => write!(f, ".{k}")?,
                Segment::Index(i) => write!(f, "[{i}]")?,
            }
        }
        Ok(())
    }
}

/// Minimal set of paths at which `a` and `b` differ.
///
/// An object whose ordered key list changed, or an array whose length
/// changed, is reported as a whole; otherwise the walk descends and reports
/// the deepest differing nodes.  Equal trees produce an empty list.
pub fn diff(a: &Tree, b: &Tree) -> Vec<TreePath> {
    let mut out = Vec::new();
    diff_into(a, b, TreePath::root(), &mut out);
    out
}

fn diff_into(a: &Tree, b: &Tree, path: TreePath, out: &mut Vec<TreePath>) {
    match (a, b) {
        (Value::Object(x), Value::Object(y)) => {
            if !x.keys().eq(y.keys()) {
                out.push(path);
                return;
            }
            for (k, va) in x {
                if let Some(vb) = y.get(k) {
                    diff_into(va, vb, path.key(k.as_str()), out);
                }
            }
        }
        (Value::Array(x), Value::Array(y)) => {
            if x.len() != y.len() {
                out.push(path);
                return;
            }
            for (i, (va, vb)) in x.iter().zip(y).enumerate() {
                diff_into(va, vb, path.index(i), out);
            }
        }
        _ => {
            if a != b {
                out.push(path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kinds() {
        assert_eq!(NodeKind::of(&json!({})), NodeKind::Object);
        assert_eq!(NodeKind::of(&json!([])), NodeKind::Array);
        assert_eq!(NodeKind::of(&json!("s")), NodeKind::Scalar);
        assert_eq!(NodeKind::of(&json!(null)), NodeKind::Scalar);
        assert_eq!(NodeKind::of(&json!(1.5)), NodeKind::Scalar);
    }

    #[test]
    fn path_navigation_and_display() {
        let tree = json!({"a": {"b": [10, {"c": true}]}});
        let path = TreePath::root().key("a").key("b").index(1).key("c");
        assert_eq!(path.get(&tree), Some(&json!(true)));
        assert_eq!(path.to_string(), "$.a.b[1].c");
        assert_eq!(TreePath::root().key("a").index(0).get(&tree), None);
        assert_eq!(TreePath::root().get(&tree), Some(&tree));
        assert!(path.starts_with(&TreePath::root().key("a")));
        assert!(!TreePath::root().key("a").starts_with(&path));
    }

    #[test]
    fn get_mut_edits_in_place() {
        let mut tree = json!({"list": [1, 2, 3]});
        *TreePath::root().key("list").index(2).get_mut(&mut tree).unwrap() = json!(30);
        assert_eq!(tree, json!({"list": [1, 2, 30]}));
    }

    #[test]
    fn diff_reports_deepest_change() {
        let a = json!({"x": 1, "y": {"z": [1, 2]}});
        let b = json!({"x": 1, "y": {"z": [1, 3]}});
        assert_eq!(diff(&a, &b), vec![TreePath::root().key("y").key("z").index(1)]);
        assert!(diff(&a, &a).is_empty());
    }

    #[test]
    fn diff_reports_reordered_object_as_whole() {
        let a = json!({"x": 1, "y": 2});
        let b = json!({"y": 2, "x": 1});
        assert_eq!(diff(&a, &b), vec![TreePath::root()]);
    }

    #[test]
    fn diff_reports_kind_change() {
        let a = json!({"base": {"Name": "Home"}});
        let b = json!({"base": ["Home"]});
        assert_eq!(diff(&a, &b), vec![TreePath::root().key("base")]);
    }
}
