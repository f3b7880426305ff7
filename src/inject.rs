//! Subtree replacement, plus adding and removing whole bases.
//!
//! The replacement must have the same [`NodeKind`] as the node it replaces.
//! Beyond that nothing about the new subtree is checked.

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::locator::{BaseHandle, BaseSchema};
use crate::tree::{NodeKind, Segment, Tree, TreePath};

/// Return a copy of `tree` with the base at `handle` replaced by `new`.
pub fn replace(tree: &Tree, handle: &BaseHandle, new: Tree) -> Result<Tree> {
    replace_at(tree, &handle.path, new)
}

pub fn replace_at(tree: &Tree, path: &TreePath, new: Tree) -> Result<Tree> {
    check(tree, path, &new)?;
    let mut out = tree.clone();
    replace_in_place(&mut out, path, new)?;
    Ok(out)
}

/// Swap `new` into `tree` at `path` and hand back the node it displaced.
/// On error `tree` is left exactly as it was.
pub fn replace_in_place(tree: &mut Tree, path: &TreePath, new: Tree) -> Result<Tree> {
    check(tree, path, &new)?;
    let slot = path
        .get_mut(tree)
        .ok_or_else(|| Error::StalePath(path.clone()))?;
    debug!(%path, kind = %NodeKind::of(&new), "subtree replaced");
    Ok(std::mem::replace(slot, new))
}

/// Append `base` to the end of the base array and return its path.
/// Existing handles stay valid.
pub fn add_base(tree: &mut Tree, schema: &BaseSchema, base: Tree) -> Result<TreePath> {
    let container = schema
        .locate_container(tree)
        .ok_or_else(|| Error::NoBaseContainer(schema.container_key.clone()))?;
    let items = container
        .get_mut(tree)
        .and_then(Value::as_array_mut)
        .ok_or_else(|| Error::StalePath(container.clone()))?;

    let path = container.index(items.len());
    let found = NodeKind::of(&base);
    if found != NodeKind::Object {
        return Err(Error::StructureMismatch { path, expected: NodeKind::Object, found });
    }
    items.push(base);
    debug!(%path, "base added");
    Ok(path)
}

/// Take the base at `handle` out of its array and return it.  The handle
/// must still point at a base of the same kind and name; every handle to a
/// later element of the array is stale afterwards.
pub fn remove_base(tree: &mut Tree, schema: &BaseSchema, handle: &BaseHandle) -> Result<Tree> {
    let stale = || Error::StalePath(handle.path.clone());
    let current = handle.path.get(tree).ok_or_else(stale)?;
    if schema.kind_of(current) != Some(handle.kind) || schema.name_of(current) != handle.name {
        return Err(stale());
    }
    let (Some(parent), Some(Segment::Index(i))) = (handle.path.parent(), handle.path.last()) else {
        return Err(stale());
    };
    let items = parent
        .get_mut(tree)
        .and_then(Value::as_array_mut)
        .ok_or_else(stale)?;
    debug!(path = %handle.path, name = %handle.name, "base removed");
    Ok(items.remove(*i))
}

fn check(tree: &Tree, path: &TreePath, new: &Tree) -> Result<()> {
    let current = path.get(tree).ok_or_else(|| Error::StalePath(path.clone()))?;
    let (expected, found) = (NodeKind::of(current), NodeKind::of(new));
    if expected != found {
        return Err(Error::StructureMismatch { path: path.clone(), expected, found });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::{select_by_name, BaseFilter, BaseSchema};
    use crate::tree::diff;
    use serde_json::json;

    fn schema() -> BaseSchema {
        BaseSchema {
            container_key: "bases".into(),
            type_path: vec!["type".into()],
            name_path: vec!["name".into()],
            ..BaseSchema::default()
        }
    }

    fn tree() -> Tree {
        json!({
            "bases": [
                {"type": "PlayerShipBase", "name": "Corvette", "parts": [1, 2]},
                {"type": "ExternalPlanetBase", "name": "Home", "parts": []}
            ],
            "other": {"kept": true}
        })
    }

    #[test]
    fn replacement_touches_only_the_base() {
        let original = tree();
        let handle = select_by_name(&original, &schema(), BaseFilter::Ship, "Corvette").unwrap();
        let new = json!({"type": "PlayerShipBase", "name": "Corvette", "parts": [1, 2, 3]});

        let edited = replace(&original, &handle, new.clone()).unwrap();
        assert_eq!(edited["bases"][0], new);
        assert_eq!(edited["bases"][1], original["bases"][1]);
        assert_eq!(diff(&original, &edited), vec![handle.path.key("parts")]);
        assert_eq!(original, tree());
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let original = tree();
        let handle = select_by_name(&original, &schema(), BaseFilter::Planet, "Home").unwrap();
        let err = replace(&original, &handle, json!([1, 2, 3])).unwrap_err();
        match err {
            Error::StructureMismatch { expected, found, .. } => {
                assert_eq!(expected, NodeKind::Object);
                assert_eq!(found, NodeKind::Array);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn in_place_failure_leaves_tree_alone() {
        let mut t = tree();
        let path = TreePath::root().key("bases").index(1);
        assert!(replace_in_place(&mut t, &path, json!("scalar")).is_err());
        assert_eq!(t, tree());
    }

    #[test]
    fn in_place_returns_old_node() {
        let mut t = tree();
        let path = TreePath::root().key("other");
        let old = replace_in_place(&mut t, &path, json!({"kept": false})).unwrap();
        assert_eq!(old, json!({"kept": true}));
        assert_eq!(diff(&tree(), &t), vec![path.key("kept")]);
    }

    #[test]
    fn added_base_is_found_last() {
        let mut t = tree();
        let new = json!({"type": "ExternalPlanetBase", "name": "Outpost"});
        let path = add_base(&mut t, &schema(), new.clone()).unwrap();
        assert_eq!(path, TreePath::root().key("bases").index(2));
        assert_eq!(path.get(&t), Some(&new));
        let handle = select_by_name(&t, &schema(), BaseFilter::Planet, "Outpost").unwrap();
        assert_eq!(handle.path, path);
        assert_eq!(t["other"], tree()["other"]);
    }

    #[test]
    fn add_rejects_non_object_and_missing_container() {
        let mut t = tree();
        let err = add_base(&mut t, &schema(), json!("Outpost")).unwrap_err();
        assert!(matches!(err, Error::StructureMismatch { expected: NodeKind::Object, .. }));
        assert_eq!(t, tree());

        let mut empty = json!({"other": {}});
        let err = add_base(&mut empty, &schema(), json!({})).unwrap_err();
        assert!(matches!(err, Error::NoBaseContainer(key) if key == "bases"));
    }

    #[test]
    fn remove_takes_out_one_base() {
        let mut t = tree();
        let handle = select_by_name(&t, &schema(), BaseFilter::Ship, "Corvette").unwrap();
        let removed = remove_base(&mut t, &schema(), &handle).unwrap();
        assert_eq!(removed, tree()["bases"][0]);
        assert_eq!(t["bases"], json!([tree()["bases"][1]]));

        // the same handle now points at "Home"
        assert!(matches!(remove_base(&mut t, &schema(), &handle), Err(Error::StalePath(_))));
        assert_eq!(t["bases"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn missing_path_is_stale() {
        let path = TreePath::root().key("bases").index(9);
        assert!(matches!(replace_at(&tree(), &path, json!({})), Err(Error::StalePath(_))));
    }
}
