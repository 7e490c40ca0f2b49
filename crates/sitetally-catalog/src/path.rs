//! Path addressing
//!
//! A [`Path`] is the key/index chain from the catalog root to one entry.
//! Discovery produces paths; the scheduler writes results back through them.
//! Writes walk intermediate mappings with autovivification (a missing key is
//! created as an empty mapping) but never grow sequences.

use crate::model::{CatalogNode, Entry, EntryPatch};
use crate::{CatalogError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::btree_map;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl PathSegment {
    /// Key used when this segment addresses a mapping.
    fn as_key(&self) -> Cow<'_, str> {
        match self {
            PathSegment::Key(key) => Cow::Borrowed(key),
            PathSegment::Index(index) => Cow::Owned(index.to_string()),
        }
    }

    /// Index used when this segment addresses a sequence of `len` items.
    fn as_index(&self, len: usize) -> Option<usize> {
        let index = match self {
            PathSegment::Index(index) => *index,
            PathSegment::Key(key) => key.trim().parse::<usize>().ok()?,
        };
        (index < len).then_some(index)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Index(index) => write!(f, "{index}"),
            PathSegment::Key(key) => f.write_str(key),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<PathSegment>);

impl Path {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(keys.into_iter().map(|key| PathSegment::Key(key.into())).collect())
    }

    pub fn child(&self, segment: PathSegment) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<PathSegment>> for Path {
    fn from(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<root>");
        }
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

fn invalid(path: &Path, reason: impl Into<String>) -> CatalogError {
    CatalogError::InvalidPath {
        path: path.to_string(),
        reason: reason.into(),
    }
}

/// Read-only lookup. Never creates anything.
pub fn get<'a>(root: &'a CatalogNode, path: &Path) -> Option<&'a CatalogNode> {
    let mut current = root;
    for segment in path.segments() {
        current = match current {
            CatalogNode::Group(children) => children.get(segment.as_key().as_ref())?,
            CatalogNode::List(items) => &items[segment.as_index(items.len())?],
            CatalogNode::Entry(_) | CatalogNode::Value(_) => return None,
        };
    }
    Some(current)
}

/// Read-only walk to the parent of the final segment.
///
/// `Ok(None)` means the parent does not exist yet and [`resolve_parent`]
/// would create it as an empty mapping.
fn find_parent<'a>(root: &'a CatalogNode, path: &Path) -> Result<Option<&'a CatalogNode>> {
    let Some((_, init)) = path.segments().split_last() else {
        return Err(invalid(path, "empty path"));
    };

    let mut current = Some(root);
    for (depth, segment) in init.iter().enumerate() {
        current = match current {
            None => None,
            Some(CatalogNode::Group(children)) => match children.get(segment.as_key().as_ref()) {
                None | Some(CatalogNode::Value(Value::Null)) => None,
                Some(child) => Some(child),
            },
            Some(CatalogNode::List(items)) => {
                let len = items.len();
                let index = segment.as_index(len).ok_or_else(|| {
                    invalid(
                        path,
                        format!("segment {depth} `{segment}` is not an index below {len}"),
                    )
                })?;
                Some(&items[index])
            }
            Some(CatalogNode::Entry(_) | CatalogNode::Value(_)) => {
                return Err(invalid(
                    path,
                    format!("segment {depth} `{segment}` is not inside a mapping or sequence"),
                ));
            }
        };
    }
    Ok(current)
}

/// Check that [`write`] can land `patch` at `path` without changing anything.
fn check_write(root: &CatalogNode, path: &Path, patch: &EntryPatch) -> Result<()> {
    let Some(last) = path.segments().last() else {
        return Err(invalid(path, "empty path"));
    };
    let target = match find_parent(root, path)? {
        None => None,
        Some(CatalogNode::Group(children)) => children.get(last.as_key().as_ref()),
        Some(CatalogNode::List(items)) => {
            let len = items.len();
            let index = last
                .as_index(len)
                .ok_or_else(|| invalid(path, format!("`{last}` is not an index below {len}")))?;
            Some(&items[index])
        }
        Some(CatalogNode::Entry(_) | CatalogNode::Value(_)) => {
            return Err(invalid(path, "parent is not a mapping or sequence"));
        }
    };
    match target {
        Some(CatalogNode::Entry(_)) => Ok(()),
        None | Some(CatalogNode::Value(Value::Null)) if patch.reference.is_some() => Ok(()),
        None | Some(CatalogNode::Value(Value::Null)) => {
            Err(invalid(path, "no entry here and the patch has no reference"))
        }
        Some(_) => Err(invalid(path, "target is not an entry")),
    }
}

/// Walk every segment but the last and return the container that holds the
/// final one.
///
/// Missing (or `null`) keys inside mappings are created as empty mappings.
/// Sequences need an in-range index. Entries and scalars cannot be walked
/// through. On error nothing has been created.
pub fn resolve_parent<'a, 'p>(
    root: &'a mut CatalogNode,
    path: &'p Path,
) -> Result<(&'a mut CatalogNode, &'p PathSegment)> {
    find_parent(root, path)?;
    let Some((last, init)) = path.segments().split_last() else {
        return Err(invalid(path, "empty path"));
    };

    let mut current = root;
    for (depth, segment) in init.iter().enumerate() {
        current = match current {
            CatalogNode::List(items) => {
                let len = items.len();
                let index = segment.as_index(len).ok_or_else(|| {
                    invalid(
                        path,
                        format!("segment {depth} `{segment}` is not an index below {len}"),
                    )
                })?;
                &mut items[index]
            }
            CatalogNode::Group(children) => {
                let slot = children
                    .entry(segment.as_key().into_owned())
                    .or_insert_with(CatalogNode::empty_group);
                if matches!(slot, CatalogNode::Value(Value::Null)) {
                    *slot = CatalogNode::empty_group();
                }
                slot
            }
            CatalogNode::Entry(_) | CatalogNode::Value(_) => {
                return Err(invalid(
                    path,
                    format!("segment {depth} `{segment}` is not inside a mapping or sequence"),
                ));
            }
        };
    }
    Ok((current, last))
}

/// Shallow-merge `patch` onto the entry at `path`.
///
/// An empty path is skipped with a warning. A missing final key is filled
/// with a new entry when the patch carries a reference. A write that fails
/// leaves the tree untouched.
pub fn write(root: &mut CatalogNode, path: &Path, patch: &EntryPatch) -> Result<()> {
    if path.is_empty() {
        tracing::warn!("catalog write skipped: empty path");
        return Ok(());
    }
    check_write(root, path, patch)?;

    let (parent, last) = resolve_parent(root, path)?;
    let slot = match parent {
        CatalogNode::List(items) => {
            let len = items.len();
            let index = last
                .as_index(len)
                .ok_or_else(|| invalid(path, format!("`{last}` is not an index below {len}")))?;
            &mut items[index]
        }
        CatalogNode::Group(children) => match children.entry(last.as_key().into_owned()) {
            btree_map::Entry::Occupied(occupied) => occupied.into_mut(),
            btree_map::Entry::Vacant(vacant) => {
                let entry = Entry::from_patch(patch)
                    .ok_or_else(|| invalid(path, "no entry here and the patch has no reference"))?;
                vacant.insert(CatalogNode::Entry(entry));
                return Ok(());
            }
        },
        CatalogNode::Entry(_) | CatalogNode::Value(_) => {
            return Err(invalid(path, "parent is not a mapping or sequence"));
        }
    };

    match slot {
        CatalogNode::Entry(entry) => {
            entry.apply(patch);
            Ok(())
        }
        CatalogNode::Value(Value::Null) => {
            let entry = Entry::from_patch(patch)
                .ok_or_else(|| invalid(path, "no entry here and the patch has no reference"))?;
            *slot = CatalogNode::Entry(entry);
            Ok(())
        }
        _ => Err(invalid(path, "target is not an entry")),
    }
}
