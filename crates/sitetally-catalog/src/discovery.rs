//! Leaf discovery
//!
//! Depth-first walk over the catalog. Every entry found is recorded with its
//! path and a copy of the entry as it looked at discovery time; entries are
//! never descended into. Mappings are visited in key order and sequences in
//! index order, so the output order is stable for a given catalog.

use crate::model::{Catalog, CatalogNode, Entry};
use crate::path::{Path, PathSegment};
use chrono::NaiveDate;
use url::Url;

#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredLeaf {
    /// Normalized host (or bare name) the metric is fetched for.
    pub entity_key: String,
    pub path: Path,
    pub original: Entry,
}

pub fn discover(catalog: &Catalog) -> Vec<DiscoveredLeaf> {
    let mut leaves = Vec::new();
    let mut at = Vec::new();
    walk(catalog.root(), &mut at, &mut leaves);
    leaves
}

/// Like [`discover`], minus entries already enriched on `today` without a
/// failure. Used when resuming from a checkpoint.
pub fn discover_pending(catalog: &Catalog, today: NaiveDate) -> Vec<DiscoveredLeaf> {
    discover(catalog)
        .into_iter()
        .filter(|leaf| !leaf.original.is_fresh(today))
        .collect()
}

fn walk(node: &CatalogNode, at: &mut Vec<PathSegment>, leaves: &mut Vec<DiscoveredLeaf>) {
    match node {
        CatalogNode::Group(children) => {
            for (key, child) in children {
                visit(child, PathSegment::Key(key.clone()), at, leaves);
            }
        }
        CatalogNode::List(items) => {
            for (index, child) in items.iter().enumerate() {
                visit(child, PathSegment::Index(index), at, leaves);
            }
        }
        CatalogNode::Entry(_) | CatalogNode::Value(_) => {}
    }
}

fn visit(
    child: &CatalogNode,
    segment: PathSegment,
    at: &mut Vec<PathSegment>,
    leaves: &mut Vec<DiscoveredLeaf>,
) {
    at.push(segment);
    match child {
        CatalogNode::Entry(entry) => leaves.push(DiscoveredLeaf {
            entity_key: normalize_reference(&entry.reference),
            path: Path::from(at.clone()),
            original: entry.clone(),
        }),
        node if node.is_traversable() => walk(node, at, leaves),
        _ => {}
    }
    at.pop();
}

/// Host of a URL reference without a leading `www.`; bare names just lose
/// the `www.` prefix.
pub fn normalize_reference(reference: &str) -> String {
    let trimmed = reference.trim();
    match Url::parse(trimmed) {
        Ok(url) => match url.host_str() {
            Some(host) => strip_www(host).to_string(),
            None => strip_www(trimmed).to_string(),
        },
        Err(_) => strip_www(trimmed).to_string(),
    }
}

fn strip_www(text: &str) -> &str {
    text.strip_prefix("www.").unwrap_or(text)
}
