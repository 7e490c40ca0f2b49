//! Combining a base catalog with a custom one.
//!
//! `override` keeps only the custom catalog. `merge` is a recursive union
//! over the JSON shape of both trees: a custom object is merged key by key
//! into the base value (an empty object when the base is absent or not an
//! object), anything else in custom replaces the base value. The result is
//! classified again, so a base entry that receives custom fields stays an
//! entry and a base category that receives a `reference` becomes one.

use crate::model::{Catalog, CatalogNode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    Override,
    #[default]
    Merge,
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergePolicy::Override => f.write_str("override"),
            MergePolicy::Merge => f.write_str("merge"),
        }
    }
}

impl FromStr for MergePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "override" => Ok(MergePolicy::Override),
            "merge" => Ok(MergePolicy::Merge),
            other => Err(format!("unknown merge policy `{other}` (expected merge or override)")),
        }
    }
}

pub fn merge_catalogs(base: &Catalog, custom: &Catalog, policy: MergePolicy) -> Catalog {
    match policy {
        MergePolicy::Override => custom.clone(),
        MergePolicy::Merge => {
            let merged = merge_node(Some(base.root()), custom.root());
            // Both roots are groups, so the merge is a group as well.
            Catalog::from_root(merged).unwrap_or_else(|_| custom.clone())
        }
    }
}

/// Merge `custom` onto `base` (absent base behaves like an empty mapping).
pub fn merge_node(base: Option<&CatalogNode>, custom: &CatalogNode) -> CatalogNode {
    match (base, custom) {
        (_, CatalogNode::List(_) | CatalogNode::Value(_)) => custom.clone(),
        (Some(CatalogNode::Group(base)), CatalogNode::Group(custom)) => {
            CatalogNode::Group(merge_groups(base, custom))
        }
        (Some(base @ CatalogNode::Entry(_)), _) | (Some(base @ CatalogNode::Group(_)), _) => {
            merge_object_fields(base, custom)
        }
        (_, custom) => custom.clone(),
    }
}

fn merge_groups(
    base: &BTreeMap<String, CatalogNode>,
    custom: &BTreeMap<String, CatalogNode>,
) -> BTreeMap<String, CatalogNode> {
    let mut result = base.clone();
    for (key, value) in custom {
        let merged = merge_node(base.get(key), value);
        result.insert(key.clone(), merged);
    }
    result
}

/// An entry on either side: merge the JSON fields and classify the result
/// again. Custom fields that do not fit the resulting entry keep the base.
fn merge_object_fields(base: &CatalogNode, custom: &CatalogNode) -> CatalogNode {
    let merged = merge_value(Some(&base.to_value()), &custom.to_value());
    match CatalogNode::from_value(merged) {
        Ok(node) => node,
        Err(err) => {
            tracing::warn!(error = %err, "merged entry is invalid; keeping base value");
            base.clone()
        }
    }
}

fn merge_value(base: Option<&Value>, custom: &Value) -> Value {
    match custom {
        Value::Object(custom) => {
            let mut merged = match base {
                Some(Value::Object(base)) => base.clone(),
                _ => Map::new(),
            };
            for (key, value) in custom {
                let next = merge_value(merged.get(key), value);
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        other => other.clone(),
    }
}
