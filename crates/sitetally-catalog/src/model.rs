//! Catalog tree model
//!
//! Untyped JSON is converted into [`CatalogNode`] exactly once, in
//! [`CatalogNode::from_value`]. Past that seam the rest of the crate matches
//! on variants instead of probing objects for fields:
//!
//! - [`CatalogNode::Entry`]: an object carrying a non-empty `reference`
//! - [`CatalogNode::Group`]: any other object (category, sub-grouping)
//! - [`CatalogNode::List`]: a sequence, traversed element by element
//! - [`CatalogNode::Value`]: scalars carried inside structural nodes

use crate::path::{Path, PathSegment};
use crate::{CatalogError, Result};
use chrono::NaiveDate;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Field that marks an object as an entry.
pub const REFERENCE_FIELD: &str = "reference";
/// Older default catalogs used `link` for the reference.
const LEGACY_REFERENCE_FIELD: &str = "link";

/// Legacy field name and the canonical name it is read as.
const LEGACY_FIELDS: [(&str, &str); 6] = [
    (LEGACY_REFERENCE_FIELD, REFERENCE_FIELD),
    ("desc", "tags"),
    ("monthlyVisits", "metric"),
    ("monthlyVisitsRaw", "metricRaw"),
    ("updateTime", "updatedOn"),
    ("error", "failureReason"),
];

// ============================================================================
// Entries
// ============================================================================

/// A catalog leaf: an identifying reference plus the fields enrichment fills in.
///
/// Unknown fields are kept in `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    #[serde(alias = "link")]
    pub reference: String,

    #[serde(default, skip_serializing_if = "Option::is_none", alias = "desc")]
    pub tags: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none", alias = "monthlyVisits")]
    pub metric: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "monthlyVisitsRaw",
        deserialize_with = "lenient_metric_raw"
    )]
    pub metric_raw: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none", alias = "updateTime")]
    pub updated_on: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none", alias = "error")]
    pub failure_reason: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entry {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            tags: None,
            metric: None,
            metric_raw: None,
            updated_on: None,
            failure_reason: None,
            extra: Map::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Shallow-merge `patch` onto this entry: fields present in the patch win,
    /// everything else is left as it was.
    pub fn apply(&mut self, patch: &EntryPatch) {
        if let Some(reference) = &patch.reference {
            self.reference = reference.clone();
        }
        if let Some(tags) = &patch.tags {
            self.tags = Some(tags.clone());
        }
        if let Some(metric) = &patch.metric {
            self.metric = Some(metric.clone());
        }
        if let Some(raw) = patch.metric_raw {
            self.metric_raw = Some(raw);
        }
        if let Some(date) = patch.updated_on {
            self.updated_on = Some(date);
        }
        if let Some(reason) = &patch.failure_reason {
            self.failure_reason = reason.clone();
        }
        for (key, value) in &patch.extra {
            self.extra.insert(key.clone(), value.clone());
        }
    }

    /// Patch carrying every field this entry has set.
    pub fn to_patch(&self) -> EntryPatch {
        EntryPatch {
            reference: Some(self.reference.clone()),
            tags: self.tags.clone(),
            metric: self.metric.clone(),
            metric_raw: self.metric_raw,
            updated_on: self.updated_on,
            failure_reason: self.failure_reason.clone().map(Some),
            extra: self.extra.clone(),
        }
    }

    /// Build an entry from a patch; `None` when the patch has no reference.
    pub fn from_patch(patch: &EntryPatch) -> Option<Self> {
        let mut entry = Self::new(patch.reference.clone()?);
        entry.apply(patch);
        Some(entry)
    }

    /// The entry as JSON, with canonical field names.
    pub fn to_value(&self) -> Value {
        let mut map = self.extra.clone();
        map.insert(REFERENCE_FIELD.to_string(), Value::String(self.reference.clone()));
        if let Some(tags) = &self.tags {
            map.insert("tags".to_string(), Value::from(tags.clone()));
        }
        if let Some(metric) = &self.metric {
            map.insert("metric".to_string(), Value::String(metric.clone()));
        }
        if let Some(raw) = self.metric_raw {
            map.insert("metricRaw".to_string(), Value::from(raw));
        }
        if let Some(date) = self.updated_on {
            map.insert("updatedOn".to_string(), Value::String(date.format("%Y-%m-%d").to_string()));
        }
        if let Some(reason) = &self.failure_reason {
            map.insert("failureReason".to_string(), Value::String(reason.clone()));
        }
        Value::Object(map)
    }

    /// Enriched on `today` and the last attempt did not fail.
    pub fn is_fresh(&self, today: NaiveDate) -> bool {
        self.updated_on == Some(today) && self.failure_reason.is_none() && self.metric.is_some()
    }
}

/// Partial entry written through [`crate::path::write`].
///
/// `failure_reason` is tri-state: `None` keeps the current value,
/// `Some(None)` clears it, `Some(Some(_))` sets it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryPatch {
    pub reference: Option<String>,
    pub tags: Option<Vec<String>>,
    pub metric: Option<String>,
    pub metric_raw: Option<u64>,
    pub updated_on: Option<NaiveDate>,
    pub failure_reason: Option<Option<String>>,
    pub extra: Map<String, Value>,
}

impl EntryPatch {
    /// Outcome of a successful fetch. Clears any earlier failure.
    pub fn success(metric: impl Into<String>, metric_raw: u64, today: NaiveDate) -> Self {
        Self {
            metric: Some(metric.into()),
            metric_raw: Some(metric_raw),
            updated_on: Some(today),
            failure_reason: Some(None),
            ..Self::default()
        }
    }

    /// Outcome of a failed fetch. Earlier metric fields are left untouched.
    pub fn failure(reason: impl Into<String>, today: NaiveDate) -> Self {
        Self {
            updated_on: Some(today),
            failure_reason: Some(Some(reason.into())),
            ..Self::default()
        }
    }
}

fn lenient_metric_raw<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) if text.is_empty() => Ok(None),
        Some(Value::Number(number)) => number
            .as_u64()
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|value| *value >= 0.0)
                    .map(|value| value.floor() as u64)
            })
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("metricRaw must be non-negative, got {number}"))),
        Some(other) => Err(D::Error::custom(format!(
            "metricRaw must be a number, got {other}"
        ))),
    }
}

// ============================================================================
// Nodes
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum CatalogNode {
    Entry(Entry),
    Group(BTreeMap<String, CatalogNode>),
    List(Vec<CatalogNode>),
    Value(Value),
}

impl CatalogNode {
    pub fn empty_group() -> Self {
        CatalogNode::Group(BTreeMap::new())
    }

    pub fn is_entry(&self) -> bool {
        matches!(self, CatalogNode::Entry(_))
    }

    /// Mappings and sequences that are not entries.
    pub fn is_traversable(&self) -> bool {
        matches!(self, CatalogNode::Group(_) | CatalogNode::List(_))
    }

    pub fn as_entry(&self) -> Option<&Entry> {
        match self {
            CatalogNode::Entry(entry) => Some(entry),
            _ => None,
        }
    }

    /// Inverse of [`CatalogNode::from_value`].
    pub fn to_value(&self) -> Value {
        match self {
            CatalogNode::Entry(entry) => entry.to_value(),
            CatalogNode::Group(children) => Value::Object(
                children
                    .iter()
                    .map(|(key, child)| (key.clone(), child.to_value()))
                    .collect(),
            ),
            CatalogNode::List(items) => Value::Array(items.iter().map(Self::to_value).collect()),
            CatalogNode::Value(value) => value.clone(),
        }
    }

    /// Convert untyped JSON into the node tree.
    pub fn from_value(value: Value) -> Result<Self> {
        let mut at = Vec::new();
        Self::from_value_at(value, &mut at)
    }

    fn from_value_at(value: Value, at: &mut Vec<PathSegment>) -> Result<Self> {
        match value {
            Value::Object(mut map) if has_reference(&map) => {
                normalize_legacy_fields(&mut map);
                serde_json::from_value(Value::Object(map))
                    .map(CatalogNode::Entry)
                    .map_err(|err| CatalogError::InvalidEntry {
                        path: Path::from(at.clone()).to_string(),
                        message: err.to_string(),
                    })
            }
            Value::Object(map) => {
                let mut children = BTreeMap::new();
                for (key, child) in map {
                    at.push(PathSegment::Key(key.clone()));
                    let node = Self::from_value_at(child, at)?;
                    at.pop();
                    children.insert(key, node);
                }
                Ok(CatalogNode::Group(children))
            }
            Value::Array(items) => {
                let mut nodes = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    at.push(PathSegment::Index(index));
                    nodes.push(Self::from_value_at(item, at)?);
                    at.pop();
                }
                Ok(CatalogNode::List(nodes))
            }
            scalar => Ok(CatalogNode::Value(scalar)),
        }
    }
}

/// Empty or null references do not make a leaf; the object stays structural.
fn has_reference(map: &Map<String, Value>) -> bool {
    [REFERENCE_FIELD, LEGACY_REFERENCE_FIELD]
        .iter()
        .any(|field| match map.get(*field) {
            None | Some(Value::Null) | Some(Value::Bool(false)) => false,
            Some(Value::String(text)) => !text.is_empty(),
            Some(_) => true,
        })
}

/// Rename legacy fields to their canonical names. When both are present the
/// canonical one wins, unless it is null or an empty string.
fn normalize_legacy_fields(map: &mut Map<String, Value>) {
    for (legacy, canonical) in LEGACY_FIELDS {
        let Some(value) = map.remove(legacy) else {
            continue;
        };
        let canonical_unset = match map.get(canonical) {
            None | Some(Value::Null) => true,
            Some(Value::String(text)) => text.is_empty(),
            Some(_) => false,
        };
        if canonical_unset {
            map.insert(canonical.to_string(), value);
        }
    }
}

impl Serialize for CatalogNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            CatalogNode::Entry(entry) => entry.serialize(serializer),
            CatalogNode::Group(children) => children.serialize(serializer),
            CatalogNode::List(items) => items.serialize(serializer),
            CatalogNode::Value(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for CatalogNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        CatalogNode::from_value(value).map_err(D::Error::custom)
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// A whole catalog. The root is always a mapping of categories.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    root: CatalogNode,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            root: CatalogNode::empty_group(),
        }
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(_) => Ok(Self {
                root: CatalogNode::from_value(value)?,
            }),
            other => Err(CatalogError::MalformedInput(format!(
                "catalog root must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|err| CatalogError::MalformedInput(err.to_string()))?;
        Self::from_value(value)
    }

    /// Wrap an existing group node. Anything else is rejected.
    pub fn from_root(root: CatalogNode) -> Result<Self> {
        match root {
            CatalogNode::Group(_) => Ok(Self { root }),
            _ => Err(CatalogError::MalformedInput(
                "catalog root must be a mapping".to_string(),
            )),
        }
    }

    pub fn root(&self) -> &CatalogNode {
        &self.root
    }

    pub(crate) fn root_mut(&mut self) -> &mut CatalogNode {
        &mut self.root
    }

    /// Insert or replace a top-level category.
    pub fn insert(&mut self, key: impl Into<String>, node: CatalogNode) {
        if let CatalogNode::Group(children) = &mut self.root {
            children.insert(key.into(), node);
        }
    }

    pub fn get(&self, path: &Path) -> Option<&CatalogNode> {
        crate::path::get(&self.root, path)
    }

    /// See [`crate::path::write`].
    pub fn write(&mut self, path: &Path, patch: &EntryPatch) -> Result<()> {
        crate::path::write(&mut self.root, path, patch)
    }
}

impl Serialize for Catalog {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.root.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Catalog {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Catalog::from_value(value).map_err(D::Error::custom)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_objects_with_reference_become_entries() {
        let node = CatalogNode::from_value(json!({
            "Search": {
                "g": {"reference": "https://www.google.com", "tags": ["engine"]},
                "notes": "free text",
                "nested": [{"reference": "bing.com"}, 3]
            }
        }))
        .unwrap();

        let CatalogNode::Group(top) = &node else {
            panic!("root should be a group");
        };
        let CatalogNode::Group(search) = &top["Search"] else {
            panic!("category should be a group");
        };
        assert!(search["g"].is_entry());
        assert!(!search["g"].is_traversable());
        assert_eq!(search["notes"], CatalogNode::Value(json!("free text")));
        assert!(search["nested"].is_traversable());
        let CatalogNode::List(items) = &search["nested"] else {
            panic!("nested should be a list");
        };
        assert!(items[0].is_entry());
        assert!(!items[1].is_entry());
    }

    #[test]
    fn test_empty_reference_stays_structural() {
        let node = CatalogNode::from_value(json!({"reference": "", "child": {}})).unwrap();
        assert!(node.is_traversable());
    }

    #[test]
    fn test_non_string_reference_is_rejected_with_path() {
        let err = Catalog::from_value(json!({"Cat": {"bad": {"reference": 42}}})).unwrap_err();
        match err {
            CatalogError::InvalidEntry { path, .. } => assert_eq!(path, "Cat.bad"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_legacy_field_names_are_accepted() {
        let catalog = Catalog::from_value(json!({
            "Cat": {"a": {
                "link": "https://a.com",
                "desc": ["x"],
                "monthlyVisits": "1.2万",
                "monthlyVisitsRaw": 12345.7,
                "updateTime": "2024-05-01",
                "error": "boom",
                "rank": 3
            }}
        }))
        .unwrap();

        let entry = catalog
            .get(&Path::from_keys(["Cat", "a"]))
            .and_then(CatalogNode::as_entry)
            .unwrap();
        assert_eq!(entry.reference, "https://a.com");
        assert_eq!(entry.tags.as_deref(), Some(&["x".to_string()][..]));
        assert_eq!(entry.metric.as_deref(), Some("1.2万"));
        assert_eq!(entry.metric_raw, Some(12345));
        assert_eq!(entry.updated_on, Some(day(2024, 5, 1)));
        assert_eq!(entry.failure_reason.as_deref(), Some("boom"));
        assert_eq!(entry.extra.get("rank"), Some(&json!(3)));

        let written = serde_json::to_value(&catalog).unwrap();
        assert_eq!(written["Cat"]["a"]["reference"], json!("https://a.com"));
        assert_eq!(written["Cat"]["a"]["metricRaw"], json!(12345));
        assert_eq!(written["Cat"]["a"]["updatedOn"], json!("2024-05-01"));
        assert!(written["Cat"]["a"].get("link").is_none());
    }

    #[test]
    fn test_reference_wins_over_link() {
        let catalog = Catalog::from_value(json!({
            "Cat": {
                "a": {"reference": "https://a.com", "link": "https://old-a.com"},
                "b": {"reference": "", "link": "https://b.com", "desc": ["x"], "tags": ["y"]}
            }
        }))
        .unwrap();

        let written = serde_json::to_value(&catalog).unwrap();
        assert_eq!(written["Cat"]["a"], json!({"reference": "https://a.com"}));
        assert_eq!(
            written["Cat"]["b"],
            json!({"reference": "https://b.com", "tags": ["y"]})
        );
    }

    #[test]
    fn test_to_value_matches_serialization() {
        let catalog = Catalog::from_value(json!({
            "Cat": {
                "a": {
                    "reference": "a.com",
                    "metric": "1.2万",
                    "metricRaw": 12345,
                    "updatedOn": "2026-10-16",
                    "failureReason": "HTTP error! status: 500",
                    "meta": {"rank": 1}
                },
                "list": [1, {"note": null}]
            }
        }))
        .unwrap();
        assert_eq!(catalog.root().to_value(), serde_json::to_value(&catalog).unwrap());
    }

    #[test]
    fn test_empty_metric_raw_reads_as_absent() {
        let entry: Entry =
            serde_json::from_value(json!({"reference": "a.com", "metricRaw": ""})).unwrap();
        assert_eq!(entry.metric_raw, None);
    }

    #[test]
    fn test_catalog_root_must_be_object() {
        assert!(matches!(
            Catalog::from_value(json!(["a.com"])),
            Err(CatalogError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_apply_keeps_untouched_fields() {
        let mut entry = Entry::new("a.com").with_tags(["x"]);
        entry.apply(&EntryPatch {
            metric: Some("1万".to_string()),
            ..EntryPatch::default()
        });
        assert_eq!(entry.tags, Some(vec!["x".to_string()]));
        assert_eq!(entry.metric.as_deref(), Some("1万"));
    }

    #[test]
    fn test_failure_then_success_clears_reason() {
        let today = day(2026, 10, 16);
        let mut entry = Entry::new("a.com");
        entry.apply(&EntryPatch::success("1.5千", 1500, today));
        entry.apply(&EntryPatch::failure("HTTP 500", today));
        assert_eq!(entry.metric.as_deref(), Some("1.5千"));
        assert_eq!(entry.failure_reason.as_deref(), Some("HTTP 500"));
        assert!(!entry.is_fresh(today));

        entry.apply(&EntryPatch::success("1.6千", 1600, today));
        assert_eq!(entry.failure_reason, None);
        assert!(entry.is_fresh(today));
    }
}
