//! Caller-side input parsing.
//!
//! User input is one of:
//! - a JSON object: a catalog fragment, merged with the default catalog
//!   according to the selected [`MergePolicy`]
//! - a JSON array of identifiers: "simple" input
//! - a single bare identifier (optionally a JSON string literal): "simple"
//!   input
//!
//! Simple input always replaces the default catalog, whatever policy was
//! selected.

use crate::merge::{merge_catalogs, MergePolicy};
use crate::model::{Catalog, CatalogNode, Entry};
use crate::{CatalogError, Result};
use serde_json::Value;
use std::collections::BTreeMap;

/// Category that simple input is filed under.
pub const MANUAL_CATEGORY: &str = "Manual";
/// Tag attached to entries created from simple input.
pub const MANUAL_TAG: &str = "manual";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Object,
    Array,
    Bare,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedInput {
    pub kind: InputKind,
    pub catalog: Catalog,
}

impl ParsedInput {
    /// Arrays and bare identifiers cannot be merged.
    pub fn is_simple(&self) -> bool {
        !matches!(self.kind, InputKind::Object)
    }
}

/// Parse raw user input. Blank input yields `Ok(None)`.
pub fn parse_input(raw: &str) -> Result<Option<ParsedInput>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let parsed = match serde_json::from_str::<Value>(trimmed) {
        Ok(value @ Value::Object(_)) => ParsedInput {
            kind: InputKind::Object,
            catalog: Catalog::from_value(value)?,
        },
        Ok(Value::Array(items)) => {
            let references = items
                .into_iter()
                .enumerate()
                .map(|(index, item)| match item {
                    Value::String(text) => bare_reference(&text),
                    other => Err(CatalogError::MalformedInput(format!(
                        "array element {index} must be a string, got {other}"
                    ))),
                })
                .collect::<Result<Vec<_>>>()?;
            ParsedInput {
                kind: InputKind::Array,
                catalog: manual_catalog(references),
            }
        }
        Ok(Value::String(text)) => ParsedInput {
            kind: InputKind::Bare,
            catalog: manual_catalog(vec![bare_reference(&text)?]),
        },
        Ok(_) => ParsedInput {
            kind: InputKind::Bare,
            catalog: manual_catalog(vec![bare_reference(trimmed)?]),
        },
        Err(err) if trimmed.starts_with('{') || trimmed.starts_with('[') => {
            return Err(CatalogError::MalformedInput(format!("invalid JSON: {err}")));
        }
        Err(_) => ParsedInput {
            kind: InputKind::Bare,
            catalog: manual_catalog(vec![bare_reference(trimmed)?]),
        },
    };
    Ok(Some(parsed))
}

/// Pick the catalog a run works on.
pub fn select_catalog(
    default: &Catalog,
    input: Option<&ParsedInput>,
    policy: MergePolicy,
) -> Catalog {
    match input {
        None => default.clone(),
        Some(input) if input.is_simple() => input.catalog.clone(),
        Some(input) => merge_catalogs(default, &input.catalog, policy),
    }
}

fn bare_reference(text: &str) -> Result<String> {
    let token = text.trim();
    if token.is_empty() {
        return Err(CatalogError::MalformedInput("empty identifier".to_string()));
    }
    if token.chars().any(char::is_whitespace) {
        return Err(CatalogError::MalformedInput(format!(
            "`{token}` is not a single identifier"
        )));
    }
    if token.starts_with("http") {
        Ok(token.to_string())
    } else {
        Ok(format!("https://{token}"))
    }
}

fn manual_catalog(references: Vec<String>) -> Catalog {
    let width = references.len().to_string().len();
    let single = references.len() == 1;
    let entries = references
        .into_iter()
        .enumerate()
        .map(|(index, reference)| {
            let key = if single {
                "entry".to_string()
            } else {
                format!("entry{:0width$}", index + 1)
            };
            let entry = Entry::new(reference).with_tags([MANUAL_TAG]);
            (key, CatalogNode::Entry(entry))
        })
        .collect::<BTreeMap<_, _>>();

    let mut catalog = Catalog::new();
    catalog.insert(MANUAL_CATEGORY, CatalogNode::Group(entries));
    catalog
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_json(input: &ParsedInput) -> Value {
        serde_json::to_value(&input.catalog).unwrap()
    }

    #[test]
    fn test_blank_input_is_none() {
        assert_eq!(parse_input("   \n").unwrap(), None);
    }

    #[test]
    fn test_object_input_is_structured() {
        let input = parse_input(r#"{"Cat": {"a": {"reference": "a.com"}}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(input.kind, InputKind::Object);
        assert!(!input.is_simple());
    }

    #[test]
    fn test_array_input_becomes_manual_category() {
        let input = parse_input(r#"["example.com", "https://b.org"]"#).unwrap().unwrap();
        assert_eq!(input.kind, InputKind::Array);
        assert!(input.is_simple());
        assert_eq!(
            as_json(&input),
            json!({"Manual": {
                "entry1": {"reference": "https://example.com", "tags": ["manual"]},
                "entry2": {"reference": "https://b.org", "tags": ["manual"]}
            }})
        );
    }

    #[test]
    fn test_long_arrays_keep_their_order() {
        let items: Vec<String> = (0..12).map(|i| format!("site{i}.com")).collect();
        let input = parse_input(&serde_json::to_string(&items).unwrap()).unwrap().unwrap();
        let leaves = crate::discover(&input.catalog);
        assert_eq!(leaves[0].entity_key, "site0.com");
        assert_eq!(leaves[11].entity_key, "site11.com");
        assert_eq!(leaves[9].path.to_string(), "Manual.entry10");
    }

    #[test]
    fn test_bare_identifier() {
        let input = parse_input("www.example.com").unwrap().unwrap();
        assert_eq!(input.kind, InputKind::Bare);
        assert_eq!(
            as_json(&input),
            json!({"Manual": {"entry": {"reference": "https://www.example.com", "tags": ["manual"]}}})
        );

        let quoted = parse_input(r#""example.com""#).unwrap().unwrap();
        assert_eq!(quoted.kind, InputKind::Bare);
    }

    #[test]
    fn test_malformed_input() {
        for raw in [r#"{"Cat": "#, "[1, 2]", "two words", r#"[""]"#] {
            assert!(
                matches!(parse_input(raw), Err(CatalogError::MalformedInput(_))),
                "expected malformed input for {raw:?}"
            );
        }
    }

    #[test]
    fn test_simple_input_always_overrides() {
        let default =
            Catalog::from_value(json!({"Base": {"x": {"reference": "x.com"}}})).unwrap();
        let input = parse_input("y.com").unwrap().unwrap();
        let selected = select_catalog(&default, Some(&input), MergePolicy::Merge);
        assert_eq!(selected, input.catalog);
    }

    #[test]
    fn test_object_input_merges_with_default() {
        let default =
            Catalog::from_value(json!({"Base": {"x": {"reference": "x.com"}}})).unwrap();
        let input = parse_input(r#"{"Extra": {"y": {"reference": "y.com"}}}"#)
            .unwrap()
            .unwrap();

        let merged = select_catalog(&default, Some(&input), MergePolicy::Merge);
        assert_eq!(crate::discover(&merged).len(), 2);

        let overridden = select_catalog(&default, Some(&input), MergePolicy::Override);
        assert_eq!(crate::discover(&overridden).len(), 1);

        assert_eq!(select_catalog(&default, None, MergePolicy::Merge), default);
    }
}
