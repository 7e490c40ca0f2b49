//! Property tests for the catalog tree
//!
//! 1. Discovery only returns entries, and their paths resolve to them
//! 2. Writes are idempotent and keep fields the patch does not carry
//! 3. Writes never touch sibling entries
//! 4. `override` is the custom catalog; `merge` keeps every custom leaf not
//!    nested under a base entry, and every base-only category
//! 5. Merging an entry onto a category (or the reverse) keeps both sides' fields

use chrono::NaiveDate;
use proptest::prelude::*;
use serde_json::{json, Map, Value};
use sitetally_catalog::{
    discover, merge_catalogs, Catalog, CatalogNode, DiscoveredLeaf, Entry, EntryPatch, MergePolicy,
    Path,
};

// ============================================================================
// Strategies
// ============================================================================

/// Keys start upper-case so they never collide with entry field names.
fn key_strategy() -> impl Strategy<Value = String> {
    "[A-Z][a-z]{0,3}"
}

fn entry_strategy() -> impl Strategy<Value = Value> {
    (
        "[a-z]{1,8}\\.(com|org|io)",
        any::<bool>(),
        prop::option::of(prop::collection::vec("[a-z]{1,6}", 0..3)),
        prop::option::of(0u64..10_000_000),
    )
        .prop_map(|(host, www, tags, raw)| {
            let reference = if www {
                format!("https://www.{host}/page")
            } else {
                host
            };
            let mut object = Map::new();
            object.insert("reference".into(), json!(reference));
            if let Some(tags) = tags {
                object.insert("tags".into(), json!(tags));
            }
            if let Some(raw) = raw {
                object.insert("metricRaw".into(), json!(raw));
            }
            Value::Object(object)
        })
}

fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i32>().prop_map(|n| json!(n)),
        "[a-z ]{0,10}".prop_map(|s| json!(s)),
        any::<bool>().prop_map(|b| json!(b)),
        Just(Value::Null),
    ]
}

fn node_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![3 => entry_strategy(), 1 => scalar_strategy()];
    leaf.prop_recursive(4, 48, 5, |inner| {
        prop_oneof![
            prop::collection::btree_map(key_strategy(), inner.clone(), 0..5)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
            prop::collection::vec(inner, 0..4).prop_map(Value::Array),
        ]
    })
}

fn catalog_strategy() -> impl Strategy<Value = Catalog> {
    prop::collection::btree_map(key_strategy(), node_strategy(), 0..5).prop_map(|map| {
        let value = Value::Object(map.into_iter().collect());
        Catalog::from_value(value).expect("generated catalogs are well formed")
    })
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
}

fn entry_at<'a>(catalog: &'a Catalog, leaf: &DiscoveredLeaf) -> &'a Entry {
    catalog
        .get(&leaf.path)
        .and_then(CatalogNode::as_entry)
        .expect("discovered path resolves to an entry")
}

// ============================================================================
// Discovery and addressing
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn discovered_paths_resolve_to_original_entries(catalog in catalog_strategy()) {
        for leaf in discover(&catalog) {
            prop_assert_eq!(entry_at(&catalog, &leaf), &leaf.original);
            prop_assert!(!leaf.entity_key.contains('/'));
        }
    }

    #[test]
    fn write_is_idempotent(catalog in catalog_strategy(), raw in 0u64..1_000_000_000) {
        let patch = EntryPatch::success(raw.to_string(), raw, today());
        for leaf in discover(&catalog) {
            let mut once = catalog.clone();
            once.write(&leaf.path, &patch).unwrap();
            let mut twice = once.clone();
            twice.write(&leaf.path, &patch).unwrap();
            prop_assert_eq!(once, twice);
        }
    }

    #[test]
    fn write_preserves_untouched_fields(catalog in catalog_strategy(), reason in "[a-z ]{1,20}") {
        let leaves = discover(&catalog);
        for leaf in &leaves {
            let mut working = catalog.clone();
            working.write(&leaf.path, &EntryPatch::failure(reason.clone(), today())).unwrap();

            let written = entry_at(&working, leaf);
            prop_assert_eq!(&written.reference, &leaf.original.reference);
            prop_assert_eq!(&written.tags, &leaf.original.tags);
            prop_assert_eq!(written.metric_raw, leaf.original.metric_raw);
            prop_assert_eq!(&written.extra, &leaf.original.extra);
            prop_assert_eq!(written.failure_reason.as_deref(), Some(reason.as_str()));

            for other in leaves.iter().filter(|other| other.path != leaf.path) {
                prop_assert_eq!(entry_at(&working, other), &other.original);
            }
        }
    }
}

// ============================================================================
// Merge
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn override_is_the_custom_catalog(base in catalog_strategy(), custom in catalog_strategy()) {
        prop_assert_eq!(merge_catalogs(&base, &custom, MergePolicy::Override), custom);
    }

    #[test]
    fn merge_keeps_custom_leaves_and_base_categories(
        base in catalog_strategy(),
        custom in catalog_strategy(),
    ) {
        let merged = merge_catalogs(&base, &custom, MergePolicy::Merge);

        // A custom leaf below a base entry is absorbed into that entry's fields.
        let under_base_entry = |leaf: &DiscoveredLeaf| {
            let segments = leaf.path.segments();
            (1..segments.len()).any(|depth| {
                base.get(&Path::from(segments[..depth].to_vec()))
                    .is_some_and(CatalogNode::is_entry)
            })
        };
        for leaf in discover(&custom).into_iter().filter(|leaf| !under_base_entry(leaf)) {
            let entry = entry_at(&merged, &leaf);
            prop_assert_eq!(&entry.reference, &leaf.original.reference);
            if leaf.original.tags.is_some() {
                prop_assert_eq!(&entry.tags, &leaf.original.tags);
            }
        }

        let (CatalogNode::Group(base_root), CatalogNode::Group(merged_root)) =
            (base.root(), merged.root())
        else {
            panic!("catalog roots are mappings");
        };
        for key in base_root.keys() {
            prop_assert!(merged_root.contains_key(key));
        }
    }

    #[test]
    fn merge_with_itself_is_identity(catalog in catalog_strategy()) {
        prop_assert_eq!(merge_catalogs(&catalog, &catalog, MergePolicy::Merge), catalog);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn merge_across_entry_and_category_keeps_both_sides(
        entry in entry_strategy(),
        children in prop::collection::btree_map(key_strategy(), scalar_strategy(), 1..4),
    ) {
        let category = Value::Object(children.clone().into_iter().collect());
        let entry_first = Catalog::from_value(json!({"Cat": entry.clone()})).unwrap();
        let category_first = Catalog::from_value(json!({"Cat": category})).unwrap();

        for (base, custom) in [(&entry_first, &category_first), (&category_first, &entry_first)] {
            let merged = merge_catalogs(base, custom, MergePolicy::Merge);
            let node = merged.get(&Path::from_keys(["Cat"])).unwrap();
            let entry_node = node.as_entry().expect("merged value is still an entry");
            prop_assert_eq!(Value::String(entry_node.reference.clone()), entry["reference"].clone());
            for (key, value) in &children {
                prop_assert_eq!(entry_node.extra.get(key), Some(value));
            }
        }
    }
}
