//! Sitetally catalog
//!
//! The catalog is a nested document of categories whose leaves are entries
//! (anything carrying a `reference`). This crate owns everything that can be
//! said about the tree without talking to the network:
//!
//! ```text
//!   raw input ──► input::parse_input ──► Catalog ◄── merge::merge_catalogs(base, custom)
//!                                          │
//!                      discovery::discover ▼
//!                               Vec<DiscoveredLeaf { entity_key, path, original }>
//!                                          │
//!                      path::write(path, EntryPatch)  (shallow merge onto the entry)
//! ```
//!
//! - **model**: `CatalogNode` variant tree, `Entry`, `EntryPatch`
//! - **path**: `Path` addressing with write-through autovivification
//! - **merge**: `override` / recursive `merge` policies
//! - **discovery**: depth-first leaf discovery and reference normalization
//! - **input**: caller-side parsing of user input into a catalog

pub mod discovery;
pub mod input;
pub mod merge;
pub mod model;
pub mod path;

pub use discovery::{discover, discover_pending, normalize_reference, DiscoveredLeaf};
pub use input::{parse_input, select_catalog, InputKind, ParsedInput, MANUAL_CATEGORY, MANUAL_TAG};
pub use merge::{merge_catalogs, merge_node, MergePolicy};
pub use model::{Catalog, CatalogNode, Entry, EntryPatch};
pub use path::{Path, PathSegment};

/// Errors raised at the catalog seam.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// A path segment could not be resolved (wrong container type, bad index).
    #[error("invalid path `{path}`: {reason}")]
    InvalidPath { path: String, reason: String },

    /// An object carried a `reference` but could not be read as an entry.
    #[error("invalid entry at `{path}`: {message}")]
    InvalidEntry { path: String, message: String },

    /// User input is neither a JSON object/array nor a usable bare identifier.
    #[error("malformed input: {0}")]
    MalformedInput(String),
}

pub type Result<T> = std::result::Result<T, CatalogError>;
