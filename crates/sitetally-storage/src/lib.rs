//! Sitetally run-state storage
//!
//! The scheduler checkpoints the whole working catalog after every leaf. Where
//! those snapshots go is pluggable:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                     CHECKPOINT STORAGE                        │
//! ├───────────────────────────────────────────────────────────────┤
//! │                                                               │
//! │  ┌───────────┐   persist(&Catalog)   ┌──────────────────────┐ │
//! │  │ Scheduler │──────────────────────►│  dyn CheckpointSink  │ │
//! │  └───────────┘                       └──────────┬───────────┘ │
//! │                                        ┌────────┴────────┐    │
//! │                                        ▼                 ▼    │
//! │                                 ┌────────────┐   ┌───────────┐│
//! │                                 │  StateDir  │   │MemorySink ││
//! │                                 │ (JSON dir) │   │ (tests)   ││
//! │                                 └────────────┘   └───────────┘│
//! │                                                               │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## State directory layout
//!
//! - `current.json`: latest checkpoint, replaced atomically (temp file + rename)
//! - `default.json`: the default catalog runs start from
//! - `settings.json`: last merge policy and last custom input

pub mod sink;
pub mod state;


pub use sink::{CheckpointSink, MemorySink};
pub use state::{RunSettings, StateDir, CURRENT_FILE, DEFAULT_FILE, SETTINGS_FILE};

use std::path::PathBuf;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, StorageError>;

// ============================================================================
// Configuration
// ============================================================================

/// Where run state lives and how it is written.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `current.json`, `default.json` and `settings.json`.
    pub state_dir: PathBuf,
    /// Pretty-print checkpoints (slower, but diffable).
    pub pretty: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("./.sitetally"),
            pretty: false,
        }
    }
}

/// Open (and create if needed) the state directory at `dir`.
pub async fn open_state_dir(dir: impl Into<PathBuf>) -> Result<StateDir> {
    StateDir::open(StorageConfig {
        state_dir: dir.into(),
        ..Default::default()
    })
    .await
}
