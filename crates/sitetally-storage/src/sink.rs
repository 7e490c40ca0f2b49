//! Checkpoint sinks.

use crate::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use sitetally_catalog::Catalog;
use std::sync::Arc;

/// Receives a full snapshot of the working catalog after every leaf.
///
/// `persist` overwrites whatever was stored before; calling it twice with the
/// same catalog leaves the same state behind. Callers log failures and keep
/// going.
#[async_trait]
pub trait CheckpointSink: Send + Sync {
    async fn persist(&self, catalog: &Catalog) -> Result<()>;

    /// Sink name (for logging)
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: CheckpointSink + ?Sized> CheckpointSink for Arc<T> {
    async fn persist(&self, catalog: &Catalog) -> Result<()> {
        (**self).persist(catalog).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Keeps every snapshot in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    snapshots: Mutex<Vec<Catalog>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<Catalog> {
        self.snapshots.lock().clone()
    }

    pub fn latest(&self) -> Option<Catalog> {
        self.snapshots.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.lock().is_empty()
    }
}

#[async_trait]
impl CheckpointSink for MemorySink {
    async fn persist(&self, catalog: &Catalog) -> Result<()> {
        self.snapshots.lock().push(catalog.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
