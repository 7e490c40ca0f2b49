//! Enrichment source interface
//!
//! A [`MetricSource`] turns one entity key plus the run's date window into a
//! [`RawMetric`]. Each call is one physical request; retrying is the
//! scheduler's business.

use crate::format::RawMetric;
use crate::window::DateWindow;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// Interface
// ============================================================================

#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn fetch(&self, entity_key: &str, window: &DateWindow) -> Result<RawMetric, FetchError>;

    /// Source name (for logging)
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: MetricSource + ?Sized> MetricSource for Arc<T> {
    async fn fetch(&self, entity_key: &str, window: &DateWindow) -> Result<RawMetric, FetchError> {
        (**self).fetch(entity_key, window).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// One failed fetch. The display text is what lands in `failureReason`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error! status: {status}")]
    Status { status: u16 },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Request timed out after {secs}s")]
    Timeout { secs: u64 },
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Worth another attempt when retries are configured.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network(_) | FetchError::Timeout { .. } => true,
            FetchError::Status { status } => *status == 429 || *status >= 500,
            FetchError::MalformedResponse(_)
            | FetchError::InvalidRequest(_)
            | FetchError::Other(_) => false,
        }
    }
}

// ============================================================================
// Canned source
// ============================================================================

/// Answers from a fixed table. Unknown keys fail with `Other("no data for ...")`.
///
/// Used by tests and dry runs; counts every call.
#[derive(Debug, Default)]
pub struct StaticSource {
    responses: HashMap<String, Result<RawMetric, FetchError>>,
    calls: AtomicUsize,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, entity_key: &str, value: impl Into<RawMetric>) -> Self {
        self.responses
            .insert(entity_key.to_string(), Ok(value.into()));
        self
    }

    pub fn with_failure(mut self, entity_key: &str, error: FetchError) -> Self {
        self.responses.insert(entity_key.to_string(), Err(error));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetricSource for StaticSource {
    async fn fetch(&self, entity_key: &str, _window: &DateWindow) -> Result<RawMetric, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .get(entity_key)
            .cloned()
            .unwrap_or_else(|| Err(FetchError::Other(format!("no data for {entity_key}"))))
    }

    fn name(&self) -> &str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn window() -> DateWindow {
        DateWindow::trailing(NaiveDate::from_ymd_opt(2026, 10, 16).unwrap(), 3)
    }

    #[tokio::test]
    async fn test_static_source_answers_and_counts() {
        let source = StaticSource::new()
            .with_value("example.com", 12345u64)
            .with_failure("down.com", FetchError::Status { status: 503 });

        assert_eq!(
            source.fetch("example.com", &window()).await,
            Ok(RawMetric::Value(12345.0))
        );
        assert_eq!(
            source.fetch("down.com", &window()).await,
            Err(FetchError::Status { status: 503 })
        );
        assert!(source.fetch("unknown.com", &window()).await.is_err());
        assert_eq!(source.calls(), 3);
    }

    #[test]
    fn test_failure_messages() {
        assert_eq!(
            FetchError::Status { status: 401 }.to_string(),
            "HTTP error! status: 401"
        );
        assert!(FetchError::Status { status: 502 }.is_transient());
        assert!(FetchError::Timeout { secs: 30 }.is_transient());
        assert!(!FetchError::Status { status: 404 }.is_transient());
        assert!(!FetchError::MalformedResponse("x".into()).is_transient());
    }
}
