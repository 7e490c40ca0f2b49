//! Sitetally enrichment engine
//!
//! Fills catalog entries with a metric fetched per entity, in randomly sized
//! concurrent chunks with randomized pauses in between.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────────┐
//! │                         ENRICHMENT RUN                                 │
//! ├────────────────────────────────────────────────────────────────────────┤
//! │                                                                        │
//! │  ┌─────────────┐  discover   ┌───────────┐  chunk of N   ┌──────────┐  │
//! │  │   Catalog   │────────────►│ Scheduler │──────────────►│ JoinSet  │  │
//! │  │ (deep copy) │             │  (pacing) │◄── barrier ───│  tasks   │  │
//! │  └──────▲──────┘             └───────────┘               └────┬─────┘  │
//! │         │                                                     │        │
//! │         │ path write (under mutex)              fetch(key, window)     │
//! │         │                                                     ▼        │
//! │  ┌──────┴──────┐    persist   ┌──────────────┐     ┌────────────────┐  │
//! │  │ format(raw) │─────────────►│CheckpointSink│     │  MetricSource  │  │
//! │  └─────────────┘              └──────────────┘     └────────────────┘  │
//! │                                                                        │
//! └────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **format**: raw value to `1.2万`-style strings
//! - **window**: trailing full-month date window
//! - **source**: [`MetricSource`] trait, [`FetchError`], canned [`StaticSource`]
//! - **http**: reqwest-backed [`HttpMetricSource`] (feature `http`)
//! - **config**: [`EnrichConfig`] with file, env and validation
//! - **scheduler**: [`Scheduler`], [`RunContext`], [`RunReport`]

pub mod config;
pub mod format;
#[cfg(feature = "http")]
pub mod http;
pub mod scheduler;
pub mod source;
pub mod window;

pub use config::{ConfigError, EnrichConfig, HttpConfig, PacingConfig};
pub use format::{format_metric, RawMetric, UNAVAILABLE};
#[cfg(feature = "http")]
pub use http::HttpMetricSource;
pub use scheduler::{
    LeafOutcome, LeafProgress, ProgressObserver, RunContext, RunError, RunReport, Scheduler,
};
pub use source::{FetchError, MetricSource, StaticSource};
pub use window::DateWindow;
