//! Metric formatting
//!
//! Raw values are rendered with the largest of three scale units they reach:
//!
//! | boundary | unit |
//! |----------|------|
//! | 1e8      | 亿   |
//! | 1e4      | 万   |
//! | 1e3      | 千   |
//!
//! The scaled value is rounded to one decimal (`round(v * 10) / 10`). Values
//! below 1e3 are printed as plain numbers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Rendered for a metric the source could not provide.
pub const UNAVAILABLE: &str = "—";

const SCALES: [(f64, &str); 3] = [(1e8, "亿"), (1e4, "万"), (1e3, "千")];

/// A fetched value, or the "not available" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawMetric {
    Value(f64),
    Unavailable,
}

impl RawMetric {
    /// Whole-number value stored as `metricRaw`. Unavailable counts as zero.
    pub fn floor(self) -> u64 {
        match self {
            RawMetric::Value(value) if value.is_finite() && value > 0.0 => value.floor() as u64,
            _ => 0,
        }
    }

    pub fn is_available(self) -> bool {
        matches!(self, RawMetric::Value(_))
    }
}

impl From<f64> for RawMetric {
    fn from(value: f64) -> Self {
        RawMetric::Value(value)
    }
}

impl From<u64> for RawMetric {
    fn from(value: u64) -> Self {
        RawMetric::Value(value as f64)
    }
}

impl fmt::Display for RawMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_metric(*self))
    }
}

pub fn format_metric(raw: RawMetric) -> String {
    let value = match raw {
        RawMetric::Unavailable => return UNAVAILABLE.to_string(),
        RawMetric::Value(value) if value == 0.0 => return "0".to_string(),
        RawMetric::Value(value) => value,
    };

    match SCALES.iter().find(|(boundary, _)| value >= *boundary) {
        Some((boundary, unit)) => format!("{}{unit}", round_tenths(value / boundary)),
        None => round_tenths(value).to_string(),
    }
}

fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
