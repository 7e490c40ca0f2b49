//! HTTP metric source
//!
//! One GET per fetch against a URL template. The response body is a JSON
//! object keyed by domain; the metric is read from that inner object:
//!
//! ```text
//! { "example.com": { "monthlyVisits": 12345.6, ... } }
//! ```
//!
//! A missing or `null` metric reads as `0`; an empty string as unavailable.

use crate::config::{ConfigError, HttpConfig};
use crate::format::RawMetric;
use crate::source::{FetchError, MetricSource};
use crate::window::DateWindow;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use url::Url;

pub struct HttpMetricSource {
    client: Client,
    config: HttpConfig,
}

impl HttpMetricSource {
    pub fn new(config: HttpConfig) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| ConfigError::Invalid(format!("header name `{name}`: {err}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|err| ConfigError::Invalid(format!("header `{name}`: {err}")))?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|err| ConfigError::Invalid(format!("HTTP client: {err}")))?;

        Ok(Self { client, config })
    }

    /// Substitute `{key}`, `{from}` and `{to}` into the endpoint template.
    pub fn request_url(&self, entity_key: &str, window: &DateWindow) -> Result<Url, FetchError> {
        render_url(&self.config, entity_key, window)
    }
}

fn render_url(config: &HttpConfig, entity_key: &str, window: &DateWindow) -> Result<Url, FetchError> {
    let (from, to) = window.render(&config.date_format);
    let key: String = url::form_urlencoded::byte_serialize(entity_key.as_bytes()).collect();
    let rendered = config
        .endpoint
        .replace("{key}", &key)
        .replace("{from}", &from)
        .replace("{to}", &to);
    Url::parse(&rendered).map_err(|err| FetchError::InvalidRequest(format!("{rendered}: {err}")))
}

#[async_trait]
impl MetricSource for HttpMetricSource {
    async fn fetch(&self, entity_key: &str, window: &DateWindow) -> Result<RawMetric, FetchError> {
        let url = self.request_url(entity_key, window)?;
        tracing::debug!(entity = %entity_key, url = %url, "fetching metric");

        let response = self.client.get(url).send().await.map_err(|err| {
            if err.is_timeout() {
                FetchError::Timeout {
                    secs: self.config.timeout_secs,
                }
            } else {
                FetchError::Network(err.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| FetchError::MalformedResponse(err.to_string()))?;

        parse_metric_body(&body, entity_key, &self.config.metric_field)
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Pull the metric out of a response body.
///
/// The inner object keyed by `entity_key` is preferred; otherwise the first
/// value of the top-level object is used.
pub fn parse_metric_body(body: &Value, entity_key: &str, field: &str) -> Result<RawMetric, FetchError> {
    let Value::Object(top) = body else {
        return Err(FetchError::MalformedResponse(
            "expected a JSON object at the top level".to_string(),
        ));
    };

    let item = top.get(entity_key).or_else(|| top.values().next());
    let metric = match item {
        Some(Value::Object(fields)) => fields.get(field),
        _ => None,
    };

    match metric {
        None | Some(Value::Null) => Ok(RawMetric::Value(0.0)),
        Some(Value::Number(number)) => number
            .as_f64()
            .filter(|value| value.is_finite() && *value >= 0.0)
            .map(RawMetric::Value)
            .ok_or_else(|| FetchError::MalformedResponse(format!("`{field}` is {number}"))),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(RawMetric::Unavailable),
        Some(Value::String(text)) => text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite() && *value >= 0.0)
            .map(RawMetric::Value)
            .ok_or_else(|| FetchError::MalformedResponse(format!("`{field}` is {text:?}"))),
        Some(other) => Err(FetchError::MalformedResponse(format!(
            "`{field}` is not a number: {other}"
        ))),
    }
}
