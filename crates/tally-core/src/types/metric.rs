//! Metric wire model and its validated form.
//!
//! `Metric` mirrors the JSON shape agents send and the file store writes:
//! `{"id": .., "type": "gauge"|"counter", "delta": .., "value": ..}`.
//! It can carry invalid input (unknown type, missing field), so nothing
//! is applied from it directly. `Metric::validate` turns it into a
//! `MetricUpdate`, whose `Sample` enum makes kind dispatch exhaustive.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{COUNTER_TYPE, GAUGE_TYPE};
use crate::errors::StorageError;

/// The two metric kinds. Their namespaces are independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gauge => GAUGE_TYPE,
            Self::Counter => COUNTER_TYPE,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            GAUGE_TYPE => Ok(Self::Gauge),
            COUNTER_TYPE => Ok(Self::Counter),
            other => Err(StorageError::Unsupported {
                kind: other.to_string(),
            }),
        }
    }
}

/// A single metric as it appears on the wire and in snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Counter delta (or cumulative total in responses). Absent for gauges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    /// Gauge value. Absent for counters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Metric {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: GAUGE_TYPE.to_string(),
            delta: None,
            value: Some(value),
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: COUNTER_TYPE.to_string(),
            delta: Some(delta),
            value: None,
        }
    }

    /// A read request: id and kind only.
    pub fn query(id: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            id: id.into(),
            kind: kind.as_str().to_string(),
            delta: None,
            value: None,
        }
    }

    /// Parse the type tag. Unknown tags are `Unsupported`.
    pub fn metric_kind(&self) -> Result<MetricKind, StorageError> {
        self.kind.parse()
    }

    /// Check that the field required by the type tag is present.
    ///
    /// The field of the other kind, if any, is ignored.
    pub fn validate(&self) -> Result<MetricUpdate, StorageError> {
        if self.id.is_empty() {
            return Err(StorageError::validation("metric id must not be empty"));
        }
        let kind = self.kind.parse::<MetricKind>().map_err(|_| {
            StorageError::validation(format!("unknown metric type: {:?}", self.kind))
        })?;
        let sample = match kind {
            MetricKind::Gauge => Sample::Gauge(check_gauge(self.value.ok_or_else(|| {
                StorageError::validation(format!("gauge {} has no value", self.id))
            })?)?),
            MetricKind::Counter => Sample::Counter(self.delta.ok_or_else(|| {
                StorageError::validation(format!("counter {} has no delta", self.id))
            })?),
        };
        Ok(MetricUpdate {
            id: self.id.clone(),
            sample,
        })
    }
}

/// A typed measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    /// Overwrites the stored value.
    Gauge(f64),
    /// Added to the stored value.
    Counter(i64),
}

impl Sample {
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Gauge(_) => MetricKind::Gauge,
            Self::Counter(_) => MetricKind::Counter,
        }
    }

    /// Parse a textual value for the given kind (URL-path style writes).
    pub fn parse(kind: MetricKind, raw: &str) -> Result<Self, StorageError> {
        match kind {
            MetricKind::Gauge => parse_gauge(raw).map(Self::Gauge),
            MetricKind::Counter => parse_counter(raw).map(Self::Counter),
        }
    }
}

/// Parse a textual gauge value. Surrounding whitespace is ignored.
pub fn parse_gauge(raw: &str) -> Result<f64, StorageError> {
    let raw = raw.trim();
    let value = raw
        .parse::<f64>()
        .map_err(|e| StorageError::validation(format!("invalid gauge value {raw:?}: {e}")))?;
    check_gauge(value)
}

/// Gauges must be finite: JSON has no encoding for NaN or infinities,
/// and SQL stores them as NULL.
pub fn check_gauge(value: f64) -> Result<f64, StorageError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(StorageError::validation(format!(
            "gauge value must be finite, got {value}"
        )))
    }
}

/// Add a delta to a counter total, refusing to leave the i64 range.
pub fn checked_total(id: &str, total: i64, delta: i64) -> Result<i64, StorageError> {
    total.checked_add(delta).ok_or_else(|| {
        StorageError::validation(format!("counter {id} overflows: {total} + {delta}"))
    })
}

/// Parse a textual counter delta. Surrounding whitespace is ignored.
pub fn parse_counter(raw: &str) -> Result<i64, StorageError> {
    let raw = raw.trim();
    raw.parse::<i64>()
        .map_err(|e| StorageError::validation(format!("invalid counter delta {raw:?}: {e}")))
}

/// A validated write.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricUpdate {
    pub id: String,
    pub sample: Sample,
}

impl MetricUpdate {
    pub fn kind(&self) -> MetricKind {
        self.sample.kind()
    }

    /// Back to wire form.
    pub fn to_metric(&self) -> Metric {
        match self.sample {
            Sample::Gauge(v) => Metric::gauge(self.id.clone(), v),
            Sample::Counter(d) => Metric::counter(self.id.clone(), d),
        }
    }
}

/// An ordered batch of metrics. Order is kept for reporting only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricBatch {
    #[serde(rename = "metrics_db", default)]
    pub metrics: Vec<Metric>,
}

impl MetricBatch {
    pub fn new(metrics: Vec<Metric>) -> Self {
        Self { metrics }
    }

    pub fn push(&mut self, metric: Metric) {
        self.metrics.push(metric);
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Metric> {
        self.metrics.iter()
    }

    /// Validate every entry. Fails on the first invalid one, naming its position.
    pub fn validate(&self) -> Result<Vec<MetricUpdate>, StorageError> {
        self.metrics
            .iter()
            .enumerate()
            .map(|(i, m)| {
                m.validate().map_err(|e| match e {
                    StorageError::Validation { message } => StorageError::Validation {
                        message: format!("entry {i}: {message}"),
                    },
                    other => other,
                })
            })
            .collect()
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, StorageError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_json_pretty(&self) -> Result<Vec<u8>, StorageError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

impl From<Vec<Metric>> for MetricBatch {
    fn from(metrics: Vec<Metric>) -> Self {
        Self { metrics }
    }
}

impl FromIterator<Metric> for MetricBatch {
    fn from_iter<I: IntoIterator<Item = Metric>>(iter: I) -> Self {
        Self {
            metrics: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for MetricBatch {
    type Item = Metric;
    type IntoIter = std::vec::IntoIter<Metric>;

    fn into_iter(self) -> Self::IntoIter {
        self.metrics.into_iter()
    }
}

impl<'a> IntoIterator for &'a MetricBatch {
    type Item = &'a Metric;
    type IntoIter = std::slice::Iter<'a, Metric>;

    fn into_iter(self) -> Self::IntoIter {
        self.metrics.iter()
    }
}
