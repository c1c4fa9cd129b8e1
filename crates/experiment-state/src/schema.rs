//! Wire schema for experiment records and related payloads
//!
//! Only the fields the client reasons about are typed. Everything else the
//! backend sends is kept in `extra` and written back out untouched.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;

/// Backend-assigned experiment identifier.
///
/// The API emits integer ids; string ids are accepted as well and keep their
/// original JSON form when serialized again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExperimentId {
    Number(u64),
    Text(String),
}

impl std::fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExperimentId::Number(n) => write!(f, "{}", n),
            ExperimentId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<u64> for ExperimentId {
    fn from(n: u64) -> Self {
        ExperimentId::Number(n)
    }
}

impl std::str::FromStr for ExperimentId {
    type Err = std::convert::Infallible;

    /// All-digit input becomes `Number`, anything else `Text`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.parse::<u64>() {
            Ok(n) => ExperimentId::Number(n),
            Err(_) => ExperimentId::Text(s.to_string()),
        })
    }
}

/// Text form of a loosely typed JSON value.
///
/// Numbers and booleans keep their text form; `null` and structured values
/// read as absent.
fn lenient_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn text_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(|v| lenient_text(v).unwrap_or_default())
}

fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(lenient_text)
}

fn present(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|s| !s.is_empty())
}

/// An experiment record as held by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: ExperimentId,
    #[serde(default, deserialize_with = "text_or_default")]
    pub title: String,
    #[serde(default, deserialize_with = "text_or_default")]
    pub benchmark: String,
    #[serde(default, deserialize_with = "text_or_default")]
    pub period: String,
    #[serde(
        default,
        deserialize_with = "optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub primary_metric_of_interest: Option<String>,
    #[serde(
        default,
        deserialize_with = "optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub metric_of_interest: Option<String>,
    /// ISO `YYYY-MM-DD`
    #[serde(default, deserialize_with = "optional_text")]
    pub start_date: Option<String>,
    /// ISO `YYYY-MM-DD`
    #[serde(default, deserialize_with = "optional_text")]
    pub end_date: Option<String>,
    /// Opaque pass-through fields (description, icon, stats, timestamps, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Experiment {
    /// Minimal record, mostly useful for tests and fakes.
    pub fn new(id: impl Into<ExperimentId>, title: &str) -> Self {
        Experiment {
            id: id.into(),
            title: title.to_string(),
            benchmark: String::new(),
            period: String::new(),
            primary_metric_of_interest: None,
            metric_of_interest: None,
            start_date: None,
            end_date: None,
            extra: Map::new(),
        }
    }

    /// Set both dates
    pub fn with_dates(mut self, start: &str, end: &str) -> Self {
        self.start_date = Some(start.to_string());
        self.end_date = Some(end.to_string());
        self
    }

    /// Start date, treating empty strings as absent.
    pub fn start(&self) -> Option<&str> {
        present(self.start_date.as_ref())
    }

    /// End date, treating empty strings as absent.
    pub fn end(&self) -> Option<&str> {
        present(self.end_date.as_ref())
    }

    /// Both dates, if both are present.
    pub fn date_range(&self) -> Option<(&str, &str)> {
        Some((self.start()?, self.end()?))
    }

    /// Primary metric, falling back to the legacy field.
    pub fn metric(&self) -> Option<&str> {
        present(self.primary_metric_of_interest.as_ref())
            .or_else(|| present(self.metric_of_interest.as_ref()))
    }

    /// Decode a mutation response.
    ///
    /// Create and update answer with `{"message": .., "experiment": {..}}`;
    /// a bare record is accepted as well.
    pub fn from_response(payload: Value) -> Result<Self, StoreError> {
        let record = match payload {
            Value::Object(mut map) if map.get("experiment").is_some_and(Value::is_object) => {
                map.remove("experiment").unwrap_or(Value::Null)
            }
            other => other,
        };
        Ok(serde_json::from_value(record)?)
    }
}

/// Client-built experiment payload that has no `id` yet.
///
/// Every field is optional so validation can report all gaps at once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub benchmark: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_metric_of_interest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_of_interest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExperimentDraft {
    /// Draft with the three required text fields filled in.
    pub fn new(title: &str, benchmark: &str, period: &str) -> Self {
        ExperimentDraft {
            title: Some(title.to_string()),
            benchmark: Some(benchmark.to_string()),
            period: Some(period.to_string()),
            ..Default::default()
        }
    }

    /// Set the legacy `metric_of_interest` field read by the backend
    pub fn with_metric(mut self, metric: &str) -> Self {
        self.metric_of_interest = Some(metric.to_string());
        self
    }

    pub fn with_primary_metric(mut self, metric: &str) -> Self {
        self.primary_metric_of_interest = Some(metric.to_string());
        self
    }

    pub fn with_dates(mut self, start: &str, end: &str) -> Self {
        self.start_date = Some(start.to_string());
        self.end_date = Some(end.to_string());
        self
    }

    /// Attach an opaque field
    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }
}

impl From<&Experiment> for ExperimentDraft {
    fn from(exp: &Experiment) -> Self {
        let text = |s: &String| Some(s.clone()).filter(|s| !s.is_empty());
        ExperimentDraft {
            title: text(&exp.title),
            benchmark: text(&exp.benchmark),
            period: text(&exp.period),
            primary_metric_of_interest: exp.primary_metric_of_interest.clone(),
            metric_of_interest: exp.metric_of_interest.clone(),
            start_date: exp.start_date.clone(),
            end_date: exp.end_date.clone(),
            extra: exp.extra.clone(),
        }
    }
}

/// One metric observation inside an experiment window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    pub date: String,
    #[serde(default)]
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_name: Option<String>,
}

/// Response of the datapoints endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatapointSet {
    pub experiment_id: ExperimentId,
    #[serde(default)]
    pub experiment_title: Option<String>,
    #[serde(default)]
    pub metric_name: Option<String>,
    #[serde(default)]
    pub datapoints: Vec<Datapoint>,
    #[serde(default)]
    pub total_count: usize,
}

/// Body of the complete call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionPayload {
    #[serde(default)]
    pub included_datapoints: Vec<Datapoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_average: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_datapoints: Option<usize>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CompletionPayload {
    /// Build a payload from the datapoints kept for the final result.
    ///
    /// `final_average` is the mean of the included values, or `None` when
    /// nothing was included.
    pub fn from_datapoints(included: Vec<Datapoint>, total: usize) -> Self {
        let final_average = if included.is_empty() {
            None
        } else {
            let sum: f64 = included.iter().map(|d| d.value).sum();
            Some(sum / included.len() as f64)
        };
        CompletionPayload {
            included_datapoints: included,
            final_average,
            total_datapoints: Some(total),
            extra: Map::new(),
        }
    }
}

/// Response of the per-experiment stats endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentStats {
    #[serde(default)]
    pub benchmark_value: Option<f64>,
    #[serde(default)]
    pub current_value: Option<f64>,
    #[serde(default)]
    pub improvement_percentage: Option<f64>,
    #[serde(default)]
    pub data_points_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub benchmark_period: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_period: Option<Value>,
    /// Set by the backend when no metric is configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
