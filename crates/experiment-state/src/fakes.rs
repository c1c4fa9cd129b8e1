//! In-memory fakes for the store seams (testing only)
//!
//! `MemoryRemoteClient` behaves like the experiments API without a network:
//! it assigns ids, answers every endpoint, and records each call so tests can
//! assert on call counts. Scripted responses override the simulated backend
//! per endpoint kind. `RecordingNotifier` captures notifications.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::error::{RemoteError, StoreError};
use crate::notify::Notifier;
use crate::remote::{Endpoint, EndpointKind, RemoteClient, RemoteResult};
use crate::schema::{Experiment, ExperimentId};
use crate::views::today_utc;

// ---------------------------------------------------------------------------
// MemoryRemoteClient
// ---------------------------------------------------------------------------

/// One call received by `MemoryRemoteClient`
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub endpoint: Endpoint,
    pub body: Option<Value>,
}

#[derive(Debug, Default)]
struct Backend {
    /// Newest first, like the real listing
    records: Vec<Value>,
    next_id: u64,
}

/// Simulated experiments API.
#[derive(Debug, Default)]
pub struct MemoryRemoteClient {
    backend: Mutex<Backend>,
    scripted: Mutex<HashMap<EndpointKind, VecDeque<RemoteResult<Value>>>>,
    calls: Mutex<Vec<RecordedCall>>,
    latency: Option<Duration>,
}

fn id_value(id: &ExperimentId) -> Value {
    match id {
        ExperimentId::Number(n) => json!(n),
        ExperimentId::Text(s) => json!(s),
    }
}

fn not_found() -> RemoteError {
    RemoteError::Status {
        status: 404,
        reason: "Not Found".to_string(),
    }
}

impl MemoryRemoteClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the backend. Later ids continue after the largest numeric id.
    pub fn with_experiments(self, experiments: impl IntoIterator<Item = Experiment>) -> Self {
        {
            let mut backend = self.backend.lock().unwrap();
            for exp in experiments {
                if let ExperimentId::Number(n) = exp.id {
                    backend.next_id = backend.next_id.max(n);
                }
                backend
                    .records
                    .push(serde_json::to_value(&exp).expect("experiment serializes"));
            }
        }
        self
    }

    /// Delay every response; pair with `#[tokio::test(start_paused = true)]`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queue a raw response for the next call of `kind`.
    pub fn push_response(&self, kind: EndpointKind, response: RemoteResult<Value>) {
        self.scripted
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push_back(response);
    }

    /// Queue a successful payload for the next call of `kind`.
    pub fn respond_with(&self, kind: EndpointKind, payload: Value) {
        self.push_response(kind, Ok(payload));
    }

    /// Make the next call of `kind` fail with a transport error.
    pub fn fail_next(&self, kind: EndpointKind, message: &str) {
        self.push_response(kind, Err(RemoteError::Transport(message.to_string())));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, kind: EndpointKind) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.endpoint.kind() == kind)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Current server-side records
    pub fn server_records(&self) -> Vec<Value> {
        self.backend.lock().unwrap().records.clone()
    }

    fn take_scripted(&self, kind: EndpointKind) -> Option<RemoteResult<Value>> {
        self.scripted
            .lock()
            .unwrap()
            .get_mut(&kind)
            .and_then(VecDeque::pop_front)
    }

    fn simulate(&self, endpoint: &Endpoint, body: Option<&Value>) -> RemoteResult<Value> {
        let mut backend = self.backend.lock().unwrap();
        let position = endpoint.id().and_then(|id| {
            let wanted = id_value(id);
            backend.records.iter().position(|r| r["id"] == wanted)
        });

        match endpoint {
            Endpoint::List => Ok(Value::Array(backend.records.clone())),
            Endpoint::ListWithStats => {
                let with_stats = backend
                    .records
                    .iter()
                    .cloned()
                    .map(|mut record| {
                        if let Value::Object(map) = &mut record {
                            map.entry("stats").or_insert_with(empty_stats);
                        }
                        record
                    })
                    .collect();
                Ok(Value::Array(with_stats))
            }
            Endpoint::Create => {
                let mut record = body_object(body)?;
                backend.next_id += 1;
                record.insert("id".to_string(), json!(backend.next_id));
                let record = Value::Object(record);
                backend.records.insert(0, record.clone());
                Ok(json!({
                    "message": "Experiment created successfully",
                    "experiment": record,
                }))
            }
            Endpoint::Get(_) => {
                let index = position.ok_or_else(not_found)?;
                Ok(backend.records[index].clone())
            }
            Endpoint::Update(_) => {
                let index = position.ok_or_else(not_found)?;
                let changes = body_object(body)?;
                if let Value::Object(record) = &mut backend.records[index] {
                    for (key, value) in changes {
                        if key != "id" {
                            record.insert(key, value);
                        }
                    }
                }
                let record = backend.records[index].clone();
                Ok(json!({
                    "message": "Experiment updated successfully",
                    "experiment": record,
                }))
            }
            Endpoint::Delete(_) => {
                let index = position.ok_or_else(not_found)?;
                backend.records.remove(index);
                Ok(json!({"message": "Experiment deleted successfully"}))
            }
            Endpoint::Stats(_) => {
                position.ok_or_else(not_found)?;
                Ok(empty_stats())
            }
            Endpoint::Complete(id) => {
                let index = position.ok_or_else(not_found)?;
                let completion = body_object(body)?;
                let included = completion
                    .get("included_datapoints")
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len);
                let final_average = completion
                    .get("final_average")
                    .cloned()
                    .unwrap_or(Value::Null);
                let record = &mut backend.records[index];
                if record["end_date"].as_str().map_or(true, str::is_empty) {
                    record["end_date"] = json!(today_utc());
                }
                Ok(json!({
                    "success": true,
                    "message": "Experiment completed successfully",
                    "experiment_id": id_value(id),
                    "completion_data": {
                        "included_datapoints_count": included,
                        "final_average": final_average,
                    },
                }))
            }
            Endpoint::Datapoints(id) => {
                let index = position.ok_or_else(not_found)?;
                let record = &backend.records[index];
                Ok(json!({
                    "experiment_id": id_value(id),
                    "experiment_title": record["title"],
                    "metric_name": record["metric_of_interest"],
                    "datapoints": [],
                    "total_count": 0,
                }))
            }
        }
    }
}

fn empty_stats() -> Value {
    json!({
        "benchmark_value": null,
        "current_value": null,
        "improvement_percentage": null,
        "data_points_count": 0,
    })
}

fn body_object(body: Option<&Value>) -> RemoteResult<Map<String, Value>> {
    match body {
        Some(Value::Object(map)) => Ok(map.clone()),
        _ => Err(RemoteError::Status {
            status: 400,
            reason: "Bad Request".to_string(),
        }),
    }
}

#[async_trait]
impl RemoteClient for MemoryRemoteClient {
    async fn request(&self, endpoint: &Endpoint, body: Option<&Value>) -> RemoteResult<Value> {
        let call = RecordedCall {
            endpoint: endpoint.clone(),
            body: body.cloned(),
        };
        self.calls.lock().unwrap().push(call);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(scripted) = self.take_scripted(endpoint.kind()) {
            return scripted;
        }
        self.simulate(endpoint, body)
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

/// A captured notification
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Success(String),
    Error { message: String, cause: String },
}

/// Notifier that keeps every notification for later inspection.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.lock().unwrap().clone()
    }

    pub fn successes(&self) -> Vec<String> {
        self.notifications()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Success(msg) => Some(msg),
                Notification::Error { .. } => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.notifications()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Error { message, .. } => Some(message),
                Notification::Success(_) => None,
            })
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn on_success(&self, message: &str) {
        self.seen
            .lock()
            .unwrap()
            .push(Notification::Success(message.to_string()));
    }

    fn on_error(&self, message: &str, cause: &StoreError) {
        let notification = Notification::Error {
            message: message.to_string(),
            cause: cause.to_string(),
        };
        self.seen.lock().unwrap().push(notification);
    }
}
