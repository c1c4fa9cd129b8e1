//! Experiment Store - authoritative client-side state for experiments
//!
//! The store owns the experiment collection, the loading flag and the last
//! reload error. Every operation calls the backend through a `RemoteClient`,
//! reconciles the local collection on success and reports the outcome to a
//! `Notifier`.
//!
//! ## Semantics
//!
//! - `reload` replaces the whole collection; on any failure the collection is
//!   cleared and `last_error` is set. Concurrent reloads collapse into the one
//!   already in flight.
//! - `create` prepends, `update` replaces in place, `delete` filters out.
//! - `complete` re-runs `reload` after the backend accepts the completion.
//! - Write operations report failure through their return value only; they
//!   never touch `last_error`.
//!
//! Views (`ongoing`, `completed`, `not_started`) are recomputed from the
//! current snapshot on every call.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::Value;
use tracing::{warn, Instrument};

use crate::error::StoreError;
use crate::notify::{Notifier, TracingNotifier};
use crate::obs;
use crate::remote::{Endpoint, RemoteClient};
use crate::schema::{
    CompletionPayload, DatapointSet, Experiment, ExperimentDraft, ExperimentId, ExperimentStats,
};
use crate::validate::validate;
use crate::views::{self, ViewCounts};

/// Result type for store operations
pub type ActionResult<T> = std::result::Result<T, StoreError>;

/// Serializable `{success, data?, error?}` view of an `ActionResult`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionOutcome {
    /// A success whose data cannot be serialized is reported as a failure.
    pub fn from_result<T: Serialize>(result: &ActionResult<T>) -> Self {
        match result {
            Ok(data) => match serde_json::to_value(data) {
                Ok(value) => ActionOutcome {
                    success: true,
                    data: Some(value).filter(|v| !v.is_null()),
                    error: None,
                },
                Err(err) => {
                    warn!(error = %err, "Operation result could not be serialized");
                    ActionOutcome {
                        success: false,
                        data: None,
                        error: Some(StoreError::from(err).to_string()),
                    }
                }
            },
            Err(err) => ActionOutcome {
                success: false,
                data: None,
                error: Some(err.to_string()),
            },
        }
    }
}

impl<T: Serialize> From<ActionResult<T>> for ActionOutcome {
    fn from(result: ActionResult<T>) -> Self {
        ActionOutcome::from_result(&result)
    }
}

/// Outcome of `ExperimentStore::reload`
#[derive(Debug, Clone, PartialEq)]
pub enum ReloadStatus {
    /// Collection replaced with this many records
    Loaded(usize),
    /// Collection cleared; the error is also in `last_error`
    Failed(StoreError),
    /// Another reload was already in flight
    Skipped,
}

impl ReloadStatus {
    pub fn is_loaded(&self) -> bool {
        matches!(self, ReloadStatus::Loaded(_))
    }
}

#[derive(Debug, Default)]
struct StoreState {
    experiments: Vec<Experiment>,
    loading: bool,
    last_error: Option<String>,
}

fn lock(state: &Mutex<StoreState>) -> MutexGuard<'_, StoreState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Holds the `loading` flag for one reload and clears it on drop, including
/// when the reload future is cancelled mid-request.
struct LoadingGuard<'a> {
    state: &'a Mutex<StoreState>,
}

impl<'a> LoadingGuard<'a> {
    fn acquire(state: &'a Mutex<StoreState>) -> Option<Self> {
        let mut guard = lock(state);
        if guard.loading {
            return None;
        }
        guard.loading = true;
        guard.last_error = None;
        Some(LoadingGuard { state })
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        lock(self.state).loading = false;
    }
}

fn decode_listing(payload: Value) -> ActionResult<Vec<Experiment>> {
    let Value::Array(items) = payload else {
        let message = "Invalid data format received from API";
        return Err(StoreError::Shape(message.to_string()));
    };

    let total = items.len();
    let mut seen = HashSet::with_capacity(total);
    let mut experiments = Vec::with_capacity(total);
    let mut skipped = 0;
    for item in items {
        // only a missing or unusable id makes a record undecodable
        let Ok(exp) = serde_json::from_value::<Experiment>(item) else {
            skipped += 1;
            continue;
        };
        if seen.insert(exp.id.clone()) {
            experiments.push(exp);
        }
    }
    if skipped > 0 {
        obs::emit_records_skipped(skipped);
    }
    let duplicates = total - skipped - experiments.len();
    if duplicates > 0 {
        obs::emit_duplicates_dropped(duplicates);
    }
    Ok(experiments)
}

/// Client-side store for experiment records.
///
/// Construct one per consumer context and share it by reference or `Arc`;
/// independent instances never see each other's state.
pub struct ExperimentStore {
    remote: Arc<dyn RemoteClient>,
    notifier: Arc<dyn Notifier>,
    state: Mutex<StoreState>,
}

impl ExperimentStore {
    pub fn new(remote: Arc<dyn RemoteClient>, notifier: Arc<dyn Notifier>) -> Self {
        ExperimentStore {
            remote,
            notifier,
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Store that reports outcomes through `TracingNotifier`
    pub fn with_remote(remote: Arc<dyn RemoteClient>) -> Self {
        Self::new(remote, Arc::new(TracingNotifier))
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        lock(&self.state)
    }

    // -----------------------------------------------------------------------
    // State projections
    // -----------------------------------------------------------------------

    /// Snapshot of the collection in store order
    pub fn experiments(&self) -> Vec<Experiment> {
        self.lock().experiments.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().loading
    }

    /// Message of the last failed reload, if not cleared since
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().experiments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().experiments.is_empty()
    }

    /// First record with `id`, if any
    pub fn lookup(&self, id: &ExperimentId) -> Option<Experiment> {
        self.lock()
            .experiments
            .iter()
            .find(|e| &e.id == id)
            .cloned()
    }

    pub fn clear_error(&self) {
        self.lock().last_error = None;
    }

    // -----------------------------------------------------------------------
    // Derived views
    // -----------------------------------------------------------------------

    /// Ongoing experiments as of the current UTC date
    pub fn ongoing(&self) -> Vec<Experiment> {
        self.ongoing_on(&views::today_utc())
    }

    pub fn ongoing_on(&self, today: &str) -> Vec<Experiment> {
        views::ongoing(&self.lock().experiments, today)
    }

    /// Completed experiments as of the current UTC date
    pub fn completed(&self) -> Vec<Experiment> {
        self.completed_on(&views::today_utc())
    }

    pub fn completed_on(&self, today: &str) -> Vec<Experiment> {
        views::completed(&self.lock().experiments, today)
    }

    pub fn not_started(&self) -> Vec<Experiment> {
        views::not_started(&self.lock().experiments)
    }

    pub fn summary(&self) -> ViewCounts {
        views::summarize(&self.lock().experiments, &views::today_utc())
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Replace the collection with a fresh listing.
    ///
    /// `use_aggregated` selects the with-stats endpoint. Returns `Skipped`
    /// without any network call while another reload is pending.
    pub async fn reload(&self, use_aggregated: bool) -> ReloadStatus {
        let Some(_loading) = LoadingGuard::acquire(&self.state) else {
            obs::emit_reload_skipped();
            return ReloadStatus::Skipped;
        };

        let endpoint = if use_aggregated {
            Endpoint::ListWithStats
        } else {
            Endpoint::List
        };
        obs::emit_reload_started(&endpoint.path());

        let fetched = match self
            .remote
            .request(&endpoint, None)
            .instrument(obs::operation_span("reload"))
            .await
        {
            Ok(payload) => decode_listing(payload),
            Err(err) => Err(err.into()),
        };

        match fetched {
            Ok(experiments) => {
                let count = experiments.len();
                self.lock().experiments = experiments;
                obs::emit_reload_finished(count);
                self.notifier
                    .on_success(&format!("Loaded {} experiments", count));
                ReloadStatus::Loaded(count)
            }
            Err(err) => {
                {
                    let mut state = self.lock();
                    state.experiments.clear();
                    state.last_error = Some(err.to_string());
                }
                obs::emit_reload_failed(&err);
                self.notifier.on_error("Failed to load experiments", &err);
                ReloadStatus::Failed(err)
            }
        }
    }

    /// Validate and submit a new experiment; the server record is prepended.
    pub async fn create(&self, draft: &ExperimentDraft) -> ActionResult<Experiment> {
        let result = self
            .try_create(draft)
            .instrument(obs::operation_span("create"))
            .await;
        let id = result.as_ref().ok().map(|e| &e.id);
        obs::emit_mutation("create", id, result.is_ok());
        self.report(
            &result,
            "Experiment created successfully",
            "Failed to create experiment",
        );
        result
    }

    async fn try_create(&self, draft: &ExperimentDraft) -> ActionResult<Experiment> {
        validate(draft)?;
        let body = serde_json::to_value(draft)?;
        let payload = self.remote.request(&Endpoint::Create, Some(&body)).await?;
        let exp = Experiment::from_response(payload)?;

        let mut state = self.lock();
        state.experiments.retain(|e| e.id != exp.id);
        state.experiments.insert(0, exp.clone());
        Ok(exp)
    }

    /// Validate and submit changes to `id`; the local record is replaced in
    /// place.
    ///
    /// When `id` is not in the local collection the record is re-fetched and
    /// prepended so local state follows the server.
    pub async fn update(
        &self,
        id: &ExperimentId,
        draft: &ExperimentDraft,
    ) -> ActionResult<Experiment> {
        let result = self
            .try_update(id, draft)
            .instrument(obs::operation_span("update"))
            .await;
        obs::emit_mutation("update", Some(id), result.is_ok());
        self.report(
            &result,
            "Experiment updated successfully",
            "Failed to update experiment",
        );
        result
    }

    async fn try_update(
        &self,
        id: &ExperimentId,
        draft: &ExperimentDraft,
    ) -> ActionResult<Experiment> {
        validate(draft)?;
        let body = serde_json::to_value(draft)?;
        let payload = self
            .remote
            .request(&Endpoint::Update(id.clone()), Some(&body))
            .await?;
        let exp = Experiment::from_response(payload)?;

        let replaced = {
            let mut state = self.lock();
            match state.experiments.iter().position(|e| &e.id == id) {
                Some(index) => {
                    state.experiments[index] = exp.clone();
                    true
                }
                None => false,
            }
        };
        if !replaced {
            self.refetch_missing(id).await;
        }
        Ok(exp)
    }

    async fn refetch_missing(&self, id: &ExperimentId) {
        let fetched = match self.remote.request(&Endpoint::Get(id.clone()), None).await {
            Ok(payload) => Experiment::from_response(payload),
            Err(err) => Err(err.into()),
        };
        match fetched {
            Ok(exp) => {
                let mut state = self.lock();
                if !state.experiments.iter().any(|e| e.id == exp.id) {
                    state.experiments.insert(0, exp);
                }
            }
            Err(err) => {
                warn!(id = %id, error = %err, "Re-fetch after update failed");
            }
        }
    }

    /// Delete `id` remotely and drop every local record with that id.
    ///
    /// There is no local existence check: a successful remote delete of an
    /// unknown id still returns `Ok(())`.
    pub async fn delete(&self, id: &ExperimentId) -> ActionResult<()> {
        let result = self
            .try_delete(id)
            .instrument(obs::operation_span("delete"))
            .await;
        obs::emit_mutation("delete", Some(id), result.is_ok());
        self.report(
            &result,
            "Experiment deleted successfully",
            "Failed to delete experiment",
        );
        result
    }

    async fn try_delete(&self, id: &ExperimentId) -> ActionResult<()> {
        self.remote
            .request(&Endpoint::Delete(id.clone()), None)
            .await?;
        self.lock().experiments.retain(|e| &e.id != id);
        Ok(())
    }

    /// Mark `id` complete, then reload to pick up server-derived fields.
    ///
    /// Returns the raw completion response.
    pub async fn complete(
        &self,
        id: &ExperimentId,
        payload: &CompletionPayload,
    ) -> ActionResult<Value> {
        let result = self
            .try_complete(id, payload)
            .instrument(obs::operation_span("complete"))
            .await;
        if result.is_ok() {
            self.reload(true).await;
        }
        obs::emit_mutation("complete", Some(id), result.is_ok());
        self.report(
            &result,
            "Experiment completed successfully",
            "Failed to complete experiment",
        );
        result
    }

    async fn try_complete(
        &self,
        id: &ExperimentId,
        payload: &CompletionPayload,
    ) -> ActionResult<Value> {
        let body = serde_json::to_value(payload)?;
        let data = self
            .remote
            .request(&Endpoint::Complete(id.clone()), Some(&body))
            .await?;
        Ok(data)
    }

    /// Fetch one record; a local copy, if present, is refreshed in place.
    pub async fn fetch(&self, id: &ExperimentId) -> ActionResult<Experiment> {
        let result = match self
            .remote
            .request(&Endpoint::Get(id.clone()), None)
            .instrument(obs::operation_span("fetch"))
            .await
        {
            Ok(payload) => Experiment::from_response(payload),
            Err(err) => Err(err.into()),
        };

        match &result {
            Ok(exp) => {
                let mut state = self.lock();
                if let Some(slot) = state.experiments.iter_mut().find(|e| e.id == exp.id) {
                    *slot = exp.clone();
                }
            }
            Err(err) => self.notifier.on_error("Failed to load experiment", err),
        }
        result
    }

    /// Benchmark vs. current metric values for `id`. Read-only.
    pub async fn stats(&self, id: &ExperimentId) -> ActionResult<ExperimentStats> {
        let result = match self
            .remote
            .request(&Endpoint::Stats(id.clone()), None)
            .instrument(obs::operation_span("stats"))
            .await
        {
            Ok(payload @ Value::Object(_)) => {
                serde_json::from_value(payload).map_err(StoreError::from)
            }
            Ok(_) => Err(StoreError::Shape("Invalid stats data".to_string())),
            Err(err) => Err(err.into()),
        };
        if let Err(err) = &result {
            self.notifier
                .on_error("Failed to load experiment stats", err);
        }
        result
    }

    /// Metric datapoints inside the experiment window. Read-only.
    pub async fn datapoints(&self, id: &ExperimentId) -> ActionResult<DatapointSet> {
        let result = match self
            .remote
            .request(&Endpoint::Datapoints(id.clone()), None)
            .instrument(obs::operation_span("datapoints"))
            .await
        {
            Ok(payload) => serde_json::from_value(payload).map_err(StoreError::from),
            Err(err) => Err(err.into()),
        };
        if let Err(err) = &result {
            self.notifier
                .on_error("Failed to load experiment datapoints", err);
        }
        result
    }

    fn report<T>(&self, result: &ActionResult<T>, success: &str, failure: &str) {
        match result {
            Ok(_) => self.notifier.on_success(success),
            Err(err) => self.notifier.on_error(failure, err),
        }
    }
}
