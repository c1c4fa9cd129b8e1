//! Structured observability hooks for store lifecycle events.
//!
//! Reload and mutation outcomes are emitted as `tracing` events with a
//! stable `event` field so they can be filtered or aggregated
//! (`EXPERIMENTS_LOG=info`, JSON output via `init_tracing(true, ..)`).

use tracing::{debug, info, warn, Span};

use crate::schema::ExperimentId;

/// Span tagged with the store operation name.
///
/// Attach it with `tracing::Instrument` so remote calls and notifications
/// made while the operation is pending are attributed to it:
///
/// ```ignore
/// self.try_create(draft).instrument(operation_span("create")).await
/// ```
pub fn operation_span(operation: &'static str) -> Span {
    tracing::info_span!("experiments.store", op = operation)
}

/// Emit event: reload started against the given endpoint path.
pub fn emit_reload_started(path: &str) {
    info!(event = "store.reload_started", endpoint = %path);
}

/// Emit event: reload dropped because another one is in flight.
pub fn emit_reload_skipped() {
    debug!(event = "store.reload_skipped");
}

/// Emit event: reload replaced the collection.
pub fn emit_reload_finished(count: usize) {
    info!(event = "store.reload_finished", count = count);
}

/// Emit event: reload failed and the collection was cleared.
pub fn emit_reload_failed(error: &dyn std::fmt::Display) {
    warn!(event = "store.reload_failed", error = %error);
}

/// Emit event: a write operation finished.
pub fn emit_mutation(kind: &str, id: Option<&ExperimentId>, success: bool) {
    match id {
        Some(id) => info!(event = "store.mutation", kind = %kind, id = %id, success = success),
        None => info!(event = "store.mutation", kind = %kind, success = success),
    }
}

/// Emit event: listing elements without a usable id were skipped.
pub fn emit_records_skipped(count: usize) {
    warn!(event = "store.records_skipped", count = count);
}

/// Emit event: duplicate ids were dropped from a listing.
pub fn emit_duplicates_dropped(count: usize) {
    warn!(event = "store.duplicates_dropped", count = count);
}
