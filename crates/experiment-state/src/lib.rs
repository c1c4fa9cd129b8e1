//! Experiment-State: client-side state for experiment records
//!
//! This crate keeps the authoritative in-memory list of experiments fetched
//! from the experiments API, applies CRUD operations against the backend and
//! reconciles local state after each mutation.
//!
//! ## Key Components
//!
//! - `ExperimentStore`: owns the collection, loading flag and last error
//! - `RemoteClient`: async seam to the backend (`HttpRemoteClient` for real
//!   traffic, `fakes::MemoryRemoteClient` for tests)
//! - `views`: pure ongoing / completed / not-started classification
//! - `Notifier`: fire-and-forget success/error sink

pub mod config;
mod error;
pub mod fakes;
pub mod http;
pub mod notify;
pub mod obs;
pub mod remote;
mod schema;
pub mod store;
pub mod telemetry;
pub mod validate;
pub mod views;

pub use config::ApiConfig;
pub use error::{RemoteError, StoreError, ValidationError};
pub use http::HttpRemoteClient;
pub use notify::{NoopNotifier, Notifier, TracingNotifier};
pub use remote::{Endpoint, EndpointKind, Method, RemoteClient, RemoteResult};
pub use schema::{
    CompletionPayload, Datapoint, DatapointSet, Experiment, ExperimentDraft, ExperimentId,
    ExperimentStats,
};
pub use store::{ActionOutcome, ActionResult, ExperimentStore, ReloadStatus};
pub use telemetry::init_tracing;
pub use validate::validate;
pub use views::{Phase, ViewCounts};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
