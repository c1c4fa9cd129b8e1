//! Remote client abstraction for the experiments API
//!
//! `RemoteClient` is the only seam between the store and the backend. It is
//! async and backend-agnostic: `HttpRemoteClient` talks to the real API, and
//! `fakes::MemoryRemoteClient` answers in memory for tests.
//!
//! Contract: ordinary transport and HTTP failures come back as
//! `Err(RemoteError)`; implementations never panic on them.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RemoteError;
use crate::schema::ExperimentId;

/// Result type for remote calls
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// HTTP verb an endpoint is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical endpoints consumed by the store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    List,
    /// Listing with precomputed stats per experiment (avoids N+1 fetches)
    ListWithStats,
    Get(ExperimentId),
    Create,
    Update(ExperimentId),
    Delete(ExperimentId),
    Stats(ExperimentId),
    Complete(ExperimentId),
    Datapoints(ExperimentId),
}

/// Endpoint without its id, used to script and count calls in fakes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    List,
    ListWithStats,
    Get,
    Create,
    Update,
    Delete,
    Stats,
    Complete,
    Datapoints,
}

impl Endpoint {
    pub fn kind(&self) -> EndpointKind {
        match self {
            Endpoint::List => EndpointKind::List,
            Endpoint::ListWithStats => EndpointKind::ListWithStats,
            Endpoint::Get(_) => EndpointKind::Get,
            Endpoint::Create => EndpointKind::Create,
            Endpoint::Update(_) => EndpointKind::Update,
            Endpoint::Delete(_) => EndpointKind::Delete,
            Endpoint::Stats(_) => EndpointKind::Stats,
            Endpoint::Complete(_) => EndpointKind::Complete,
            Endpoint::Datapoints(_) => EndpointKind::Datapoints,
        }
    }

    pub fn method(&self) -> Method {
        match self {
            Endpoint::List
            | Endpoint::ListWithStats
            | Endpoint::Get(_)
            | Endpoint::Stats(_)
            | Endpoint::Datapoints(_) => Method::Get,
            Endpoint::Create | Endpoint::Complete(_) => Method::Post,
            Endpoint::Update(_) => Method::Put,
            Endpoint::Delete(_) => Method::Delete,
        }
    }

    /// Path relative to the API prefix
    pub fn path(&self) -> String {
        match self {
            Endpoint::List | Endpoint::Create => "/experiments".to_string(),
            Endpoint::ListWithStats => "/experiments/with-stats".to_string(),
            Endpoint::Get(id) | Endpoint::Update(id) | Endpoint::Delete(id) => {
                format!("/experiments/{}", id)
            }
            Endpoint::Stats(id) => format!("/experiments/{}/stats", id),
            Endpoint::Complete(id) => format!("/experiments/{}/complete", id),
            Endpoint::Datapoints(id) => format!("/experiments/{}/datapoints", id),
        }
    }

    /// The experiment this endpoint targets, if any
    pub fn id(&self) -> Option<&ExperimentId> {
        match self {
            Endpoint::List | Endpoint::ListWithStats | Endpoint::Create => None,
            Endpoint::Get(id)
            | Endpoint::Update(id)
            | Endpoint::Delete(id)
            | Endpoint::Stats(id)
            | Endpoint::Complete(id)
            | Endpoint::Datapoints(id) => Some(id),
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method(), self.path())
    }
}

/// Backend access used by `ExperimentStore`.
///
/// Guarantees:
/// - Success carries the decoded JSON body.
/// - Transport errors, non-2xx responses and undecodable bodies are returned
///   as `RemoteError`, never raised.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Issue one call. `body` is sent as JSON for endpoints that take one.
    async fn request(&self, endpoint: &Endpoint, body: Option<&Value>) -> RemoteResult<Value>;
}
