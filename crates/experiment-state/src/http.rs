//! HTTP implementation of `RemoteClient`
//!
//! Binds each logical `Endpoint` to its method and path under the configured
//! base URL and converts every failure into a `RemoteError`.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ApiConfig;
use crate::error::RemoteError;
use crate::remote::{Endpoint, Method, RemoteClient, RemoteResult};

/// reqwest-backed client for the experiments API
#[derive(Debug, Clone)]
pub struct HttpRemoteClient {
    config: ApiConfig,
    http_client: reqwest::Client,
}

impl HttpRemoteClient {
    /// Create a new client
    pub fn new(config: ApiConfig) -> RemoteResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .build()
            .map_err(|e| RemoteError::Client(e.to_string()))?;

        Ok(HttpRemoteClient {
            config,
            http_client,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> RemoteResult<Self> {
        Self::new(ApiConfig::from_env())
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    async fn send(&self, endpoint: &Endpoint, body: Option<&Value>) -> RemoteResult<Value> {
        let url = self.config.url_for(&endpoint.path());
        let builder = match endpoint.method() {
            Method::Get => self.http_client.get(&url),
            Method::Post => self.http_client.post(&url),
            Method::Put => self.http_client.put(&url),
            Method::Delete => self.http_client.delete(&url),
        };
        let builder = match body {
            Some(body) => builder.json(body),
            None => builder.header(reqwest::header::CONTENT_TYPE, "application/json"),
        };

        debug!(method = %endpoint.method(), url = %url, "Sending API request");
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn request(&self, endpoint: &Endpoint, body: Option<&Value>) -> RemoteResult<Value> {
        let result = self.send(endpoint, body).await;
        if let Err(err) = &result {
            warn!(endpoint = %endpoint.path(), error = %err, "API request failed");
        }
        result
    }
}
