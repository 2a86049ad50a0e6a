//! HTTP transport for the ledger API, built on reqwest.

use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde_json::Value;

use super::error::{SyncError, SyncResult};
use super::transport::{LedgerTransport, MutationRequest};
use crate::models::{EntityType, MutationAction};
use crate::util::{compact_text, is_http_url};
use crate::wire::{ConflictBody, ErrorBody, SuccessBody};

/// Ledger API client used by the sync orchestrator.
#[derive(Clone)]
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a client for `base_url` (e.g. `http://127.0.0.1:8080`).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> crate::Result<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if !is_http_url(&base_url) {
            return Err(crate::Error::Config(format!(
                "API base URL must start with http:// or https://: {base_url}"
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| crate::Error::Config(format!("HTTP client: {error}")))?;

        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, entity_type: EntityType) -> String {
        format!("{}/v1/{}", self.base_url, entity_type.collection_path())
    }

    fn mutation_target(&self, request: &MutationRequest) -> (Method, String) {
        let collection = self.collection_url(request.entity_type);
        match request.action {
            MutationAction::Create => (Method::POST, collection),
            MutationAction::Update => (Method::PUT, format!("{collection}/{}", request.entity_id)),
            MutationAction::Delete => (
                Method::DELETE,
                format!("{collection}/{}", request.entity_id),
            ),
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> SyncResult<(StatusCode, String)> {
        let response = builder
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status();
        let body = response.text().await.map_err(map_reqwest_error)?;
        Ok((status, body))
    }
}

impl LedgerTransport for HttpTransport {
    async fn dispatch(&self, request: &MutationRequest) -> SyncResult<Value> {
        let (method, url) = self.mutation_target(request);
        tracing::debug!(
            entity_type = %request.entity_type,
            entity_id = %request.entity_id,
            action = %request.action,
            "{method} {url}"
        );

        let (status, body) = self
            .send(self.client.request(method, &url).json(&request.body))
            .await?;
        interpret_response(status, &body)
    }

    async fn fetch_all(&self, entity_type: EntityType) -> SyncResult<Vec<Value>> {
        let (status, body) = self
            .send(self.client.get(self.collection_url(entity_type)))
            .await?;
        match interpret_response(status, &body)? {
            Value::Array(items) => Ok(items),
            other => Err(SyncError::InvalidResponse(format!(
                "expected a list of {}, got {}",
                entity_type.collection_path(),
                compact_text(&other.to_string())
            ))),
        }
    }

    async fn is_reachable(&self) -> bool {
        let url = format!("{}/healthz", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(error) => {
                tracing::debug!("Health probe failed: {error}");
                false
            }
        }
    }
}

fn map_reqwest_error(error: reqwest::Error) -> SyncError {
    if error.is_timeout() {
        SyncError::Timeout
    } else if error.is_decode() {
        SyncError::InvalidResponse(error.to_string())
    } else {
        SyncError::Network(error.to_string())
    }
}

/// Map an API response to the entity payload or a classified error.
pub fn interpret_response(status: StatusCode, body: &str) -> SyncResult<Value> {
    if status.is_success() {
        return serde_json::from_str::<SuccessBody<Value>>(body)
            .map(|envelope| envelope.data)
            .map_err(|error| {
                SyncError::InvalidResponse(format!("{error}: {}", compact_text(body)))
            });
    }

    if status == StatusCode::CONFLICT {
        if let Ok(conflict) = serde_json::from_str::<ConflictBody>(body) {
            return Err(SyncError::Conflict {
                client_version: conflict.data.client_version,
                server_version: conflict.data.server_version,
                current_data: conflict.data.current_data,
            });
        }
    }

    let message = error_message(body);
    if status == StatusCode::NOT_FOUND {
        return Err(SyncError::NotFound(message));
    }

    Err(SyncError::Server {
        status: status.as_u16(),
        message,
    })
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body).map_or_else(
        |_| {
            let compact = compact_text(body);
            if compact.is_empty() {
                "empty response body".to_string()
            } else {
                compact
            }
        },
        |parsed| parsed.message,
    )
}
