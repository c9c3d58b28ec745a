//! A generic HTTP [`Provider`] adapter.
//!
//! Vendor-specific LLM clients (Anthropic, OpenAI, ...) are out of scope
//! for this runtime — providers are expected to be an opaque
//! `complete(request) -> response` call. This adapter is the thinnest
//! thing that can satisfy that boundary end to end: it POSTs a
//! [`ProviderRequest`] as JSON to a configured endpoint and expects a
//! [`ProviderResponse`] back, with no vendor-specific translation in
//! between. A deployment that wants a real provider swaps this adapter
//! for one that speaks that provider's wire format and maps it to the
//! same two types.

use agent_provider::{Provider, ProviderError, ProviderRequest, ProviderResponse};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Speaks the provider boundary as plain JSON POST/response, against
/// whatever endpoint terminates it.
pub struct HttpProvider {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpProvider {
    /// Build a client targeting `endpoint`, which must accept a POSTed
    /// [`ProviderRequest`] and reply with a [`ProviderResponse`].
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Other(Box::new(e)))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }
}

impl Provider for HttpProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let resp = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_err)?;

        if resp.status().as_u16() == 429 {
            return Err(ProviderError::RateLimited);
        }
        if resp.status().as_u16() == 401 || resp.status().as_u16() == 403 {
            return Err(ProviderError::AuthFailed(resp.status().to_string()));
        }
        let resp = resp.error_for_status().map_err(map_reqwest_err)?;

        resp.json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

fn map_reqwest_err(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() || e.is_connect() {
        ProviderError::RequestFailed(e.to_string())
    } else {
        ProviderError::Other(Box::new(e))
    }
}
