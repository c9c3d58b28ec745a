#![deny(missing_docs)]
//! Deterministic [`Provider`] test double.
//!
//! Queues canned `ProviderResponse`s and hands them out in order, so the
//! ReAct loop's tests can script a full turn sequence without a real LLM.

use agent_provider::{Provider, ProviderError, ProviderRequest, ProviderResponse};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// A `Provider` that replays a fixed queue of responses.
pub struct MockProvider {
    responses: Mutex<std::collections::VecDeque<ProviderResponse>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl MockProvider {
    /// Build a mock that will hand out `responses` in order, one per call.
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// How many times `complete` has been called.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The requests this mock has seen so far, in order.
    pub async fn requests_seen(&self) -> Vec<ProviderRequest> {
        self.requests.lock().await.clone()
    }
}

impl Provider for MockProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().await.push(request);
        self.responses
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| ProviderError::Other("MockProvider queue exhausted".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_provider::{ContentPart, StopReason, TokenUsage};

    fn canned(text: &str) -> ProviderResponse {
        ProviderResponse {
            content: vec![ContentPart::Text { text: text.into() }],
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage::default(),
            model: "mock".into(),
            cost: None,
            truncated: None,
        }
    }

    #[tokio::test]
    async fn hands_out_responses_in_order() {
        let mock = MockProvider::new(vec![canned("first"), canned("second")]);
        let req = ProviderRequest {
            model: None,
            messages: vec![],
            tools: vec![],
            max_tokens: None,
            temperature: None,
            system: None,
            extra: serde_json::Value::Null,
        };
        let a = mock.complete(req.clone()).await.unwrap();
        let b = mock.complete(req).await.unwrap();
        assert_eq!(a.content, vec![ContentPart::Text { text: "first".into() }]);
        assert_eq!(b.content, vec![ContentPart::Text { text: "second".into() }]);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn exhausted_queue_errors() {
        let mock = MockProvider::new(vec![]);
        let req = ProviderRequest {
            model: None,
            messages: vec![],
            tools: vec![],
            max_tokens: None,
            temperature: None,
            system: None,
            extra: serde_json::Value::Null,
        };
        assert!(mock.complete(req).await.is_err());
    }
}
