//! Wiremock helpers for exercising the API client.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering as AtomicOrdering},
};

use serde_json::{Value, json};
use wiremock::ResponseTemplate;

/// Listing entry with a creation time `age` before now.
pub fn message_json(id: &str, age: chrono::Duration) -> Value {
    json!({
        "id": id,
        "type": 0,
        "content": "hello",
        "channel_id": "1",
        "timestamp": (chrono::Utc::now() - age).to_rfc3339(),
    })
}

/// A 429 in the shape the platform sends it.
pub fn rate_limited(retry_after_secs: f64) -> ResponseTemplate {
    ResponseTemplate::new(429).set_body_json(json!({
        "message": "You are being rate limited.",
        "retry_after": retry_after_secs,
        "global": false,
    }))
}

struct SequentialResponderState {
    responses: Vec<ResponseTemplate>,
    call_count: AtomicUsize,
}

/// A wiremock responder that returns different responses on successive calls.
///
/// After the list is exhausted the last response repeats. Clone it before
/// mounting to read [`SequentialResponder::call_count`] afterwards.
#[derive(Clone)]
pub struct SequentialResponder {
    state: Arc<SequentialResponderState>,
}

impl SequentialResponder {
    pub fn new(responses: Vec<ResponseTemplate>) -> Self {
        assert!(
            !responses.is_empty(),
            "SequentialResponder requires at least one response"
        );
        Self {
            state: Arc::new(SequentialResponderState {
                responses,
                call_count: AtomicUsize::new(0),
            }),
        }
    }

    pub fn call_count(&self) -> usize {
        self.state.call_count.load(AtomicOrdering::SeqCst)
    }
}

impl wiremock::Respond for SequentialResponder {
    fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
        let count = self.state.call_count.fetch_add(1, AtomicOrdering::SeqCst);
        let idx = count.min(self.state.responses.len() - 1);
        self.state.responses[idx].clone()
    }
}
