//! In-memory [`MessageStore`] for exercising the purge loop without HTTP.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use http::StatusCode;
use tokio::time::Instant;

use super::{BulkOutcome, DeleteOutcome, Message, MessageStore, PurgeError, check_bulk_size};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Fetch,
    Bulk(Vec<String>),
    Delete(String),
}

/// `count` messages from the last few minutes, newest first.
pub fn young_messages(prefix: &str, count: usize) -> Vec<Message> {
    let now = Utc::now();
    (0..count)
        .map(|i| Message::new(format!("{prefix}-{i}"), now - Duration::minutes(i as i64)))
        .collect()
}

/// `count` messages a month or more old, newest first.
pub fn old_messages(prefix: &str, count: usize) -> Vec<Message> {
    let now = Utc::now();
    (0..count)
        .map(|i| Message::new(format!("{prefix}-{i}"), now - Duration::days(30 + i as i64)))
        .collect()
}

#[derive(Default)]
struct State {
    messages: Vec<Message>,
    calls: Vec<(StoreCall, Instant)>,
    outcomes: Vec<DeleteOutcome>,
    fetches: usize,
    refills: usize,
}

/// Channel contents live in a `Vec` ordered newest first, like the real listing.
#[derive(Default)]
pub struct FakeMessageStore {
    state: Mutex<State>,
    bulk_rejection: Option<u16>,
    forbidden: HashSet<String>,
    vanished: HashSet<String>,
    failing: HashMap<String, u16>,
    rate_limited: HashSet<String>,
    fail_fetch_on: Option<usize>,
    endless: bool,
}

impl FakeMessageStore {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            state: Mutex::new(State {
                messages,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// A channel that refills with a full page of young messages whenever it empties.
    pub fn endless() -> Self {
        Self {
            endless: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn reject_bulk(mut self, status: u16) -> Self {
        self.bulk_rejection = Some(status);
        self
    }

    pub fn forbid(mut self, id: &str) -> Self {
        self.forbidden.insert(id.to_string());
        self
    }

    /// The message is gone by the time it is deleted (404).
    pub fn vanish(mut self, id: &str) -> Self {
        self.vanished.insert(id.to_string());
        self
    }

    pub fn fail_with(mut self, id: &str, status: u16) -> Self {
        self.failing.insert(id.to_string(), status);
        self
    }

    pub fn rate_limit_delete(mut self, id: &str) -> Self {
        self.rate_limited.insert(id.to_string());
        self
    }

    /// Make the `n`th listing call (1-based) fail with a 500.
    pub fn fail_fetch_on(mut self, n: usize) -> Self {
        self.fail_fetch_on = Some(n);
        self
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .map(|(call, _)| call.clone())
            .collect()
    }

    pub fn bulk_calls(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::Bulk(ids) => Some(ids),
                _ => None,
            })
            .collect()
    }

    /// Single deletes in call order, with the (virtual) time each was issued.
    pub fn delete_calls(&self) -> Vec<(String, Instant)> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter_map(|(call, at)| match call {
                StoreCall::Delete(id) => Some((id.clone(), *at)),
                _ => None,
            })
            .collect()
    }

    pub fn delete_outcomes(&self) -> Vec<DeleteOutcome> {
        self.state.lock().unwrap().outcomes.clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.state.lock().unwrap().fetches
    }

    pub fn remaining(&self) -> Vec<Message> {
        self.state.lock().unwrap().messages.clone()
    }
}

#[async_trait]
impl MessageStore for FakeMessageStore {
    async fn fetch_batch(&self, _channel_id: &str) -> Result<Vec<Message>, PurgeError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push((StoreCall::Fetch, Instant::now()));
        state.fetches += 1;

        if self.fail_fetch_on == Some(state.fetches) {
            return Err(PurgeError::FetchFailed {
                status: 500,
                body: "boom".into(),
            });
        }

        if self.endless && state.messages.is_empty() {
            state.refills += 1;
            state.messages = young_messages(&format!("gen{}", state.refills), 100);
        }

        Ok(state.messages.iter().take(super::FETCH_LIMIT).cloned().collect())
    }

    async fn bulk_delete(
        &self,
        _channel_id: &str,
        ids: &[String],
    ) -> Result<BulkOutcome, PurgeError> {
        check_bulk_size(ids)?;

        let mut state = self.state.lock().unwrap();
        state.calls.push((StoreCall::Bulk(ids.to_vec()), Instant::now()));

        if let Some(status) = self.bulk_rejection {
            return Ok(BulkOutcome::Rejected { status });
        }

        state.messages.retain(|m| !ids.contains(&m.id));
        Ok(BulkOutcome::Deleted)
    }

    async fn delete_one(
        &self,
        _channel_id: &str,
        message_id: &str,
    ) -> Result<DeleteOutcome, PurgeError> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push((StoreCall::Delete(message_id.to_string()), Instant::now()));

        if self.rate_limited.contains(message_id) {
            return Err(PurgeError::RateLimitExceeded {
                route: format!("DELETE channels/chan/messages/{message_id}"),
                attempts: 7,
            });
        }

        let status = if self.forbidden.contains(message_id) {
            StatusCode::FORBIDDEN
        } else if self.vanished.contains(message_id) {
            StatusCode::NOT_FOUND
        } else if let Some(status) = self.failing.get(message_id) {
            StatusCode::from_u16(*status).unwrap()
        } else {
            StatusCode::NO_CONTENT
        };

        let outcome = DeleteOutcome::from_status(status);
        if matches!(
            outcome,
            DeleteOutcome::Deleted | DeleteOutcome::Skipped(super::SkipReason::NotFound)
        ) {
            state.messages.retain(|m| m.id != message_id);
        }
        state.outcomes.push(outcome);
        Ok(outcome)
    }
}
