// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

/// Errors from pub/sub operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PubsubError {
    #[error("publish failed: {0}")]
    PublishFailed(String),
}

/// Adapter for publishing change notifications on named channels.
///
/// Delivery is best-effort and idempotent from the consumer's standpoint;
/// publishers must not rely on a message being observed.
#[async_trait]
pub trait Pubsub: Clone + Send + Sync + 'static {
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), PubsubError>;
}

/// A message recorded by [`InMemoryPubsub`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub channel: String,
    pub payload: Vec<u8>,
}

#[derive(Default)]
struct InMemoryPubsubState {
    messages: Vec<PublishedMessage>,
    fail_next: Option<String>,
}

/// In-memory pub/sub that records published messages.
///
/// Stands in for the broker in tests and single-process embeddings.
#[derive(Clone, Default)]
pub struct InMemoryPubsub {
    inner: Arc<Mutex<InMemoryPubsubState>>,
}

impl InMemoryPubsub {
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages published so far, in publish order.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.inner.lock().messages.clone()
    }

    /// Payloads published on a specific channel, in publish order.
    pub fn messages_on(&self, channel: &str) -> Vec<Vec<u8>> {
        self.inner
            .lock()
            .messages
            .iter()
            .filter(|m| m.channel == channel)
            .map(|m| m.payload.clone())
            .collect()
    }

    /// Make the next `publish` call fail with `msg`.
    pub fn fail_next(&self, msg: &str) {
        self.inner.lock().fail_next = Some(msg.to_string());
    }
}

#[async_trait]
impl Pubsub for InMemoryPubsub {
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), PubsubError> {
        let mut inner = self.inner.lock();
        if let Some(msg) = inner.fail_next.take() {
            return Err(PubsubError::PublishFailed(msg));
        }
        inner.messages.push(PublishedMessage {
            channel: channel.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
#[path = "pubsub_tests.rs"]
mod tests;
