//! Outbound chat transport.
//!
//! States never talk to a chat platform directly; they hand a `Reply` to a
//! `Transport`. The HTTP service uses `RecordingTransport` and drains the
//! buffered replies after each processed message.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// A single message sent to a user, optionally with quick-reply buttons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<String>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            buttons: Vec::new(),
        }
    }

    pub fn with_buttons(text: impl Into<String>, buttons: Vec<String>) -> Self {
        Self {
            text: text.into(),
            buttons,
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, user_id: i64, reply: Reply) -> Result<()>;
}

/// Buffers replies per user until they are drained.
#[derive(Default)]
pub struct RecordingTransport {
    outbox: Mutex<HashMap<i64, Vec<Reply>>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns everything queued for `user_id`, oldest first.
    pub async fn drain(&self, user_id: i64) -> Vec<Reply> {
        self.outbox
            .lock()
            .await
            .remove(&user_id)
            .unwrap_or_default()
    }

    /// Queued replies for `user_id` without removing them.
    pub async fn peek(&self, user_id: i64) -> Vec<Reply> {
        self.outbox
            .lock()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, user_id: i64, reply: Reply) -> Result<()> {
        self.outbox
            .lock()
            .await
            .entry(user_id)
            .or_default()
            .push(reply);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drain_is_per_user_and_empties_queue() {
        let transport = RecordingTransport::new();
        transport.send(1, Reply::text("hello")).await.unwrap();
        transport
            .send(1, Reply::with_buttons("pick", vec!["a".into(), "b".into()]))
            .await
            .unwrap();
        transport.send(2, Reply::text("other")).await.unwrap();

        let replies = transport.drain(1).await;
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].text, "hello");
        assert_eq!(replies[1].buttons, vec!["a", "b"]);

        assert!(transport.drain(1).await.is_empty());
        assert_eq!(transport.peek(2).await.len(), 1);
    }
}
