//! In-memory `MessageStore`, used by the binary when no external store is
//! wired in and by the tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::message::Message;
use crate::store::MessageStore;

/// A message together with the identity the store gave it.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: Uuid,
    pub message: Message,
    pub stored_at: DateTime<Utc>,
}

/// Keeps saved messages in insertion order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    messages: RwLock<Vec<StoredMessage>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything saved so far, oldest first.
    pub async fn messages(&self) -> Vec<StoredMessage> {
        self.messages.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn save_email(&self, message: Message) -> Result<(), StoreError> {
        let stored = StoredMessage {
            id: Uuid::new_v4(),
            message,
            stored_at: Utc::now(),
        };
        tracing::debug!(id = %stored.id, sender = %stored.message.sender, "Stored message");
        self.messages.write().await.push(stored);
        Ok(())
    }
}
