//! `MessageStore` trait — the only persistence seam the gateway needs.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::message::Message;

/// Destination for messages pulled from the mailbox.
///
/// Implementations assign their own identity to each saved message and must
/// be safe to share; the HTTP side of the application calls into the same
/// store concurrently.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist one freshly retrieved message.
    async fn save_email(&self, message: Message) -> Result<(), StoreError>;
}
