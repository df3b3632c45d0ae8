//! Mail message model, raw-message parsing, and reply/forward composition.

pub mod composer;
pub mod parser;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use composer::{build_forward, build_reply};
pub use parser::parse;

/// A message retrieved from the mailbox.
///
/// Carries no identity; the store assigns one when it persists the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Sender address.
    pub sender: String,
    /// Recipient address(es), comma-joined when there are several.
    pub recipient: String,
    pub subject: String,
    /// When the message was sent, or when it was ingested if the `Date`
    /// header was missing or unreadable.
    pub sent_at: DateTime<Utc>,
    pub body: String,
    /// Always `false` on ingestion.
    #[serde(default)]
    pub read: bool,
}
