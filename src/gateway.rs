//! Gateway facade — the four operations exposed to the rest of the
//! application: send, reply, forward, and an on-demand mailbox fetch.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::config::{GatewayConfig, Pop3Config};
use crate::error::{ConfigError, Error, MailError, Result};
use crate::message::{Message, build_forward, build_reply};
use crate::pop3::FetchReport;
use crate::scheduler::{FetchScheduler, TickOutcome, run_tick};
use crate::smtp::SmtpSender;
use crate::store::MessageStore;

/// Entry point for outbound mail and manual fetches.
///
/// Manual fetches and the ticks of any scheduler built by
/// [`MailGateway::scheduler`] share one lock, so only one of them talks to
/// the mailbox at a time.
pub struct MailGateway {
    smtp: Option<SmtpSender>,
    pop3: Option<Pop3Config>,
    store: Option<Arc<dyn MessageStore>>,
    fetch_lock: Arc<Mutex<()>>,
}

impl MailGateway {
    pub fn new(config: &GatewayConfig, store: Option<Arc<dyn MessageStore>>) -> Self {
        Self {
            smtp: config.smtp.clone().map(SmtpSender::new),
            pop3: config.pop3.clone(),
            store,
            fetch_lock: Arc::default(),
        }
    }

    /// Send a new message.
    pub async fn send_email(
        &self,
        from: &str,
        to: &[String],
        subject: &str,
        body: &str,
    ) -> Result<()> {
        self.sender()?.send_email(from, to, subject, body).await?;
        Ok(())
    }

    /// Reply to `original`, addressed to its sender.
    pub async fn reply_email(&self, from: &str, original: &Message, reply_text: &str) -> Result<()> {
        if original.sender.is_empty() {
            return Err(MailError::Send("original message has no sender".into()).into());
        }
        let (subject, body) = build_reply(original, reply_text);
        debug!(to = %original.sender, subject = %subject, "Sending reply");
        self.send_email(from, &[original.sender.clone()], &subject, &body)
            .await
    }

    /// Forward `original` to new recipients.
    pub async fn forward_email(&self, from: &str, to: &[String], original: &Message) -> Result<()> {
        let (subject, body) = build_forward(original);
        debug!(recipients = to.len(), subject = %subject, "Forwarding message");
        self.send_email(from, to, &subject, &body).await
    }

    /// Drain the mailbox once, waiting for a scheduled tick in progress to
    /// finish first.
    pub async fn fetch_emails_via_pop3(&self) -> Result<FetchReport> {
        let config = self.pop3.as_ref().ok_or_else(|| disabled("POP3"))?;
        let store = self.store.as_ref().ok_or_else(|| disabled("message store"))?;

        let _fetching = self.fetch_lock.lock().await;
        match run_tick(config, store.as_ref()).await {
            TickOutcome::Fetched(report) => Ok(report),
            TickOutcome::ConnectFailed(e) | TickOutcome::FetchFailed(e) => Err(e.into()),
            TickOutcome::Disabled => Err(disabled("POP3")),
        }
    }

    /// Build a scheduler that shares this gateway's mailbox and store.
    pub fn scheduler(&self, interval: std::time::Duration) -> FetchScheduler {
        FetchScheduler::new(self.pop3.clone(), self.store.clone(), interval)
            .with_fetch_lock(Arc::clone(&self.fetch_lock))
    }

    fn sender(&self) -> Result<&SmtpSender> {
        self.smtp.as_ref().ok_or_else(|| disabled("SMTP"))
    }
}

fn disabled(feature: &str) -> Error {
    ConfigError::Disabled {
        feature: feature.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::store::MemoryStore;

    fn unconfigured() -> MailGateway {
        let config = GatewayConfig {
            pop3: None,
            smtp: None,
            fetch_interval: crate::config::DEFAULT_FETCH_INTERVAL,
        };
        MailGateway::new(&config, Some(Arc::new(MemoryStore::new())))
    }

    fn original() -> Message {
        Message {
            sender: String::new(),
            recipient: "me@example.com".into(),
            subject: "Hello".into(),
            sent_at: Utc::now(),
            body: "hi".into(),
            read: false,
        }
    }

    #[tokio::test]
    async fn send_without_smtp_is_config_error() {
        let err = unconfigured()
            .send_email("me@example.com", &["you@example.com".into()], "s", "b")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::Disabled { .. })));
    }

    #[tokio::test]
    async fn fetch_without_pop3_is_config_error() {
        let err = unconfigured().fetch_emails_via_pop3().await.unwrap_err();
        assert!(err.to_string().contains("POP3 is not configured"));
    }

    #[tokio::test]
    async fn reply_needs_original_sender() {
        let err = unconfigured()
            .reply_email("me@example.com", &original(), "ok")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Mail(MailError::Send(_))));
    }

    #[tokio::test]
    async fn scheduler_is_passive_without_pop3() {
        let scheduler = unconfigured().scheduler(std::time::Duration::from_secs(60));
        assert!(!scheduler.is_enabled());
    }
}
