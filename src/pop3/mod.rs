//! POP3 client session.
//!
//! `Disconnected --connect--> Connected --USER/PASS--> Authenticated --QUIT--> Closed`
//!
//! One command is in flight at a time over the single owned transport.
//! A failed command is reported to the caller and never retried here.

use std::sync::LazyLock;

use regex::Regex;
use secrecy::ExposeSecret;
use tracing::{debug, info, warn};

use crate::config::Pop3Config;
use crate::error::MailError;
use crate::message;
use crate::store::MessageStore;
use crate::transport::LineTransport;

static STAT_REPLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\+OK\s+(?P<count>\d+)\s+(?P<size>\d+)").expect("STAT regex is valid")
});

/// Where a session is in the POP3 state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Authenticated,
    Closed,
}

/// Mailbox size as reported by `STAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxStat {
    pub count: u32,
    pub size: u64,
}

/// Outcome of draining the mailbox once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    /// Message count from `STAT`.
    pub total: u32,
    /// Messages parsed and accepted by the store.
    pub saved: u32,
    /// Messages that failed RETR, parsing, or saving.
    pub skipped: u32,
}

/// A POP3 session bound to one mailbox account.
pub struct Pop3Session {
    config: Pop3Config,
    transport: Option<LineTransport>,
    state: SessionState,
}

impl Pop3Session {
    pub fn new(config: Pop3Config) -> Self {
        Self {
            config,
            transport: None,
            state: SessionState::Disconnected,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Dial the server, then greet and authenticate.
    pub async fn connect(&mut self) -> Result<(), MailError> {
        self.require(SessionState::Disconnected, "connect")?;
        let transport = LineTransport::dial(
            &self.config.host,
            self.config.port,
            self.config.tls.as_ref(),
            self.config.timeout,
        )
        .await?;
        self.connect_over(transport).await
    }

    /// Greet and authenticate over an already-dialed transport.
    pub async fn connect_over(&mut self, transport: LineTransport) -> Result<(), MailError> {
        self.require(SessionState::Disconnected, "connect")?;
        self.transport = Some(transport);
        self.set_state(SessionState::Connected);

        let greeting = self.transport()?.read_line().await?;
        if !is_ok(&greeting) {
            return Err(MailError::Protocol(format!("bad greeting: {greeting}")));
        }

        let user = format!("USER {}", self.config.username);
        let reply = self.command(&user).await?;
        if !is_ok(&reply) {
            return Err(MailError::Auth { line: reply });
        }

        let pass = format!("PASS {}", self.config.password.expose_secret());
        let reply = self.command(&pass).await?;
        if !is_ok(&reply) {
            return Err(MailError::Auth { line: reply });
        }

        self.set_state(SessionState::Authenticated);
        Ok(())
    }

    /// Query the message count and total size.
    pub async fn stat(&mut self) -> Result<MailboxStat, MailError> {
        self.require(SessionState::Authenticated, "STAT")?;
        let reply = self.command("STAT").await?;
        parse_stat(&reply)
    }

    /// Retrieve message `index` (1-based) as raw text.
    pub async fn retr(&mut self, index: u32) -> Result<String, MailError> {
        self.require(SessionState::Authenticated, "RETR")?;
        let reply = self.command(&format!("RETR {index}")).await?;
        if !is_ok(&reply) {
            return Err(MailError::Protocol(format!("RETR {index}: {reply}")));
        }
        self.transport()?.read_multiline().await
    }

    /// Mark message `index` for deletion at QUIT.
    pub async fn dele(&mut self, index: u32) -> Result<(), MailError> {
        self.require(SessionState::Authenticated, "DELE")?;
        let reply = self.command(&format!("DELE {index}")).await?;
        if !is_ok(&reply) {
            return Err(MailError::Protocol(format!("DELE {index}: {reply}")));
        }
        Ok(())
    }

    /// Retrieve every message in ascending order and hand each to `store`.
    ///
    /// A message that fails to download, parse, or save is skipped. Timeouts
    /// and connection loss end the batch. If nothing was saved and at least
    /// one message failed the whole batch is an error.
    pub async fn fetch_all(&mut self, store: &dyn MessageStore) -> Result<FetchReport, MailError> {
        let stat = self.stat().await?;
        info!(
            server = %self.config.address(),
            count = stat.count,
            size = stat.size,
            "Mailbox status"
        );

        let mut report = FetchReport {
            total: stat.count,
            ..FetchReport::default()
        };

        for index in 1..=stat.count {
            match self.fetch_one(index, store).await {
                Ok(()) => {
                    report.saved += 1;
                    if self.config.delete_after_fetch {
                        match self.dele(index).await {
                            Ok(()) => {}
                            Err(e) if e.aborts_batch() => return Err(e),
                            Err(e) => warn!(index, error = %e, "Could not mark message for deletion"),
                        }
                    }
                }
                Err(e) if e.aborts_batch() => {
                    warn!(index, saved = report.saved, error = %e, "Batch aborted");
                    return Err(e);
                }
                Err(e) => {
                    warn!(index, error = %e, "Skipping message");
                    report.skipped += 1;
                }
            }
        }

        if report.saved == 0 && report.skipped > 0 {
            return Err(MailError::Batch {
                failed: report.skipped,
            });
        }
        Ok(report)
    }

    /// Send `QUIT` and release the socket whatever the server answers.
    pub async fn quit(&mut self) -> Result<(), MailError> {
        if matches!(
            self.state,
            SessionState::Disconnected | SessionState::Closed
        ) {
            return Ok(());
        }

        let result = match self.command("QUIT").await {
            Ok(reply) if is_ok(&reply) => Ok(()),
            Ok(reply) => Err(MailError::Protocol(format!("QUIT: {reply}"))),
            Err(e) => Err(e),
        };

        if let Some(transport) = self.transport.take() {
            transport.close().await;
        }
        self.set_state(SessionState::Closed);
        result
    }

    async fn fetch_one(&mut self, index: u32, store: &dyn MessageStore) -> Result<(), MailError> {
        let raw = self.retr(index).await?;
        let message = message::parse(raw.as_bytes())?;
        debug!(index, sender = %message.sender, subject = %message.subject, "Retrieved message");
        store.save_email(message).await?;
        Ok(())
    }

    async fn command(&mut self, line: &str) -> Result<String, MailError> {
        let transport = self.transport()?;
        transport.send_line(line).await?;
        transport.read_line().await
    }

    fn transport(&mut self) -> Result<&mut LineTransport, MailError> {
        self.transport
            .as_mut()
            .ok_or_else(|| MailError::Protocol("session has no open connection".into()))
    }

    fn require(&self, expected: SessionState, command: &str) -> Result<(), MailError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(MailError::Protocol(format!(
                "{command} is not valid in state {:?}",
                self.state
            )))
        }
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        debug!(server = %self.config.address(), "POP3 state {:?}", state);
    }
}

fn is_ok(reply: &str) -> bool {
    reply.starts_with("+OK")
}

fn parse_stat(reply: &str) -> Result<MailboxStat, MailError> {
    let caps = STAT_REPLY
        .captures(reply)
        .ok_or_else(|| MailError::Protocol(format!("malformed STAT reply: {reply}")))?;
    let count = caps["count"]
        .parse()
        .map_err(|_| MailError::Protocol(format!("STAT count out of range: {reply}")))?;
    let size = caps["size"]
        .parse()
        .map_err(|_| MailError::Protocol(format!("STAT size out of range: {reply}")))?;
    Ok(MailboxStat { count, size })
}
