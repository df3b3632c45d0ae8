//! One-shot SMTP submission via lettre.
//!
//! Each call builds a fresh transport, submits one envelope, and drops the
//! connection. The message is a minimal RFC 822 text (From, To, Subject,
//! blank line, body) handed to lettre's raw-send path unchanged.

use lettre::address::Envelope;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use secrecy::ExposeSecret;
use tracing::info;

use crate::config::{SmtpConfig, SmtpSecurity};
use crate::error::MailError;

/// Stateless sender bound to one relay.
#[derive(Debug, Clone)]
pub struct SmtpSender {
    config: SmtpConfig,
}

impl SmtpSender {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    /// Submit one message. Fails without dialing if `to` is empty or any
    /// address does not parse.
    pub async fn send_email(
        &self,
        from: &str,
        to: &[String],
        subject: &str,
        body: &str,
    ) -> Result<(), MailError> {
        if to.is_empty() {
            return Err(MailError::Send("no recipients".into()));
        }

        let from_addr: Address = from
            .parse()
            .map_err(|e| MailError::Send(format!("invalid from address '{from}': {e}")))?;
        let to_addrs = to
            .iter()
            .map(|addr| {
                addr.parse::<Address>()
                    .map_err(|e| MailError::Send(format!("invalid to address '{addr}': {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let envelope = Envelope::new(Some(from_addr), to_addrs)
            .map_err(|e| MailError::Send(format!("invalid envelope: {e}")))?;

        let raw = render_message(from, to, subject, body);
        let transport = self.transport()?;
        transport
            .send_raw(&envelope, raw.as_bytes())
            .await
            .map_err(|e| MailError::Send(format!("SMTP send failed: {e}")))?;

        info!(
            relay = %self.config.host,
            recipients = to.len(),
            subject = %subject,
            "Email sent"
        );
        Ok(())
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailError> {
        let host = &self.config.host;
        let builder = match self.config.security {
            SmtpSecurity::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
            SmtpSecurity::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| MailError::Send(format!("SMTP STARTTLS setup failed: {e}")))?,
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| MailError::Send(format!("SMTP relay setup failed: {e}")))?,
        };

        let mut builder = builder
            .port(self.config.port)
            .timeout(Some(self.config.timeout));
        if !self.config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.expose_secret().to_string(),
            ));
        }
        Ok(builder.build())
    }
}

/// Render the minimal message text with CRLF line endings.
///
/// Line breaks in the subject are flattened so they cannot start new headers.
pub fn render_message(from: &str, to: &[String], subject: &str, body: &str) -> String {
    let subject = subject.replace(['\r', '\n'], " ");
    let mut out = format!(
        "From: {from}\r\nTo: {}\r\nSubject: {subject}\r\n\r\n",
        to.join(", ")
    );
    for line in body.lines() {
        out.push_str(line);
        out.push_str("\r\n");
    }
    out
}
