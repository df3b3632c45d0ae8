//! Configuration types.
//!
//! Everything is read once from the environment at startup. A missing
//! `POP3_HOST` or `SMTP_HOST` disables that side of the gateway instead of
//! failing, so a process can run send-only or fetch-only.

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default per-call socket deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default fetch scheduler interval.
pub const DEFAULT_FETCH_INTERVAL: Duration = Duration::from_secs(60);

/// TLS settings for the POP3 transport.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Name presented for SNI and certificate checks. Defaults to the host.
    pub server_name: Option<String>,
    /// Accept any certificate. Only for test or self-signed servers.
    pub skip_verify: bool,
}

/// POP3 mailbox settings.
#[derive(Debug, Clone)]
pub struct Pop3Config {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    /// `None` means plain TCP.
    pub tls: Option<TlsConfig>,
    /// Deadline applied to every read and write.
    pub timeout: Duration,
    /// Issue `DELE` for each message once the store accepted it.
    pub delete_after_fetch: bool,
}

impl Pop3Config {
    /// `host:port` used for dialing and log fields.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Read POP3 settings. Returns `Ok(None)` if `POP3_HOST` is not set.
    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(host) = lookup("POP3_HOST") else {
            return Ok(None);
        };

        let use_tls = parse_or(&lookup, "POP3_TLS", true)?;
        let default_port = if use_tls { 995 } else { 110 };
        let tls = if use_tls {
            Some(TlsConfig {
                server_name: lookup("POP3_TLS_SERVER_NAME"),
                skip_verify: parse_or(&lookup, "POP3_TLS_SKIP_VERIFY", false)?,
            })
        } else {
            None
        };

        Ok(Some(Self {
            host,
            port: parse_or(&lookup, "POP3_PORT", default_port)?,
            username: lookup("POP3_USERNAME").unwrap_or_default(),
            password: SecretString::from(lookup("POP3_PASSWORD").unwrap_or_default()),
            tls,
            timeout: Duration::from_secs(parse_or(
                &lookup,
                "POP3_TIMEOUT_SECS",
                DEFAULT_TIMEOUT.as_secs(),
            )?),
            delete_after_fetch: parse_or(&lookup, "POP3_DELETE_AFTER_FETCH", false)?,
        }))
    }
}

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmtpSecurity {
    /// Plain TCP, no TLS at all.
    None,
    /// Plain connect, upgraded with STARTTLS.
    #[default]
    StartTls,
    /// TLS from the first byte (SMTPS).
    Tls,
}

impl FromStr for SmtpSecurity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "plain" => Ok(Self::None),
            "starttls" => Ok(Self::StartTls),
            "tls" | "ssl" | "smtps" => Ok(Self::Tls),
            other => Err(format!("unknown SMTP security mode '{other}'")),
        }
    }
}

/// SMTP relay settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    /// Empty username means no AUTH.
    pub username: String,
    pub password: SecretString,
    pub security: SmtpSecurity,
    pub timeout: Duration,
}

impl SmtpConfig {
    /// Read SMTP settings. Returns `Ok(None)` if `SMTP_HOST` is not set.
    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(host) = lookup("SMTP_HOST") else {
            return Ok(None);
        };

        let security = match lookup("SMTP_SECURITY") {
            Some(raw) => raw.parse().map_err(|message| ConfigError::InvalidValue {
                key: "SMTP_SECURITY".into(),
                message,
            })?,
            None => SmtpSecurity::default(),
        };
        let default_port = match security {
            SmtpSecurity::None => 25,
            SmtpSecurity::StartTls => 587,
            SmtpSecurity::Tls => 465,
        };

        Ok(Some(Self {
            host,
            port: parse_or(&lookup, "SMTP_PORT", default_port)?,
            username: lookup("SMTP_USERNAME").unwrap_or_default(),
            password: SecretString::from(lookup("SMTP_PASSWORD").unwrap_or_default()),
            security,
            timeout: Duration::from_secs(parse_or(
                &lookup,
                "SMTP_TIMEOUT_SECS",
                DEFAULT_TIMEOUT.as_secs(),
            )?),
        }))
    }
}

/// Full gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub pop3: Option<Pop3Config>,
    pub smtp: Option<SmtpConfig>,
    pub fetch_interval: Duration,
}

impl GatewayConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let interval_secs: u64 = parse_or(
            &lookup,
            "FETCH_INTERVAL_SECS",
            DEFAULT_FETCH_INTERVAL.as_secs(),
        )?;
        if interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "FETCH_INTERVAL_SECS".into(),
                message: "must be greater than zero".into(),
            });
        }

        Ok(Self {
            pop3: Pop3Config::from_lookup(&lookup)?,
            smtp: SmtpConfig::from_lookup(&lookup)?,
            fetch_interval: Duration::from_secs(interval_secs),
        })
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_disables_both_sides() {
        let config = GatewayConfig::from_lookup(lookup_from(&[])).unwrap();
        assert!(config.pop3.is_none());
        assert!(config.smtp.is_none());
        assert_eq!(config.fetch_interval, DEFAULT_FETCH_INTERVAL);
    }

    #[test]
    fn pop3_defaults_to_tls_on_995() {
        let config = GatewayConfig::from_lookup(lookup_from(&[
            ("POP3_HOST", "pop.example.com"),
            ("POP3_USERNAME", "alice"),
            ("POP3_PASSWORD", "hunter2"),
        ]))
        .unwrap();
        let pop3 = config.pop3.unwrap();
        assert_eq!(pop3.port, 995);
        assert!(pop3.tls.is_some());
        assert_eq!(pop3.timeout, DEFAULT_TIMEOUT);
        assert_eq!(pop3.password.expose_secret(), "hunter2");
        assert_eq!(pop3.address(), "pop.example.com:995");
        assert!(!pop3.delete_after_fetch);
    }

    #[test]
    fn pop3_plain_uses_110() {
        let pop3 = Pop3Config::from_lookup(lookup_from(&[
            ("POP3_HOST", "localhost"),
            ("POP3_TLS", "false"),
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(pop3.port, 110);
        assert!(pop3.tls.is_none());
    }

    #[test]
    fn invalid_port_is_rejected() {
        let err = Pop3Config::from_lookup(lookup_from(&[
            ("POP3_HOST", "localhost"),
            ("POP3_PORT", "pop"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "POP3_PORT"));
    }

    #[test]
    fn smtp_security_selects_default_port() {
        let smtp = SmtpConfig::from_lookup(lookup_from(&[
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_SECURITY", "tls"),
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(smtp.security, SmtpSecurity::Tls);
        assert_eq!(smtp.port, 465);
    }

    #[test]
    fn unknown_smtp_security_is_rejected() {
        let err = SmtpConfig::from_lookup(lookup_from(&[
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_SECURITY", "carrier-pigeon"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("SMTP_SECURITY"));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = GatewayConfig::from_lookup(lookup_from(&[("FETCH_INTERVAL_SECS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
