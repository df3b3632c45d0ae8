use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use mail_gateway::MailGateway;
use mail_gateway::config::GatewayConfig;
use mail_gateway::store::{MemoryStore, MessageStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Keep the guard alive so buffered file logs are flushed on exit.
    let _log_guard = init_tracing();

    let config = GatewayConfig::from_env().context("Failed to load gateway configuration")?;

    eprintln!("📬 Mail Gateway v{}", env!("CARGO_PKG_VERSION"));
    match &config.pop3 {
        Some(pop3) => eprintln!(
            "   POP3: {} (TLS: {}, every {}s)",
            pop3.address(),
            if pop3.tls.is_some() { "on" } else { "off" },
            config.fetch_interval.as_secs()
        ),
        None => eprintln!("   POP3: disabled"),
    }
    match &config.smtp {
        Some(smtp) => eprintln!("   SMTP: {}:{} ({:?})", smtp.host, smtp.port, smtp.security),
        None => eprintln!("   SMTP: disabled"),
    }

    let store: Arc<dyn MessageStore> = Arc::new(MemoryStore::new());
    let gateway = MailGateway::new(&config, Some(store));
    let handle = gateway.scheduler(config.fetch_interval).start();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown requested");
    handle.shutdown().await;

    Ok(())
}

/// Console logging filtered by `RUST_LOG`, plus a daily-rolling file when
/// `MAIL_GATEWAY_LOG_DIR` is set.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = tracing_subscriber::fmt::layer().with_target(false);

    let (file, guard) = match std::env::var("MAIL_GATEWAY_LOG_DIR") {
        Ok(dir) if !dir.is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "mail-gateway.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();
    guard
}
