//! Fetch scheduler — periodic POP3 drain into the message store.
//!
//! One background task per scheduler. Each tick opens a session, fetches
//! the whole mailbox, and quits before the next tick is awaited. Ticks hold
//! a fetch lock that can be shared with on-demand fetches, so at most one
//! connection to the mailbox is ever open. Shutdown is only observed
//! between ticks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::Pop3Config;
use crate::error::MailError;
use crate::pop3::{FetchReport, Pop3Session};
use crate::store::MessageStore;

/// Source of scheduler ticks.
#[async_trait]
pub trait Ticker: Send {
    /// Wait until the next tick is due.
    async fn tick(&mut self);
}

/// Ticker backed by `tokio::time::interval`. The first tick fires at once.
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

/// What happened during one tick.
#[derive(Debug)]
pub enum TickOutcome {
    /// No POP3 settings or no store; nothing was attempted.
    Disabled,
    /// Dial, greeting, or authentication failed.
    ConnectFailed(MailError),
    /// The mailbox was drained, possibly with skipped messages.
    Fetched(FetchReport),
    /// The batch failed as a whole.
    FetchFailed(MailError),
}

/// Run a single fetch cycle: connect, drain, quit.
pub async fn run_tick(config: &Pop3Config, store: &dyn MessageStore) -> TickOutcome {
    let server = config.address();
    let mut session = Pop3Session::new(config.clone());

    if let Err(e) = session.connect().await {
        error!(server = %server, error = %e, "POP3 connect failed");
        // Greeting or login was refused on a live socket; say goodbye.
        if !e.aborts_batch()
            && let Err(quit_err) = session.quit().await
        {
            debug!(server = %server, error = %quit_err, "POP3 QUIT after failed login");
        }
        return TickOutcome::ConnectFailed(e);
    }

    let outcome = match session.fetch_all(store).await {
        Ok(report) => {
            if report.skipped > 0 {
                warn!(
                    server = %server,
                    total = report.total,
                    saved = report.saved,
                    skipped = report.skipped,
                    "Fetched mailbox with skipped messages"
                );
            } else {
                info!(server = %server, saved = report.saved, "Fetched mailbox");
            }
            TickOutcome::Fetched(report)
        }
        Err(e) => {
            error!(server = %server, error = %e, "POP3 fetch failed");
            TickOutcome::FetchFailed(e)
        }
    };

    if let Err(e) = session.quit().await {
        warn!(server = %server, error = %e, "POP3 QUIT failed");
    }
    outcome
}

/// Periodically drains a POP3 mailbox into a store.
pub struct FetchScheduler {
    pop3: Option<Pop3Config>,
    store: Option<Arc<dyn MessageStore>>,
    ticker: Box<dyn Ticker>,
    fetch_lock: Arc<Mutex<()>>,
}

impl FetchScheduler {
    /// Scheduler ticking every `interval`. Passing `None` for either
    /// dependency puts it in passive mode.
    pub fn new(
        pop3: Option<Pop3Config>,
        store: Option<Arc<dyn MessageStore>>,
        interval: Duration,
    ) -> Self {
        Self::with_ticker(pop3, store, Box::new(IntervalTicker::new(interval)))
    }

    pub fn with_ticker(
        pop3: Option<Pop3Config>,
        store: Option<Arc<dyn MessageStore>>,
        ticker: Box<dyn Ticker>,
    ) -> Self {
        Self {
            pop3,
            store,
            ticker,
            fetch_lock: Arc::default(),
        }
    }

    /// Share the lock held around every tick. Anything else that opens a
    /// session on the same mailbox should hold it too.
    pub fn with_fetch_lock(mut self, fetch_lock: Arc<Mutex<()>>) -> Self {
        self.fetch_lock = fetch_lock;
        self
    }

    /// False in passive mode.
    pub fn is_enabled(&self) -> bool {
        self.pop3.is_some() && self.store.is_some()
    }

    /// Run one tick now, outside the timer.
    pub async fn run_once(&self) -> TickOutcome {
        match (&self.pop3, &self.store) {
            (Some(config), Some(store)) => {
                let _fetching = self.fetch_lock.lock().await;
                run_tick(config, store.as_ref()).await
            }
            _ => TickOutcome::Disabled,
        }
    }

    /// Spawn the background loop. In passive mode nothing is spawned.
    ///
    /// Dropping the returned handle stops the loop at the next tick
    /// boundary, same as [`SchedulerHandle::shutdown`] without the wait.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let (Some(config), Some(store)) = (self.pop3, self.store) else {
            info!("Mail fetch disabled — scheduler is passive");
            return SchedulerHandle {
                shutdown: shutdown_tx,
                task: None,
            };
        };
        let mut ticker = self.ticker;
        let fetch_lock = self.fetch_lock;

        let task = tokio::spawn(async move {
            info!(server = %config.address(), "Fetch scheduler started");
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        info!("Fetch scheduler shutting down");
                        return;
                    }
                    _ = ticker.tick() => {}
                }

                debug!("Fetch tick");
                let _fetching = fetch_lock.lock().await;
                run_tick(&config, store.as_ref()).await;
            }
        });

        SchedulerHandle {
            shutdown: shutdown_tx,
            task: Some(task),
        }
    }
}

/// Handle to a running scheduler loop.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Whether a background loop was spawned and is still alive.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Signal the loop and wait for it to exit. A tick in progress runs to
    /// completion first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task
            && let Err(e) = task.await
        {
            error!("Fetch scheduler task failed: {e}");
        }
    }
}
