//! Agent commands: long-running serve loop, one-shot fetch, offline parse.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use shinhai_gas::{
    extract_bill_fields, scheduler, AccountId, BillingRecord, BillingSensor, HttpBillingSource,
    PollResult, Poller, SchedulerHandle, SensorSnapshot, SessionState,
};

use crate::config::AgentConfig;
use crate::error::AgentResult;

/// Poller wired to the configured HTTP endpoint.
pub fn build_poller(config: &AgentConfig) -> AgentResult<Poller> {
    let source = HttpBillingSource::new(config.endpoint.clone(), config.request_timeout())?;
    Ok(Poller::new(config.account.clone(), Arc::new(source)))
}

/// Run the scheduler until Ctrl-C, writing every snapshot to stdout.
pub async fn serve(config: &AgentConfig) -> AgentResult<()> {
    let poller = build_poller(config)?;
    let sensor = BillingSensor::new(&config.account);
    tracing::info!(
        "Polling {} via {} every {}s",
        sensor.name(),
        config.endpoint,
        config.scan_interval_secs
    );

    let handle = scheduler::spawn(Arc::new(Mutex::new(poller)), sensor, config.scheduler());
    let mut stdout = tokio::io::stdout();
    run_scheduler(handle, &mut stdout, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    })
    .await
}

/// Forward snapshots from a running scheduler to `out` as JSON lines until
/// `shutdown` resolves. SIGHUP resets session expiry.
pub async fn run_scheduler<W, F>(handle: SchedulerHandle, out: &mut W, shutdown: F) -> AgentResult<()>
where
    W: AsyncWrite + Unpin,
    F: Future<Output = ()>,
{
    let mut snapshots = handle.subscribe();
    let mut hangup = HangupListener::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    tracing::warn!("Scheduler exited, stopping");
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                write_snapshot(out, &snapshot).await?;
            }
            _ = hangup.recv() => {
                tracing::info!("SIGHUP received, resetting session expiry");
                handle.reset_expiration().await?;
            }
            _ = &mut shutdown => {
                tracing::info!("Shutdown requested");
                break;
            }
        }
    }

    handle.shutdown().await?;
    Ok(())
}

/// One forced poll, ignoring the scheduler.
pub async fn fetch_once(config: &AgentConfig) -> AgentResult<SensorSnapshot> {
    let mut poller = build_poller(config)?;
    let mut sensor = BillingSensor::new(&config.account);
    let record = poller.poll(true).await;
    sensor.apply(&record, poller.session_state());
    Ok(sensor.snapshot())
}

/// Run the extractor and sensor over a saved bill page.
pub fn parse_file(path: &Path, account: &AccountId) -> AgentResult<SensorSnapshot> {
    let html = std::fs::read_to_string(path)?;
    let fields = extract_bill_fields(&html);
    let result = if fields.is_empty() {
        PollResult::NotFound
    } else {
        PollResult::Success
    };

    let mut sensor = BillingSensor::new(account);
    sensor.apply(
        &BillingRecord::new(fields, result, Utc::now()),
        SessionState::Active,
    );
    Ok(sensor.snapshot())
}

/// Resolved settings plus derived names, for `info`.
pub fn info(config: &AgentConfig) -> serde_json::Value {
    serde_json::json!({
        "agent": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "sensor": BillingSensor::new(&config.account).name(),
        "config": config,
    })
}

async fn write_snapshot<W>(out: &mut W, snapshot: &SensorSnapshot) -> AgentResult<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_string(snapshot)?;
    line.push('\n');
    out.write_all(line.as_bytes()).await?;
    out.flush().await?;
    Ok(())
}

/// SIGHUP on unix; never fires elsewhere.
pub struct HangupListener {
    #[cfg(unix)]
    signal: Option<tokio::signal::unix::Signal>,
}

impl HangupListener {
    pub fn new() -> Self {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let signal = match signal(SignalKind::hangup()) {
                Ok(signal) => Some(signal),
                Err(e) => {
                    tracing::warn!("SIGHUP handler unavailable: {e}");
                    None
                }
            };
            Self { signal }
        }
        #[cfg(not(unix))]
        {
            Self {}
        }
    }

    /// Wait for the next hangup.
    pub async fn recv(&mut self) {
        if !self.wait().await {
            std::future::pending::<()>().await
        }
    }

    #[cfg(unix)]
    async fn wait(&mut self) -> bool {
        match self.signal.as_mut() {
            Some(signal) => signal.recv().await.is_some(),
            None => false,
        }
    }

    #[cfg(not(unix))]
    async fn wait(&mut self) -> bool {
        false
    }
}

impl Default for HangupListener {
    fn default() -> Self {
        Self::new()
    }
}
