//! Poll scheduling: the normal scan cadence plus the fast-recovery loop.
//!
//! One task per account drives its [`Poller`]. Normal ticks issue
//! `poll(false)` and leave the 24h decision to the throttle. Forced polls
//! (startup, operator refresh, recovery retries) go through a single
//! cancellable deadline in [`FastRecovery`], so a newer request replaces a
//! pending one instead of stacking timers.
//!
//! Each poll runs in its own spawned task and reports back over a channel;
//! while one is in flight no other poll is started.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::expiry::SessionState;
use crate::poller::Poller;
use crate::sensor::{BillingSensor, SensorSnapshot};
use crate::throttle::{PollKind, MIN_TIME_BETWEEN_FORCED_UPDATES};
use crate::types::{BillingRecord, GasError, GasResult};

/// Poller shared between the scheduler and its poll tasks.
pub type SharedPoller = Arc<Mutex<Poller>>;

/// How often the normal cadence asks the poller for an update.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(30 * 60);

const COMMAND_BUFFER: usize = 16;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Normal cadence tick.
    pub scan_interval: Duration,
    /// Delay between forced retries while the account stays expired.
    pub recovery_interval: Duration,
    /// Issue a forced poll as soon as the scheduler starts.
    pub force_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scan_interval: DEFAULT_SCAN_INTERVAL,
            recovery_interval: MIN_TIME_BETWEEN_FORCED_UPDATES,
            force_on_start: true,
        }
    }
}

/// Requests accepted by a running scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// Forced poll now, replacing any pending recovery retry.
    ForceRefresh,
    /// Clear the expired flag, then force a poll.
    ResetExpiration,
    Shutdown,
}

/// Result of one finished poll task.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub kind: PollKind,
    pub record: BillingRecord,
    pub session: SessionState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryDecision {
    /// Another forced poll is due at the given instant.
    Reschedule(Instant),
    /// Account is active again and nothing is pending; recovery stops.
    Recovered,
}

/// Single pending forced-poll deadline.
#[derive(Debug, Clone)]
pub struct FastRecovery {
    interval: Duration,
    deadline: Option<Instant>,
}

impl FastRecovery {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    /// Schedule a forced poll at `at`, replacing any pending one.
    pub fn arm(&mut self, at: Instant) {
        self.deadline = Some(at);
    }

    /// Drop the pending forced poll. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Decide what follows a forced poll that left the account in `session`.
    ///
    /// A deadline armed while that poll was running is newer than the poll
    /// and is kept as is.
    pub fn on_outcome(&mut self, session: SessionState, now: Instant) -> RecoveryDecision {
        match (self.deadline, session) {
            (Some(pending), _) => RecoveryDecision::Reschedule(pending),
            (None, SessionState::Expired) => {
                let next = now + self.interval;
                self.deadline = Some(next);
                RecoveryDecision::Reschedule(next)
            }
            (None, SessionState::Active) => RecoveryDecision::Recovered,
        }
    }
}

/// Control handle for a running scheduler.
pub struct SchedulerHandle {
    commands: mpsc::Sender<SchedulerCommand>,
    snapshots: watch::Receiver<SensorSnapshot>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub async fn force_refresh(&self) -> GasResult<()> {
        self.send(SchedulerCommand::ForceRefresh).await
    }

    pub async fn reset_expiration(&self) -> GasResult<()> {
        self.send(SchedulerCommand::ResetExpiration).await
    }

    /// Receiver notified after every completed poll.
    pub fn subscribe(&self) -> watch::Receiver<SensorSnapshot> {
        self.snapshots.clone()
    }

    /// Latest sensor snapshot.
    pub fn snapshot(&self) -> SensorSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Stop the scheduler and wait for it to exit. Any in-flight poll is
    /// aborted.
    pub async fn shutdown(self) -> GasResult<()> {
        // The loop may already be gone; joining is what matters.
        let _ = self.commands.send(SchedulerCommand::Shutdown).await;
        self.task.await.map_err(|_| GasError::SchedulerClosed)
    }

    async fn send(&self, command: SchedulerCommand) -> GasResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| GasError::SchedulerClosed)
    }
}

/// Start scheduling polls for `poller`, publishing through `sensor`.
pub fn spawn(poller: SharedPoller, sensor: BillingSensor, config: SchedulerConfig) -> SchedulerHandle {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (outcome_tx, outcome_rx) = mpsc::channel(1);
    let (snapshot_tx, snapshot_rx) = watch::channel(sensor.snapshot());

    let scheduler = Scheduler {
        poller,
        sensor,
        recovery: FastRecovery::new(config.recovery_interval),
        config,
        in_flight: None,
        pending_reset: false,
        outcomes: outcome_tx,
        snapshots: snapshot_tx,
    };
    let task = tokio::spawn(scheduler.run(command_rx, outcome_rx));

    SchedulerHandle {
        commands: command_tx,
        snapshots: snapshot_rx,
        task,
    }
}

struct Scheduler {
    poller: SharedPoller,
    sensor: BillingSensor,
    config: SchedulerConfig,
    recovery: FastRecovery,
    in_flight: Option<(PollKind, JoinHandle<()>)>,
    pending_reset: bool,
    outcomes: mpsc::Sender<PollOutcome>,
    snapshots: watch::Sender<SensorSnapshot>,
}

impl Scheduler {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SchedulerCommand>,
        mut outcomes: mpsc::Receiver<PollOutcome>,
    ) {
        tracing::info!(
            "Scheduler started for {}: scan={}s recovery={}s",
            self.sensor.name(),
            self.config.scan_interval.as_secs(),
            self.config.recovery_interval.as_secs()
        );

        let start = Instant::now();
        let mut ticker = tokio::time::interval_at(start + self.config.scan_interval, self.config.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        if self.config.force_on_start {
            self.recovery.arm(start);
        }

        loop {
            let idle = self.in_flight.is_none();
            let deadline = self.recovery.deadline();

            tokio::select! {
                command = commands.recv() => match command {
                    Some(SchedulerCommand::ForceRefresh) => {
                        tracing::info!("Forced refresh requested for {}", self.sensor.name());
                        self.recovery.arm(Instant::now());
                    }
                    Some(SchedulerCommand::ResetExpiration) => self.reset_expiration().await,
                    Some(SchedulerCommand::Shutdown) | None => break,
                },
                Some(outcome) = outcomes.recv() => self.handle_outcome(outcome).await,
                _ = ticker.tick(), if idle => self.dispatch(PollKind::Normal),
                _ = tokio::time::sleep_until(deadline.unwrap_or(start)), if idle && deadline.is_some() => {
                    self.run_once_then_maybe_reschedule();
                }
            }
        }

        if let Some((kind, task)) = self.in_flight.take() {
            tracing::debug!("Aborting in-flight {kind:?} poll for {}", self.sensor.name());
            task.abort();
        }
        tracing::info!("Scheduler stopped for {}", self.sensor.name());
    }

    /// Fire the pending forced poll. Whether it repeats is decided when the
    /// outcome arrives.
    fn run_once_then_maybe_reschedule(&mut self) {
        self.recovery.cancel();
        self.dispatch(PollKind::Forced);
    }

    fn dispatch(&mut self, kind: PollKind) {
        let poller = Arc::clone(&self.poller);
        let outcomes = self.outcomes.clone();
        let task = tokio::spawn(async move {
            let mut poller = poller.lock().await;
            let record = poller.poll(kind.is_forced()).await;
            let session = poller.session_state();
            drop(poller);
            let _ = outcomes
                .send(PollOutcome {
                    kind,
                    record,
                    session,
                })
                .await;
        });
        self.in_flight = Some((kind, task));
    }

    async fn handle_outcome(&mut self, outcome: PollOutcome) {
        self.in_flight = None;

        self.sensor.apply(&outcome.record, outcome.session);
        self.snapshots.send_replace(self.sensor.snapshot());

        if outcome.kind.is_forced() {
            let now = Instant::now();
            match self.recovery.on_outcome(outcome.session, now) {
                RecoveryDecision::Reschedule(at) => tracing::info!(
                    "{} is {:?}, next forced poll in {}s",
                    self.sensor.name(),
                    outcome.session,
                    at.saturating_duration_since(now).as_secs()
                ),
                RecoveryDecision::Recovered => {
                    tracing::info!("{} active, state refresh available", self.sensor.name())
                }
            }
        }

        if self.pending_reset {
            self.pending_reset = false;
            self.reset_expiration().await;
        }
    }

    async fn reset_expiration(&mut self) {
        if self.in_flight.is_some() {
            // Applied once the running poll reports back.
            self.pending_reset = true;
            return;
        }
        let was_expired = self.poller.lock().await.reset_expiration();
        if !was_expired {
            tracing::debug!("Reset requested for {} but it was not expired", self.sensor.name());
        }
        self.recovery.arm(Instant::now());
    }
}
