pub mod advance;
pub mod cleanup;
pub mod clock_sync;
pub mod connection;
pub mod round;
mod sse;
pub mod state_machine;
pub mod tally;
pub mod time_source;
pub mod transitions;
pub mod watchdog;

use std::{
    future::Future,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use time::OffsetDateTime;
use tokio::sync::{Notify, RwLock, watch};
use tokio::time::{Instant, timeout};
use tracing::{debug, warn};

use crate::{
    config::{AgentIdentity, AppConfig},
    dao::round_store::RoundStore,
    error::ServiceError,
    state::{
        cleanup::{CleanupClaim, CleanupGate, CleanupRefusal},
        clock_sync::CountdownReading,
        connection::ConnectionSample,
        round::RoundSnapshot,
        time_source::SharedTimeSource,
        watchdog::WatchdogState,
    },
};

pub use self::sse::SseHub;
pub use self::state_machine::{Plan, PlanError, PlanId, Snapshot};
use self::state_machine::{RoundEvent, RoundStateMachine};

pub type SharedState = Arc<AppState>;

const SSE_CAPACITY: usize = 64;

/// Central agent state: store handle, cached table view and the channels the coordination
/// tasks use to talk to each other.
pub struct AppState {
    config: AppConfig,
    identity: AgentIdentity,
    time: SharedTimeSource,
    round_store: RwLock<Option<Arc<dyn RoundStore>>>,
    degraded: watch::Sender<bool>,
    sse: SseHub,
    snapshot: watch::Sender<Option<Arc<RoundSnapshot>>>,
    connection: watch::Sender<ConnectionSample>,
    countdown: watch::Sender<CountdownReading>,
    watchdog: watch::Sender<WatchdogState>,
    refresh: Notify,
    network_change: Notify,
    device_online: AtomicBool,
    auto_advance_cancel: Notify,
    round: Mutex<RoundStateMachine>,
    cleanup: Mutex<CleanupGate>,
    transition_timeout: Option<Duration>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The agent starts in degraded mode until a store is installed.
    pub fn new(config: AppConfig, identity: AgentIdentity, time: SharedTimeSource) -> SharedState {
        let now = time.now();
        let (degraded_tx, _rx) = watch::channel(true);
        let (snapshot_tx, _rx) = watch::channel(None);
        let (connection_tx, _rx) = watch::channel(ConnectionSample::assumed(now));
        let (countdown_tx, _rx) = watch::channel(CountdownReading::default());
        let (watchdog_tx, _rx) = watch::channel(WatchdogState {
            last_fresh_at: now,
            is_stale: false,
            is_panic: false,
        });

        Arc::new(Self {
            cleanup: Mutex::new(CleanupGate::new(config.cleanup_min_spacing)),
            transition_timeout: Some(config.advance_timeout),
            config,
            identity,
            time,
            round_store: RwLock::new(None),
            degraded: degraded_tx,
            sse: SseHub::new(SSE_CAPACITY),
            snapshot: snapshot_tx,
            connection: connection_tx,
            countdown: countdown_tx,
            watchdog: watchdog_tx,
            refresh: Notify::new(),
            network_change: Notify::new(),
            device_online: AtomicBool::new(true),
            auto_advance_cancel: Notify::new(),
            round: Mutex::new(RoundStateMachine::new()),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn identity(&self) -> AgentIdentity {
        self.identity
    }

    /// Current local wall-clock time.
    pub fn now(&self) -> OffsetDateTime {
        self.time.now()
    }

    /// Obtain a handle to the current store, if one is installed.
    pub async fn round_store(&self) -> Option<Arc<dyn RoundStore>> {
        let guard = self.round_store.read().await;
        guard.as_ref().cloned()
    }

    /// Store handle, or [`ServiceError::Degraded`] while none is installed.
    pub async fn require_round_store(&self) -> Result<Arc<dyn RoundStore>, ServiceError> {
        self.round_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a store implementation and leave degraded mode.
    pub async fn install_round_store(&self, store: Arc<dyn RoundStore>) {
        {
            let mut guard = self.round_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_round_store(&self) {
        {
            let mut guard = self.round_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.round_store.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            let changed = *current != value;
            *current = value;
            changed
        });
    }

    /// Broadcast hub used for the UI event stream.
    pub fn sse(&self) -> &SseHub {
        &self.sse
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Option<Arc<RoundSnapshot>> {
        self.snapshot.borrow().clone()
    }

    pub fn snapshot_watcher(&self) -> watch::Receiver<Option<Arc<RoundSnapshot>>> {
        self.snapshot.subscribe()
    }

    /// Publish a fresh snapshot; every publication counts as fresh data for the watchdog.
    pub async fn publish_snapshot(&self, snapshot: Arc<RoundSnapshot>) {
        {
            let round = snapshot.round();
            self.round_machine_mut()
                .observe(round.map(|round| round.id), round.map(|round| round.phase));
        }
        self.snapshot.send_replace(Some(snapshot));
    }

    pub fn connection(&self) -> ConnectionSample {
        self.connection.borrow().clone()
    }

    pub fn connection_watcher(&self) -> watch::Receiver<ConnectionSample> {
        self.connection.subscribe()
    }

    pub fn publish_connection(&self, sample: ConnectionSample) {
        self.connection.send_replace(sample);
    }

    pub fn countdown(&self) -> CountdownReading {
        *self.countdown.borrow()
    }

    pub fn countdown_watcher(&self) -> watch::Receiver<CountdownReading> {
        self.countdown.subscribe()
    }

    /// Publish a countdown reading, returning whether it differs from the previous one.
    pub fn publish_countdown(&self, reading: CountdownReading) -> bool {
        self.countdown.send_if_modified(|current| {
            let changed = *current != reading;
            *current = reading;
            changed
        })
    }

    pub fn watchdog(&self) -> WatchdogState {
        *self.watchdog.borrow()
    }

    pub fn publish_watchdog(&self, state: WatchdogState) {
        self.watchdog.send_replace(state);
    }

    /// Ask the refresher task for a new snapshot; concurrent requests coalesce.
    pub fn request_refresh(&self) {
        self.refresh.notify_one();
    }

    pub fn refresh_signal(&self) -> &Notify {
        &self.refresh
    }

    /// Record an OS-level network change and wake the connection monitor.
    pub fn report_network_change(&self, online: bool) {
        self.device_online.store(online, Ordering::SeqCst);
        self.network_change.notify_one();
    }

    pub fn network_signal(&self) -> &Notify {
        &self.network_change
    }

    pub fn device_online(&self) -> bool {
        self.device_online.load(Ordering::SeqCst)
    }

    pub fn auto_advance_cancel(&self) -> &Notify {
        &self.auto_advance_cancel
    }

    /// Rate limit shared by periodic and manual cleanup runs.
    pub fn begin_cleanup(&self, now: Instant) -> Result<CleanupClaim<'_>, CleanupRefusal> {
        CleanupGate::claim(&self.cleanup, now)
    }

    /// Snapshot the local phase tracker.
    pub async fn round_machine(&self) -> Snapshot {
        self.round_machine_mut().snapshot()
    }

    // Never held across an await.
    fn round_machine_mut(&self) -> MutexGuard<'_, RoundStateMachine> {
        self.round.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Plan `event`, run `work` (the store request) under the transition timeout, then apply
    /// or abort the plan.
    ///
    /// A second call while one is in flight fails with [`PlanError::AlreadyPending`]. If the
    /// caller stops polling before `work` completes, the plan is aborted when dropped.
    pub async fn run_transition<F, Fut, T>(&self, event: RoundEvent, work: F) -> Result<T, ServiceError>
    where
        F: FnOnce(Plan) -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let plan = self.round_machine_mut().plan(event)?;
        let pending = PendingTransition {
            state: self,
            plan_id: plan.id,
            event,
            settled: false,
        };

        let work_future = work(plan);
        let outcome = match self.transition_timeout {
            Some(limit) => match timeout(limit, work_future).await {
                Ok(result) => result,
                Err(_) => Err(ServiceError::Timeout),
            },
            None => work_future.await,
        };

        match outcome {
            Ok(value) => {
                pending.apply();
                Ok(value)
            }
            Err(err) => {
                pending.abort("failed to abort transition after work error");
                Err(err)
            }
        }
    }
}

/// In-flight plan of [`AppState::run_transition`], aborted on drop unless settled.
struct PendingTransition<'a> {
    state: &'a AppState,
    plan_id: PlanId,
    event: RoundEvent,
    settled: bool,
}

impl PendingTransition<'_> {
    fn apply(mut self) {
        self.settled = true;
        let applied = self.state.round_machine_mut().apply(self.plan_id);
        if let Err(err) = applied {
            debug!(
                event = self.event.as_str(),
                plan_id = %self.plan_id,
                error = ?err,
                "round moved while the advance request was in flight"
            );
        }
    }

    fn abort(mut self, context: &'static str) {
        self.settled = true;
        self.release(context);
    }

    fn release(&self, context: &'static str) {
        let aborted = self.state.round_machine_mut().abort(self.plan_id);
        if let Err(err) = aborted {
            warn!(
                event = self.event.as_str(),
                plan_id = %self.plan_id,
                error = ?err,
                "{context}"
            );
        }
    }
}

impl Drop for PendingTransition<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!(
                event = self.event.as_str(),
                plan_id = %self.plan_id,
                "advance request dropped before completion; releasing plan"
            );
            self.release("failed to release dropped transition");
        }
    }
}
