//! Feed client
//!
//! Composition root: one configuration, one consumer callback, one status
//! channel. `start()` spawns a single session task that owns the connection
//! manager, heartbeat prober, dispatcher and transport; every transition
//! happens inside that task, one event at a time. `stop()` is synchronous:
//! it commits `Closed(Stopped)`, silences the callback and signals the task
//! to cancel whatever timer or handshake it is waiting on.

use crate::backoff::BackoffPolicy;
use crate::core::PriceBatch;
use crate::dispatch::{Dispatch, MessageDispatcher, PriceCallback};
use crate::infrastructure::config::FeedConfig;
use crate::infrastructure::metrics::FeedMetrics;
use crate::ws::{
    Action, CloseReason, ConnectionManager, ConnectionState, Connector, Failure,
    HeartbeatProber, ProbeTick, Transport, WsConnector, PROBE_FRAME,
};
use crate::{FeedError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tracing::Instrument;
use uuid::Uuid;

/// Upper bound for a graceful transport close
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Read-only status snapshot for the UI layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedStatus {
    /// Lifecycle state
    pub state: ConnectionState,
    /// Last measured probe round trip while open
    pub latency_ms: Option<u64>,
    /// Retries used since the last successful open
    pub retry_attempt: u32,
}

impl FeedStatus {
    fn idle() -> Self {
        Self {
            state: ConnectionState::Idle,
            latency_ms: None,
            retry_attempt: 0,
        }
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Waiting out a backoff, or re-handshaking after a failure
    #[inline]
    pub fn is_reconnecting(&self) -> bool {
        match self.state {
            ConnectionState::Reconnecting => true,
            ConnectionState::Connecting => self.retry_attempt > 0,
            _ => false,
        }
    }

    /// Feed given up after running out of retries
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.state == ConnectionState::Closed(CloseReason::RetriesExhausted)
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.state == ConnectionState::Closed(CloseReason::Stopped)
    }
}

/// Subscription to status changes
#[derive(Debug, Clone)]
pub struct StatusHandle {
    rx: watch::Receiver<FeedStatus>,
}

impl StatusHandle {
    /// Latest committed status
    pub fn snapshot(&self) -> FeedStatus {
        *self.rx.borrow()
    }

    /// Wait for the next change; None once the client is gone
    pub async fn changed(&mut self) -> Option<FeedStatus> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    /// Wait until `predicate` holds; None once the client is gone
    pub async fn wait_for(&mut self, predicate: impl FnMut(&FeedStatus) -> bool) -> Option<FeedStatus> {
        self.rx.wait_for(predicate).await.ok().map(|status| *status)
    }
}

/// Running session task and its stop signal
struct Session {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Self-healing price feed client
pub struct FeedClient<C: Connector = WsConnector> {
    config: Arc<FeedConfig>,
    connector: Arc<C>,
    on_message: Arc<Mutex<PriceCallback>>,
    status_tx: Arc<watch::Sender<FeedStatus>>,
    /// Set once by `stop()`, never cleared
    halted: Arc<AtomicBool>,
    metrics: Arc<FeedMetrics>,
    session: Mutex<Option<Session>>,
}

impl FeedClient<WsConnector> {
    /// Create client over tokio-tungstenite
    ///
    /// # Errors
    /// Returns error if the configuration fails validation.
    pub fn new<F>(config: FeedConfig, on_message: F) -> Result<Self>
    where
        F: FnMut(PriceBatch) + Send + 'static,
    {
        Self::with_connector(config, WsConnector, on_message)
    }
}

impl<C: Connector> FeedClient<C> {
    /// Create client over a custom transport
    pub fn with_connector<F>(config: FeedConfig, connector: C, on_message: F) -> Result<Self>
    where
        F: FnMut(PriceBatch) + Send + 'static,
    {
        config.validate()?;
        let (status_tx, _) = watch::channel(FeedStatus::idle());
        let callback: PriceCallback = Box::new(on_message);

        Ok(Self {
            config: Arc::new(config),
            connector: Arc::new(connector),
            on_message: Arc::new(Mutex::new(callback)),
            status_tx: Arc::new(status_tx),
            halted: Arc::new(AtomicBool::new(false)),
            metrics: Arc::new(FeedMetrics::new()),
            session: Mutex::new(None),
        })
    }

    /// Configuration the client was built with
    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Latest committed status
    pub fn status(&self) -> FeedStatus {
        *self.status_tx.borrow()
    }

    /// Handle for observing status changes
    pub fn subscribe(&self) -> StatusHandle {
        StatusHandle {
            rx: self.status_tx.subscribe(),
        }
    }

    /// Get metrics collector reference
    pub fn metrics(&self) -> Arc<FeedMetrics> {
        self.metrics.clone()
    }

    /// Start connecting; returns immediately
    ///
    /// No-op while a session is running and after `stop()`. After retry
    /// exhaustion it begins a fresh session with a full retry budget.
    /// # Errors
    /// Returns error if called outside a tokio runtime.
    pub fn start(&self) -> Result<()> {
        if self.halted.load(Ordering::SeqCst) {
            tracing::debug!("start ignored, client stopped");
            return Ok(());
        }

        let mut session = self.session.lock();
        let current = self.status().state;
        if !matches!(
            current,
            ConnectionState::Idle | ConnectionState::Closed(CloseReason::RetriesExhausted)
        ) {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| FeedError::Runtime(e.to_string()))?;

        let backoff = BackoffPolicy::new(self.config.initial_backoff(), self.config.max_backoff())
            .with_jitter(self.config.jitter);
        let mut manager = ConnectionManager::new(backoff, self.config.max_retries);
        let Some(first) = manager.start() else {
            return Ok(());
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = SessionTask {
            config: self.config.clone(),
            connector: self.connector.clone(),
            manager,
            prober: HeartbeatProber::new(self.config.ping_interval()),
            dispatcher: MessageDispatcher::new(
                self.on_message.clone(),
                self.halted.clone(),
                self.metrics.clone(),
            ),
            status: self.status_tx.clone(),
            metrics: self.metrics.clone(),
            stop_rx,
        };
        task.publish();

        let span = tracing::info_span!("feed", url = %self.config.url);
        let handle = runtime.spawn(task.run(first).instrument(span));
        *session = Some(Session { stop_tx, handle });

        tracing::info!(url = %self.config.url, "feed client started");
        Ok(())
    }

    /// Stop for good; returns immediately
    ///
    /// Idempotent and safe before `start()`. No consumer callback starts
    /// after it returns; one already running on the session task when
    /// `stop()` is called from another thread finishes normally.
    pub fn stop(&self) {
        if self.halted.swap(true, Ordering::SeqCst) {
            return;
        }

        self.status_tx.send_if_modified(|status| {
            if status.state.is_closed() {
                return false;
            }
            *status = FeedStatus {
                state: ConnectionState::Closed(CloseReason::Stopped),
                latency_ms: None,
                retry_attempt: 0,
            };
            true
        });

        if let Some(session) = self.session.lock().take() {
            let _ = session.stop_tx.send(());
            tracing::info!(finished = session.handle.is_finished(), "feed client stopped");
        }
    }
}

impl<C: Connector> Drop for FeedClient<C> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State owned by the session task
struct SessionTask<C: Connector> {
    config: Arc<FeedConfig>,
    connector: Arc<C>,
    manager: ConnectionManager,
    prober: HeartbeatProber,
    dispatcher: MessageDispatcher,
    status: Arc<watch::Sender<FeedStatus>>,
    metrics: Arc<FeedMetrics>,
    stop_rx: oneshot::Receiver<()>,
}

impl<C: Connector> SessionTask<C> {
    /// Drive the state machine until halt or stop
    async fn run(mut self, first: Action) {
        let mut next = Some(first);
        while let Some(action) = next {
            next = match action {
                Action::Connect => {
                    let span = tracing::info_span!("session", id = %Uuid::new_v4());
                    self.connect().instrument(span).await
                }
                Action::Retry(delay) => self.back_off(delay).await,
                Action::Halt(reason) => {
                    self.publish();
                    tracing::error!(
                        ?reason,
                        max_retries = self.config.max_retries,
                        "price feed unavailable"
                    );
                    None
                }
            };
        }
        tracing::debug!(state = self.manager.state().as_str(), "session task finished");
    }

    /// One handshake attempt, then the open session if it succeeds
    async fn connect(&mut self) -> Option<Action> {
        self.publish();
        tracing::info!(attempt = self.manager.retry().attempt, "connecting");

        let handshake = timeout(
            self.config.connect_timeout(),
            self.connector.connect(&self.config.url),
        );
        let outcome = tokio::select! {
            biased;
            _ = &mut self.stop_rx => return self.stopped(),
            outcome = handshake => outcome,
        };

        let failure = match outcome {
            Ok(Ok(transport)) => {
                self.manager.on_open();
                self.prober.start(Instant::now());
                self.publish();
                tracing::info!("feed connected");
                return self.run_open(transport).await;
            }
            Ok(Err(e)) => Failure::Handshake(e.to_string()),
            Err(_) => Failure::Handshake("connect timed out".to_string()),
        };
        self.fail(failure)
    }

    /// Pump frames and probes until the connection fails or stop arrives
    async fn run_open(&mut self, mut transport: C::Transport) -> Option<Action> {
        let failure = loop {
            let probe_deadline = self.prober.next_deadline();
            tokio::select! {
                biased;
                _ = &mut self.stop_rx => {
                    self.prober.stop();
                    let _ = timeout(CLOSE_TIMEOUT, transport.close()).await;
                    return self.stopped();
                }
                frame = transport.recv() => match frame {
                    Ok(Some(raw)) => {
                        let outcome = self.dispatcher.on_frame(&raw, &mut self.prober, Instant::now());
                        if let Dispatch::ProbeResponse(Some(_)) = outcome {
                            self.publish();
                        }
                    }
                    Ok(None) => break Failure::Closed,
                    Err(e) => break Failure::Transport(e.to_string()),
                },
                _ = wait_until(probe_deadline) => match self.prober.on_tick(Instant::now()) {
                    ProbeTick::Send => {
                        self.metrics.record_probe();
                        if let Err(e) = transport.send_text(PROBE_FRAME).await {
                            break Failure::Transport(e.to_string());
                        }
                    }
                    ProbeTick::LivenessFailure => break Failure::LivenessTimeout,
                },
            }
        };

        // Nothing from this transport is dispatched past this point
        self.prober.stop();
        let _ = timeout(CLOSE_TIMEOUT, transport.close()).await;
        drop(transport);

        tracing::info!(%failure, "feed disconnected");
        self.fail(failure)
    }

    /// Wait out a backoff delay
    async fn back_off(&mut self, delay: Duration) -> Option<Action> {
        self.publish();
        tokio::select! {
            biased;
            _ = &mut self.stop_rx => self.stopped(),
            _ = sleep(delay) => self.manager.on_retry_timer(),
        }
    }

    fn fail(&mut self, failure: Failure) -> Option<Action> {
        let action = self.manager.on_failure(&failure);
        if let Some(Action::Retry(delay)) = action {
            self.metrics.record_reconnect();
            tracing::warn!(
                %failure,
                attempt = self.manager.retry().attempt,
                delay_ms = delay.as_millis() as u64,
                "feed connection failed, retrying"
            );
        } else {
            tracing::warn!(%failure, "feed connection failed");
        }
        action
    }

    /// Stop observed; `FeedClient::stop` already committed the status
    fn stopped(&mut self) -> Option<Action> {
        self.manager.stop();
        self.prober.stop();
        tracing::debug!("session stopped");
        None
    }

    /// Commit the current state to the status channel
    ///
    /// A committed `Closed(Stopped)` is never overwritten.
    fn publish(&self) {
        let state = self.manager.state();
        let next = FeedStatus {
            state,
            latency_ms: if state == ConnectionState::Open {
                self.prober.latency_ms()
            } else {
                None
            },
            retry_attempt: self.manager.retry().attempt,
        };

        self.status.send_if_modified(|status| {
            if status.is_stopped() || *status == next {
                return false;
            }
            *status = next;
            true
        });
    }
}

/// Sleep until `deadline`, or forever when there is none
async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
