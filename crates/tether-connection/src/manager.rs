use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tether_client::{
    ClientError, ClientEvent, ClientHandle, CloseDisposition, CloseReason, Connection,
    ConnectionUpdate, MessagingClient, RawMessage, SharedHandle,
};
use tether_core::Credentials;
use tether_session::{SessionError, SessionStore};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::error::{ConnectionError, Result};
use crate::policy::ReconnectPolicy;
use crate::state::ConnectionState;

/// How the connection session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The network closed the session for good (logout, ban).
    Closed(CloseReason),
    /// The reconnect attempt cap was reached.
    ReconnectExhausted { attempts: u32 },
    /// [`ConnectionManager::shutdown`] was called.
    Shutdown,
}

/// Callbacks into the layer above the connection.
#[async_trait]
pub trait LifecycleListener: Send + Sync {
    /// A connection reached `Open`. Runs on its own task.
    async fn on_open(&self, handle: Arc<dyn ClientHandle>);

    /// The session ended; no further connections will be made.
    async fn on_terminal(&self, _end: &SessionEnd) {}
}

/// Supervises the single live connection.
///
/// Cheap to clone; all clones drive the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    client: Arc<dyn MessagingClient>,
    store: Arc<SessionStore>,
    policy: ReconnectPolicy,
    /// Latest credentials, used for every (re)connect.
    creds: Mutex<Option<Credentials>>,
    state: watch::Sender<ConnectionState>,
    end: watch::Sender<Option<SessionEnd>>,
    /// Bumped whenever a connection is superseded; stale events compare unequal.
    epoch: AtomicU64,
    /// Consecutive reconnect attempts since the last `Open`.
    attempts: AtomicU32,
    /// Set while a reconnect is scheduled or a connect call is in flight.
    reconnect_pending: AtomicBool,
    handle: SharedHandle,
    inbound: mpsc::Sender<RawMessage>,
    listener: Option<Arc<dyn LifecycleListener>>,
}

impl ConnectionManager {
    pub fn new(
        client: Arc<dyn MessagingClient>,
        store: Arc<SessionStore>,
        policy: ReconnectPolicy,
        inbound: mpsc::Sender<RawMessage>,
    ) -> Self {
        Self::with_handle(client, store, policy, inbound, SharedHandle::new(), None)
    }

    /// Full constructor: share an existing handle slot and register a listener.
    pub fn with_handle(
        client: Arc<dyn MessagingClient>,
        store: Arc<SessionStore>,
        policy: ReconnectPolicy,
        inbound: mpsc::Sender<RawMessage>,
        handle: SharedHandle,
        listener: Option<Arc<dyn LifecycleListener>>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        let (end, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                client,
                store,
                policy,
                creds: Mutex::new(None),
                state,
                end,
                epoch: AtomicU64::new(0),
                attempts: AtomicU32::new(0),
                reconnect_pending: AtomicBool::new(false),
                handle,
                inbound,
                listener,
            }),
        }
    }

    /// Begin the first connection attempt with bootstrapped credentials.
    pub async fn start(&self, creds: Credentials) -> Result<()> {
        let inner = &self.inner;
        if inner.ended() {
            return Err(ConnectionError::Ended);
        }
        if !inner.transition(ConnectionState::Connecting) {
            return Err(ConnectionError::AlreadyStarted {
                state: self.state(),
            });
        }
        *inner.creds.lock().await = Some(creds);
        let epoch = inner.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        inner.reconnect_pending.store(true, Ordering::Release);
        inner.spawn_attempt(epoch, Duration::ZERO);
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Consecutive reconnect attempts since the connection was last open.
    pub fn attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::Acquire)
    }

    /// Slot holding the handle of the live connection.
    pub fn shared_handle(&self) -> SharedHandle {
        self.inner.handle.clone()
    }

    /// Ask for a reconnect. Returns `false` when one is already pending or
    /// the session has ended.
    pub async fn request_reconnect(&self, reason: CloseReason) -> bool {
        self.inner.schedule_reconnect(reason).await
    }

    /// How the session ended, if it has.
    pub fn ended(&self) -> Option<SessionEnd> {
        self.inner.end.borrow().clone()
    }

    /// Resolve once the session has ended.
    pub async fn wait_terminal(&self) -> SessionEnd {
        let mut rx = self.inner.end.subscribe();
        let end = match rx.wait_for(Option::is_some).await {
            Ok(end) => end.clone().unwrap_or(SessionEnd::Shutdown),
            Err(_) => SessionEnd::Shutdown,
        };
        end
    }

    /// Stop supervising: cancel pending reconnects and close the live connection.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        inner.epoch.fetch_add(1, Ordering::AcqRel);
        if matches!(
            self.state(),
            ConnectionState::Connecting | ConnectionState::Open
        ) {
            inner.transition(ConnectionState::ClosingTerminal);
        }
        if let Some(handle) = inner.handle.take() {
            handle.close().await;
        }
        inner.finish(SessionEnd::Shutdown).await;
    }
}

impl Inner {
    fn is_stale(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::Acquire) != epoch
    }

    fn ended(&self) -> bool {
        self.end.borrow().is_some()
    }

    /// Apply `next` if the lifecycle graph allows it.
    fn transition(&self, next: ConnectionState) -> bool {
        let mut from = None;
        let changed = self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                from = Some(*current);
                *current = next;
                true
            } else {
                false
            }
        });
        match from {
            Some(from) => debug!(%from, to = %next, "connection state"),
            None => debug!(current = %*self.state.borrow(), to = %next, "transition rejected"),
        }
        changed
    }

    async fn attempt(self: Arc<Self>, epoch: u64) {
        if self.is_stale(epoch) {
            return;
        }
        let Some(creds) = self.creds.lock().await.clone() else {
            error!("connect attempted without credentials");
            return;
        };

        info!(
            client = self.client.name(),
            attempt = self.attempts.load(Ordering::Acquire),
            "connecting"
        );
        let timeout = self.policy.connect_timeout;
        let result = match tokio::time::timeout(timeout, self.client.connect(&creds)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout {
                ms: timeout.as_millis() as u64,
            }),
        };
        self.reconnect_pending.store(false, Ordering::Release);

        match result {
            Ok(conn) => {
                if self.is_stale(epoch) {
                    debug!("connection superseded while dialing, closing it");
                    conn.handle.close().await;
                    return;
                }
                self.pump(epoch, conn).await;
            }
            Err(e) => {
                warn!(error = %e, "connect failed");
                self.on_close(epoch, e.close_reason()).await;
            }
        }
    }

    /// Drain one connection's event stream until it closes or is superseded.
    async fn pump(self: &Arc<Self>, epoch: u64, conn: Connection) {
        let Connection { handle, mut events } = conn;

        while let Some(event) = events.recv().await {
            if self.is_stale(epoch) {
                debug!("dropping events from superseded connection");
                handle.close().await;
                return;
            }
            match event {
                ClientEvent::ConnectionUpdate(ConnectionUpdate::Connecting) => {
                    debug!("network handshake in progress");
                }
                ClientEvent::ConnectionUpdate(ConnectionUpdate::Open) => {
                    self.on_open(&handle);
                }
                ClientEvent::ConnectionUpdate(ConnectionUpdate::Closed(reason)) => {
                    self.on_close(epoch, reason).await;
                    return;
                }
                ClientEvent::CredentialsUpdate(creds) => {
                    self.on_credentials(creds).await;
                }
                ClientEvent::MessagesUpsert(batch) => {
                    debug!(count = batch.len(), "inbound batch");
                    for msg in batch {
                        if self.inbound.send(msg).await.is_err() {
                            warn!("inbound consumer gone, dropping message");
                        }
                    }
                }
            }
        }

        // Stream ended without a close event.
        self.on_close(epoch, CloseReason::NetworkLost).await;
    }

    fn on_open(self: &Arc<Self>, handle: &Arc<dyn ClientHandle>) {
        if !self.transition(ConnectionState::Open) {
            return;
        }
        self.attempts.store(0, Ordering::Release);
        self.reconnect_pending.store(false, Ordering::Release);
        self.handle.set(Arc::clone(handle));
        info!("connection open");

        if let Some(listener) = &self.listener {
            let listener = Arc::clone(listener);
            let handle = Arc::clone(handle);
            tokio::spawn(async move { listener.on_open(handle).await });
        }
    }

    /// Persist rotated credentials. A blob the store rejects is not adopted.
    async fn on_credentials(&self, creds: Credentials) {
        match self.store.save(&creds).await {
            Ok(()) => debug!(registered = creds.is_registered(), "credentials persisted"),
            Err(SessionError::Integrity(e)) => {
                warn!(error = %e, "rotated credentials rejected, keeping the previous set");
                return;
            }
            Err(e) => error!(error = %e, "failed to persist rotated credentials"),
        }
        *self.creds.lock().await = Some(creds);
    }

    async fn on_close(self: &Arc<Self>, epoch: u64, reason: CloseReason) {
        if self.is_stale(epoch) {
            debug!(%reason, "close from superseded connection ignored");
            return;
        }
        self.handle.take();

        match reason.disposition() {
            CloseDisposition::Terminal => {
                warn!(%reason, "connection closed permanently");
                self.terminate(SessionEnd::Closed(reason)).await;
            }
            CloseDisposition::Retryable => {
                info!(%reason, "connection closed, will reconnect");
                self.schedule_reconnect(reason).await;
            }
        }
    }

    /// Arm the reconnect timer unless one is already pending.
    async fn schedule_reconnect(self: &Arc<Self>, reason: CloseReason) -> bool {
        if self.ended() {
            return false;
        }
        if self.reconnect_pending.swap(true, Ordering::AcqRel) {
            debug!(%reason, "reconnect already pending, request ignored");
            return false;
        }

        let attempt = self.attempts.load(Ordering::Acquire) + 1;
        if !self.policy.allows(attempt) {
            let attempts = attempt - 1;
            error!(attempts, "reconnect attempts exhausted");
            self.terminate(SessionEnd::ReconnectExhausted { attempts }).await;
            return false;
        }

        if !self.transition(ConnectionState::ClosingRetryable) {
            // Lost a race with shutdown or a terminal close.
            self.reconnect_pending.store(false, Ordering::Release);
            return false;
        }
        self.attempts.store(attempt, Ordering::Release);

        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(old) = self.handle.take() {
            old.close().await;
        }

        let delay = if reason.reconnects_immediately() {
            Duration::ZERO
        } else {
            self.policy.jittered_delay_for(attempt)
        };
        info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            %reason,
            "reconnect scheduled"
        );

        self.spawn_attempt(epoch, delay);
        true
    }

    /// Run a connect attempt for `epoch` after `delay` on its own task.
    fn spawn_attempt(self: &Arc<Self>, epoch: u64, delay: Duration) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if inner.is_stale(epoch) {
                return;
            }
            let dialing = *inner.state.borrow() == ConnectionState::Connecting;
            if dialing || inner.transition(ConnectionState::Connecting) {
                inner.attempt(epoch).await;
            }
        });
    }

    /// End the session: no further connects, credentials dropped on logout.
    async fn terminate(&self, end: SessionEnd) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.transition(ConnectionState::ClosingTerminal);
        if let Some(handle) = self.handle.take() {
            handle.close().await;
        }
        if let SessionEnd::Closed(reason) = &end {
            if reason.is_terminal() {
                if let Err(e) = self.store.invalidate().await {
                    error!(error = %e, "failed to invalidate credentials");
                }
            }
        }
        self.finish(end).await;
    }

    /// Record the first terminal outcome and notify the listener once.
    async fn finish(&self, end: SessionEnd) {
        let recorded = self.end.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(end.clone());
                true
            } else {
                false
            }
        });
        if !recorded {
            return;
        }
        info!(?end, "connection session ended");
        if let Some(listener) = &self.listener {
            listener.on_terminal(&end).await;
        }
    }
}
