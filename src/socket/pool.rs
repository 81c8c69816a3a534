use crate::base::neterror::NetError;
use crate::config::ConnectionSettings;
use crate::http::connection::HttpConnection;
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::http::retry::RetryReason;
use crate::socket::connectjob::ConnectJob;
use crate::socket::key::ConnectionKey;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// What a queued request receives when it reaches the front.
pub(crate) enum Handoff {
    /// A drained connection ready for reuse.
    Connection(HttpConnection),
    /// Capacity freed by a disposed connection; the waiter dials with it.
    Slot(SlotGuard),
}

/// One unit of a pool's connection budget.
///
/// Every live connection holds exactly one. Dropping it returns the
/// capacity, passing it straight to the oldest waiter if there is one.
#[derive(Debug)]
pub struct SlotGuard {
    pool: Weak<PoolShared>,
    armed: bool,
}

impl SlotGuard {
    fn new(pool: &Arc<PoolShared>) -> Self {
        Self { pool: Arc::downgrade(pool), armed: true }
    }

    /// A slot that belongs to no pool. Connections built on it close
    /// instead of being cached when their response completes.
    pub fn detached() -> Self {
        Self { pool: Weak::new(), armed: false }
    }

    pub(crate) fn pool(&self) -> Option<Arc<PoolShared>> {
        self.pool.upgrade()
    }

    /// Forgets the slot without touching the counter.
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(pool) = self.pool.upgrade() {
            pool.release_slot();
        }
    }
}

struct CachedConnection {
    conn: HttpConnection,
    idle_since: Instant,
}

impl CachedConnection {
    fn is_usable(&mut self, now: Instant, settings: &ConnectionSettings) -> bool {
        if now.duration_since(self.idle_since) >= settings.pooled_connection_idle_timeout {
            tracing::trace!(conn = self.conn.id(), "idle timeout elapsed");
            return false;
        }
        if self.conn.is_expired(settings.pooled_connection_lifetime) {
            tracing::trace!(conn = self.conn.id(), "lifetime elapsed");
            return false;
        }
        match self.conn.probe() {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(conn = self.conn.id(), error = %e, "idle connection unusable");
                false
            }
        }
    }
}

#[derive(Default)]
struct PoolState {
    /// Most recently returned last.
    idle: Vec<CachedConnection>,
    waiters: VecDeque<oneshot::Sender<Handoff>>,
    associated: usize,
    disposed: bool,
}

pub(crate) struct PoolShared {
    key: ConnectionKey,
    settings: Arc<ConnectionSettings>,
    /// `max_connections_per_server`, at least 1.
    max_connections: usize,
    state: Mutex<PoolState>,
    next_id: AtomicU64,
}

enum Acquired {
    Reuse(HttpConnection),
    Dial(SlotGuard),
}

impl PoolShared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn acquire(self: &Arc<Self>, token: &CancellationToken) -> Result<Acquired, NetError> {
        let now = Instant::now();
        let mut stale = Vec::new();

        let waiter = {
            let mut state = self.lock();
            if state.disposed {
                return Err(NetError::Disposed);
            }

            let mut found = None;
            while let Some(mut cached) = state.idle.pop() {
                if cached.is_usable(now, &self.settings) {
                    found = Some(cached.conn);
                    break;
                }
                stale.push(cached);
            }

            if let Some(conn) = found {
                tracing::debug!(key = %self.key, conn = conn.id(), "reusing idle connection");
                Ok(Acquired::Reuse(conn))
            } else if state.associated < self.max_connections {
                state.associated += 1;
                Ok(Acquired::Dial(SlotGuard::new(self)))
            } else {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                tracing::debug!(key = %self.key, queued = state.waiters.len(), "pool saturated; waiting");
                Err(rx)
            }
        };

        // Stale connections release their slots, which needs the lock.
        drop(stale);

        let rx = match waiter {
            Ok(acquired) => return Ok(acquired),
            Err(rx) => rx,
        };

        let handoff = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(NetError::Cancelled),
            handoff = rx => handoff,
        };

        match handoff {
            Ok(Handoff::Connection(conn)) => Ok(Acquired::Reuse(conn)),
            Ok(Handoff::Slot(slot)) => Ok(Acquired::Dial(slot)),
            Err(_) => Err(NetError::Disposed),
        }
    }

    async fn dial(
        self: &Arc<Self>,
        slot: SlotGuard,
        token: &CancellationToken,
    ) -> Result<HttpConnection, NetError> {
        let job = ConnectJob::new(&self.key, &self.settings);
        let socket = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(NetError::Cancelled),
            socket = job.connect() => socket?,
        };
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(HttpConnection::new(id, socket, self.key.kind, &self.settings, slot))
    }

    /// Passes a freed slot to the oldest live waiter, or gives it back.
    fn release_slot(self: &Arc<Self>) {
        let mut state = self.lock();
        if !state.disposed {
            while let Some(waiter) = state.waiters.pop_front() {
                if waiter.is_closed() {
                    continue;
                }
                match waiter.send(Handoff::Slot(SlotGuard::new(self))) {
                    Ok(()) => {
                        tracing::trace!(key = %self.key, "slot handed to waiter");
                        return;
                    }
                    Err(Handoff::Slot(mut slot)) => slot.disarm(),
                    Err(Handoff::Connection(conn)) => {
                        state.idle.push(CachedConnection { conn, idle_since: Instant::now() })
                    }
                }
            }
        }
        state.associated = state.associated.saturating_sub(1);
    }

    pub(crate) fn return_connection(self: &Arc<Self>, mut conn: HttpConnection) {
        if let Err(e) = conn.probe() {
            tracing::debug!(conn = conn.id(), error = %e, "not reusable after response");
            return;
        }
        if conn.is_expired(self.settings.pooled_connection_lifetime) {
            tracing::debug!(conn = conn.id(), "lifetime elapsed; closing");
            return;
        }
        conn.mark_reused();

        let mut state = self.lock();
        if state.disposed {
            drop(state);
            drop(conn);
            return;
        }

        while let Some(waiter) = state.waiters.pop_front() {
            match waiter.send(Handoff::Connection(conn)) {
                Ok(()) => {
                    tracing::trace!(key = %self.key, "connection handed to waiter");
                    return;
                }
                Err(Handoff::Connection(back)) => conn = back,
                Err(Handoff::Slot(mut slot)) => {
                    slot.disarm();
                    return;
                }
            }
        }

        tracing::trace!(key = %self.key, conn = conn.id(), "connection idle");
        state.idle.push(CachedConnection { conn, idle_since: Instant::now() });
    }
}

/// Connections to one [`ConnectionKey`], bounded by
/// `max_connections_per_server`.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    /// A `max_connections_per_server` of 0 is treated as 1.
    pub fn new(key: ConnectionKey, settings: Arc<ConnectionSettings>) -> Self {
        let max_connections = settings.max_connections_per_server.max(1);
        Self {
            shared: Arc::new(PoolShared {
                key,
                settings,
                max_connections,
                state: Mutex::new(PoolState::default()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn key(&self) -> &ConnectionKey {
        &self.shared.key
    }

    /// Sends `request` on a pooled or freshly dialed connection.
    ///
    /// A transport failure on a reused connection is retried once on a new
    /// connection that inherits the failed one's slot.
    pub async fn send(
        &self,
        request: &HttpRequest,
        token: &CancellationToken,
    ) -> Result<HttpResponse, NetError> {
        let shared = &self.shared;
        let conn = match shared.acquire(token).await? {
            Acquired::Reuse(conn) => conn,
            Acquired::Dial(slot) => shared.dial(slot, token).await?,
        };
        let reused = conn.is_reused();

        let failure = match conn.send(request, token).await {
            Ok(response) => return Ok(response),
            Err(failure) => failure,
        };

        let retry = reused && !token.is_cancelled();
        match RetryReason::from_error(&failure.error).filter(|_| retry) {
            Some(reason) => {
                tracing::debug!(key = %shared.key, ?reason, "reused connection failed; redialing");
                let conn = shared.dial(failure.into_slot(), token).await?;
                conn.send(request, token).await.map_err(|f| f.into_error())
            }
            None => Err(failure.into_error()),
        }
    }

    /// Drops idle connections that timed out or went bad.
    pub fn cleanup_idle(&self) {
        let now = Instant::now();
        let stale: Vec<CachedConnection> = {
            let mut state = self.shared.lock();
            let idle = std::mem::take(&mut state.idle);
            let (keep, stale) = idle
                .into_iter()
                .map(|mut c| {
                    let usable = c.is_usable(now, &self.shared.settings);
                    (c, usable)
                })
                .partition::<Vec<_>, _>(|(_, usable)| *usable);
            state.idle = keep.into_iter().map(|(c, _)| c).collect();
            stale.into_iter().map(|(c, _)| c).collect()
        };
        if !stale.is_empty() {
            tracing::debug!(key = %self.shared.key, removed = stale.len(), "idle sweep");
        }
    }

    /// Closes idle connections and rejects further requests.
    ///
    /// Requests already in flight run to completion; queued waiters fail
    /// with [`NetError::Disposed`].
    pub fn dispose(&self) {
        let (idle, waiters) = {
            let mut state = self.shared.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            (std::mem::take(&mut state.idle), std::mem::take(&mut state.waiters))
        };
        tracing::debug!(key = %self.shared.key, idle = idle.len(), "pool disposed");
        drop(waiters);
        drop(idle);
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.lock().disposed
    }

    pub fn idle_count(&self) -> usize {
        self.shared.lock().idle.len()
    }

    pub fn max_connections(&self) -> usize {
        self.shared.max_connections
    }

    pub fn associated_count(&self) -> usize {
        self.shared.lock().associated
    }

    pub fn waiter_count(&self) -> usize {
        self.shared.lock().waiters.iter().filter(|w| !w.is_closed()).count()
    }

    /// Sweeps idle connections every `interval` until the pool is dropped
    /// or disposed.
    pub fn start_cleanup_task(&self, interval: Duration) {
        let weak = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else { break };
                let pool = ConnectionPool { shared };
                if pool.is_disposed() {
                    break;
                }
                pool.cleanup_idle();
            }
        });
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("ConnectionPool")
            .field("key", &self.shared.key)
            .field("idle", &state.idle.len())
            .field("associated", &state.associated)
            .field("waiters", &state.waiters.len())
            .field("disposed", &state.disposed)
            .finish()
    }
}
