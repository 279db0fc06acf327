//! Session deadline, shutdown broadcast and worker reaping.
//!
//! Every worker owns exactly one connection.  When it starts it *arms* that
//! connection with the [`Controller`], receiving an [`ArmedConnection`] that
//! carries:
//!
//! - the stream itself, so teardown operates on the handle captured at
//!   registration time;
//! - a session deadline timer, reset by every successful read;
//! - a subscription to the process-wide shutdown broadcast.
//!
//! The receive loop races each read against [`SessionTimers::interrupted`],
//! so neither the deadline nor a shutdown ever interrupts code at an
//! arbitrary point: they are observed at the one place a worker can block.
//!
//! # Reaping
//!
//! Workers are Tokio tasks in a `JoinSet` owned by the supervisor.
//! [`on_child_exited`] takes the exit that woke the supervisor and then
//! drains every other already-finished worker without waiting, because
//! several workers may finish between two wake-ups.

use std::fmt;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{sleep, Instant, Sleep};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

// ── Worker identity ───────────────────────────────────────────────────────────

/// Unique identifier of one worker (one accepted connection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(Uuid);

impl WorkerId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Identity of a worker, captured by the supervisor at accept time.
#[derive(Debug, Clone)]
pub struct WorkerRecord {
    pub id: WorkerId,
    pub peer: SocketAddr,
    pub accepted_at: Instant,
}

impl WorkerRecord {
    /// Creates a record for a connection accepted just now.
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            id: WorkerId::new(),
            peer,
            accepted_at: Instant::now(),
        }
    }
}

/// How a worker ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The upload was written to storage.
    Stored,
    /// The peer sent nothing.
    Empty,
    /// Data arrived but was rejected or could not be written.
    Dropped,
    /// The session deadline expired.
    TimedOut,
    /// An external shutdown request ended the session.
    Shutdown,
    /// A read failed with a real I/O error.
    Failed,
}

impl WorkerExit {
    /// Whether this exit counts as a clean (zero-status) termination.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Stored | Self::Empty | Self::Dropped | Self::Shutdown)
    }
}

/// What a worker task returns to the supervisor.
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub record: WorkerRecord,
    pub exit: WorkerExit,
}

// ── Controller ────────────────────────────────────────────────────────────────

/// Why a session was cut short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// No successful read for the whole deadline period.
    DeadlineExpired(Duration),
    /// The operator asked the server to stop.
    Shutdown,
}

/// Process-wide shutdown broadcast plus the factory for armed connections.
///
/// Shared between the supervisor, every worker and the Ctrl+C handler via
/// `Arc<Controller>`.
#[derive(Debug)]
pub struct Controller {
    shutdown: watch::Sender<bool>,
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self { shutdown }
    }

    /// Requests shutdown of the listener and every armed connection.
    ///
    /// Only flips a flag and wakes subscribers; safe to call from a signal
    /// handling task at any time, any number of times.
    pub fn on_external_shutdown(&self) {
        let already = self.shutdown.send_replace(true);
        if !already {
            info!("external shutdown requested");
        }
    }

    /// Whether shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once shutdown has been requested (immediately if it already was).
    pub async fn shutdown_requested(&self) {
        let mut rx = self.shutdown.subscribe();
        wait_for_shutdown(&mut rx).await;
    }

    /// Registers `stream` as the one connection of a worker and starts its
    /// session deadline.
    pub fn arm<S>(&self, stream: S, record: WorkerRecord, deadline: Duration) -> ArmedConnection<S> {
        debug!(
            "worker {} armed for {} (deadline {:?})",
            record.id, record.peer, deadline
        );
        ArmedConnection {
            stream,
            record,
            timers: SessionTimers {
                period: deadline,
                deadline: Box::pin(sleep(deadline)),
                armed: true,
                shutdown: self.shutdown.subscribe(),
            },
        }
    }
}

async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    let closed = rx.wait_for(|requested| *requested).await.is_err();
    if closed {
        // The controller is gone; nobody can request shutdown any more.
        std::future::pending::<()>().await;
    }
}

/// `now + period`, saturating roughly 30 years out like `tokio::time::sleep`.
fn deadline_after(period: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(period)
        .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365 * 30))
}

// ── Armed connection ──────────────────────────────────────────────────────────

/// Deadline timer and shutdown subscription of one worker.
#[derive(Debug)]
pub struct SessionTimers {
    period: Duration,
    deadline: Pin<Box<Sleep>>,
    armed: bool,
    shutdown: watch::Receiver<bool>,
}

impl SessionTimers {
    /// Pushes the session deadline a full period into the future.
    pub fn on_activity(&mut self) {
        if self.armed {
            self.deadline.as_mut().reset(deadline_after(self.period));
        }
    }

    /// Disarms the deadline after a graceful end of transfer.  Shutdown is
    /// still observed.
    pub fn clear(&mut self) {
        self.armed = false;
    }

    /// Resolves when the session must be abandoned.
    pub async fn interrupted(&mut self) -> Interrupt {
        let armed = self.armed;
        let period = self.period;
        let deadline = &mut self.deadline;
        let shutdown = &mut self.shutdown;

        tokio::select! {
            _ = deadline, if armed => Interrupt::DeadlineExpired(period),
            _ = wait_for_shutdown(shutdown) => Interrupt::Shutdown,
        }
    }
}

/// A worker's connection registered with the [`Controller`].
#[derive(Debug)]
pub struct ArmedConnection<S> {
    stream: S,
    record: WorkerRecord,
    timers: SessionTimers,
}

impl<S> ArmedConnection<S> {
    pub fn record(&self) -> &WorkerRecord {
        &self.record
    }

    /// Borrows the stream and the timers separately so a read can be raced
    /// against [`SessionTimers::interrupted`].
    pub fn parts(&mut self) -> (&mut S, &mut SessionTimers) {
        (&mut self.stream, &mut self.timers)
    }
}

impl<S: AsyncWrite + Unpin> ArmedConnection<S> {
    /// Shuts the connection down and releases it.
    ///
    /// The write side is shut down explicitly; dropping the stream closes
    /// the read side.
    pub async fn teardown(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("worker {}: shutdown of {} failed: {e}", self.record.id, self.record.peer);
        }
    }

    /// Session deadline expired: tear down and log a warning.
    pub async fn on_timeout(self) {
        warn!(
            "connection timeout after {:?} without data, closing socket for {}",
            self.timers.period, self.record.peer
        );
        self.teardown().await;
    }

    /// External shutdown reached this worker: tear down immediately.
    pub async fn on_shutdown(self) {
        info!("closing connection {} for shutdown", self.record.peer);
        self.teardown().await;
    }
}

// ── Reaping ───────────────────────────────────────────────────────────────────

/// Logs one reclaimed worker.
pub fn reclaim(joined: Result<WorkerReport, JoinError>) {
    match joined {
        Ok(report) => {
            let lived = report.record.accepted_at.elapsed();
            if report.exit.is_success() {
                info!(
                    "worker {} ({}) terminated after {lived:?}: {:?}",
                    report.record.id, report.record.peer, report.exit
                );
            } else {
                warn!(
                    "worker {} ({}) terminated abnormally after {lived:?}: {:?}",
                    report.record.id, report.record.peer, report.exit
                );
            }
        }
        Err(e) if e.is_panic() => error!("worker task panicked: {e}"),
        Err(e) => debug!("worker task cancelled: {e}"),
    }
}

/// Reclaims every worker that has already finished, without waiting.
///
/// Returns how many were reclaimed.
pub fn drain_exited(workers: &mut JoinSet<WorkerReport>) -> usize {
    let mut reaped = 0;
    while let Some(joined) = workers.try_join_next() {
        reclaim(joined);
        reaped += 1;
    }
    reaped
}

/// Handles a worker-exit notification.
///
/// `first` is the exit that woke the caller; every other finished worker is
/// drained too, since exits are not guaranteed to be observed one at a time.
/// Never blocks.  Returns the total number reclaimed.
pub fn on_child_exited(
    first: Result<WorkerReport, JoinError>,
    workers: &mut JoinSet<WorkerReport>,
) -> usize {
    reclaim(first);
    1 + drain_exited(workers)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
