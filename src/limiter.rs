// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Sliding window rate limiter for outbound registry calls.
//!
//! Admits at most `max_requests` operations within any trailing window:
//! 1. `try_acquire` takes a slot if one is free, without waiting
//! 2. `record_completion` timestamps the request once it has been sent
//! 3. A background worker evicts timestamps older than the window and
//!    frees their slots, waking anyone blocked in `acquire`
//!
//! The slot counter and the timestamp history sit behind one mutex so the
//! two can never drift apart.

use crate::config::LimiterConfig;
use crate::metrics::LimiterMetrics;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Entries are expired once strictly older than the window; wake one tick later.
const EXPIRY_SLACK: Duration = Duration::from_millis(1);

/// Wait bound used when `max_await` overflows `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Limiter error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LimiterError {
    #[error("Invalid limiter argument: {0}")]
    InvalidArgument(String),

    #[error("No tokio runtime available for the eviction worker")]
    NoRuntime,

    #[error("Metrics setup failed: {0}")]
    Metrics(String),

    #[error("No slot became free within {waited:?}")]
    Timeout { waited: Duration },

    #[error("Admission wait cancelled")]
    Cancelled,

    #[error("Limiter has zero capacity")]
    NoCapacity,

    #[error("Eviction worker is not running")]
    EvictorStopped,

    #[error("Eviction worker failed: {0}")]
    EvictorFailed(String),
}

/// Counter and history, always updated together.
#[derive(Debug, Default)]
struct Window {
    /// Slots in use: admitted but unrecorded plus recorded and unevicted
    counter: usize,
    /// Recorded request times, oldest first
    history: VecDeque<Instant>,
}

impl Window {
    /// Admissions that have not been recorded or released yet.
    fn pending(&self) -> usize {
        self.counter - self.history.len()
    }
}

/// State shared between callers and the eviction worker.
struct Shared {
    max_requests: usize,
    window: Duration,
    poll_interval: Duration,
    state: Mutex<Window>,
    /// Signalled when history gains an entry
    recorded: Notify,
    /// Signalled when slots are freed
    freed: Notify,
    metrics: LimiterMetrics,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Window> {
        // Critical sections never panic midway, so a poisoned window is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_admit(&self) -> bool {
        let mut window = self.lock();
        if window.counter >= self.max_requests {
            drop(window);
            self.metrics.denied.inc();
            return false;
        }
        window.counter += 1;
        self.metrics.in_window.set(window.counter as i64);
        drop(window);
        self.metrics.admitted.inc();
        true
    }

    fn record(&self) {
        let mut window = self.lock();
        if window.pending() == 0 {
            drop(window);
            warn!("Completion recorded without an outstanding admission, ignoring");
            return;
        }
        window.history.push_back(Instant::now());
        drop(window);
        self.recorded.notify_one();
    }

    fn release(&self) {
        let mut window = self.lock();
        if window.pending() == 0 {
            drop(window);
            warn!("Release without an outstanding admission, ignoring");
            return;
        }
        window.counter -= 1;
        self.metrics.in_window.set(window.counter as i64);
        drop(window);
        self.metrics.released.inc();
        self.freed.notify_waiters();
    }

    /// Pop expired entries from the front, returning when the next one expires.
    fn evict_expired(&self, now: Instant) -> Option<Instant> {
        let mut window = self.lock();
        let mut evicted = 0u64;
        while let Some(&oldest) = window.history.front() {
            if now.saturating_duration_since(oldest) <= self.window {
                break;
            }
            window.history.pop_front();
            debug_assert!(window.counter > 0, "eviction would underflow the counter");
            window.counter = window.counter.saturating_sub(1);
            evicted += 1;
        }
        // A window too long for `Instant` never expires its entries.
        let next = window.history.front().and_then(|&oldest| {
            oldest
                .checked_add(self.window)
                .and_then(|t| t.checked_add(EXPIRY_SLACK))
        });
        self.metrics.in_window.set(window.counter as i64);
        drop(window);

        if evicted > 0 {
            debug!(evicted, "Evicted expired history entries");
            self.metrics.evicted.inc_by(evicted);
            self.freed.notify_waiters();
        }
        next
    }
}

/// Eviction loop. Sleeps until the oldest entry expires, capped by the
/// poll interval, or until a new entry is recorded.
async fn run_evictor(shared: Arc<Shared>, shutdown: CancellationToken) {
    loop {
        let now = Instant::now();
        let poll = now + shared.poll_interval;
        let wake = match shared.evict_expired(now) {
            Some(next) => next.min(poll),
            None => poll,
        };

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep_until(wake) => {}
            _ = shared.recorded.notified() => {}
        }
    }
    debug!("Eviction worker stopped");
}

/// Thread-safe sliding window limiter with an owned eviction worker.
///
/// Must be created inside a tokio runtime. Dropping the limiter stops the
/// worker; `shutdown` does the same and reports whether it had failed.
pub struct SlidingWindowLimiter {
    shared: Arc<Shared>,
    max_await: Duration,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SlidingWindowLimiter {
    /// Create a limiter with fresh, unregistered metrics.
    pub fn new(config: &LimiterConfig) -> Result<Self, LimiterError> {
        let metrics = LimiterMetrics::new().map_err(|e| LimiterError::Metrics(e.to_string()))?;
        Self::with_metrics(config, metrics)
    }

    /// Create a limiter reporting into `metrics`.
    pub fn with_metrics(
        config: &LimiterConfig,
        metrics: LimiterMetrics,
    ) -> Result<Self, LimiterError> {
        let window = config.window();
        if window.is_zero() {
            return Err(LimiterError::InvalidArgument(
                "window size must be positive".to_string(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| LimiterError::NoRuntime)?;

        if config.max_requests == 0 {
            warn!("Limiter has zero capacity, every request will be denied");
        }

        let shared = Arc::new(Shared {
            max_requests: config.max_requests as usize,
            window,
            poll_interval: config.poll_interval(),
            state: Mutex::new(Window::default()),
            recorded: Notify::new(),
            freed: Notify::new(),
            metrics,
        });
        let shutdown = CancellationToken::new();
        let worker = runtime.spawn(run_evictor(Arc::clone(&shared), shutdown.clone()));

        debug!(
            max_requests = config.max_requests,
            window = ?window,
            "Sliding window limiter started"
        );

        Ok(Self {
            shared,
            max_await: config.max_await(),
            shutdown,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Take a slot if one is free. Never waits.
    ///
    /// A `true` result must be followed by exactly one `record_completion`
    /// (request sent) or `release` (request abandoned).
    pub fn try_acquire(&self) -> bool {
        self.shared.try_admit()
    }

    /// Timestamp a request admitted by `try_acquire` as sent.
    pub fn record_completion(&self) {
        self.shared.record();
    }

    /// Hand back a slot admitted by `try_acquire` that was never used.
    pub fn release(&self) {
        self.shared.release();
    }

    /// Wait for a slot, up to the configured maximum await.
    ///
    /// Woken by evictions and releases rather than by polling.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Permit<'_>, LimiterError> {
        if self.shared.max_requests == 0 {
            return Err(LimiterError::NoCapacity);
        }

        let start = Instant::now();
        let deadline = start
            .checked_add(self.max_await)
            .unwrap_or_else(|| start + FAR_FUTURE);
        loop {
            if cancel.is_cancelled() {
                return Err(LimiterError::Cancelled);
            }

            // Register interest before checking so a concurrent free is not missed.
            let freed = self.shared.freed.notified();
            tokio::pin!(freed);
            freed.as_mut().enable();

            if self.try_acquire() {
                return Ok(Permit {
                    limiter: self,
                    settled: false,
                });
            }
            if !self.is_running() {
                error!("Eviction worker is not running, slots can no longer free up");
                return Err(LimiterError::EvictorStopped);
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(LimiterError::Cancelled),
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(LimiterError::Timeout { waited: start.elapsed() });
                }
                _ = freed.as_mut() => {}
            }
        }
    }

    /// Slots currently counted against the window.
    pub fn in_window(&self) -> usize {
        self.shared.lock().counter
    }

    /// Recorded requests not yet evicted.
    pub fn history_len(&self) -> usize {
        self.shared.lock().history.len()
    }

    pub fn max_requests(&self) -> usize {
        self.shared.max_requests
    }

    pub fn window(&self) -> Duration {
        self.shared.window
    }

    pub fn metrics(&self) -> &LimiterMetrics {
        &self.shared.metrics
    }

    /// Whether the eviction worker is still alive.
    pub fn is_running(&self) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the eviction worker and wait for it to exit.
    pub async fn shutdown(&self) -> Result<(), LimiterError> {
        self.shutdown.cancel();
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match handle {
            Some(handle) => match handle.await {
                Ok(()) => Ok(()),
                Err(e) if e.is_cancelled() => Ok(()),
                Err(e) => {
                    error!(error = %e, "Eviction worker failed");
                    Err(LimiterError::EvictorFailed(e.to_string()))
                }
            },
            None => Ok(()),
        }
    }
}

impl Drop for SlidingWindowLimiter {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for SlidingWindowLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindowLimiter")
            .field("max_requests", &self.shared.max_requests)
            .field("window", &self.shared.window)
            .field("in_window", &self.in_window())
            .finish_non_exhaustive()
    }
}

/// A slot taken by `SlidingWindowLimiter::acquire`.
///
/// `complete` records the request; dropping the permit instead releases it.
#[must_use = "dropping a permit releases its slot"]
#[derive(Debug)]
pub struct Permit<'a> {
    limiter: &'a SlidingWindowLimiter,
    settled: bool,
}

impl Permit<'_> {
    /// Record the gated request as sent.
    pub fn complete(mut self) {
        self.settled = true;
        self.limiter.record_completion();
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.limiter.release();
        }
    }
}
