// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Concurrent load driver for the sliding window limiter.

use crpt_api_client::SlidingWindowLimiter;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Possible outcomes for an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Admitted,
    Denied,
}

/// Collects results across load workers.
#[derive(Debug, Default)]
pub struct LoadMetrics {
    outcomes: Mutex<HashMap<Outcome, usize>>,
    /// Highest slot count seen right after an admission
    peak_in_window: AtomicUsize,
}

impl LoadMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: Outcome) {
        *self.outcomes.lock().unwrap().entry(outcome).or_insert(0) += 1;
    }

    pub fn observe_in_window(&self, in_window: usize) {
        self.peak_in_window.fetch_max(in_window, Ordering::SeqCst);
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.outcomes
            .lock()
            .unwrap()
            .get(&outcome)
            .copied()
            .unwrap_or(0)
    }

    pub fn peak_in_window(&self) -> usize {
        self.peak_in_window.load(Ordering::SeqCst)
    }
}

/// Load pattern.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Concurrent workers hammering `try_acquire`
    pub workers: usize,
    /// How long workers keep going
    pub duration: Duration,
    /// Pause between attempts of one worker
    pub pause: Duration,
}

impl LoadConfig {
    /// Many workers with no pause between attempts.
    pub fn flood(duration: Duration) -> Self {
        Self {
            workers: 16,
            duration,
            pause: Duration::from_millis(1),
        }
    }
}

/// Drive `limiter` from `config.workers` tasks, recording every admission.
pub async fn run(limiter: Arc<SlidingWindowLimiter>, config: &LoadConfig) -> Arc<LoadMetrics> {
    let metrics = Arc::new(LoadMetrics::new());
    let deadline = Instant::now() + config.duration;

    let mut tasks = Vec::with_capacity(config.workers);
    for _ in 0..config.workers {
        let limiter = Arc::clone(&limiter);
        let metrics = Arc::clone(&metrics);
        let pause = config.pause;
        tasks.push(tokio::spawn(async move {
            while Instant::now() < deadline {
                if limiter.try_acquire() {
                    metrics.observe_in_window(limiter.in_window());
                    limiter.record_completion();
                    metrics.record(Outcome::Admitted);
                } else {
                    metrics.record(Outcome::Denied);
                }
                tokio::time::sleep(pause).await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    metrics
}
