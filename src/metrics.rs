// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus collectors for the sliding window limiter.

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

/// Limiter counters. Cloning shares the underlying collectors.
#[derive(Debug, Clone)]
pub struct LimiterMetrics {
    /// Successful admissions
    pub admitted: IntCounter,
    /// Denied admissions
    pub denied: IntCounter,
    /// History entries aged out of the window
    pub evicted: IntCounter,
    /// Admitted slots handed back without a recorded request
    pub released: IntCounter,
    /// Slots currently held in the window
    pub in_window: IntGauge,
}

impl LimiterMetrics {
    /// Create unregistered collectors.
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            admitted: IntCounter::new(
                "crpt_limiter_admitted_total",
                "Requests admitted by the sliding window limiter",
            )?,
            denied: IntCounter::new(
                "crpt_limiter_denied_total",
                "Admission attempts denied by the sliding window limiter",
            )?,
            evicted: IntCounter::new(
                "crpt_limiter_evicted_total",
                "History entries evicted after leaving the window",
            )?,
            released: IntCounter::new(
                "crpt_limiter_released_total",
                "Admitted slots released without being used",
            )?,
            in_window: IntGauge::new(
                "crpt_limiter_in_window",
                "Slots currently counted against the window",
            )?,
        })
    }

    /// Register every collector with `registry`.
    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.admitted.clone()))?;
        registry.register(Box::new(self.denied.clone()))?;
        registry.register(Box::new(self.evicted.clone()))?;
        registry.register(Box::new(self.released.clone()))?;
        registry.register(Box::new(self.in_window.clone()))?;
        Ok(())
    }
}

/// Render a registry in the Prometheus text exposition format.
pub fn render(registry: &Registry) -> prometheus::Result<String> {
    let mut buf = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
