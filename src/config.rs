// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the CRPT registry client.
//!
//! Defaults match the public demo stand of the registry
//! (`markirovka.demo.crpt.tech`) and a one-unit sliding window.

use crate::error::{ApiError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Registry base URL (default: https://markirovka.demo.crpt.tech)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Product group sent with every document (default: milk)
    #[serde(default = "default_product_group")]
    pub product_group: String,

    /// Document type sent with every document (default: LP_INTRODUCE_GOODS)
    #[serde(default = "default_document_type")]
    pub document_type: String,

    /// Per-request HTTP timeout in seconds (default: 30)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Rate limiting configuration
    #[serde(default)]
    pub limiter: LimiterConfig,
}

/// Unit the sliding window size is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Convert `amount` of this unit into a duration.
    pub fn to_duration(self, amount: u64) -> Duration {
        match self {
            Self::Milliseconds => Duration::from_millis(amount),
            Self::Seconds => Duration::from_secs(amount),
            Self::Minutes => Duration::from_secs(amount.saturating_mul(60)),
            Self::Hours => Duration::from_secs(amount.saturating_mul(3_600)),
            Self::Days => Duration::from_secs(amount.saturating_mul(86_400)),
        }
    }
}

impl std::str::FromStr for TimeUnit {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ms" | "millis" | "milliseconds" => Ok(Self::Milliseconds),
            "s" | "sec" | "secs" | "seconds" => Ok(Self::Seconds),
            "m" | "min" | "minutes" => Ok(Self::Minutes),
            "h" | "hours" => Ok(Self::Hours),
            "d" | "days" => Ok(Self::Days),
            other => Err(ApiError::InvalidConfig(format!("unknown time unit: {other}"))),
        }
    }
}

/// Longest the eviction worker sleeps between scans.
const MAX_POLL_INTERVAL_MS: u64 = 60_000;

/// Sliding window limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Maximum admitted requests per window (default: 10)
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window size, in `window_unit` (default: 1)
    #[serde(default = "default_window_size")]
    pub window_size: u64,

    /// Window unit (default: seconds)
    #[serde(default = "default_window_unit")]
    pub window_unit: TimeUnit,

    /// Upper bound on the eviction worker's sleep in milliseconds (default: 100)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Longest `acquire` waits for admission in milliseconds (default: 30000)
    #[serde(default = "default_max_await_ms")]
    pub max_await_ms: u64,
}

fn default_base_url() -> String {
    "https://markirovka.demo.crpt.tech".to_string()
}

fn default_product_group() -> String {
    "milk".to_string()
}

fn default_document_type() -> String {
    "LP_INTRODUCE_GOODS".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_requests() -> u32 {
    10
}

fn default_window_size() -> u64 {
    1
}

fn default_window_unit() -> TimeUnit {
    TimeUnit::Seconds
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_max_await_ms() -> u64 {
    30_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            product_group: default_product_group(),
            document_type: default_document_type(),
            request_timeout_secs: default_request_timeout_secs(),
            limiter: LimiterConfig::default(),
        }
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_size: default_window_size(),
            window_unit: default_window_unit(),
            poll_interval_ms: default_poll_interval_ms(),
            max_await_ms: default_max_await_ms(),
        }
    }
}

impl LimiterConfig {
    /// Limiter admitting `max_requests` per `window_size` of `window_unit`.
    pub fn new(window_unit: TimeUnit, window_size: u64, max_requests: u32) -> Self {
        Self {
            max_requests,
            window_size,
            window_unit,
            ..Default::default()
        }
    }

    /// Get the sliding window duration
    pub fn window(&self) -> Duration {
        self.window_unit.to_duration(self.window_size)
    }

    /// Get the eviction poll interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.clamp(1, MAX_POLL_INTERVAL_MS))
    }

    /// Get the admission wait bound
    pub fn max_await(&self) -> Duration {
        Duration::from_millis(self.max_await_ms)
    }
}

impl Config {
    /// Load configuration from a JSON file. Missing fields take defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ApiError::InvalidConfig(format!("{}: {e}", path.as_ref().display()))
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `CRPT_*` environment variables over defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from a variable lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("CRPT_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = lookup("CRPT_PRODUCT_GROUP") {
            self.product_group = v;
        }
        if let Some(v) = lookup("CRPT_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_var("CRPT_REQUEST_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("CRPT_REQUEST_LIMIT") {
            self.limiter.max_requests = parse_var("CRPT_REQUEST_LIMIT", &v)?;
        }
        if let Some(v) = lookup("CRPT_WINDOW_SIZE") {
            self.limiter.window_size = parse_var("CRPT_WINDOW_SIZE", &v)?;
        }
        if let Some(v) = lookup("CRPT_WINDOW_UNIT") {
            self.limiter.window_unit = v.parse()?;
        }
        if let Some(v) = lookup("CRPT_POLL_INTERVAL_MS") {
            self.limiter.poll_interval_ms = parse_var("CRPT_POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("CRPT_MAX_AWAIT_MS") {
            self.limiter.max_await_ms = parse_var("CRPT_MAX_AWAIT_MS", &v)?;
        }
        Ok(())
    }

    /// Reject configurations the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.limiter.max_requests == 0 {
            return Err(ApiError::InvalidConfig(
                "request limit must be positive".to_string(),
            ));
        }
        if self.limiter.window().is_zero() {
            return Err(ApiError::InvalidConfig(
                "window size must be positive".to_string(),
            ));
        }
        self.base_url()?;
        Ok(())
    }

    /// Parsed base URL.
    pub fn base_url(&self) -> Result<Url> {
        Ok(Url::parse(&self.base_url)?)
    }

    /// Get the HTTP request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ApiError::InvalidConfig(format!("{key}: cannot parse {value:?}")))
}
