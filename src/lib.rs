// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! CRPT Registry Client
//!
//! A client for submitting documents to the CRPT marking-registry API while
//! staying under a caller-chosen request rate:
//!
//! - Sliding window admission (N requests per trailing window)
//! - Background eviction of aged-out requests
//! - Bounded, cancellable waiting for a free slot
//! - Bearer token acquisition (static or challenge/response)
//! - Prometheus counters for admissions, denials and evictions

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod limiter;
pub mod metrics;

pub use auth::{Credentials, Signer};
pub use client::{CreateDocumentRequest, DocumentFormat, RegistryClient};
pub use config::{Config, LimiterConfig, TimeUnit};
pub use error::{ApiError, Result};
pub use limiter::{LimiterError, Permit, SlidingWindowLimiter};
pub use metrics::LimiterMetrics;
