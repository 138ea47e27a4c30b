// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error types for the registry client.

use crate::limiter::LimiterError;
use thiserror::Error;

/// Client error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Rate limiter error: {0}")]
    Limiter(#[from] LimiterError),

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Registry returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Response is missing field: {0}")]
    MissingField(&'static str),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ApiError>;
