// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Bearer token acquisition.
//!
//! The registry issues tokens through a challenge/response exchange: fetch a
//! random challenge, sign it with the participant's qualified certificate,
//! and post the signature back. Producing the qualified signature is left to
//! a [`Signer`] implementation supplied by the caller.

use crate::error::{ApiError, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

/// Challenge endpoint.
pub const AUTH_KEY_PATH: &str = "/api/v3/auth/cert/key";
/// Signed challenge submission endpoint.
pub const AUTH_TOKEN_PATH: &str = "/api/v3/auth/cert/";

/// Produces a detached signature over challenge data.
pub trait Signer: Send + Sync {
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// How the client obtains its bearer token.
pub enum Credentials {
    /// Token issued out of band
    Token(String),
    /// Run the challenge/response exchange with this signer
    Certificate(Box<dyn Signer>),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token(_) => f.write_str("Credentials::Token(..)"),
            Self::Certificate(_) => f.write_str("Credentials::Certificate(..)"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuthChallenge {
    uuid: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct SignedChallenge<'a> {
    uuid: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// Resolve `credentials` into a bearer token.
pub async fn obtain_token(
    http: &reqwest::Client,
    base_url: &Url,
    credentials: &Credentials,
) -> Result<String> {
    let signer = match credentials {
        Credentials::Token(token) if token.is_empty() => {
            return Err(ApiError::Auth("empty token".to_string()));
        }
        Credentials::Token(token) => return Ok(token.clone()),
        Credentials::Certificate(signer) => signer,
    };

    let response = http.get(base_url.join(AUTH_KEY_PATH)?).send().await?;
    let challenge: AuthChallenge = read_json(response).await?;
    debug!(uuid = %challenge.uuid, "Received auth challenge");

    let signature = signer.sign(challenge.data.as_bytes())?;
    let body = SignedChallenge {
        uuid: &challenge.uuid,
        data: STANDARD.encode(signature),
    };

    let response = http
        .post(base_url.join(AUTH_TOKEN_PATH)?)
        .json(&body)
        .send()
        .await?;
    let TokenResponse { token } = read_json(response).await?;
    if token.is_empty() {
        return Err(ApiError::MissingField("token"));
    }

    info!(uuid = %challenge.uuid, "Obtained registry token");
    Ok(token)
}

async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Auth(format!("status {}: {body}", status.as_u16())));
    }
    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token_passthrough() {
        let http = reqwest::Client::new();
        let base = Url::parse("http://127.0.0.1:9").unwrap();

        let token = obtain_token(&http, &base, &Credentials::Token("abc".to_string()))
            .await
            .unwrap();
        assert_eq!(token, "abc");
    }

    #[tokio::test]
    async fn test_empty_static_token_rejected() {
        let http = reqwest::Client::new();
        let base = Url::parse("http://127.0.0.1:9").unwrap();

        let err = obtain_token(&http, &base, &Credentials::Token(String::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Auth(_)));
    }

    #[test]
    fn test_credentials_debug_hides_token() {
        let rendered = format!("{:?}", Credentials::Token("secret".to_string()));
        assert!(!rendered.contains("secret"));
    }
}
