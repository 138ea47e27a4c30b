// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! In-process fake of the registry's document and auth endpoints.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

pub const CHALLENGE_UUID: &str = "9a8d7c6b-challenge";
pub const CHALLENGE_DATA: &str = "RANDOM-CHALLENGE";
pub const ISSUED_TOKEN: &str = "issued-token";

/// Requests observed by the fake registry.
#[derive(Default)]
pub struct RegistryState {
    /// Parsed bodies of document creation calls
    pub documents: Mutex<Vec<Value>>,
    /// Authorization headers of document creation calls
    pub authorizations: Mutex<Vec<String>>,
    /// Content-Type headers of document creation calls
    pub content_types: Mutex<Vec<String>>,
    /// Answer document calls with 500 while set
    pub reject: AtomicBool,
    /// Document calls received
    pub hits: AtomicUsize,
}

/// A running fake registry.
pub struct FakeRegistry {
    pub base_url: String,
    pub state: Arc<RegistryState>,
}

impl FakeRegistry {
    /// Bind to an ephemeral port and start serving.
    pub async fn start() -> Self {
        let state = Arc::new(RegistryState::default());
        let app = Router::new()
            .route("/api/v3/lk/documents/create", post(create_document))
            .route("/api/v3/auth/cert/key", get(auth_challenge))
            .route("/api/v3/auth/cert/", post(auth_token))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    pub fn documents(&self) -> Vec<Value> {
        self.state.documents.lock().unwrap().clone()
    }

    pub fn authorizations(&self) -> Vec<String> {
        self.state.authorizations.lock().unwrap().clone()
    }

    pub fn content_types(&self) -> Vec<String> {
        self.state.content_types.lock().unwrap().clone()
    }

    pub fn set_reject(&self, reject: bool) {
        self.state.reject.store(reject, Ordering::SeqCst);
    }
}

/// A server that accepts connections and never answers.
pub struct SilentRegistry {
    pub base_url: String,
    /// Connections accepted so far
    pub accepted: Arc<AtomicUsize>,
}

impl SilentRegistry {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                held.push(stream);
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            accepted,
        }
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

fn header_value(headers: &HeaderMap, name: header::HeaderName) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn create_document(
    State(state): State<Arc<RegistryState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let n = state.hits.fetch_add(1, Ordering::SeqCst) + 1;
    state
        .authorizations
        .lock()
        .unwrap()
        .push(header_value(&headers, header::AUTHORIZATION));
    state
        .content_types
        .lock()
        .unwrap()
        .push(header_value(&headers, header::CONTENT_TYPE));

    let parsed: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    state.documents.lock().unwrap().push(parsed);

    if state.reject.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "registry unavailable"})),
        );
    }
    (StatusCode::OK, Json(json!({"value": format!("doc-{n}")})))
}

async fn auth_challenge() -> Json<Value> {
    Json(json!({"uuid": CHALLENGE_UUID, "data": CHALLENGE_DATA}))
}

async fn auth_token(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let expected = STANDARD.encode(reversed(CHALLENGE_DATA.as_bytes()));
    if body["uuid"] == CHALLENGE_UUID && body["data"] == expected.as_str() {
        (StatusCode::OK, Json(json!({"token": ISSUED_TOKEN})))
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "bad signature"})),
        )
    }
}

/// The fake "signature" the registry accepts: the challenge bytes reversed.
pub fn reversed(data: &[u8]) -> Vec<u8> {
    data.iter().rev().copied().collect()
}
