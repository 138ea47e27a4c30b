// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! crpt-submit
//!
//! Submits one or more product documents to the CRPT registry through a
//! single rate-limited client. Documents are sent concurrently; the client's
//! sliding window keeps the combined rate under the configured limit.
//!
//! ## Configuration
//!
//! Settings come from `--config <file.json>` if given, otherwise from
//! environment variables over built-in defaults:
//!
//! - `CRPT_BASE_URL`: Registry base URL (default: https://markirovka.demo.crpt.tech)
//! - `CRPT_REQUEST_LIMIT`: Max requests per window (default: 10)
//! - `CRPT_WINDOW_SIZE` / `CRPT_WINDOW_UNIT`: Window length (default: 1 seconds)
//! - `CRPT_MAX_AWAIT_MS`: Longest wait for a free slot (default: 30000)
//! - `CRPT_TOKEN`: Bearer token, if `--token` is not given

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crpt_api_client::{metrics, Config, LimiterMetrics, RegistryClient};

#[derive(Parser)]
#[command(name = "crpt-submit", about = "Submit documents to the CRPT registry under a rate limit")]
struct Args {
    /// Product document files (JSON)
    #[arg(long = "document", required = true)]
    documents: Vec<PathBuf>,

    /// File holding the detached signature for the documents
    #[arg(long)]
    signature: PathBuf,

    /// Bearer token
    #[arg(long, env = "CRPT_TOKEN", hide_env_values = true)]
    token: String,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print limiter metrics on exit
    #[arg(long)]
    print_metrics: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    info!(
        base_url = %config.base_url,
        max_requests = config.limiter.max_requests,
        window = ?config.limiter.window(),
        documents = args.documents.len(),
        "Starting document submission"
    );

    let signature = tokio::fs::read_to_string(&args.signature)
        .await
        .with_context(|| format!("reading signature {}", args.signature.display()))?;
    let signature = Arc::<str>::from(signature.trim());

    let registry = prometheus::Registry::new();
    let limiter_metrics = LimiterMetrics::new()?;
    limiter_metrics.register(&registry)?;

    let client = Arc::new(RegistryClient::with_metrics(
        config,
        args.token.clone(),
        limiter_metrics,
    )?);

    let cancel = client.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, abandoning documents still waiting for a slot");
            cancel.cancel();
        }
    });

    let mut tasks = JoinSet::new();
    for path in args.documents {
        let client = Arc::clone(&client);
        let signature = Arc::clone(&signature);
        tasks.spawn(async move {
            let result = submit(&client, &path, &signature).await;
            (path, result)
        });
    }

    let mut failed = 0usize;
    while let Some(joined) = tasks.join_next().await {
        let (path, result) = joined?;
        match result {
            Ok(id) => info!(document = %path.display(), document_id = %id, "Submitted"),
            Err(e) => {
                failed += 1;
                error!(document = %path.display(), error = %e, "Submission failed");
            }
        }
    }

    client.shutdown().await?;

    if args.print_metrics {
        print!("{}", metrics::render(&registry)?);
    }

    if failed > 0 {
        anyhow::bail!("{failed} document(s) failed");
    }
    Ok(())
}

async fn submit(
    client: &RegistryClient,
    path: &Path,
    signature: &str,
) -> anyhow::Result<String> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let document: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    Ok(client.create_document(&document, signature).await?)
}
