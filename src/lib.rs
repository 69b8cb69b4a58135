//! # duckpond
//!
//! A serverless SQL table engine. Relational data lives as immutable
//! Parquet files in an object store; a per-table Delta-Lake-shaped
//! transaction log (newline-delimited JSON events, CAS-protected via ETag)
//! tracks which files are live. Standard SQL arrives over HTTP. There is no
//! server-side database — every byte of authoritative state lives in the
//! object store.
//!
//! ## Modules
//!
//! - [`storage`] — uniform byte-blob access over local FS / S3-compatible
//!   object stores, with ETag-conditional writes.
//! - [`sql`] — a shallow, prefix-matching SQL statement classifier.
//! - [`engine`] — the embedded DataFusion session and its UDFs.
//! - [`log`] — the per-table transaction log and its derived file sets.
//! - [`pipeline`] — orchestrates one request end to end.
//! - [`http`] — the Axum surface fronting the pipeline.

pub mod cli;
pub mod config;
pub mod engine;
pub mod http;
pub mod id;
pub mod log;
pub mod pipeline;
pub mod sql;
pub mod storage;

use crate::config::Settings;
use crate::http::AppState;
use crate::pipeline::Pipeline;
use std::sync::Arc;

/// Build the process's storage backend and request pipeline from settings,
/// then wrap them in the Axum router.
pub fn build_app(settings: &Settings) -> anyhow::Result<axum::Router> {
    let storage = storage::build_storage(&settings.local_root, &settings.s3)?;
    let pipeline = Pipeline::new(
        storage.into(),
        settings.ttl_seconds,
        settings.query_splitting,
        settings.stale_cache_quirk(),
    );

    let state = Arc::new(AppState {
        pipeline,
        bearer_token: settings.bearer_token.clone(),
        start_time: std::time::Instant::now(),
    });

    Ok(http::build_router(state))
}
