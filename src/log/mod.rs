//! Table Log (C4): the heart of the system. A per-table, Delta-Lake-shaped
//! append-only event log, its in-memory projection, its atomic persistence
//! protocol (CAS via ETag), and the rules by which the live file set is
//! derived from it. Grounded in shape on `adapters/file_storage.rs`'s
//! tombstone mechanism (`RecordTombstone`/`read_active_records`), adapted
//! to spec.md §4.4's exact Add/Remove/two-phase-VACUUM contract.

pub mod events;

pub use events::{Add, Format, LogEvent, MetaData, Protocol, Remove, CREATE_TABLE_CONFIG_KEY};

use crate::engine::{EngineError, EngineTransaction};
use crate::storage::{Storage, StorageError};
use bytes::Bytes;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("log is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("concurrent log update")]
    ConcurrentUpdate,

    #[error("no live files")]
    NoLiveFiles,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Default)]
struct LogState {
    events: Vec<LogEvent>,
    observed_etag: Option<String>,
}

/// Owns one table's in-memory event projection and log object. Every
/// mutating operation serializes through `state`'s mutex for the full
/// import → mutate → export sequence (spec.md §4.4.4, §9).
pub struct TableLog {
    name: String,
    storage: Arc<dyn Storage>,
    ttl_seconds: i64,
    stale_cache_quirk: bool,
    state: Mutex<LogState>,
}

/// Some object-store-compatible backends are known to serve a stale,
/// zero/near-zero-byte body for a short window after a conditional write or
/// delete. Identified by endpoint substring, per spec.md §9.
pub fn detect_stale_cache_quirk(endpoint: Option<&str>) -> bool {
    match endpoint {
        Some(e) => e.contains("r2.cloudflarestorage.com"),
        None => false,
    }
}

impl TableLog {
    pub fn new(name: impl Into<String>, storage: Arc<dyn Storage>, ttl_seconds: i64, stale_cache_quirk: bool) -> Self {
        Self {
            name: name.into(),
            storage,
            ttl_seconds,
            stale_cache_quirk,
            state: Mutex::new(LogState::default()),
        }
    }

    fn log_path(&self) -> String {
        format!("{}/_delta_log/00000000000000000000.json", self.name)
    }

    fn log_dir(&self) -> String {
        format!("{}/_delta_log", self.name)
    }

    async fn import_locked(&self, state: &mut LogState) -> Result<(), LogError> {
        match self.storage.read(&self.log_path()).await {
            Ok((bytes, info)) => {
                if self.stale_cache_quirk && bytes.len() <= 2 {
                    state.events = Vec::new();
                    state.observed_etag = Some(String::new());
                } else {
                    state.events = events::parse_events(&bytes)?;
                    state.observed_etag = Some(info.etag);
                }
            }
            Err(StorageError::NotFound(_)) => {
                state.events = Vec::new();
                state.observed_etag = Some(String::new());
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    async fn export_locked(&self, state: &mut LogState) -> Result<(), LogError> {
        self.storage.create_dir(&self.log_dir()).await.ok();
        let body = events::serialize_events(&state.events);
        let if_match = state.observed_etag.clone().unwrap_or_default();
        match self
            .storage
            .write(&self.log_path(), Bytes::from(body), Some(&if_match))
            .await
        {
            Ok(info) => {
                state.observed_etag = Some(info.etag);
                Ok(())
            }
            Err(StorageError::PreconditionFailed { .. }) => Err(LogError::ConcurrentUpdate),
            Err(e) => Err(e.into()),
        }
    }

    /// Import the current persisted log and return a snapshot of its
    /// events, without exporting anything. Used by read-only prepare-phase
    /// operations.
    pub async fn snapshot(&self) -> Result<Vec<LogEvent>, LogError> {
        let mut guard = self.state.lock().await;
        self.import_locked(&mut guard).await?;
        Ok(guard.events.clone())
    }

    /// Derive the `MetaData` event from the now-created session table and
    /// append it (plus a leading `Protocol` on a fresh log) — spec.md
    /// §4.4.5.
    pub async fn log_ddl(
        &self,
        tx: &EngineTransaction<'_>,
        table: &str,
        ddl: &str,
    ) -> Result<(), LogError> {
        let mut guard = self.state.lock().await;
        self.import_locked(&mut guard).await?;

        let qualified = tx.qualify(table);
        let df_table = tx.ctx().table(&qualified).await.map_err(EngineError::from)?;
        let schema = df_table.schema().inner().clone();

        let fields: Vec<serde_json::Value> = schema
            .fields()
            .iter()
            .map(|f| {
                let engine_type = crate::engine::engine_type_name(f.data_type());
                json!({
                    "name": f.name(),
                    "type": events::engine_type_to_delta(&engine_type),
                    "nullable": f.is_nullable(),
                    "metadata": {},
                })
            })
            .collect();
        let schema_string = serde_json::to_string(&json!({
            "type": "struct",
            "fields": fields,
        }))
        .expect("schema struct always serializes");

        let mut configuration = HashMap::new();
        configuration.insert(CREATE_TABLE_CONFIG_KEY.to_string(), ddl.to_string());

        let meta = MetaData {
            id: crate::id::to_canonical_string(crate::id::new_uuid_v7()),
            format: Format::default(),
            schema_string,
            partition_columns: Vec::new(),
            created_time: crate::id::now_ms(),
            configuration,
        };

        if guard.events.is_empty() {
            guard.events.push(LogEvent::Protocol(Protocol::default()));
        }
        guard.events.push(LogEvent::MetaData(meta));

        self.export_locked(&mut guard).await
    }

    /// Persist the current in-session table as a new Parquet data file and
    /// append its `Add` event — spec.md §4.4.5 Insert.
    pub async fn insert(&self, tx: &EngineTransaction<'_>, table: &str) -> Result<(), LogError> {
        let mut guard = self.state.lock().await;
        self.import_locked(&mut guard).await?;

        let rel_path = format!("data/{}.parquet", crate::id::to_canonical_string(crate::id::new_uuid_v7()));
        let abs_path = format!("{}/{}", self.name, rel_path);
        let write_url = self.storage.to_engine_write_path(&abs_path);
        self.storage.create_dir(&format!("{}/data", self.name)).await.ok();

        let qualified = tx.qualify(table);
        tx.execute(&format!("COPY {qualified} TO '{write_url}' (FORMAT PARQUET)"))
            .await?;

        let info = self.storage.stat(&abs_path).await?;
        let stats = tx.compute_delta_stats(table).await?;

        guard.events.push(LogEvent::Add(Add {
            path: rel_path,
            partition_values: HashMap::new(),
            size: info.size as i64,
            modification_time: crate::id::now_ms(),
            data_change: true,
            stats: stats.to_string(),
        }));

        self.export_locked(&mut guard).await
    }

    /// Register `table` as a view over the live Parquet files. Fails with
    /// `NoLiveFiles` (a sentinel the pipeline catches) if there are none.
    pub async fn create_view_of_parquet(
        &self,
        tx: &EngineTransaction<'_>,
        table: &str,
    ) -> Result<(), LogError> {
        let events = self.snapshot().await?;
        let live = events::live_adds(&events);
        if live.is_empty() {
            return Err(LogError::NoLiveFiles);
        }
        let urls: Vec<String> = live
            .iter()
            .map(|a| self.storage.to_engine_read_path(&format!("{}/{}", self.name, a.path)))
            .collect();
        tx.create_view(table, &urls).await?;
        Ok(())
    }

    /// Reconstruct an empty table of the logged shape by replaying the
    /// stashed `CREATE TABLE` DDL. No-op if no `MetaData` exists yet.
    pub async fn create_temp_table(
        &self,
        tx: &EngineTransaction<'_>,
        table: &str,
    ) -> Result<(), LogError> {
        let events = self.snapshot().await?;
        if let Some(meta) = events::metadata(&events) {
            if let Some(ddl) = meta.create_table_ddl() {
                tx.create_table_from_ddl(ddl).await?;
            }
        }
        Ok(())
    }

    /// VACUUM, two-phase (spec.md §4.4.5):
    /// Phase A reclaims ripe tombstones from storage, touching no events.
    /// Phase B (only if Phase A had nothing to do) compacts all live files
    /// into one, tombstoning the rest in the same event.
    pub async fn merge(&self, tx: &EngineTransaction<'_>, table: &str) -> Result<(), LogError> {
        let mut guard = self.state.lock().await;
        self.import_locked(&mut guard).await?;

        let now = crate::id::now_ms();
        let ripe: Vec<Remove> = events::reclaimable_removes(&guard.events, self.ttl_seconds, now)
            .into_iter()
            .cloned()
            .collect();

        // Remove events are never pruned from the log, so a ripe tombstone
        // whose file was already deleted by an earlier VACUUM stays "ripe"
        // forever. Only count this as Phase A work — and only stay in
        // Phase A instead of progressing to compaction — when a file is
        // actually still there to reclaim.
        let mut reclaimed_any = false;
        for r in &ripe {
            let abs = format!("{}/{}", self.name, r.path);
            match self.storage.stat(&abs).await {
                Ok(_) => {
                    if let Err(e) = self.storage.delete(&abs).await {
                        tracing::warn!(table = %self.name, path = %r.path, error = %e, "vacuum: failed to reclaim tombstoned file");
                    } else {
                        reclaimed_any = true;
                    }
                }
                Err(StorageError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        if reclaimed_any {
            return Ok(());
        }

        let live: Vec<Add> = events::live_adds(&guard.events).into_iter().cloned().collect();
        if live.len() <= 1 {
            return Ok(());
        }

        let rel_path = format!("data/{}.parquet", crate::id::to_canonical_string(crate::id::new_uuid_v7()));
        let abs_path = format!("{}/{}", self.name, rel_path);
        let write_url = self.storage.to_engine_write_path(&abs_path);
        self.storage.create_dir(&format!("{}/data", self.name)).await.ok();

        let qualified = tx.qualify(table);
        tx.execute(&format!("COPY {qualified} TO '{write_url}' (FORMAT PARQUET)"))
            .await?;

        let info = self.storage.stat(&abs_path).await?;
        let stats = tx.compute_delta_stats(table).await?;

        for a in &live {
            guard.events.push(LogEvent::Remove(Remove {
                path: a.path.clone(),
                size: a.size,
                modification_time: a.modification_time,
                data_change: true,
                deletion_timestamp: now,
                extended_file_metadata: true,
                partition_values: a.partition_values.clone(),
            }));
        }
        guard.events.push(LogEvent::Add(Add {
            path: rel_path,
            partition_values: HashMap::new(),
            size: info.size as i64,
            modification_time: now,
            data_change: true,
            stats: stats.to_string(),
        }));

        self.export_locked(&mut guard).await
    }

    /// Delete all known data files and the log object itself (spec.md
    /// §4.4.7), applying the stale-cache sentinel-write workaround first
    /// when the backend needs it.
    pub async fn destroy(&self) -> Result<(), LogError> {
        let mut guard = self.state.lock().await;
        self.import_locked(&mut guard).await?;

        let all_known: HashSet<String> = guard
            .events
            .iter()
            .filter_map(|e| match e {
                LogEvent::Add(a) => Some(a.path.clone()),
                LogEvent::Remove(r) => Some(r.path.clone()),
                _ => None,
            })
            .collect();

        for path in &all_known {
            let abs = format!("{}/{}", self.name, path);
            if let Err(e) = self.storage.delete(&abs).await {
                tracing::warn!(table = %self.name, path = %path, error = %e, "destroy: failed to delete data file");
            }
        }

        if self.stale_cache_quirk {
            let _ = self
                .storage
                .write(&self.log_path(), Bytes::from_static(b"{}"), None)
                .await;
        }
        self.storage.delete(&self.log_path()).await?;

        guard.events.clear();
        guard.observed_etag = Some(String::new());
        Ok(())
    }
}
