//! Request Pipeline (C5): classify → prepare a view or scratch table →
//! execute by operation → on writes, commit a data file + log event →
//! serialize → roll back the engine transaction.

use crate::engine::{EngineError, EngineSession};
use crate::log::{LogError, TableLog};
use crate::sql::{classify, Op};
use crate::storage::{Storage, StorageError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Log(#[from] LogError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("{0}")]
    Message(String),
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct MetaField {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
}

#[derive(Debug, Serialize)]
pub struct Statistics {
    pub elapsed_s: f64,
    pub prepare_ms: u128,
    pub execute_ms: u128,
    pub commit_ms: u128,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub meta: Vec<MetaField>,
    pub data: Vec<Vec<String>>,
    pub rows: usize,
    pub statistics: Statistics,
}

#[derive(Debug, Serialize)]
pub struct ParseResponse {
    pub operation: String,
    pub table: Option<String>,
}

/// Orchestrates every request against a single process-wide engine session
/// and a process-wide, name-memoized registry of `TableLog`s (spec.md §5,
/// §9: gate the map with a mutex; never hold it across I/O).
pub struct Pipeline {
    engine: EngineSession,
    storage: Arc<dyn Storage>,
    ttl_seconds: i64,
    stale_cache_quirk: bool,
    query_splitting: bool,
    tables: Mutex<HashMap<String, Arc<TableLog>>>,
}

impl Pipeline {
    pub fn new(
        storage: Arc<dyn Storage>,
        ttl_seconds: i64,
        query_splitting: bool,
        stale_cache_quirk: bool,
    ) -> Self {
        Self {
            engine: EngineSession::new(),
            storage,
            ttl_seconds,
            stale_cache_quirk,
            query_splitting,
            tables: Mutex::new(HashMap::new()),
        }
    }

    fn table_log(&self, name: &str) -> Arc<TableLog> {
        let mut tables = self.tables.lock().expect("table registry mutex poisoned");
        tables
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(TableLog::new(
                    name.to_string(),
                    self.storage.clone(),
                    self.ttl_seconds,
                    self.stale_cache_quirk,
                ))
            })
            .clone()
    }

    pub fn parse(&self, stmt: &str) -> ParseResponse {
        let (op, table) = classify(stmt);
        ParseResponse {
            operation: op.to_string(),
            table,
        }
    }

    /// Run the full body of a `/query` request, honoring query-splitting
    /// when enabled. Returns the last non-empty statement's response.
    pub async fn handle_query(&self, body: &str) -> Result<QueryResponse, PipelineError> {
        if !self.query_splitting {
            return self.execute_statement(body).await;
        }

        let mut last = None;
        for part in split_statements(body) {
            let trimmed = part.trim();
            if trimmed.is_empty() || trimmed.starts_with("--") {
                continue;
            }
            last = Some(self.execute_statement(trimmed).await?);
        }
        last.ok_or_else(|| PipelineError::Message("empty request body".to_string()))
    }

    async fn execute_statement(&self, stmt: &str) -> Result<QueryResponse, PipelineError> {
        let total_start = Instant::now();
        let tx = self.engine.begin();
        let (op, table) = classify(stmt);
        let table_log = table.as_deref().map(|name| self.table_log(name));

        let prepare_start = Instant::now();
        if let (Some(log), Some(name)) = (&table_log, table.as_deref()) {
            match op {
                Op::Select | Op::Vacuum => match log.create_view_of_parquet(&tx, name).await {
                    Ok(()) => {}
                    Err(LogError::NoLiveFiles) => {
                        log.create_temp_table(&tx, name).await?;
                    }
                    Err(e) => return Err(e.into()),
                },
                _ => {
                    log.create_temp_table(&tx, name).await?;
                }
            }
        }
        let prepare_ms = prepare_start.elapsed().as_millis();

        let execute_start = Instant::now();
        let executed = match op {
            Op::CreateTable | Op::Insert | Op::Select | Op::AlterTable | Op::Unknown => {
                Some(tx.execute(stmt).await?)
            }
            Op::Vacuum | Op::DropTable => None,
        };
        let execute_ms = execute_start.elapsed().as_millis();

        let commit_start = Instant::now();
        let (meta, rows) = match op {
            Op::CreateTable => {
                if let (Some(log), Some(name)) = (&table_log, table.as_deref()) {
                    log.log_ddl(&tx, name, stmt).await?;
                }
                (Vec::new(), Vec::new())
            }
            Op::Insert => {
                if let (Some(log), Some(name)) = (&table_log, table.as_deref()) {
                    log.insert(&tx, name).await?;
                }
                (Vec::new(), Vec::new())
            }
            Op::Vacuum => {
                if let (Some(log), Some(name)) = (&table_log, table.as_deref()) {
                    log.merge(&tx, name).await?;
                }
                (Vec::new(), Vec::new())
            }
            Op::DropTable => {
                if let Some(name) = table.as_deref() {
                    let log = self.table_log(name);
                    log.destroy().await?;
                    self.tables.lock().expect("table registry mutex poisoned").remove(name);
                }
                (Vec::new(), Vec::new())
            }
            Op::Select | Op::AlterTable | Op::Unknown => {
                let result = executed.expect("select/alter/unknown always executes");
                (
                    result
                        .meta
                        .into_iter()
                        .map(|m| MetaField {
                            name: m.name,
                            type_: m.data_type,
                        })
                        .collect(),
                    result.rows,
                )
            }
        };
        let commit_ms = commit_start.elapsed().as_millis();

        Ok(QueryResponse {
            rows: rows.len(),
            data: rows,
            meta,
            statistics: Statistics {
                elapsed_s: total_start.elapsed().as_secs_f64(),
                prepare_ms,
                execute_ms,
                commit_ms,
            },
        })
    }
}

/// Split on top-level `;` (outside string literals). Each piece is handed
/// back untrimmed; the caller trims and skips empty/comment-only pieces.
fn split_statements(body: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_string: Option<char> = None;
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        match in_string {
            Some(quote) => {
                current.push(c);
                if c == quote {
                    in_string = None;
                }
            }
            None => match c {
                '\'' | '"' => {
                    in_string = Some(c);
                    current.push(c);
                }
                ';' => {
                    parts.push(std::mem::take(&mut current));
                }
                _ => current.push(c),
            },
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStorage;

    fn pipeline(dir: &std::path::Path, query_splitting: bool) -> Pipeline {
        let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(dir).unwrap());
        Pipeline::new(storage, 0, query_splitting, false)
    }

    #[tokio::test]
    async fn create_insert_select_scenario_s1() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), false);

        let r = p
            .handle_query("CREATE TABLE messages (id VARCHAR, text VARCHAR, usage INTEGER)")
            .await
            .unwrap();
        assert_eq!(r.rows, 0);

        p.handle_query(
            "INSERT INTO messages VALUES ('01947471-2ded-7812-cafe-34567000b33f','one',1)",
        )
        .await
        .unwrap();
        p.handle_query(
            "INSERT INTO messages VALUES ('01947471-2ded-7812-cafe-34567000b33e','more',1)",
        )
        .await
        .unwrap();

        let r = p.handle_query("SELECT id, text FROM messages").await.unwrap();
        assert_eq!(r.rows, 2);
    }

    #[tokio::test]
    async fn empty_table_select_scenario_s4() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), false);
        p.handle_query("CREATE TABLE t (a INT)").await.unwrap();
        let r = p.handle_query("SELECT * FROM t").await.unwrap();
        assert_eq!(r.rows, 0);
        assert_eq!(r.meta.len(), 1);
        assert_eq!(r.meta[0].name, "a");
    }

    #[tokio::test]
    async fn vacuum_two_phase_scenario_s2() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), false);
        p.handle_query("CREATE TABLE t (a INT)").await.unwrap();
        p.handle_query("INSERT INTO t VALUES (1)").await.unwrap();
        p.handle_query("INSERT INTO t VALUES (2)").await.unwrap();

        p.handle_query("VACUUM t").await.unwrap();
        let log = p.table_log("t");
        let events = log.snapshot().await.unwrap();
        assert_eq!(crate::log::events::live_adds(&events).len(), 1);

        p.handle_query("VACUUM t").await.unwrap();
        let events = log.snapshot().await.unwrap();
        let tombstoned = events
            .iter()
            .filter(|e| matches!(e, crate::log::LogEvent::Remove(_)))
            .count();
        assert_eq!(tombstoned, 2);
    }

    #[test]
    fn parse_endpoint_scenario_s5() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), false);
        let r = p.parse("SELECT * FROM app.users");
        assert_eq!(r.operation, "select");
        assert_eq!(r.table.as_deref(), Some("app.users"));
    }

    #[test]
    fn splits_on_top_level_semicolons_only() {
        let parts = split_statements("SELECT ';' FROM t; SELECT 2;");
        assert_eq!(parts.len(), 2);
        assert!(parts[0].contains("';'"));
    }
}
