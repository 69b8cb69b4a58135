//! Engine Session (C3): wraps an embedded DataFusion `SessionContext` —
//! this corpus's standard in-process analytical engine (see
//! `adapters/datafusion_handler.rs`) — substituting for the Delta-aware
//! engine spec.md §9 describes, per its explicitly sanctioned fallback:
//! read via a multi-file Parquet scan over the live set, compute stats
//! manually, accept no log-stats pushdown.

mod marshal;
mod stats;
mod udfs;

pub use marshal::{engine_type_name, ColumnMeta};
pub use stats::compute_delta_stats;

use datafusion::catalog::MemorySchemaProvider;
use datafusion::prelude::{ParquetReadOptions, SessionContext};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine error: {0}")]
    DataFusion(#[from] datafusion::error::DataFusionError),
}

pub struct QueryResult {
    pub meta: Vec<ColumnMeta>,
    pub rows: Vec<Vec<String>>,
    pub elapsed: std::time::Duration,
}

/// A process-wide DataFusion session with UDFs registered once at startup.
pub struct EngineSession {
    ctx: SessionContext,
}

impl EngineSession {
    pub fn new() -> Self {
        let ctx = SessionContext::new();
        udfs::register(&ctx);
        Self { ctx }
    }

    /// Begin a request-scoped transaction: a fresh, isolated catalog schema
    /// so table/view names registered in one request never leak into the
    /// next (spec.md §9's "detach and reattach its in-memory catalog").
    /// Rolled back (the schema dropped) automatically on scope exit.
    pub fn begin(&self) -> EngineTransaction<'_> {
        let schema_name = format!(
            "tx_{}",
            crate::id::to_canonical_string(crate::id::new_uuid_v7()).replace('-', "")
        );

        let catalog = self
            .ctx
            .catalog(&self.ctx.state().config().options().catalog.default_catalog.clone())
            .expect("default catalog is always registered");
        catalog
            .register_schema(&schema_name, Arc::new(MemorySchemaProvider::new()))
            .expect("register ephemeral schema");

        let previous_schema = {
            let mut state = self.ctx.state_ref().write();
            let previous = state.config().options().catalog.default_schema.clone();
            state.config_mut().options_mut().catalog.default_schema = schema_name.clone();
            previous
        };

        EngineTransaction {
            session: self,
            schema_name,
            previous_schema,
        }
    }
}

impl Default for EngineSession {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for one request's engine transaction.
pub struct EngineTransaction<'a> {
    session: &'a EngineSession,
    schema_name: String,
    previous_schema: String,
}

impl<'a> EngineTransaction<'a> {
    pub fn qualify(&self, table: &str) -> String {
        format!("{}.{}", self.schema_name, table)
    }

    pub async fn execute(&self, stmt: &str) -> Result<QueryResult, EngineError> {
        let started = Instant::now();
        let df = self.session.ctx.sql(stmt).await?;
        let schema = df.schema().inner().clone();
        let batches = df.collect().await?;
        let meta = marshal::schema_to_meta(&batches, &schema);
        let rows = marshal::batches_to_rows(&batches);
        Ok(QueryResult {
            meta,
            rows,
            elapsed: started.elapsed(),
        })
    }

    /// Register `name` as a view reading Parquet files at `read_urls`.
    pub async fn create_view(&self, name: &str, read_urls: &[String]) -> Result<(), EngineError> {
        let df = self
            .session
            .ctx
            .read_parquet(read_urls.to_vec(), ParquetReadOptions::default())
            .await?;
        let qualified = self.qualify(name);
        self.session.ctx.deregister_table(&qualified).ok();
        self.session.ctx.register_table(qualified.as_str(), df.into_view())?;
        Ok(())
    }

    /// Run a previously-captured `CREATE TABLE` statement to reconstruct an
    /// empty table of the right shape in this transaction's schema.
    pub async fn create_table_from_ddl(&self, ddl: &str) -> Result<(), EngineError> {
        self.session.ctx.sql(ddl).await?.collect().await?;
        Ok(())
    }

    pub async fn compute_delta_stats(&self, table: &str) -> Result<serde_json::Value, EngineError> {
        stats::compute_delta_stats(&self.session.ctx, &self.qualify(table)).await
    }

    pub fn ctx(&self) -> &SessionContext {
        &self.session.ctx
    }
}

impl<'a> Drop for EngineTransaction<'a> {
    fn drop(&mut self) {
        let mut state = self.session.ctx.state_ref().write();
        state.config_mut().options_mut().catalog.default_schema = self.previous_schema.clone();
        drop(state);

        if let Ok(catalog) = self
            .session
            .ctx
            .catalog(&self.session.ctx.state().config().options().catalog.default_catalog.clone())
            .ok_or(())
        {
            let _ = catalog.deregister_schema(&self.schema_name, true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transaction_schema_does_not_leak_across_requests() {
        let session = EngineSession::new();
        {
            let tx = session.begin();
            tx.create_table_from_ddl("CREATE TABLE scratch (a INT)")
                .await
                .unwrap();
            let result = tx.execute("SELECT a FROM scratch").await.unwrap();
            assert_eq!(result.rows.len(), 0);
        }

        let tx = session.begin();
        let err = tx.execute("SELECT a FROM scratch").await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn uuidv7_and_uuid_v7_time_round_trip() {
        let session = EngineSession::new();
        let tx = session.begin();
        let result = tx
            .execute("SELECT uuidv7() AS id")
            .await
            .unwrap();
        let id = result.rows[0][0].clone();

        let result2 = tx
            .execute(&format!("SELECT uuid_v7_time('{id}') AS ms"))
            .await
            .unwrap();
        let ms: i64 = result2.rows[0][0].parse().unwrap();

        let parsed = uuid::Uuid::parse_str(&id).unwrap();
        assert_eq!(crate::id::uuid_v7_time_ms(parsed).unwrap(), ms);
    }
}
