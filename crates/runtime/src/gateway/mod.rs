//! Pooled execution of compiled SQL against the backing query endpoint.
//!
//! The gateway is built once at startup, shared through an `Arc` and closed at
//! shutdown. Failures are never retried here.

mod pool;
mod types;

use async_trait::async_trait;
use deadpool_postgres::{Pool, PoolError};
use quarry_common::config::GatewaySettings;
use quarry_common::models::ResultSet;
use quarry_error::{ErrorCode, ErrorContext, QuarryError};
use quarry_sql::CompiledQuery;
use std::sync::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tracing::{debug, info};

use types::{decode_cell, TextParam};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("No gateway URL configured")]
    NotConfigured,

    #[error("Invalid gateway URL: {0}")]
    InvalidUrl(#[source] tokio_postgres::Error),

    #[error("Failed to build connection pool: {0}")]
    Build(String),

    #[error("Connection pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Statement failed: {0}")]
    Statement(#[from] tokio_postgres::Error),

    #[error("Failed to decode column '{column}': {source}")]
    Decode {
        column: String,
        #[source]
        source: tokio_postgres::Error,
    },
}

fn db_message(e: &tokio_postgres::Error) -> String {
    e.as_db_error()
        .map(|db| db.message().to_string())
        .unwrap_or_else(|| e.to_string())
}

impl GatewayError {
    pub fn to_quarry_error(self) -> QuarryError {
        match self {
            GatewayError::NotConfigured => QuarryError::config(
                ErrorCode::InvalidConfiguration,
                "No gateway URL configured",
            )
            .with_hint("Set gateway.url or QUARRY__GATEWAY__URL"),
            GatewayError::InvalidUrl(e) => QuarryError::config(
                ErrorCode::InvalidConfiguration,
                format!("Invalid gateway URL: {}", e),
            ),
            GatewayError::Build(msg) => QuarryError::config(
                ErrorCode::InvalidConfiguration,
                format!("Failed to build connection pool: {}", msg),
            ),
            GatewayError::Pool(PoolError::Timeout(_)) => QuarryError::execution(
                ErrorCode::PoolExhausted,
                "Timed out waiting for a pooled connection",
            )
            .with_hint("Raise gateway.max_open or gateway.acquire_timeout_ms"),
            GatewayError::Pool(e) => QuarryError::execution(
                ErrorCode::ConnectionFailed,
                format!("Could not reach the query endpoint: {}", e),
            )
            .with_hint("Check that the query endpoint is reachable from this host"),
            GatewayError::Statement(e) if e.is_closed() => QuarryError::execution(
                ErrorCode::ConnectionFailed,
                format!("Connection to the query endpoint was lost: {}", e),
            ),
            GatewayError::Statement(e) => {
                let sql_state = e.code().map(|c| c.code().to_string());
                let code = if e.code() == Some(&SqlState::QUERY_CANCELED) {
                    ErrorCode::QueryTimedOut
                } else {
                    ErrorCode::StatementFailed
                };
                QuarryError::execution(code, db_message(&e)).with_context(
                    ErrorContext::Execution {
                        sql_state,
                        fingerprint: None,
                    },
                )
            }
            GatewayError::Decode { column, source } => QuarryError::execution(
                ErrorCode::RowDecodeFailed,
                format!("Failed to decode column '{}': {}", column, source),
            ),
        }
    }
}

impl From<GatewayError> for QuarryError {
    fn from(err: GatewayError) -> Self {
        err.to_quarry_error()
    }
}

fn caches_statement(params: &[String]) -> bool {
    !params.is_empty()
}

/// Anything able to run a compiled query and return rows.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    async fn execute(&self, query: &CompiledQuery) -> Result<ResultSet, GatewayError>;

    async fn ping(&self) -> Result<(), GatewayError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PoolStatus {
    pub max_size: usize,
    pub size: usize,
    pub available: i64,
    pub waiting: usize,
}

pub struct ExecutionGateway {
    pool: Pool,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl ExecutionGateway {
    /// Builds the pool and starts the idle reaper. Connections are opened lazily.
    /// Must be called from within a Tokio runtime.
    pub fn connect(settings: &GatewaySettings) -> Result<Self, GatewayError> {
        let pool = pool::build_pool(settings)?;
        let reaper = pool::spawn_idle_reaper(pool.clone(), settings);

        info!(
            target: "gateway",
            max_open = settings.max_open,
            max_idle = settings.max_idle,
            max_lifetime_secs = settings.max_lifetime_secs,
            acquire_timeout_ms = settings.acquire_timeout_ms,
            "Execution gateway initialized"
        );

        Ok(Self {
            pool,
            reaper: Mutex::new(Some(reaper)),
        })
    }

    /// Runs `sql` with text-format positional parameters.
    ///
    /// Statements are cached on the connection only when values arrive as
    /// parameters; inline SQL text differs per filter value and is prepared
    /// once, then closed when the statement is dropped.
    ///
    /// Dropping the returned future returns the borrowed connection to the pool.
    pub async fn execute(&self, sql: &str, params: &[String]) -> Result<ResultSet, GatewayError> {
        let client = self.pool.get().await?;
        let statement = if caches_statement(params) {
            client.prepare_cached(sql).await?
        } else {
            client.prepare(sql).await?
        };

        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let bound: Vec<TextParam<'_>> = params.iter().map(|p| TextParam(p)).collect();
        let refs: Vec<&(dyn ToSql + Sync)> =
            bound.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let rows = client.query(&statement, &refs).await?;

        let mut result = ResultSet::new(columns);
        for row in &rows {
            let mut cells = Vec::with_capacity(row.len());
            for idx in 0..row.len() {
                let value = decode_cell(row, idx).map_err(|source| GatewayError::Decode {
                    column: row.columns()[idx].name().to_string(),
                    source,
                })?;
                cells.push(value);
            }
            result.push_row(cells);
        }

        debug!(target: "gateway", rows = result.num_rows(), "Statement executed");
        Ok(result)
    }

    pub async fn ping(&self) -> Result<(), GatewayError> {
        let client = self.pool.get().await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    pub fn status(&self) -> PoolStatus {
        let status = self.pool.status();
        PoolStatus {
            max_size: status.max_size,
            size: status.size,
            available: status.available as i64,
            waiting: status.waiting,
        }
    }

    /// Stops the reaper and closes the pool. Checked-out connections are
    /// dropped when returned.
    pub fn close(&self) {
        if let Ok(mut reaper) = self.reaper.lock() {
            if let Some(handle) = reaper.take() {
                handle.abort();
            }
        }
        self.pool.close();
        info!(target: "gateway", "Execution gateway closed");
    }
}

#[async_trait]
impl QueryBackend for ExecutionGateway {
    async fn execute(&self, query: &CompiledQuery) -> Result<ResultSet, GatewayError> {
        ExecutionGateway::execute(self, &query.sql, &query.params).await
    }

    async fn ping(&self) -> Result<(), GatewayError> {
        ExecutionGateway::ping(self).await
    }
}
