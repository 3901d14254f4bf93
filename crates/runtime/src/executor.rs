//! The chart execution pipeline.
//!
//! load descriptors -> decode field spec -> resolve row security -> compile
//! -> fingerprint -> cache lookup -> execute under deadline -> cache store.

use crate::cache::{CacheStats, Fingerprint, QueryCache};
use crate::gateway::QueryBackend;
use crate::security::RowSecurityResolver;
use crate::store::{ChartStore, DatasetStore};
use quarry_common::auth::SecurityContext;
use quarry_common::models::{QueryRequest, ResultSet};
use quarry_common::scrubber::scrub_sql;
use quarry_error::{ErrorCode, ErrorContext, QuarryError};
use quarry_sql::{CompiledQuery, Compiler, CompilerOptions, FieldSpec};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    /// No cache configured.
    Bypass,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
            CacheStatus::Bypass => "bypass",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChartResult {
    pub result: ResultSet,
    pub fingerprint: Fingerprint,
    pub cache_status: CacheStatus,
}

pub struct ChartExecutorOptions {
    pub charts: Arc<dyn ChartStore>,
    pub datasets: Arc<dyn DatasetStore>,
    pub security: Arc<dyn RowSecurityResolver>,
    pub backend: Arc<dyn QueryBackend>,
    pub cache: Option<Arc<QueryCache>>,
    pub compiler: CompilerOptions,
    pub query_timeout: Duration,
    /// Log filter literals verbatim instead of masking them.
    pub log_literals: bool,
}

pub struct ChartExecutor {
    charts: Arc<dyn ChartStore>,
    datasets: Arc<dyn DatasetStore>,
    security: Arc<dyn RowSecurityResolver>,
    backend: Arc<dyn QueryBackend>,
    cache: Option<Arc<QueryCache>>,
    compiler: Compiler,
    query_timeout: Duration,
    log_literals: bool,
    active_queries: Arc<AtomicUsize>,
}

struct ActiveQuery<'a>(&'a AtomicUsize);

impl<'a> ActiveQuery<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for ActiveQuery<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// What the `queries` log event needs besides the outcome.
struct QueryLog<'a> {
    context: &'a SecurityContext,
    chart_id: &'a str,
    dataset_id: &'a str,
    query: &'a CompiledQuery,
    fingerprint: &'a Fingerprint,
    start: Instant,
}

impl ChartExecutor {
    pub fn new(options: ChartExecutorOptions) -> Self {
        Self {
            charts: options.charts,
            datasets: options.datasets,
            security: options.security,
            backend: options.backend,
            cache: options.cache,
            compiler: Compiler::new(options.compiler),
            query_timeout: options.query_timeout,
            log_literals: options.log_literals,
            active_queries: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn active_queries(&self) -> usize {
        self.active_queries.load(Ordering::Relaxed)
    }

    /// Runs one chart on behalf of `context`.
    ///
    /// Cache failures are logged and never surface; every other failure does.
    pub async fn execute(
        &self,
        chart_id: &str,
        request: &QueryRequest,
        context: &SecurityContext,
    ) -> quarry_error::Result<ChartResult> {
        let _active = ActiveQuery::enter(&self.active_queries);
        self.execute_with_cache(chart_id, request, context).await
    }

    async fn execute_with_cache(
        &self,
        chart_id: &str,
        request: &QueryRequest,
        context: &SecurityContext,
    ) -> quarry_error::Result<ChartResult> {
        let start = Instant::now();

        if context.is_anonymous() {
            return Err(QuarryError::new(
                ErrorCode::MissingIdentity,
                "Chart requests require a user identity",
            ));
        }

        let chart = self.charts.chart(chart_id).await?.ok_or_else(|| {
            QuarryError::config(
                ErrorCode::ChartNotFound,
                format!("Chart '{}' not found", chart_id),
            )
            .with_context(ErrorContext::Chart {
                chart_id: chart_id.to_string(),
            })
        })?;

        let dataset = self
            .datasets
            .dataset(&chart.dataset_id)
            .await?
            .ok_or_else(|| {
                QuarryError::config(
                    ErrorCode::DatasetNotFound,
                    format!("Dataset '{}' not found", chart.dataset_id),
                )
                .with_context(ErrorContext::Dataset {
                    dataset_id: chart.dataset_id.clone(),
                    kind: None,
                })
                .with_hint("The chart references a dataset that no longer exists")
            })?;

        let spec = FieldSpec::decode(chart.x_axis.as_deref(), chart.y_axis.as_deref())?;

        let predicate = self
            .security
            .resolve(context, &dataset.id)
            .await
            .map_err(|e| {
                warn!(
                    target: "security",
                    user_id = %context.user_id,
                    dataset_id = %dataset.id,
                    error = %e,
                    "Row security resolution failed, refusing to execute"
                );
                e.to_quarry_error()
            })?;

        let query = self.compiler.compile(
            &dataset,
            &spec,
            &request.filters,
            &predicate,
            request.limit,
            request.offset,
        )?;
        let fingerprint = Fingerprint::of(&query);

        let log = QueryLog {
            context,
            chart_id,
            dataset_id: &dataset.id,
            query: &query,
            fingerprint: &fingerprint,
            start,
        };

        // --- Cache Lookup START ---
        if let Some(cache) = &self.cache {
            match cache.get(&fingerprint).await {
                Ok(Some(result)) => {
                    self.log_success(&log, result.num_rows(), true);
                    return Ok(ChartResult {
                        result,
                        fingerprint,
                        cache_status: CacheStatus::Hit,
                    });
                }
                Ok(None) => {}
                Err(e) => warn!(
                    target: "cache",
                    key = %fingerprint,
                    error = %e,
                    "Cache lookup failed, executing directly"
                ),
            }
        }
        // --- Cache Lookup END ---

        let result = match tokio::time::timeout(self.query_timeout, self.backend.execute(&query)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                let err = with_fingerprint(e.to_quarry_error(), &fingerprint);
                self.log_failure(&log, &err);
                return Err(err);
            }
            Err(_) => {
                let err = QuarryError::execution(
                    ErrorCode::QueryTimedOut,
                    format!(
                        "Query timed out after {} seconds",
                        self.query_timeout.as_secs()
                    ),
                )
                .with_context(ErrorContext::Execution {
                    sql_state: None,
                    fingerprint: Some(fingerprint.to_string()),
                })
                .with_hint("Narrow the chart filters or increase 'query.timeout_secs' in config");
                self.log_failure(&log, &err);
                return Err(err);
            }
        };

        // --- Cache Store START ---
        let cache_status = match &self.cache {
            Some(cache) => {
                if let Err(e) = cache.put(&fingerprint, &result).await {
                    warn!(
                        target: "cache",
                        key = %fingerprint,
                        error = %e,
                        "Failed to cache query result"
                    );
                }
                CacheStatus::Miss
            }
            None => CacheStatus::Bypass,
        };
        // --- Cache Store END ---

        self.log_success(&log, result.num_rows(), false);

        Ok(ChartResult {
            result,
            fingerprint,
            cache_status,
        })
    }

    /// Drops one cached result. A no-op without a cache.
    pub async fn invalidate(&self, fingerprint: &Fingerprint) -> quarry_error::Result<()> {
        match &self.cache {
            Some(cache) => cache
                .invalidate(fingerprint)
                .await
                .map_err(|e| e.to_quarry_error()),
            None => Ok(()),
        }
    }

    pub async fn cache_stats(&self) -> Option<CacheStats> {
        match &self.cache {
            Some(cache) => Some(cache.stats().await),
            None => None,
        }
    }

    /// Checks that the backing endpoint answers.
    pub async fn ping_backend(&self) -> quarry_error::Result<()> {
        self.backend.ping().await.map_err(|e| e.to_quarry_error())
    }

    fn log_success(&self, log: &QueryLog<'_>, rows: usize, cache_hit: bool) {
        info!(
            target: "queries",
            user_id = %log.context.user_id,
            chart_id = %log.chart_id,
            dataset_id = %log.dataset_id,
            fingerprint = %log.fingerprint,
            query = %scrub_sql(&log.query.sql, self.log_literals),
            duration_ms = log.start.elapsed().as_millis() as u64,
            rows_returned = rows,
            cache_hit,
            success = true
        );
    }

    fn log_failure(&self, log: &QueryLog<'_>, err: &QuarryError) {
        info!(
            target: "queries",
            user_id = %log.context.user_id,
            chart_id = %log.chart_id,
            dataset_id = %log.dataset_id,
            fingerprint = %log.fingerprint,
            query = %scrub_sql(&log.query.sql, self.log_literals),
            duration_ms = log.start.elapsed().as_millis() as u64,
            cache_hit = false,
            success = false,
            error_code = %err.code
        );
    }
}

fn with_fingerprint(mut err: QuarryError, fp: &Fingerprint) -> QuarryError {
    match &mut err.context {
        Some(ErrorContext::Execution { fingerprint, .. }) => {
            *fingerprint = Some(fp.to_string());
        }
        None => {
            err.context = Some(ErrorContext::Execution {
                sql_state: None,
                fingerprint: Some(fp.to_string()),
            });
        }
        Some(_) => {}
    }
    err
}
