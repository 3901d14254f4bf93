//! Quarry Server: the HTTP layer over the chart executor.
//!
//! - **REST**: `POST /api/v1/charts/{chart_id}/data`, `DELETE /api/v1/cache/{fingerprint}`.
//! - **Observability**: `/health`, Prometheus `/metrics`, structured logs and optional OTLP tracing.
use anyhow::Context;
use quarry_common::config::{AppConfig, CacheBackend, CacheSettings};
use quarry_runtime::cache::{QueryCache, RedisCacheStore};
use quarry_runtime::gateway::ExecutionGateway;
use quarry_runtime::security::PolicyRowSecurityResolver;
use quarry_runtime::{ChartExecutor, ChartExecutorOptions};
use quarry_sql::CompilerOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub mod api;
pub mod metadata;
pub mod metrics;

pub use api::{create_api_router, create_router, ApiError, Identity};
pub use metadata::PgMetadataStore;

pub struct QuarryServer {
    config_path: String,
}

impl Default for QuarryServer {
    fn default() -> Self {
        Self {
            config_path: "config/quarry.yaml".to_string(),
        }
    }
}

impl QuarryServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config_path: impl Into<String>) -> Self {
        self.config_path = config_path.into();
        self
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let config = AppConfig::from_file(&self.config_path)?;
        quarry_common::telemetry::init_tracing(&config.logging, &config.telemetry)?;
        metrics::register_all();

        let gateway = Arc::new(
            ExecutionGateway::connect(&config.gateway)
                .context("Failed to initialize execution gateway")?,
        );
        let metadata = Arc::new(PgMetadataStore::connect(&config.metadata)?);

        let security =
            PolicyRowSecurityResolver::new(metadata.clone()).with_role_directory(metadata.clone());

        let cache = build_cache(&config.cache).await?;

        let executor = Arc::new(ChartExecutor::new(ChartExecutorOptions {
            charts: metadata.clone(),
            datasets: metadata,
            security: Arc::new(security),
            backend: gateway.clone(),
            cache,
            compiler: CompilerOptions::from(&config.compiler),
            query_timeout: Duration::from_secs(config.query.timeout_secs),
            log_literals: config.logging.log_literals,
        }));

        let refresher = spawn_metrics_refresh(executor.clone(), gateway.clone());

        let addr: SocketAddr = config
            .server
            .listen_addr
            .parse()
            .with_context(|| format!("Invalid server.listen_addr '{}'", config.server.listen_addr))?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        info!(
            name = %config.server.name,
            %addr,
            cache_enabled = config.cache.enabled,
            cache_backend = ?config.cache.backend,
            query_timeout_secs = config.query.timeout_secs,
            "Quarry server listening"
        );

        axum::serve(listener, create_router(executor))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server error")?;

        info!("Shutting down");
        refresher.abort();
        gateway.close();
        quarry_common::telemetry::shutdown_telemetry();
        Ok(())
    }
}

/// `None` when caching is disabled. An unreachable Redis is logged, not fatal.
async fn build_cache(settings: &CacheSettings) -> anyhow::Result<Option<Arc<QueryCache>>> {
    if !settings.enabled {
        return Ok(None);
    }
    let ttl = Duration::from_secs(settings.ttl_secs);
    let cache = match settings.backend {
        CacheBackend::Memory => QueryCache::in_memory(settings.max_entries, ttl),
        CacheBackend::Redis => {
            let store = RedisCacheStore::connect(&settings.redis)
                .context("Failed to initialize redis cache")?;
            if let Err(e) = store.ping().await {
                warn!(
                    target: "cache",
                    error = %e,
                    "Redis cache unreachable at startup, queries run uncached until it recovers"
                );
            }
            QueryCache::new(Arc::new(store), ttl)
        }
    };
    Ok(Some(Arc::new(cache)))
}

fn spawn_metrics_refresh(
    executor: Arc<ChartExecutor>,
    gateway: Arc<ExecutionGateway>,
) -> JoinHandle<()> {
    let start_time = std::time::Instant::now();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(metrics::METRICS_REFRESH_INTERVAL).await;

            let active = executor.active_queries();
            let pool = gateway.status();
            metrics::ACTIVE_QUERIES.set(active as i64);
            metrics::POOL_SIZE.set(pool.size as i64);
            metrics::POOL_WAITING.set(pool.waiting as i64);

            info!(
                target: "metrics",
                active_queries = active,
                pool_size = pool.size,
                pool_available = pool.available,
                pool_waiting = pool.waiting,
                uptime_seconds = start_time.elapsed().as_secs(),
            );
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
