use async_trait::async_trait;
use bytes::Bytes;
use quarry_common::models::{ChartDescriptor, Dataset, ResultSet, Value};
use quarry_runtime::cache::{CacheError, CacheStore, QueryCache};
use quarry_runtime::gateway::{GatewayError, QueryBackend};
use quarry_runtime::security::RowSecurityResolver;
use quarry_runtime::store::InMemoryCatalog;
use quarry_runtime::{ChartExecutor, ChartExecutorOptions};
use quarry_sql::{CompiledQuery, CompilerOptions};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records every statement and answers with a fixed result.
#[derive(Default)]
pub struct MockBackend {
    calls: AtomicUsize,
    statements: Mutex<Vec<CompiledQuery>>,
    result: Option<ResultSet>,
    delay: Option<Duration>,
    fail: bool,
}

#[allow(dead_code)]
impl MockBackend {
    pub fn returning(result: ResultSet) -> Self {
        Self {
            result: Some(result),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_sql(&self) -> Option<String> {
        self.statements.lock().unwrap().last().map(|q| q.sql.clone())
    }
}

#[async_trait]
impl QueryBackend for MockBackend {
    async fn execute(&self, query: &CompiledQuery) -> Result<ResultSet, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.statements.lock().unwrap().push(query.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(GatewayError::Build("backend offline".into()));
        }
        Ok(self.result.clone().unwrap_or_else(|| ResultSet::new(vec![])))
    }
}

/// A cache store whose every operation fails.
#[allow(dead_code)]
pub struct FailingCacheStore;

#[async_trait]
impl CacheStore for FailingCacheStore {
    async fn get(&self, _: &str) -> Result<Option<Bytes>, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn set(&self, _: &str, _: Bytes, _: Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn delete(&self, _: &str) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }
}

#[allow(dead_code)]
pub fn region_rows() -> ResultSet {
    ResultSet::with_rows(
        vec!["region".into(), "revenue".into()],
        vec![
            vec![Value::Text("EU".into()), Value::Float64(1200.5)],
            vec![Value::Text("US".into()), Value::Float64(980.0)],
        ],
    )
}

/// One physical-table chart (`chart-revenue`) and one raw SQL chart (`chart-orders`).
pub fn catalog() -> InMemoryCatalog {
    let catalog = InMemoryCatalog::new();
    catalog.insert_dataset(Dataset::physical_table("ds-sales", "sales", "warehouse"));
    catalog.insert_dataset(Dataset::raw_sql(
        "ds-orders",
        "SELECT id, region, amount FROM orders",
        "warehouse",
    ));
    catalog.insert_chart(ChartDescriptor {
        id: "chart-revenue".into(),
        dataset_id: "ds-sales".into(),
        x_axis: Some(r#"{"fields": [{"name": "region"}]}"#.into()),
        y_axis: Some(r#"{"fields": [{"name": "revenue", "aggregate": "SUM", "sort": "DESC"}]}"#.into()),
    });
    catalog.insert_chart(ChartDescriptor {
        id: "chart-orders".into(),
        dataset_id: "ds-orders".into(),
        x_axis: Some(r#"{"fields": [{"name": "region"}]}"#.into()),
        y_axis: Some(r#"{"fields": [{"name": "*", "aggregate": "COUNT"}]}"#.into()),
    });
    catalog.insert_chart(ChartDescriptor {
        id: "chart-orphan".into(),
        dataset_id: "ds-deleted".into(),
        x_axis: None,
        y_axis: None,
    });
    catalog
}

#[allow(dead_code)]
pub fn executor(
    catalog: Arc<InMemoryCatalog>,
    security: Arc<dyn RowSecurityResolver>,
    backend: Arc<MockBackend>,
    cache: Option<Arc<QueryCache>>,
) -> ChartExecutor {
    ChartExecutor::new(ChartExecutorOptions {
        charts: catalog.clone(),
        datasets: catalog,
        security,
        backend,
        cache,
        compiler: CompilerOptions::default(),
        query_timeout: Duration::from_secs(5),
        log_literals: false,
    })
}
