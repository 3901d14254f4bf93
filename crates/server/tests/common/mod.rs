use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use quarry_common::models::{ChartDescriptor, Dataset, ResultSet, Value};
use quarry_runtime::cache::QueryCache;
use quarry_runtime::gateway::{GatewayError, QueryBackend};
use quarry_runtime::security::StaticRowSecurity;
use quarry_runtime::store::InMemoryCatalog;
use quarry_runtime::{ChartExecutor, ChartExecutorOptions};
use quarry_sql::{CompiledQuery, CompilerOptions};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
pub struct CountingBackend {
    pub calls: AtomicUsize,
    pub down: bool,
}

#[async_trait]
impl QueryBackend for CountingBackend {
    async fn execute(&self, _query: &CompiledQuery) -> Result<ResultSet, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ResultSet::with_rows(
            vec!["region".into(), "revenue".into()],
            vec![
                vec![Value::Text("EU".into()), Value::Float64(10.5)],
                vec![Value::Text("US".into()), Value::Int64(7)],
            ],
        ))
    }

    async fn ping(&self) -> Result<(), GatewayError> {
        if self.down {
            Err(GatewayError::NotConfigured)
        } else {
            Ok(())
        }
    }
}

impl CountingBackend {
    #[allow(dead_code)]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn executor(backend: Arc<CountingBackend>) -> Arc<ChartExecutor> {
    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.insert_dataset(Dataset::physical_table("ds-sales", "sales", "warehouse"));
    catalog.insert_chart(ChartDescriptor {
        id: "chart-revenue".into(),
        dataset_id: "ds-sales".into(),
        x_axis: Some(r#"{"fields": [{"name": "region"}]}"#.into()),
        y_axis: Some(r#"{"fields": [{"name": "revenue", "aggregate": "SUM"}]}"#.into()),
    });

    let security = StaticRowSecurity::new().with_predicate("u-eu", "ds-sales", "region = 'EU'");

    Arc::new(ChartExecutor::new(ChartExecutorOptions {
        charts: catalog.clone(),
        datasets: catalog,
        security: Arc::new(security),
        backend,
        cache: Some(Arc::new(QueryCache::in_memory(100, Duration::from_secs(60)))),
        compiler: CompilerOptions::default(),
        query_timeout: Duration::from_secs(5),
        log_literals: false,
    }))
}

#[allow(dead_code)]
pub fn chart_request(chart_id: &str, user: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/api/v1/charts/{}/data", chart_id))
        .header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
