use crate::metrics::{QUERY_COUNT, QUERY_DURATION, QUERY_ERRORS};
use axum::{
    extract::{rejection::JsonRejection, FromRequestParts, Path, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use quarry_common::auth::SecurityContext;
use quarry_common::models::{QueryRequest, ResultSet};
use quarry_error::{ErrorCode, ErrorContext, QuarryError};
use quarry_runtime::cache::Fingerprint;
use quarry_runtime::ChartExecutor;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

pub const USER_ID_HEADER: &str = "x-user-id";
/// Only consulted by resolvers built without a role directory.
pub const USER_ROLES_HEADER: &str = "x-user-roles";
pub const CACHE_STATUS_HEADER: &str = "x-quarry-cache";
pub const FINGERPRINT_HEADER: &str = "x-quarry-fingerprint";

/// A [`QuarryError`] rendered as its JSON form with the mapped HTTP status.
#[derive(Debug)]
pub struct ApiError(pub QuarryError);

impl From<QuarryError> for ApiError {
    fn from(err: QuarryError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            [(header::CONTENT_TYPE, "application/json")],
            self.0.to_json(),
        )
            .into_response()
    }
}

/// The caller as established by the upstream authentication layer.
pub struct Identity(pub SecurityContext);

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        identity_from_headers(&parts.headers).map(Identity)
    }
}

fn identity_from_headers(headers: &HeaderMap) -> Result<SecurityContext, ApiError> {
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            QuarryError::new(
                ErrorCode::MissingIdentity,
                format!("Missing '{}' header", USER_ID_HEADER),
            )
            .with_hint("Requests must pass through the authentication proxy")
        })?;

    let roles = headers
        .get(USER_ROLES_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(String::from)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    Ok(SecurityContext::new(user_id).with_roles(roles))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDataResponse {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub row_count: usize,
    pub fingerprint: String,
    pub cache: &'static str,
}

impl ChartDataResponse {
    fn new(result: &ResultSet, fingerprint: &Fingerprint, cache: &'static str) -> Self {
        Self {
            columns: result.columns.clone(),
            rows: result
                .rows
                .iter()
                .map(|row| row.iter().map(|v| v.to_json()).collect())
                .collect(),
            row_count: result.num_rows(),
            fingerprint: fingerprint.to_string(),
            cache,
        }
    }
}

/// Routes mounted under `/api/v1`.
pub fn create_api_router(executor: Arc<ChartExecutor>) -> Router {
    Router::new()
        .route("/charts/{chart_id}/data", post(chart_data))
        .route("/cache/{fingerprint}", delete(invalidate_cache))
        .with_state(executor)
}

/// The complete application: health, metrics and the versioned API.
pub fn create_router(executor: Arc<ChartExecutor>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(executor.clone())
        .nest("/api/v1", create_api_router(executor))
}

async fn chart_data(
    State(executor): State<Arc<ChartExecutor>>,
    Path(chart_id): Path<String>,
    Identity(context): Identity,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|e| {
        QuarryError::config(
            ErrorCode::InvalidFilter,
            format!("Invalid request body: {}", e.body_text()),
        )
        .with_context(ErrorContext::Chart {
            chart_id: chart_id.clone(),
        })
    })?;

    let start = Instant::now();
    let outcome = executor.execute(&chart_id, &request, &context).await;
    QUERY_DURATION.observe(start.elapsed().as_secs_f64());

    let chart = outcome.map_err(|err| {
        let code = err.code.as_str();
        QUERY_ERRORS.with_label_values(&[code.as_str()]).inc();
        ApiError(err)
    })?;

    let cache = chart.cache_status.as_str();
    QUERY_COUNT.with_label_values(&[cache]).inc();

    let body = ChartDataResponse::new(&chart.result, &chart.fingerprint, cache);
    let mut response = Json(body).into_response();
    let headers = response.headers_mut();
    headers.insert(CACHE_STATUS_HEADER, HeaderValue::from_static(cache));
    if let Ok(fp) = HeaderValue::from_str(chart.fingerprint.as_str()) {
        headers.insert(FINGERPRINT_HEADER, fp);
    }
    Ok(response)
}

async fn invalidate_cache(
    State(executor): State<Arc<ChartExecutor>>,
    Identity(context): Identity,
    Path(fingerprint): Path<String>,
) -> Result<StatusCode, ApiError> {
    let fp = Fingerprint::parse(&fingerprint).ok_or_else(|| {
        QuarryError::config(
            ErrorCode::InvalidFilter,
            format!("'{}' is not a query fingerprint", fingerprint),
        )
        .with_hint("Fingerprints look like 'query:<64 hex chars>'")
    })?;

    executor.invalidate(&fp).await?;
    tracing::info!(target: "cache", key = %fp, user_id = %context.user_id, "Cache entry invalidated");
    Ok(StatusCode::NO_CONTENT)
}

async fn health_handler(State(executor): State<Arc<ChartExecutor>>) -> Response {
    let cache = executor.cache_stats().await.map(|stats| {
        json!({
            "entries": stats.entry_count,
            "ttlSecs": stats.ttl.as_secs(),
        })
    });

    match executor.ping_backend().await {
        Ok(()) => Json(json!({
            "status": "ok",
            "activeQueries": executor.active_queries(),
            "cache": cache,
        }))
        .into_response(),
        Err(err) => {
            tracing::warn!(target: "gateway", error = %err, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unavailable",
                    "error": err,
                })),
            )
                .into_response()
        }
    }
}

async fn metrics_handler() -> Response {
    match crate::metrics::encode() {
        Ok((content_type, buffer)) => {
            ([(header::CONTENT_TYPE, content_type)], buffer).into_response()
        }
        Err(e) => ApiError(QuarryError::new(
            ErrorCode::Internal,
            format!("Failed to encode metrics: {}", e),
        ))
        .into_response(),
    }
}
