//! Prometheus metrics exposed on `/metrics`.

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::time::Duration;

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub const METRICS_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

pub static QUERY_COUNT: Lazy<IntCounterVec> = Lazy::new(|| {
    let opts = Opts::new("quarry_chart_queries_total", "Chart queries by cache outcome");
    let counter = IntCounterVec::new(opts, &["cache"]).unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

pub static QUERY_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    let opts = Opts::new("quarry_chart_query_errors_total", "Failed chart queries by error code");
    let counter = IntCounterVec::new(opts, &["code"]).unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

pub static QUERY_DURATION: Lazy<Histogram> = Lazy::new(|| {
    let opts = HistogramOpts::new(
        "quarry_chart_query_duration_seconds",
        "End-to-end chart query latency",
    );
    let histogram = Histogram::with_opts(opts).unwrap();
    REGISTRY.register(Box::new(histogram.clone())).unwrap();
    histogram
});

pub static ACTIVE_QUERIES: Lazy<IntGauge> = Lazy::new(|| {
    let opts = Opts::new("quarry_active_queries", "Number of chart queries in flight");
    let gauge = IntGauge::with_opts(opts).unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

pub static POOL_SIZE: Lazy<IntGauge> = Lazy::new(|| {
    let opts = Opts::new("quarry_gateway_pool_size", "Open connections to the query endpoint");
    let gauge = IntGauge::with_opts(opts).unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

pub static POOL_WAITING: Lazy<IntGauge> = Lazy::new(|| {
    let opts = Opts::new("quarry_gateway_pool_waiting", "Requests waiting for a connection");
    let gauge = IntGauge::with_opts(opts).unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Forces registration so every series shows up before its first sample.
pub fn register_all() {
    Lazy::force(&QUERY_COUNT);
    Lazy::force(&QUERY_ERRORS);
    Lazy::force(&QUERY_DURATION);
    Lazy::force(&ACTIVE_QUERIES);
    Lazy::force(&POOL_SIZE);
    Lazy::force(&POOL_WAITING);
}

/// Text exposition of the registry plus its content type.
pub fn encode() -> Result<(String, Vec<u8>), prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok((encoder.format_type().to_string(), buffer))
}
