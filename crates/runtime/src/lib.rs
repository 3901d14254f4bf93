//! Runtime side of Quarry: everything between a compiled query and a result set.
//!
//! - **Cache**: fingerprinted, TTL-bounded result caching over a pluggable byte store (`cache`).
//! - **Gateway**: pooled execution against the backing SQL endpoint (`gateway`).
//! - **Security**: row security predicate resolution (`security`).
//! - **Stores**: chart and dataset descriptor lookup (`store`).
//! - **Executor**: the `execute(chart_id, request, security_context)` pipeline (`executor`).
pub mod cache;
pub mod executor;
pub mod gateway;
pub mod security;
pub mod store;

pub use executor::{CacheStatus, ChartExecutor, ChartExecutorOptions, ChartResult};
