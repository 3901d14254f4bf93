use super::GatewayError;
use deadpool_postgres::{
    Hook, HookError, Manager, ManagerConfig, Pool, RecyclingMethod, Runtime,
};
use quarry_common::config::GatewaySettings;
use secrecy::ExposeSecret;
use std::cell::Cell;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_postgres::NoTls;

pub(crate) fn build_pool(settings: &GatewaySettings) -> Result<Pool, GatewayError> {
    let url = settings.url.as_ref().ok_or(GatewayError::NotConfigured)?;
    let mut pg_config: tokio_postgres::Config = url
        .expose_secret()
        .parse()
        .map_err(GatewayError::InvalidUrl)?;

    pg_config.application_name("quarry");
    pg_config.connect_timeout(Duration::from_millis(settings.connect_timeout_ms));
    if let Some(ms) = settings.statement_timeout_ms {
        pg_config.options(&format!("-c statement_timeout={}", ms));
    }

    let manager = Manager::from_config(
        pg_config,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );

    let max_lifetime = Duration::from_secs(settings.max_lifetime_secs);

    Pool::builder(manager)
        .max_size(settings.max_open)
        .runtime(Runtime::Tokio1)
        .wait_timeout(Some(Duration::from_millis(settings.acquire_timeout_ms)))
        .create_timeout(Some(Duration::from_millis(settings.connect_timeout_ms)))
        .pre_recycle(Hook::sync_fn(move |_client, metrics| {
            if metrics.age() > max_lifetime {
                Err(HookError::Message("connection exceeded max lifetime".into()))
            } else {
                Ok(())
            }
        }))
        .build()
        .map_err(|e| GatewayError::Build(e.to_string()))
}

/// Periodically trims idle connections down to `max_idle` and drops those
/// older than `max_lifetime`.
pub(crate) fn spawn_idle_reaper(pool: Pool, settings: &GatewaySettings) -> JoinHandle<()> {
    let max_idle = settings.max_idle;
    let max_lifetime = Duration::from_secs(settings.max_lifetime_secs);
    let period = Duration::from_secs(settings.idle_reap_interval_secs);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if pool.is_closed() {
                break;
            }

            let kept = Cell::new(0usize);
            let before = pool.status().size;
            let _ = pool.retain(|_, metrics| {
                if metrics.age() > max_lifetime || kept.get() >= max_idle {
                    return false;
                }
                kept.set(kept.get() + 1);
                true
            });

            let after = pool.status().size;
            if after < before {
                tracing::debug!(
                    target: "gateway",
                    closed = before - after,
                    idle_kept = kept.get(),
                    "Reaped idle connections"
                );
            }
        }
    })
}
