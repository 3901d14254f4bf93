//! Chart, dataset and row policy lookups against the metadata database.

use anyhow::Context;
use async_trait::async_trait;
use deadpool_postgres::{Object, Pool, PoolError};
use quarry_common::config::MetadataSettings;
use quarry_common::models::{ChartDescriptor, Dataset};
use quarry_error::{ErrorCode, QuarryError};
use quarry_runtime::security::{PolicyTarget, RoleDirectory, RowPolicy, RowPolicyStore};
use quarry_runtime::store::{ChartStore, DatasetStore};
use secrecy::ExposeSecret;
use tokio_postgres::types::FromSql;
use tokio_postgres::Row;
use thiserror::Error;
use tracing::debug;

const CHART_QUERY: &str =
    "SELECT id, table_id, x_axis, y_axis FROM core_chart_view WHERE id = $1";

const DATASET_QUERY: &str =
    "SELECT id, type, table_name, info, datasource_id FROM core_dataset_table WHERE id = $1";

const POLICY_QUERY: &str = "SELECT id, dataset_id, auth_target_type, auth_target_id, \
     where_condition, express_type, enable \
     FROM dataset_row_permissions WHERE dataset_id = $1 ORDER BY id";

const ROLE_QUERY: &str = "SELECT role_id FROM sys_user_role WHERE user_id = $1 ORDER BY role_id";

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Metadata pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Metadata query failed: {0}")]
    Query(#[from] tokio_postgres::Error),

    #[error("Unreadable metadata column '{column}': {source}")]
    Column {
        column: &'static str,
        #[source]
        source: tokio_postgres::Error,
    },
}

/// Reads column `name` without panicking on a type or name mismatch.
fn column<'a, T: FromSql<'a>>(row: &'a Row, name: &'static str) -> Result<T, MetadataError> {
    row.try_get(name)
        .map_err(|source| MetadataError::Column { column: name, source })
}

impl MetadataError {
    pub fn to_quarry_error(self) -> QuarryError {
        QuarryError::execution(ErrorCode::MetadataUnavailable, self.to_string())
            .with_hint("Check metadata.url and that the metadata database is reachable")
    }
}

impl From<MetadataError> for QuarryError {
    fn from(err: MetadataError) -> Self {
        err.to_quarry_error()
    }
}

/// Reads descriptors and policies from the metadata Postgres database.
pub struct PgMetadataStore {
    pool: Pool,
}

impl PgMetadataStore {
    pub fn connect(settings: &MetadataSettings) -> anyhow::Result<Self> {
        let url = settings
            .url
            .as_ref()
            .context("metadata.url is not set (QUARRY__METADATA__URL)")?;

        let mut cfg = deadpool_postgres::Config::new();
        cfg.url = Some(url.expose_secret().to_string());
        cfg.manager = Some(deadpool_postgres::ManagerConfig {
            recycling_method: deadpool_postgres::RecyclingMethod::Fast,
        });
        cfg.pool = Some(deadpool_postgres::PoolConfig::new(settings.pool_size));
        let pool = cfg
            .create_pool(
                Some(deadpool_postgres::Runtime::Tokio1),
                tokio_postgres::NoTls,
            )
            .context("Failed to create metadata database pool")?;

        Ok(Self { pool })
    }

    async fn client(&self) -> Result<Object, MetadataError> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl ChartStore for PgMetadataStore {
    async fn chart(&self, chart_id: &str) -> quarry_error::Result<Option<ChartDescriptor>> {
        let client = self.client().await?;
        let row = client
            .query_opt(CHART_QUERY, &[&chart_id])
            .await
            .map_err(MetadataError::from)?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(ChartDescriptor {
            id: column(&row, "id")?,
            dataset_id: column::<Option<String>>(&row, "table_id")?.unwrap_or_default(),
            x_axis: column(&row, "x_axis")?,
            y_axis: column(&row, "y_axis")?,
        }))
    }
}

#[async_trait]
impl DatasetStore for PgMetadataStore {
    async fn dataset(&self, dataset_id: &str) -> quarry_error::Result<Option<Dataset>> {
        let client = self.client().await?;
        let Some(row) = client
            .query_opt(DATASET_QUERY, &[&dataset_id])
            .await
            .map_err(MetadataError::from)?
        else {
            return Ok(None);
        };

        let type_tag: Option<String> = column(&row, "type")?;
        let info: Option<String> = column(&row, "info")?;
        let dataset = Dataset::from_stored(
            column::<String>(&row, "id")?,
            type_tag.as_deref().unwrap_or_default(),
            column(&row, "table_name")?,
            info.as_deref(),
            column::<Option<String>>(&row, "datasource_id")?.unwrap_or_default(),
        )?;
        Ok(Some(dataset))
    }
}

#[async_trait]
impl RowPolicyStore for PgMetadataStore {
    async fn policies_for_dataset(&self, dataset_id: &str) -> quarry_error::Result<Vec<RowPolicy>> {
        let client = self.client().await?;
        let rows = client
            .query(POLICY_QUERY, &[&dataset_id])
            .await
            .map_err(MetadataError::from)?;

        let mut policies = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = column(&row, "id")?;
            let target: Option<String> = column(&row, "auth_target_type")?;
            let express_type: Option<String> = column(&row, "express_type")?;

            if express_type.as_deref() == Some("formula") {
                debug!(target: "security", policy_id = %id, "Skipping formula row policy");
                continue;
            }
            let Some(target_type) = target.as_deref().and_then(PolicyTarget::from_stored) else {
                debug!(
                    target: "security",
                    policy_id = %id,
                    target_type = ?target,
                    "Skipping row policy with unsupported target type"
                );
                continue;
            };

            policies.push(RowPolicy {
                id,
                dataset_id: column(&row, "dataset_id")?,
                target_type,
                target_id: column::<Option<String>>(&row, "auth_target_id")?.unwrap_or_default(),
                where_condition: column::<Option<String>>(&row, "where_condition")?
                    .unwrap_or_default(),
                enabled: column::<Option<bool>>(&row, "enable")?.unwrap_or(true),
            });
        }
        Ok(policies)
    }
}

#[async_trait]
impl RoleDirectory for PgMetadataStore {
    async fn roles_for_user(&self, user_id: &str) -> quarry_error::Result<Vec<String>> {
        let client = self.client().await?;
        let rows = client
            .query(ROLE_QUERY, &[&user_id])
            .await
            .map_err(MetadataError::from)?;
        let roles = rows
            .iter()
            .map(|row| column(row, "role_id"))
            .collect::<Result<Vec<String>, _>>()?;
        Ok(roles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_url_is_rejected() {
        let err = match PgMetadataStore::connect(&MetadataSettings::default()) {
            Err(e) => e,
            Ok(_) => panic!("store without url must not build"),
        };
        assert!(err.to_string().contains("metadata.url"));
    }

    #[test]
    fn test_pool_errors_map_to_metadata_unavailable() {
        let err = MetadataError::Pool(PoolError::Closed).to_quarry_error();
        assert_eq!(err.code, ErrorCode::MetadataUnavailable);
        assert_eq!(err.http_status(), 503);
    }

    /// Runs against a live Postgres when `QUARRY_TEST_DATABASE_URL` is set.
    #[tokio::test]
    async fn test_mistyped_columns_are_errors_not_panics() {
        let Ok(url) = std::env::var("QUARRY_TEST_DATABASE_URL") else {
            eprintln!("QUARRY_TEST_DATABASE_URL not set, skipping");
            return;
        };
        let store = PgMetadataStore::connect(&MetadataSettings {
            url: Some(secrecy::SecretString::from(url)),
            pool_size: 1,
        })
        .unwrap();

        // Temp tables shadow real ones on the single pooled session.
        let client = store.client().await.unwrap();
        client
            .batch_execute(
                "CREATE TEMP TABLE core_chart_view (id text, table_id int4, x_axis text, y_axis text); \
                 INSERT INTO core_chart_view VALUES ('c-1', 7, NULL, NULL); \
                 CREATE TEMP TABLE sys_user_role (user_id text, role_id int8); \
                 INSERT INTO sys_user_role VALUES ('u-1', 42);",
            )
            .await
            .unwrap();
        drop(client);

        let err = store.chart("c-1").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::MetadataUnavailable);
        assert!(err.message.contains("table_id"));

        let err = store.roles_for_user("u-1").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::MetadataUnavailable);
        assert!(err.message.contains("role_id"));
    }
}
