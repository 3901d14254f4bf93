//! Read-only access to chart and dataset descriptors.

use crate::security::{RoleDirectory, RowPolicy, RowPolicyStore};
use async_trait::async_trait;
use dashmap::DashMap;
use quarry_common::models::{ChartDescriptor, Dataset};

#[async_trait]
pub trait ChartStore: Send + Sync {
    async fn chart(&self, chart_id: &str) -> quarry_error::Result<Option<ChartDescriptor>>;
}

#[async_trait]
pub trait DatasetStore: Send + Sync {
    async fn dataset(&self, dataset_id: &str) -> quarry_error::Result<Option<Dataset>>;
}

/// Process-local catalog. Serves tests and embedded setups without a metadata database.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    charts: DashMap<String, ChartDescriptor>,
    datasets: DashMap<String, Dataset>,
    policies: DashMap<String, Vec<RowPolicy>>,
    user_roles: DashMap<String, Vec<String>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_chart(&self, chart: ChartDescriptor) {
        self.charts.insert(chart.id.clone(), chart);
    }

    pub fn insert_dataset(&self, dataset: Dataset) {
        self.datasets.insert(dataset.id.clone(), dataset);
    }

    pub fn insert_policy(&self, policy: RowPolicy) {
        self.policies
            .entry(policy.dataset_id.clone())
            .or_default()
            .push(policy);
    }

    pub fn grant_role(&self, user_id: impl Into<String>, role: impl Into<String>) {
        self.user_roles
            .entry(user_id.into())
            .or_default()
            .push(role.into());
    }
}

#[async_trait]
impl ChartStore for InMemoryCatalog {
    async fn chart(&self, chart_id: &str) -> quarry_error::Result<Option<ChartDescriptor>> {
        Ok(self.charts.get(chart_id).map(|c| c.value().clone()))
    }
}

#[async_trait]
impl DatasetStore for InMemoryCatalog {
    async fn dataset(&self, dataset_id: &str) -> quarry_error::Result<Option<Dataset>> {
        Ok(self.datasets.get(dataset_id).map(|d| d.value().clone()))
    }
}

#[async_trait]
impl RowPolicyStore for InMemoryCatalog {
    async fn policies_for_dataset(&self, dataset_id: &str) -> quarry_error::Result<Vec<RowPolicy>> {
        Ok(self
            .policies
            .get(dataset_id)
            .map(|p| p.value().clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl RoleDirectory for InMemoryCatalog {
    async fn roles_for_user(&self, user_id: &str) -> quarry_error::Result<Vec<String>> {
        Ok(self
            .user_roles
            .get(user_id)
            .map(|r| r.value().clone())
            .unwrap_or_default())
    }
}
