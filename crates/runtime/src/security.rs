//! Row security predicate resolution.
//!
//! A resolver returns an opaque SQL boolean fragment for a (user, dataset)
//! pair. The empty string means no restriction. Any failure to consult the
//! underlying stores is an error: the chart is not executed.

use async_trait::async_trait;
use quarry_common::auth::SecurityContext;
use quarry_error::{ErrorCode, ErrorContext, QuarryError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("Failed to load row policies for dataset '{dataset_id}': {source}")]
    PolicyLookup {
        dataset_id: String,
        #[source]
        source: QuarryError,
    },

    #[error("Failed to load roles for user '{user_id}': {source}")]
    RoleLookup {
        user_id: String,
        #[source]
        source: QuarryError,
    },
}

impl SecurityError {
    pub fn to_quarry_error(self) -> QuarryError {
        let message = self.to_string();
        let (user_id, dataset_id) = match &self {
            SecurityError::PolicyLookup { dataset_id, .. } => (None, Some(dataset_id.clone())),
            SecurityError::RoleLookup { user_id, .. } => (Some(user_id.clone()), None),
        };
        QuarryError::new(ErrorCode::SecurityResolutionFailed, message)
            .with_context(ErrorContext::Security {
                user_id,
                dataset_id,
            })
            .with_hint("Row security could not be determined, so the query was not run")
    }
}

impl From<SecurityError> for QuarryError {
    fn from(err: SecurityError) -> Self {
        err.to_quarry_error()
    }
}

#[async_trait]
pub trait RowSecurityResolver: Send + Sync {
    async fn resolve(
        &self,
        context: &SecurityContext,
        dataset_id: &str,
    ) -> Result<String, SecurityError>;
}

/// Applies no restriction to anyone.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unrestricted;

#[async_trait]
impl RowSecurityResolver for Unrestricted {
    async fn resolve(&self, _: &SecurityContext, _: &str) -> Result<String, SecurityError> {
        Ok(String::new())
    }
}

/// Fixed predicates per (user, dataset).
#[derive(Debug, Default, Clone)]
pub struct StaticRowSecurity {
    predicates: HashMap<(String, String), String>,
}

impl StaticRowSecurity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_predicate(
        mut self,
        user_id: impl Into<String>,
        dataset_id: impl Into<String>,
        predicate: impl Into<String>,
    ) -> Self {
        self.predicates
            .insert((user_id.into(), dataset_id.into()), predicate.into());
        self
    }
}

#[async_trait]
impl RowSecurityResolver for StaticRowSecurity {
    async fn resolve(
        &self,
        context: &SecurityContext,
        dataset_id: &str,
    ) -> Result<String, SecurityError> {
        Ok(self
            .predicates
            .get(&(context.user_id.clone(), dataset_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyTarget {
    User,
    Role,
}

impl PolicyTarget {
    /// Maps the stored target type. Types other than `user` and `role` are not supported.
    pub fn from_stored(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "role" => Some(Self::Role),
            _ => None,
        }
    }
}

/// A stored per-dataset row rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowPolicy {
    pub id: String,
    pub dataset_id: String,
    pub target_type: PolicyTarget,
    pub target_id: String,
    pub where_condition: String,
    pub enabled: bool,
}

#[async_trait]
pub trait RowPolicyStore: Send + Sync {
    async fn policies_for_dataset(&self, dataset_id: &str) -> quarry_error::Result<Vec<RowPolicy>>;
}

#[async_trait]
pub trait RoleDirectory: Send + Sync {
    async fn roles_for_user(&self, user_id: &str) -> quarry_error::Result<Vec<String>>;
}

/// Resolves predicates from stored row policies.
///
/// Every applicable policy condition is parenthesized and the results are
/// OR-ed, so the most permissive policy wins.
pub struct PolicyRowSecurityResolver {
    policies: Arc<dyn RowPolicyStore>,
    roles: Option<Arc<dyn RoleDirectory>>,
}

impl PolicyRowSecurityResolver {
    pub fn new(policies: Arc<dyn RowPolicyStore>) -> Self {
        Self {
            policies,
            roles: None,
        }
    }

    /// Makes the directory the only source of roles. Roles carried by the
    /// request are then ignored, so a caller cannot claim a role to widen
    /// its visible rows.
    pub fn with_role_directory(mut self, roles: Arc<dyn RoleDirectory>) -> Self {
        self.roles = Some(roles);
        self
    }

    async fn effective_roles(
        &self,
        context: &SecurityContext,
    ) -> Result<HashSet<String>, SecurityError> {
        let Some(directory) = &self.roles else {
            return Ok(context.roles.iter().cloned().collect());
        };
        let stored = directory
            .roles_for_user(&context.user_id)
            .await
            .map_err(|source| SecurityError::RoleLookup {
                user_id: context.user_id.clone(),
                source,
            })?;
        Ok(stored.into_iter().collect())
    }
}

#[async_trait]
impl RowSecurityResolver for PolicyRowSecurityResolver {
    async fn resolve(
        &self,
        context: &SecurityContext,
        dataset_id: &str,
    ) -> Result<String, SecurityError> {
        let policies = self
            .policies
            .policies_for_dataset(dataset_id)
            .await
            .map_err(|source| SecurityError::PolicyLookup {
                dataset_id: dataset_id.to_string(),
                source,
            })?;

        let candidates: Vec<&RowPolicy> = policies
            .iter()
            .filter(|p| p.enabled && !p.where_condition.trim().is_empty())
            .collect();
        if candidates.is_empty() {
            return Ok(String::new());
        }

        let roles = if candidates.iter().any(|p| p.target_type == PolicyTarget::Role) {
            self.effective_roles(context).await?
        } else {
            HashSet::new()
        };

        let clauses: Vec<String> = candidates
            .into_iter()
            .filter(|p| match p.target_type {
                PolicyTarget::User => p.target_id == context.user_id,
                PolicyTarget::Role => roles.contains(&p.target_id),
            })
            .map(|p| format!("({})", p.where_condition.trim()))
            .collect();

        debug!(
            target: "security",
            user_id = %context.user_id,
            dataset_id,
            policies = clauses.len(),
            "Resolved row security"
        );

        Ok(clauses.join(" OR "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Policies(Vec<RowPolicy>);

    #[async_trait]
    impl RowPolicyStore for Policies {
        async fn policies_for_dataset(
            &self,
            dataset_id: &str,
        ) -> quarry_error::Result<Vec<RowPolicy>> {
            Ok(self
                .0
                .iter()
                .filter(|p| p.dataset_id == dataset_id)
                .cloned()
                .collect())
        }
    }

    struct FailingDirectory;

    #[async_trait]
    impl RoleDirectory for FailingDirectory {
        async fn roles_for_user(&self, _: &str) -> quarry_error::Result<Vec<String>> {
            Err(QuarryError::new(ErrorCode::MetadataUnavailable, "db down"))
        }
    }

    struct Directory(Vec<(&'static str, &'static str)>);

    #[async_trait]
    impl RoleDirectory for Directory {
        async fn roles_for_user(&self, user_id: &str) -> quarry_error::Result<Vec<String>> {
            Ok(self
                .0
                .iter()
                .filter(|(user, _)| *user == user_id)
                .map(|(_, role)| role.to_string())
                .collect())
        }
    }

    fn policy(id: &str, target: PolicyTarget, target_id: &str, cond: &str) -> RowPolicy {
        RowPolicy {
            id: id.into(),
            dataset_id: "ds-sales".into(),
            target_type: target,
            target_id: target_id.into(),
            where_condition: cond.into(),
            enabled: true,
        }
    }

    #[tokio::test]
    async fn test_user_and_role_policies_are_or_merged() {
        let mut disabled = policy("p3", PolicyTarget::User, "u-1", "1 = 0");
        disabled.enabled = false;
        let resolver = PolicyRowSecurityResolver::new(Arc::new(Policies(vec![
            policy("p1", PolicyTarget::User, "u-1", "owner = 'u-1'"),
            policy("p2", PolicyTarget::Role, "eu", "region = 'EU'"),
            disabled,
            policy("p4", PolicyTarget::Role, "us", "region = 'US'"),
            policy("p5", PolicyTarget::User, "u-1", "   "),
        ])));

        let ctx = SecurityContext::new("u-1").with_roles(["eu"]);
        let predicate = resolver.resolve(&ctx, "ds-sales").await.unwrap();
        assert_eq!(predicate, "(owner = 'u-1') OR (region = 'EU')");

        let other = resolver.resolve(&ctx, "ds-other").await.unwrap();
        assert_eq!(other, "");
    }

    #[tokio::test]
    async fn test_claimed_roles_are_ignored_when_a_directory_is_configured() {
        let resolver = PolicyRowSecurityResolver::new(Arc::new(Policies(vec![
            policy("p1", PolicyTarget::Role, "eu", "region = 'EU'"),
            policy("p2", PolicyTarget::Role, "admin", "1 = 1"),
        ])))
        .with_role_directory(Arc::new(Directory(vec![("u-1", "eu")])));

        let claims_admin = SecurityContext::new("u-1").with_roles(["admin"]);
        let predicate = resolver.resolve(&claims_admin, "ds-sales").await.unwrap();
        assert_eq!(predicate, "(region = 'EU')");
    }

    #[tokio::test]
    async fn test_role_lookup_failure_fails_closed() {
        let resolver = PolicyRowSecurityResolver::new(Arc::new(Policies(vec![policy(
            "p1",
            PolicyTarget::Role,
            "eu",
            "region = 'EU'",
        )])))
        .with_role_directory(Arc::new(FailingDirectory));

        let err = resolver
            .resolve(&SecurityContext::new("u-1"), "ds-sales")
            .await
            .unwrap_err();
        assert!(matches!(err, SecurityError::RoleLookup { .. }));
        assert_eq!(
            err.to_quarry_error().code,
            ErrorCode::SecurityResolutionFailed
        );
    }

    #[tokio::test]
    async fn test_role_directory_skipped_without_role_policies() {
        let resolver = PolicyRowSecurityResolver::new(Arc::new(Policies(vec![policy(
            "p1",
            PolicyTarget::User,
            "u-1",
            "owner = 'u-1'",
        )])))
        .with_role_directory(Arc::new(FailingDirectory));

        let predicate = resolver
            .resolve(&SecurityContext::new("u-1"), "ds-sales")
            .await
            .unwrap();
        assert_eq!(predicate, "(owner = 'u-1')");
    }

    #[tokio::test]
    async fn test_static_resolver() {
        let resolver = StaticRowSecurity::new().with_predicate("u-1", "ds-sales", "tenant = 3");
        let ctx = SecurityContext::new("u-1");
        assert_eq!(resolver.resolve(&ctx, "ds-sales").await.unwrap(), "tenant = 3");
        assert_eq!(resolver.resolve(&ctx, "ds-x").await.unwrap(), "");
        assert_eq!(Unrestricted.resolve(&ctx, "ds-sales").await.unwrap(), "");
    }
}
