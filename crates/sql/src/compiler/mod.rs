//! Assembly of one chart's SQL statement.
//!
//! Clause order is fixed: `SELECT .. FROM .. WHERE .. GROUP BY .. ORDER BY ..
//! LIMIT .. OFFSET ..`, separated by single spaces. Filters are emitted sorted
//! by field name so equal requests produce byte-identical SQL.

mod ordering;
mod predicate;
mod projection;

use crate::error::CompileError;
use crate::field_spec::FieldSpec;
use crate::literal::Binder;
use crate::sanitize::validate_identifier;
use quarry_common::config::{CompilerSettings, ValueBinding, DEFAULT_LIMIT};
use quarry_common::models::{Dataset, DatasetKind, FilterCondition};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Row cap applied when the caller supplies no limit.
    pub default_limit: u64,
    pub max_limit: Option<u64>,
    pub binding: ValueBinding,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: None,
            binding: ValueBinding::Inline,
        }
    }
}

impl From<&CompilerSettings> for CompilerOptions {
    fn from(settings: &CompilerSettings) -> Self {
        Self {
            default_limit: settings.default_limit,
            max_limit: settings.max_limit,
            binding: settings.value_binding,
        }
    }
}

/// SQL text plus positional parameters (empty with inline binding).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<String>,
}

impl fmt::Display for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: CompilerOptions,
}

impl Compiler {
    pub fn new(options: CompilerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Compiles one chart execution.
    ///
    /// `security_predicate` is an opaque SQL boolean fragment; blank means no
    /// restriction. A zero `limit` counts as not supplied.
    pub fn compile(
        &self,
        dataset: &Dataset,
        spec: &FieldSpec,
        filters: &[FilterCondition],
        security_predicate: &str,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<CompiledQuery, CompileError> {
        let from = base_relation(dataset)?;
        let mut binder = Binder::new(self.options.binding);

        let mut clauses = vec![format!("SELECT {}", projection::select_list(spec)), from];
        clauses.extend(predicate::where_clause(filters, security_predicate, &mut binder)?);
        clauses.extend(projection::group_by(spec));
        clauses.extend(ordering::order_by(spec));
        clauses.push(ordering::limit_clause(&self.options, limit, offset));

        let query = CompiledQuery {
            sql: clauses.join(" "),
            params: binder.into_params(),
        };

        tracing::debug!(
            target: "compiler",
            dataset_id = %dataset.id,
            params = query.params.len(),
            "Compiled chart query"
        );

        Ok(query)
    }
}

fn base_relation(dataset: &Dataset) -> Result<String, CompileError> {
    let missing = |what: &'static str| CompileError::IncompleteDataset {
        dataset_id: dataset.id.clone(),
        kind: dataset.kind,
        missing: what,
    };

    match dataset.kind {
        DatasetKind::RawSql => {
            let sql = dataset
                .sql_text
                .as_deref()
                .map(|s| s.trim().trim_end_matches(';').trim_end())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| missing("SQL text"))?;
            Ok(format!("FROM ({}) AS base", sql))
        }
        DatasetKind::PhysicalTable => {
            let table = dataset
                .table_name
                .as_deref()
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| missing("table name"))?;
            validate_identifier(table, None)?;
            Ok(format!("FROM {}", table))
        }
    }
}
