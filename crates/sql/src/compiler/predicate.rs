use crate::error::CompileError;
use crate::literal::{render_value, Binder};
use crate::sanitize::validate_identifier;
use quarry_common::models::{FilterCondition, FilterOperator};
use tracing::debug;

fn filter_condition(
    filter: &FilterCondition,
    binder: &mut Binder,
) -> Result<Option<String>, CompileError> {
    validate_identifier(&filter.field, None)?;
    let field = &filter.field;

    let condition = match &filter.operator {
        op @ (FilterOperator::Eq
        | FilterOperator::NotEq
        | FilterOperator::Gt
        | FilterOperator::Lt
        | FilterOperator::GtEq
        | FilterOperator::LtEq) => Some(format!("{} {} {}", field, op, binder.bind(&filter.value))),
        FilterOperator::Like => {
            let pattern = format!("%{}%", render_value(&filter.value));
            Some(format!("{} LIKE {}", field, binder.bind_text(pattern)))
        }
        FilterOperator::In => match filter.value.as_array() {
            Some(items) if !items.is_empty() => {
                let bound: Vec<String> = items.iter().map(|v| binder.bind(v)).collect();
                Some(format!("{} IN ({})", field, bound.join(", ")))
            }
            _ => {
                debug!(field = %field, "Dropping IN filter without a non-empty array value");
                None
            }
        },
        FilterOperator::Other(op) => {
            debug!(field = %field, operator = %op, "Dropping filter with unsupported operator");
            None
        }
    };

    Ok(condition)
}

/// Filters ordered by field, operator and value, then the security predicate.
pub(crate) fn where_clause(
    filters: &[FilterCondition],
    security_predicate: &str,
    binder: &mut Binder,
) -> Result<Option<String>, CompileError> {
    // Total order, so permutations of the same filters compile identically.
    let mut ordered: Vec<&FilterCondition> = filters.iter().collect();
    ordered.sort_by_cached_key(|f| {
        (
            f.field.clone(),
            f.operator.as_str().to_string(),
            f.value.to_string(),
        )
    });

    let mut conditions = Vec::with_capacity(ordered.len() + 1);
    for filter in ordered {
        if let Some(condition) = filter_condition(filter, binder)? {
            conditions.push(condition);
        }
    }

    let predicate = security_predicate.trim();
    if !predicate.is_empty() {
        conditions.push(format!("({})", predicate));
    }

    if conditions.is_empty() {
        Ok(None)
    } else {
        Ok(Some(format!("WHERE {}", conditions.join(" AND "))))
    }
}
