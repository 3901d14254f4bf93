use crate::field_spec::{FieldSpec, Measure};

fn measure_expr(measure: &Measure) -> String {
    if measure.is_count_star() {
        return "COUNT(*) AS count".to_string();
    }
    match measure.aggregate.sql_name() {
        Some(agg) => format!("{}({}) AS {}", agg, measure.name, measure.name),
        None => measure.name.clone(),
    }
}

/// Dimensions verbatim, then measures. `*` when nothing is selected.
pub(crate) fn select_list(spec: &FieldSpec) -> String {
    let items: Vec<String> = spec
        .dimensions
        .iter()
        .map(|d| d.name.clone())
        .chain(spec.measures.iter().map(measure_expr))
        .collect();

    if items.is_empty() {
        "*".to_string()
    } else {
        items.join(", ")
    }
}

pub(crate) fn group_by(spec: &FieldSpec) -> Option<String> {
    if spec.dimensions.is_empty() {
        return None;
    }
    let names: Vec<&str> = spec.dimensions.iter().map(|d| d.name.as_str()).collect();
    Some(format!("GROUP BY {}", names.join(", ")))
}
