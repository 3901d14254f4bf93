use quarry_common::models::Dataset;
use quarry_sql::FieldSpec;

#[allow(dead_code)]
pub fn sales_table() -> Dataset {
    Dataset::physical_table("ds-sales", "sales", "warehouse")
}

#[allow(dead_code)]
pub fn orders_sql() -> Dataset {
    Dataset::raw_sql(
        "ds-orders",
        "SELECT o.id, o.region, o.amount FROM orders o",
        "warehouse",
    )
}

/// `region` by `SUM(revenue)` sorted descending.
#[allow(dead_code)]
pub fn revenue_by_region() -> FieldSpec {
    FieldSpec::decode(
        Some(r#"{"fields": [{"name": "region", "dataType": "string"}]}"#),
        Some(r#"{"fields": [{"name": "revenue", "aggregate": "SUM", "sort": "DESC", "dataType": "number"}]}"#),
    )
    .unwrap()
}
