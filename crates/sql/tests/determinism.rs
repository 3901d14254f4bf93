mod common;

use proptest::prelude::*;
use quarry_common::models::FilterCondition;
use quarry_sql::Compiler;
use serde_json::json;

const OPERATORS: [&str; 8] = ["=", "!=", ">", "<", ">=", "<=", "LIKE", "IN"];

fn filter_for(field: &str, op: &str, value: &str) -> FilterCondition {
    let value = if op == "IN" {
        json!([value, "other"])
    } else {
        json!(value)
    };
    FilterCondition::new(field, op, value)
}

fn shuffle(filters: &[FilterCondition], seed: u64) -> Vec<FilterCondition> {
    let mut shuffled = filters.to_vec();
    // Deterministic Fisher-Yates driven by the seed.
    let mut state = seed;
    for i in (1..shuffled.len()).rev() {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let j = (state >> 33) as usize % (i + 1);
        shuffled.swap(i, j);
    }
    shuffled
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_filter_order_does_not_change_sql(
        ops in proptest::collection::vec(0..OPERATORS.len(), 1..8),
        values in proptest::collection::vec("[a-z']{0,6}", 8),
        seed in any::<u64>(),
    ) {
        let filters: Vec<FilterCondition> = ops
            .iter()
            .enumerate()
            .map(|(i, op)| filter_for(&format!("field_{}", i), OPERATORS[*op], &values[i]))
            .collect();
        let shuffled = shuffle(&filters, seed);

        let compiler = Compiler::default();
        let dataset = common::sales_table();
        let spec = common::revenue_by_region();

        let a = compiler.compile(&dataset, &spec, &filters, "tenant = 1", None, None).unwrap();
        let b = compiler.compile(&dataset, &spec, &shuffled, "tenant = 1", None, None).unwrap();

        prop_assert_eq!(a, b);
    }

    #[test]
    fn test_repeated_fields_do_not_change_sql(
        fields in proptest::collection::vec(0..2usize, 2..8),
        ops in proptest::collection::vec(0..OPERATORS.len(), 8),
        values in proptest::collection::vec("[a-z0-9]{0,4}", 8),
        seed in any::<u64>(),
    ) {
        // Only two field names, so range-style filters share a field.
        let filters: Vec<FilterCondition> = fields
            .iter()
            .enumerate()
            .map(|(i, f)| filter_for(["amount", "region"][*f], OPERATORS[ops[i]], &values[i]))
            .collect();
        let shuffled = shuffle(&filters, seed);

        let compiler = Compiler::default();
        let dataset = common::sales_table();
        let spec = common::revenue_by_region();

        let a = compiler.compile(&dataset, &spec, &filters, "", None, None).unwrap();
        let b = compiler.compile(&dataset, &spec, &shuffled, "", None, None).unwrap();

        prop_assert_eq!(a, b);
    }
}
