//! Runs against a live Postgres when `QUARRY_TEST_DATABASE_URL` is set.

use quarry_common::config::GatewaySettings;
use quarry_common::models::Value;
use quarry_error::ErrorCode;
use quarry_runtime::gateway::ExecutionGateway;
use secrecy::SecretString;

fn settings() -> Option<GatewaySettings> {
    let url = std::env::var("QUARRY_TEST_DATABASE_URL").ok()?;
    Some(GatewaySettings {
        url: Some(SecretString::from(url)),
        max_open: 2,
        max_idle: 1,
        ..Default::default()
    })
}

#[tokio::test]
async fn test_select_decodes_common_types() {
    let Some(settings) = settings() else {
        eprintln!("QUARRY_TEST_DATABASE_URL not set, skipping");
        return;
    };
    let gateway = ExecutionGateway::connect(&settings).unwrap();
    gateway.ping().await.unwrap();

    let result = gateway
        .execute(
            "SELECT 1::int4 AS i, 2.5::float8 AS f, 12.25::numeric AS n, 'EU'::text AS t, \
             true AS b, NULL::text AS missing",
            &[],
        )
        .await
        .unwrap();

    assert_eq!(result.columns, vec!["i", "f", "n", "t", "b", "missing"]);
    assert_eq!(result.get(0, "i"), Some(&Value::Int64(1)));
    assert_eq!(result.get(0, "f"), Some(&Value::Float64(2.5)));
    assert_eq!(result.get(0, "n"), Some(&Value::Float64(12.25)));
    assert_eq!(result.get(0, "t"), Some(&Value::Text("EU".into())));
    assert_eq!(result.get(0, "b"), Some(&Value::Bool(true)));
    assert_eq!(result.get(0, "missing"), Some(&Value::Null));
    gateway.close();
}

#[tokio::test]
async fn test_text_params_are_inferred() {
    let Some(settings) = settings() else {
        return;
    };
    let gateway = ExecutionGateway::connect(&settings).unwrap();

    let result = gateway
        .execute(
            "SELECT x FROM generate_series(1, 10) AS x WHERE x > $1 ORDER BY x",
            &["7".to_string()],
        )
        .await
        .unwrap();
    assert_eq!(result.num_rows(), 3);
    gateway.close();
}

#[tokio::test]
async fn test_statement_errors_carry_sql_state() {
    let Some(settings) = settings() else {
        return;
    };
    let gateway = ExecutionGateway::connect(&settings).unwrap();

    let err = gateway
        .execute("SELECT * FROM quarry_missing_table", &[])
        .await
        .unwrap_err()
        .to_quarry_error();
    assert_eq!(err.code, ErrorCode::StatementFailed);
    match err.context {
        Some(quarry_error::ErrorContext::Execution { sql_state, .. }) => {
            assert_eq!(sql_state.as_deref(), Some("42P01"));
        }
        other => panic!("unexpected context: {:?}", other),
    }
    gateway.close();
}

#[tokio::test]
async fn test_inline_statements_are_not_kept_on_the_connection() {
    let Some(mut settings) = settings() else {
        return;
    };
    settings.max_open = 1;
    settings.max_idle = 1;
    let gateway = ExecutionGateway::connect(&settings).unwrap();

    for status in ["open", "closed", "pending", "archived", "draft"] {
        gateway
            .execute(&format!("SELECT '{}'::text AS status", status), &[])
            .await
            .unwrap();
    }

    let result = gateway
        .execute("SELECT count(*)::int8 AS prepared FROM pg_prepared_statements", &[])
        .await
        .unwrap();
    // Only the statement running this count is alive.
    assert!(matches!(result.get(0, "prepared"), Some(Value::Int64(n)) if *n <= 1));
    gateway.close();
}
