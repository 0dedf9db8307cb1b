//! Streaming query tests.

use pretty_assertions::assert_eq;
use warehouse_exec::db::{decode_all, ColumnMeta, ColumnTypeTag, MockCall, MockResponse, Value};
use warehouse_exec::error::WarehouseError;
use warehouse_exec::failure::DialectKind;
use warehouse_exec::query::{ExecutionGateway, GatewayOptions, StreamOptions};

use super::{continue_on_error, harness, test_connection_config};

#[test]
fn test_streaming_query_disables_and_restores_auto_commit() {
    let mut h = harness(GatewayOptions::default());
    h.driver.push(MockResponse::rows(
        vec![ColumnMeta::new("n", ColumnTypeTag::BigInt)],
        (1..=3).map(|n| vec![Some(n.to_string())]).collect(),
    ));

    let options = StreamOptions {
        fetch_size: 500,
        quiet: None,
    };
    {
        let mut cursor = h
            .gateway
            .streaming_query("SELECT n FROM big;", &options)
            .unwrap()
            .unwrap();
        let rows = decode_all(cursor.as_mut()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].get("n"), Some(&Value::Int(3)));
        cursor.close().unwrap();
    }

    assert!(!h.driver.auto_commit());
    h.gateway.restore_auto_commit().unwrap();

    assert_eq!(
        h.driver.calls(),
        vec![
            MockCall::AutoCommit(false),
            MockCall::Stream {
                sql: "SELECT n FROM big;".to_string(),
                fetch_size: 500,
            },
            MockCall::AutoCommit(true),
        ]
    );
    assert!(h.log.contains("SELECT n FROM big;"));
}

#[test]
fn test_default_fetch_size() {
    let mut h = harness(GatewayOptions::default());
    {
        let cursor = h
            .gateway
            .streaming_query("SELECT 1;", &StreamOptions::default())
            .unwrap()
            .unwrap();
        cursor.close().unwrap();
    }

    assert!(h.driver.calls().contains(&MockCall::Stream {
        sql: "SELECT 1;".to_string(),
        fetch_size: 100_000,
    }));
}

#[test]
fn test_streaming_failure_is_not_retried() {
    let mut h = harness(GatewayOptions::default());
    h.driver.push_failure("ERROR: VACUUM is running");

    let result = h
        .gateway
        .streaming_query("SELECT * FROM locked;", &StreamOptions::default());

    assert!(matches!(result, Err(WarehouseError::Query(_))));
    drop(result);
    assert_eq!(h.driver.statements().len(), 1);
    assert!(h.sleeper.slept().is_empty());
    assert!(h.log.contains("Streaming queries are not retried"));
    assert!(h.gateway.error_occurred());
    assert!(h.driver.auto_commit());
}

#[test]
fn test_streaming_failure_swallowed_when_continuing() {
    let mut h = harness(continue_on_error());
    h.driver
        .push_failure("ERROR: relation \"missing\" does not exist");

    let result = h
        .gateway
        .streaming_query("SELECT * FROM missing;", &StreamOptions::default())
        .unwrap();

    assert!(result.is_none());
    drop(result);
    assert!(h.gateway.error_occurred());
    assert!(h.driver.auto_commit());
}

#[test]
fn test_streaming_against_live_server() {
    let Some(config) = test_connection_config() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let mut gateway =
        ExecutionGateway::connect(&config, DialectKind::Postgres, GatewayOptions::default())
            .unwrap();

    let options = StreamOptions {
        fetch_size: 100,
        quiet: Some(true),
    };
    {
        let mut cursor = gateway
            .streaming_query("SELECT generate_series(1, 250) AS n;", &options)
            .unwrap()
            .unwrap();
        let rows = decode_all(cursor.as_mut()).unwrap();
        assert_eq!(rows.len(), 250);
        assert_eq!(rows[249].get("n"), Some(&Value::Int(250)));
        cursor.close().unwrap();
    }
    gateway.restore_auto_commit().unwrap();

    // Back in auto-commit mode, ordinary statements work
    assert!(gateway
        .execute("SELECT 1;", &Default::default())
        .unwrap()
        .is_some());
    gateway.close().unwrap();
}
