//! Gateway behavior against the mock driver.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use warehouse_exec::db::{ColumnMeta, ColumnTypeTag, MockCall, MockResponse, Value};
use warehouse_exec::error::{DriverError, WarehouseError};
use warehouse_exec::failure::BaseDialect;
use warehouse_exec::query::{ExecuteOptions, GatewayOptions, QueryOptions, SessionSettings};

use super::{continue_on_error, harness, harness_with_dialect};

const MAINTENANCE: &str = "ERROR: system is in maintenance mode";
const SYNTAX_ERROR: &str = "ERROR: syntax error at or near \"SELEC\"";

#[test]
fn test_execute_returns_affected_rows_and_logs() {
    let mut h = harness(GatewayOptions::default());
    h.driver.push(MockResponse::Update(Some(3)));

    let affected = h
        .gateway
        .execute("INSERT INTO t SELECT * FROM s;", &ExecuteOptions::default())
        .unwrap();

    assert_eq!(affected, Some(3));
    assert!(h.log.contains("INSERT INTO t SELECT * FROM s;"));
    assert!(h.log.contains("Affected 3 row(s)."));
    assert!(!h.gateway.error_occurred());
}

#[test]
fn test_transaction_statements_do_not_report_rows() {
    let mut h = harness(GatewayOptions::default());

    for sql in ["BEGIN;", "end;", "COMMIT;", "  rollback"] {
        h.gateway.execute(sql, &ExecuteOptions::default()).unwrap();
    }
    h.gateway
        .execute("UPDATE weekend SET x = 1;", &ExecuteOptions::default())
        .unwrap();

    let affected_lines = h
        .log
        .lines()
        .into_iter()
        .filter(|line| line.contains("Affected"))
        .count();
    assert_eq!(affected_lines, 1);
}

#[test]
fn test_quiet_suppresses_statement_echo() {
    let mut h = harness(GatewayOptions {
        quiet: true,
        ..Default::default()
    });

    h.gateway
        .execute("DELETE FROM quiet_table;", &ExecuteOptions::default())
        .unwrap();
    assert!(h.log.lines().is_empty());

    // A per-call override wins over the gateway default
    h.gateway
        .execute(
            "DELETE FROM loud_table;",
            &ExecuteOptions {
                quiet: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(h.log.contains("DELETE FROM loud_table;"));
}

#[test]
fn test_permanent_recoverable_failure_makes_four_attempts() {
    let mut h = harness(GatewayOptions::default());
    h.driver.fail_always(DriverError::database(MAINTENANCE));

    let err = h
        .gateway
        .execute("VACUUM events;", &ExecuteOptions::default())
        .unwrap_err();

    assert!(matches!(err, WarehouseError::Query(_)));
    assert_eq!(h.driver.statements().len(), 4);
    assert_eq!(h.sleeper.slept(), vec![Duration::from_secs(900); 3]);
    assert_eq!(h.gateway.retry_count(), 0);
    assert!(h.gateway.error_occurred());
    assert!(h.log.contains("Retry attempt 1 will occur after 900 seconds"));
    assert!(h.log.contains("Retry attempt 3 will occur after 900 seconds"));
    assert!(h.log.contains("Giving up after 4 attempts"));
}

#[test]
fn test_statement_is_echoed_before_every_attempt() {
    let mut h = harness(GatewayOptions::default());
    h.driver
        .push_failure("VACUUM is running")
        .push(MockResponse::Update(Some(0)));

    h.gateway
        .execute("DELETE FROM echoed;", &ExecuteOptions::default())
        .unwrap();

    let echoes = h
        .log
        .lines()
        .into_iter()
        .filter(|line| line.ends_with("| DELETE FROM echoed;"))
        .count();
    assert_eq!(echoes, 2);
}

#[test]
fn test_retry_budget_resets_between_calls() {
    let mut h = harness(GatewayOptions::default());
    h.driver
        .push_failure("VACUUM is running")
        .push_failure("VACUUM is running")
        .push(MockResponse::Update(Some(1)));

    assert_eq!(
        h.gateway
            .execute("DELETE FROM a;", &ExecuteOptions::default())
            .unwrap(),
        Some(1)
    );
    assert_eq!(h.gateway.retry_count(), 0);

    // The second call gets the full budget of three retries again
    h.driver
        .push_failure("VACUUM is running")
        .push_failure("VACUUM is running")
        .push_failure("VACUUM is running")
        .push(MockResponse::Update(Some(2)));

    assert_eq!(
        h.gateway
            .execute("DELETE FROM b;", &ExecuteOptions::default())
            .unwrap(),
        Some(2)
    );
    assert_eq!(h.driver.statements().len(), 7);
    assert_eq!(h.sleeper.slept().len(), 5);
    assert!(!h.gateway.error_occurred());
}

#[test]
fn test_abort_on_error_raises_and_connection_stays_usable() {
    let mut h = harness(GatewayOptions::default());
    h.driver.push_failure(SYNTAX_ERROR);

    let err = h
        .gateway
        .execute("SELEC 1;", &ExecuteOptions::default())
        .unwrap_err();
    assert_eq!(
        err.driver_error().map(|e| e.message().to_string()),
        Some(SYNTAX_ERROR.to_string())
    );
    assert!(h.gateway.error_occurred());
    assert!(h.sleeper.slept().is_empty());
    assert!(h.log.contains("DatabaseError"));
    assert!(h.log.contains(SYNTAX_ERROR));

    assert_eq!(
        h.gateway
            .execute("SELECT 1;", &ExecuteOptions::default())
            .unwrap(),
        Some(0)
    );

    h.gateway.clear_error_state();
    assert!(!h.gateway.error_occurred());
}

#[test]
fn test_continue_on_error_swallows_and_flags() {
    let mut h = harness(continue_on_error());
    h.driver.push_failure(SYNTAX_ERROR);

    let result = h
        .gateway
        .execute("SELEC 1;", &ExecuteOptions::default())
        .unwrap();

    assert_eq!(result, None);
    assert!(h.gateway.error_occurred());

    // The flag is sticky across later successes
    h.gateway
        .execute("SELECT 1;", &ExecuteOptions::default())
        .unwrap();
    assert!(h.gateway.error_occurred());
}

#[test]
fn test_ignored_failure_is_not_an_error() {
    let mut h = harness(GatewayOptions::default());
    let missing = "ERROR: table \"t\" does not exist";
    h.driver.push_failure(missing);

    let result = h
        .gateway
        .execute("DROP TABLE s.t;", &ExecuteOptions::default().ignoring(missing))
        .unwrap();

    assert_eq!(result, None);
    assert!(!h.gateway.error_occurred());
}

#[test]
fn test_update_count_overflow_is_recovered() {
    let mut h = harness(GatewayOptions::default());
    h.driver.push(MockResponse::Fail(DriverError::protocol(
        "Unable to interpret the update count in command completion tag: INSERT 0 3000000000",
    )));

    let affected = h
        .gateway
        .execute("INSERT INTO big SELECT * FROM huge;", &ExecuteOptions::default())
        .unwrap();

    assert_eq!(affected, Some(3_000_000_000));
    assert!(!h.gateway.error_occurred());
    assert!(h.log.contains("Affected 3000000000 row(s)."));
}

#[test]
fn test_update_count_overflow_without_count_is_not_an_error() {
    let mut h = harness(GatewayOptions::default());
    h.driver.push(MockResponse::Fail(DriverError::protocol(
        "Unable to interpret the update count in command completion tag: UPDATE",
    )));

    let affected = h
        .gateway
        .execute("UPDATE big SET flag = true;", &ExecuteOptions::default())
        .unwrap();

    assert_eq!(affected, None);
    assert!(!h.gateway.error_occurred());
    assert!(h.sleeper.slept().is_empty());
    assert!(!h.log.contains("Affected"));
}

#[test]
fn test_base_dialect_does_not_retry() {
    let mut h = harness_with_dialect(Arc::new(BaseDialect), continue_on_error());
    h.driver.push_failure(MAINTENANCE);

    let result = h
        .gateway
        .execute("VACUUM;", &ExecuteOptions::default())
        .unwrap();

    assert_eq!(result, None);
    assert_eq!(h.driver.statements().len(), 1);
    assert!(h.sleeper.slept().is_empty());
}

#[test]
fn test_query_decodes_rows() {
    let mut h = harness(GatewayOptions::default());
    h.driver.push(MockResponse::rows(
        vec![
            ColumnMeta::new("id", ColumnTypeTag::Integer),
            ColumnMeta::new("active", ColumnTypeTag::Bit),
            ColumnMeta::new("amount", ColumnTypeTag::Numeric),
            ColumnMeta::new("note", ColumnTypeTag::Varchar),
        ],
        vec![
            vec![
                Some("1".to_string()),
                Some("t".to_string()),
                Some("123.456".to_string()),
                None,
            ],
            vec![
                Some("2".to_string()),
                Some("f".to_string()),
                Some("0.1".to_string()),
                Some("second".to_string()),
            ],
        ],
    ));

    let rows = h
        .gateway
        .query("SELECT * FROM accounts;", &QueryOptions::default())
        .unwrap()
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("id"), Some(&Value::Int(1)));
    assert_eq!(rows[0].get("active"), Some(&Value::Bool(true)));
    assert_eq!(
        rows[0].get("amount").and_then(Value::as_decimal).map(|d| d.to_string()),
        Some("123.456".to_string())
    );
    assert_eq!(rows[0].get("note"), Some(&Value::Null));
    assert_eq!(rows[1].get("active"), Some(&Value::Bool(false)));
    assert_eq!(
        rows[1].names().collect::<Vec<_>>(),
        vec!["id", "active", "amount", "note"]
    );
}

#[test]
fn test_query_with_no_rows_is_empty_not_none() {
    let mut h = harness(GatewayOptions::default());

    let rows = h
        .gateway
        .query("SELECT 1 WHERE false;", &QueryOptions::default())
        .unwrap();

    assert_eq!(rows.map(|r| r.len()), Some(0));
}

#[test]
fn test_query_swallowed_failure_returns_none() {
    let mut h = harness(continue_on_error());
    h.driver.push_failure("ERROR: relation \"missing\" does not exist");

    let rows = h
        .gateway
        .query("SELECT * FROM missing;", &QueryOptions::quiet())
        .unwrap();

    assert!(rows.is_none());
    assert!(h.gateway.error_occurred());
}

#[test]
fn test_query_decode_failure_is_fatal() {
    let mut h = harness(GatewayOptions::default());
    h.driver.push(MockResponse::rows(
        vec![ColumnMeta::new("n", ColumnTypeTag::Integer)],
        vec![vec![Some("not a number".to_string())]],
    ));

    let err = h
        .gateway
        .query("SELECT n FROM odd;", &QueryOptions::default())
        .unwrap_err();

    assert!(matches!(err, WarehouseError::Decode(_)));
    assert!(h.gateway.error_occurred());
}

#[test]
fn test_secrets_are_masked_in_the_log() {
    let mut h = harness(GatewayOptions {
        secrets: vec!["s3cr3t".to_string()],
        env_secret: Some("AKIAENVSECRET".to_string()),
        ..Default::default()
    });

    h.gateway
        .execute(
            "COPY t FROM 's3://b/k' CREDENTIALS 'aws_secret_access_key=AKIAENVSECRET;token=s3cr3t';",
            &ExecuteOptions::default(),
        )
        .unwrap();

    let log = h.log.lines().join("\n");
    assert!(!log.contains("AKIAENVSECRET"));
    assert!(!log.contains("s3cr3t"));
    assert!(log.contains("aws_secret_access_key=*************;token=******"));
}

#[test]
fn test_session_settings_applied_at_construction() {
    let h = harness(GatewayOptions {
        session: SessionSettings {
            query_group: Some("etl".to_string()),
            query_slot_count: Some(2),
        },
        ..Default::default()
    });

    assert_eq!(
        h.driver.calls(),
        vec![
            MockCall::Update("SET query_group TO etl;".to_string()),
            MockCall::Update("SET wlm_query_slot_count TO 2;".to_string()),
        ]
    );
}

#[test]
fn test_close_closes_the_driver() {
    let mut h = harness(GatewayOptions::default());
    h.gateway.close().unwrap();
    assert!(h.driver.is_closed());
}
