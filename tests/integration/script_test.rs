//! Script execution tests.

use std::io::Write;

use pretty_assertions::assert_eq;
use tempfile::NamedTempFile;
use warehouse_exec::error::WarehouseError;
use warehouse_exec::query::{ExecuteOptions, GatewayOptions, ScriptOptions};

use super::{continue_on_error, harness};

fn script(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

const NIGHTLY: &str = "\
-- nightly rebuild of ${schema}.daily
DROP TABLE IF EXISTS ${schema}.daily;

CREATE TABLE ${schema}.daily AS
SELECT day, count(*) AS n
FROM ${schema}.events
GROUP BY day;
  -- done
";

#[test]
fn test_script_runs_each_statement_in_order() {
    let mut h = harness(GatewayOptions::default());
    let file = script(NIGHTLY);

    let options = ScriptOptions {
        variables: [("schema".to_string(), "staging".to_string())].into(),
        ..Default::default()
    };
    let count = h.gateway.execute_script(file.path(), &options).unwrap();

    assert_eq!(count, 2);
    assert_eq!(
        h.driver.statements(),
        vec![
            "DROP TABLE IF EXISTS staging.daily;",
            "CREATE TABLE staging.daily AS\nSELECT day, count(*) AS n\nFROM staging.events\nGROUP BY day;",
        ]
    );
}

#[test]
fn test_script_stops_at_first_fatal_failure() {
    let mut h = harness(GatewayOptions::default());
    h.driver.push_failure("ERROR: permission denied for relation a");
    let file = script("DELETE FROM a;\nDELETE FROM b;\n");

    let err = h
        .gateway
        .execute_script(file.path(), &ScriptOptions::default())
        .unwrap_err();

    assert!(matches!(err, WarehouseError::Query(_)));
    assert_eq!(h.driver.statements(), vec!["DELETE FROM a;"]);
}

#[test]
fn test_script_continues_past_failures_when_configured() {
    let mut h = harness(continue_on_error());
    h.driver.push_failure("ERROR: permission denied for relation a");
    let file = script("DELETE FROM a;\nDELETE FROM b;\n");

    let count = h
        .gateway
        .execute_script(file.path(), &ScriptOptions::default())
        .unwrap();

    assert_eq!(count, 2);
    assert_eq!(h.driver.statements().len(), 2);
    assert!(h.gateway.error_occurred());
}

#[test]
fn test_script_options_apply_to_every_statement() {
    let mut h = harness(GatewayOptions::default());
    let file = script("SELECT 1;\nSELECT 2;\n");

    let options = ScriptOptions {
        execute: ExecuteOptions::quiet(),
        ..Default::default()
    };
    h.gateway.execute_script(file.path(), &options).unwrap();

    assert!(h.log.lines().is_empty());
}

#[test]
fn test_missing_script_file() {
    let mut h = harness(GatewayOptions::default());

    let err = h
        .gateway
        .execute_script("/nonexistent/whexec/script.sql", &ScriptOptions::default())
        .unwrap_err();

    assert!(matches!(err, WarehouseError::Script(_)));
    assert!(h.driver.statements().is_empty());
}

#[test]
fn test_undefined_variable_runs_nothing() {
    let mut h = harness(GatewayOptions::default());
    let file = script("SELECT 1;\nSELECT * FROM ${missing};\n");

    let err = h
        .gateway
        .execute_script(file.path(), &ScriptOptions::default())
        .unwrap_err();

    assert!(err.to_string().contains("missing"));
    assert!(h.driver.statements().is_empty());
}
