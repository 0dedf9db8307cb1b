//! Integration tests for warehouse-exec.
//!
//! Gateway scenarios run against the mock driver. Tests that need a live
//! PostgreSQL-wire server read DATABASE_URL and skip when it is unset.

pub mod gateway_test;
pub mod script_test;
pub mod streaming_test;

use std::sync::Arc;

use warehouse_exec::config::ConnectionConfig;
use warehouse_exec::db::{MockDriver, MockHandle};
use warehouse_exec::failure::{Dialect, FailureClassifier, RedshiftDialect};
use warehouse_exec::logging::{MemorySink, SessionLog};
use warehouse_exec::query::{ExecutionGateway, GatewayOptions, RecordingSleeper, RetryExecutor};

/// A gateway over a mock driver, with its observers.
pub struct Harness {
    pub gateway: ExecutionGateway,
    pub driver: MockHandle,
    pub sleeper: RecordingSleeper,
    pub log: MemorySink,
}

/// Builds a Redshift-dialect gateway over a fresh mock driver.
pub fn harness(options: GatewayOptions) -> Harness {
    harness_with_dialect(Arc::new(RedshiftDialect::new().unwrap()), options)
}

pub fn harness_with_dialect(dialect: Arc<dyn Dialect>, options: GatewayOptions) -> Harness {
    let driver = MockDriver::new();
    let handle = driver.handle();
    let sleeper = RecordingSleeper::new();
    let sink = MemorySink::new();

    let classifier = FailureClassifier::new(dialect).expect("classifier");
    let retry = RetryExecutor::new(classifier, Box::new(sleeper.clone()));
    let log = SessionLog::with_sink(
        options.secrets.clone(),
        options.env_secret.clone(),
        Arc::new(sink.clone()),
    );
    let gateway = ExecutionGateway::with_components(Box::new(driver), retry, log, options)
        .expect("gateway over a mock driver");

    Harness {
        gateway,
        driver: handle,
        sleeper,
        log: sink,
    }
}

/// Options with `abort_on_error` turned off.
pub fn continue_on_error() -> GatewayOptions {
    GatewayOptions {
        abort_on_error: false,
        ..Default::default()
    }
}

/// Connection config from DATABASE_URL, if set.
pub fn test_connection_config() -> Option<ConnectionConfig> {
    let url = std::env::var("DATABASE_URL").ok()?;
    ConnectionConfig::from_connection_string(&url).ok()
}
