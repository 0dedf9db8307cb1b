//! Statement execution gateway.
//!
//! Wraps one driver connection with failure classification, bounded retries,
//! session logging and the abort-or-continue policy for fatal failures.

use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use tracing::{debug, info, warn};

use super::retry::{Attempt, AttemptState, ClassifiedFailure, RetryExecutor, ThreadSleeper};
use crate::config::{ConnectionConfig, ExecutionConfig};
use crate::db::{decode_all, Cursor, Driver, PostgresDriver, Record, DEFAULT_FETCH_SIZE};
use crate::error::{DriverError, DriverErrorKind, Result, WarehouseError};
use crate::failure::{Dialect, DialectKind, FailureClassifier, FailureKind};
use crate::logging::SessionLog;

const TRANSACTION_STATEMENT_PATTERN: &str =
    r"^\s*(BEGIN|START\s+TRANSACTION|COMMIT|END|ROLLBACK|ABORT)\b";

/// Workload-management settings applied once when the gateway is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSettings {
    pub query_group: Option<String>,
    pub query_slot_count: Option<u32>,
}

/// Construction-time gateway settings.
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    /// Return fatal failures as errors instead of recording them.
    pub abort_on_error: bool,
    /// Default for per-call `quiet`.
    pub quiet: bool,
    /// Strings masked in the session log.
    pub secrets: Vec<String>,
    /// Environment credential, masked alongside `secrets`.
    pub env_secret: Option<String>,
    pub session: SessionSettings,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            abort_on_error: true,
            quiet: false,
            secrets: Vec::new(),
            env_secret: None,
            session: SessionSettings::default(),
        }
    }
}

impl GatewayOptions {
    /// Combines execution settings with a connection's session settings.
    pub fn from_config(execution: &ExecutionConfig, connection: &ConnectionConfig) -> Self {
        Self {
            abort_on_error: execution.abort_on_error,
            quiet: execution.quiet,
            secrets: execution.secrets.clone(),
            env_secret: execution.env_secret.clone(),
            session: SessionSettings {
                query_group: connection.query_group.clone(),
                query_slot_count: connection.query_slot_count,
            },
        }
    }
}

/// Options for `execute`.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Failure messages treated as success.
    pub ignore: Vec<String>,
    /// Overrides the gateway's `quiet` default.
    pub quiet: Option<bool>,
}

impl ExecuteOptions {
    pub fn quiet() -> Self {
        Self {
            ignore: Vec::new(),
            quiet: Some(true),
        }
    }

    pub fn ignoring(mut self, message: impl Into<String>) -> Self {
        self.ignore.push(message.into());
        self
    }
}

/// Options for `query`.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
    pub quiet: Option<bool>,
}

impl QueryOptions {
    pub fn quiet() -> Self {
        Self { quiet: Some(true) }
    }
}

/// Options for `streaming_query`.
#[derive(Debug, Clone, Copy)]
pub struct StreamOptions {
    /// Rows fetched per server round trip.
    pub fetch_size: usize,
    pub quiet: Option<bool>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            fetch_size: DEFAULT_FETCH_SIZE,
            quiet: None,
        }
    }
}

/// Retry, logging and abort policy shared by every gateway call.
struct FailurePolicy {
    retry: RetryExecutor,
    state: AttemptState,
    log: SessionLog,
    abort_on_error: bool,
}

impl FailurePolicy {
    fn give_up<T>(&mut self, failure: ClassifiedFailure) -> Result<Option<T>> {
        if failure.exhausted_retries {
            self.log
                .log(format!("Giving up after {} attempts", failure.attempts));
        }
        self.fatal(failure.error, WarehouseError::Query)
    }

    /// Streaming opens are classified once and never retried.
    fn stream_failure<T>(&mut self, error: DriverError) -> Result<Option<T>> {
        self.state.retry_count = 0;

        match self.retry.classifier().classify(error.message(), &[]) {
            FailureKind::Ignored | FailureKind::Interpretable(_) => Ok(None),
            FailureKind::Recoverable { .. } => {
                self.log
                    .log(format!("Failed with recoverable error: {}", error.message()));
                self.log.log("Streaming queries are not retried");
                self.fatal(error, WarehouseError::Query)
            }
            FailureKind::Fatal => self.fatal(error, WarehouseError::Query),
        }
    }

    /// Records a fatal failure and applies the abort-or-continue policy.
    fn fatal<T>(
        &mut self,
        error: DriverError,
        into_error: impl FnOnce(DriverError) -> WarehouseError,
    ) -> Result<Option<T>> {
        self.state.error_occurred = true;

        self.log.log(error.kind().as_str());
        self.log.log(error.message());
        if let Some(detail) = error.detail() {
            self.log.log(detail);
        }
        if !self.retry.classifier().dialect().is_native_failure(&error) {
            if let Some(trace) = error.trace() {
                self.log.log(trace);
            }
        }

        if self.abort_on_error {
            Err(into_error(error))
        } else {
            warn!(
                "Continuing after {} failure: {}",
                error.kind(),
                self.log.redact(error.message())
            );
            Ok(None)
        }
    }
}

/// Runs statements against one warehouse connection.
///
/// Recoverable failures are retried after the dialect's backoff, up to three
/// times per call. Fatal failures are returned as errors when
/// `abort_on_error` is set; otherwise they set the sticky
/// [`error_occurred`](Self::error_occurred) flag and the call returns `None`.
pub struct ExecutionGateway {
    driver: Box<dyn Driver>,
    policy: FailurePolicy,
    quiet: bool,
    transaction_statement: Regex,
}

impl std::fmt::Debug for ExecutionGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionGateway")
            .field("retry", &self.policy.retry)
            .field("state", &self.policy.state)
            .field("abort_on_error", &self.policy.abort_on_error)
            .field("quiet", &self.quiet)
            .finish()
    }
}

impl ExecutionGateway {
    /// Wraps an open driver. Session settings in `options` are applied
    /// before this returns.
    pub fn new(
        driver: Box<dyn Driver>,
        dialect: Arc<dyn Dialect>,
        options: GatewayOptions,
    ) -> Result<Self> {
        let retry = RetryExecutor::new(FailureClassifier::new(dialect)?, Box::new(ThreadSleeper));
        let log = SessionLog::new(options.secrets.clone(), options.env_secret.clone());
        Self::with_components(driver, retry, log, options)
    }

    /// Wraps an open driver with a caller-built retry executor and log.
    ///
    /// `options.secrets` is not consulted; `log` already carries its secrets.
    pub fn with_components(
        driver: Box<dyn Driver>,
        retry: RetryExecutor,
        log: SessionLog,
        options: GatewayOptions,
    ) -> Result<Self> {
        let transaction_statement = RegexBuilder::new(TRANSACTION_STATEMENT_PATTERN)
            .case_insensitive(true)
            .build()
            .map_err(|e| WarehouseError::internal(format!("Invalid statement pattern: {e}")))?;

        let mut gateway = Self {
            driver,
            policy: FailurePolicy {
                retry,
                state: AttemptState::default(),
                log,
                abort_on_error: options.abort_on_error,
            },
            quiet: options.quiet,
            transaction_statement,
        };
        gateway.apply_session_settings(&options.session)?;
        Ok(gateway)
    }

    /// Opens a PostgreSQL-wire connection, retrying per the dialect.
    ///
    /// A connection that cannot be opened is always an error, whatever
    /// `abort_on_error` says.
    pub fn connect(
        config: &ConnectionConfig,
        dialect: DialectKind,
        options: GatewayOptions,
    ) -> Result<Self> {
        let retry = RetryExecutor::new(
            FailureClassifier::new(dialect.build()?)?,
            Box::new(ThreadSleeper),
        );
        let log = SessionLog::new(options.secrets.clone(), options.env_secret.clone());
        Self::connect_with(config, retry, log, options)
    }

    /// Like [`connect`](Self::connect) with a caller-built retry executor and log.
    pub fn connect_with(
        config: &ConnectionConfig,
        retry: RetryExecutor,
        log: SessionLog,
        options: GatewayOptions,
    ) -> Result<Self> {
        info!("Connecting to {}", config.display_string());
        let mut state = AttemptState::default();

        let driver = match retry.run(&mut state, &[], &log, || PostgresDriver::connect(config)) {
            Attempt::Completed(driver) => driver,
            Attempt::GaveUp(failure) => {
                log.log(failure.error.message());
                return Err(connection_error(&failure.error, config));
            }
            Attempt::Ignored | Attempt::Interpreted(_) => {
                return Err(WarehouseError::internal(
                    "Connection attempt completed without a connection",
                ));
            }
        };

        info!("Connected to {}", config.display_string());
        Self::with_components(Box::new(driver), retry, log, options)
    }

    /// Runs one update-style statement.
    ///
    /// Returns the affected-row count (or the count recovered from an
    /// overflowed completion tag). `None` means the driver reported no count,
    /// the failure was on the ignore list, or a fatal failure was swallowed.
    pub fn execute(&mut self, sql: &str, options: &ExecuteOptions) -> Result<Option<u64>> {
        let quiet = options.quiet.unwrap_or(self.quiet);

        let affected = match self.attempt(sql, &options.ignore, quiet, |driver, sql| {
            driver.execute_update(sql)
        }) {
            Attempt::Completed(count) => count,
            Attempt::Ignored => None,
            Attempt::Interpreted(count) => count,
            Attempt::GaveUp(failure) => return self.policy.give_up(failure),
        };

        if let Some(count) = affected {
            if !quiet && !self.transaction_statement.is_match(sql) {
                self.policy.log.log(format!("Affected {count} row(s)."));
            }
        }

        Ok(affected)
    }

    /// Runs a read statement and decodes every row.
    ///
    /// An empty vector means zero rows; `None` means a fatal failure was
    /// swallowed.
    pub fn query(&mut self, sql: &str, options: &QueryOptions) -> Result<Option<Vec<Record>>> {
        let quiet = options.quiet.unwrap_or(self.quiet);

        let mut cursor = match self.attempt(sql, &[], quiet, |driver, sql| driver.execute_query(sql))
        {
            Attempt::Completed(cursor) => cursor,
            Attempt::Ignored | Attempt::Interpreted(_) => return Ok(Some(Vec::new())),
            Attempt::GaveUp(failure) => return self.policy.give_up(failure),
        };

        let decoded = decode_all(&mut *cursor);
        if let Err(e) = cursor.close() {
            debug!("Failed to close result cursor: {}", e);
        }

        match decoded {
            Ok(rows) => Ok(Some(rows)),
            Err(error) => self
                .policy
                .fatal(error, |e| WarehouseError::decode(e.message())),
        }
    }

    /// Opens a server-side cursor for a large result.
    ///
    /// Auto-commit is switched off for the cursor's lifetime. The caller
    /// closes the cursor and then calls
    /// [`restore_auto_commit`](Self::restore_auto_commit). A failure is
    /// classified once and never retried; the connection is back in
    /// auto-commit mode when it is reported.
    pub fn streaming_query(
        &mut self,
        sql: &str,
        options: &StreamOptions,
    ) -> Result<Option<Box<dyn Cursor + '_>>> {
        let quiet = options.quiet.unwrap_or(self.quiet);

        if let Err(error) = self.driver.set_auto_commit(false) {
            return self.policy.stream_failure(error);
        }
        if !quiet {
            self.policy.log.log(sql);
        }

        match self.driver.open_streaming_cursor(sql, options.fetch_size) {
            Ok(cursor) => {
                self.policy.state.retry_count = 0;
                Ok(Some(cursor))
            }
            Err(error) => self.policy.stream_failure(error),
        }
    }

    /// Re-enables auto-commit after a streaming query.
    pub fn restore_auto_commit(&mut self) -> Result<()> {
        self.driver.set_auto_commit(true)?;
        Ok(())
    }

    /// True once any fatal failure has been swallowed or raised.
    pub fn error_occurred(&self) -> bool {
        self.policy.state.error_occurred
    }

    pub fn clear_error_state(&mut self) {
        self.policy.state.error_occurred = false;
    }

    /// Retries spent by the call in progress; zero between calls.
    pub fn retry_count(&self) -> u32 {
        self.policy.state.retry_count
    }

    pub fn abort_on_error(&self) -> bool {
        self.policy.abort_on_error
    }

    pub fn dialect(&self) -> &Arc<dyn Dialect> {
        self.policy.retry.classifier().dialect()
    }

    pub fn log(&self) -> &SessionLog {
        &self.policy.log
    }

    /// Closes the underlying connection.
    pub fn close(&mut self) -> Result<()> {
        self.driver.close()?;
        info!("Connection closed");
        Ok(())
    }

    fn apply_session_settings(&mut self, settings: &SessionSettings) -> Result<()> {
        if let Some(group) = &settings.query_group {
            self.set_query_group(group)?;
        }
        if let Some(count) = settings.query_slot_count {
            self.set_query_slot_count(count)?;
        }
        Ok(())
    }

    /// Runs `op` through the retry loop, echoing `sql` before every attempt
    /// unless quiet.
    fn attempt<T, F>(&mut self, sql: &str, ignore: &[String], quiet: bool, mut op: F) -> Attempt<T>
    where
        F: FnMut(&mut dyn Driver, &str) -> std::result::Result<T, DriverError>,
    {
        let driver = &mut self.driver;
        let FailurePolicy {
            retry, state, log, ..
        } = &mut self.policy;
        let log: &SessionLog = log;

        retry.run(state, ignore, log, || {
            if !quiet {
                log.log(sql);
            }
            op(&mut **driver, sql)
        })
    }
}

/// Turns a failed connection attempt into a message the operator can act on.
fn connection_error(error: &DriverError, config: &ConnectionConfig) -> WarehouseError {
    let host = config.host.as_deref().unwrap_or("localhost");
    let port = config.port;
    let user = config.user.as_deref().unwrap_or("unknown");
    let database = config.database.as_deref().unwrap_or("unknown");

    let message = error.message().to_lowercase();

    if error.kind() == DriverErrorKind::Io && message.contains("connection refused") {
        WarehouseError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if message.contains("authentication failed") {
        WarehouseError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if message.contains("does not exist") && message.contains("database") {
        WarehouseError::connection(format!("Database '{database}' does not exist."))
    } else if error.kind() == DriverErrorKind::Timeout {
        WarehouseError::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        WarehouseError::connection(error.message().to_string())
    }
}
