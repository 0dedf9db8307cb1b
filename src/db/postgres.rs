//! PostgreSQL-wire driver implementation.
//!
//! Provides the `PostgresDriver` struct that implements the `Driver` trait for
//! Redshift and PostgreSQL using sqlx. Each driver owns a single connection and
//! a current-thread tokio runtime it blocks on, so callers see a plain
//! synchronous API.
//!
//! Statements go through the simple query protocol, which returns every cell
//! in the server's text rendering. That rendering is what the cursor
//! accessors parse.

use std::future::Future;
use std::time::Duration;

use sqlx::postgres::{
    PgColumn, PgConnection, PgDatabaseError, PgQueryResult, PgRow, PgValueFormat,
};
use sqlx::{Column as SqlxColumn, Connection, Executor, Row as SqlxRow, TypeInfo, ValueRef};
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

use super::cursor::{Cursor, TextCursor, TextRow};
use super::types::{ColumnMeta, ColumnTypeTag};
use super::{Driver, BACKEND_IO_ERROR_MESSAGE, CONNECTION_REFUSED_MESSAGE};
use crate::config::ConnectionConfig;
use crate::error::{DriverError, DriverErrorKind};

/// PostgreSQL-wire driver holding one connection.
pub struct PostgresDriver {
    runtime: Runtime,
    conn: Option<PgConnection>,
    statement_timeout: Option<Duration>,
    auto_commit: bool,
    cursor_seq: u64,
}

impl std::fmt::Debug for PostgresDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresDriver")
            .field("open", &self.conn.is_some())
            .field("statement_timeout", &self.statement_timeout)
            .field("auto_commit", &self.auto_commit)
            .finish()
    }
}

impl PostgresDriver {
    /// Opens a single connection described by `config`.
    ///
    /// This is one physical attempt; retrying is the caller's business.
    pub fn connect(config: &ConnectionConfig) -> Result<Self, DriverError> {
        let conn_str = config
            .to_connection_string()
            .map_err(|e| DriverError::new(DriverErrorKind::Configuration, e.to_string()))?;

        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| DriverError::io(format!("Failed to start driver runtime: {e}")))?;

        debug!("Opening connection to {}", config.display_string());
        let conn = block_on(&runtime, PgConnection::connect(&conn_str))?;
        debug!("Successfully connected to database");

        let mut driver = Self {
            runtime,
            conn: Some(conn),
            statement_timeout: config.statement_timeout(),
            auto_commit: true,
            cursor_seq: 0,
        };

        // The server cancels overlong statements, so a timed-out statement
        // never commits and the connection stays in sync.
        if let Some(limit) = driver.statement_timeout {
            driver.run_statement(&statement_timeout_sql(limit))?;
        }

        Ok(driver)
    }

    fn run_statement(&mut self, sql: &str) -> Result<PgQueryResult, DriverError> {
        let conn = self.conn.as_mut().ok_or_else(closed_error)?;
        block_on(&self.runtime, sqlx::raw_sql(sql).execute(&mut *conn))
    }

    fn fetch_rows(&mut self, sql: &str) -> Result<Vec<PgRow>, DriverError> {
        let conn = self.conn.as_mut().ok_or_else(closed_error)?;
        block_on(&self.runtime, sqlx::raw_sql(sql).fetch_all(&mut *conn))
    }

    /// Builds a cursor over `rows`, asking the server for the column
    /// description of `sql` when no row carries it.
    fn result_cursor(&mut self, sql: &str, rows: &[PgRow]) -> Result<TextCursor, DriverError> {
        let columns = match rows.first() {
            Some(row) => row.columns().iter().map(column_meta).collect(),
            None => self.describe_columns(sql),
        };
        text_cursor(columns, rows)
    }

    fn describe_columns(&mut self, sql: &str) -> Vec<ColumnMeta> {
        let Some(conn) = self.conn.as_mut() else {
            return Vec::new();
        };
        match self.runtime.block_on((&mut *conn).describe(sql)) {
            Ok(description) => description.columns().iter().map(column_meta).collect(),
            Err(e) => {
                debug!("No column description for empty result: {}", e);
                Vec::new()
            }
        }
    }

    fn declare_and_fetch(
        &mut self,
        name: &str,
        sql: &str,
        fetch_size: usize,
    ) -> Result<TextCursor, DriverError> {
        let body = sql.trim().trim_end_matches(';');
        self.run_statement(&format!("DECLARE {name} CURSOR FOR {body}"))?;
        let rows = self.fetch_rows(&format!("FETCH FORWARD {fetch_size} FROM {name}"))?;
        self.result_cursor(body, &rows)
    }

    /// Rolls back the open transaction and returns to auto-commit.
    fn abandon_transaction(&mut self) {
        if let Err(e) = self.run_statement("ROLLBACK") {
            debug!("Rollback after failed cursor open failed: {}", e);
        }
        self.auto_commit = true;
    }
}

impl Driver for PostgresDriver {
    fn execute_update(&mut self, sql: &str) -> Result<Option<u64>, DriverError> {
        let result = self.run_statement(sql)?;
        Ok(Some(result.rows_affected()))
    }

    fn execute_query(&mut self, sql: &str) -> Result<Box<dyn Cursor>, DriverError> {
        let rows = self.fetch_rows(sql)?;
        Ok(Box::new(self.result_cursor(sql, &rows)?))
    }

    fn set_auto_commit(&mut self, enabled: bool) -> Result<(), DriverError> {
        if enabled == self.auto_commit {
            return Ok(());
        }

        self.run_statement(if enabled { "COMMIT" } else { "BEGIN" })?;
        self.auto_commit = enabled;
        debug!("Auto-commit {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    fn open_streaming_cursor(
        &mut self,
        sql: &str,
        fetch_size: usize,
    ) -> Result<Box<dyn Cursor + '_>, DriverError> {
        if self.auto_commit {
            return Err(DriverError::protocol(
                "Cursor based results require auto-commit to be disabled",
            ));
        }

        self.cursor_seq += 1;
        let name = format!("whexec_cursor_{}", self.cursor_seq);
        let fetch_size = fetch_size.max(1);

        let buffer = match self.declare_and_fetch(&name, sql, fetch_size) {
            Ok(buffer) => buffer,
            Err(e) => {
                self.abandon_transaction();
                return Err(e);
            }
        };

        Ok(Box::new(PgStreamingCursor {
            driver: self,
            name,
            fetch_size,
            columns: buffer.columns().to_vec(),
            exhausted: buffer.remaining() < fetch_size,
            buffer,
        }))
    }

    fn close(&mut self) -> Result<(), DriverError> {
        if let Some(conn) = self.conn.take() {
            self.runtime.block_on(conn.close()).map_err(map_sqlx_error)?;
        }
        Ok(())
    }
}

/// Server-side cursor that fetches `fetch_size` rows per round trip.
struct PgStreamingCursor<'a> {
    driver: &'a mut PostgresDriver,
    name: String,
    fetch_size: usize,
    columns: Vec<ColumnMeta>,
    buffer: TextCursor,
    exhausted: bool,
}

impl PgStreamingCursor<'_> {
    fn fetch_batch(&mut self) -> Result<(), DriverError> {
        let sql = format!("FETCH FORWARD {} FROM {}", self.fetch_size, self.name);
        let rows = self.driver.fetch_rows(&sql)?;
        debug!("Fetched {} rows from {}", rows.len(), self.name);

        self.exhausted = rows.len() < self.fetch_size;
        self.buffer = text_cursor(self.columns.clone(), &rows)?;
        Ok(())
    }
}

impl Cursor for PgStreamingCursor<'_> {
    fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    fn advance(&mut self) -> Result<bool, DriverError> {
        loop {
            if self.buffer.advance()? {
                return Ok(true);
            }
            if self.exhausted {
                return Ok(false);
            }
            self.fetch_batch()?;
        }
    }

    fn get_string(&self, index: usize) -> Result<Option<String>, DriverError> {
        self.buffer.get_string(index)
    }

    fn get_i32(&self, index: usize) -> Result<i32, DriverError> {
        self.buffer.get_i32(index)
    }

    fn get_i64(&self, index: usize) -> Result<i64, DriverError> {
        self.buffer.get_i64(index)
    }

    fn get_date(&self, index: usize) -> Result<chrono::NaiveDate, DriverError> {
        self.buffer.get_date(index)
    }

    fn get_time(&self, index: usize) -> Result<chrono::NaiveTime, DriverError> {
        self.buffer.get_time(index)
    }

    fn get_timestamp_text(&self, index: usize) -> Result<String, DriverError> {
        self.buffer.get_timestamp_text(index)
    }

    fn close(mut self: Box<Self>) -> Result<(), DriverError> {
        let sql = format!("CLOSE {}", self.name);
        self.driver.run_statement(&sql).map(|_| ())
    }
}

fn block_on<T, F>(runtime: &Runtime, fut: F) -> Result<T, DriverError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    runtime.block_on(fut).map_err(map_sqlx_error)
}

fn statement_timeout_sql(limit: Duration) -> String {
    format!("SET statement_timeout TO {}", limit.as_millis())
}

fn closed_error() -> DriverError {
    DriverError::protocol("This connection has been closed.")
}

fn column_meta(col: &PgColumn) -> ColumnMeta {
    ColumnMeta::new(
        col.name(),
        ColumnTypeTag::from_pg_type_name(col.type_info().name()),
    )
}

/// Materializes fetched rows into a text cursor.
fn text_cursor(columns: Vec<ColumnMeta>, rows: &[PgRow]) -> Result<TextCursor, DriverError> {
    let text_rows = rows
        .iter()
        .map(row_to_text)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TextCursor::new(columns, text_rows))
}

fn row_to_text(row: &PgRow) -> Result<TextRow, DriverError> {
    (0..row.len())
        .map(|index| {
            let raw = row.try_get_raw(index).map_err(map_sqlx_error)?;
            if raw.is_null() {
                return Ok(None);
            }
            match raw.format() {
                PgValueFormat::Text => raw
                    .as_str()
                    .map(|s| Some(s.to_owned()))
                    .map_err(|e| DriverError::conversion(e.to_string())),
                PgValueFormat::Binary => Err(DriverError::protocol(format!(
                    "Unexpected binary value in column {index}"
                ))),
            }
        })
        .collect()
}

/// Translates a sqlx error into the wire driver's failure vocabulary.
///
/// Socket failures collapse onto the canonical refused/broken-connection
/// messages; server errors read `ERROR: <message>` with DETAIL and HINT kept
/// aside so ignore lists can match the message exactly.
fn map_sqlx_error(error: sqlx::Error) -> DriverError {
    match error {
        sqlx::Error::Database(db_error) => {
            let err = DriverError::database(format!("ERROR: {}", db_error.message()));

            let mut detail = String::new();
            if let Some(pg_error) = db_error.try_downcast_ref::<PgDatabaseError>() {
                if let Some(d) = pg_error.detail() {
                    detail.push_str("DETAIL: ");
                    detail.push_str(d);
                }
                if let Some(hint) = pg_error.hint() {
                    if !detail.is_empty() {
                        detail.push('\n');
                    }
                    detail.push_str("HINT: ");
                    detail.push_str(hint);
                }
            }

            if detail.is_empty() {
                err
            } else {
                err.with_detail(detail)
            }
        }
        sqlx::Error::Io(io_error) => {
            let message = if io_error.kind() == std::io::ErrorKind::ConnectionRefused {
                CONNECTION_REFUSED_MESSAGE
            } else {
                BACKEND_IO_ERROR_MESSAGE
            };
            DriverError::io(message).with_detail(io_error.to_string())
        }
        sqlx::Error::Configuration(e) => {
            DriverError::new(DriverErrorKind::Configuration, e.to_string())
        }
        sqlx::Error::PoolTimedOut => DriverError::new(
            DriverErrorKind::Timeout,
            "Timed out waiting for the connection",
        ),
        other => DriverError::protocol(other.to_string()),
    }
}
