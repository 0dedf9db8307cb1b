//! Database abstraction layer for warehouse-exec.
//!
//! Provides a synchronous driver interface (one connection, one statement
//! slot) and the typed decoding of its result cursors.

mod cursor;
mod decode;
mod mock;
mod postgres;
mod types;

pub use cursor::{Cursor, TextCursor, TextRow};
pub use decode::{decode_all, decode_column, decode_row};
pub use mock::{MockCall, MockDriver, MockHandle, MockResponse};
pub use postgres::PostgresDriver;
pub use types::{ColumnMeta, ColumnTypeTag, Record, Value, OTHER_TYPE_CODE};

use crate::error::DriverError;

/// Message the wire driver reports when the server refuses the connection.
pub const CONNECTION_REFUSED_MESSAGE: &str = "Connection refused. Check that the hostname and \
port are correct and that the postmaster is accepting TCP/IP connections.";

/// Message the wire driver reports when an established connection breaks.
pub const BACKEND_IO_ERROR_MESSAGE: &str = "An I/O error occurred while sending to the backend";

/// Default number of rows fetched per round trip by a streaming cursor.
pub const DEFAULT_FETCH_SIZE: usize = 100_000;

/// Trait defining the interface for physical driver connections.
///
/// Every call blocks the calling thread until the server answers. The driver
/// owns exactly one connection; `&mut self` keeps statements strictly serial.
pub trait Driver: Send {
    /// Executes an update-style statement and returns the affected-row count,
    /// if the server reported one.
    fn execute_update(&mut self, sql: &str) -> Result<Option<u64>, DriverError>;

    /// Executes a read statement and returns its fully fetched result.
    fn execute_query(&mut self, sql: &str) -> Result<Box<dyn Cursor>, DriverError>;

    /// Turns auto-commit on or off. Turning it off opens a transaction that
    /// lasts until auto-commit is turned back on.
    fn set_auto_commit(&mut self, enabled: bool) -> Result<(), DriverError>;

    /// Opens a server-side cursor fetching `fetch_size` rows per round trip.
    ///
    /// Requires auto-commit to be off. A failed open rolls the transaction
    /// back and leaves the connection in auto-commit mode.
    fn open_streaming_cursor(
        &mut self,
        sql: &str,
        fetch_size: usize,
    ) -> Result<Box<dyn Cursor + '_>, DriverError>;

    /// Closes the connection.
    fn close(&mut self) -> Result<(), DriverError>;
}
