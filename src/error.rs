//! Error types for warehouse-exec.
//!
//! `DriverError` is what a single physical driver call fails with; its message
//! is the only signal the failure classifier sees. `WarehouseError` is what the
//! public API returns.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use thiserror::Error;

/// Broad origin of a driver failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverErrorKind {
    /// The server rejected the statement (syntax errors, missing relations, etc.)
    Database,
    /// Socket-level failure: refused, reset or broken connection.
    Io,
    /// Wire protocol or TLS failure.
    Protocol,
    /// The statement exceeded the configured timeout.
    Timeout,
    /// A cell could not be converted by a typed accessor.
    Conversion,
    /// Invalid connection parameters.
    Configuration,
}

impl DriverErrorKind {
    /// Returns the kind as a display label, used in failure logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Database => "DatabaseError",
            Self::Io => "IoError",
            Self::Protocol => "ProtocolError",
            Self::Timeout => "TimeoutError",
            Self::Conversion => "ConversionError",
            Self::Configuration => "ConfigurationError",
        }
    }
}

impl fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure raised by one physical driver call.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct DriverError {
    kind: DriverErrorKind,
    message: String,
    detail: Option<String>,
    trace: Option<String>,
}

impl DriverError {
    /// Creates a driver error, capturing a backtrace when `RUST_BACKTRACE` enables it.
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        let backtrace = Backtrace::capture();
        let trace = match backtrace.status() {
            BacktraceStatus::Captured => Some(backtrace.to_string()),
            _ => None,
        };

        Self {
            kind,
            message: message.into(),
            detail: None,
            trace,
        }
    }

    /// Creates a server-side error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Database, message)
    }

    /// Creates a socket-level error.
    pub fn io(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Io, message)
    }

    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Protocol, message)
    }

    /// Creates a cell conversion error.
    pub fn conversion(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Conversion, message)
    }

    /// Attaches secondary detail (DETAIL/HINT lines, underlying OS error).
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn kind(&self) -> DriverErrorKind {
        self.kind
    }

    /// The message text used for classification.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// The backtrace captured at construction, if backtraces were enabled.
    pub fn trace(&self) -> Option<&str> {
        self.trace.as_deref()
    }
}

/// Main error type for warehouse-exec operations.
#[derive(Error, Debug)]
pub enum WarehouseError {
    /// The connection could not be opened (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// A statement failed fatally and the gateway is configured to abort.
    #[error("Query error: {0}")]
    Query(#[from] DriverError),

    /// A result cell could not be decoded into a typed value.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// SQL script errors (unreadable file, etc.)
    #[error("Script error: {0}")]
    Script(String),

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WarehouseError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a decode error with the given message.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a script error with the given message.
    pub fn script(msg: impl Into<String>) -> Self {
        Self::Script(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the driver failure behind a query error, if any.
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            Self::Query(e) => Some(e),
            _ => None,
        }
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Decode(_) => "Decode Error",
            Self::Config(_) => "Configuration Error",
            Self::Script(_) => "Script Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using WarehouseError.
pub type Result<T> = std::result::Result<T, WarehouseError>;
