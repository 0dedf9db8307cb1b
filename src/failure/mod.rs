//! Failure classification module.
//!
//! Inspects the message of a failed driver call and decides whether it is
//! ignored, interpreted as a success, retried after a backoff, or fatal.

mod classifier;
mod dialect;

pub use classifier::FailureClassifier;
pub use dialect::{BaseDialect, Dialect, DialectKind, RedshiftDialect, DEFAULT_BACKOFF};

use std::fmt;
use std::time::Duration;

/// Transient backend conditions a dialect may recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecoverableSubtype {
    /// The server refused the connection (cluster restarting).
    ConnectionRefused,
    /// An established connection broke mid-statement.
    IoBackendError,
    /// S3 throttled a COPY or UNLOAD.
    S3SpeedLimitExceeded,
    /// The network link to the server dropped.
    CommunicationsLinkFailure,
    /// A concurrent VACUUM holds the table.
    VacuumRunning,
    /// The cluster is in a maintenance window.
    MaintenanceMode,
}

impl fmt::Display for RecoverableSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ConnectionRefused => "connection refused",
            Self::IoBackendError => "backend I/O error",
            Self::S3SpeedLimitExceeded => "S3 speed limit exceeded",
            Self::CommunicationsLinkFailure => "communications link failure",
            Self::VacuumRunning => "VACUUM running",
            Self::MaintenanceMode => "maintenance mode",
        };
        f.write_str(label)
    }
}

/// A failure whose message encodes the result of a side effect that succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpretation {
    /// The update count overflowed the driver's 32-bit counter; the rows were
    /// still written. `count` is `None` when the tag carries no readable number.
    UpdateCountOverflow { count: Option<u64> },
}

impl Interpretation {
    /// The value recovered from the message, if any.
    pub fn count(&self) -> Option<u64> {
        match self {
            Self::UpdateCountOverflow { count } => *count,
        }
    }
}

/// Classification of one failure message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The message is on the caller's ignore list.
    Ignored,
    /// A benign driver quirk; the value is recoverable from the message.
    Interpretable(Interpretation),
    /// A transient backend condition worth retrying after `backoff`.
    Recoverable {
        subtype: RecoverableSubtype,
        backoff: Duration,
    },
    /// Anything else.
    Fatal,
}

impl FailureKind {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ignored => write!(f, "Ignored"),
            Self::Interpretable(Interpretation::UpdateCountOverflow { count: Some(count) }) => {
                write!(f, "Interpretable (update count {count})")
            }
            Self::Interpretable(Interpretation::UpdateCountOverflow { count: None }) => {
                write!(f, "Interpretable (update count unknown)")
            }
            Self::Recoverable { subtype, backoff } => {
                write!(f, "Recoverable ({subtype}, {}s backoff)", backoff.as_secs())
            }
            Self::Fatal => write!(f, "Fatal"),
        }
    }
}
