//! Backend dialects.
//!
//! A dialect supplies the recoverable patterns, backoff durations and native
//! error identity of one backend. The retry machinery only talks to the
//! `Dialect` trait.

use regex::{Regex, RegexBuilder};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::RecoverableSubtype;
use crate::db::{BACKEND_IO_ERROR_MESSAGE, CONNECTION_REFUSED_MESSAGE};
use crate::error::{DriverError, DriverErrorKind, Result, WarehouseError};

/// Backoff for any recoverable failure without a specific override.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(60);

const MAINTENANCE_BACKOFF: Duration = Duration::from_secs(900);
const CONNECTION_REFUSED_BACKOFF: Duration = Duration::from_secs(600);

/// Backend-specific failure policy.
pub trait Dialect: Send + Sync + fmt::Debug {
    /// Short name for logs and configuration.
    fn name(&self) -> &'static str;

    /// Recognizes a transient condition in a failure message.
    fn classify_additional(&self, message: &str) -> Option<RecoverableSubtype>;

    /// How long to wait before retrying after `subtype`.
    fn backoff_for(&self, _subtype: RecoverableSubtype) -> Duration {
        DEFAULT_BACKOFF
    }

    /// True when `error` is the backend's own SQL error, whose backtrace is
    /// noise in the logs.
    fn is_native_failure(&self, error: &DriverError) -> bool;
}

/// Plain PostgreSQL: nothing is recoverable.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaseDialect;

impl Dialect for BaseDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn classify_additional(&self, _message: &str) -> Option<RecoverableSubtype> {
        None
    }

    fn is_native_failure(&self, _error: &DriverError) -> bool {
        false
    }
}

/// Amazon Redshift.
#[derive(Debug, Clone)]
pub struct RedshiftDialect {
    patterns: Vec<(Regex, RecoverableSubtype)>,
}

impl RedshiftDialect {
    pub fn new() -> Result<Self> {
        let patterns = [
            (
                "S3ServiceException:speed limit exceeded",
                RecoverableSubtype::S3SpeedLimitExceeded,
            ),
            (
                "Communications link failure",
                RecoverableSubtype::CommunicationsLinkFailure,
            ),
            ("VACUUM is running", RecoverableSubtype::VacuumRunning),
            (
                "system is in maintenance mode",
                RecoverableSubtype::MaintenanceMode,
            ),
        ]
        .into_iter()
        .map(|(pattern, subtype)| {
            RegexBuilder::new(&regex::escape(pattern))
                .case_insensitive(true)
                .build()
                .map(|regex| (regex, subtype))
                .map_err(|e| WarehouseError::internal(format!("Invalid failure pattern: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;

        Ok(Self { patterns })
    }
}

impl Dialect for RedshiftDialect {
    fn name(&self) -> &'static str {
        "redshift"
    }

    fn classify_additional(&self, message: &str) -> Option<RecoverableSubtype> {
        if let Some((_, subtype)) = self.patterns.iter().find(|(re, _)| re.is_match(message)) {
            return Some(*subtype);
        }

        if message == CONNECTION_REFUSED_MESSAGE {
            Some(RecoverableSubtype::ConnectionRefused)
        } else if message == BACKEND_IO_ERROR_MESSAGE {
            Some(RecoverableSubtype::IoBackendError)
        } else {
            None
        }
    }

    fn backoff_for(&self, subtype: RecoverableSubtype) -> Duration {
        match subtype {
            RecoverableSubtype::MaintenanceMode => MAINTENANCE_BACKOFF,
            RecoverableSubtype::ConnectionRefused => CONNECTION_REFUSED_BACKOFF,
            _ => DEFAULT_BACKOFF,
        }
    }

    fn is_native_failure(&self, error: &DriverError) -> bool {
        error.kind() == DriverErrorKind::Database
    }
}

/// Supported dialects, as named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[default]
    Redshift,
    Postgres,
}

impl DialectKind {
    /// Returns the dialect as a string for configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Redshift => "redshift",
            Self::Postgres => "postgres",
        }
    }

    /// Parses a dialect from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "redshift" => Some(Self::Redshift),
            "postgres" | "postgresql" => Some(Self::Postgres),
            _ => None,
        }
    }

    /// Builds the dialect strategy.
    pub fn build(&self) -> Result<Arc<dyn Dialect>> {
        Ok(match self {
            Self::Redshift => Arc::new(RedshiftDialect::new()?),
            Self::Postgres => Arc::new(BaseDialect),
        })
    }
}
