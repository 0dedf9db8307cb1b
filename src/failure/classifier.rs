//! Failure message classification.

use regex::{Regex, RegexBuilder};
use std::sync::Arc;

use super::{Dialect, FailureKind, Interpretation};
use crate::error::{Result, WarehouseError};

/// The driver keeps update counts in a 32-bit int; larger counts surface as
/// this error even though every row was written.
const UPDATE_COUNT_OVERFLOW_PATTERN: &str =
    "Unable to interpret the update count in command completion tag: ";

/// Classifies failure messages against a caller ignore list, the known driver
/// quirks and the active dialect's recoverable set.
#[derive(Debug, Clone)]
pub struct FailureClassifier {
    dialect: Arc<dyn Dialect>,
    update_count_overflow: Regex,
}

impl FailureClassifier {
    /// Creates a classifier for the given dialect.
    pub fn new(dialect: Arc<dyn Dialect>) -> Result<Self> {
        let update_count_overflow = RegexBuilder::new(&regex::escape(UPDATE_COUNT_OVERFLOW_PATTERN))
            .case_insensitive(true)
            .build()
            .map_err(|e| WarehouseError::internal(format!("Invalid failure pattern: {e}")))?;

        Ok(Self {
            dialect,
            update_count_overflow,
        })
    }

    pub fn dialect(&self) -> &Arc<dyn Dialect> {
        &self.dialect
    }

    /// Classifies one failure message. First match wins:
    /// ignore list, interpretable quirk, dialect-recoverable, fatal.
    pub fn classify(&self, message: &str, ignore: &[String]) -> FailureKind {
        if ignore.iter().any(|ignored| ignored == message) {
            return FailureKind::Ignored;
        }

        if let Some(interpretation) = self.interpret(message) {
            return FailureKind::Interpretable(interpretation);
        }

        if let Some(subtype) = self.dialect.classify_additional(message) {
            return FailureKind::Recoverable {
                subtype,
                backoff: self.dialect.backoff_for(subtype),
            };
        }

        FailureKind::Fatal
    }

    fn interpret(&self, message: &str) -> Option<Interpretation> {
        self.update_count_overflow
            .is_match(message)
            .then(|| Interpretation::UpdateCountOverflow {
                count: update_count_from_message(message),
            })
    }
}

/// Last whitespace-delimited token, truncated at the first `.`.
fn update_count_from_message(message: &str) -> Option<u64> {
    let token = message.split_whitespace().last()?;
    let integral = token.split('.').next()?;
    integral.parse().ok()
}
