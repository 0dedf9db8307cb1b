//! SQL script execution.
//!
//! A script is split into statements on semicolons that end a line. Whole-line
//! `--` comments are dropped first and `${name}` placeholders are substituted
//! from the caller's variables.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use regex::{Captures, Regex, RegexBuilder};
use tracing::info;

use super::executor::{ExecuteOptions, ExecutionGateway};
use crate::error::{Result, WarehouseError};

/// Options for `execute_script`.
#[derive(Debug, Clone, Default)]
pub struct ScriptOptions {
    /// Values for `${name}` placeholders.
    pub variables: BTreeMap<String, String>,
    /// Applied to every statement in the script.
    pub execute: ExecuteOptions,
}

impl ExecutionGateway {
    /// Runs every statement of the SQL file at `path`, in order.
    ///
    /// Returns the number of statements issued. With `abort_on_error` off a
    /// failed statement does not stop the script; check
    /// [`error_occurred`](Self::error_occurred) afterwards.
    pub fn execute_script(&mut self, path: impl AsRef<Path>, options: &ScriptOptions) -> Result<usize> {
        let path = path.as_ref();
        let sql = std::fs::read_to_string(path).map_err(|e| {
            WarehouseError::script(format!("Failed to read {}: {e}", path.display()))
        })?;

        let statements = prepare_script(&sql, &options.variables)?;
        info!("Running {} statement(s) from {}", statements.len(), path.display());

        for statement in &statements {
            self.execute(statement, &options.execute)?;
        }

        Ok(statements.len())
    }
}

/// Turns script text into terminated, executable statements.
pub fn prepare_script(sql: &str, variables: &BTreeMap<String, String>) -> Result<Vec<String>> {
    let sql = remove_comments(sql);
    let sql = substitute_variables(&sql, variables)?;
    split_statements(&sql)
}

/// Drops every line whose first non-blank characters are `--`.
pub fn remove_comments(sql: &str) -> String {
    sql.lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replaces `${name}` placeholders. An unknown name is an error.
pub fn substitute_variables(sql: &str, variables: &BTreeMap<String, String>) -> Result<String> {
    let placeholder = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
        .map_err(|e| WarehouseError::internal(format!("Invalid placeholder pattern: {e}")))?;

    let mut missing = BTreeSet::new();
    let substituted = placeholder.replace_all(sql, |caps: &Captures<'_>| {
        let name = &caps[1];
        match variables.get(name) {
            Some(value) => value.clone(),
            None => {
                missing.insert(name.to_string());
                caps[0].to_string()
            }
        }
    });

    if missing.is_empty() {
        Ok(substituted.into_owned())
    } else {
        let names: Vec<String> = missing.into_iter().collect();
        Err(WarehouseError::script(format!(
            "Undefined variable(s): {}",
            names.join(", ")
        )))
    }
}

/// Splits on `;` followed only by whitespace up to a line end. Blank pieces
/// are skipped; every statement comes back terminated with `;`.
pub fn split_statements(sql: &str) -> Result<Vec<String>> {
    let terminator = RegexBuilder::new(r";\s*$")
        .multi_line(true)
        .build()
        .map_err(|e| WarehouseError::internal(format!("Invalid terminator pattern: {e}")))?;

    Ok(terminator
        .split(sql)
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .map(|statement| format!("{statement};"))
        .collect())
}
