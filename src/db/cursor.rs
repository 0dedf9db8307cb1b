//! Forward-only result cursors.
//!
//! A cursor exposes column metadata once and then one row at a time through
//! raw accessors. `TextCursor` holds rows as the server's text rendering and is
//! shared by the PostgreSQL and mock drivers.

use chrono::{NaiveDate, NaiveTime};

use super::types::ColumnMeta;
use crate::error::DriverError;

/// A forward-only, single-pass handle over the rows of a result.
///
/// Column indexes are zero-based. Accessors read the row the cursor is
/// positioned on after `advance` returned `true`.
pub trait Cursor {
    /// Column metadata, available before the first `advance`.
    fn columns(&self) -> &[ColumnMeta];

    /// Moves to the next row. Returns `false` once the cursor is exhausted.
    fn advance(&mut self) -> Result<bool, DriverError>;

    /// Universal string accessor. `None` means the cell is SQL NULL.
    fn get_string(&self, index: usize) -> Result<Option<String>, DriverError>;

    fn get_i32(&self, index: usize) -> Result<i32, DriverError>;

    fn get_i64(&self, index: usize) -> Result<i64, DriverError>;

    fn get_date(&self, index: usize) -> Result<NaiveDate, DriverError>;

    fn get_time(&self, index: usize) -> Result<NaiveTime, DriverError>;

    /// Timestamp as the backend formats it, `YYYY-MM-DD HH:MM:SS[.ffffff]`.
    fn get_timestamp_text(&self, index: usize) -> Result<String, DriverError>;

    /// Releases server-side resources held by the cursor.
    fn close(self: Box<Self>) -> Result<(), DriverError> {
        Ok(())
    }
}

/// A row of cells in text form. `None` is SQL NULL.
pub type TextRow = Vec<Option<String>>;

/// An in-memory cursor over rows in text form.
#[derive(Debug, Clone, Default)]
pub struct TextCursor {
    columns: Vec<ColumnMeta>,
    rows: std::collections::VecDeque<TextRow>,
    current: Option<TextRow>,
}

impl TextCursor {
    /// Creates a cursor over the given rows.
    pub fn new(columns: Vec<ColumnMeta>, rows: Vec<TextRow>) -> Self {
        Self {
            columns,
            rows: rows.into(),
            current: None,
        }
    }

    /// Number of rows not yet visited.
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }

    fn cell(&self, index: usize) -> Result<Option<&str>, DriverError> {
        let row = self
            .current
            .as_ref()
            .ok_or_else(|| DriverError::protocol("Cursor is not positioned on a row"))?;
        row.get(index)
            .map(|cell| cell.as_deref())
            .ok_or_else(|| DriverError::protocol(format!("Column index {index} out of range")))
    }

    fn non_null(&self, index: usize) -> Result<&str, DriverError> {
        self.cell(index)?.ok_or_else(|| {
            DriverError::conversion(format!("Column {index} is NULL"))
        })
    }
}

impl Cursor for TextCursor {
    fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    fn advance(&mut self) -> Result<bool, DriverError> {
        self.current = self.rows.pop_front();
        Ok(self.current.is_some())
    }

    fn get_string(&self, index: usize) -> Result<Option<String>, DriverError> {
        Ok(self.cell(index)?.map(str::to_owned))
    }

    fn get_i32(&self, index: usize) -> Result<i32, DriverError> {
        let text = self.non_null(index)?;
        text.trim()
            .parse()
            .map_err(|e| DriverError::conversion(format!("Bad value for type int: {text} ({e})")))
    }

    fn get_i64(&self, index: usize) -> Result<i64, DriverError> {
        let text = self.non_null(index)?;
        text.trim()
            .parse()
            .map_err(|e| DriverError::conversion(format!("Bad value for type long: {text} ({e})")))
    }

    fn get_date(&self, index: usize) -> Result<NaiveDate, DriverError> {
        let text = self.non_null(index)?;
        NaiveDate::parse_and_remainder(text, "%Y-%m-%d")
            .map(|(date, _)| date)
            .map_err(|e| DriverError::conversion(format!("Bad value for type date: {text} ({e})")))
    }

    fn get_time(&self, index: usize) -> Result<NaiveTime, DriverError> {
        let text = self.non_null(index)?;
        // Drops a trailing zone offset (TIMETZ)
        NaiveTime::parse_and_remainder(text, "%H:%M:%S%.f")
            .map(|(time, _)| time)
            .map_err(|e| DriverError::conversion(format!("Bad value for type time: {text} ({e})")))
    }

    fn get_timestamp_text(&self, index: usize) -> Result<String, DriverError> {
        Ok(self.non_null(index)?.to_owned())
    }
}
