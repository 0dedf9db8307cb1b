//! Typed decoding of result cursors.
//!
//! Every cell is first probed through the string accessor: the wire driver
//! does not reliably report NULL through the typed accessors, so an absent
//! string means NULL whatever the declared type.

use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use std::str::FromStr;

use super::cursor::Cursor;
use super::types::{ColumnMeta, ColumnTypeTag, Record, Value};
use crate::error::DriverError;

/// Format the backend uses for TIMESTAMP text. Sub-second digits are dropped.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Decodes the cell at `index` of the cursor's current row.
pub fn decode_column(
    cursor: &dyn Cursor,
    index: usize,
    type_tag: ColumnTypeTag,
) -> Result<Value, DriverError> {
    let Some(text) = cursor.get_string(index)? else {
        return Ok(Value::Null);
    };

    let value = match type_tag {
        ColumnTypeTag::TinyInt | ColumnTypeTag::SmallInt | ColumnTypeTag::Integer => {
            Value::Int(cursor.get_i32(index)? as i64)
        }
        ColumnTypeTag::BigInt => Value::Int(cursor.get_i64(index)?),
        ColumnTypeTag::Date => Value::Date(cursor.get_date(index)?),
        ColumnTypeTag::Time => Value::Time(cursor.get_time(index)?),
        ColumnTypeTag::Timestamp => {
            let raw = cursor.get_timestamp_text(index)?;
            Value::Timestamp(parse_timestamp(&raw)?)
        }
        ColumnTypeTag::Numeric
        | ColumnTypeTag::Decimal
        | ColumnTypeTag::Float
        | ColumnTypeTag::Double => decode_decimal(text)?,
        ColumnTypeTag::Char
        | ColumnTypeTag::NChar
        | ColumnTypeTag::NVarchar
        | ColumnTypeTag::Varchar => Value::String(text),
        ColumnTypeTag::Bit => match text.as_str() {
            "t" => Value::Bool(true),
            "f" => Value::Bool(false),
            _ => Value::String(text),
        },
        ColumnTypeTag::Other(_) => Value::String(text),
    };

    Ok(value)
}

/// Decodes the cursor's current row using the given column metadata.
pub fn decode_row(cursor: &dyn Cursor, columns: &[ColumnMeta]) -> Result<Record, DriverError> {
    let mut record = Record::with_capacity(columns.len());
    for (index, column) in columns.iter().enumerate() {
        let value = decode_column(cursor, index, column.type_tag)?;
        record.insert(column.name.clone(), value);
    }
    Ok(record)
}

/// Drains the cursor, decoding one record per row.
///
/// Column metadata is read once up front. The cursor is consumed.
pub fn decode_all(cursor: &mut dyn Cursor) -> Result<Vec<Record>, DriverError> {
    let columns = cursor.columns().to_vec();
    let mut records = Vec::new();

    while cursor.advance()? {
        records.push(decode_row(&*cursor, &columns)?);
    }

    Ok(records)
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, DriverError> {
    NaiveDateTime::parse_and_remainder(raw, TIMESTAMP_FORMAT)
        .map(|(ts, _)| ts)
        .map_err(|e| DriverError::conversion(format!("Bad value for type timestamp: {raw} ({e})")))
}

/// Parses numeric text exactly. Non-finite values have no decimal form and are
/// kept as text.
fn decode_decimal(text: String) -> Result<Value, DriverError> {
    let trimmed = text.trim();
    if matches!(
        trimmed.to_ascii_lowercase().as_str(),
        "nan" | "infinity" | "-infinity" | "+infinity" | "inf" | "-inf"
    ) {
        return Ok(Value::String(text));
    }

    BigDecimal::from_str(trimmed)
        .map(Value::Decimal)
        .map_err(|e| DriverError::conversion(format!("Bad value for type numeric: {text} ({e})")))
}
