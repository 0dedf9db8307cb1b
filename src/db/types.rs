//! Result types for warehouse-exec.
//!
//! Defines the column type catalog, decoded values and the records handed to
//! callers of `query`.

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;

/// Column type tag as reported by the wire driver's type catalog.
///
/// Codes follow `java.sql.Types`, which is the catalog Redshift's drivers use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnTypeTag {
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Char,
    Varchar,
    NChar,
    NVarchar,
    Date,
    Time,
    Timestamp,
    Numeric,
    Decimal,
    Float,
    Double,
    Bit,
    /// Any code outside the catalog above.
    Other(i32),
}

/// `java.sql.Types.OTHER`, reported for types with no closer match.
pub const OTHER_TYPE_CODE: i32 = 1111;

impl ColumnTypeTag {
    /// Maps a catalog code to its tag. Unknown codes map to `Other`.
    pub fn from_code(code: i32) -> Self {
        match code {
            -6 => Self::TinyInt,
            5 => Self::SmallInt,
            4 => Self::Integer,
            -5 => Self::BigInt,
            1 => Self::Char,
            12 => Self::Varchar,
            -15 => Self::NChar,
            -9 => Self::NVarchar,
            91 => Self::Date,
            92 => Self::Time,
            93 => Self::Timestamp,
            2 => Self::Numeric,
            3 => Self::Decimal,
            6 => Self::Float,
            8 => Self::Double,
            -7 => Self::Bit,
            other => Self::Other(other),
        }
    }

    /// Returns the catalog code for this tag.
    pub fn code(&self) -> i32 {
        match self {
            Self::TinyInt => -6,
            Self::SmallInt => 5,
            Self::Integer => 4,
            Self::BigInt => -5,
            Self::Char => 1,
            Self::Varchar => 12,
            Self::NChar => -15,
            Self::NVarchar => -9,
            Self::Date => 91,
            Self::Time => 92,
            Self::Timestamp => 93,
            Self::Numeric => 2,
            Self::Decimal => 3,
            Self::Float => 6,
            Self::Double => 8,
            Self::Bit => -7,
            Self::Other(code) => *code,
        }
    }

    /// Maps a PostgreSQL type name (as reported by the server) to a tag.
    ///
    /// Booleans are reported as BIT, matching the PostgreSQL JDBC driver.
    pub fn from_pg_type_name(name: &str) -> Self {
        match name.to_uppercase().as_str() {
            "INT2" | "SMALLINT" => Self::SmallInt,
            "INT4" | "INT" | "INTEGER" => Self::Integer,
            "INT8" | "BIGINT" => Self::BigInt,
            "BPCHAR" | "CHAR" | "CHARACTER" => Self::Char,
            "VARCHAR" | "TEXT" | "NAME" | "CHARACTER VARYING" => Self::Varchar,
            "DATE" => Self::Date,
            "TIME" | "TIMETZ" => Self::Time,
            "TIMESTAMP" | "TIMESTAMPTZ" => Self::Timestamp,
            "NUMERIC" | "DECIMAL" => Self::Numeric,
            "FLOAT4" | "REAL" => Self::Float,
            "FLOAT8" | "DOUBLE PRECISION" => Self::Double,
            "BOOL" | "BOOLEAN" => Self::Bit,
            _ => Self::Other(OTHER_TYPE_CODE),
        }
    }
}

/// Metadata about a column in a result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    /// Column name.
    pub name: String,

    /// Column type tag.
    pub type_tag: ColumnTypeTag,
}

impl ColumnMeta {
    /// Creates a new column description.
    pub fn new(name: impl Into<String>, type_tag: ColumnTypeTag) -> Self {
        Self {
            name: name.into(),
            type_tag,
        }
    }
}

/// A single decoded cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,

    /// Signed integer (up to i64).
    Int(i64),

    /// Calendar date without a time component.
    Date(NaiveDate),

    /// Time of day.
    Time(NaiveTime),

    /// Date and time, whole seconds.
    Timestamp(NaiveDateTime),

    /// Exact decimal number.
    Decimal(BigDecimal),

    /// Text value.
    String(String),

    /// Boolean value.
    Bool(bool),
}

impl Value {
    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<&BigDecimal> {
        match self {
            Value::Decimal(d) => Some(d),
            _ => None,
        }
    }

    /// Converts the value to a string representation.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::Time(t) => t.format("%H:%M:%S%.f").to_string(),
            Value::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
            Value::Decimal(d) => d.to_string(),
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

// Decimals and temporal values serialize as strings so no precision is lost.
impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::String(s) => serializer.serialize_str(s),
            other => serializer.serialize_str(&other.to_display_string()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<BigDecimal> for Value {
    fn from(v: BigDecimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

/// One decoded row: column names mapped to values, in column order.
///
/// A repeated column name keeps its first position and takes the later value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty record with room for `columns` fields.
    pub fn with_capacity(columns: usize) -> Self {
        Self {
            fields: Vec::with_capacity(columns),
        }
    }

    /// Sets a field, replacing the value of an existing field with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Returns the value of the named field.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field names in column order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    /// Fields in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl<N: Into<String>> FromIterator<(N, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (N, Value)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
