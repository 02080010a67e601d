/// Field Values
///
/// In-memory representation of a record field. Values are bound directly as
/// SQLite parameters and built from result cells; the richer variants
/// (`Bool`, `Date`) only appear after a field's decode hook ran.
use super::errors::{DbError, DbResult};
use chrono::NaiveDate;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use std::fmt;

/// Format used to store dates in the database.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Bool(bool),
    Date(NaiveDate),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Numeric value as a float; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Integer(i) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::Text(s) => parse_date(s).ok(),
            _ => None,
        }
    }

    /// Renders the value as a SQL literal, as used in statement dumps.
    pub fn sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Real(f) if f.is_finite() && f.fract() == 0.0 => format!("{:.1}", f),
            Value::Real(f) => f.to_string(),
            Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
            Value::Blob(b) => {
                let hex: String = b.iter().map(|byte| format!("{:02X}", byte)).collect();
                format!("X'{}'", hex)
            }
            Value::Bool(b) => i64::from(*b).to_string(),
            Value::Date(d) => format!("'{}'", d.format(DATE_FORMAT)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => write!(f, "{}", s),
            Value::Blob(b) => write!(f, "<BLOB: {} bytes>", b.len()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as Native;

        Ok(match self {
            Value::Null => ToSqlOutput::Owned(Native::Null),
            Value::Integer(i) => ToSqlOutput::Owned(Native::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Owned(Native::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::Bool(b) => ToSqlOutput::Owned(Native::Integer(i64::from(*b))),
            Value::Date(d) => ToSqlOutput::Owned(Native::Text(d.format(DATE_FORMAT).to_string())),
        })
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Real(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    // Timestamps stored by other tools carry a time part we don't need.
    let day = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(day, DATE_FORMAT)
}

/// Decode hook: ISO date text into `Value::Date`.
pub fn decode_date(value: Value) -> DbResult<Value> {
    match value {
        Value::Text(s) => parse_date(&s)
            .map(Value::Date)
            .map_err(|e| DbError::Data(format!("'{}' is not a date: {}", s, e))),
        Value::Null | Value::Date(_) => Ok(value),
        other => Err(DbError::Data(format!("{} is not a date", other.sql_literal()))),
    }
}

/// Encode hook: `Value::Date` back into ISO text.
pub fn encode_date(value: &Value) -> Value {
    match value {
        Value::Date(d) => Value::Text(d.format(DATE_FORMAT).to_string()),
        other => other.clone(),
    }
}

/// Decode hook: integer or boolean words into `Value::Bool`.
pub fn decode_flag(value: Value) -> DbResult<Value> {
    match value {
        Value::Integer(i) => Ok(Value::Bool(i != 0)),
        Value::Text(ref s) => match s.to_lowercase().as_str() {
            "1" | "true" | "t" | "yes" | "y" | "on" => Ok(Value::Bool(true)),
            "0" | "false" | "f" | "no" | "n" | "off" => Ok(Value::Bool(false)),
            _ => Err(DbError::Data(format!("'{}' is not a boolean", s))),
        },
        Value::Null | Value::Bool(_) => Ok(value),
        other => Err(DbError::Data(format!("{} is not a boolean", other.sql_literal()))),
    }
}

/// Encode hook: `Value::Bool` into 0/1.
pub fn encode_flag(value: &Value) -> Value {
    match value {
        Value::Bool(b) => Value::Integer(i64::from(*b)),
        other => other.clone(),
    }
}
