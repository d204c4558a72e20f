/// Value Module
///
/// Bound parameter values and the record shape rows are returned in.
use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use serde_json::{Map, Number};
use std::fmt;

/// A single result row keyed by column name.
pub type Record = Map<String, serde_json::Value>;

/// A value bound to a `?` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
}

impl SqlValue {
    /// Whether the value counts as "not provided" for filters and procedure
    /// parameters. Text is empty when nothing but whitespace remains.
    pub fn is_empty(&self) -> bool {
        match self {
            SqlValue::Null => true,
            SqlValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Converts a JSON field value into a bindable value.
    ///
    /// Arrays and objects have no column representation and become their
    /// JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => SqlValue::Null,
            serde_json::Value::Bool(b) => SqlValue::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => SqlValue::Real(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => SqlValue::Text(s.clone()),
            other => SqlValue::Text(other.to_string()),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Integer(i) => write!(f, "{}", i),
            SqlValue::Real(r) => write!(f, "{}", r),
            SqlValue::Text(s) => write!(f, "{}", s),
            SqlValue::Bool(b) => write!(f, "{}", i64::from(*b)),
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(i) => ToSqlOutput::from(*i),
            SqlValue::Real(r) => ToSqlOutput::from(*r),
            SqlValue::Text(s) => ToSqlOutput::from(s.as_str()),
            SqlValue::Bool(b) => ToSqlOutput::from(*b),
        })
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Integer(i64::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Real(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Converts a column value read from SQLite into its JSON form.
///
/// Blobs are not expected from the platform schema and are reported by size.
pub(crate) fn json_from_value_ref(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(b) => serde_json::Value::String(format!("<BLOB: {} bytes>", b.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_values() {
        assert!(SqlValue::Null.is_empty());
        assert!(SqlValue::Text(String::new()).is_empty());
        assert!(SqlValue::Text("   ".to_string()).is_empty());
        assert!(!SqlValue::Text("Rovers".to_string()).is_empty());
        assert!(!SqlValue::Integer(0).is_empty());
        assert!(!SqlValue::Bool(false).is_empty());
    }

    #[test]
    fn test_from_json() {
        assert_eq!(SqlValue::from_json(&json!(null)), SqlValue::Null);
        assert_eq!(SqlValue::from_json(&json!(7)), SqlValue::Integer(7));
        assert_eq!(SqlValue::from_json(&json!(2.5)), SqlValue::Real(2.5));
        assert_eq!(SqlValue::from_json(&json!("u12")), SqlValue::from("u12"));
        assert_eq!(SqlValue::from_json(&json!(true)), SqlValue::Bool(true));
        assert_eq!(SqlValue::from_json(&json!([1, 2])), SqlValue::from("[1,2]"));
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(SqlValue::from(None::<i64>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some("x")), SqlValue::from("x"));
    }

    #[test]
    fn test_binding_round_trip() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let values = [
            SqlValue::Integer(42),
            SqlValue::Text("it's".to_string()),
            SqlValue::Null,
            SqlValue::Bool(true),
        ];
        let mut stmt = conn.prepare("SELECT ?, ?, ?, ?").unwrap();
        let row: (i64, String, Option<i64>, i64) = stmt
            .query_row(rusqlite::params_from_iter(values.iter()), |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })
            .unwrap();
        assert_eq!(row, (42, "it's".to_string(), None, 1));
    }

    #[test]
    fn test_json_from_value_ref() {
        assert_eq!(json_from_value_ref(ValueRef::Null), json!(null));
        assert_eq!(json_from_value_ref(ValueRef::Integer(3)), json!(3));
        assert_eq!(json_from_value_ref(ValueRef::Text(b"abc")), json!("abc"));
        assert_eq!(
            json_from_value_ref(ValueRef::Blob(&[1, 2, 3])),
            json!("<BLOB: 3 bytes>")
        );
    }
}
