//! Loosely-typed rows as produced by upstream fetchers.
//!
//! A unified row is a column-name → value map; its shape varies with the
//! provider, which is why routing into tables is driven by a declared
//! configuration rather than by the row itself.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt;

/// A single cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Float(f64),
    Str(String),
    Date(NaiveDate),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The key form of this value; floats and nulls cannot be keys.
    pub fn key_part(&self) -> Option<KeyPart> {
        match self {
            Value::Date(d) => Some(KeyPart::Date(*d)),
            Value::Str(s) => Some(KeyPart::Str(s.clone())),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Float(_) => "f64",
            Value::Str(_) => "utf8",
            Value::Date(_) => "date",
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => f.write_str(s),
            Value::Date(d) => write!(f, "{d}"),
        }
    }
}

/// One component of a table key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyPart {
    Date(NaiveDate),
    Str(String),
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Date(d) => write!(f, "{d}"),
            KeyPart::Str(s) => f.write_str(s),
        }
    }
}

/// Full key of a row, in declared key-column order.
pub type Key = Vec<KeyPart>;

pub fn format_key(key: &[KeyPart]) -> String {
    key.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("|")
}

/// A row: ordered map of column name to value. Absent and `Null` are equivalent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(BTreeMap<String, Value>);

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(column.into(), value.into());
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(column.into(), value.into())
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.0.remove(column)
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn get_mut(&mut self, column: &str) -> Option<&mut Value> {
        self.0.get_mut(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    pub fn f64(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(Value::as_f64)
    }

    pub fn date(&self, column: &str) -> Option<NaiveDate> {
        self.get(column).and_then(Value::as_date)
    }

    pub fn str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Value)> {
        self.0.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Extract the key for the given key columns, or `None` if any part is
    /// missing, null or not key-typed.
    pub fn key(&self, key_columns: &[&str]) -> Option<Key> {
        key_columns
            .iter()
            .map(|c| self.get(c).and_then(Value::key_part))
            .collect()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Row(iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_and_accessors() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let row = Row::new()
            .with("date", d)
            .with("close", 10.5)
            .with("name", "Ping An")
            .with("missing", None::<f64>);

        assert_eq!(row.date("date"), Some(d));
        assert_eq!(row.f64("close"), Some(10.5));
        assert_eq!(row.str("name"), Some("Ping An"));
        assert_eq!(row.get("missing"), Some(&Value::Null));
        assert_eq!(row.f64("missing"), None);
        assert_eq!(row.len(), 4);
    }

    #[test]
    fn key_requires_every_part() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let row = Row::new().with("date", d).with("index_code", "000300.SS");
        assert_eq!(
            row.key(&["date", "index_code"]),
            Some(vec![KeyPart::Date(d), KeyPart::Str("000300.SS".into())])
        );
        assert_eq!(row.key(&["date", "status_type"]), None);

        let floaty = Row::new().with("date", 20240102.0);
        assert_eq!(floaty.key(&["date"]), None);
    }

    #[test]
    fn key_formatting() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let key = vec![KeyPart::Date(d), KeyPart::Str("ST".into())];
        assert_eq!(format_key(&key), "2024-01-02|ST");
    }
}
