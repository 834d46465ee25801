//! Extracted records.
//!
//! A [`Record`] mirrors the shape of the rules that produced it: an ordered map
//! from sibling rule names to [`Value`]s. Scalar rules yield text or null; a
//! structured list yields an ordered sequence of child records.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// The value one rule produced within one scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// The selector matched nothing (or the attribute was absent).
    Null,
    Text(String),
    List(Vec<Record>),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Record]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<Option<String>> for Value {
    fn from(value: Option<String>) -> Self {
        value.map_or(Value::Null, Value::Text)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Text(text) => serializer.serialize_str(text),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

/// Field values keyed by rule name, in rule order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field, replacing an existing value of the same name in place.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Text of a scalar field; `None` when the field is null or missing.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_text)
    }

    /// Items of a list field; `None` when the field is missing or not a list.
    pub fn list(&self, name: &str) -> Option<&[Record]> {
        self.get(name).and_then(Value::as_list)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Serializes to JSON text with fields in rule order.
    pub fn to_json_string(&self, pretty: bool) -> crate::Result<String> {
        let text = if pretty { serde_json::to_string_pretty(self)? } else { serde_json::to_string(self)? };
        Ok(text)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_order_and_replaces() {
        let mut record = Record::new();
        record.insert("b", Value::Text("1".into()));
        record.insert("a", Value::Null);
        record.insert("b", Value::Text("2".into()));

        let names: Vec<&str> = record.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(record.text("b"), Some("2"));
        assert_eq!(record.text("a"), None);
        assert!(record.get("a").unwrap().is_null());
    }

    #[test]
    fn test_serializes_in_field_order() {
        let mut child = Record::new();
        child.insert("z", Value::Text("last".into()));
        child.insert("a", Value::Null);

        let mut record = Record::new();
        record.insert("title", Value::Text("T".into()));
        record.insert("items", Value::List(vec![child]));

        assert_eq!(record.to_json_string(false).unwrap(), r#"{"title":"T","items":[{"z":"last","a":null}]}"#);
    }
}
