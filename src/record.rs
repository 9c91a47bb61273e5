use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::UTError;

/// Records in fetch order. Replaced as a whole on every successful load.
pub type RecordSet = Arc<Vec<Record>>;

/// Dot separated path into a record, e.g. `company.name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn from_segments(segments: &[&str]) -> Self {
        FieldPath(segments.iter().map(|s| s.to_string()).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl FromStr for FieldPath {
    type Err = UTError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments: Vec<String> = s.split('.').map(|p| p.trim().to_string()).collect();
        if segments.iter().any(|p| p.is_empty()) {
            return Err(UTError::config(format!("Invalid field path '{s}'")));
        }
        Ok(FieldPath(segments))
    }
}

impl TryFrom<String> for FieldPath {
    type Error = UTError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    position: usize, // Position in the fetched sequence, used for error reporting
    fields: Map<String, Value>,
}

impl Record {
    pub fn new(position: usize, fields: Map<String, Value>) -> Self {
        Self { position, fields }
    }

    /// Builds a record set from a decoded response body. The body has to be an array of objects.
    pub fn from_json(body: Value) -> Result<Vec<Record>, UTError> {
        let Value::Array(items) = body else {
            return Err(UTError::InvalidData(
                "expected a JSON array of records".into(),
            ));
        };
        items
            .into_iter()
            .enumerate()
            .map(|(pos, item)| match item {
                Value::Object(fields) => Ok(Record::new(pos, fields)),
                other => Err(UTError::InvalidData(format!(
                    "record #{pos} is not an object: {other}"
                ))),
            })
            .collect()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn get(&self, path: &FieldPath) -> Option<&Value> {
        let (first, rest) = path.segments().split_first()?;
        let mut value = self.fields.get(first)?;
        for segment in rest {
            value = value.as_object()?.get(segment)?;
        }
        match value {
            Value::Null => None,
            v => Some(v),
        }
    }

    /// Text of a field the view depends on. Absent or null fields are a `MissingField` error.
    pub fn text(&self, path: &FieldPath) -> Result<Cow<'_, str>, UTError> {
        self.get(path)
            .map(value_to_text)
            .ok_or_else(|| UTError::MissingField {
                record: self.position,
                field: path.to_string(),
            })
    }

    /// Text of a display-only field, with a placeholder for missing values.
    pub fn cell(&self, path: &FieldPath) -> String {
        self.get(path)
            .map(|v| value_to_text(v).replace("\r\n", " ↵ ").replace('\n', " ↵ "))
            .unwrap_or_else(|| String::from("∅"))
    }

    /// All scalar fields flattened into `(path, value)` pairs, in field order.
    pub fn flatten(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for (key, value) in self.fields.iter() {
            flatten_into(key.clone(), value, &mut out);
        }
        out
    }
}

fn flatten_into(prefix: String, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, v) in map.iter() {
                flatten_into(format!("{prefix}.{key}"), v, out);
            }
        }
        Value::Null => out.push((prefix, String::from("∅"))),
        v => out.push((prefix, value_to_text(v).into_owned())),
    }
}

fn value_to_text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        other => Cow::Owned(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user() -> Record {
        let Value::Object(fields) = json!({
            "id": 1,
            "name": "Leanne Graham",
            "email": "Sincere@april.biz",
            "company": { "name": "Romaguera-Crona", "bs": null },
        }) else {
            unreachable!()
        };
        Record::new(0, fields)
    }

    #[test]
    fn field_path_parsing() {
        let path: FieldPath = "company.name".parse().unwrap();
        assert_eq!(path.segments(), ["company", "name"]);
        assert_eq!(path.to_string(), "company.name");
        assert!("company.".parse::<FieldPath>().is_err());
        assert!("".parse::<FieldPath>().is_err());
    }

    #[test]
    fn nested_and_numeric_fields() {
        let r = user();
        assert_eq!(r.text(&"company.name".parse().unwrap()).unwrap(), "Romaguera-Crona");
        assert_eq!(r.text(&"id".parse().unwrap()).unwrap(), "1");
    }

    #[test]
    fn missing_and_null_fields_are_errors() {
        let r = user();
        let err = r.text(&"company.catchPhrase".parse().unwrap()).unwrap_err();
        assert!(matches!(err, UTError::MissingField { record: 0, ref field } if field == "company.catchPhrase"));
        assert!(r.text(&"company.bs".parse().unwrap()).is_err());
        assert_eq!(r.cell(&"phone".parse().unwrap()), "∅");
    }

    #[test]
    fn from_json_requires_array_of_objects() {
        let records = Record::from_json(json!([{ "id": 1 }, { "id": 2 }])).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].position(), 1);

        assert!(Record::from_json(json!({ "id": 1 })).is_err());
        assert!(Record::from_json(json!([1, 2])).is_err());
    }

    #[test]
    fn flatten_nested_object() {
        let flat = user().flatten();
        assert!(flat.contains(&("company.name".to_string(), "Romaguera-Crona".to_string())));
        assert!(flat.contains(&("company.bs".to_string(), "∅".to_string())));
        assert_eq!(flat[0], ("id".to_string(), "1".to_string()));
    }
}
