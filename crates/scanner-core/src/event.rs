use crate::error::{Result, ScannerError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Unique, totally ordered event identifier assigned by the feed.
pub type EventId = u64;

/// Fields searched by free text when a query names none.
pub const DEFAULT_SEARCH_FIELDS: [&str; 4] = ["name", "summary", "type", "location.name"];

/// One immutable record from the remote feed.
///
/// Wraps the raw JSON object and guarantees an integer `id` field. The
/// object is kept as-is so that serialization reproduces what the feed sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Event {
    id: EventId,
    fields: Map<String, Value>,
}

impl Event {
    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Resolve a field path inside this event.
    pub fn get(&self, path: &FieldPath) -> Option<&Value> {
        path.resolve(self)
    }

    /// Top-level field rendered for display (original case, `""` when absent).
    pub fn display_field(&self, key: &str) -> Cow<'_, str> {
        match self.fields.get(key) {
            None | Some(Value::Null) => Cow::Borrowed(""),
            Some(value) => scalar_text(value),
        }
    }

    /// One-line summary used by every listing command.
    pub fn headline(&self) -> String {
        format!(
            "{} - {} - {}",
            self.id,
            self.display_field("name"),
            self.display_field("summary")
        )
    }
}

impl TryFrom<Value> for Event {
    type Error = ScannerError;

    fn try_from(value: Value) -> Result<Self> {
        let Value::Object(fields) = value else {
            return Err(ScannerError::InvalidEvent("expected a JSON object".into()));
        };

        let id = match fields.get("id") {
            Some(Value::Number(n)) => n
                .as_u64()
                .ok_or_else(|| ScannerError::InvalidEvent(format!("id {} is not a u64", n)))?,
            Some(other) => {
                return Err(ScannerError::InvalidEvent(format!(
                    "id must be an integer, got {}",
                    other
                )))
            }
            None => return Err(ScannerError::InvalidEvent("missing id".into())),
        };

        Ok(Self { id, fields })
    }
}

impl From<Event> for Value {
    fn from(event: Event) -> Self {
        Value::Object(event.fields)
    }
}

/// Dotted key sequence addressing a nested value, e.g. `location.name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    pub fn parse(path: &str) -> Result<Self> {
        let path = path.trim();
        if path.is_empty() {
            return Err(ScannerError::InvalidQuery("empty field path".into()));
        }

        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(ScannerError::InvalidQuery(format!(
                "field path '{}' has an empty segment",
                path
            )));
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Walk the path. Yields `None` as soon as a key is missing or a
    /// non-object is reached before the path is exhausted.
    pub fn resolve<'a>(&self, event: &'a Event) -> Option<&'a Value> {
        let (first, rest) = self.segments.split_first()?;
        let mut current = event.fields.get(first)?;

        for segment in rest {
            match current {
                Value::Object(map) => current = map.get(segment)?,
                _ => return None,
            }
        }

        Some(current)
    }

    pub fn default_search_fields() -> Vec<FieldPath> {
        DEFAULT_SEARCH_FIELDS
            .into_iter()
            .map(FieldPath::from_static)
            .collect()
    }

    /// Build from a compile-time literal with no empty segments.
    pub(crate) fn from_static(path: &'static str) -> Self {
        Self {
            segments: path.split('.').map(str::to_string).collect(),
        }
    }
}

impl FromStr for FieldPath {
    type Err = ScannerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

/// Case- and space-normalized text form of a resolved value.
///
/// Absent and `null` become `""`. Numbers and booleans use their JSON text,
/// nested arrays and objects their compact JSON.
pub fn normalize(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(value) => normalize_str(&scalar_text(value)),
    }
}

pub fn normalize_str(text: &str) -> String {
    text.trim().to_lowercase()
}

fn scalar_text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        other => Cow::Owned(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: Value) -> Event {
        Event::try_from(value).unwrap()
    }

    #[test]
    fn test_event_requires_integer_id() {
        assert!(Event::try_from(json!({"name": "x"})).is_err());
        assert!(Event::try_from(json!({"id": "7"})).is_err());
        assert!(Event::try_from(json!({"id": -1})).is_err());
        assert!(Event::try_from(json!([1, 2])).is_err());
        assert_eq!(event(json!({"id": 7})).id(), 7);
    }

    #[test]
    fn test_event_serde_preserves_object() {
        let raw = json!({"id": 3, "name": "Brand", "location": {"name": "Solna"}});
        let parsed: Event = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&parsed).unwrap(), raw);
    }

    #[test]
    fn test_resolve_nested_path() {
        let e = event(json!({"id": 1, "location": {"name": "Solna", "gps": "59.36,18.00"}}));
        let path = FieldPath::parse("location.name").unwrap();
        assert_eq!(path.resolve(&e), Some(&json!("Solna")));
    }

    #[test]
    fn test_resolve_stops_at_non_object() {
        let e = event(json!({"id": 1, "name": "Brand"}));
        assert_eq!(FieldPath::parse("name.first").unwrap().resolve(&e), None);
        assert_eq!(FieldPath::parse("missing.key").unwrap().resolve(&e), None);
    }

    #[test]
    fn test_field_path_rejects_empty_segments() {
        assert!(FieldPath::parse("").is_err());
        assert!(FieldPath::parse("location.").is_err());
        assert!(FieldPath::parse("a..b").is_err());
        assert_eq!(FieldPath::parse(" location.name ").unwrap().to_string(), "location.name");
    }

    #[test]
    fn test_normalize_values() {
        assert_eq!(normalize(None), "");
        assert_eq!(normalize(Some(&Value::Null)), "");
        assert_eq!(normalize(Some(&json!("  Stockholm "))), "stockholm");
        assert_eq!(normalize(Some(&json!(42))), "42");
        assert_eq!(normalize(Some(&json!(true))), "true");
    }

    #[test]
    fn test_headline_uses_original_case() {
        let e = event(json!({"id": 9, "name": "Rån", "summary": "Butik i Solna"}));
        assert_eq!(e.headline(), "9 - Rån - Butik i Solna");
    }
}
