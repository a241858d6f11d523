// Typed accessors over the untyped payload map. Handlers validate their own
// fields; these only take care of JSON-vs-query-string shapes.

use serde_json::Value;
use uuid::Uuid;

use super::Payload;

/// A string field, `None` when absent, empty, or not a string
pub fn text<'a>(payload: &'a Payload, key: &str) -> Option<&'a str> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

pub fn text_or_default(payload: &Payload, key: &str) -> String {
    text(payload, key).unwrap_or_default().to_string()
}

/// JSON booleans, or `"true"`/`"1"` when the payload came from a query string
pub fn flag(payload: &Payload, key: &str) -> bool {
    match payload.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.as_str(), "true" | "1"),
        _ => false,
    }
}

/// Trimmed, non-empty string entries of an array field
pub fn string_list(payload: &Payload, key: &str) -> Vec<String> {
    match payload.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// An optional UUID field; present but unparseable is an error
pub fn optional_uuid(payload: &Payload, key: &str) -> Result<Option<Uuid>, uuid::Error> {
    text(payload, key).map(Uuid::parse_str).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn empty_strings_count_as_missing() {
        let p = payload(json!({"title": "", "username": "ada", "count": 3}));
        assert_eq!(text(&p, "title"), None);
        assert_eq!(text(&p, "username"), Some("ada"));
        assert_eq!(text(&p, "count"), None);
        assert_eq!(text_or_default(&p, "missing"), "");
    }

    #[test]
    fn flags_accept_query_string_forms() {
        let p = payload(json!({"a": true, "b": "true", "c": "1", "d": "no", "e": 1}));
        assert!(flag(&p, "a"));
        assert!(flag(&p, "b"));
        assert!(flag(&p, "c"));
        assert!(!flag(&p, "d"));
        assert!(!flag(&p, "e"));
        assert!(!flag(&p, "missing"));
    }

    #[test]
    fn string_lists_are_trimmed_and_compacted() {
        let p = payload(json!({"qualifications": ["  PhD ", "", "   ", "BSc", 7]}));
        assert_eq!(string_list(&p, "qualifications"), vec!["PhD", "BSc"]);
        assert!(string_list(&p, "missing").is_empty());
    }

    #[test]
    fn uuids_are_optional_but_must_parse() {
        let id = Uuid::new_v4();
        let p = payload(json!({"good": id.to_string(), "bad": "not-a-uuid"}));
        assert_eq!(optional_uuid(&p, "good").unwrap(), Some(id));
        assert_eq!(optional_uuid(&p, "missing").unwrap(), None);
        assert!(optional_uuid(&p, "bad").is_err());
    }
}
