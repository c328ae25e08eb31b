//! Raw and normalized records.
//!
//! A [`RawRecord`] is one row of a landing file exactly as it was read: CSV
//! cells arrive as strings, JSON values keep their types. [`normalize`]
//! produces a [`NormalizedRecord`] with booleans and integers coerced from
//! their string forms and blank cells dropped.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{AppError, Result};

/// One row as read from a landing file.
pub type RawRecord = Map<String, Value>;

/// A record after type coercion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedRecord(Map<String, Value>);

impl NormalizedRecord {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String form of a field. Coerced integers and booleans are rendered
    /// back to text so identifiers like `2024` still read as strings.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Deserialize the record into a typed configuration structure.
    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.0.clone()))
            .map_err(|e| AppError::validation(format!("record does not match expected shape: {e}")))
    }
}

impl From<Map<String, Value>> for NormalizedRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// What happens to one value during normalization.
enum Coercion {
    Keep,
    Replace(Value),
    Remove,
}

fn coerce(value: &Value) -> Coercion {
    let Value::String(s) = value else {
        return Coercion::Keep;
    };

    if s.eq_ignore_ascii_case("true") {
        return Coercion::Replace(Value::Bool(true));
    }
    if s.eq_ignore_ascii_case("false") {
        return Coercion::Replace(Value::Bool(false));
    }
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
        // Leading zeros are dropped ("007" -> 7). Values too large for an
        // i64 stay strings.
        return match s.parse::<i64>() {
            Ok(n) => Coercion::Replace(Value::from(n)),
            Err(_) => Coercion::Keep,
        };
    }
    if s.is_empty() {
        return Coercion::Remove;
    }
    Coercion::Keep
}

/// Coerce a raw record into a normalized copy.
///
/// Per key, the first matching rule wins: `"true"`/`"false"` in any case
/// become booleans, all-digit strings become integers, empty strings are
/// removed. Everything else, including non-string JSON values, passes
/// through. The input is never modified.
pub fn normalize(raw: &RawRecord) -> NormalizedRecord {
    let mut out = Map::new();
    for (key, value) in raw {
        match coerce(value) {
            Coercion::Keep => {
                out.insert(key.clone(), value.clone());
            }
            Coercion::Replace(v) => {
                out.insert(key.clone(), v);
            }
            Coercion::Remove => {}
        }
    }
    NormalizedRecord(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawRecord {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_input_is_not_mutated() {
        let input = raw(json!({"a": "true", "b": "", "c": "42", "d": "text"}));
        let before = input.clone();
        let _ = normalize(&input);
        assert_eq!(input, before);
    }

    #[test]
    fn test_mixed_case_booleans() {
        let out = normalize(&raw(json!({"a": "True", "b": "FALSE", "c": "tRuE"})));
        assert_eq!(out.get("a"), Some(&Value::Bool(true)));
        assert_eq!(out.get("b"), Some(&Value::Bool(false)));
        assert_eq!(out.get("c"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_digits_become_integers() {
        let out = normalize(&raw(json!({"n": "123", "zero": "0", "padded": "007"})));
        assert_eq!(out.get("n"), Some(&json!(123)));
        assert_eq!(out.get("zero"), Some(&json!(0)));
        assert_eq!(out.get("padded"), Some(&json!(7)));
    }

    #[test]
    fn test_non_digit_strings_pass_through() {
        let out = normalize(&raw(json!({"neg": "-5", "dec": "1.5", "sp": " 12", "word": "yes"})));
        assert_eq!(out.get("neg"), Some(&json!("-5")));
        assert_eq!(out.get("dec"), Some(&json!("1.5")));
        assert_eq!(out.get("sp"), Some(&json!(" 12")));
        assert_eq!(out.get("word"), Some(&json!("yes")));
    }

    #[test]
    fn test_blank_keys_removed() {
        let out = normalize(&raw(json!({"empty": "", "kept": "x"})));
        assert!(!out.contains_key("empty"));
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_whitespace_is_not_blank() {
        let out = normalize(&raw(json!({"space": " "})));
        assert_eq!(out.get("space"), Some(&json!(" ")));
    }

    #[test]
    fn test_oversized_digits_stay_strings() {
        let out = normalize(&raw(json!({"big": "99999999999999999999999"})));
        assert_eq!(out.get("big"), Some(&json!("99999999999999999999999")));
    }

    #[test]
    fn test_typed_json_values_untouched() {
        let out = normalize(&raw(json!({"list": ["true"], "num": 1.5, "flag": false, "nil": null})));
        assert_eq!(out.get("list"), Some(&json!(["true"])));
        assert_eq!(out.get("num"), Some(&json!(1.5)));
        assert_eq!(out.get("flag"), Some(&json!(false)));
        assert_eq!(out.get("nil"), Some(&Value::Null));
    }

    #[test]
    fn test_get_str_renders_coerced_values() {
        let out = normalize(&raw(json!({"id": "2024", "on": "true"})));
        assert_eq!(out.get_str("id").as_deref(), Some("2024"));
        assert_eq!(out.get_str("on").as_deref(), Some("true"));
        assert_eq!(out.get_str("missing"), None);
    }
}
