//! Preference record, partial patch and JSON codec.
//!
//! # Responsibility
//! - Define `PreferenceSet` (full state) and `PreferencePatch` (partial state).
//! - Encode/decode the JSON object shared by storage values and bus payloads.
//!
//! # Invariants
//! - `PreferenceSet::default()` is `{fontSize: 15, wordWrap: false}`.
//! - Decoding checks type shape only; values are never range-validated.
//! - Unknown fields are ignored; known fields with a wrong JSON type reject
//!   the whole payload.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const DEFAULT_FONT_SIZE: i64 = 15;
pub const DEFAULT_WORD_WRAP: bool = false;

const MAX_ERROR_EXCERPT_CHARS: usize = 64;

/// Codec failure for stored values and bus payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    /// Input is not valid JSON at all.
    InvalidJson(String),
    /// Input is valid JSON but not an object (array, number, null, ...).
    NotAnObject(&'static str),
    /// A known field carries a value of the wrong JSON type.
    InvalidField(String),
    /// State could not be encoded.
    Encode(String),
}

impl Display for PayloadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidJson(message) => write!(f, "payload is not valid JSON: {message}"),
            Self::NotAnObject(kind) => write!(f, "payload must be a JSON object, got {kind}"),
            Self::InvalidField(message) => write!(f, "payload field has wrong type: {message}"),
            Self::Encode(message) => write!(f, "failed to encode preferences: {message}"),
        }
    }
}

impl Error for PayloadError {}

/// Full preference state held by one window replica.
///
/// Omitted fields decode to their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PreferenceSet {
    /// Editor font size in points.
    pub font_size: i64,
    /// Soft-wrap long lines in the editor.
    pub word_wrap: bool,
}

impl Default for PreferenceSet {
    fn default() -> Self {
        Self {
            font_size: DEFAULT_FONT_SIZE,
            word_wrap: DEFAULT_WORD_WRAP,
        }
    }
}

impl PreferenceSet {
    /// Applies every field present in `patch`.
    ///
    /// Returns whether any field actually changed.
    pub fn apply(&mut self, patch: &PreferencePatch) -> bool {
        let before = *self;
        if let Some(font_size) = patch.font_size {
            self.font_size = font_size;
        }
        if let Some(word_wrap) = patch.word_wrap {
            self.word_wrap = word_wrap;
        }
        before != *self
    }

    /// Encodes the full state as the wire JSON object.
    pub fn to_value(&self) -> Result<Value, PayloadError> {
        serde_json::to_value(self).map_err(|err| PayloadError::Encode(err.to_string()))
    }

    /// Encodes the full state as a compact JSON string.
    pub fn to_json(&self) -> Result<String, PayloadError> {
        serde_json::to_string(self).map_err(|err| PayloadError::Encode(err.to_string()))
    }

    /// Decodes a stored JSON string; omitted fields keep their defaults.
    pub fn from_json(raw: &str) -> Result<Self, PayloadError> {
        decode_object(&parse(raw)?)
    }
}

/// Partial preference state. `None` fields are left untouched by a merge.
///
/// A field that is present must carry a value of its type; `null` is
/// rejected rather than read as "absent".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencePatch {
    #[serde(default, deserialize_with = "present")]
    pub font_size: Option<i64>,
    #[serde(default, deserialize_with = "present")]
    pub word_wrap: Option<bool>,
}

impl PreferencePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_font_size(mut self, font_size: i64) -> Self {
        self.font_size = Some(font_size);
        self
    }

    pub fn with_word_wrap(mut self, word_wrap: bool) -> Self {
        self.word_wrap = Some(word_wrap);
        self
    }

    /// Decodes a raw JSON string (storage value).
    ///
    /// # Errors
    /// - `InvalidJson` when `raw` does not parse.
    /// - `NotAnObject` / `InvalidField` per [`PreferencePatch::from_value`].
    pub fn from_json(raw: &str) -> Result<Self, PayloadError> {
        decode_object(&parse(raw)?)
    }

    /// Decodes an already-parsed JSON value (bus payload).
    pub fn from_value(value: &Value) -> Result<Self, PayloadError> {
        decode_object(value)
    }
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

fn parse(raw: &str) -> Result<Value, PayloadError> {
    serde_json::from_str(raw).map_err(|err| {
        PayloadError::InvalidJson(truncate(&err.to_string(), MAX_ERROR_EXCERPT_CHARS))
    })
}

fn decode_object<T: DeserializeOwned>(value: &Value) -> Result<T, PayloadError> {
    if !value.is_object() {
        return Err(PayloadError::NotAnObject(json_kind(value)));
    }
    T::deserialize(value).map_err(|err| {
        PayloadError::InvalidField(truncate(&err.to_string(), MAX_ERROR_EXCERPT_CHARS))
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    let mut truncated = value.chars().take(max_chars).collect::<String>();
    if value.chars().count() > max_chars {
        truncated.push_str("...");
    }
    truncated
}

#[cfg(test)]
mod tests {
    use super::{PayloadError, PreferencePatch, PreferenceSet};
    use serde_json::json;

    #[test]
    fn defaults_match_documented_values() {
        let prefs = PreferenceSet::default();
        assert_eq!(prefs.font_size, 15);
        assert!(!prefs.word_wrap);
    }

    #[test]
    fn apply_preserves_untouched_fields() {
        let mut prefs = PreferenceSet::default();
        let changed = prefs.apply(&PreferencePatch::new().with_word_wrap(true));
        assert!(changed);
        assert_eq!(
            prefs,
            PreferenceSet {
                font_size: 15,
                word_wrap: true
            }
        );
    }

    #[test]
    fn apply_reports_no_change_for_equal_values() {
        let mut prefs = PreferenceSet::default();
        assert!(!prefs.apply(&PreferencePatch::new().with_font_size(15)));
        assert!(!prefs.apply(&PreferencePatch::new()));
    }

    #[test]
    fn serialization_uses_stable_wire_names() {
        let prefs = PreferenceSet {
            font_size: 20,
            word_wrap: true,
        };
        assert_eq!(
            prefs.to_value().unwrap(),
            json!({"fontSize": 20, "wordWrap": true})
        );
        assert_eq!(prefs.to_json().unwrap(), r#"{"fontSize":20,"wordWrap":true}"#);
    }

    #[test]
    fn decode_round_trips_extreme_values() {
        for prefs in [
            PreferenceSet::default(),
            PreferenceSet {
                font_size: i64::MIN,
                word_wrap: true,
            },
            PreferenceSet {
                font_size: i64::MAX,
                word_wrap: false,
            },
        ] {
            assert_eq!(PreferenceSet::from_json(&prefs.to_json().unwrap()).unwrap(), prefs);
        }
    }

    #[test]
    fn partial_object_decodes_to_partial_patch() {
        let patch = PreferencePatch::from_json(r#"{"wordWrap": true, "theme": "dark"}"#).unwrap();
        assert_eq!(patch, PreferencePatch::new().with_word_wrap(true));
    }

    #[test]
    fn rejects_non_object_payloads() {
        assert_eq!(
            PreferencePatch::from_value(&json!([15, true])),
            Err(PayloadError::NotAnObject("array"))
        );
        assert_eq!(
            PreferencePatch::from_json("null"),
            Err(PayloadError::NotAnObject("null"))
        );
    }

    #[test]
    fn rejects_wrong_field_types() {
        let err = PreferencePatch::from_value(&json!({"fontSize": "big"})).unwrap_err();
        assert!(matches!(err, PayloadError::InvalidField(_)));
        assert!(PreferencePatch::from_value(&json!({"fontSize": 1.5})).is_err());
        assert!(PreferencePatch::from_value(&json!({"wordWrap": 1})).is_err());
        assert!(PreferencePatch::from_value(&json!({"wordWrap": null})).is_err());
    }

    #[test]
    fn stored_value_fills_missing_fields_with_defaults() {
        assert_eq!(
            PreferenceSet::from_json(r#"{"wordWrap": true, "theme": "dark"}"#).unwrap(),
            PreferenceSet {
                font_size: 15,
                word_wrap: true
            }
        );
        assert!(matches!(
            PreferenceSet::from_json(r#"{"fontSize": null}"#),
            Err(PayloadError::InvalidField(_))
        ));
        assert_eq!(
            PreferenceSet::from_json("7"),
            Err(PayloadError::NotAnObject("number"))
        );
    }

    #[test]
    fn rejects_unparsable_text() {
        let err = PreferencePatch::from_json("{not json").unwrap_err();
        assert!(matches!(err, PayloadError::InvalidJson(_)));
    }
}
