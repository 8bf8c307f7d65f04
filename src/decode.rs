//! Best-effort interpretation of response bodies.
//!
//! The upstream usually answers with a single JSON document, but sometimes
//! with several joined by a literal `\n&&&\n` line, and occasionally with
//! plain text. Decoding never fails; the least structured reading wins last.
//! The multi-document format is undocumented upstream behavior, so its
//! handling is a compatibility shim rather than a contract.

use serde::Serialize;
use serde_json::Value;

/// Separator the upstream places between documents of a multi-part body.
const FRAGMENT_SEPARATOR: &str = "\n&&&\n";

/// A body splitting into fewer segments than this is not treated as
/// multi-part.
const MIN_FRAGMENTS: usize = 3;

/// The structured reading of a response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Decoded {
    /// The whole body parsed as one JSON document.
    Json(Value),
    /// Separator-joined JSON documents, in body order, with unparsable or
    /// empty entries dropped.
    Fragments(Vec<Value>),
    /// Neither of the above; the body verbatim.
    Text(String),
}

impl Decoded {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Decoded::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_fragments(&self) -> Option<&[Value]> {
        match self {
            Decoded::Fragments(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Decoded::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Flattens into a plain [`Value`]: fragments become an array, text a
    /// string.
    pub fn into_value(self) -> Value {
        match self {
            Decoded::Json(value) => value,
            Decoded::Fragments(values) => Value::Array(values),
            Decoded::Text(text) => Value::String(text),
        }
    }
}

/// Decodes a raw response body.
///
/// Tries a whole-text JSON parse first, then the `\n&&&\n` multi-document
/// format (only when it yields at least three segments), and otherwise
/// returns the text unchanged.
pub fn decode(text: &str) -> Decoded {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Decoded::Json(value);
    }

    let segments: Vec<&str> = text.split(FRAGMENT_SEPARATOR).collect();
    if segments.len() >= MIN_FRAGMENTS {
        let fragments: Vec<Value> = segments
            .iter()
            .filter_map(|segment| serde_json::from_str::<Value>(segment).ok())
            .filter(|value| !is_falsy(value))
            .collect();
        return Decoded::Fragments(fragments);
    }

    Decoded::Text(text.to_string())
}

// The upstream consumer filtered fragments by truthiness, so null, false,
// zero and the empty string are dropped along with unparsable segments.
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}
