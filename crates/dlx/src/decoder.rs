// ai
//! 🔎 Record Decoder: one line in, one [`Item`] out.
//!
//! The exporter wraps every row under a fixed key (`"Item"` by convention):
//!
//! ```text
//! {"Item": {"pk": "order#1", "total": 12.50, "tags": ["a", "b"]}}
//! ```
//!
//! We parse the wrapper, pull the payload out, and convert it into the store's
//! native [`AttributeValue`] encoding. Two flavours of payload exist in the
//! wild: plain JSON, and DynamoDB export JSON where every value wears a type
//! descriptor like a name tag at a conference (`{"S": "hello my name is"}`).
//!
//! 🧠 Knowledge graph:
//! - Pure. No I/O, no state. The line reader feeds it, the batcher eats its output.
//! - Errors carry the 1-based line number; the driver turns them into `PipelineError::Decode`.
//! - Plain conversion is total over JSON. The typed flavour rejects descriptors it does not know.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::item::{AttributeValue, Item};

/// 🏷️ How the payload under the wrapper key is encoded.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PayloadEncoding {
    /// 📄 Plain JSON. `{"total": 12.5}` means what it says.
    #[default]
    Plain,
    /// 🏷️ DynamoDB export JSON. `{"total": {"N": "12.5"}}`.
    DynamodbJson,
}

/// 🔎 Turns raw lines into items. Cheap to build, cheap to clone, holds nothing but settings.
#[derive(Debug, Clone)]
pub struct RecordDecoder {
    payload_key: String,
    encoding: PayloadEncoding,
}

impl RecordDecoder {
    pub fn new(payload_key: impl Into<String>, encoding: PayloadEncoding) -> Self {
        Self {
            payload_key: payload_key.into(),
            encoding,
        }
    }

    /// 📄 Decode one raw line into an [`Item`].
    ///
    /// The line must be a JSON object, it must carry the payload key, and the payload
    /// must itself be an object. Anything else is an error string describing which of
    /// those three promises got broken.
    pub fn decode_line(&self, line: &str) -> Result<Item, String> {
        let wrapper: Value =
            serde_json::from_str(line).map_err(|err| format!("malformed JSON: {err}"))?;

        let mut wrapper = match wrapper {
            Value::Object(wrapper) => wrapper,
            other => {
                return Err(format!(
                    "expected a JSON object wrapping the record, got {}",
                    kind_of(&other)
                ));
            }
        };

        let payload = wrapper
            .remove(&self.payload_key)
            .ok_or_else(|| format!("missing payload key '{}'", self.payload_key))?;

        let fields = match payload {
            Value::Object(fields) => fields,
            other => {
                return Err(format!(
                    "payload under '{}' must be an object, got {}",
                    self.payload_key,
                    kind_of(&other)
                ));
            }
        };

        match self.encoding {
            PayloadEncoding::Plain => Ok(plain_fields(fields)),
            PayloadEncoding::DynamodbJson => typed_fields(fields),
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn plain_fields(fields: Map<String, Value>) -> Item {
    fields
        .into_iter()
        .map(|(name, value)| (name, plain_value(value)))
        .collect()
}

/// 🔄 Plain JSON → attribute value. Total: every JSON value has a home.
///
/// Numbers keep their original text (serde_json runs with `arbitrary_precision`),
/// so `12.50` arrives as `N("12.50")`, not as whatever f64 thinks it is.
pub fn plain_value(value: Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null,
        Value::Bool(b) => AttributeValue::Bool(b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s),
        Value::Array(items) => AttributeValue::L(items.into_iter().map(plain_value).collect()),
        Value::Object(fields) => AttributeValue::M(plain_fields(fields)),
    }
}

fn typed_fields(fields: Map<String, Value>) -> Result<Item, String> {
    fields
        .into_iter()
        .map(|(name, value)| {
            let attribute =
                typed_value(value).map_err(|reason| format!("attribute '{name}': {reason}"))?;
            Ok((name, attribute))
        })
        .collect()
}

/// 🏷️ DynamoDB export JSON → attribute value.
///
/// Every value must be an object with exactly one type descriptor. Binary
/// descriptors (`B`, `BS`) and anything else we do not recognise are rejected:
/// that is the one place decoding a syntactically valid export can fail.
pub fn typed_value(value: Value) -> Result<AttributeValue, String> {
    let descriptor = match value {
        Value::Object(descriptor) => descriptor,
        other => {
            return Err(format!(
                "expected a type descriptor object, got {}",
                kind_of(&other)
            ));
        }
    };
    if descriptor.len() != 1 {
        return Err(format!(
            "a type descriptor has exactly one key, this one has {}",
            descriptor.len()
        ));
    }
    let Some((tag, inner)) = descriptor.into_iter().next() else {
        return Err("empty type descriptor".to_string());
    };

    match (tag.as_str(), inner) {
        ("S", Value::String(s)) => Ok(AttributeValue::S(s)),
        ("N", Value::String(n)) => Ok(AttributeValue::N(n)),
        ("BOOL", Value::Bool(b)) => Ok(AttributeValue::Bool(b)),
        ("NULL", Value::Bool(true)) => Ok(AttributeValue::Null),
        ("M", Value::Object(fields)) => typed_fields(fields).map(AttributeValue::M),
        ("L", Value::Array(items)) => items
            .into_iter()
            .map(typed_value)
            .collect::<Result<Vec<_>, _>>()
            .map(AttributeValue::L),
        ("SS", Value::Array(items)) => string_set(items).map(AttributeValue::Ss),
        ("NS", Value::Array(items)) => string_set(items).map(AttributeValue::Ns),
        (tag @ ("S" | "N" | "BOOL" | "NULL" | "M" | "L" | "SS" | "NS"), other) => Err(format!(
            "descriptor '{tag}' cannot hold {}",
            kind_of(&other)
        )),
        (unknown, _) => Err(format!("unrecognized value category '{unknown}'")),
    }
}

fn string_set(items: Vec<Value>) -> Result<Vec<String>, String> {
    items
        .into_iter()
        .map(|item| match item {
            Value::String(s) => Ok(s),
            other => Err(format!("set members must be strings, got {}", kind_of(&other))),
        })
        .collect()
}
