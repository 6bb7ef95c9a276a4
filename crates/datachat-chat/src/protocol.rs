//! Backend protocol messages, in their JSON wire form.
//!
//! The backend streams one [`ProtocolMessage`] at a time. Structured values
//! inside it (`vegaConfig`, `result`) may arrive as tagged variant trees
//! (`{"structValue": {"fields": {...}}}`, `{"stringValue": "x"}`, ...);
//! [`Variant`] models such a tree and [`Variant::plainify`] turns it into plain
//! JSON exactly once, before anything downstream reads a field.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Number, Value};

use crate::error::ChatError;

// =============================================================================
// Variant trees
// =============================================================================

/// A backend structured value.
#[derive(Clone, Debug, PartialEq)]
pub enum Variant {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    /// Ordered fields; order is preserved from the wire.
    Struct(Vec<(String, Variant)>),
    List(Vec<Variant>),
}

const STRUCT_VALUE: &str = "structValue";
const LIST_VALUE: &str = "listValue";

impl Variant {
    /// Read a variant tree from JSON that may mix tagged and plain nodes.
    ///
    /// Only an object with exactly one key that is a known tag is treated as
    /// a wrapper. Anything else is taken structurally, so plain JSON passes
    /// through unchanged and multi-key objects stay objects.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Variant::Null,
            Value::Bool(b) => Variant::Bool(*b),
            Value::Number(n) => Variant::Number(n.clone()),
            Value::String(s) => Variant::String(s.clone()),
            Value::Array(items) => Variant::List(items.iter().map(Variant::from_json).collect()),
            Value::Object(map) => {
                if map.len() == 1 {
                    if let Some((tag, inner)) = map.iter().next() {
                        if let Some(unwrapped) = Self::from_tagged(tag, inner) {
                            return unwrapped;
                        }
                    }
                }
                Variant::Struct(
                    map.iter()
                        .map(|(k, v)| (k.clone(), Variant::from_json(v)))
                        .collect(),
                )
            }
        }
    }

    fn from_tagged(tag: &str, inner: &Value) -> Option<Self> {
        let variant = match tag {
            "nullValue" => Variant::Null,
            "boolValue" | "numberValue" | "stringValue" => Variant::from_json(inner),
            "integerValue" => match inner {
                // 64-bit integers travel as strings in the JSON mapping.
                Value::String(s) => s
                    .parse::<i64>()
                    .map(|n| Variant::Number(n.into()))
                    .unwrap_or_else(|_| Variant::String(s.clone())),
                other => Variant::from_json(other),
            },
            STRUCT_VALUE => match inner {
                Value::Object(obj) => match obj.get("fields") {
                    Some(fields @ Value::Object(_)) if obj.len() == 1 => {
                        Variant::from_json(fields)
                    }
                    _ => Variant::from_json(inner),
                },
                other => Variant::from_json(other),
            },
            LIST_VALUE => match inner {
                Value::Object(obj) => match obj.get("values") {
                    Some(values @ Value::Array(_)) => Variant::from_json(values),
                    _ if obj.is_empty() => Variant::List(Vec::new()),
                    _ => return None,
                },
                Value::Array(_) => Variant::from_json(inner),
                _ => return None,
            },
            _ => return None,
        };
        Some(variant)
    }

    /// Deep conversion into plain JSON.
    pub fn plainify(&self) -> Value {
        match self {
            Variant::Null => Value::Null,
            Variant::Bool(b) => Value::Bool(*b),
            Variant::Number(n) => Value::Number(n.clone()),
            Variant::String(s) => Value::String(s.clone()),
            Variant::Struct(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.plainify()))
                    .collect::<Map<String, Value>>(),
            ),
            Variant::List(items) => Value::Array(items.iter().map(Variant::plainify).collect()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Variant::Null)
    }
}

impl<'de> Deserialize<'de> for Variant {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Variant::from_json(&value))
    }
}

/// Plainify an arbitrary JSON tree that may contain tagged variant nodes.
pub fn plainify(value: &Value) -> Value {
    Variant::from_json(value).plainify()
}

// =============================================================================
// Payload
// =============================================================================

/// A message sub-part that either parsed or was malformed.
///
/// A malformed part does not fail the enclosing message; the parser reports
/// it and carries on with the sibling parts.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload<T> {
    Parsed(T),
    Malformed(String),
}

impl<T> Payload<T> {
    pub fn parsed(&self) -> Option<&T> {
        match self {
            Payload::Parsed(inner) => Some(inner),
            Payload::Malformed(_) => None,
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Payload<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match serde_json::from_value(value) {
            Ok(inner) => Payload::Parsed(inner),
            Err(e) => Payload::Malformed(e.to_string()),
        })
    }
}

// =============================================================================
// Messages
// =============================================================================

/// One element of the backend's response stream.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(from = "WireMessage")]
pub enum ProtocolMessage {
    /// Echo of the user's own turn.
    UserEcho(UserMessage),
    /// Backend output.
    System(Box<SystemMessage>),
    /// Neither arm was present.
    Empty,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    user_message: Option<UserMessage>,
    system_message: Option<SystemMessage>,
}

impl From<WireMessage> for ProtocolMessage {
    fn from(wire: WireMessage) -> Self {
        match (wire.user_message, wire.system_message) {
            (Some(user), _) if !user.text.is_empty() => ProtocolMessage::UserEcho(user),
            (_, Some(system)) => ProtocolMessage::System(Box::new(system)),
            (Some(user), None) => ProtocolMessage::UserEcho(user),
            (None, None) => ProtocolMessage::Empty,
        }
    }
}

impl ProtocolMessage {
    /// Parse one wire message from JSON text.
    pub fn from_json_str(line: &str) -> Result<Self, ChatError> {
        Ok(serde_json::from_str(line)?)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMessage {
    #[serde(default)]
    pub text: String,
}

/// A backend turn. Any subset of the parts may be present.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMessage {
    pub text: Option<Payload<TextMessage>>,
    pub data: Option<Payload<DataMessage>>,
    pub chart: Option<Payload<ChartMessage>>,
    pub analysis: Option<Payload<AnalysisMessage>>,
    pub error: Option<Payload<ErrorMessage>>,
    /// Schema resolution output; not displayed.
    pub schema: Option<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMessage {
    #[serde(default)]
    pub parts: Vec<String>,
    pub text_type: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataMessage {
    pub query: Option<Value>,
    pub generated_sql: Option<String>,
    pub result: Option<Variant>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMessage {
    pub query: Option<Value>,
    pub result: Option<ChartResult>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartResult {
    pub vega_config: Option<Variant>,
    pub image: Option<Blob>,
}

const LENIENT_PADDING: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);

/// Standard alphabet, padded or not.
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT_PADDING);

/// URL-safe alphabet, padded or not.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT_PADDING);

/// Binary content, base64-encoded on the wire.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: Option<String>,
    pub data: Option<String>,
}

impl Blob {
    /// Decoded bytes, or `None` when the blob carries no data.
    pub fn bytes(&self) -> Result<Option<Vec<u8>>, ChatError> {
        let Some(encoded) = self.data.as_deref().map(str::trim) else {
            return Ok(None);
        };
        if encoded.is_empty() {
            return Ok(None);
        }
        STANDARD_LENIENT
            .decode(encoded)
            .or_else(|_| URL_SAFE_LENIENT.decode(encoded))
            .map(Some)
            .map_err(|e| ChatError::Decode(format!("image data: {e}")))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMessage {
    pub query: Option<Value>,
    pub progress_event: Option<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    pub text: Option<String>,
    pub code: Option<String>,
}
