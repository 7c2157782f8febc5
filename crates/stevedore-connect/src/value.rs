//! Field value system
//!
//! [`FieldValue`] is the typed result of resolving one field on a decoded
//! message: a closed set of variants, each with a canonical string form and
//! a canonical JSON form. [`FieldValue::resolve`] is the single dispatch
//! over a field's structural and logical type; the match order is fixed and
//! each rule is independently testable.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use prost_reflect::{DynamicMessage, MapKey, ReflectMessage, Value as ProtoValue};
use serde_json::Value as JsonValue;
use std::fmt;

use crate::error::{Result, SinkError};
use crate::message::Mapping;
use crate::schema::{FieldDescriptor, FieldType, LogicalType, Schema};

/// A primitive leaf value
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    /// UTF-8 string
    String(String),
    /// Signed integer
    Int(i64),
    /// Unsigned integer
    UInt(u64),
    /// Floating point
    Float(f64),
    /// Boolean
    Bool(bool),
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::UInt(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// The typed result of resolving one field path on a decoded message
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Primitive leaf
    Scalar(ScalarValue),
    /// Bytes field, already rendered to its base64 canonical form
    Bytes(String),
    /// `google.protobuf.Timestamp`
    Timestamp(DateTime<Utc>),
    /// `google.protobuf.Duration`
    Duration {
        /// Whole seconds
        seconds: i64,
        /// Fractional nanoseconds
        nanos: i32,
    },
    /// Enum member, by declared name
    Enum(String),
    /// Nested message, rendered field-by-field
    Message(Mapping),
    /// Map field, keys stringified and sorted
    Map(Mapping),
    /// Repeated field, elements in declaration order
    List(Vec<FieldValue>),
}

impl FieldValue {
    /// Resolve a raw decoded value against its field descriptor.
    ///
    /// Dispatch precedence (first match wins): timestamp, enum, bytes,
    /// struct, map, duration, nested message, scalar. Repeated fields
    /// resolve element-wise into [`FieldValue::List`].
    pub fn resolve(value: &ProtoValue, field: &FieldDescriptor) -> Result<FieldValue> {
        if field.repeated {
            if let ProtoValue::List(items) = value {
                let elements = items
                    .iter()
                    .map(|item| Self::resolve_single(item, field))
                    .collect::<Result<Vec<_>>>()?;
                return Ok(FieldValue::List(elements));
            }
        }
        Self::resolve_single(value, field)
    }

    fn resolve_single(value: &ProtoValue, field: &FieldDescriptor) -> Result<FieldValue> {
        match (field.logical_type, field.field_type) {
            (Some(LogicalType::Timestamp), _) => {
                let (seconds, nanos) = seconds_nanos(value, field)?;
                let ts = DateTime::from_timestamp(seconds, nanos.clamp(0, 999_999_999) as u32)
                    .ok_or_else(|| {
                        SinkError::Deserialization(format!(
                            "timestamp out of range in field '{}': {seconds}s",
                            field.name
                        ))
                    })?;
                Ok(FieldValue::Timestamp(ts))
            }
            (_, FieldType::Enum) => {
                let number = value.as_enum_number().ok_or_else(|| type_mismatch(field))?;
                let name = field
                    .enum_values
                    .as_ref()
                    .and_then(|members| members.get(&number).cloned())
                    .unwrap_or_else(|| number.to_string());
                Ok(FieldValue::Enum(name))
            }
            (_, FieldType::Bytes) => {
                let bytes = value.as_bytes().ok_or_else(|| type_mismatch(field))?;
                // base64 over the value's own text rendering, not the raw
                // bytes; kept bit-for-bit with the historical sink output
                let text = String::from_utf8_lossy(bytes);
                Ok(FieldValue::Bytes(BASE64.encode(text.as_bytes())))
            }
            (Some(LogicalType::Struct), _) => {
                let msg = value.as_message().ok_or_else(|| type_mismatch(field))?;
                Ok(json_to_field_value(&dynamic_to_json(msg)))
            }
            (Some(LogicalType::Map), _) => {
                let map = value.as_map().ok_or_else(|| type_mismatch(field))?;
                let value_field = field.nested.as_ref().and_then(|entry| entry.field("value"));
                let mut entries: Vec<(String, &ProtoValue)> = map
                    .iter()
                    .map(|(k, v)| (map_key_to_string(k), v))
                    .collect();
                entries.sort_by(|a, b| a.0.cmp(&b.0));
                let mut out = Mapping::new();
                for (key, raw) in entries {
                    let rendered = match value_field {
                        Some(vf) => Self::resolve(raw, vf)?.to_json(),
                        None => proto_value_to_json(raw),
                    };
                    out.insert(key, rendered);
                }
                Ok(FieldValue::Map(out))
            }
            (Some(LogicalType::Duration), _) => {
                let (seconds, nanos) = seconds_nanos(value, field)?;
                Ok(FieldValue::Duration { seconds, nanos })
            }
            (_, FieldType::Message) => {
                let msg = value.as_message().ok_or_else(|| type_mismatch(field))?;
                match &field.nested {
                    Some(nested) => Ok(FieldValue::Message(message_to_mapping(msg, nested)?)),
                    // recursive types carry no nested schema; render dynamically
                    None => Ok(json_to_field_value(&dynamic_to_json(msg))),
                }
            }
            _ => match value {
                ProtoValue::Bool(v) => Ok(FieldValue::Scalar(ScalarValue::Bool(*v))),
                ProtoValue::I32(v) => Ok(FieldValue::Scalar(ScalarValue::Int(i64::from(*v)))),
                ProtoValue::I64(v) => Ok(FieldValue::Scalar(ScalarValue::Int(*v))),
                ProtoValue::U32(v) => Ok(FieldValue::Scalar(ScalarValue::UInt(u64::from(*v)))),
                ProtoValue::U64(v) => Ok(FieldValue::Scalar(ScalarValue::UInt(*v))),
                ProtoValue::F32(v) => Ok(FieldValue::Scalar(ScalarValue::Float(f64::from(*v)))),
                ProtoValue::F64(v) => Ok(FieldValue::Scalar(ScalarValue::Float(*v))),
                ProtoValue::String(v) => Ok(FieldValue::Scalar(ScalarValue::String(v.clone()))),
                _ => Err(type_mismatch(field)),
            },
        }
    }

    /// Render to the canonical string form used in templates and keys
    pub fn to_canonical_string(&self) -> String {
        match self {
            Self::Scalar(s) => s.to_string(),
            Self::Bytes(b64) => b64.clone(),
            Self::Timestamp(ts) => ts.to_rfc3339_opts(SecondsFormat::Secs, true),
            Self::Duration { seconds, nanos } => format_duration(*seconds, *nanos),
            Self::Enum(name) => name.clone(),
            Self::Message(map) | Self::Map(map) => JsonValue::Object(map.clone()).to_string(),
            Self::List(items) => {
                JsonValue::Array(items.iter().map(FieldValue::to_json).collect()).to_string()
            }
        }
    }

    /// Render to the canonical JSON form used in mappings and bodies
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Scalar(ScalarValue::String(s)) => JsonValue::String(s.clone()),
            Self::Scalar(ScalarValue::Int(v)) => JsonValue::Number((*v).into()),
            Self::Scalar(ScalarValue::UInt(v)) => JsonValue::Number((*v).into()),
            Self::Scalar(ScalarValue::Float(v)) => serde_json::Number::from_f64(*v)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Self::Scalar(ScalarValue::Bool(v)) => JsonValue::Bool(*v),
            Self::Bytes(b64) => JsonValue::String(b64.clone()),
            Self::Timestamp(_) | Self::Duration { .. } => {
                JsonValue::String(self.to_canonical_string())
            }
            Self::Enum(name) => JsonValue::String(name.clone()),
            Self::Message(map) | Self::Map(map) => JsonValue::Object(map.clone()),
            Self::List(items) => {
                JsonValue::Array(items.iter().map(FieldValue::to_json).collect())
            }
        }
    }
}

fn format_duration(seconds: i64, nanos: i32) -> String {
    if nanos == 0 {
        format!("{seconds}s")
    } else {
        format!("{seconds}.{:09}s", nanos.unsigned_abs())
    }
}

fn type_mismatch(field: &FieldDescriptor) -> SinkError {
    SinkError::Deserialization(format!(
        "decoded value does not match descriptor for field '{}'",
        field.name
    ))
}

fn seconds_nanos(value: &ProtoValue, field: &FieldDescriptor) -> Result<(i64, i32)> {
    let msg = value.as_message().ok_or_else(|| type_mismatch(field))?;
    let seconds = msg
        .get_field_by_name("seconds")
        .and_then(|v| v.as_i64())
        .unwrap_or(0);
    let nanos = msg
        .get_field_by_name("nanos")
        .and_then(|v| v.as_i32())
        .unwrap_or(0);
    Ok((seconds, nanos))
}

fn map_key_to_string(key: &MapKey) -> String {
    match key {
        MapKey::Bool(v) => v.to_string(),
        MapKey::I32(v) => v.to_string(),
        MapKey::I64(v) => v.to_string(),
        MapKey::U32(v) => v.to_string(),
        MapKey::U64(v) => v.to_string(),
        MapKey::String(v) => v.clone(),
    }
}

/// Render a message field-by-field through its schema, applying column-name
/// overrides and skipping absent/empty fields.
pub(crate) fn message_to_mapping(msg: &DynamicMessage, schema: &Schema) -> Result<Mapping> {
    let desc = msg.descriptor();
    let mut out = Mapping::new();
    for field in &schema.fields {
        let Some(fd) = desc.get_field_by_name(&field.name) else {
            continue;
        };
        if !msg.has_field(&fd) && !fd.is_list() && !fd.is_map() {
            continue;
        }
        let value = msg.get_field(&fd);
        match &*value {
            ProtoValue::List(items) if items.is_empty() => continue,
            ProtoValue::Map(entries) if entries.is_empty() => continue,
            _ => {}
        }
        let resolved = FieldValue::resolve(&value, field)?;
        out.insert(field.output_name().to_string(), resolved.to_json());
    }
    Ok(out)
}

/// Render a message without a schema: the fallback for free-form struct
/// values and recursive types.
fn dynamic_to_json(msg: &DynamicMessage) -> JsonValue {
    let desc = msg.descriptor();
    match desc.full_name() {
        "google.protobuf.Struct" => {
            let mut out = Mapping::new();
            if let Some(fields) = msg.get_field_by_name("fields") {
                if let Some(map) = fields.as_map() {
                    let mut entries: Vec<(String, &ProtoValue)> = map
                        .iter()
                        .map(|(k, v)| (map_key_to_string(k), v))
                        .collect();
                    entries.sort_by(|a, b| a.0.cmp(&b.0));
                    for (key, value) in entries {
                        out.insert(key, proto_value_to_json(value));
                    }
                }
            }
            JsonValue::Object(out)
        }
        "google.protobuf.Value" => {
            for fd in desc.fields() {
                if !msg.has_field(&fd) {
                    continue;
                }
                let value = msg.get_field(&fd);
                return match fd.name() {
                    "null_value" => JsonValue::Null,
                    "number_value" => value
                        .as_f64()
                        .and_then(serde_json::Number::from_f64)
                        .map(JsonValue::Number)
                        .unwrap_or(JsonValue::Null),
                    "string_value" => {
                        JsonValue::String(value.as_str().unwrap_or_default().to_string())
                    }
                    "bool_value" => JsonValue::Bool(value.as_bool().unwrap_or_default()),
                    "struct_value" | "list_value" => value
                        .as_message()
                        .map(dynamic_to_json)
                        .unwrap_or(JsonValue::Null),
                    _ => JsonValue::Null,
                };
            }
            JsonValue::Null
        }
        "google.protobuf.ListValue" => {
            let values = msg
                .get_field_by_name("values")
                .and_then(|v| v.as_list().map(|items| items.to_vec()))
                .unwrap_or_default();
            JsonValue::Array(values.iter().map(proto_value_to_json).collect())
        }
        _ => {
            let mut out = Mapping::new();
            for fd in desc.fields() {
                if !msg.has_field(&fd) && !fd.is_list() && !fd.is_map() {
                    continue;
                }
                out.insert(fd.name().to_string(), proto_value_to_json(&msg.get_field(&fd)));
            }
            JsonValue::Object(out)
        }
    }
}

/// Schema-less rendering of a single decoded value
fn proto_value_to_json(value: &ProtoValue) -> JsonValue {
    match value {
        ProtoValue::Bool(v) => JsonValue::Bool(*v),
        ProtoValue::I32(v) => JsonValue::Number((*v).into()),
        ProtoValue::I64(v) => JsonValue::Number((*v).into()),
        ProtoValue::U32(v) => JsonValue::Number((*v).into()),
        ProtoValue::U64(v) => JsonValue::Number((*v).into()),
        ProtoValue::F32(v) => serde_json::Number::from_f64(f64::from(*v))
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        ProtoValue::F64(v) => serde_json::Number::from_f64(*v)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        ProtoValue::String(v) => JsonValue::String(v.clone()),
        ProtoValue::Bytes(v) => JsonValue::String(BASE64.encode(v)),
        ProtoValue::EnumNumber(v) => JsonValue::Number((*v).into()),
        ProtoValue::Message(m) => dynamic_to_json(m),
        ProtoValue::List(items) => {
            JsonValue::Array(items.iter().map(proto_value_to_json).collect())
        }
        ProtoValue::Map(map) => {
            let mut entries: Vec<(String, &ProtoValue)> = map
                .iter()
                .map(|(k, v)| (map_key_to_string(k), v))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut out = Mapping::new();
            for (key, value) in entries {
                out.insert(key, proto_value_to_json(value));
            }
            JsonValue::Object(out)
        }
    }
}

/// Lift an arbitrary JSON value into the closed variant set
pub(crate) fn json_to_field_value(value: &JsonValue) -> FieldValue {
    match value {
        JsonValue::Null => FieldValue::Scalar(ScalarValue::String("null".to_string())),
        JsonValue::Bool(v) => FieldValue::Scalar(ScalarValue::Bool(*v)),
        JsonValue::Number(n) => {
            if let Some(v) = n.as_i64() {
                FieldValue::Scalar(ScalarValue::Int(v))
            } else if let Some(v) = n.as_u64() {
                FieldValue::Scalar(ScalarValue::UInt(v))
            } else {
                FieldValue::Scalar(ScalarValue::Float(n.as_f64().unwrap_or_default()))
            }
        }
        JsonValue::String(s) => FieldValue::Scalar(ScalarValue::String(s.clone())),
        JsonValue::Array(items) => {
            FieldValue::List(items.iter().map(json_to_field_value).collect())
        }
        JsonValue::Object(map) => FieldValue::Message(map.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_formatting() {
        assert_eq!(
            FieldValue::Duration {
                seconds: 1000,
                nanos: 12123
            }
            .to_canonical_string(),
            "1000.000012123s"
        );
        assert_eq!(
            FieldValue::Duration {
                seconds: 408,
                nanos: 0
            }
            .to_canonical_string(),
            "408s"
        );
    }

    #[test]
    fn test_timestamp_formatting() {
        let ts = DateTime::from_timestamp(1669962594, 0).unwrap();
        assert_eq!(
            FieldValue::Timestamp(ts).to_canonical_string(),
            "2022-12-02T06:29:54Z"
        );
    }

    #[test]
    fn test_timestamp_subseconds_dropped() {
        let ts = DateTime::from_timestamp(1669962594, 123_456_789).unwrap();
        assert_eq!(
            FieldValue::Timestamp(ts).to_canonical_string(),
            "2022-12-02T06:29:54Z"
        );
    }

    #[test]
    fn test_bytes_double_encoding() {
        // canonical form is base64 over the lossy text rendering, which only
        // matches base64 of the raw bytes for valid UTF-8 input
        let utf8 = b"hello";
        let text = String::from_utf8_lossy(utf8);
        assert_eq!(BASE64.encode(text.as_bytes()), BASE64.encode(utf8));

        let non_utf8 = [0xff, 0x68];
        let text = String::from_utf8_lossy(&non_utf8);
        assert_ne!(BASE64.encode(text.as_bytes()), BASE64.encode(non_utf8));
    }

    #[test]
    fn test_scalar_canonical_strings() {
        assert_eq!(
            FieldValue::Scalar(ScalarValue::Int(-7)).to_canonical_string(),
            "-7"
        );
        assert_eq!(
            FieldValue::Scalar(ScalarValue::Bool(true)).to_canonical_string(),
            "true"
        );
        assert_eq!(
            FieldValue::Scalar(ScalarValue::String("abc".into())).to_canonical_string(),
            "abc"
        );
    }

    #[test]
    fn test_list_renders_as_json_array() {
        let list = FieldValue::List(vec![
            FieldValue::Scalar(ScalarValue::String("a".into())),
            FieldValue::Scalar(ScalarValue::Int(2)),
        ]);
        assert_eq!(list.to_canonical_string(), r#"["a",2]"#);
    }

    #[test]
    fn test_enum_canonical_is_name() {
        assert_eq!(FieldValue::Enum("SHIPPED".into()).to_canonical_string(), "SHIPPED");
        assert_eq!(
            FieldValue::Enum("SHIPPED".into()).to_json(),
            JsonValue::String("SHIPPED".into())
        );
    }

    #[test]
    fn test_json_lift() {
        let lifted = json_to_field_value(&serde_json::json!({"a": 1}));
        assert!(matches!(lifted, FieldValue::Message(_)));
        let lifted = json_to_field_value(&serde_json::json!(3.5));
        assert_eq!(lifted.to_canonical_string(), "3.5");
    }
}
