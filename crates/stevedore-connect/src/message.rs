//! Raw message ingestion types
//!
//! A [`Message`] is the unit handed to a sink connector per input record:
//! opaque key/value bytes plus caller-supplied provenance metadata (source
//! offset, topic, ingestion timestamp). Messages are immutable once built
//! and live only for the duration of one batch call.

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use crate::config::MetadataFieldType;
use crate::error::{Result, SinkError};

/// An ordered string-keyed mapping, the flattened column projection shape.
pub type Mapping = serde_json::Map<String, JsonValue>;

/// One keyed/valued input record with provenance metadata
#[derive(Debug, Clone, Default)]
pub struct Message {
    /// Raw key bytes, if the record carried a key
    pub key: Option<Bytes>,
    /// Raw value bytes, if the record carried a value
    pub value: Option<Bytes>,
    /// Caller-supplied provenance (offset, topic, ingestion timestamp)
    pub metadata: Mapping,
}

impl Message {
    /// Create a message from optional key and value bytes
    pub fn new(key: Option<Bytes>, value: Option<Bytes>) -> Self {
        Self {
            key,
            value,
            metadata: Mapping::new(),
        }
    }

    /// Create a message carrying only a value
    pub fn from_value(value: impl Into<Bytes>) -> Self {
        Self::new(None, Some(value.into()))
    }

    /// Add a metadata entry (builder-style)
    pub fn with_metadata(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Fold metadata entries into a mapping, coercing each entry that has a
    /// configured column type.
    ///
    /// Entries without a configured type pass through unchanged; `null`
    /// entries are skipped. Coercion failures are per-message errors, never
    /// panics.
    pub fn metadata_mapping(
        &self,
        types: &BTreeMap<String, MetadataFieldType>,
    ) -> Result<Mapping> {
        let mut out = Mapping::new();
        for (name, value) in &self.metadata {
            if value.is_null() {
                continue;
            }
            let coerced = match types.get(name) {
                Some(ty) => coerce(name, value, *ty)?,
                None => value.clone(),
            };
            out.insert(name.clone(), coerced);
        }
        Ok(out)
    }
}

fn coerce(name: &str, value: &JsonValue, ty: MetadataFieldType) -> Result<JsonValue> {
    match ty {
        MetadataFieldType::String => Ok(match value {
            JsonValue::String(s) => JsonValue::String(s.clone()),
            other => JsonValue::String(other.to_string()),
        }),
        MetadataFieldType::Integer => match value {
            JsonValue::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
            JsonValue::String(s) => s
                .parse::<i64>()
                .map(|v| JsonValue::Number(v.into()))
                .map_err(|_| {
                    SinkError::InvalidMetadata(format!(
                        "metadata field '{name}' is not an integer: {s}"
                    ))
                }),
            other => Err(SinkError::InvalidMetadata(format!(
                "metadata field '{name}' is not an integer: {other}"
            ))),
        },
        MetadataFieldType::Timestamp => {
            let millis = match value {
                JsonValue::Number(n) => n.as_i64(),
                JsonValue::String(s) => s.parse::<i64>().ok(),
                _ => None,
            };
            let millis = millis.ok_or_else(|| {
                SinkError::InvalidMetadata(format!(
                    "metadata field '{name}' is not an epoch-millis timestamp: {value}"
                ))
            })?;
            let ts = DateTime::from_timestamp_millis(millis).ok_or_else(|| {
                SinkError::InvalidMetadata(format!(
                    "metadata field '{name}' is out of timestamp range: {millis}"
                ))
            })?;
            Ok(JsonValue::String(
                ts.to_rfc3339_opts(SecondsFormat::Secs, true),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn types(entries: &[(&str, MetadataFieldType)]) -> BTreeMap<String, MetadataFieldType> {
        entries
            .iter()
            .map(|(k, t)| (k.to_string(), *t))
            .collect()
    }

    #[test]
    fn test_builder() {
        let msg = Message::from_value("payload")
            .with_metadata("topic", json!("orders"))
            .with_metadata("offset", json!(42));

        assert!(msg.key.is_none());
        assert_eq!(msg.value.as_deref(), Some(b"payload".as_ref()));
        assert_eq!(msg.metadata.len(), 2);
    }

    #[test]
    fn test_metadata_passthrough() {
        let msg = Message::from_value("x").with_metadata("offset", json!(7));
        let mapping = msg.metadata_mapping(&BTreeMap::new()).unwrap();
        assert_eq!(mapping.get("offset"), Some(&json!(7)));
    }

    #[test]
    fn test_metadata_integer_coercion() {
        let msg = Message::from_value("x").with_metadata("offset", json!("1234"));
        let mapping = msg
            .metadata_mapping(&types(&[("offset", MetadataFieldType::Integer)]))
            .unwrap();
        assert_eq!(mapping.get("offset"), Some(&json!(1234)));
    }

    #[test]
    fn test_metadata_timestamp_coercion() {
        let msg = Message::from_value("x").with_metadata("event_ts", json!(1669962594000i64));
        let mapping = msg
            .metadata_mapping(&types(&[("event_ts", MetadataFieldType::Timestamp)]))
            .unwrap();
        assert_eq!(mapping.get("event_ts"), Some(&json!("2022-12-02T06:29:54Z")));
    }

    #[test]
    fn test_metadata_coercion_failure() {
        let msg = Message::from_value("x").with_metadata("offset", json!(true));
        let err = msg
            .metadata_mapping(&types(&[("offset", MetadataFieldType::Integer)]))
            .unwrap_err();
        assert!(err.to_string().contains("offset"));
    }

    #[test]
    fn test_metadata_null_dropped() {
        let msg = Message::from_value("x").with_metadata("partition", JsonValue::Null);
        let mapping = msg.metadata_mapping(&BTreeMap::new()).unwrap();
        assert!(mapping.is_empty());
    }
}
