//! Decoded message: the queryable form of one parsed payload

use bytes::Bytes;
use parking_lot::Mutex;
use prost_reflect::{DynamicMessage, ReflectMessage, Value as ProtoValue};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Result, SinkError};
use crate::message::Mapping;
use crate::parser::proto::scan_unknown_fields;
use crate::schema::Schema;
use crate::value::{json_to_field_value, message_to_mapping, FieldValue};

/// The decoded payload a [`DecodedMessage`] wraps
#[derive(Debug)]
pub enum DecodedPayload {
    /// Reflective protobuf tree plus the original wire bytes, kept for
    /// unknown-field validation
    Proto {
        /// Decoded dynamic message
        message: DynamicMessage,
        /// Original payload bytes
        raw: Bytes,
    },
    /// Flat JSON object
    Json(Mapping),
}

/// One decoded message, queryable by field path.
///
/// Owns the decoded payload and a per-instance memo of computed mappings:
/// the same payload may be asked for its key-schema mapping and its
/// value-schema mapping independently, and each is computed once. The memo
/// is mutex-guarded; everything else is immutable.
#[derive(Debug)]
pub struct DecodedMessage {
    payload: DecodedPayload,
    mapping_memo: Mutex<HashMap<String, Arc<Mapping>>>,
}

impl DecodedMessage {
    /// Wrap a decoded protobuf message and its original bytes
    pub fn proto(message: DynamicMessage, raw: Bytes) -> Self {
        Self {
            payload: DecodedPayload::Proto { message, raw },
            mapping_memo: Mutex::new(HashMap::new()),
        }
    }

    /// Wrap a parsed flat JSON object
    pub fn json(fields: Mapping) -> Self {
        Self {
            payload: DecodedPayload::Json(fields),
            mapping_memo: Mutex::new(HashMap::new()),
        }
    }

    /// The decoded payload
    pub fn payload(&self) -> &DecodedPayload {
        &self.payload
    }

    /// Resolve a dotted field path to a typed [`FieldValue`].
    ///
    /// Proto payloads traverse nested messages schema-first; JSON payloads
    /// look the path up directly in the flat object. Fails with
    /// `InvalidFieldPath` when the path does not resolve.
    pub fn get_field_by_name(&self, path: &str, schema: &Schema) -> Result<FieldValue> {
        match &self.payload {
            DecodedPayload::Proto { message, .. } => {
                let field = schema.field_by_path(path)?;
                let segments: Vec<&str> = path.split('.').collect();
                let raw = extract(message, &segments, path)?;
                FieldValue::resolve(&raw, field)
            }
            DecodedPayload::Json(fields) => {
                let value = fields.get(path).ok_or_else(|| {
                    SinkError::InvalidFieldPath(format!("field '{path}' not found in message"))
                })?;
                Ok(json_to_field_value(value))
            }
        }
    }

    /// Check for undecoded wire data.
    ///
    /// When unknown fields are disallowed, any wire bytes carrying field
    /// numbers absent from the descriptor fail with `UnknownFields`, and the
    /// error lists the offending field numbers and wire types. Detection is
    /// a pure function of the payload bytes and the descriptor, so repeated
    /// validation of the same message always gives the same answer.
    pub fn validate(&self, unknown_fields_allowed: bool) -> Result<()> {
        let DecodedPayload::Proto { message, raw } = &self.payload else {
            return Ok(());
        };
        if unknown_fields_allowed {
            return Ok(());
        }
        let unknown = scan_unknown_fields(raw.clone(), &message.descriptor())?;
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(SinkError::UnknownFields(unknown.join(", ")))
        }
    }

    /// Flattened column projection of this message under `schema`.
    ///
    /// Memoized per schema full name on this instance; the second request
    /// for the same schema returns the previously computed mapping.
    pub fn to_mapping(&self, schema: &Schema) -> Result<Arc<Mapping>> {
        let mut memo = self.mapping_memo.lock();
        if let Some(found) = memo.get(&schema.full_name) {
            return Ok(Arc::clone(found));
        }
        let computed = match &self.payload {
            DecodedPayload::Proto { message, .. } => {
                Arc::new(message_to_mapping(message, schema)?)
            }
            DecodedPayload::Json(fields) => Arc::new(fields.clone()),
        };
        memo.insert(schema.full_name.clone(), Arc::clone(&computed));
        Ok(computed)
    }
}

/// Walk the decoded tree along `segments`, returning the leaf value
fn extract(message: &DynamicMessage, segments: &[&str], path: &str) -> Result<ProtoValue> {
    let name = segments[0];
    let fd = message
        .descriptor()
        .get_field_by_name(name)
        .ok_or_else(|| {
            SinkError::InvalidFieldPath(format!(
                "field '{name}' not found in '{}' (path '{path}')",
                message.descriptor().full_name()
            ))
        })?;
    let value = message.get_field(&fd).into_owned();
    if segments.len() == 1 {
        return Ok(value);
    }
    match value {
        ProtoValue::Message(nested) => extract(&nested, &segments[1..], path),
        _ => Err(SinkError::InvalidFieldPath(format!(
            "field '{name}' in path '{path}' is not a nested message"
        ))),
    }
}
