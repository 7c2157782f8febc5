//! Descriptor-driven protobuf parsing

use bytes::{Buf, Bytes};
use parking_lot::Mutex;
use prost::encoding::{decode_key, decode_varint, skip_field, DecodeContext, WireType};
use prost_reflect::{DynamicMessage, Kind, MessageDescriptor};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::{Result, SinkError};
use crate::message::Message;
use crate::metrics::{names, noop, SharedMetrics};
use crate::parser::{select_bytes, DecodedMessage, MessageParser, ParseMode};
use crate::schema::{ColumnOverrides, DescriptorRegistry, Schema};

/// Protobuf parsing strategy.
///
/// Resolves descriptors through an injected [`DescriptorRegistry`] and
/// caches the [`Schema`] built for each type name, so per-batch work is
/// decode-only. Construction takes the registry and metrics handles
/// explicitly; nothing is looked up globally.
pub struct ProtoParser {
    registry: Arc<dyn DescriptorRegistry>,
    metrics: SharedMetrics,
    allow_unknown_fields: bool,
    overrides: ColumnOverrides,
    schema_cache: Mutex<HashMap<String, Arc<Schema>>>,
}

impl std::fmt::Debug for ProtoParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtoParser")
            .field("allow_unknown_fields", &self.allow_unknown_fields)
            .field("overrides", &self.overrides)
            .finish_non_exhaustive()
    }
}

impl ProtoParser {
    /// Create a parser over the given descriptor registry
    pub fn new(registry: Arc<dyn DescriptorRegistry>) -> Self {
        Self {
            registry,
            metrics: noop(),
            allow_unknown_fields: false,
            overrides: ColumnOverrides::new(),
            schema_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Inject a metrics handle (builder-style)
    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Tolerate undecoded wire data instead of failing validation
    pub fn with_unknown_fields_allowed(mut self, allowed: bool) -> Self {
        self.allow_unknown_fields = allowed;
        self
    }

    /// Supply column-name overrides applied when schemas are built
    pub fn with_column_overrides(mut self, overrides: ColumnOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    fn try_parse(
        &self,
        message: &Message,
        mode: ParseMode,
        schema_name: &str,
    ) -> Result<DecodedMessage> {
        let bytes = select_bytes(message, mode)?;
        let descriptor = self.registry.descriptor(schema_name)?;
        let decoded = DynamicMessage::decode(descriptor, bytes.as_ref()).map_err(|e| {
            SinkError::Deserialization(format!("failed to decode {schema_name}: {e}"))
        })?;
        let decoded = DecodedMessage::proto(decoded, bytes.clone());
        decoded.validate(self.allow_unknown_fields)?;
        Ok(decoded)
    }
}

impl MessageParser for ProtoParser {
    fn parse(
        &self,
        message: &Message,
        mode: ParseMode,
        schema_name: &str,
    ) -> Result<DecodedMessage> {
        match self.try_parse(message, mode, schema_name) {
            Ok(decoded) => {
                self.metrics.increment(names::MESSAGES_PARSED, 1);
                Ok(decoded)
            }
            Err(err) => {
                debug!(%err, schema_name, "message failed to parse");
                self.metrics.increment(names::PARSE_FAILURES, 1);
                Err(err)
            }
        }
    }

    fn schema(&self, schema_name: &str) -> Result<Arc<Schema>> {
        let mut cache = self.schema_cache.lock();
        if let Some(found) = cache.get(schema_name) {
            return Ok(Arc::clone(found));
        }
        let descriptor = self.registry.descriptor(schema_name)?;
        let schema = Arc::new(Schema::build(&descriptor, &self.overrides));
        cache.insert(schema_name.to_string(), Arc::clone(&schema));
        Ok(schema)
    }
}

/// Scan wire bytes for field numbers absent from the descriptor.
///
/// Walks the top-level tags and recurses into known sub-message fields, so
/// unknown data buried inside a nested message is reported too. Returns one
/// human-readable entry per offending field (`customer.99 (varint)`).
pub(crate) fn scan_unknown_fields(
    raw: Bytes,
    descriptor: &MessageDescriptor,
) -> Result<Vec<String>> {
    let mut found = Vec::new();
    scan(raw, descriptor, "", &mut found)?;
    Ok(found)
}

fn scan(
    mut buf: Bytes,
    descriptor: &MessageDescriptor,
    context: &str,
    found: &mut Vec<String>,
) -> Result<()> {
    while buf.has_remaining() {
        let (tag, wire_type) =
            decode_key(&mut buf).map_err(|e| SinkError::Deserialization(e.to_string()))?;
        match descriptor.get_field(tag) {
            None => {
                found.push(format!("{context}{tag} ({})", wire_name(wire_type)));
                skip_field(wire_type, tag, &mut buf, DecodeContext::default())
                    .map_err(|e| SinkError::Deserialization(e.to_string()))?;
            }
            Some(field) => {
                if wire_type == WireType::LengthDelimited {
                    let len = decode_varint(&mut buf)
                        .map_err(|e| SinkError::Deserialization(e.to_string()))?
                        as usize;
                    if len > buf.remaining() {
                        return Err(SinkError::Deserialization(format!(
                            "truncated field {tag} in message bytes"
                        )));
                    }
                    let sub = buf.copy_to_bytes(len);
                    if let Kind::Message(sub_descriptor) = field.kind() {
                        let nested_context = format!("{context}{}.", field.name());
                        scan(sub, &sub_descriptor, &nested_context, found)?;
                    }
                } else {
                    skip_field(wire_type, tag, &mut buf, DecodeContext::default())
                        .map_err(|e| SinkError::Deserialization(e.to_string()))?;
                }
            }
        }
    }
    Ok(())
}

fn wire_name(wire_type: WireType) -> &'static str {
    match wire_type {
        WireType::Varint => "varint",
        WireType::SixtyFourBit => "64-bit",
        WireType::LengthDelimited => "length-delimited",
        WireType::StartGroup | WireType::EndGroup => "group",
        WireType::ThirtyTwoBit => "32-bit",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{encode_order, order_registry, wide_order_registry, wide_order_message};
    use crate::value::FieldValue;
    use prost_reflect::Value as ProtoValue;

    fn parser() -> ProtoParser {
        ProtoParser::new(Arc::new(order_registry()))
    }

    #[test]
    fn test_parse_and_extract() {
        let parser = parser();
        let msg = Message::from_value(encode_order("ORD-1", 3));
        let decoded = parser
            .parse(&msg, ParseMode::LogMessage, "orders.OrderLog")
            .unwrap();

        let schema = parser.schema("orders.OrderLog").unwrap();
        let order_number = decoded.get_field_by_name("order_number", &schema).unwrap();
        assert_eq!(order_number.to_canonical_string(), "ORD-1");

        let quantity = decoded.get_field_by_name("quantity", &schema).unwrap();
        assert_eq!(quantity.to_canonical_string(), "3");
    }

    #[test]
    fn test_parse_nested_path() {
        let parser = parser();
        let msg = Message::from_value(encode_order("ORD-2", 1));
        let decoded = parser
            .parse(&msg, ParseMode::LogMessage, "orders.OrderLog")
            .unwrap();
        let schema = parser.schema("orders.OrderLog").unwrap();

        let email = decoded.get_field_by_name("customer.email", &schema).unwrap();
        assert_eq!(email.to_canonical_string(), "ord-2@example.com");
    }

    #[test]
    fn test_empty_value_rejected() {
        let parser = parser();
        let msg = Message::new(None, None);
        let err = parser
            .parse(&msg, ParseMode::LogMessage, "orders.OrderLog")
            .unwrap_err();
        assert!(matches!(err, SinkError::EmptyMessage(_)));
    }

    #[test]
    fn test_malformed_bytes_rejected() {
        let parser = parser();
        // a lone 0xff is a truncated key
        let msg = Message::from_value(vec![0xffu8]);
        let err = parser
            .parse(&msg, ParseMode::LogMessage, "orders.OrderLog")
            .unwrap_err();
        assert!(matches!(err, SinkError::Deserialization(_)));
    }

    #[test]
    fn test_unknown_fields_detected() {
        // encode with the wide descriptor (extra field 99), decode with the
        // narrow one
        let bytes = wide_order_message("ORD-3");
        let narrow = parser();
        let msg = Message::from_value(bytes);

        let err = narrow
            .parse(&msg, ParseMode::LogMessage, "orders.OrderLog")
            .unwrap_err();
        assert!(matches!(err, SinkError::UnknownFields(_)));
        assert!(err.to_string().contains("99"));
    }

    #[test]
    fn test_unknown_fields_detection_is_idempotent() {
        let bytes = wide_order_message("ORD-4");
        let parser = parser();
        for _ in 0..2 {
            let msg = Message::from_value(bytes.clone());
            let err = parser
                .parse(&msg, ParseMode::LogMessage, "orders.OrderLog")
                .unwrap_err();
            assert!(matches!(err, SinkError::UnknownFields(_)));
        }

        // clean bytes never trip the check
        let clean = Message::from_value(encode_order("ORD-5", 2));
        for _ in 0..2 {
            assert!(parser
                .parse(&clean, ParseMode::LogMessage, "orders.OrderLog")
                .is_ok());
        }
    }

    #[test]
    fn test_unknown_fields_allowed() {
        let registry = Arc::new(order_registry());
        let tolerant = ProtoParser::new(registry).with_unknown_fields_allowed(true);
        let msg = Message::from_value(wide_order_message("ORD-6"));
        assert!(tolerant
            .parse(&msg, ParseMode::LogMessage, "orders.OrderLog")
            .is_ok());
    }

    #[test]
    fn test_wide_registry_sees_no_unknown_fields() {
        // the same bytes validate cleanly against the descriptor that
        // declares field 99
        let wide = ProtoParser::new(Arc::new(wide_order_registry()));
        let msg = Message::from_value(wide_order_message("ORD-7"));
        assert!(wide
            .parse(&msg, ParseMode::LogMessage, "orders.OrderLog")
            .is_ok());
    }

    #[test]
    fn test_schema_cached() {
        let parser = parser();
        let first = parser.schema("orders.OrderLog").unwrap();
        let second = parser.schema("orders.OrderLog").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_mapping_memoized() {
        let parser = parser();
        let msg = Message::from_value(encode_order("ORD-8", 4));
        let decoded = parser
            .parse(&msg, ParseMode::LogMessage, "orders.OrderLog")
            .unwrap();
        let schema = parser.schema("orders.OrderLog").unwrap();

        let first = decoded.to_mapping(&schema).unwrap();
        let second = decoded.to_mapping(&schema).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.get("order_number"), second.get("order_number"));
    }

    #[test]
    fn test_repeated_field_resolves_to_list() {
        let parser = parser();
        let msg = Message::from_value(encode_order("ORD-9", 1));
        let decoded = parser
            .parse(&msg, ParseMode::LogMessage, "orders.OrderLog")
            .unwrap();
        let schema = parser.schema("orders.OrderLog").unwrap();

        let tags = decoded.get_field_by_name("tags", &schema).unwrap();
        match tags {
            FieldValue::List(items) => assert_eq!(items.len(), 2),
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn test_default_scalar_resolves_to_default() {
        // quantity of zero is wire-absent in proto3 but still resolvable
        let parser = parser();
        let msg = Message::from_value(encode_order("ORD-10", 0));
        let decoded = parser
            .parse(&msg, ParseMode::LogMessage, "orders.OrderLog")
            .unwrap();
        let schema = parser.schema("orders.OrderLog").unwrap();
        let quantity = decoded.get_field_by_name("quantity", &schema).unwrap();
        assert!(matches!(
            quantity,
            FieldValue::Scalar(crate::value::ScalarValue::Int(0))
        ));
    }

    #[test]
    fn test_scan_ignores_known_nested_bytes() {
        let bytes = Bytes::from(encode_order("ORD-11", 9));
        let registry = order_registry();
        let desc = registry.descriptor("orders.OrderLog").unwrap();
        assert!(scan_unknown_fields(bytes, &desc).unwrap().is_empty());
    }

    #[test]
    fn test_extract_through_scalar_fails() {
        let parser = parser();
        let msg = Message::from_value(encode_order("ORD-12", 9));
        let decoded = parser
            .parse(&msg, ParseMode::LogMessage, "orders.OrderLog")
            .unwrap();
        let schema = parser.schema("orders.OrderLog").unwrap();
        let err = decoded
            .get_field_by_name("order_number.length", &schema)
            .unwrap_err();
        assert!(matches!(err, SinkError::InvalidFieldPath(_)));
    }

    #[test]
    fn test_timestamp_and_duration_fields() {
        let parser = parser();
        let msg = Message::from_value(encode_order("ORD-13", 9));
        let decoded = parser
            .parse(&msg, ParseMode::LogMessage, "orders.OrderLog")
            .unwrap();
        let schema = parser.schema("orders.OrderLog").unwrap();

        let created_at = decoded.get_field_by_name("created_at", &schema).unwrap();
        assert_eq!(created_at.to_canonical_string(), "2022-12-02T06:29:54Z");

        let processing = decoded
            .get_field_by_name("processing_time", &schema)
            .unwrap();
        assert_eq!(processing.to_canonical_string(), "408s");
    }

    #[test]
    fn test_enum_field_resolves_to_name() {
        let parser = parser();
        let msg = Message::from_value(encode_order("ORD-14", 9));
        let decoded = parser
            .parse(&msg, ParseMode::LogMessage, "orders.OrderLog")
            .unwrap();
        let schema = parser.schema("orders.OrderLog").unwrap();

        let status = decoded.get_field_by_name("status", &schema).unwrap();
        assert_eq!(status.to_canonical_string(), "SHIPPED");
    }

    #[test]
    fn test_map_field_renders_sorted_object() {
        let parser = parser();
        let msg = Message::from_value(encode_order("ORD-15", 9));
        let decoded = parser
            .parse(&msg, ParseMode::LogMessage, "orders.OrderLog")
            .unwrap();
        let schema = parser.schema("orders.OrderLog").unwrap();

        let labels = decoded.get_field_by_name("labels", &schema).unwrap();
        assert_eq!(
            labels.to_canonical_string(),
            r#"{"region":"emea","tier":"gold"}"#
        );
    }

    #[test]
    fn test_bytes_field_double_encoding() {
        use base64::engine::general_purpose::STANDARD as BASE64;
        use base64::Engine as _;

        let parser = parser();
        let msg = Message::from_value(encode_order("ORD-16", 9));
        let decoded = parser
            .parse(&msg, ParseMode::LogMessage, "orders.OrderLog")
            .unwrap();
        let schema = parser.schema("orders.OrderLog").unwrap();

        // fixture payload is the UTF-8 string "receipt"
        let payload = decoded.get_field_by_name("payload", &schema).unwrap();
        assert_eq!(payload.to_canonical_string(), BASE64.encode("receipt"));
    }

    #[test]
    fn test_nested_message_renders_mapping() {
        let parser = parser();
        let msg = Message::from_value(encode_order("ORD-17", 9));
        let decoded = parser
            .parse(&msg, ParseMode::LogMessage, "orders.OrderLog")
            .unwrap();
        let schema = parser.schema("orders.OrderLog").unwrap();

        let customer = decoded.get_field_by_name("customer", &schema).unwrap();
        match customer {
            FieldValue::Message(map) => {
                assert_eq!(
                    map.get("email").and_then(|v| v.as_str()),
                    Some("ord-17@example.com")
                );
            }
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[test]
    fn test_struct_field_renders_json() {
        let parser = parser();
        let msg = Message::from_value(encode_order("ORD-18", 9));
        let decoded = parser
            .parse(&msg, ParseMode::LogMessage, "orders.OrderLog")
            .unwrap();
        let schema = parser.schema("orders.OrderLog").unwrap();

        let context = decoded.get_field_by_name("context", &schema).unwrap();
        let json = context.to_json();
        assert_eq!(json["channel"], serde_json::json!("web"));
        assert_eq!(json["attempt"], serde_json::json!(2.0));
    }

    #[test]
    fn test_to_mapping_skips_absent_fields() {
        let parser = parser();
        // quantity 0 and unset optional fields are skipped, present ones kept
        let msg = Message::from_value(encode_order("ORD-19", 0));
        let decoded = parser
            .parse(&msg, ParseMode::LogMessage, "orders.OrderLog")
            .unwrap();
        let schema = parser.schema("orders.OrderLog").unwrap();

        let mapping = decoded.to_mapping(&schema).unwrap();
        assert!(mapping.contains_key("order_number"));
        assert!(!mapping.contains_key("quantity"));
    }

    #[test]
    fn test_to_mapping_applies_overrides() {
        let registry = Arc::new(order_registry());
        let mut overrides = ColumnOverrides::new();
        overrides.insert("order_number".into(), "order_id".into());
        let parser = ProtoParser::new(registry).with_column_overrides(overrides);

        let msg = Message::from_value(encode_order("ORD-20", 5));
        let decoded = parser
            .parse(&msg, ParseMode::LogMessage, "orders.OrderLog")
            .unwrap();
        let schema = parser.schema("orders.OrderLog").unwrap();

        let mapping = decoded.to_mapping(&schema).unwrap();
        assert_eq!(
            mapping.get("order_id").and_then(|v| v.as_str()),
            Some("ORD-20")
        );
        assert!(!mapping.contains_key("order_number"));
    }

    #[test]
    fn test_repeated_nested_in_mapping() {
        let parser = parser();
        let msg = Message::from_value(encode_order("ORD-21", 9));
        let decoded = parser
            .parse(&msg, ParseMode::LogMessage, "orders.OrderLog")
            .unwrap();
        let schema = parser.schema("orders.OrderLog").unwrap();

        let mapping = decoded.to_mapping(&schema).unwrap();
        let items = mapping.get("items").and_then(|v| v.as_array()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["sku"], serde_json::json!("sku-1"));
    }

    #[test]
    fn test_get_field_rejects_unknown_path() {
        let parser = parser();
        let msg = Message::from_value(encode_order("ORD-22", 9));
        let decoded = parser
            .parse(&msg, ParseMode::LogMessage, "orders.OrderLog")
            .unwrap();
        let schema = parser.schema("orders.OrderLog").unwrap();
        let err = decoded.get_field_by_name("no_such_field", &schema).unwrap_err();
        assert!(matches!(err, SinkError::InvalidFieldPath(_)));
    }

    #[test]
    fn test_key_mode_parses_key_bytes() {
        let parser = parser();
        let key = encode_order("KEY-1", 1);
        let msg = Message::new(Some(Bytes::from(key)), Some(Bytes::from_static(b"junk")));
        let decoded = parser
            .parse(&msg, ParseMode::LogKey, "orders.OrderLog")
            .unwrap();
        let schema = parser.schema("orders.OrderLog").unwrap();
        assert_eq!(
            decoded
                .get_field_by_name("order_number", &schema)
                .unwrap()
                .to_canonical_string(),
            "KEY-1"
        );
    }

    #[test]
    fn test_parse_counts_metrics() {
        use crate::testing::CountingMetrics;

        let metrics = Arc::new(CountingMetrics::default());
        let parser = ProtoParser::new(Arc::new(order_registry()))
            .with_metrics(metrics.clone() as SharedMetrics);

        let ok = Message::from_value(encode_order("ORD-23", 1));
        let bad = Message::from_value(vec![0xffu8]);
        parser
            .parse(&ok, ParseMode::LogMessage, "orders.OrderLog")
            .unwrap();
        let _ = parser.parse(&bad, ParseMode::LogMessage, "orders.OrderLog");

        assert_eq!(metrics.count(names::MESSAGES_PARSED), 1);
        assert_eq!(metrics.count(names::PARSE_FAILURES), 1);
    }

    #[test]
    fn test_amount_double_roundtrip() {
        let parser = parser();
        let msg = Message::from_value(encode_order("ORD-24", 9));
        let decoded = parser
            .parse(&msg, ParseMode::LogMessage, "orders.OrderLog")
            .unwrap();
        let schema = parser.schema("orders.OrderLog").unwrap();
        let amount = decoded.get_field_by_name("amount", &schema).unwrap();
        assert_eq!(amount.to_canonical_string(), "99.95");
    }

    #[test]
    fn test_value_of_known_message_field_survives_scan() {
        // sanity: nested customer bytes are recursed into, not reported
        let parser = parser();
        let msg = Message::from_value(encode_order("ORD-25", 9));
        assert!(parser
            .parse(&msg, ParseMode::LogMessage, "orders.OrderLog")
            .is_ok());
    }

    #[test]
    fn test_resolve_enum_value_directly() {
        let registry = order_registry();
        let desc = registry.descriptor("orders.OrderLog").unwrap();
        let schema = Schema::build(&desc, &ColumnOverrides::new());
        let status = schema.field("status").unwrap();
        let resolved = FieldValue::resolve(&ProtoValue::EnumNumber(2), status).unwrap();
        assert_eq!(resolved.to_canonical_string(), "CANCELLED");
    }
}
