//! Testing utilities
//!
//! Mock implementations and descriptor fixtures for exercising the
//! conversion pipeline without external dependencies: an in-memory
//! descriptor pool covering every field shape the resolver dispatches on, a
//! recording sink with scriptable per-index failures, and a counting
//! metrics sink.

use bytes::Bytes;
use parking_lot::Mutex;
use prost_reflect::prost::Message as _;
use prost_reflect::{DescriptorPool, DynamicMessage, MapKey, Value as ProtoValue};
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, FileDescriptorSet, MessageOptions, OneofDescriptorProto,
};
use std::collections::{BTreeMap, HashMap};

use crate::error::{ErrorInfo, Result};
use crate::message::Message;
use crate::metrics::Metrics;
use crate::partition::SinkResponse;
use crate::schema::StaticDescriptorRegistry;
use crate::sink::Sink;

// ============================================================================
// Descriptor fixtures
// ============================================================================

fn scalar(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        ..Default::default()
    }
}

fn repeated_scalar(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        label: Some(Label::Repeated as i32),
        ..scalar(name, number, ty)
    }
}

fn message_field(name: &str, number: i32, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(Type::Message as i32),
        type_name: Some(type_name.to_string()),
        ..Default::default()
    }
}

fn repeated_message(name: &str, number: i32, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        label: Some(Label::Repeated as i32),
        ..message_field(name, number, type_name)
    }
}

fn enum_field(name: &str, number: i32, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(Type::Enum as i32),
        type_name: Some(type_name.to_string()),
        ..Default::default()
    }
}

fn map_entry(name: &str, value: FieldDescriptorProto) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        field: vec![scalar("key", 1, Type::String), value],
        options: Some(MessageOptions {
            map_entry: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn in_oneof(mut field: FieldDescriptorProto) -> FieldDescriptorProto {
    field.oneof_index = Some(0);
    field
}

/// A minimal stand-in for the well-known types the resolver special-cases
fn wkt_file() -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some("google/protobuf/wkt.proto".to_string()),
        package: Some("google.protobuf".to_string()),
        syntax: Some("proto3".to_string()),
        message_type: vec![
            DescriptorProto {
                name: Some("Timestamp".to_string()),
                field: vec![
                    scalar("seconds", 1, Type::Int64),
                    scalar("nanos", 2, Type::Int32),
                ],
                ..Default::default()
            },
            DescriptorProto {
                name: Some("Duration".to_string()),
                field: vec![
                    scalar("seconds", 1, Type::Int64),
                    scalar("nanos", 2, Type::Int32),
                ],
                ..Default::default()
            },
            DescriptorProto {
                name: Some("Struct".to_string()),
                field: vec![repeated_message(
                    "fields",
                    1,
                    ".google.protobuf.Struct.FieldsEntry",
                )],
                nested_type: vec![map_entry(
                    "FieldsEntry",
                    message_field("value", 2, ".google.protobuf.Value"),
                )],
                ..Default::default()
            },
            DescriptorProto {
                name: Some("Value".to_string()),
                field: vec![
                    in_oneof(enum_field("null_value", 1, ".google.protobuf.NullValue")),
                    in_oneof(scalar("number_value", 2, Type::Double)),
                    in_oneof(scalar("string_value", 3, Type::String)),
                    in_oneof(scalar("bool_value", 4, Type::Bool)),
                    in_oneof(message_field("struct_value", 5, ".google.protobuf.Struct")),
                    in_oneof(message_field("list_value", 6, ".google.protobuf.ListValue")),
                ],
                oneof_decl: vec![OneofDescriptorProto {
                    name: Some("kind".to_string()),
                    ..Default::default()
                }],
                ..Default::default()
            },
            DescriptorProto {
                name: Some("ListValue".to_string()),
                field: vec![repeated_message("values", 1, ".google.protobuf.Value")],
                ..Default::default()
            },
        ],
        enum_type: vec![EnumDescriptorProto {
            name: Some("NullValue".to_string()),
            value: vec![EnumValueDescriptorProto {
                name: Some("NULL_VALUE".to_string()),
                number: Some(0),
                ..Default::default()
            }],
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn orders_file(with_extra: bool) -> FileDescriptorProto {
    let mut order_log = DescriptorProto {
        name: Some("OrderLog".to_string()),
        field: vec![
            scalar("order_number", 1, Type::String),
            scalar("order_details", 2, Type::String),
            scalar("quantity", 3, Type::Int64),
            scalar("amount", 4, Type::Double),
            scalar("active", 5, Type::Bool),
            scalar("payload", 6, Type::Bytes),
            enum_field("status", 7, ".orders.Status"),
            message_field("created_at", 8, ".google.protobuf.Timestamp"),
            message_field("processing_time", 9, ".google.protobuf.Duration"),
            message_field("customer", 10, ".orders.Customer"),
            repeated_scalar("tags", 11, Type::String),
            repeated_message("items", 12, ".orders.Item"),
            repeated_message("labels", 13, ".orders.OrderLog.LabelsEntry"),
            message_field("context", 14, ".google.protobuf.Struct"),
        ],
        nested_type: vec![map_entry(
            "LabelsEntry",
            scalar("value", 2, Type::String),
        )],
        ..Default::default()
    };
    if with_extra {
        order_log.field.push(scalar("extra", 99, Type::String));
    }

    FileDescriptorProto {
        name: Some("orders.proto".to_string()),
        package: Some("orders".to_string()),
        syntax: Some("proto3".to_string()),
        dependency: vec!["google/protobuf/wkt.proto".to_string()],
        message_type: vec![
            order_log,
            DescriptorProto {
                name: Some("Customer".to_string()),
                field: vec![
                    scalar("name", 1, Type::String),
                    scalar("email", 2, Type::String),
                ],
                ..Default::default()
            },
            DescriptorProto {
                name: Some("Item".to_string()),
                field: vec![
                    scalar("sku", 1, Type::String),
                    scalar("count", 2, Type::Int64),
                ],
                ..Default::default()
            },
        ],
        enum_type: vec![EnumDescriptorProto {
            name: Some("Status".to_string()),
            value: vec![
                EnumValueDescriptorProto {
                    name: Some("PENDING".to_string()),
                    number: Some(0),
                    ..Default::default()
                },
                EnumValueDescriptorProto {
                    name: Some("SHIPPED".to_string()),
                    number: Some(1),
                    ..Default::default()
                },
                EnumValueDescriptorProto {
                    name: Some("CANCELLED".to_string()),
                    number: Some(2),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn build_pool(with_extra: bool) -> DescriptorPool {
    let fds = FileDescriptorSet {
        file: vec![wkt_file(), orders_file(with_extra)],
    };
    DescriptorPool::from_file_descriptor_set(fds).expect("test descriptors are valid")
}

/// Registry over the `orders.OrderLog` fixture schema
pub fn order_registry() -> StaticDescriptorRegistry {
    StaticDescriptorRegistry::from_pool(build_pool(false))
}

/// Same fixture schema with an additional field 99, for unknown-field tests
pub fn wide_order_registry() -> StaticDescriptorRegistry {
    StaticDescriptorRegistry::from_pool(build_pool(true))
}

/// Encode a fully populated `orders.OrderLog` fixture message
pub fn encode_order(order_number: &str, quantity: i64) -> Vec<u8> {
    let pool = build_pool(false);
    let get = |name: &str| {
        pool.get_message_by_name(name)
            .expect("fixture descriptor present")
    };
    let mut msg = DynamicMessage::new(get("orders.OrderLog"));
    msg.set_field_by_name(
        "order_number",
        ProtoValue::String(order_number.to_string()),
    );
    msg.set_field_by_name(
        "order_details",
        ProtoValue::String(format!("details for {order_number}")),
    );
    msg.set_field_by_name("quantity", ProtoValue::I64(quantity));
    msg.set_field_by_name("amount", ProtoValue::F64(99.95));
    msg.set_field_by_name("active", ProtoValue::Bool(true));
    msg.set_field_by_name("payload", ProtoValue::Bytes(Bytes::from_static(b"receipt")));
    msg.set_field_by_name("status", ProtoValue::EnumNumber(1));

    let mut created_at = DynamicMessage::new(get("google.protobuf.Timestamp"));
    created_at.set_field_by_name("seconds", ProtoValue::I64(1_669_962_594));
    msg.set_field_by_name("created_at", ProtoValue::Message(created_at));

    let mut processing_time = DynamicMessage::new(get("google.protobuf.Duration"));
    processing_time.set_field_by_name("seconds", ProtoValue::I64(408));
    msg.set_field_by_name("processing_time", ProtoValue::Message(processing_time));

    let mut customer = DynamicMessage::new(get("orders.Customer"));
    customer.set_field_by_name(
        "name",
        ProtoValue::String(format!("Customer {order_number}")),
    );
    customer.set_field_by_name(
        "email",
        ProtoValue::String(format!("{}@example.com", order_number.to_lowercase())),
    );
    msg.set_field_by_name("customer", ProtoValue::Message(customer));

    msg.set_field_by_name(
        "tags",
        ProtoValue::List(vec![
            ProtoValue::String("priority".to_string()),
            ProtoValue::String("gift".to_string()),
        ]),
    );

    let item_desc = get("orders.Item");
    let items = [("sku-1", 1i64), ("sku-2", 2i64)]
        .into_iter()
        .map(|(sku, count)| {
            let mut item = DynamicMessage::new(item_desc.clone());
            item.set_field_by_name("sku", ProtoValue::String(sku.to_string()));
            item.set_field_by_name("count", ProtoValue::I64(count));
            ProtoValue::Message(item)
        })
        .collect();
    msg.set_field_by_name("items", ProtoValue::List(items));

    let mut labels = HashMap::new();
    labels.insert(
        MapKey::String("tier".to_string()),
        ProtoValue::String("gold".to_string()),
    );
    labels.insert(
        MapKey::String("region".to_string()),
        ProtoValue::String("emea".to_string()),
    );
    msg.set_field_by_name("labels", ProtoValue::Map(labels));

    let value_desc = get("google.protobuf.Value");
    let mut channel = DynamicMessage::new(value_desc.clone());
    channel.set_field_by_name("string_value", ProtoValue::String("web".to_string()));
    let mut attempt = DynamicMessage::new(value_desc);
    attempt.set_field_by_name("number_value", ProtoValue::F64(2.0));
    let mut struct_fields = HashMap::new();
    struct_fields.insert(
        MapKey::String("channel".to_string()),
        ProtoValue::Message(channel),
    );
    struct_fields.insert(
        MapKey::String("attempt".to_string()),
        ProtoValue::Message(attempt),
    );
    let mut context = DynamicMessage::new(get("google.protobuf.Struct"));
    context.set_field_by_name("fields", ProtoValue::Map(struct_fields));
    msg.set_field_by_name("context", ProtoValue::Message(context));

    msg.encode_to_vec()
}

/// Encode an order carrying field 99, which the narrow descriptor does not
/// declare
pub fn wide_order_message(order_number: &str) -> Vec<u8> {
    let pool = build_pool(true);
    let desc = pool
        .get_message_by_name("orders.OrderLog")
        .expect("fixture descriptor present");
    let mut msg = DynamicMessage::new(desc);
    msg.set_field_by_name(
        "order_number",
        ProtoValue::String(order_number.to_string()),
    );
    msg.set_field_by_name("extra", ProtoValue::String("shadow".to_string()));
    msg.encode_to_vec()
}

// ============================================================================
// Mock sink
// ============================================================================

/// A sink that records every pushed batch and reports scripted per-index
/// failures, for exercising the reconciliation contract.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pushed: Vec<Vec<Message>>,
    failures: BTreeMap<usize, ErrorInfo>,
    closed: bool,
}

impl RecordingSink {
    /// Create a sink that accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the record at `index` of every pushed batch (builder-style)
    pub fn with_failure(mut self, index: usize, error: ErrorInfo) -> Self {
        self.failures.insert(index, error);
        self
    }

    /// Batches pushed so far
    pub fn pushed(&self) -> &[Vec<Message>] {
        &self.pushed
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Sink for RecordingSink {
    fn push_to_sink(&mut self, messages: &[Message]) -> Result<SinkResponse> {
        self.pushed.push(messages.to_vec());
        let mut response = SinkResponse::new();
        for (index, error) in &self.failures {
            if *index < messages.len() {
                response.record(*index, error.clone());
            }
        }
        Ok(response)
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

// ============================================================================
// Counting metrics
// ============================================================================

/// A metrics sink that counts increments, for asserting instrumentation
#[derive(Debug, Default)]
pub struct CountingMetrics {
    counts: Mutex<HashMap<String, u64>>,
}

impl CountingMetrics {
    /// Current value of a counter
    pub fn count(&self, name: &str) -> u64 {
        self.counts.lock().get(name).copied().unwrap_or(0)
    }
}

impl Metrics for CountingMetrics {
    fn increment(&self, name: &str, value: u64) {
        *self.counts.lock().entry(name.to_string()).or_insert(0) += value;
    }

    fn gauge(&self, _name: &str, _value: i64) {}
}
