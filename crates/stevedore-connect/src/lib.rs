//! stevedore-connect - Sink connector core
//!
//! This crate is the destination-independent core of a sink-connector
//! pipeline: it takes batches of opaque keyed/valued messages from a log or
//! stream and prepares them for delivery to heterogeneous destinations (a
//! columnar warehouse table, a wide-column store, a key/value cache, an
//! HTTP endpoint), tolerating and reporting partial failure per message.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     stevedore-connect (core)                     │
//! │  Message ─▶ MessageParser ─▶ DecodedMessage ─▶ FieldValue        │
//! │                 │                  │               │             │
//! │          DescriptorRegistry   to_mapping     CompiledTemplate    │
//! │                                    │               │             │
//! │                 RecordPartition ◀──┴───────────────┘             │
//! │                        │                                         │
//! │                  SinkResponse  (index → ErrorInfo)               │
//! ├──────────────────────────────────────────────────────────────────┤
//! │            Destination writers (impl Sink, out of scope)         │
//! │    warehouse · wide-column · key/value cache · HTTP endpoint     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The pieces every destination shares live here: descriptor-driven message
//! decoding and field extraction, compiled template resolution for
//! destination keys/paths/bodies, and the batch partition / partial-failure
//! contract. Concrete destination clients, schema-registry fetching, and
//! retry policies are the embedding application's concern.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use stevedore_connect::prelude::*;
//! use stevedore_connect::testing::{encode_order, order_registry};
//!
//! let parser = ProtoParser::new(Arc::new(order_registry()));
//! let schema = parser.schema("orders.OrderLog").unwrap();
//!
//! // compiled once at writer construction
//! let key = CompiledTemplate::compile("order-%s,order_number").unwrap();
//!
//! let messages = vec![Message::from_value(encode_order("ORD-1", 2))];
//! let partition = RecordPartition::convert(&messages, |_, message| {
//!     let decoded = parser.parse(message, ParseMode::LogMessage, "orders.OrderLog")?;
//!     key.resolve(&decoded, &schema)
//! });
//!
//! assert_eq!(partition.valid()[0].1, "order-ORD-1");
//! let response = partition.into_response(Vec::new());
//! assert!(!response.has_errors());
//! ```
//!
//! Processing is synchronous and single-threaded within one batch call;
//! schemas and compiled templates are immutable and shared across batches.
//! Embedders scale by running batches or partitions in parallel.

// Error types
pub mod error;

// Raw message ingestion
pub mod message;

// Configuration surface
pub mod config;

// Schema model and descriptor registry boundary
pub mod schema;

// Parsing strategies and the decoded message
pub mod parser;

// Field value system
pub mod value;

// Template engine
pub mod template;

// Batch partition / partial-failure contract
pub mod partition;

// Sink interface
pub mod sink;

// Metrics boundary
pub mod metrics;

// Mocks and descriptor fixtures
pub mod testing;

// Re-export core types at crate root for ergonomic use
pub use config::{MetadataFieldType, SinkConnectorConfig, TemplatePatterns};
pub use error::{ErrorInfo, ErrorKind, Result, SinkError};
pub use message::{Mapping, Message};
pub use metrics::{Metrics, NoopMetrics, SharedMetrics};
pub use parser::{DecodedMessage, DecodedPayload, JsonParser, MessageParser, ParseMode, ProtoParser};
pub use partition::{RecordPartition, SinkResponse};
pub use schema::{
    ColumnOverrides, DescriptorRegistry, FieldDescriptor, FieldType, LogicalType, Schema,
    StaticDescriptorRegistry,
};
pub use sink::Sink;
pub use template::{CompiledTemplate, CompiledTemplates};
pub use value::{FieldValue, ScalarValue};

// Re-export commonly used dependencies for writer implementations
pub use serde::{Deserialize, Serialize};
pub use serde_json::Value as JsonValue;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        ColumnOverrides,
        CompiledTemplate,
        CompiledTemplates,
        DecodedMessage,
        // Registry boundary
        DescriptorRegistry,
        // Errors
        ErrorInfo,
        ErrorKind,
        FieldDescriptor,
        FieldType,
        // Field values
        FieldValue,
        JsonParser,
        JsonValue,
        LogicalType,
        Mapping,
        // Configuration
        MetadataFieldType,
        // Metrics
        Metrics,
        // Ingestion
        Message,
        // Parsing
        MessageParser,
        NoopMetrics,
        ParseMode,
        ProtoParser,
        // Partition / response
        RecordPartition,
        Result,
        ScalarValue,
        // Schema model
        Schema,
        // Sink interface
        Sink,
        SinkConnectorConfig,
        SinkError,
        SinkResponse,
        StaticDescriptorRegistry,
        TemplatePatterns,
    };
}
