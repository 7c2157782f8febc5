//! Schema model for stevedore-connect
//!
//! Describes the shape of a decoded message as an explicit, immutable tree:
//! named fields, each with a structural type tag, an optional logical-type
//! refinement, and (for composite fields) a nested schema. Built once per
//! message type from a protobuf descriptor and reused across batches.
//!
//! The descriptor itself comes from an external schema registry; this module
//! only defines the boundary ([`DescriptorRegistry`]) and an in-memory
//! implementation backed by a `FileDescriptorSet`.

mod model;
mod registry;

pub use model::{ColumnOverrides, FieldDescriptor, FieldType, LogicalType, Schema};
pub use registry::{DescriptorRegistry, StaticDescriptorRegistry};
