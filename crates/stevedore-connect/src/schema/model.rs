//! Immutable schema tree built from protobuf descriptors

use prost_reflect::{Kind, MessageDescriptor};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Result, SinkError};

/// Column-name overrides, keyed by dotted field path from the schema root.
///
/// Destinations that name columns differently from the proto field names
/// supply these alongside the schema class.
pub type ColumnOverrides = BTreeMap<String, String>;

/// Structural type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// UTF-8 string
    String,
    /// 32-bit integer (signed or unsigned wire forms)
    Int,
    /// 64-bit integer (signed or unsigned wire forms)
    Long,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
    /// Boolean
    Boolean,
    /// Raw bytes
    Bytes,
    /// Enumeration
    Enum,
    /// Nested message
    Message,
}

/// Semantic refinement of a MESSAGE-typed field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalType {
    /// `google.protobuf.Timestamp`
    Timestamp,
    /// `google.protobuf.Duration`
    Duration,
    /// Free-form dynamic value (`google.protobuf.Struct` family)
    Struct,
    /// Protobuf map field
    Map,
}

/// One named field of a [`Schema`]
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Declared field name
    pub name: String,
    /// JSON name from the descriptor
    pub json_name: String,
    /// Structural type
    pub field_type: FieldType,
    /// Whether the field is repeated
    pub repeated: bool,
    /// Nested schema for MESSAGE fields (the map *entry* schema for maps);
    /// `None` for logical types resolved without one and for recursive
    /// types, which are rendered dynamically
    pub nested: Option<Arc<Schema>>,
    /// Logical-type refinement, if any
    pub logical_type: Option<LogicalType>,
    /// Column-name override supplied by the mapping configuration
    pub column_name: Option<String>,
    /// Declared enum members by number, for ENUM fields
    pub enum_values: Option<BTreeMap<i32, String>>,
}

impl FieldDescriptor {
    /// Name this field is emitted under in mappings: the configured column
    /// override, falling back to the declared field name
    pub fn output_name(&self) -> &str {
        self.column_name.as_deref().unwrap_or(&self.name)
    }
}

/// The shape of one message type: its full name and fields, in declaration
/// order. Immutable once built; safe to share across batches.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    /// Fully-qualified message type name
    pub full_name: String,
    /// Fields in declaration order
    pub fields: Vec<FieldDescriptor>,
}

impl Schema {
    /// Build a schema tree from a message descriptor.
    ///
    /// Pure and deterministic. Nested MESSAGE fields expand recursively;
    /// recursion through a self-referential type stops at the repeated
    /// ancestor, whose field falls back to dynamic rendering.
    pub fn build(desc: &MessageDescriptor, overrides: &ColumnOverrides) -> Schema {
        let mut ancestors = Vec::new();
        build_message(desc, overrides, "", &mut ancestors)
    }

    /// The empty schema, used where no descriptor applies (flat JSON mode)
    pub fn empty() -> Schema {
        Schema {
            full_name: String::new(),
            fields: Vec::new(),
        }
    }

    /// Look up a direct field by declared name
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Resolve a dotted path (`a.b.c`) left-to-right through nested
    /// MESSAGE-typed fields.
    ///
    /// A repeated field is only legal as the final segment; any absent
    /// segment, or traversal through a non-message field, fails with
    /// `InvalidFieldPath`.
    pub fn field_by_path(&self, path: &str) -> Result<&FieldDescriptor> {
        if path.is_empty() {
            return Err(SinkError::InvalidFieldPath("empty field path".into()));
        }
        let mut schema = self;
        let mut segments = path.split('.').peekable();
        loop {
            let segment = match segments.next() {
                Some(s) => s,
                None => {
                    return Err(SinkError::InvalidFieldPath(format!(
                        "malformed field path '{path}'"
                    )))
                }
            };
            let field = schema.field(segment).ok_or_else(|| {
                SinkError::InvalidFieldPath(format!(
                    "field '{segment}' not found in '{}' (path '{path}')",
                    schema.full_name
                ))
            })?;
            if segments.peek().is_none() {
                return Ok(field);
            }
            if field.repeated {
                return Err(SinkError::InvalidFieldPath(format!(
                    "repeated field '{segment}' must be the last segment of path '{path}'"
                )));
            }
            match (&field.field_type, field.logical_type, &field.nested) {
                (FieldType::Message, None, Some(nested)) => schema = nested,
                _ => {
                    return Err(SinkError::InvalidFieldPath(format!(
                        "field '{segment}' in path '{path}' is not a nested message"
                    )))
                }
            }
        }
    }
}

fn build_message(
    desc: &MessageDescriptor,
    overrides: &ColumnOverrides,
    prefix: &str,
    ancestors: &mut Vec<String>,
) -> Schema {
    ancestors.push(desc.full_name().to_string());
    let fields = desc
        .fields()
        .map(|f| build_field(&f, overrides, prefix, ancestors))
        .collect();
    ancestors.pop();
    Schema {
        full_name: desc.full_name().to_string(),
        fields,
    }
}

fn build_field(
    fd: &prost_reflect::FieldDescriptor,
    overrides: &ColumnOverrides,
    prefix: &str,
    ancestors: &mut Vec<String>,
) -> FieldDescriptor {
    let path = if prefix.is_empty() {
        fd.name().to_string()
    } else {
        format!("{prefix}.{}", fd.name())
    };
    let column_name = overrides.get(&path).cloned();

    let mut field = FieldDescriptor {
        name: fd.name().to_string(),
        json_name: fd.json_name().to_string(),
        field_type: FieldType::Message,
        repeated: fd.is_list(),
        nested: None,
        logical_type: None,
        column_name,
        enum_values: None,
    };

    match fd.kind() {
        Kind::Double => field.field_type = FieldType::Double,
        Kind::Float => field.field_type = FieldType::Float,
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 | Kind::Uint32 | Kind::Fixed32 => {
            field.field_type = FieldType::Int
        }
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 | Kind::Uint64 | Kind::Fixed64 => {
            field.field_type = FieldType::Long
        }
        Kind::Bool => field.field_type = FieldType::Boolean,
        Kind::String => field.field_type = FieldType::String,
        Kind::Bytes => field.field_type = FieldType::Bytes,
        Kind::Enum(enum_desc) => {
            field.field_type = FieldType::Enum;
            field.enum_values = Some(
                enum_desc
                    .values()
                    .map(|v| (v.number(), v.name().to_string()))
                    .collect(),
            );
        }
        Kind::Message(msg_desc) => {
            field.field_type = FieldType::Message;
            if fd.is_map() {
                field.logical_type = Some(LogicalType::Map);
                field.nested = Some(Arc::new(build_message(
                    &msg_desc, overrides, &path, ancestors,
                )));
            } else {
                match msg_desc.full_name() {
                    "google.protobuf.Timestamp" => {
                        field.logical_type = Some(LogicalType::Timestamp)
                    }
                    "google.protobuf.Duration" => field.logical_type = Some(LogicalType::Duration),
                    "google.protobuf.Struct"
                    | "google.protobuf.Value"
                    | "google.protobuf.ListValue" => {
                        field.logical_type = Some(LogicalType::Struct)
                    }
                    full_name if ancestors.iter().any(|a| a == full_name) => {
                        // recursive type: leave nested unset, rendered dynamically
                    }
                    _ => {
                        field.nested = Some(Arc::new(build_message(
                            &msg_desc, overrides, &path, ancestors,
                        )));
                    }
                }
            }
        }
    }

    field
}
