//! Configuration surface consumed by the core
//!
//! This is the abstract configuration a destination writer is constructed
//! from, not a CLI: the embedding application deserializes it from wherever
//! its config lives. Validation runs at writer construction so a bad
//! pattern or missing schema class fails startup, not the first batch.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

use crate::error::{Result, SinkError};
use crate::parser::ParseMode;
use crate::schema::ColumnOverrides;

/// Column type a metadata entry is coerced to when folded into a mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MetadataFieldType {
    /// Stringify the value
    String,
    /// Signed 64-bit integer
    Integer,
    /// Epoch-millis coerced to an RFC3339 timestamp
    Timestamp,
}

/// Template patterns per destination need.
///
/// Each entry is a pattern in the engine's grammar (see
/// [`CompiledTemplate`](crate::template::CompiledTemplate)); all of them
/// compile at writer construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct TemplatePatterns {
    /// Row key for wide-column destinations
    #[serde(default)]
    pub row_key: Option<String>,

    /// Per-message URL for HTTP destinations
    #[serde(default)]
    pub url: Option<String>,

    /// Header name → value pattern
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Query parameter name → value pattern
    #[serde(default)]
    pub query_params: BTreeMap<String, String>,

    /// Request body pattern
    #[serde(default)]
    pub body: Option<String>,
}

/// Configuration for one sink connector
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, JsonSchema)]
pub struct SinkConnectorConfig {
    /// Which side of the message is decoded (default: the value)
    #[serde(default)]
    pub mode: ParseMode,

    /// Schema class decoded for the record key
    #[serde(default)]
    #[validate(length(min = 1))]
    pub key_schema_class: Option<String>,

    /// Schema class decoded for the record value
    #[serde(default)]
    #[validate(length(min = 1))]
    pub value_schema_class: Option<String>,

    /// Tolerate undecoded wire data instead of failing the message
    #[serde(default)]
    pub allow_unknown_fields: bool,

    /// Stringify JSON scalar values at parse time (JSON mode only)
    #[serde(default)]
    pub stringify_json_scalars: bool,

    /// Template patterns per destination need
    #[serde(default)]
    pub templates: TemplatePatterns,

    /// Metadata column name → coercion type
    #[serde(default)]
    pub metadata_columns: BTreeMap<String, MetadataFieldType>,

    /// Field path → column name overrides applied when schemas are built
    #[serde(default)]
    pub column_overrides: ColumnOverrides,
}

impl SinkConnectorConfig {
    /// The schema class for the configured mode.
    ///
    /// Fails with a configuration error when the mode's side has no schema
    /// class, so the gap surfaces at writer construction.
    pub fn schema_class(&self) -> Result<&str> {
        let (side, class) = match self.mode {
            ParseMode::LogKey => ("key", &self.key_schema_class),
            ParseMode::LogMessage => ("value", &self.value_schema_class),
        };
        class.as_deref().ok_or_else(|| {
            SinkError::config(format!(
                "no {side} schema class configured for mode {}",
                self.mode
            ))
        })
    }
}
