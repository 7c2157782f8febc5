//! Template engine
//!
//! A pattern is a comma-separated list whose first token is a format string
//! with `%s`-style placeholders and whose remaining tokens are field paths,
//! one per placeholder, in order:
//!
//! ```text
//! Test-%s,order_number          →  "Test-<order_number>"
//! http://svc/%s/%s,region,id    →  "http://svc/<region>/<id>"
//! constant-key                  →  "constant-key" (no per-message state)
//! ```
//!
//! Patterns compile once at writer construction and resolve against every
//! message in every batch; a malformed pattern fails fast rather than
//! poisoning batches at runtime.

use serde_json::Value as JsonValue;

use crate::config::TemplatePatterns;
use crate::error::{Result, SinkError};
use crate::parser::DecodedMessage;
use crate::schema::Schema;

/// A compiled pattern: literal text split at placeholder sites, plus the
/// field paths substituted at those sites. Immutable and reusable.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledTemplate {
    literal_segments: Vec<String>,
    field_paths: Vec<String>,
}

impl CompiledTemplate {
    /// Compile a pattern string.
    ///
    /// Fails with `InvalidTemplate` when the pattern is empty, a field path
    /// token is blank, or the placeholder count does not match the number of
    /// supplied field paths (the message reports both counts).
    pub fn compile(pattern: &str) -> Result<Self> {
        if pattern.trim().is_empty() {
            return Err(SinkError::InvalidTemplate("template pattern is empty".into()));
        }
        let mut tokens = pattern.split(',');
        let format = tokens.next().unwrap_or_default();
        let field_paths: Vec<String> = tokens.map(|t| t.trim().to_string()).collect();
        if field_paths.iter().any(String::is_empty) {
            return Err(SinkError::InvalidTemplate(format!(
                "blank field path in template '{pattern}'"
            )));
        }

        let literal_segments = split_format(format);
        let placeholders = literal_segments.len() - 1;
        if placeholders != field_paths.len() {
            return Err(SinkError::InvalidTemplate(format!(
                "placeholder count mismatch in '{pattern}': {placeholders} variables, {} values",
                field_paths.len()
            )));
        }

        Ok(Self {
            literal_segments,
            field_paths,
        })
    }

    /// Whether this pattern contains no placeholders.
    ///
    /// Callers that cannot vary per message (a batch-mode destination with
    /// one fixed endpoint) check this at construction and reject
    /// per-message templating early.
    pub fn is_constant(&self) -> bool {
        self.field_paths.is_empty()
    }

    /// The field paths this template reads
    pub fn field_paths(&self) -> &[String] {
        &self.field_paths
    }

    /// Resolve to a string: each field's canonical form substituted at its
    /// placeholder, interleaved with the literal segments.
    pub fn resolve(&self, message: &DecodedMessage, schema: &Schema) -> Result<String> {
        let mut out = String::new();
        for (i, path) in self.field_paths.iter().enumerate() {
            out.push_str(self.literal_segments.get(i).map(String::as_str).unwrap_or(""));
            let value = message.get_field_by_name(path, schema)?;
            out.push_str(&value.to_canonical_string());
        }
        out.push_str(
            self.literal_segments
                .last()
                .map(String::as_str)
                .unwrap_or(""),
        );
        Ok(out)
    }

    /// Resolve preserving the field's native type.
    ///
    /// A single bare placeholder returns the field's JSON value (a numeric
    /// field stays numeric in a structured body); anything else resolves to
    /// a string exactly like [`resolve`](Self::resolve).
    pub fn resolve_typed(&self, message: &DecodedMessage, schema: &Schema) -> Result<JsonValue> {
        let bare = self.field_paths.len() == 1
            && self.literal_segments.iter().all(String::is_empty);
        if bare {
            let value = message.get_field_by_name(&self.field_paths[0], schema)?;
            Ok(value.to_json())
        } else {
            Ok(JsonValue::String(self.resolve(message, schema)?))
        }
    }
}

/// Split a format string at its `%`-escape sites.
///
/// Always returns one more segment than there are placeholders; a trailing
/// lone `%` is literal.
fn split_format(format: &str) -> Vec<String> {
    let mut segments = vec![String::new()];
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '%' && chars.peek().is_some() {
            chars.next();
            segments.push(String::new());
        } else if let Some(last) = segments.last_mut() {
            last.push(c);
        }
    }
    segments
}

/// The compiled template set a destination writer holds, one slot per
/// destination need. All patterns compile at construction; a bad one aborts
/// startup instead of failing every batch.
#[derive(Debug, Clone, Default)]
pub struct CompiledTemplates {
    /// Row key for wide-column destinations
    pub row_key: Option<CompiledTemplate>,
    /// Per-message URL for HTTP destinations
    pub url: Option<CompiledTemplate>,
    /// Header name → value pattern
    pub headers: Vec<(String, CompiledTemplate)>,
    /// Query parameter name → value pattern
    pub query_params: Vec<(String, CompiledTemplate)>,
    /// Request body pattern
    pub body: Option<CompiledTemplate>,
}

impl CompiledTemplates {
    /// Compile every configured pattern, failing fast on the first bad one
    pub fn compile(patterns: &TemplatePatterns) -> Result<Self> {
        let compile_opt = |p: &Option<String>| -> Result<Option<CompiledTemplate>> {
            p.as_deref().map(CompiledTemplate::compile).transpose()
        };
        Ok(Self {
            row_key: compile_opt(&patterns.row_key)?,
            url: compile_opt(&patterns.url)?,
            headers: patterns
                .headers
                .iter()
                .map(|(name, p)| Ok((name.clone(), CompiledTemplate::compile(p)?)))
                .collect::<Result<Vec<_>>>()?,
            query_params: patterns
                .query_params
                .iter()
                .map(|(name, p)| Ok((name.clone(), CompiledTemplate::compile(p)?)))
                .collect::<Result<Vec<_>>>()?,
            body: compile_opt(&patterns.body)?,
        })
    }
}
