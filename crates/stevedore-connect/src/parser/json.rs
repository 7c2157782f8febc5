//! Flat JSON parsing

use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::debug;

use crate::error::{Result, SinkError};
use crate::message::{Mapping, Message};
use crate::metrics::{names, noop, SharedMetrics};
use crate::parser::{select_bytes, DecodedMessage, MessageParser, ParseMode};
use crate::schema::Schema;

/// JSON parsing strategy.
///
/// This format intentionally supports only flat objects: a nested object as
/// a field value is rejected rather than flattened. Under the
/// stringify-scalars flag, booleans and numbers are coerced to their string
/// form and nulls are dropped before consumers see the fields.
pub struct JsonParser {
    stringify_scalars: bool,
    metrics: SharedMetrics,
    empty_schema: Arc<Schema>,
}

impl JsonParser {
    /// Create a parser with coercion disabled
    pub fn new() -> Self {
        Self {
            stringify_scalars: false,
            metrics: noop(),
            empty_schema: Arc::new(Schema::empty()),
        }
    }

    /// Coerce scalar values to strings at parse time (builder-style)
    pub fn with_stringify_scalars(mut self, stringify: bool) -> Self {
        self.stringify_scalars = stringify;
        self
    }

    /// Inject a metrics handle (builder-style)
    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    fn try_parse(&self, message: &Message, mode: ParseMode) -> Result<DecodedMessage> {
        let bytes = select_bytes(message, mode)?;
        let value: JsonValue = serde_json::from_slice(bytes)?;
        let JsonValue::Object(fields) = value else {
            return Err(SinkError::Deserialization(
                "expected a flat JSON object".into(),
            ));
        };
        let mut out = Mapping::new();
        for (name, value) in fields {
            if value.is_object() {
                return Err(SinkError::UnsupportedNesting(format!(
                    "field '{name}' holds a nested object"
                )));
            }
            if self.stringify_scalars {
                match value {
                    JsonValue::Null => continue,
                    JsonValue::String(s) => {
                        out.insert(name, JsonValue::String(s));
                    }
                    other => {
                        out.insert(name, JsonValue::String(other.to_string()));
                    }
                }
            } else {
                out.insert(name, value);
            }
        }
        Ok(DecodedMessage::json(out))
    }
}

impl Default for JsonParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageParser for JsonParser {
    fn parse(
        &self,
        message: &Message,
        mode: ParseMode,
        _schema_name: &str,
    ) -> Result<DecodedMessage> {
        match self.try_parse(message, mode) {
            Ok(decoded) => {
                self.metrics.increment(names::MESSAGES_PARSED, 1);
                Ok(decoded)
            }
            Err(err) => {
                debug!(%err, "json message failed to parse");
                self.metrics.increment(names::PARSE_FAILURES, 1);
                Err(err)
            }
        }
    }

    fn schema(&self, _schema_name: &str) -> Result<Arc<Schema>> {
        // flat JSON carries no descriptor; lookups go straight at the object
        Ok(Arc::clone(&self.empty_schema))
    }
}
