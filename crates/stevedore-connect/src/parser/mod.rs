//! Message parsing strategies
//!
//! Turns raw message bytes into a [`DecodedMessage`] that field lookups and
//! mappings can be issued against. Two interchangeable strategies are
//! selected by configuration: descriptor-driven protobuf decoding
//! ([`ProtoParser`]) and flat JSON objects ([`JsonParser`]).

mod decoded;
mod json;
mod proto;

pub use decoded::{DecodedMessage, DecodedPayload};
pub use json::JsonParser;
pub use proto::ProtoParser;

use bytes::Bytes;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, SinkError};
use crate::message::Message;
use crate::schema::Schema;

/// Which side of the message a parser decodes
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ParseMode {
    /// Decode the record key
    LogKey,
    /// Decode the record value
    #[default]
    LogMessage,
}

impl ParseMode {
    /// String form used in configs and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LogKey => "log_key",
            Self::LogMessage => "log_message",
        }
    }
}

impl fmt::Display for ParseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Strategy interface for turning raw bytes into decoded messages
pub trait MessageParser: Send + Sync {
    /// Decode the selected side of `message` against the named schema class.
    ///
    /// Fails with `EmptyMessage` when the selected side carries no bytes and
    /// with a deserialization error when the payload is malformed.
    fn parse(
        &self,
        message: &Message,
        mode: ParseMode,
        schema_name: &str,
    ) -> Result<DecodedMessage>;

    /// The schema for a named schema class, built once and cached
    fn schema(&self, schema_name: &str) -> Result<Arc<Schema>>;
}

/// Pick the mode's side of the message, rejecting null/empty payloads
pub(crate) fn select_bytes(message: &Message, mode: ParseMode) -> Result<&Bytes> {
    let side = match mode {
        ParseMode::LogKey => &message.key,
        ParseMode::LogMessage => &message.value,
    };
    match side {
        Some(bytes) if !bytes.is_empty() => Ok(bytes),
        _ => Err(SinkError::EmptyMessage(format!(
            "no {mode} bytes to decode"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_bytes_by_mode() {
        let msg = Message::new(Some(Bytes::from_static(b"k")), Some(Bytes::from_static(b"v")));
        assert_eq!(
            select_bytes(&msg, ParseMode::LogKey).unwrap().as_ref(),
            b"k"
        );
        assert_eq!(
            select_bytes(&msg, ParseMode::LogMessage).unwrap().as_ref(),
            b"v"
        );
    }

    #[test]
    fn test_select_bytes_empty() {
        let msg = Message::new(None, Some(Bytes::new()));
        let err = select_bytes(&msg, ParseMode::LogMessage).unwrap_err();
        assert!(matches!(err, SinkError::EmptyMessage(_)));

        let err = select_bytes(&msg, ParseMode::LogKey).unwrap_err();
        assert!(err.to_string().contains("log_key"));
    }

    #[test]
    fn test_mode_serde_names() {
        assert_eq!(
            serde_json::to_string(&ParseMode::LogKey).unwrap(),
            "\"log_key\""
        );
        let mode: ParseMode = serde_json::from_str("\"log_message\"").unwrap();
        assert_eq!(mode, ParseMode::LogMessage);
    }
}
