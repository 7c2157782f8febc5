//! Sink interface
//!
//! Destination writers implement [`Sink`]; this core supplies everything
//! upstream of the destination call (parsing, field extraction, templating,
//! and the partition/reconcile contract) while the concrete network clients
//! stay outside.
//!
//! A typical writer composes the pieces like this:
//!
//! ```rust,ignore
//! use stevedore_connect::prelude::*;
//!
//! struct RowKeySink {
//!     parser: ProtoParser,
//!     schema: Arc<Schema>,
//!     templates: CompiledTemplates,
//!     client: WideColumnClient, // out of scope
//! }
//!
//! impl RowKeySink {
//!     fn new(config: &SinkConnectorConfig, registry: Arc<dyn DescriptorRegistry>) -> Result<Self> {
//!         let parser = ProtoParser::new(registry)
//!             .with_unknown_fields_allowed(config.allow_unknown_fields);
//!         let schema = parser.schema(config.schema_class()?)?;
//!         // a bad pattern fails here, before any message is processed
//!         let templates = CompiledTemplates::compile(&config.templates)?;
//!         Ok(Self { parser, schema, templates, client: WideColumnClient::connect()? })
//!     }
//! }
//!
//! impl Sink for RowKeySink {
//!     fn push_to_sink(&mut self, messages: &[Message]) -> Result<SinkResponse> {
//!         let mode = ParseMode::LogMessage;
//!         let row_key = self.templates.row_key.as_ref().expect("validated at construction");
//!         let partition = RecordPartition::convert(messages, |_, message| {
//!             let decoded = self.parser.parse(message, mode, &self.schema.full_name)?;
//!             let key = row_key.resolve(&decoded, &self.schema)?;
//!             let columns = decoded.to_mapping(&self.schema)?;
//!             Ok((key, columns))
//!         });
//!         let failures = self.client.write(partition.valid())?;
//!         Ok(partition.into_response(failures))
//!     }
//!
//!     fn close(&mut self) -> Result<()> {
//!         self.client.shutdown()
//!     }
//! }
//! ```

use crate::error::Result;
use crate::message::Message;
use crate::partition::SinkResponse;

/// A destination writer for batches of messages.
///
/// `push_to_sink` is synchronous and single-threaded per call; embedders
/// scale by running batches or partitions in parallel, each with its own
/// writer. A call always returns a [`SinkResponse`] covering every input
/// index — per-message failures never abort the batch.
pub trait Sink {
    /// Deliver one batch, reporting per-index failures
    fn push_to_sink(&mut self, messages: &[Message]) -> Result<SinkResponse>;

    /// Release destination resources
    fn close(&mut self) -> Result<()>;
}
