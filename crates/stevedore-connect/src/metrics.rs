//! Metrics boundary
//!
//! The core does not emit metrics itself; parsers and converters accept a
//! [`Metrics`] handle by injection and count the few events worth
//! observing. Embedders bridge the trait to their metrics backend;
//! [`NoopMetrics`] is the default.

use std::sync::Arc;

/// Well-known metric names emitted by this crate
pub mod names {
    /// Messages successfully parsed
    pub const MESSAGES_PARSED: &str = "sink_messages_parsed_total";
    /// Messages that failed parsing or validation
    pub const PARSE_FAILURES: &str = "sink_parse_failures_total";
    /// Records that converted successfully in phase 1
    pub const RECORDS_CONVERTED: &str = "sink_records_converted_total";
    /// Records that failed conversion in phase 1
    pub const RECORDS_FAILED: &str = "sink_records_failed_total";
}

/// Trait for counting connector events
pub trait Metrics: Send + Sync {
    /// Increment a counter by the given value
    fn increment(&self, name: &str, value: u64);

    /// Set a gauge value
    fn gauge(&self, name: &str, value: i64);
}

/// A metrics sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn increment(&self, _name: &str, _value: u64) {}

    fn gauge(&self, _name: &str, _value: i64) {}
}

/// Shared handle to a metrics sink
pub type SharedMetrics = Arc<dyn Metrics>;

/// The default no-op handle
pub fn noop() -> SharedMetrics {
    Arc::new(NoopMetrics)
}
