//! Batch partition and partial-failure model
//!
//! Every destination writer follows the same two-phase contract:
//!
//! 1. **Convert** — each input message is turned into a destination-specific
//!    record; any per-message failure is caught at the message boundary and
//!    recorded against that message's index. Nothing escapes this phase.
//! 2. **Reconcile** — after the destination accepts the valid records, its
//!    per-record failures (keyed by the *original* index carried alongside
//!    each record) merge with the phase-1 failures into one
//!    [`SinkResponse`] covering every input index.
//!
//! The shape is identical for a warehouse table, a wide-column store, and
//! an HTTP endpoint; only record construction and destination error
//! classification vary.

use std::collections::BTreeMap;
use tracing::warn;

use crate::error::{ErrorInfo, SinkError};

/// The per-batch split into converted and failed records.
///
/// Invariant: the indices across `valid` and `invalid` are exactly
/// `{0..n-1}` for an input batch of size `n`, each appearing once.
#[derive(Debug)]
pub struct RecordPartition<T> {
    valid: Vec<(usize, T)>,
    invalid: Vec<(usize, ErrorInfo)>,
}

impl<T> RecordPartition<T> {
    /// Run the fallible per-index conversion over a batch.
    ///
    /// Failures are classified into [`ErrorInfo`] and logged; they never
    /// abort the batch.
    pub fn convert<M, F>(items: &[M], mut convert: F) -> Self
    where
        F: FnMut(usize, &M) -> Result<T, SinkError>,
    {
        let mut valid = Vec::with_capacity(items.len());
        let mut invalid = Vec::new();
        for (index, item) in items.iter().enumerate() {
            match convert(index, item) {
                Ok(record) => valid.push((index, record)),
                Err(err) => {
                    warn!(index, %err, "record failed to convert");
                    invalid.push((index, ErrorInfo::from(err)));
                }
            }
        }
        Self { valid, invalid }
    }

    /// Successfully converted records with their original indices
    pub fn valid(&self) -> &[(usize, T)] {
        &self.valid
    }

    /// Failed records with their original indices
    pub fn invalid(&self) -> &[(usize, ErrorInfo)] {
        &self.invalid
    }

    /// Total number of input records
    pub fn len(&self) -> usize {
        self.valid.len() + self.invalid.len()
    }

    /// Whether the batch was empty
    pub fn is_empty(&self) -> bool {
        self.valid.is_empty() && self.invalid.is_empty()
    }

    /// Consume the valid records, keeping the invalid side for reconciliation
    pub fn take_valid(&mut self) -> Vec<(usize, T)> {
        std::mem::take(&mut self.valid)
    }

    /// Merge destination-reported failures with the conversion failures.
    ///
    /// `destination_failures` are keyed by original input index, not by
    /// position in the valid sublist.
    pub fn into_response(
        self,
        destination_failures: impl IntoIterator<Item = (usize, ErrorInfo)>,
    ) -> SinkResponse {
        let mut response = SinkResponse::new();
        for (index, error) in self.invalid {
            response.record(index, error);
        }
        for (index, error) in destination_failures {
            response.record(index, error);
        }
        response
    }
}

/// Per-batch result: original input index → failure.
///
/// Built fresh per batch call; indices absent from the map succeeded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SinkResponse {
    errors: BTreeMap<usize, ErrorInfo>,
}

impl SinkResponse {
    /// An all-success response
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure for an input index
    pub fn record(&mut self, index: usize, error: ErrorInfo) {
        self.errors.insert(index, error);
    }

    /// Whether any record failed
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// The failure recorded for an index, if any
    pub fn errors_for(&self, index: usize) -> Option<&ErrorInfo> {
        self.errors.get(&index)
    }

    /// Failed indices, ascending
    pub fn failed_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.errors.keys().copied()
    }

    /// Iterate failures as (index, error)
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ErrorInfo)> {
        self.errors.iter().map(|(i, e)| (*i, e))
    }

    /// Number of failed records
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}
