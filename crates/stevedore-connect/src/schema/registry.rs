//! Descriptor registry boundary
//!
//! Resolving a type name to a structural descriptor is the job of an
//! external schema registry; this module defines the seam the parser
//! depends on, plus an in-memory implementation backed by a
//! `FileDescriptorSet` for embedders (and tests) that carry descriptors
//! with them. Fetch, refresh, and caching of remote registries live behind
//! this trait, outside the core.

use bytes::Buf;
use prost_reflect::{DescriptorPool, MessageDescriptor};
use prost_types::FileDescriptorSet;

use crate::error::{Result, SinkError};

/// Resolves fully-qualified message type names to descriptors
pub trait DescriptorRegistry: Send + Sync {
    /// Look up the descriptor for `full_name`.
    ///
    /// Fails with a configuration error when the type is unknown, so a bad
    /// schema class surfaces at writer construction rather than per batch.
    fn descriptor(&self, full_name: &str) -> Result<MessageDescriptor>;
}

/// An in-memory registry over a fixed descriptor pool
#[derive(Debug, Clone)]
pub struct StaticDescriptorRegistry {
    pool: DescriptorPool,
}

impl StaticDescriptorRegistry {
    /// Wrap an existing descriptor pool
    pub fn from_pool(pool: DescriptorPool) -> Self {
        Self { pool }
    }

    /// Decode an encoded `FileDescriptorSet`
    pub fn decode<B: Buf>(bytes: B) -> Result<Self> {
        let pool = DescriptorPool::decode(bytes)
            .map_err(|e| SinkError::config(format!("invalid descriptor set: {e}")))?;
        Ok(Self { pool })
    }

    /// Build from a decoded `FileDescriptorSet`
    pub fn from_file_descriptor_set(fds: FileDescriptorSet) -> Result<Self> {
        let pool = DescriptorPool::from_file_descriptor_set(fds)
            .map_err(|e| SinkError::config(format!("invalid descriptor set: {e}")))?;
        Ok(Self { pool })
    }

    /// Access the underlying pool
    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }
}

impl DescriptorRegistry for StaticDescriptorRegistry {
    fn descriptor(&self, full_name: &str) -> Result<MessageDescriptor> {
        self.pool.get_message_by_name(full_name).ok_or_else(|| {
            SinkError::config(format!("message type not found in registry: {full_name}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::order_registry;

    #[test]
    fn test_lookup() {
        let registry = order_registry();
        let desc = registry.descriptor("orders.OrderLog").unwrap();
        assert_eq!(desc.full_name(), "orders.OrderLog");
    }

    #[test]
    fn test_unknown_type_is_config_error() {
        let registry = order_registry();
        let err = registry.descriptor("orders.Missing").unwrap_err();
        assert!(matches!(err, SinkError::Config(_)));
    }
}
