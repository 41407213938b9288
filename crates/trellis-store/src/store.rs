//! The persistence interface consumed by the referral engine.

use crate::error::Result;
use crate::model::{FieldUpdate, ProviderId, ProviderNode};

/// Provider record store.
///
/// Calls are blocking. Timeouts and retries are the implementation's concern.
pub trait ProviderStore: Send + Sync {
    /// Load a record by id. `Ok(None)` when absent.
    fn get(&self, id: &ProviderId) -> Result<Option<ProviderNode>>;

    /// Load the record currently holding `code`. `Ok(None)` when no record holds it.
    fn get_by_code(&self, code: &str) -> Result<Option<ProviderNode>>;

    /// Batch load. Missing ids are omitted; result order is unspecified.
    fn get_many(&self, ids: &[ProviderId]) -> Result<Vec<ProviderNode>>;

    /// Apply `updates` atomically to one record.
    ///
    /// Fails with [`crate::StoreError::NotFound`] if the record does not exist.
    fn update_fields(&self, id: &ProviderId, updates: &[FieldUpdate]) -> Result<()>;

    /// Create a record.
    ///
    /// Fails with [`crate::StoreError::AlreadyExists`] on a duplicate id.
    fn insert(&self, node: &ProviderNode) -> Result<()>;
}
