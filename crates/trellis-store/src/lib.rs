//! Trellis Store - provider record persistence
//!
//! The referral engine never talks to a database directly. It consumes the
//! narrow [`ProviderStore`] interface defined here: point lookups by id and by
//! referral code, a batch lookup for breadth-first frontiers, and atomic
//! single-record field updates.
//!
//! # Guarantees
//!
//! Implementations must apply every [`FieldUpdate`] set passed to
//! [`ProviderStore::update_fields`] atomically to one record. Nothing more is
//! assumed: there are no multi-record transactions.
//!
//! # Backends
//!
//! - [`MemoryStore`] - `HashMap` behind a lock, for tests and embedding
//! - [`RocksStore`] - RocksDB-backed persistent storage

mod error;
mod memory;
mod model;
mod rocks;
mod store;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use model::{FieldUpdate, ProviderId, ProviderNode};
pub use rocks::RocksStore;
pub use store::ProviderStore;
