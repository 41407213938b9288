//! Trellis Network - multi-level referral engine
//!
//! Service providers refer other providers with referral codes. Every
//! referral adds an edge to a tree; each provider keeps two derived values:
//!
//! - **downline**: cached count of every provider below it
//! - **level**: promotion rank, raised bottom-up when a referrer fills all
//!   three of its referral slots
//!
//! # Components
//!
//! - [`CodeRegistry`] - issues, validates and revokes referral codes
//! - [`NetworkMutator`] - attaches providers and repairs downline/level along
//!   the ancestor path
//! - [`NetworkReader`] - bounded, cycle-safe traversals for visualization
//! - [`Reconciler`] - recounts cached downlines out of band
//! - [`ReferralEngine`] - all of the above over one store, plus registration
//!
//! # Consistency
//!
//! The engine keeps no state between calls and takes no locks. It relies on
//! the store applying each record update atomically. Aggregates are a
//! best-effort cache: a failed walk is not rolled back. Attaches racing on the
//! same code must be serialized by the caller.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use trellis_network::{EngineConfig, NewProvider, ReferralEngine, SystemClock};
//! use trellis_store::MemoryStore;
//!
//! let engine = ReferralEngine::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(SystemClock),
//!     EngineConfig::default(),
//! );
//! let alice = engine
//!     .register(NewProvider { id: Some("alice".into()), name: "Alice".into(), title: "Plumber".into() }, None)
//!     .unwrap();
//! let issued = engine.issue(&alice.provider.id, Some("alice24")).unwrap();
//! assert_eq!(issued.code, "ALICE24");
//! ```

mod clock;
mod engine;
mod error;
mod mutator;
mod reader;
mod reconcile;
mod registry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{EngineConfig, NewProvider, ReferralEngine, ReferralOutcome, Registration};
pub use error::{Error, Result};
pub use mutator::{AttachReport, NetworkMutator, Promotion, LEVEL_CEILING, MAX_ANCESTOR_HOPS};
pub use reader::{NetworkNode, NetworkReader, PopulatePlan, ReaderLimits};
pub use reconcile::{Reconciler, Recount};
pub use registry::{
    normalize_code, CodeOwner, CodeRegistry, CodeSource, IssuedCode, RandomCodes, RegistryConfig,
    CODE_ALPHABET, CODE_LENGTH, CODE_VALIDITY_DAYS, MAX_CODE_RETRIES, MAX_REFERRALS,
};
