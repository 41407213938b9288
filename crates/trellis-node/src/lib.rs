//! Trellis Node - referral network service
//!
//! Hosts the referral engine over a RocksDB provider store.
//!
//! # Architecture
//!
//! - **Node**: configuration, shared state, startup
//! - **API**: HTTP endpoints for registration, codes and network views
//! - **Admin Socket**: Unix socket for local maintenance (trellis-admin CLI)
//!
//! # Example
//!
//! ```no_run
//! use trellis_node::{NodeConfig, TrellisNode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NodeConfig::from_env()?;
//!     let node = TrellisNode::new(config)?;
//!     node.run().await?;
//!     Ok(())
//! }
//! ```

pub mod admin_socket;
pub mod api;
pub mod error;
pub mod node;

pub use error::{Error, Result};
pub use node::{NodeConfig, NodeState, TrellisNode};
