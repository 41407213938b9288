//! Trellis Node - the service entry point.
//!
//! Architecture:
//! - Single daemon process with one RocksDB provider store
//! - HTTP API for the registration and visualization flows
//! - Unix admin socket for local maintenance (trellis-admin CLI)
//!
//! Attaches and code issues are serialized inside the node. Two attaches
//! racing on the same code would otherwise both pass validation and overfill
//! the owner, and two issues of one custom code could both claim it.

use crate::admin_socket::AdminSocket;
use crate::api;
use crate::error::{Error, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use trellis_network::{EngineConfig, ReaderLimits, ReferralEngine, RegistryConfig, SystemClock};
use trellis_store::RocksStore;

/// Configuration for a Trellis node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    /// Data directory for storage
    pub data_dir: PathBuf,

    /// HTTP API listen address
    pub api_addr: SocketAddr,

    /// Admin socket path (for trellis-admin CLI)
    pub admin_socket: PathBuf,

    /// Base URL for shareable referral links
    pub link_base: String,

    /// Traversal bounds
    pub limits: ReaderLimits,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from("./trellis-data");
        Self {
            admin_socket: data_dir.join("admin.sock"),
            data_dir,
            api_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            link_base: RegistryConfig::default().link_base,
            limits: ReaderLimits::default(),
        }
    }
}

impl NodeConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary variable lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let data_dir = var("TRELLIS_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let api_addr = match var("TRELLIS_API_ADDR") {
            Some(addr) => addr
                .parse()
                .map_err(|_| Error::Config(format!("invalid TRELLIS_API_ADDR: {}", addr)))?,
            None => defaults.api_addr,
        };

        let admin_socket = var("TRELLIS_ADMIN_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("admin.sock"));

        let link_base = var("TRELLIS_LINK_BASE").unwrap_or(defaults.link_base);

        let limits = ReaderLimits {
            max_depth: parse_usize(&var, "TRELLIS_MAX_DEPTH", defaults.limits.max_depth)?,
            max_nodes: parse_usize(&var, "TRELLIS_MAX_NODES", defaults.limits.max_nodes)?,
        };

        Ok(Self {
            data_dir,
            api_addr,
            admin_socket,
            link_base,
            limits,
        })
    }

    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            registry: RegistryConfig {
                link_base: self.link_base.clone(),
            },
            limits: self.limits,
        }
    }
}

fn parse_usize(var: &impl Fn(&str) -> Option<String>, key: &str, default: usize) -> Result<usize> {
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("invalid {}: {}", key, raw))),
        None => Ok(default),
    }
}

/// Shared state for the node - one engine shared by all components.
pub struct NodeState {
    pub engine: ReferralEngine<RocksStore>,
    /// Held for every attach, custom code issue and reconciliation.
    pub network_lock: Mutex<()>,
    pub config: NodeConfig,
}

impl NodeState {
    pub fn new(store: RocksStore, config: NodeConfig) -> Self {
        let engine = ReferralEngine::new(
            Arc::new(store),
            Arc::new(SystemClock),
            config.engine_config(),
        );
        Self {
            engine,
            network_lock: Mutex::new(()),
            config,
        }
    }
}

/// A Trellis node instance.
pub struct TrellisNode {
    state: Arc<NodeState>,
}

impl TrellisNode {
    /// Open storage and build the engine.
    pub fn new(config: NodeConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let store = RocksStore::open(&config.data_dir)?;
        Ok(Self {
            state: Arc::new(NodeState::new(store, config)),
        })
    }

    /// Get the shared state (for API handlers).
    pub fn state(&self) -> Arc<NodeState> {
        Arc::clone(&self.state)
    }

    /// Run the node (starts admin socket and HTTP server).
    pub async fn run(self) -> Result<()> {
        let config = &self.state.config;
        tracing::info!("Trellis node starting");
        tracing::info!("  API: http://{}", config.api_addr);
        tracing::info!("  Admin: {:?}", config.admin_socket);
        tracing::info!("  Data: {:?}", config.data_dir);

        let admin_socket = AdminSocket::new(self.state(), &config.admin_socket);
        tokio::spawn(async move {
            if let Err(e) = admin_socket.run().await {
                tracing::error!("Admin socket error: {}", e);
            }
        });

        let app = api::build_router(self.state());
        let listener = tokio::net::TcpListener::bind(config.api_addr).await?;
        tracing::info!("HTTP server listening on {}", config.api_addr);

        axum::serve(listener, app).await?;
        Ok(())
    }
}
