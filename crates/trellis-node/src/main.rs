//! Trellis Node binary
//!
//! Serves the referral network engine over HTTP.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trellis_node::{NodeConfig, TrellisNode};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trellis_node=info,trellis_network=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Trellis Node");

    let config = NodeConfig::from_env()?;

    let node = TrellisNode::new(config)?;
    node.run().await?;

    Ok(())
}
