//! Unix socket server for admin commands.
//!
//! Provides a local IPC interface for maintenance: downline reconciliation,
//! emergency code revocation and record inspection.

use crate::error::Result;
use crate::node::NodeState;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use trellis_store::ProviderId;

/// Admin command sent over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum AdminCommand {
    /// Recount a provider's downline and repair the cache
    Reconcile { provider_id: String },
    /// Revoke a referral code
    Revoke { code: String },
    /// Dump a provider record
    Show { provider_id: String },
    /// Ping (health check)
    Ping,
}

/// Response from admin command.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdminResponse {
    Ok { message: String },
    Error { error: String },
    Record { record: serde_json::Value },
    Pong,
}

/// Admin socket server.
pub struct AdminSocket {
    state: Arc<NodeState>,
    socket_path: PathBuf,
}

impl AdminSocket {
    /// Create a new admin socket server.
    pub fn new(state: Arc<NodeState>, socket_path: &Path) -> Self {
        Self {
            state,
            socket_path: socket_path.to_path_buf(),
        }
    }

    /// Run the admin socket server.
    pub async fn run(&self) -> Result<()> {
        // Remove a stale socket file left by a previous run
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!("Admin socket listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, state).await {
                            tracing::error!("Admin connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept admin connection: {}", e);
                }
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, state: Arc<NodeState>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<AdminCommand>(&line) {
            Ok(cmd) => execute_command(cmd, &state).await,
            Err(e) => AdminResponse::Error {
                error: format!("Invalid command: {}", e),
            },
        };

        let response_json = serde_json::to_string(&response)? + "\n";
        writer.write_all(response_json.as_bytes()).await?;
        line.clear();
    }

    Ok(())
}

async fn execute_command(cmd: AdminCommand, state: &NodeState) -> AdminResponse {
    match cmd {
        AdminCommand::Reconcile { provider_id } => {
            // Hold off attaches so the recount sees a settled subtree
            let _guard = state.network_lock.lock().await;
            match state.engine.recompute(&ProviderId::new(provider_id.clone())) {
                Ok(recount) if recount.drifted() => AdminResponse::Ok {
                    message: format!(
                        "Repaired downline of {}: {} -> {}",
                        provider_id, recount.previous, recount.recomputed
                    ),
                },
                Ok(recount) => AdminResponse::Ok {
                    message: format!(
                        "Downline of {} already consistent ({})",
                        provider_id, recount.recomputed
                    ),
                },
                Err(e) => AdminResponse::Error {
                    error: e.to_string(),
                },
            }
        }

        AdminCommand::Revoke { code } => match state.engine.revoke(&code) {
            Ok(owner) => {
                tracing::info!("Admin revoked code {} of {}", code, owner);
                AdminResponse::Ok {
                    message: format!("Revoked {} (owner {})", code, owner),
                }
            }
            Err(e) => AdminResponse::Error {
                error: e.to_string(),
            },
        },

        AdminCommand::Show { provider_id } => {
            let record = state
                .engine
                .provider(&ProviderId::new(provider_id))
                .map_err(|e| e.to_string())
                .and_then(|node| serde_json::to_value(node).map_err(|e| e.to_string()));
            match record {
                Ok(record) => AdminResponse::Record { record },
                Err(error) => AdminResponse::Error { error },
            }
        }

        AdminCommand::Ping => AdminResponse::Pong,
    }
}

/// Default socket path, resolved the same way the node resolves it.
pub fn default_socket_path() -> PathBuf {
    socket_path_from(|key| std::env::var(key).ok())
}

fn socket_path_from(var: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(path) = var("TRELLIS_ADMIN_SOCKET") {
        return PathBuf::from(path);
    }
    let data_dir = var("TRELLIS_DATA_DIR").unwrap_or_else(|| "./trellis-data".to_string());
    PathBuf::from(data_dir).join("admin.sock")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeConfig;
    use tempfile::tempdir;
    use trellis_network::NewProvider;
    use trellis_store::{FieldUpdate, ProviderStore, RocksStore};

    fn state(dir: &Path) -> NodeState {
        NodeState::new(RocksStore::open(dir).unwrap(), NodeConfig::default())
    }

    fn signup(state: &NodeState, id: &str, code: Option<&str>) {
        state
            .engine
            .register(
                NewProvider {
                    id: Some(id.into()),
                    name: id.into(),
                    title: "Locksmith".into(),
                },
                code,
            )
            .unwrap();
    }

    #[test]
    fn parses_commands() {
        let cmd: AdminCommand =
            serde_json::from_str(r#"{"cmd":"reconcile","provider_id":"abc"}"#).unwrap();
        assert!(matches!(cmd, AdminCommand::Reconcile { provider_id } if provider_id == "abc"));
        let cmd: AdminCommand = serde_json::from_str(r#"{"cmd":"ping"}"#).unwrap();
        assert!(matches!(cmd, AdminCommand::Ping));
    }

    #[test]
    fn socket_path_prefers_explicit_setting() {
        let explicit = socket_path_from(|key| match key {
            "TRELLIS_ADMIN_SOCKET" => Some("/run/trellis.sock".into()),
            "TRELLIS_DATA_DIR" => Some("/var/lib/trellis".into()),
            _ => None,
        });
        assert_eq!(explicit, PathBuf::from("/run/trellis.sock"));

        let from_data_dir = socket_path_from(|key| {
            (key == "TRELLIS_DATA_DIR").then(|| "/var/lib/trellis".to_string())
        });
        assert_eq!(from_data_dir, PathBuf::from("/var/lib/trellis/admin.sock"));

        assert_eq!(
            socket_path_from(|_| None),
            NodeConfig::default().admin_socket
        );
    }

    #[test]
    fn reconcile_repairs_drift() {
        let dir = tempdir().unwrap();
        let state = state(dir.path());
        signup(&state, "a", None);
        state.engine.issue(&"a".into(), Some("AAA")).unwrap();
        signup(&state, "b", Some("AAA"));
        state
            .engine
            .store()
            .update_fields(&"a".into(), &[FieldUpdate::SetDownline(7)])
            .unwrap();

        let response = tokio_test::block_on(execute_command(
            AdminCommand::Reconcile {
                provider_id: "a".into(),
            },
            &state,
        ));
        assert!(
            matches!(response, AdminResponse::Ok { ref message } if message.contains("7 -> 1"))
        );
        assert_eq!(state.engine.provider(&"a".into()).unwrap().downline, 1);
    }

    #[test]
    fn revoke_and_show() {
        let dir = tempdir().unwrap();
        let state = state(dir.path());
        signup(&state, "a", None);
        state.engine.issue(&"a".into(), Some("GONE")).unwrap();

        let revoked = tokio_test::block_on(execute_command(
            AdminCommand::Revoke {
                code: "GONE".into(),
            },
            &state,
        ));
        assert!(matches!(revoked, AdminResponse::Ok { .. }));

        let again = tokio_test::block_on(execute_command(
            AdminCommand::Revoke {
                code: "GONE".into(),
            },
            &state,
        ));
        assert!(matches!(again, AdminResponse::Error { .. }));

        let shown = tokio_test::block_on(execute_command(
            AdminCommand::Show {
                provider_id: "a".into(),
            },
            &state,
        ));
        match shown {
            AdminResponse::Record { record } => assert!(record["referralCode"].is_null()),
            other => panic!("unexpected response: {:?}", other),
        }
    }
}
