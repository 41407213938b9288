//! trellis-admin CLI tool
//!
//! Maintenance commands for a running Trellis node.
//!
//! Usage:
//!   trellis-admin reconcile <provider_id>
//!   trellis-admin revoke <code>
//!   trellis-admin show <provider_id>
//!   trellis-admin ping

use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

/// Admin command sent over the socket.
#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum AdminCommand {
    Reconcile { provider_id: String },
    Revoke { code: String },
    Show { provider_id: String },
    Ping,
}

/// Response from admin command.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum AdminResponse {
    Ok { message: String },
    Error { error: String },
    Record { record: serde_json::Value },
    Pong,
}

fn print_usage() {
    eprintln!("trellis-admin - Maintain a Trellis referral node");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  trellis-admin reconcile <provider_id>  Recount and repair a provider's downline");
    eprintln!("  trellis-admin revoke <code>            Revoke a referral code");
    eprintln!("  trellis-admin show <provider_id>       Print a provider record");
    eprintln!("  trellis-admin ping                     Check if daemon is running");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  TRELLIS_SOCKET        Path to admin socket");
    eprintln!("  TRELLIS_ADMIN_SOCKET  Used when TRELLIS_SOCKET is unset");
    eprintln!("  TRELLIS_DATA_DIR      Socket is <dir>/admin.sock otherwise (default: ./trellis-data)");
}

fn get_socket_path() -> PathBuf {
    std::env::var("TRELLIS_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|_| trellis_node::admin_socket::default_socket_path())
}

fn send_command(cmd: AdminCommand) -> Result<AdminResponse, String> {
    let socket_path = get_socket_path();

    let mut stream = UnixStream::connect(&socket_path).map_err(|e| {
        format!(
            "Failed to connect to trellis-node at {:?}: {}\n\
             Is the trellis-node running?",
            socket_path, e
        )
    })?;

    let cmd_json = serde_json::to_string(&cmd).map_err(|e| e.to_string())?;
    writeln!(stream, "{}", cmd_json).map_err(|e| e.to_string())?;

    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .map_err(|e| e.to_string())?;

    serde_json::from_str(&response_line).map_err(|e| format!("Invalid response: {}", e))
}

fn parse_args(args: &[String]) -> Result<AdminCommand, String> {
    let arg = |name: &str| {
        args.get(2)
            .cloned()
            .ok_or_else(|| format!("{} requires a {} argument", args[1], name))
    };

    match args.get(1).map(String::as_str) {
        Some("reconcile") => Ok(AdminCommand::Reconcile {
            provider_id: arg("provider_id")?,
        }),
        Some("revoke") => Ok(AdminCommand::Revoke { code: arg("code")? }),
        Some("show") => Ok(AdminCommand::Show {
            provider_id: arg("provider_id")?,
        }),
        Some("ping") => Ok(AdminCommand::Ping),
        Some(other) => Err(format!("Unknown command: {}", other)),
        None => Err("missing command".to_string()),
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let cmd = match parse_args(&args) {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    match send_command(cmd) {
        Ok(AdminResponse::Ok { message }) => println!("{}", message),
        Ok(AdminResponse::Record { record }) => {
            match serde_json::to_string_pretty(&record) {
                Ok(pretty) => println!("{}", pretty),
                Err(_) => println!("{}", record),
            }
        }
        Ok(AdminResponse::Pong) => println!("pong"),
        Ok(AdminResponse::Error { error }) => {
            eprintln!("Error: {}", error);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("trellis-admin")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn parses_known_commands() {
        assert!(matches!(
            parse_args(&args(&["reconcile", "p1"])),
            Ok(AdminCommand::Reconcile { provider_id }) if provider_id == "p1"
        ));
        assert!(matches!(parse_args(&args(&["ping"])), Ok(AdminCommand::Ping)));
    }

    #[test]
    fn rejects_missing_argument_and_unknown() {
        assert!(parse_args(&args(&["revoke"])).is_err());
        assert!(parse_args(&args(&["explode"])).is_err());
        assert!(parse_args(&args(&[])).is_err());
    }

    #[test]
    fn serializes_like_the_socket_expects() {
        let json = serde_json::to_string(&AdminCommand::Revoke { code: "ABC".into() }).unwrap();
        assert_eq!(json, r#"{"cmd":"revoke","code":"ABC"}"#);
    }
}
