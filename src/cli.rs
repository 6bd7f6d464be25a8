//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use mcp_bridge::remote::DEFAULT_BRIDGE_URL;

/// HTTP gateway and tool-orchestration loop for a single stdio MCP server
#[derive(Parser)]
#[command(name = "mcp-bridge", about, version, propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Bridge base URL for the client subcommands
    #[arg(long, global = true, env = "MCP_BRIDGE_URL", default_value = DEFAULT_BRIDGE_URL)]
    pub url: String,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the bridge server until Ctrl-C
    Serve {
        /// Config file (default: $MCP_BRIDGE_CONFIG, then ./mcp-bridge.yaml)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Listen address, overrides server.bind
        #[arg(long)]
        bind: Option<String>,
    },
    /// Check that the bridge is up
    Health,
    /// Show session state and catalog
    Status,
    /// Start an MCP server and connect to it
    Connect {
        /// Server command (default: the saved settings)
        command: Option<String>,
        /// Arguments passed to the server command
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
        /// Extra environment variable for the server, KEY=VALUE
        #[arg(short = 'e', long = "env", value_parser = parse_env_pair)]
        env: Vec<(String, String)>,
    },
    /// Stop the MCP server
    Disconnect,
    /// Call a tool on the connected server
    Call {
        name: String,
        /// Tool arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// Read a resource from the connected server
    Read { uri: String },
    /// Send a chat message and print the reply
    Chat { message: String },
    /// Print the conversation
    History,
    /// Clear the conversation
    Clear,
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_pair() {
        assert_eq!(
            parse_env_pair("A=b=c").unwrap(),
            ("A".to_string(), "b=c".to_string())
        );
        assert!(parse_env_pair("=x").is_err());
        assert!(parse_env_pair("novalue").is_err());
    }

    #[test]
    fn test_connect_collects_args_and_env() {
        let cli = Cli::try_parse_from([
            "mcp-bridge", "connect", "-e", "TOKEN=abc", "node", "server.js", "--stdio",
        ])
        .unwrap();
        match cli.command {
            Command::Connect { command, args, env } => {
                assert_eq!(command.as_deref(), Some("node"));
                assert_eq!(args, vec!["server.js", "--stdio"]);
                assert_eq!(env, vec![("TOKEN".to_string(), "abc".to_string())]);
            }
            _ => panic!("expected connect"),
        }
    }

    #[test]
    fn test_serve_flags() {
        let cli = Cli::try_parse_from(["mcp-bridge", "serve", "--bind", "0.0.0.0:4000"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Serve { bind: Some(ref b), config: None } if b == "0.0.0.0:4000"
        ));
        assert_eq!(cli.url, DEFAULT_BRIDGE_URL);
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
