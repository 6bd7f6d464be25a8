//! CLI entry point for mcp-bridge.

mod cli;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde_json::Value;

use mcp_bridge::config::{find_config_path, BridgeConfig};
use mcp_bridge::mcp_client::ServerLaunch;
use mcp_bridge::remote::BridgeClient;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve { config, bind } => serve(config, bind).await,
        command => {
            mcp_bridge::init_client_tracing();
            let body = remote(&cli.url, command).await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        }
    }
}

async fn serve(config: Option<PathBuf>, bind: Option<String>) -> anyhow::Result<()> {
    let path = find_config_path(config.as_deref());
    let mut config = BridgeConfig::load(path.as_deref()).with_context(|| match &path {
        Some(p) => format!("failed to load config from {}", p.display()),
        None => "invalid default config".to_string(),
    })?;
    if let Some(bind) = bind {
        config.server.bind = bind;
        config.validate()?;
    }
    mcp_bridge::run_server(config).await
}

/// Run one client subcommand against a running bridge.
async fn remote(url: &str, command: Command) -> anyhow::Result<Value> {
    let client = BridgeClient::new(url)?;
    let body = match command {
        Command::Serve { .. } => anyhow::bail!("serve is not a client command"),
        Command::Health => client.health().await?,
        Command::Status => client.status().await?,
        Command::Connect { command, args, env } => {
            let launch = match command {
                Some(command) => ServerLaunch {
                    command,
                    args,
                    environment_variables: env.into_iter().collect(),
                },
                None => {
                    let mut launch = client.saved_launch().await?;
                    launch.environment_variables.extend(env);
                    launch
                }
            };
            client.connect(&launch).await?
        }
        Command::Disconnect => client.disconnect().await?,
        Command::Call { name, args } => {
            let arguments: Value =
                serde_json::from_str(&args).context("--args must be a JSON object")?;
            client.call_tool(&name, arguments).await?
        }
        Command::Read { uri } => client.read_resource(&uri).await?,
        Command::Chat { message } => client.send_chat(&message).await?,
        Command::History => client.history().await?,
        Command::Clear => client.clear_chat().await?,
    };
    Ok(body)
}
