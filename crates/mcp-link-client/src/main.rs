//! mcp-link — probe and negotiate MCP server connections.

use std::sync::Arc;

use clap::{Parser, Subcommand};

use mcp_link::{detect_protocol, Protocol, ServerConfig, DEFAULT_FALLBACK_ORDER};
use mcp_link_client::config::{load_config, resolve_config_path};
use mcp_link_client::types::{CLIENT_NAME, CLIENT_VERSION, MCP_VERSION};
use mcp_link_client::{AdapterRegistry, ProtocolNegotiator};

#[derive(Parser)]
#[command(
    name = "mcp-link",
    about = "Connect to MCP servers over WebSocket, HTTP or SSE with protocol fallback",
    version
)]
struct Cli {
    /// Configuration file path (TOML or JSON).
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error). Defaults to the config file's.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the protocol detected for a URL.
    Detect {
        /// Server URL.
        url: String,
    },

    /// Negotiate with a URL, ping it and print a JSON report.
    Probe {
        /// Server URL.
        url: String,
    },

    /// Negotiate with configured servers.
    Negotiate {
        /// Only this server id (default: every enabled server).
        #[arg(short, long)]
        server: Option<String>,
    },

    /// Validate every configured server.
    Validate,

    /// Print supported protocols and client info as JSON.
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config.as_deref());
    let loaded = load_config(&config_path);

    // Initialize logging
    let level = cli.log_level.clone().unwrap_or_else(|| {
        loaded
            .as_ref()
            .map(|c| c.log_level.clone())
            .unwrap_or_else(|_| "info".to_string())
    });
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let registry = Arc::new(AdapterRegistry::new());
    let negotiator = ProtocolNegotiator::new(Arc::clone(&registry));

    match cli.command {
        Commands::Detect { url } => match detect_protocol(&url) {
            Ok(protocol) => {
                let features: Vec<_> = protocol
                    .supported_features()
                    .iter()
                    .map(|f| f.as_str())
                    .collect();
                println!("{protocol}");
                println!("  Features: {}", features.join(", "));
                println!(
                    "  Fallbacks: {}",
                    protocol
                        .default_fallbacks()
                        .iter()
                        .map(Protocol::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
            Err(e) => {
                eprintln!("Cannot detect protocol: {e}");
                std::process::exit(1);
            }
        },

        Commands::Probe { url } => {
            let config = ServerConfig::from_url(&url)?;
            let report = negotiator.test_connection(&config).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.success {
                std::process::exit(1);
            }
        }

        Commands::Negotiate { server } => {
            let config = loaded?;
            let targets: Vec<&ServerConfig> = match &server {
                Some(id) => {
                    let found = config.server(id).ok_or_else(|| {
                        anyhow::anyhow!("No server '{id}' in {}", config_path.display())
                    })?;
                    vec![found]
                }
                None => config.enabled_servers().collect(),
            };
            if targets.is_empty() {
                eprintln!("No enabled servers in {}", config_path.display());
                std::process::exit(1);
            }

            let mut failures = 0;
            for target in targets {
                match negotiator.negotiate(target).await {
                    Ok(negotiated) => {
                        println!("{}: connected over {}", target.id, negotiated.protocol);
                        for attempt in &negotiated.attempts {
                            println!("  skipped {attempt}");
                        }
                        negotiated.adapter.dispose().await;
                    }
                    Err(e) => {
                        failures += 1;
                        println!("{}: {e}", target.id);
                    }
                }
            }
            if failures > 0 {
                std::process::exit(1);
            }
        }

        Commands::Validate => {
            let config = loaded?;
            let mut invalid = 0;
            for server in &config.servers {
                match server.check() {
                    Ok(url) => println!("ok       {} ({}) {url}", server.id, server.protocol),
                    Err(e) => {
                        invalid += 1;
                        println!("invalid  {} ({}): {e}", server.id, server.protocol);
                    }
                }
            }
            println!(
                "{} server(s), {invalid} invalid ({})",
                config.servers.len(),
                config_path.display()
            );
            if invalid > 0 {
                std::process::exit(1);
            }
        }

        Commands::Info => {
            let protocols: Vec<_> = Protocol::ALL
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "name": p.as_str(),
                        "schemes": p.expected_schemes(),
                        "features": p.supported_features(),
                    })
                })
                .collect();
            let info = serde_json::json!({
                "client": { "name": CLIENT_NAME, "version": CLIENT_VERSION },
                "mcp_version": MCP_VERSION,
                "protocols": protocols,
                "default_fallback_order": DEFAULT_FALLBACK_ORDER,
                "registry": registry.stats(),
                "config_path": config_path.display().to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
    }

    registry.shutdown().await;
    Ok(())
}
