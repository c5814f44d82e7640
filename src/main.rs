//! WolfGate - WireGuard Peer Provisioning Service
//!
//! Serves the client provisioning API for one WireGuard interface.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wolfgate::api::HttpServer;
use wolfgate::config::{LoggingConfig, WolfGateConfig, ENV_AUTH_TOKEN};
use wolfgate::error::Result;
use wolfgate::peer::{AddressPool, ClientStore, PeerRegistry, ServerSettings};
use wolfgate::wg::{WgCommand, WgKeypairProvider, WgTunnelController};

/// WolfGate - WireGuard Peer Provisioning Service
#[derive(Parser)]
#[command(name = "wolfgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/wolfgate/wolfgate.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the provisioning API (requires root)
    Start,

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "wolfgate.toml")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,

    /// Show resolved configuration
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let logging = peek_logging(&cli.config);
    let level = cli.log_level.as_deref().unwrap_or(&logging.level);
    init_logging(level, &logging.format);

    match cli.command {
        Commands::Start => run_start(cli.config).await,
        Commands::Init { output } => run_init(output),
        Commands::Validate => run_validate(cli.config),
        Commands::Info => run_info(cli.config),
    }
}

/// Logging section of the config file, without validating the rest
fn peek_logging(config_path: &Path) -> LoggingConfig {
    std::fs::read_to_string(config_path)
        .ok()
        .and_then(|content| toml::from_str::<WolfGateConfig>(&content).ok())
        .map(|config| config.logging)
        .unwrap_or_default()
}

/// Initialize logging
fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Start the provisioning service
async fn run_start(config_path: PathBuf) -> Result<()> {
    if !nix::unistd::Uid::effective().is_root() {
        tracing::error!("wolfgate must run as root to manage WireGuard peers");
        std::process::exit(1);
    }

    let config = WolfGateConfig::load(&config_path)?;

    tracing::info!("Starting WolfGate v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Interface: {}", config.wireguard.interface);
    tracing::info!("Client directory: {}", config.config_dir().display());

    let store = ClientStore::open(config.config_dir())?.with_reserved(&config.wireguard.interface);

    let wg = WgCommand::new(config.command_timeout());
    let keys = Arc::new(WgKeypairProvider::new(wg.clone()));
    let tunnel = Arc::new(WgTunnelController::new(wg, &config.wireguard.interface));

    let pool = AddressPool::from_config(&config)?;
    tracing::info!("Address pool: {}", pool.describe());

    let registry = Arc::new(PeerRegistry::open(
        store,
        keys,
        tunnel,
        pool,
        ServerSettings::from_config(&config),
    ));

    match registry.reconcile().await {
        Ok(report) if report.is_clean() => tracing::info!("Live peers match the client store"),
        Ok(report) => tracing::warn!(
            "Reconciled live peers: {} restored, {} without a client file, {} unverified",
            report.restored.len(),
            report.orphaned.len(),
            report.unverified.len()
        ),
        Err(e) => tracing::warn!("Could not compare live peers with the client store: {}", e),
    }

    let server = HttpServer::new(config.api.clone(), registry);
    server.start(shutdown_signal()).await?;

    tracing::info!("WolfGate stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received shutdown signal"),
        Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
    }
}

/// Initialize configuration file
fn run_init(output: PathBuf) -> Result<()> {
    let config_content = format!(
        r#"# WolfGate Configuration
# Generated configuration file

[wireguard]
interface = "wg0"
listen_port = 51820
config_dir = "/etc/wireguard"
command_timeout_secs = 10
# Advertised server address; detected from host interfaces when unset
# endpoint = "vpn.example.com"

[network]
ipv4_prefix = "10.66.66"
ipv6_prefix = "fd42:42:42::"
dns = ["1.1.1.1", "1.0.0.1"]
persistent_keepalive = 25

[api]
enabled = true
bind_address = "0.0.0.0:8080"
# Bearer token required on every request; {ENV_AUTH_TOKEN} overrides it
token = "changeme"
cors_enabled = false

[logging]
level = "info"
format = "pretty"
"#
    );

    std::fs::write(&output, config_content)?;
    println!("Configuration file created: {}", output.display());
    println!("\nSet a strong api.token before starting.");
    println!("Then start with: wolfgate --config {} start", output.display());

    Ok(())
}

/// Validate configuration
fn run_validate(config_path: PathBuf) -> Result<()> {
    match WolfGateConfig::load(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Interface: {}", config.wireguard.interface);
            println!("  Listen Port: {}", config.wireguard.listen_port);
            println!("  Client Directory: {}", config.config_dir().display());
            println!("  API: {}", config.api.bind_address);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Show resolved configuration
fn run_info(config_path: PathBuf) -> Result<()> {
    let config = WolfGateConfig::load(&config_path)?;
    let pool = AddressPool::from_config(&config)?;

    println!("WolfGate Configuration");
    println!("======================");
    println!();
    println!("WireGuard:");
    println!("  Interface:      {}", config.wireguard.interface);
    println!("  Listen Port:    {}", config.wireguard.listen_port);
    println!(
        "  Endpoint:       {}",
        config.wireguard.endpoint.as_deref().unwrap_or("(detected)")
    );
    println!("  Client Dir:     {}", config.config_dir().display());
    println!("  Command Limit:  {}s", config.wireguard.command_timeout_secs);
    println!();
    println!("Network:");
    println!("  Pool:           {}", pool.describe());
    println!("  DNS:            {}", config.network.dns.join(", "));
    println!("  Keepalive:      {}s", config.network.persistent_keepalive);
    println!();
    println!("API:");
    println!("  Enabled:        {}", config.api.enabled);
    println!("  Bind Address:   {}", config.api.bind_address);
    println!("  Token:          {}", redact(&config.api.token));
    println!("  CORS:           {}", config.api.cors_enabled);

    Ok(())
}

fn redact(token: &str) -> String {
    if token.is_empty() {
        "(unset)".to_string()
    } else {
        "*".repeat(8)
    }
}
