//! WolfGateCtl - Command line tool for managing WolfGate clients
//!
//! Usage:
//!   wolfgatectl list                  - List provisioned clients
//!   wolfgatectl create <name>         - Provision a client and print its config
//!   wolfgatectl show <name> [--raw]   - Show a client's config
//!   wolfgatectl qr <name> -o out.png  - Save a client's config as a QR code
//!   wolfgatectl delete <name>         - Revoke a client

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;

/// WolfGate Client Control Tool
#[derive(Parser)]
#[command(name = "wolfgatectl")]
#[command(about = "Provision and revoke WolfGate clients", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "/etc/wolfgate/wolfgate.toml")]
    config: PathBuf,

    /// API endpoint to connect to (overrides config)
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Bearer token (overrides config)
    #[arg(short, long, env = "WG_AUTH_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List provisioned clients
    List,
    /// Provision a new client
    Create {
        /// Client name
        name: String,
    },
    /// Show a client's configuration
    Show {
        /// Client name
        name: String,
        /// Print only the configuration text
        #[arg(long)]
        raw: bool,
    },
    /// Save a client's configuration as a PNG QR code
    Qr {
        /// Client name
        name: String,
        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Revoke a client
    Delete {
        /// Client name
        name: String,
    },
}

// ============ API Response Types ============

#[derive(Debug, Deserialize)]
struct ClientListResponse {
    clients: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CreateClientResponse {
    name: String,
    address: String,
    config: String,
}

#[derive(Debug, Deserialize)]
struct ClientResponse {
    name: String,
    config: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

// ============ Config ============

#[derive(Debug, Deserialize)]
struct Config {
    #[serde(default)]
    api: ApiConfig,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfig {
    #[serde(default = "default_api_bind")]
    bind_address: String,
    #[serde(default)]
    token: Option<String>,
}

fn default_api_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn read_config(path: &PathBuf) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

/// Local URL for a bind address, with the wildcard replaced by loopback
fn endpoint_for(bind_address: &str) -> String {
    match bind_address.strip_prefix("0.0.0.0:") {
        Some(port) => format!("http://127.0.0.1:{}", port),
        None => format!("http://{}", bind_address),
    }
}

// ============ Client ============

struct ApiClient {
    http: reqwest::Client,
    endpoint: String,
    token: String,
}

impl ApiClient {
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.endpoint, path))
            .bearer_auth(&self.token)
    }
}

/// Turn a non-success response into an error carrying the server's message
async fn check(response: reqwest::Response) -> Result<reqwest::Response, Box<dyn std::error::Error>> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = match response.json::<ErrorResponse>().await {
        Ok(body) => body.error,
        Err(_) => status.to_string(),
    };
    Err(format!("API error ({}): {}", status.as_u16(), message).into())
}

// ============ Main ============

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = read_config(&cli.config);

    let endpoint = match &cli.endpoint {
        Some(e) => e.trim_end_matches('/').to_string(),
        None => endpoint_for(
            config
                .as_ref()
                .map(|c| c.api.bind_address.as_str())
                .unwrap_or("0.0.0.0:8080"),
        ),
    };

    let token = cli
        .token
        .clone()
        .or_else(|| config.as_ref().and_then(|c| c.api.token.clone()))
        .unwrap_or_default();

    if token.is_empty() {
        eprintln!("Error: no API token (use --token, WG_AUTH_TOKEN or api.token in the config)");
        std::process::exit(1);
    }

    let client = ApiClient {
        http: reqwest::Client::new(),
        endpoint,
        token,
    };

    let result = match &cli.command {
        Commands::List => list_clients(&client).await,
        Commands::Create { name } => create_client(&client, name).await,
        Commands::Show { name, raw } => show_client(&client, name, *raw).await,
        Commands::Qr { name, output } => save_qr(&client, name, output).await,
        Commands::Delete { name } => delete_client(&client, name).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

// ============ Commands ============

async fn list_clients(client: &ApiClient) -> Result<(), Box<dyn std::error::Error>> {
    let response = client.request(reqwest::Method::GET, "/clients").send().await?;
    let list: ClientListResponse = check(response).await?.json().await?;

    if list.clients.is_empty() {
        println!("No clients provisioned");
        return Ok(());
    }

    println!("{:<40}", "CLIENT");
    println!("{}", "-".repeat(40));
    for name in &list.clients {
        println!("{:<40}", name);
    }
    println!();
    println!("Total: {}", list.clients.len());

    Ok(())
}

async fn create_client(client: &ApiClient, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let response = client
        .request(reqwest::Method::POST, "/clients")
        .json(&serde_json::json!({ "name": name }))
        .send()
        .await?;
    let created: CreateClientResponse = check(response).await?.json().await?;

    eprintln!("Created {} at {}", created.name, created.address);
    print!("{}", created.config);

    Ok(())
}

async fn show_client(
    client: &ApiClient,
    name: &str,
    raw: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = format!("/clients/{}", name);

    if raw {
        let response = client
            .request(reqwest::Method::GET, &path)
            .query(&[("raw", "true")])
            .send()
            .await?;
        print!("{}", check(response).await?.text().await?);
        return Ok(());
    }

    let response = client.request(reqwest::Method::GET, &path).send().await?;
    let shown: ClientResponse = check(response).await?.json().await?;

    println!("Client: {}", shown.name);
    println!("{}", "=".repeat(8 + shown.name.len()));
    println!();
    print!("{}", shown.config);

    Ok(())
}

async fn save_qr(
    client: &ApiClient,
    name: &str,
    output: &PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = client
        .request(reqwest::Method::GET, &format!("/clients/{}", name))
        .query(&[("qr", "true")])
        .send()
        .await?;
    let png = check(response).await?.bytes().await?;

    std::fs::write(output, &png)?;
    println!("QR code for {} written to {}", name, output.display());

    Ok(())
}

async fn delete_client(client: &ApiClient, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let response = client
        .request(reqwest::Method::DELETE, &format!("/clients/{}", name))
        .send()
        .await?;
    let result: MessageResponse = check(response).await?.json().await?;

    println!("{}", result.message);

    Ok(())
}
