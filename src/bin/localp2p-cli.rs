use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "localp2p-cli")]
#[command(about = "Command line client for a localp2p node", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:9090")]
    url: String,

    /// API key, if the node's control plane requires one
    #[arg(short, long)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List peers the node can connect to
    Discover,
    /// Connect to a peer
    Connect {
        #[arg(short, long)]
        address: String,
        #[arg(short, long)]
        port: u16,
    },
    /// Send a message to a connected peer
    Send {
        #[arg(short, long)]
        to: String,
        message: String,
    },
    /// Show node health and current connections
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let url = cli.url.trim_end_matches('/').to_string();

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);
    }

    let body = match cli.command {
        Commands::Discover => json!({ "method": "discover" }),
        Commands::Connect { address, port } => json!({
            "method": "connect",
            "params": { "address": address, "port": port },
        }),
        Commands::Send { to, message } => json!({
            "method": "send",
            "params": { "to": to, "content": message },
        }),
        Commands::Status => {
            let res = client.get(format!("{}/health", url)).send().await?;
            print_response(res).await?;
            json!({ "method": "connections" })
        }
    };

    let res = client
        .post(format!("{}/rpc", url))
        .headers(headers)
        .json(&body)
        .send()
        .await?;
    print_response(res).await?;

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    let json: Value = match serde_json::from_str(&text) {
        Ok(json) => json,
        Err(_) => {
            eprintln!("Error: node returned status {}", status);
            if !text.is_empty() {
                eprintln!("Response: {}", text);
            }
            return Ok(());
        }
    };

    if let Some(error) = json.get("error").and_then(Value::as_str) {
        eprintln!("Error: {}", error);
        return Ok(());
    }

    let output = json.get("result").unwrap_or(&json);
    println!("{}", serde_json::to_string_pretty(output)?);
    Ok(())
}
