use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gatewayctl")]
#[command(about = "Operator CLI for the IP allow-list gateway", long_about = None)]
struct Cli {
    /// Admin API base URL
    #[arg(short, long, default_value = "http://127.0.0.1:8081", env = "GATEWAY_ADMIN_URL")]
    url: String,

    /// Admin API key
    #[arg(short, long, env = "GATEWAY_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show gateway version, uptime and backing store
    Status,
    /// Show the cached allow list
    Policy,
    /// Reload the allow list from the store now
    Refresh,
    /// Evaluate an address against the current allow list
    Check {
        /// Address as it would appear in a client header, port allowed
        ip: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match &cli.command {
        Commands::Status => client.get(format!("{base}/admin/status")),
        Commands::Policy => client.get(format!("{base}/admin/policy")),
        Commands::Refresh => client.post(format!("{base}/admin/policy/refresh")),
        Commands::Check { ip } => client
            .get(format!("{base}/admin/check"))
            .query(&[("ip", ip.as_str())]),
    };

    let res = request.headers(headers).send().await?;
    if !print_response(res).await? {
        std::process::exit(1);
    }

    Ok(())
}

/// Pretty-print the body. Returns whether the call succeeded.
async fn print_response(res: reqwest::Response) -> Result<bool, Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    let rendered = match serde_json::from_str::<Value>(&text) {
        Ok(json) => serde_json::to_string_pretty(&json)?,
        Err(_) => text,
    };

    if status.is_success() {
        println!("{rendered}");
    } else {
        eprintln!("Error: admin API returned status {status}");
        if !rendered.is_empty() {
            eprintln!("{rendered}");
        }
    }
    Ok(status.is_success())
}
