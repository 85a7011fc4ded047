use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "guard-cli")]
#[command(about = "Management CLI for outbound-guard", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Overall status and open circuit count
    Status,
    /// List every circuit breaker
    Circuits,
    /// Show one circuit breaker
    Circuit { name: String },
    /// Force a circuit breaker closed
    Reset { name: String },
    /// Show buffered notifications
    Notifications {
        /// Only this level (info, warning, error, critical)
        #[arg(short, long)]
        level: Option<String>,
    },
    /// Empty the notification buffer
    ClearNotifications,
}

impl Commands {
    fn request(&self) -> (Method, String) {
        match self {
            Commands::Status => (Method::GET, "/admin/status".to_string()),
            Commands::Circuits => (Method::GET, "/admin/circuits".to_string()),
            Commands::Circuit { name } => (Method::GET, format!("/admin/circuits/{}", name)),
            Commands::Reset { name } => (Method::POST, format!("/admin/circuits/{}/reset", name)),
            Commands::Notifications { level: Some(level) } => {
                (Method::GET, format!("/admin/notifications?level={}", level))
            }
            Commands::Notifications { level: None } => (Method::GET, "/admin/notifications".to_string()),
            Commands::ClearNotifications => (Method::DELETE, "/admin/notifications".to_string()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let (method, path) = cli.command.request();
    let res = client
        .request(method, format!("{}{}", cli.url.trim_end_matches('/'), path))
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            if !text.is_empty() {
                eprintln!("Response: {}", text);
            }
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
