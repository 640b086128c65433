use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the resolver gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8250")]
    url: String,

    #[arg(short, long, env = "GATEWAY_ADMIN_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the active configuration and staleness-check history
    Status,
    /// Check the configuration store now and load any newer configuration
    Refresh,
    /// List data sources of the active configuration
    DataSources {
        /// Check the store before listing
        #[arg(long)]
        fresh: bool,
    },
    /// Publish a configuration adding a data source
    AddDataSource {
        code: String,
    },
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

    let res = match cli.command {
        Commands::Status => {
            client.get(format!("{}/admin/status", cli.url))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Refresh => {
            client.post(format!("{}/admin/config/refresh", cli.url))
                .headers(headers)
                .send()
                .await?
        }
        Commands::DataSources { fresh } => {
            client.get(format!("{}/data-sources", cli.url))
                .query(&[("fresh", fresh)])
                .send()
                .await?
        }
        Commands::AddDataSource { code } => {
            client.post(format!("{}/data-sources", cli.url))
                .json(&json!({ "dataSourceCode": code }))
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
