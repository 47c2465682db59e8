//! adhoctl: command line client for an Adhocracy backend
//!
//! Fetches resources, reports allowed methods and resolves the head
//! version of no-fork items.

use std::sync::Arc;

use adhocracy_http::{ClientConfig, Credentials, HttpService, PushHub};
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(name = "adhoctl")]
#[command(about = "Command line client for the Adhocracy REST API")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "adhocracy.toml")]
    config: String,

    /// REST API base URL (overrides config file)
    #[arg(long, env = "ADHOCRACY_REST_URL")]
    rest_url: Option<String>,

    /// User path for authenticated requests
    #[arg(long, env = "ADHOCRACY_USER_PATH", requires = "user_token")]
    user_path: Option<String>,

    /// Session token for authenticated requests
    #[arg(long, env = "ADHOCRACY_USER_TOKEN", requires = "user_path")]
    user_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a resource as JSON
    Get {
        path: String,
        /// Inline pool elements
        #[arg(long)]
        elements: bool,
    },
    /// Print the methods allowed on a resource
    Options { path: String },
    /// Print the head version of a no-fork item
    Newest { item_path: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("adhocracy_http=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = if std::path::Path::new(&cli.config).exists() {
        ClientConfig::load(&cli.config)?
    } else {
        info!("Config file not found, using defaults");
        ClientConfig::default()
    };
    if let Some(rest_url) = cli.rest_url {
        config.rest_url = rest_url;
    }

    let service = HttpService::connect(config, Arc::new(PushHub::new())).await?;
    if let (Some(user_path), Some(token)) = (cli.user_path, cli.user_token) {
        service.set_credentials(Credentials::new(user_path, token)).await;
    }

    match cli.command {
        Command::Get { path, elements } => {
            let options = if elements {
                adhocracy_http::GetOptions::default()
                    .param("elements", "content")
                    .warmup_pool_cache()
            } else {
                adhocracy_http::GetOptions::default()
            };
            let resource = service.get_with(&path, options).await?;
            println!("{}", serde_json::to_string_pretty(&resource)?);
        }
        Command::Options { path } => {
            let options = service.options(&path).await?;
            println!("{}", serde_json::to_string_pretty(&options)?);
        }
        Command::Newest { item_path } => {
            let head = service.get_newest_version_path_no_fork(&item_path).await?;
            println!("{}", head);
        }
    }

    Ok(())
}
