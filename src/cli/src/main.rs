//! docpress CLI, the command-line client for a docpress conversion server.
//!
//! Submits office documents for PDF conversion, tracks job state, downloads
//! artifacts, and inspects the server's aggregate status.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{config, convert, health, job, system};
use output::OutputFormat;

/// docpress - document conversion service CLI
#[derive(Parser)]
#[command(
    name = "docpress",
    version = "0.1.0",
    about = "docpress - Document Conversion Service",
    long_about = "Submit office documents to a docpress server, follow their \
conversion jobs, and download the resulting PDFs.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// API server URL
    #[arg(long, global = true, env = "DOCPRESS_API_URL")]
    api_url: Option<String>,

    /// API key sent in the X-API-Key header
    #[arg(long, global = true, env = "DOCPRESS_API_KEY")]
    api_key: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Resolve the server endpoint: flags and environment first, then the
    /// config file, then the local default.
    fn api_client(&self) -> Result<client::ApiClient> {
        let url = self
            .api_url
            .clone()
            .or_else(config::load_api_url)
            .unwrap_or_else(|| "http://localhost:8080".to_string());
        let key = self.api_key.clone().or_else(config::load_api_key);
        client::ApiClient::new(&url, key)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a document for conversion
    Convert(convert::ConvertArgs),

    /// Job operations (status, download)
    #[command(subcommand)]
    Job(job::JobCommands),

    /// Show aggregate system status
    System(system::SystemArgs),

    /// Check server health
    Health(health::HealthArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let api = cli.api_client()?;
    let format = cli.output;

    let outcome = match cli.command {
        Commands::Convert(args) => convert::execute(args, &api, format).await,
        Commands::Job(cmd) => job::execute(cmd, &api, format).await,
        Commands::System(args) => system::execute(args, &api, format).await,
        Commands::Health(args) => health::execute(args, &api, format).await,
        Commands::Config(cmd) => config::execute(cmd, format).await,
    };

    match outcome {
        Ok(()) => Ok(()),
        Err(e) => {
            output::error(&format!("{:#}", e));
            std::process::exit(1);
        }
    }
}
