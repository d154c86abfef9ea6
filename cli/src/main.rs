//! Inference ticket client
//!
//! Turns an invitation code into unlinkable tickets and spends tickets on
//! short-lived API keys.
//!
//! Usage:
//!   inferticket register <INVITATION_CODE>
//!   inferticket request-key --count 1
//!   inferticket status

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use inferticket_cli::{export_to, format_status, import_from, load_config, open_store};
use inferticket_client::{CredentialIssuer, HttpTicketApi, KeyRedeemer, TicketApi};
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "inferticket")]
#[command(about = "Obtain and redeem unlinkable inference tickets")]
struct Args {
    /// Directory holding tickets, locks and config.json
    #[arg(long, env = "INFERTICKET_DATA_DIR", default_value = ".inferticket")]
    data_dir: PathBuf,

    /// Issuer base URL (overrides config.json)
    #[arg(long, env = "INFERTICKET_BASE_URL")]
    base_url: Option<String>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Redeem an invitation code for tickets
    Register {
        /// 24-character invitation code
        code: String,
    },
    /// Spend tickets on an API key
    RequestKey {
        /// Tickets to spend
        #[arg(short, long, default_value_t = 1)]
        count: usize,
        /// Name attached to the key
        #[arg(long)]
        name: Option<String>,
    },
    /// Show ticket counts
    Status,
    /// Write all tickets to a JSON file
    Export { path: PathBuf },
    /// Merge tickets from a JSON file
    Import { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let store = Arc::new(open_store(&args.data_dir).await?);

    match args.command {
        Command::Register { code } => {
            let config = load_config(&args.data_dir, args.base_url.as_deref())?;
            let api: Arc<dyn TicketApi> = Arc::new(HttpTicketApi::new(config.clone())?);
            let issuer = CredentialIssuer::new(api, store.clone(), config).with_progress(
                Arc::new(|message: &str, percent: u8| eprintln!("[{percent:>3}%] {message}")),
            );
            let report = issuer
                .obtain_credential(&code)
                .await
                .context("registration failed")?;
            println!("Added {} tickets", report.tickets_added);
            if let Some(expires_at) = report.expires_at {
                println!("Tickets expire at {}", expires_at.to_rfc3339());
            }
        }
        Command::RequestKey { count, name } => {
            let mut config = load_config(&args.data_dir, args.base_url.as_deref())?;
            if let Some(name) = name {
                config.key_name = name;
            }
            let api: Arc<dyn TicketApi> = Arc::new(HttpTicketApi::new(config.clone())?);
            let redeemer = KeyRedeemer::new(api, store.clone(), config);
            let key = redeemer
                .request_api_key(count)
                .await
                .context("key request failed")?;
            println!("{}", serde_json::to_string_pretty(&key)?);
        }
        Command::Status => {
            println!("{}", format_status(&store.counts().await?));
        }
        Command::Export { path } => {
            let total = export_to(&store, &path).await?;
            info!("Exported {} tickets to {}", total, path.display());
        }
        Command::Import { path } => {
            let summary = import_from(&store, &path).await?;
            println!(
                "Imported {} active and {} used tickets",
                summary.added_active, summary.added_archived
            );
        }
    }

    Ok(())
}
