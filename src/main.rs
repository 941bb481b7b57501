use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Client;
use slackexport::{
    trigger, Config, DownloadOrchestrator, Error, ExportRecord, ListingClient, SessionContext,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Trigger, list and download Slack workspace exports.
#[derive(Parser)]
#[command(name = "slackexport", version)]
struct Cli {
    /// Exit with a per-error-kind status code instead of always exiting 0.
    #[arg(long, global = true)]
    strict_exit: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Request a new export covering 1, 7 or 30 days, or `full` history.
    Start { range: String },
    /// Print the exports on the listing page.
    Get {
        /// Print a JSON array instead of one line per export.
        #[arg(long)]
        json: bool,
    },
    /// Download every ready export not already in the export directory.
    Download {
        /// Only exports whose filter field contains this text.
        filter: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // ─── 2) run exactly one workflow ─────────────────────────────────
    let outcome = run(cli.command).await;

    // ─── 3) map the outcome to an exit status ────────────────────────
    if let Err(err) = outcome {
        let code = err
            .downcast_ref::<Error>()
            .map(|e| e.kind().exit_code())
            .unwrap_or(1);
        error!(code, "{:#}", err);
        if cli.strict_exit {
            std::process::exit(code);
        }
    }
    Ok(())
}

async fn run(command: Command) -> Result<()> {
    let config = Config::from_env()?;
    let session = SessionContext::from_config(&config);

    match command {
        Command::Start { range } => {
            info!(%range, "starting export");
            trigger::start_export(&config, &session, &range).await?;
        }
        Command::Get { json } => {
            let listing = ListingClient::from_config(Client::new(), &config, session)?;
            let records = listing.fetch_export_listing().await?;
            print_records(&records, json)?;
        }
        Command::Download { filter } => {
            let listing = ListingClient::from_config(Client::new(), &config, session)?;
            let orchestrator = DownloadOrchestrator::from_config(listing, &config);
            let summary = orchestrator.download_all(filter.as_deref()).await?;
            info!(?summary, "download finished");
        }
    }
    Ok(())
}

fn print_records(records: &[ExportRecord], json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(records).context("serializing export records")?;
        println!("{}", out);
        return Ok(());
    }

    if records.is_empty() {
        println!("No exports listed");
        return Ok(());
    }
    for (i, record) in records.iter().enumerate() {
        let fields = record
            .fields()
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<_>>()
            .join(" | ");
        println!(
            "{}. {} -> {}",
            i + 1,
            fields,
            record.status_url().unwrap_or("pending")
        );
    }
    Ok(())
}
