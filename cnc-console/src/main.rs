//! CNC Console - Headless operator console for the fleet live state
//!
//! Seeds the machine registry from the backend catalog, follows one machine
//! over the live channel and prints reports, history and session details.

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cnc_live::config::{load_config, load_config_from, LiveConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cnc-console", version, about = "CNC fleet live-state console")]
struct Cli {
    /// Path to the YAML configuration (defaults to $CNC_LIVE_CONFIG or cnc-live.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List machines from the catalog
    Machines,
    /// Follow one machine over the live channel until Ctrl-C
    Watch {
        /// Machine to follow (defaults to the first catalog machine)
        #[arg(short, long)]
        machine: Option<String>,
    },
    /// Show the daily production report
    Report,
    /// Open a session and store its token
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Close the session and clear local state
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Query machine history
    History {
        #[command(subcommand)]
        query: HistoryQuery,
    },
}

#[derive(Subcommand)]
enum HistoryQuery {
    /// Telemetry samples for one metric
    Telemetry {
        #[arg(short, long)]
        machine: String,
        #[arg(long, default_value = "spindle_speed")]
        metric: String,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },
    /// Machine state timeline
    States {
        #[arg(short, long)]
        machine: String,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },
    /// Jobs run on the machine
    Jobs {
        #[arg(short, long)]
        machine: String,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Ok si .env n'existe pas

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config: LiveConfig = match &cli.config {
        Some(path) => load_config_from(path).await.apply_env(|key| std::env::var(key).ok()),
        None => load_config().await,
    };
    let console = commands::Console::new(config).await;

    match cli.command {
        Commands::Machines => console.machines().await.context("Failed to list machines")?,
        Commands::Watch { machine } => console.watch(machine).await.context("Live watch failed")?,
        Commands::Report => console.report().await.context("Failed to load daily report")?,
        Commands::Login { email, password } => console.login(&email, &password).await.context("Login failed")?,
        Commands::Logout => console.logout().await.context("Logout failed")?,
        Commands::Whoami => console.whoami().await.context("Failed to fetch profile")?,
        Commands::History { query } => match query {
            HistoryQuery::Telemetry { machine, metric, from, to } => console
                .telemetry_history(&machine, &metric, &from, &to)
                .await
                .context("Failed to load telemetry history")?,
            HistoryQuery::States { machine, from, to } => console
                .state_timeline(&machine, &from, &to)
                .await
                .context("Failed to load state timeline")?,
            HistoryQuery::Jobs { machine, from, to } => console
                .job_history(&machine, &from, &to)
                .await
                .context("Failed to load job history")?,
        },
    }

    Ok(())
}
