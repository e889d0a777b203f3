use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scriptflow_dash::{load_config, replay, DashConfig, ReplayBundle};
use scriptflow_timefmt::{parse_timestamp, seconds_to_human, time_ago, time_ago_at};

/// ScriptFlow dashboard state layer tools
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render durations given in seconds the way the dashboard shows them
    Humanize {
        #[arg(required = true)]
        seconds: Vec<u64>,
    },

    /// Time elapsed since a timestamp
    Ago {
        timestamp: String,

        /// Reference time instead of the current clock
        #[arg(long)]
        now: Option<String>,
    },

    /// Replay a recorded session bundle and print the resulting dashboard state
    Replay {
        /// JSON bundle with records, events and toggles
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_json)?;
    debug!("Starting scriptflow-dash v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Humanize { seconds } => {
            for value in seconds {
                println!("{}", seconds_to_human(value));
            }
            Ok(())
        }
        Commands::Ago { timestamp, now } => cmd_ago(&timestamp, now.as_deref()),
        Commands::Replay { input, pretty } => {
            let config = load_config(cli.config.as_deref()).await?;
            cmd_replay(input, pretty, &config).await
        }
    }
}

fn init_logging(level: &str, json: bool) -> Result<()> {
    let level: tracing::Level = level.parse().context("Invalid log level")?;
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));

    // stdout carries command output only
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
    Ok(())
}

fn cmd_ago(timestamp: &str, now: Option<&str>) -> Result<()> {
    let at = parse_timestamp(timestamp).context("Invalid timestamp")?;
    let rendered = match now {
        Some(now) => time_ago_at(at, parse_timestamp(now).context("Invalid --now timestamp")?),
        None => time_ago(at),
    };
    println!("{rendered}");
    Ok(())
}

async fn cmd_replay(input: PathBuf, pretty: bool, config: &DashConfig) -> Result<()> {
    let content = tokio::fs::read_to_string(&input)
        .await
        .with_context(|| format!("Failed to read bundle {}", input.display()))?;
    let bundle: ReplayBundle =
        serde_json::from_str(&content).context("Failed to parse replay bundle")?;
    info!(
        events = bundle.events.len(),
        toggles = bundle.toggles.len(),
        "replaying {}",
        input.display()
    );

    let report = replay(bundle, config).await?;
    let rendered = if pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{rendered}");
    Ok(())
}
