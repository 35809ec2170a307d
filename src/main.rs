mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use agora::config::AgoraConfig;
use agora::emergence::types::PatternCriteria;

#[derive(Parser)]
#[command(name = "agora", version, about = "Collective pattern emergence and agent messaging")]
struct Cli {
    /// Config file (defaults to ~/.agora/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Feed a JSON Lines file of interactions through the pattern engine
    Replay {
        file: PathBuf,
    },
    /// List stored patterns, strongest first
    Patterns {
        /// Element the pattern must involve (repeatable)
        #[arg(long = "element")]
        elements: Vec<String>,
        #[arg(long)]
        domain: Option<String>,
        #[arg(long)]
        culture: Option<String>,
        #[arg(long)]
        min_strength: Option<f64>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Record a verification of a stored pattern
    Verify {
        pattern_id: String,
        contributor: String,
        /// The pattern did not hold up
        #[arg(long)]
        failed: bool,
    },
    /// Show pattern statistics
    Stats,
    /// Check database health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AgoraConfig::load_from(path)?,
        None => AgoraConfig::load()?,
    };

    // Log to stderr so command output on stdout stays clean.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Replay { file } => {
            cli::replay::replay(config, &file).await?;
        }
        Command::Patterns {
            elements,
            domain,
            culture,
            min_strength,
            limit,
        } => {
            let criteria = PatternCriteria {
                elements,
                domain,
                culture,
                min_strength,
                limit,
            };
            cli::patterns::patterns(config, criteria).await?;
        }
        Command::Verify {
            pattern_id,
            contributor,
            failed,
        } => {
            cli::verify::verify(config, &pattern_id, &contributor, !failed).await?;
        }
        Command::Stats => {
            cli::stats::stats(config).await?;
        }
        Command::Doctor => {
            cli::doctor::doctor(&config)?;
        }
    }

    Ok(())
}
