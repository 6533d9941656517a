//! reposcope - repository analysis for AI usage and completeness
//!
//! Analyzes hosted repositories in the foreground or through a persisted job
//! queue drained by a worker pool.

use anyhow::{Context, Result};
use reposcope::cli::{self, AppContext, Cli, Commands};
use reposcope::config::AppConfig;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Setup logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config_path = config_path(cli.config)?;

    // Commands that only touch the configuration file
    if let Commands::Config(ref args) = cli.command {
        return cli::config(&config_path, args.show, args.reset, cli.format);
    }

    let config = AppConfig::load_or_default(&config_path)?;
    let ctx = AppContext::build(config)?;

    match cli.command {
        Commands::Analyze(args) => {
            cli::analyze(&ctx, &args.repository, args.repository_id.as_deref(), cli.format).await?;
        }

        Commands::Detect(args) => {
            cli::detect(&ctx, &args.repository, cli.format).await?;
        }

        Commands::Score(args) => {
            cli::score(&ctx, &args.repository, cli.format).await?;
        }

        Commands::Enqueue(args) => {
            cli::enqueue(
                &ctx,
                &args.repository,
                &args.repository_id,
                &args.user_id,
                args.priority,
                cli.format,
            )
            .await?;
        }

        Commands::Job(args) => {
            cli::job_status(&ctx, &args.job_id, cli.format).await?;
        }

        Commands::Latest(args) => {
            cli::latest_job(&ctx, &args.repository_id, cli.format).await?;
        }

        Commands::Cancel(args) => {
            cli::cancel(&ctx, &args.job_id).await?;
        }

        Commands::Worker(args) => {
            cli::worker(&ctx, args.concurrency, args.once).await?;
        }

        Commands::RateLimit => {
            cli::rate_limit(&ctx, cli.format).await?;
        }

        Commands::Invalidate(args) => {
            cli::invalidate(&ctx, &args.repository).await?;
        }

        Commands::Config(_) => unreachable!("handled before the context is built"),
    }

    Ok(())
}

/// Explicit `--config` path, or the platform default
fn config_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => AppConfig::default_path()
            .context("Could not determine a config directory; pass --config"),
    }
}
