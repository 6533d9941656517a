//! CLI interface using clap
//!
//! Provides the command-line interface for reposcope

mod commands;

pub use commands::*;

use crate::jobs::Priority;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// reposcope - repository analysis for AI usage and completeness
#[derive(Parser, Debug)]
#[command(name = "reposcope")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json)
    #[arg(short = 'o', long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full analysis pipeline now and store the record
    Analyze(AnalyzeArgs),

    /// Detect AI tool usage without storing anything
    Detect(RepoArgs),

    /// Compute the completeness score without storing anything
    Score(RepoArgs),

    /// Queue an analysis job
    Enqueue(EnqueueArgs),

    /// Show the status of a job
    Job(JobArgs),

    /// Show the latest job for a repository
    Latest(LatestArgs),

    /// Remove a job that has not started yet
    Cancel(JobArgs),

    /// Process queued jobs
    Worker(WorkerArgs),

    /// Show the remaining API quota
    RateLimit,

    /// Drop cached data for a repository
    Invalidate(RepoArgs),

    /// Show or reset configuration
    Config(ConfigArgs),
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// A repository given as `owner/repo`
#[derive(Parser, Debug)]
pub struct RepoArgs {
    /// Repository slug (owner/repo)
    pub repository: String,
}

/// Arguments for analyze command
#[derive(Parser, Debug)]
pub struct AnalyzeArgs {
    /// Repository slug (owner/repo)
    pub repository: String,

    /// Identifier to store the record under (defaults to the slug)
    #[arg(long)]
    pub repository_id: Option<String>,
}

/// Arguments for enqueue command
#[derive(Parser, Debug)]
pub struct EnqueueArgs {
    /// Repository slug (owner/repo)
    pub repository: String,

    /// Identifier of the tracked repository
    #[arg(long)]
    pub repository_id: String,

    /// User requesting the analysis
    #[arg(long)]
    pub user_id: String,

    /// Priority (low, normal, high, urgent)
    #[arg(short, long, default_value = "normal")]
    pub priority: Priority,
}

/// A job identifier
#[derive(Parser, Debug)]
pub struct JobArgs {
    pub job_id: String,
}

/// Arguments for latest command
#[derive(Parser, Debug)]
pub struct LatestArgs {
    pub repository_id: String,
}

/// Arguments for worker command
#[derive(Parser, Debug)]
pub struct WorkerArgs {
    /// Concurrent jobs (overrides the configuration)
    #[arg(short = 'n', long)]
    pub concurrency: Option<usize>,

    /// Drain ready jobs and exit
    #[arg(long)]
    pub once: bool,
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Show current configuration
    #[arg(long)]
    pub show: bool,

    /// Reset to defaults
    #[arg(long)]
    pub reset: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
