//! CLI for the rcrawl crawl engine.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rcrawl_core::config;
use rcrawl_core::store::SqliteStore;
use std::path::PathBuf;
use std::sync::Arc;

use commands::{run_crawl, run_reset, run_status};

/// Top-level CLI for the rcrawl crawl engine.
#[derive(Debug, Parser)]
#[command(name = "rcrawl")]
#[command(about = "rcrawl: resumable concurrency-bounded web crawler", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run a crawl job to completion (resumes if persisted work remains).
    Run {
        /// Job name; namespaces all persisted state.
        name: String,

        /// File with one seed per line; lines starting with `{` are parsed
        /// as JSON request specs.
        #[arg(long, value_name = "FILE")]
        seeds: PathBuf,

        /// Prefix prepended to every seed URI.
        #[arg(long, default_value = "")]
        base_uri: String,

        /// Fetch up to N pages concurrently.
        #[arg(long, value_name = "N")]
        concurrency: Option<usize>,

        /// Resume from persisted state instead of reseeding.
        #[arg(long)]
        resume: bool,

        /// Retry budget per request before it counts as a permanent failure.
        #[arg(long, value_name = "N")]
        max_retries: Option<u32>,

        /// Seconds to pause after each request.
        #[arg(long, value_name = "SECS")]
        interval: Option<f64>,

        /// Per-request timeout in seconds.
        #[arg(long, value_name = "SECS")]
        timeout: Option<f64>,
    },

    /// Show the persisted counters and queue lengths for a job.
    Status {
        /// Job name.
        name: String,
    },

    /// Delete all persisted state for a job.
    Reset {
        /// Job name.
        name: String,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);
        let store = Arc::new(SqliteStore::open_default().await?);

        match cli.command {
            CliCommand::Run {
                name,
                seeds,
                base_uri,
                concurrency,
                resume,
                max_retries,
                interval,
                timeout,
            } => {
                let mut cfg = cfg;
                if let Some(n) = concurrency {
                    cfg.concurrency = n;
                }
                if resume {
                    cfg.resume = true;
                }
                if let Some(n) = max_retries {
                    cfg.max_retries = n;
                }
                if let Some(secs) = interval {
                    cfg.interval_secs = secs;
                }
                if let Some(secs) = timeout {
                    cfg.timeout_secs = secs;
                }
                run_crawl(store, &cfg, &name, &seeds, &base_uri).await?;
            }
            CliCommand::Status { name } => run_status(store, &name).await?,
            CliCommand::Reset { name } => run_reset(store, &name).await?,
        }

        Ok(())
    }
}
