//! CLI for the mediaq download job engine.

mod commands;
pub mod control_socket;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mediaq_core::config::{self, MediaqConfig};
use std::path::{Path, PathBuf};

use commands::{run_cancel, run_fetch, run_serve, run_stats, run_status, run_submit};

/// Top-level CLI for mediaq.
#[derive(Debug, Parser)]
#[command(name = "mediaq")]
#[command(about = "mediaq: queue and run media downloads through a bounded worker pool", long_about = None)]
pub struct Cli {
    /// Config file to use instead of ~/.config/mediaq/config.toml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Control socket path (default: ~/.local/state/mediaq/control.sock).
    #[arg(long, global = true, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Start the worker pool and listen on the control socket until Ctrl-C.
    Serve,

    /// Queue a download; prints the job id and artifact id.
    Submit {
        /// HTTP/HTTPS media page or file URL.
        url: String,
    },

    /// Show the progress of a job.
    Status {
        /// Job identifier returned by `submit`.
        job_id: String,
    },

    /// Cancel a queued, running or retrying job.
    Cancel {
        /// Job identifier returned by `submit`.
        job_id: String,
    },

    /// Show worker pool counters.
    Stats,

    /// Read a completed artifact from the download directory.
    Fetch {
        /// Artifact identifier returned by `submit` (e.g. `<uuid>.mp4`).
        artifact_id: String,

        /// Byte range, e.g. `bytes=0-1023` or `bytes=1024-`.
        #[arg(long, value_name = "RANGE")]
        range: Option<String>,

        /// Write to this file instead of stdout.
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> Result<MediaqConfig> {
    match path {
        Some(p) => config::load_from(p),
        None => config::load_or_init(),
    }
}

fn socket_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(p) => Ok(p),
        None => mediaq_core::control::default_control_socket_path()
            .context("failed to resolve control socket path"),
    }
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = load_config(cli.config.as_deref())?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Serve => run_serve(&cfg, &socket_path(cli.socket)?).await?,
            CliCommand::Submit { url } => run_submit(&socket_path(cli.socket)?, &url).await?,
            CliCommand::Status { job_id } => {
                run_status(&socket_path(cli.socket)?, &job_id).await?
            }
            CliCommand::Cancel { job_id } => {
                run_cancel(&socket_path(cli.socket)?, &job_id).await?
            }
            CliCommand::Stats => run_stats(&socket_path(cli.socket)?).await?,
            CliCommand::Fetch {
                artifact_id,
                range,
                out,
            } => {
                run_fetch(
                    &cfg.download.root,
                    &artifact_id,
                    range.as_deref(),
                    out.as_deref(),
                )
                .await?
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
