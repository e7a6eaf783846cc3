//! `mediaq stats` – worker pool counters.

use anyhow::Result;
use mediaq_core::control::{Reply, Request};
use std::path::Path;

use crate::cli::control_socket;

pub async fn run_stats(socket: &Path) -> Result<()> {
    match control_socket::request_ok(socket, &Request::Stats).await? {
        Reply::Stats(stats) => {
            println!(
                "{:<8} {:<8} {:<8} {:<8} {}",
                "WORKERS", "ACTIVE", "RETRY", "QUEUED", "RETIRED"
            );
            println!(
                "{:<8} {:<8} {:<8} {:<8} {}",
                stats.workers, stats.active, stats.pending_retry, stats.queued, stats.retired
            );
        }
        other => anyhow::bail!("unexpected reply: {:?}", other),
    }
    Ok(())
}
