//! `mediaq status <job-id>` – show the progress of one job.

use anyhow::Result;
use mediaq_core::control::{Reply, Request};
use std::path::Path;

use crate::cli::control_socket;

pub async fn run_status(socket: &Path, job_id: &str) -> Result<()> {
    let request = Request::Status {
        job_id: job_id.to_string(),
    };
    match control_socket::request_ok(socket, &request).await? {
        Reply::Status {
            job_id,
            progress,
            state,
        } => println!("{:<38} {:<10} {}", job_id, state, progress.code()),
        other => anyhow::bail!("unexpected reply: {:?}", other),
    }
    Ok(())
}
