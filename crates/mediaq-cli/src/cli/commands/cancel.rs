//! `mediaq cancel <job-id>` – cancel a job on the running server.

use anyhow::Result;
use mediaq_core::control::{Reply, Request};
use std::path::Path;

use crate::cli::control_socket;

pub async fn run_cancel(socket: &Path, job_id: &str) -> Result<()> {
    let request = Request::Cancel {
        job_id: job_id.to_string(),
    };
    match control_socket::request_ok(socket, &request).await? {
        Reply::Cancelled { job_id, previous } => {
            println!("Cancelled job {job_id} (was {})", previous.as_str())
        }
        other => anyhow::bail!("unexpected reply: {:?}", other),
    }
    Ok(())
}
