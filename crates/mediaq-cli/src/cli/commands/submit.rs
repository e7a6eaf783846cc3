//! `mediaq submit <url>` – queue a download on the running server.

use anyhow::Result;
use mediaq_core::control::{Reply, Request};
use std::path::Path;

use crate::cli::control_socket;

pub async fn run_submit(socket: &Path, url: &str) -> Result<()> {
    let request = Request::Submit {
        url: url.to_string(),
    };
    match control_socket::request_ok(socket, &request).await? {
        Reply::Submitted {
            job_id,
            artifact_id,
        } => {
            println!("Queued job {job_id}");
            println!("Artifact: {artifact_id}");
        }
        other => anyhow::bail!("unexpected reply: {:?}", other),
    }
    Ok(())
}
