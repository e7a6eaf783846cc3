//! `mediaq fetch <artifact-id>` – read a completed artifact, optionally a byte range.

use anyhow::{Context, Result};
use mediaq_core::artifact;
use std::io::Write;
use std::path::Path;

pub async fn run_fetch(
    root: &Path,
    artifact_id: &str,
    range: Option<&str>,
    out: Option<&Path>,
) -> Result<()> {
    let (selected, size, bytes) = artifact::fetch(root, artifact_id, range).await?;
    tracing::debug!(
        artifact_id,
        start = selected.start,
        end = selected.end,
        size,
        "fetched artifact"
    );
    match out {
        Some(path) => {
            tokio::fs::write(path, &bytes)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!(
                "Wrote {} bytes ({}..{} of {}) to {}",
                bytes.len(),
                selected.start,
                selected.end,
                size,
                path.display()
            );
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes).context("failed to write to stdout")?;
            stdout.flush()?;
        }
    }
    Ok(())
}
