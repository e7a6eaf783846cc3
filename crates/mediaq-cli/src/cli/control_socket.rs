//! Control socket: server (during `mediaq serve`) and client (every other subcommand).
//! Protocol: one request line in, one JSON reply line out.

use anyhow::{Context, Result};
use mediaq_core::control::{self, Reply, Request};
use mediaq_core::service::DownloadService;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

/// Binds `path` (replacing a stale socket) and spawns a task answering each
/// request line through `service`. Must be called inside a tokio runtime.
pub fn spawn_control_listener(
    service: DownloadService,
    path: impl AsRef<Path>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create socket dir: {}", dir.display()))?;
    }
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)
        .with_context(|| format!("failed to bind control socket: {}", path.display()))?;
    tracing::debug!(path = %path.display(), "control socket listening");

    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let service = service.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(&service, stream).await {
                            tracing::debug!("control connection: {}", e);
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(handle)
}

async fn serve_connection(service: &DownloadService, stream: UnixStream) -> std::io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = control::handle_line(service, &line).await;
        tracing::debug!(request = %line.trim(), error = reply.is_error(), "control request");
        let mut out = reply.to_line();
        out.push('\n');
        write.write_all(out.as_bytes()).await?;
    }
    Ok(())
}

/// Sends one request and waits for its reply.
pub async fn send_request(socket_path: &Path, request: &Request) -> Result<Reply> {
    let stream = UnixStream::connect(socket_path).await.with_context(|| {
        format!(
            "cannot reach control socket {} (is `mediaq serve` running?)",
            socket_path.display()
        )
    })?;
    let (read, mut write) = stream.into_split();
    write
        .write_all(format!("{request}\n").as_bytes())
        .await
        .context("failed to send request")?;

    let line = BufReader::new(read)
        .lines()
        .next_line()
        .await
        .context("failed to read reply")?
        .context("server closed the connection without replying")?;
    serde_json::from_str(&line).with_context(|| format!("malformed reply: {line}"))
}

/// Like `send_request`, but turns an error reply into an `Err`.
pub async fn request_ok(socket_path: &Path, request: &Request) -> Result<Reply> {
    match send_request(socket_path, request).await? {
        Reply::Error { code, message } => {
            anyhow::bail!("{} ({})", message, code.http_status())
        }
        reply => Ok(reply),
    }
}
