//! `mediaq serve` – run the worker pool and answer control requests until Ctrl-C.

use anyhow::{Context, Result};
use mediaq_core::config::MediaqConfig;
use mediaq_core::engine::JobEngine;
use mediaq_core::service::DownloadService;
use std::path::Path;

use crate::cli::control_socket;

pub async fn run_serve(cfg: &MediaqConfig, socket: &Path) -> Result<()> {
    std::fs::create_dir_all(&cfg.download.root).with_context(|| {
        format!(
            "failed to create download dir: {}",
            cfg.download.root.display()
        )
    })?;

    let engine = JobEngine::new(&cfg.engine);
    let service = DownloadService::from_config(engine.clone(), cfg);
    engine.run()?;
    let listener = control_socket::spawn_control_listener(service, socket)?;

    println!(
        "mediaq serving with {} worker(s); downloads in {}; control socket {}",
        engine.workers(),
        cfg.download.root.display(),
        socket.display()
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::info!("interrupt received, shutting down");
    eprintln!("Shutting down...");

    listener.abort();
    engine
        .shutdown_graceful(cfg.engine.shutdown_grace())
        .await;
    let _ = std::fs::remove_file(socket);
    Ok(())
}
