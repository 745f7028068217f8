//! One upload (or exist check) per invocation.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use chunkup_protocol::ExistResponse;
use chunkup_uploader::{HttpTransport, UploadCoordinator, UploadEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::Cli;
use crate::config::AppConfig;

/// Runs the command and prints the server's JSON answer (or the
/// `{message, errCode}` rejection) on stdout.
pub async fn run(cli: &Cli, config: AppConfig) -> anyhow::Result<ExitCode> {
    let server = config
        .server
        .clone()
        .context("no server address: pass --server or set `server` in the config file")?;
    let suffix = resolve_suffix(cli.suffix.as_deref(), &cli.file)?;

    let transport = Arc::new(HttpTransport::new()?);
    let (events_tx, events_rx) = mpsc::channel(64);
    let coordinator = UploadCoordinator::new(transport, config.upload).with_events(events_tx);

    if cli.check {
        return match coordinator.exists(Some(&cli.file), &suffix, &server).await {
            Ok(exists) => {
                println!("{}", serde_json::to_string(&ExistResponse { exists })?);
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                error!(error = %e, "exist check failed");
                println!("{}", serde_json::to_string(&e.rejection())?);
                Ok(ExitCode::FAILURE)
            }
        };
    }

    let progress = tokio::spawn(log_progress(events_rx));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling upload");
            on_signal.cancel();
        }
    });

    info!(file = %cli.file.display(), %suffix, %server, "uploading");
    let result = coordinator
        .upload_with_cancel(Some(&cli.file), &suffix, &server, cancel)
        .await;

    // Closing the last sender ends the progress task.
    drop(coordinator);
    let _ = progress.await;

    match result {
        Ok(value) => {
            println!("{value}");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            let failed = e.failed_indices();
            if !failed.is_empty() {
                error!(?failed, "blocks not acknowledged");
            }
            println!("{}", serde_json::to_string(&e.rejection())?);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Explicit suffix, else the file extension.
fn resolve_suffix(explicit: Option<&str>, file: &Path) -> anyhow::Result<String> {
    if let Some(suffix) = explicit {
        return Ok(suffix.trim_start_matches('.').to_string());
    }
    file.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_string)
        .with_context(|| format!("{} has no extension; pass --suffix", file.display()))
}

async fn log_progress(mut rx: mpsc::Receiver<UploadEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            UploadEvent::StateChanged(state) => tracing::debug!(%state, "state"),
            UploadEvent::Digested {
                digest,
                size,
                blocks,
            } => info!(%digest, size, blocks, "digest computed"),
            UploadEvent::BlockSettled {
                index,
                acknowledged,
                settled,
                total,
                bytes_per_second,
                eta,
            } => info!(
                block = index,
                acknowledged,
                ?eta,
                "{settled}/{total} blocks ({:.1} KiB/s)",
                bytes_per_second / 1024.0
            ),
            UploadEvent::Retrying {
                index,
                attempt,
                delay,
            } => warn!(block = index, attempt, ?delay, "retrying block"),
        }
    }
}
