use std::path::Path;

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::state::AppContext;
use crate::webhooks::LoadOutcome;

/// Webhooks file watcher
///
/// Reloads the registry when someone else changed the webhooks file (another
/// node, a manual edit). Events are debounced so a write-then-rename triggers
/// one reload. The registry's own writes are recognised by their file stamp
/// and ignored.
pub async fn run_webhooks_file_watcher(context: AppContext, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let path = context.webhooks.path().to_path_buf();
    let watch_dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| ".".into());
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    // The directory has to exist before it can be watched
    tokio::fs::create_dir_all(&watch_dir)
        .await
        .with_context(|| format!("Failed to create {}", watch_dir.display()))?;

    let (fs_tx, mut fs_rx) = mpsc::channel::<()>(32);
    let mut watcher = file_watcher(file_name, fs_tx)?;
    watcher
        .watch(&watch_dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch {}", watch_dir.display()))?;

    let debounce = context.config.watch_debounce;
    info!(
        "👀 Watching {} for external changes (debounce {}ms)",
        path.display(),
        debounce.as_millis()
    );

    let mut pending = false;
    let debounce_sleep = tokio::time::sleep(debounce);
    tokio::pin!(debounce_sleep);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }

            Some(()) = fs_rx.recv() => {
                debounce_sleep.as_mut().reset(tokio::time::Instant::now() + debounce);
                pending = true;
            }

            _ = &mut debounce_sleep, if pending => {
                pending = false;
                reload(&context).await;
            }
        }
    }

    drop(watcher);
    info!("Webhooks file watcher stopped");
    Ok(())
}

/// Forward create/modify/remove events of `file_name` into `fs_tx`
fn file_watcher(file_name: String, fs_tx: mpsc::Sender<()>) -> Result<RecommendedWatcher> {
    notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)) {
                return;
            }
            let ours = event
                .paths
                .iter()
                .any(|p| p.file_name().is_some_and(|n| n.to_string_lossy() == file_name));
            if ours {
                // A full channel already means a reload is coming
                let _ = fs_tx.try_send(());
            }
        }
        Err(e) => warn!("Webhooks file watcher error: {}", e),
    })
    .context("Failed to create webhooks file watcher")
}

async fn reload(context: &AppContext) {
    match context.webhooks.reload_if_changed().await {
        Ok(Some(LoadOutcome::Loaded { hooks })) => info!("Reloaded {} webhook(s) after external change", hooks),
        Ok(Some(LoadOutcome::StaleFormat { found })) => {
            warn!("Externally written webhooks file has version {:?}, ignored", found)
        }
        Ok(Some(LoadOutcome::NoData)) | Ok(None) => debug!("Webhooks file event without external change"),
        Err(e) => warn!("Failed to reload webhooks file: {:#}", e),
    }
}
