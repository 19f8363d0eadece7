//! Polling-based watcher for the local pipeline config document.
//!
//! Checks the file's mtime every 2 seconds. When a change is detected it
//! debounces for 500ms (editors write in stages), then asks the store to
//! reload from its authority. Observers hear about it through the store.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;

use super::store::ReactiveConfigStore;

/// Interval between mtime checks.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Settle time after a detected change.
const DEBOUNCE_DELAY: Duration = Duration::from_millis(500);

/// Run until `cancel` fires. Each stable mtime change triggers `store.init()`.
///
/// The baseline mtime is read here, when the future is built, so an edit made
/// between spawning and the first poll is still seen as a change.
pub fn watch_config_file(
    path: PathBuf,
    store: Arc<ReactiveConfigStore>,
    cancel: CancellationToken,
) -> impl Future<Output = ()> + Send + 'static {
    let baseline = get_mtime(&path);
    watch_from(path, baseline, store, cancel)
}

async fn watch_from(
    path: PathBuf,
    mut last_mtime: Option<SystemTime>,
    store: Arc<ReactiveConfigStore>,
    cancel: CancellationToken,
) {
    tracing::info!(path = %path.display(), "Config watcher started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("Config watcher stopped");
                return;
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }

        let Some(current) = get_mtime(&path) else {
            if last_mtime.is_some() {
                tracing::warn!(
                    path = %path.display(),
                    "Config document not accessible, keeping current config"
                );
                last_mtime = None;
            }
            continue;
        };

        if last_mtime == Some(current) {
            continue;
        }

        tokio::time::sleep(DEBOUNCE_DELAY).await;
        if get_mtime(&path) != Some(current) {
            continue;
        }
        last_mtime = Some(current);

        if !store.init().await {
            tracing::warn!(path = %path.display(), "Config reload failed, previous config retained");
        }
    }
}

fn get_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok().and_then(|m| m.modified().ok())
}
