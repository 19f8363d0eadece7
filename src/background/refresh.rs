//! Periodic pipeline refresh.
//!
//! Re-runs the pipeline every `poll_interval_ms`. The interval follows live
//! config changes through [`RefreshObserver`], and a shared [`Notify`] lets
//! the self-healer or the API ask for an immediate run.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analysis::AnalysisOrchestrator;
use crate::config::{ConfigChange, ConfigObserver};

/// Forwards poll interval changes to the refresh loop.
pub struct RefreshObserver {
    interval: watch::Sender<Duration>,
}

impl RefreshObserver {
    /// Observer plus the receiver the loop listens on.
    pub fn channel(initial: Duration) -> (Arc<Self>, watch::Receiver<Duration>) {
        let (tx, rx) = watch::channel(initial);
        (Arc::new(Self { interval: tx }), rx)
    }
}

impl ConfigObserver for RefreshObserver {
    fn name(&self) -> &str {
        "refresh-loop"
    }

    fn on_config_changed(&self, change: &ConfigChange) -> anyhow::Result<()> {
        if change.changed_fields.contains(&"poll_interval_ms") {
            let interval = Duration::from_millis(change.current.poll_interval_ms);
            self.interval.send_replace(interval);
            debug!(interval_ms = change.current.poll_interval_ms, "Refresh interval updated");
        }
        Ok(())
    }
}

/// Run the refresh loop until cancelled. The first run happens immediately.
pub async fn run_refresh_loop(
    orchestrator: Arc<AnalysisOrchestrator>,
    mut interval_rx: watch::Receiver<Duration>,
    trigger: Arc<Notify>,
    cancel: CancellationToken,
) {
    let mut interval = *interval_rx.borrow_and_update();
    info!(interval_ms = interval.as_millis() as u64, "Refresh loop started");

    refresh_once(&orchestrator, "startup").await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => refresh_once(&orchestrator, "interval").await,
            _ = trigger.notified() => refresh_once(&orchestrator, "requested").await,
            changed = interval_rx.changed() => {
                if changed.is_err() {
                    // Observer dropped; keep the last interval
                    continue;
                }
                interval = *interval_rx.borrow_and_update();
                info!(interval_ms = interval.as_millis() as u64, "Refresh interval changed");
            }
        }
    }
    info!("Refresh loop stopped");
}

async fn refresh_once(orchestrator: &AnalysisOrchestrator, reason: &str) {
    match orchestrator.try_run().await {
        Some(result) if result.success => {
            debug!(reason, run_id = %result.run_id, "Refresh run completed");
        }
        Some(result) => {
            warn!(
                reason,
                run_id = %result.run_id,
                diagnostics = ?result.messages(),
                "Refresh run failed"
            );
        }
        None => debug!(reason, "Pipeline busy, refresh skipped"),
    }
}
