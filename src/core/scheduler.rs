use crate::state::AppState;
use std::sync::Arc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Periodically reconcile every admin. Each admin runs as its own task,
/// bounded by the reconciler's limiter.
pub fn start_scheduler(state: Arc<AppState>) {
    tokio::spawn(async move {
        let period = state.config.read().await.reconcile_interval();
        info!("Reconcile scheduler started, every {}s", period.as_secs());

        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            if !state.config.read().await.scheduler_enabled {
                debug!("Scheduler disabled, skipping cycle");
                continue;
            }

            let results = match state.reconciler.reconcile_all().await {
                Ok(r) => r,
                Err(e) => {
                    warn!("Failed to list admins in scheduler: {}", e);
                    continue;
                }
            };

            let failed = results.iter().filter(|r| !r.errors.is_empty()).count();
            let consumed: i64 = results.iter().map(|r| r.consumed).sum();
            let disabled: usize = results.iter().map(|r| r.disabled_clients.len()).sum();
            info!(
                "[Scheduler] Reconciled {} admins: {} bytes charged, {} clients disabled, {} with errors",
                results.len(),
                consumed,
                disabled,
                failed
            );
        }
    });
}
