// service/background_jobs.rs
use std::sync::Arc;

use chrono::Utc;
use tokio::time::{interval, Duration};

use crate::AppState;

/// Periodically fails payouts stuck in `transferring` so they can be re-driven.
pub async fn start_transfer_reconciliation_job(app_state: Arc<AppState>) {
    let mut interval = interval(Duration::from_secs(app_state.env.reconcile_interval_secs));
    let stale_after = chrono::Duration::seconds(app_state.env.transfer_stale_after_secs as i64);

    loop {
        interval.tick().await;

        tracing::debug!("Running transfer reconciliation job at {}", Utc::now());

        match app_state.payout_engine.reconcile_stale_transfers(stale_after).await {
            Ok(failed) if failed.is_empty() => {}
            Ok(failed) => tracing::warn!(
                "Transfer reconciliation marked {} stale payouts as failed",
                failed.len()
            ),
            Err(e) => tracing::error!("Transfer reconciliation job failed: {}", e),
        }
    }
}
