use std::time::Duration;

use tokio::{
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{error, info};

use crate::state::AppState;

/// Spawns the grant reconciliation loop. Each tick re-applies credit grants
/// that a webhook delivery recorded but could not finish. Returns `None` when
/// the interval is 0 and nothing was spawned.
pub async fn start_background_workers(state: AppState) -> Option<JoinHandle<()>> {
    let settings = state.config.worker;
    if settings.reconcile_interval_seconds == 0 {
        info!("grant reconciliation worker disabled");
        return None;
    }

    info!(
        interval_seconds = settings.reconcile_interval_seconds,
        batch_size = settings.reconcile_batch_size,
        "grant reconciliation worker started"
    );
    let handle = tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(settings.reconcile_interval_seconds));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            run_reconciliation(&state, settings.reconcile_batch_size).await;
        }
    });
    Some(handle)
}

async fn run_reconciliation(state: &AppState, batch_size: i64) {
    match state.ledger.reconcile_pending_grants(batch_size).await {
        Ok(report) if report.failed > 0 => {
            error!(?report, "some pending grants could not be applied");
        }
        Ok(_) => {}
        Err(err) => error!(?err, "worker: failed to load pending grants"),
    }
}
