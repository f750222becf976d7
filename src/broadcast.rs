use crate::state::AppState;
use std::sync::Arc;

/// Spawn a background task that deletes rooms idle past the TTL and tells
/// their clients
pub fn spawn_room_sweeper(state: Arc<AppState>) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(state.timing.sweep_interval).await;

            let removed = state.sweep_expired_rooms().await;
            if removed > 0 {
                tracing::info!(
                    "Swept {} expired rooms, {} remaining",
                    removed,
                    state.room_count().await
                );
            }
        }
    });
}

/// Spawn a background task that drops finished rate-limit windows
pub fn spawn_rate_limit_pruner(state: Arc<AppState>) {
    let Some(limiter) = state.abuse.rate_limiter.clone() else {
        return;
    };
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(state.timing.rate_limit_prune_interval).await;

            let pruned = limiter.cleanup().await;
            if pruned > 0 {
                tracing::debug!("Pruned {} rate limit windows", pruned);
            }
        }
    });
}

/// Spawn a background task that sends the usage digest once per UTC day
pub fn spawn_digest_scheduler(state: Arc<AppState>) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(state.timing.digest_check_interval).await;

            if state.maybe_send_daily_digest().await {
                tracing::info!("Daily digest sent");
            }
        }
    });
}
