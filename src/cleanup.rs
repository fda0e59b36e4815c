//! Scheduled pruning of session records no token can reach anymore.
//!
//! Every login, refresh and snapshot update rewrites the record, and refresh
//! tokens live for three days. A record untouched for longer than that has
//! no unexpired refresh token left, so deleting it changes no outcome.

use crate::db::Database;
use crate::jwt::REFRESH_TOKEN_DURATION_SECS;
use std::time::Duration;
use tracing::{error, info};

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run all cleanup tasks once. Returns the number of session records removed.
pub async fn run_cleanup(db: &Database) -> u64 {
    match db.sessions().prune_stale(REFRESH_TOKEN_DURATION_SECS).await {
        Ok(count) => {
            if count > 0 {
                info!("Pruned {} stale session records", count);
            }
            count
        }
        Err(e) => {
            error!("Failed to prune stale session records: {}", e);
            0
        }
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(db: Database) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&db).await;
        }
    })
}
