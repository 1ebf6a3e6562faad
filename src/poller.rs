//! Fixed-interval background refresh.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::board::{Board, LoadMode};

/// Reload the board silently every `interval` until `shutdown` flips to true
/// or its sender is dropped. The first reload happens one interval after start.
pub fn spawn_poller(
    board: Arc<Board>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = interval.as_secs(), "Background refresh started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!("Background refresh tick");
                    // Failures are logged by the board.
                    let _ = board.reload(LoadMode::Silent).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Background refresh stopped");
    })
}
