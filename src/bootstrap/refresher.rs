//! Periodic cache refresh.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::cache::{MessageCache, RefreshTrigger};
use crate::gateway::Direction;

use super::shutdown::{Shutdown, ShutdownState};

/// Triggers a background refresh of both directions on a fixed interval.
///
/// A tick that finds a refresh already running skips that direction.
pub struct CacheRefresher {
    cache: Arc<MessageCache>,
    period: Duration,
    shutdown_rx: watch::Receiver<ShutdownState>,
}

impl CacheRefresher {
    pub fn new(cache: Arc<MessageCache>, period: Duration, shutdown: &Shutdown) -> Self {
        Self {
            cache,
            period,
            shutdown_rx: shutdown.subscribe(),
        }
    }

    /// Run until shutdown starts.
    pub async fn run(mut self) {
        info!(period_secs = self.period.as_secs(), "cache refresher started");

        // First tick one period from now; startup warming is separate.
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow_and_update() != ShutdownState::Running {
                        info!("cache refresher shutting down");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    for direction in Direction::ALL {
                        match self.cache.trigger_refresh(direction) {
                            RefreshTrigger::Started => debug!(direction = %direction, "periodic refresh started"),
                            RefreshTrigger::InProgress => debug!(direction = %direction, "periodic refresh skipped, already running"),
                        }
                    }
                }
            }
        }
    }
}
