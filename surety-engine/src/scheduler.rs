//! Periodic expiry of status rounds that never reached quorum

use crate::{actor::EngineHandle, Error, Result};
use chrono::Utc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Sweeps stale rounds on a fixed interval
#[derive(Debug, Clone)]
pub struct RoundExpiryScheduler {
    handle: EngineHandle,
    interval: Duration,
}

impl RoundExpiryScheduler {
    /// Create new scheduler
    pub fn new(handle: EngineHandle, interval: Duration) -> Self {
        Self { handle, interval }
    }

    /// Run one sweep now, returning the expired round ids
    pub async fn sweep_once(&self) -> Result<Vec<u64>> {
        let expired = self.handle.expire_stale_rounds(Utc::now()).await?;
        if expired.is_empty() {
            debug!("No stale rounds");
        } else {
            info!(count = expired.len(), rounds = ?expired, "Stale rounds expired");
        }
        Ok(expired)
    }

    /// Start the sweep loop; it stops once the actor is gone
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs(), "Starting round expiry scheduler");

            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                match self.sweep_once().await {
                    Ok(_) => {}
                    Err(Error::Concurrency(e)) => {
                        info!(reason = %e, "Engine stopped, round expiry scheduler exiting");
                        break;
                    }
                    Err(e) => warn!(error = %e, "Round expiry sweep failed"),
                }
            }
        })
    }
}
