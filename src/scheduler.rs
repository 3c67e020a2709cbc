//! Periodic harvesting.
//!
//! The first tick fires immediately, so a freshly started process harvests
//! right away; later ticks follow every `harvest.tick_secs`. Cycles run
//! inline: a tick that comes due while a cycle is still running is delayed,
//! never stacked.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::pipeline::HarvestPipeline;

/// Run harvest cycles forever. A failed cycle is logged and the next tick
/// proceeds normally.
pub async fn run(pipeline: Arc<HarvestPipeline>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(op = "scheduler.start", period_secs = period.as_secs());

    loop {
        ticker.tick().await;
        tick(&pipeline).await;
    }
}

/// Spawn [`run`] on the runtime.
pub fn spawn(pipeline: Arc<HarvestPipeline>, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run(pipeline, period))
}

async fn tick(pipeline: &HarvestPipeline) {
    match pipeline.run_cycle(Utc::now()).await {
        Ok(report) => info!(
            op = "scheduler.cycle",
            archived = report.archived.len(),
            stop = ?report.stop
        ),
        Err(err) => error!(op = "scheduler.cycle.error", error = %format!("{:#}", err)),
    }
}
