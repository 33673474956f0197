//! Periodic timeout sweeping.
//!
//! The engine only applies timeouts when an execution is touched. The
//! sweeper touches all of them on a fixed interval so that idle executions
//! still time out and their deciders get woken.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use swf_engine::service::WorkflowService;
use tokio::time::MissedTickBehavior;

use crate::logging::OpTimer;

/// Sweep every `interval` until `shutdown` resolves. Returns the number of
/// timeouts applied over the sweeper's lifetime.
pub async fn run_sweeper(
    service: Arc<WorkflowService>,
    interval: Duration,
    shutdown: impl Future<Output = ()>,
) -> usize {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    tracing::info!(interval_ms = interval.as_millis(), "Timeout sweeper started");
    let mut total = 0;
    loop {
        tokio::select! {
            () = &mut shutdown => break,
            _ = ticker.tick() => {
                let timer = OpTimer::new("sweeper", "pass");
                let applied = service.sweep_timeouts();
                timer.finish_with_count(applied);
                total += applied;
            }
        }
    }
    tracing::info!(total, "Timeout sweeper stopped");
    total
}
