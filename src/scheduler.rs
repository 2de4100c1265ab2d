//! Periodic pass scheduling
//!
//! Two independent timers drive the pipeline: one for fetching channels and
//! one for the maintenance passes (rotate, prune, publish). A file deleted
//! from the library is therefore reflected in its channel archive within one
//! reconcile interval.
//!
//! # Example
//!
//! ```no_run
//! use ytcast::{Config, Pipeline, Scheduler, wait_for_signal};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = Arc::new(Pipeline::new(Config::default()));
//! Scheduler::new(pipeline).run(wait_for_signal()).await;
//! # Ok(())
//! # }
//! ```

use crate::pipeline::Pipeline;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

/// Runs fetch and maintenance passes on their own intervals
pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    fetch_interval: Duration,
    reconcile_interval: Duration,
}

impl Scheduler {
    /// Scheduler using the pipeline's configured intervals
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        let schedule = &pipeline.config().schedule;
        let fetch_interval = schedule.fetch_interval;
        let reconcile_interval = schedule.reconcile_interval;
        Self {
            pipeline,
            fetch_interval,
            reconcile_interval,
        }
    }

    /// Override the intervals
    pub fn with_intervals(mut self, fetch: Duration, reconcile: Duration) -> Self {
        self.fetch_interval = fetch;
        self.reconcile_interval = reconcile;
        self
    }

    /// Longest time a deleted file can stay in its channel archive
    pub fn staleness_bound(&self) -> Duration {
        self.reconcile_interval
    }

    /// Run both timers until `shutdown` resolves
    ///
    /// Both passes run once immediately. A failing pass is logged and retried
    /// on its next tick. A pass already in progress finishes before shutdown.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(
            fetch_interval = ?self.fetch_interval,
            reconcile_interval = ?self.reconcile_interval,
            staleness_bound = ?self.staleness_bound(),
            "scheduler started"
        );

        let mut fetch_timer = interval(self.fetch_interval);
        fetch_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut reconcile_timer = interval(self.reconcile_interval);
        reconcile_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("scheduler shutting down");
                    break;
                }
                _ = fetch_timer.tick() => {
                    if let Err(e) = self.pipeline.fetch().await {
                        error!(error = %e, code = e.error_code(), "fetch pass failed");
                    }
                }
                _ = reconcile_timer.tick() => {
                    if let Err(e) = self.pipeline.maintain_blocking().await {
                        error!(error = %e, code = e.error_code(), "maintenance pass failed");
                    }
                }
            }
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::Result;
    use crate::fetch::{FetchRequest, FetchTool, ToolOutcome};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct CountingTool(AtomicUsize);

    #[async_trait]
    impl FetchTool for CountingTool {
        async fn fetch(&self, _request: &FetchRequest) -> Result<ToolOutcome> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(ToolOutcome { exit_code: Some(0) })
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    #[tokio::test]
    async fn maintenance_runs_immediately_and_stops_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.base_dir = dir.path().join("library");
        config.paths.channels_file = dir.path().join("missing.json");
        config.paths.ledger_path = dir.path().join("ledger.tsv");
        config.paths.archive_dir = dir.path().join("archive");

        let tool = Arc::new(CountingTool(AtomicUsize::new(0)));
        let pipeline = Arc::new(Pipeline::with_tool(config.clone(), tool.clone()));
        let scheduler = Scheduler::new(pipeline)
            .with_intervals(Duration::from_secs(3600), Duration::from_secs(3600));
        assert_eq!(scheduler.staleness_bound(), Duration::from_secs(3600));

        scheduler
            .run(tokio::time::sleep(Duration::from_millis(200)))
            .await;

        // the fetch pass fails on the missing channel file without stopping the loop
        assert_eq!(tool.0.load(Ordering::SeqCst), 0);
        assert!(config.paths.feeds_root().join("index.json").exists());
    }
}
