//! The batch passes wired to one configuration
//!
//! Each pass builds its component from the configuration on demand, so a
//! long-running scheduler picks up channel edits without a restart.

use crate::channel::ChannelSet;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::{FetchOrchestrator, FetchSummary, FetchTool, YtDlpTool};
use crate::publish::{PublishReport, Publisher};
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::retention::{RotationReport, Rotator};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Counts from the maintenance passes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    /// Retention rotation
    pub rotation: RotationReport,
    /// Ledger and archive reconciliation
    pub reconcile: ReconcileReport,
    /// Feed publishing
    pub publish: PublishReport,
}

/// Counts from a full pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Channel fetch
    pub fetch: FetchSummary,
    /// Rotation, reconciliation and publishing
    pub maintenance: MaintenanceReport,
}

/// Runs the fetch, rotate, prune and publish passes
#[derive(Clone)]
pub struct Pipeline {
    config: Config,
    tool: Option<Arc<dyn FetchTool>>,
}

impl Pipeline {
    /// Pipeline using yt-dlp as the fetch tool
    ///
    /// The binary is located on the first fetch, so the other passes work on
    /// machines without it.
    pub fn new(config: Config) -> Self {
        Self { config, tool: None }
    }

    /// Pipeline with an explicit fetch tool
    pub fn with_tool(config: Config, tool: Arc<dyn FetchTool>) -> Self {
        Self {
            config,
            tool: Some(tool),
        }
    }

    /// The configuration every pass uses
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Load and validate the channel document
    pub fn channels(&self) -> Result<ChannelSet> {
        ChannelSet::load(&self.config.paths.channels_file)
    }

    /// Fetch every enabled channel
    pub async fn fetch(&self) -> Result<FetchSummary> {
        let channels = self.channels()?;
        let tool: Arc<dyn FetchTool> = match &self.tool {
            Some(tool) => tool.clone(),
            None => Arc::new(YtDlpTool::from_config(&self.config.fetch)?),
        };
        FetchOrchestrator::new(&self.config, tool)?
            .run(&channels)
            .await
    }

    /// Cap the number of files per channel directory
    pub fn rotate(&self) -> Result<RotationReport> {
        Rotator::new(&self.config).run()
    }

    /// Drop ledger and archive entries whose files are gone
    pub fn prune(&self) -> Result<ReconcileReport> {
        Reconciler::new(&self.config)?.run()
    }

    /// Regenerate every feed document and the index
    ///
    /// Channel names come from the channel document when it can be read;
    /// otherwise feeds are titled after their directories.
    pub fn publish(&self) -> Result<PublishReport> {
        let channels = self.channels().unwrap_or_else(|e| {
            warn!(error = %e, "channel document unavailable, using directory names");
            ChannelSet::default()
        });
        Publisher::new(&self.config)?.run(&channels)
    }

    /// Rotate, prune and publish, in that order
    pub fn maintain(&self) -> Result<MaintenanceReport> {
        let rotation = self.rotate()?;
        let reconcile = self.prune()?;
        let publish = self.publish()?;
        Ok(MaintenanceReport {
            rotation,
            reconcile,
            publish,
        })
    }

    /// [`maintain`](Self::maintain) on the blocking thread pool
    ///
    /// Rotation, reconciliation and publishing walk directories and fsync
    /// files, so async callers go through here.
    pub async fn maintain_blocking(&self) -> Result<MaintenanceReport> {
        let pipeline = self.clone();
        tokio::task::spawn_blocking(move || pipeline.maintain())
            .await
            .map_err(|e| Error::Other(format!("maintenance task panicked: {e}")))?
    }

    /// One full pass: fetch, rotate, prune, publish
    pub async fn run_once(&self) -> Result<RunReport> {
        let fetch = self.fetch().await?;
        let maintenance = self.maintain_blocking().await?;
        info!(
            new_files = fetch.new_files(),
            removed = maintenance.rotation.removed,
            pruned = maintenance.reconcile.dropped,
            feeds = maintenance.publish.feeds,
            "full pass complete"
        );
        Ok(RunReport { fetch, maintenance })
    }
}
