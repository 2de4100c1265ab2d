//! # ytcast
//!
//! Mirror video channels into a local audio library and republish it as
//! podcast feeds.
//!
//! ## Pipeline
//!
//! - **fetch**: read each channel's feed and hand the candidates to an
//!   external fetch tool (yt-dlp) that skips anything in the channel's
//!   dedup archive; record every new file in the state ledger
//! - **rotate**: keep only the newest files per channel directory
//! - **prune**: drop ledger entries whose files are gone and rebuild each
//!   channel's archive from the ledger so deleted items can be fetched again
//! - **publish**: write one RSS feed per channel directory plus an index
//! - **serve**: serve feeds and audio over HTTP with this machine's address
//!   substituted into the feeds
//!
//! Every pass is a separate, restartable batch over the same directories;
//! store rewrites are atomic and ledger writes are append-only, so passes
//! may overlap without corrupting state.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ytcast::{Config, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("ytcast.json".as_ref())?;
//!     let pipeline = Pipeline::new(config);
//!
//!     let report = pipeline.run_once().await?;
//!     println!("{} new files", report.fetch.new_files());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Channel list and slugs
pub mod channel;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Channel feed parsing and retrieval
pub mod feed;
/// Fetch orchestration and the external fetch tool
pub mod fetch;
/// Batch passes wired to one configuration
pub mod pipeline;
/// Feed publishing
pub mod publish;
/// Ledger and archive reconciliation
pub mod reconcile;
/// Per-channel retention
pub mod retention;
/// Periodic pass scheduling
pub mod scheduler;
/// Static feed server
pub mod server;
/// Ledger and dedup archive files
pub mod store;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use channel::{Channel, ChannelSet, slugify};
pub use config::Config;
pub use error::{Error, Result};
pub use feed::{FeedClient, Item, parse_feed};
pub use fetch::{FetchOrchestrator, FetchSummary, FetchTool, YtDlpTool};
pub use pipeline::{MaintenanceReport, Pipeline, RunReport};
pub use publish::{PublishReport, Publisher};
pub use reconcile::{ReconcileReport, Reconciler};
pub use retention::{RotationReport, Rotator};
pub use scheduler::Scheduler;
pub use server::FeedServer;
pub use store::{DedupArchive, Ledger, LedgerEntry};

/// Resolves when the process is asked to stop.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
#[cfg(unix)]
pub async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

/// Resolves when the process is asked to stop (Ctrl+C).
#[cfg(not(unix))]
pub async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
