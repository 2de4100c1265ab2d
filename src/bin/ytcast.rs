//! # ytcast
//!
//! Command-line front end for the audio mirror.
//!
//! ```text
//! ytcast --config ytcast.json run        # fetch, rotate, prune, publish once
//! ytcast --config ytcast.json watch      # keep doing that on a schedule
//! ytcast --base-dir library serve        # serve feeds and audio
//! ```
//!
//! Logging is controlled with `RUST_LOG` (default `info`).

use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use ytcast::store::write_atomic;
use ytcast::{ChannelSet, Config, FeedServer, Pipeline, Result, Scheduler, wait_for_signal};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "ytcast", version)]
#[command(about = "Mirror video channels as audio and republish them as podcast feeds")]
struct Cli {
    /// JSON configuration file (defaults apply when omitted)
    #[arg(short, long, global = true, env = "YTCAST_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

/// Flags that take precedence over the configuration file
#[derive(ClapArgs, Debug, Clone, Default)]
struct Overrides {
    /// Channel document
    #[arg(long, global = true)]
    channels: Option<PathBuf>,

    /// Served directory containing audio and feeds
    #[arg(long, global = true, alias = "dir")]
    base_dir: Option<PathBuf>,

    /// Audio library root (default `<base-dir>/audio`)
    #[arg(long, global = true)]
    audio_dir: Option<PathBuf>,

    /// Generated feeds directory (default `<base-dir>/feeds`)
    #[arg(long, global = true)]
    feeds_dir: Option<PathBuf>,

    /// Directory of per-channel dedup archives
    #[arg(long, global = true)]
    archive_dir: Option<PathBuf>,

    /// State ledger file
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    /// Target audio format passed to the fetch tool
    #[arg(long, global = true)]
    audio_format: Option<String>,

    /// Target audio quality passed to the fetch tool
    #[arg(long, global = true)]
    audio_quality: Option<String>,

    /// Files kept per channel directory (0 disables rotation)
    #[arg(long, global = true)]
    keep: Option<usize>,

    /// Items per published feed (0 = all)
    #[arg(long, global = true)]
    max_items: Option<usize>,

    /// Serving port, used both in published feeds and by the server
    #[arg(short, long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch new items for every enabled channel
    Fetch,
    /// Drop ledger entries for deleted files and rebuild dedup archives
    Prune,
    /// Delete the oldest files beyond the per-channel cap
    Rotate,
    /// Regenerate feed documents and the index
    Publish,
    /// Serve feeds and audio over HTTP
    Serve,
    /// One full pass: fetch, rotate, prune, publish
    Run,
    /// Run passes on the configured intervals until interrupted
    Watch,
    /// Export the enabled channel URLs and the by-URL channel map
    Channels(ChannelsArgs),
}

#[derive(ClapArgs, Debug)]
struct ChannelsArgs {
    /// Write the URL list here instead of stdout
    #[arg(long)]
    urls_out: Option<PathBuf>,

    /// Write the by-URL map (JSON) here
    #[arg(long)]
    map_out: Option<PathBuf>,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(path) = self.channels {
            config.paths.channels_file = path;
        }
        if let Some(path) = self.base_dir {
            config.paths.base_dir = path;
        }
        if let Some(path) = self.audio_dir {
            config.paths.audio_dir = Some(path);
        }
        if let Some(path) = self.feeds_dir {
            config.paths.feeds_dir = Some(path);
        }
        if let Some(path) = self.archive_dir {
            config.paths.archive_dir = path;
        }
        if let Some(path) = self.state {
            config.paths.ledger_path = path;
        }
        if let Some(format) = self.audio_format {
            config.fetch.audio_format = format;
        }
        if let Some(quality) = self.audio_quality {
            config.fetch.audio_quality = quality;
        }
        if let Some(keep) = self.keep {
            config.retention.keep = keep;
        }
        if let Some(max_items) = self.max_items {
            config.publish.max_items = max_items;
        }
        if let Some(port) = self.port {
            config.publish.port = port;
            config.server.port = port;
        }
    }
}

fn load_config(path: Option<&PathBuf>, overrides: Overrides) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn log_summary<T: Serialize>(label: &str, report: &T) {
    match serde_json::to_string(report) {
        Ok(summary) => info!(summary = %summary, "{label} summary"),
        Err(e) => warn!(error = %e, "could not serialize {label} summary"),
    }
}

fn export_channels(channels: &ChannelSet, args: &ChannelsArgs) -> Result<()> {
    let urls = channels.url_list();
    match &args.urls_out {
        Some(path) => {
            write_atomic(path, urls.as_bytes())?;
            info!(path = %path.display(), "channel URL list written");
        }
        None => print!("{urls}"),
    }

    if let Some(path) = &args.map_out {
        let mut json = serde_json::to_string_pretty(&channels.by_url())?;
        json.push('\n');
        write_atomic(path, json.as_bytes())?;
        info!(path = %path.display(), "channel map written");
    }
    Ok(())
}

async fn execute(command: Command, config: Config) -> Result<()> {
    let pipeline = Pipeline::new(config);
    match command {
        Command::Fetch => log_summary("fetch", &pipeline.fetch().await?),
        Command::Prune => log_summary("prune", &pipeline.prune()?),
        Command::Rotate => log_summary("rotate", &pipeline.rotate()?),
        Command::Publish => log_summary("publish", &pipeline.publish()?),
        Command::Run => log_summary("run", &pipeline.run_once().await?),
        Command::Serve => {
            FeedServer::new(pipeline.config())?
                .serve(wait_for_signal())
                .await?
        }
        Command::Watch => {
            // fail fast on a broken channel document before scheduling
            pipeline.channels()?;
            Scheduler::new(Arc::new(pipeline))
                .run(wait_for_signal())
                .await
        }
        Command::Channels(args) => export_channels(&pipeline.channels()?, &args)?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match load_config(cli.config.as_ref(), cli.overrides) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, code = e.error_code(), "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    match execute(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_fatal() => {
            error!(error = %e, code = e.error_code(), "command failed");
            ExitCode::FAILURE
        }
        Err(e) => {
            warn!(error = %e, code = e.error_code(), "command finished with errors");
            ExitCode::SUCCESS
        }
    }
}
