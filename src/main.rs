//! # Spotify YouTube Scraper
//!
//! Keeps a local SQLite catalogue of the YouTube presence of Spotify artists:
//! their channel, the videos listed on it and the comments on those videos.
//!
//! ## Usage
//!
//! ```sh
//! spotify_youtube_scraper import --csv artists.csv
//! spotify_youtube_scraper channels
//! spotify_youtube_scraper videos
//! spotify_youtube_scraper comments --artist-id 1
//! ```
//!
//! ## Architecture
//!
//! Every tool is the same pipeline over a different target list:
//! 1. **Targets**: select artists or videos from the database
//! 2. **Acquisition**: headless browser sessions, several targets at a time
//! 3. **Reconciliation**: keep only records not already stored
//! 4. **Commit**: insert the delta and stamp the parent in one transaction

use chrono::{Duration as ChronoDuration, Utc};
use clap::Parser;
use spotify_youtube_scraper::browser::ChromeLauncher;
use spotify_youtube_scraper::cli::{ChannelArgs, Cli, Command, CommentArgs, RunArgs, VideoArgs};
use spotify_youtube_scraper::config::{RunSettings, ScraperConfig};
use spotify_youtube_scraper::error::ScrapeError;
use spotify_youtube_scraper::import::import_artists_from_path;
use spotify_youtube_scraper::models::{Artist, Video};
use spotify_youtube_scraper::orchestrator::{self, RunOptions, RunSummary};
use spotify_youtube_scraper::scrapers::channel::{ChannelPipeline, ChannelTarget};
use spotify_youtube_scraper::scrapers::comments::CommentPipeline;
use spotify_youtube_scraper::scrapers::screenshot::screenshot_with_retries;
use spotify_youtube_scraper::scrapers::videos::VideoPipeline;
use spotify_youtube_scraper::store::Store;
use spotify_youtube_scraper::utils::ensure_writable_dir;
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let start_time = std::time::Instant::now();
    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let config = ScraperConfig::load(args.config.as_deref())?;
    let store = store_for(&args.command, &args.db_path)?;

    let summary = match (args.command, store) {
        (Command::Import { csv }, Some(mut store)) => {
            let imported = import_artists_from_path(&mut store, &csv)?;
            println!("Imported {imported} new artist(s)");
            None
        }
        (Command::Channels(cmd), Some(mut store)) => Some(channels(&mut store, &config, cmd, args.quiet).await?),
        (Command::Videos(cmd), Some(mut store)) => Some(videos(&mut store, &config, cmd, args.quiet).await?),
        (Command::Comments(cmd), Some(mut store)) => Some(comments(&mut store, &config, cmd, args.quiet).await?),
        (
            Command::Screenshot {
                url,
                path,
                max_retries,
            },
            _,
        ) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                ensure_writable_dir(dir).await?;
            }
            let launcher = Arc::new(ChromeLauncher::new(config.browser.clone()));
            let wait = Duration::from_secs(config.videos.load_wait_secs);
            screenshot_with_retries(launcher, url, path.clone(), wait, max_retries).await?;
            println!("Saved screenshot to {}", path.display());
            None
        }
        (command, None) => return Err(format!("no database opened for {command:?}").into()),
    };

    let elapsed = start_time.elapsed();
    info!(?elapsed, secs = elapsed.as_secs(), "Execution complete");

    if let Some(summary) = summary {
        println!("{summary}");
        if !summary.all_succeeded() {
            for outcome in summary.outcomes.iter().filter(|o| o.last_error.is_some()) {
                warn!(target_label = %outcome.label, state = %outcome.state, error = ?outcome.last_error, "Target failed");
            }
            return Err(format!("{} {} target(s) failed", summary.failed, summary.kind).into());
        }
    }
    Ok(())
}

/// Open the database for the commands that read or write it.
fn store_for(command: &Command, db_path: &Path) -> Result<Option<Store>, ScrapeError> {
    match command {
        Command::Screenshot { .. } => Ok(None),
        _ => Store::open(db_path).map(Some),
    }
}

/// Layer command-line overrides over the configured run settings.
fn run_options(settings: &RunSettings, args: &RunArgs, quiet: bool) -> RunOptions {
    let mut settings = settings.clone();
    if let Some(n) = args.max_retries {
        settings.max_retries = n;
    }
    if let Some(n) = args.workers {
        settings.workers = n;
    }
    if let Some(secs) = args.timeout_secs {
        settings.target_timeout_secs = secs;
    }
    if let Some(n) = args.passes {
        settings.passes = n;
    }
    let mut opts = RunOptions::from(&settings);
    opts.show_progress = !quiet;
    opts
}

#[instrument(level = "info", skip_all)]
async fn channels(
    store: &mut Store,
    config: &ScraperConfig,
    args: ChannelArgs,
    quiet: bool,
) -> Result<RunSummary, ScrapeError> {
    // A new artist is only stored once its channel has been found.
    let targets: Vec<ChannelTarget> = match (&args.artist_name, &args.spotify_uri) {
        (Some(name), Some(uri)) => match store.artist_by_spotify(uri)? {
            Some(artist) => vec![artist.into()],
            None => vec![ChannelTarget::unsaved(name, uri)],
        },
        _ => store
            .artists_for_channel_discovery(args.overwrite)?
            .into_iter()
            .map(ChannelTarget::from)
            .collect(),
    };
    info!(count = targets.len(), "Artists selected for channel discovery");

    let launcher = ChromeLauncher::new(config.browser.clone());
    let pipeline = Arc::new(ChannelPipeline::new(
        launcher,
        config.channels.clone(),
        args.overwrite,
    ));
    let opts = run_options(&config.run, &args.run, quiet);
    Ok(orchestrator::run(pipeline, store, targets, &opts).await)
}

#[instrument(level = "info", skip_all)]
async fn videos(
    store: &mut Store,
    config: &ScraperConfig,
    args: VideoArgs,
    quiet: bool,
) -> Result<RunSummary, ScrapeError> {
    let targets: Vec<Artist> = match args.artist_id {
        Some(id) => {
            let artist = store
                .artist_by_id(id)?
                .ok_or_else(|| ScrapeError::Config(format!("no artist with id {id}")))?;
            vec![artist]
        }
        None => {
            let cutoff = (Utc::now() - ChronoDuration::days(args.stale_days.max(0))).naive_utc();
            store.artists_stale_since(cutoff)?
        }
    };
    info!(count = targets.len(), "Artists selected for video listing");

    if let Some(dir) = &args.screenshot_path {
        ensure_writable_dir(dir).await?;
    }

    let launcher = ChromeLauncher::new(config.browser.clone());
    let pipeline = Arc::new(VideoPipeline::new(
        launcher,
        config.videos.clone(),
        args.screenshot_path.clone(),
    ));
    let opts = run_options(&config.run, &args.run, quiet);
    Ok(orchestrator::run(pipeline, store, targets, &opts).await)
}

#[instrument(level = "info", skip_all)]
async fn comments(
    store: &mut Store,
    config: &ScraperConfig,
    args: CommentArgs,
    quiet: bool,
) -> Result<RunSummary, ScrapeError> {
    let targets: Vec<Video> = match (args.video_id, args.artist_id) {
        (Some(id), _) => {
            let video = store
                .video_by_id(id)?
                .ok_or_else(|| ScrapeError::Config(format!("no video with id {id}")))?;
            vec![video]
        }
        (None, Some(artist_id)) => store.videos_by_artist(artist_id)?,
        (None, None) => Vec::new(),
    };
    info!(count = targets.len(), "Videos selected for comment collection");

    let mut settings = config.comments.clone();
    if let Some(max) = args.max_comments {
        settings.max_comments = max;
    }

    let launcher = ChromeLauncher::new(config.browser.clone());
    let pipeline = Arc::new(CommentPipeline::new(launcher, settings));
    let opts = run_options(&config.run, &args.run, quiet);
    Ok(orchestrator::run(pipeline, store, targets, &opts).await)
}
