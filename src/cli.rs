//! Command-line interface definitions.
//!
//! Each subcommand maps to one tool. Flags that are also present in the YAML
//! configuration override it when given.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Discover YouTube channels, videos and comments for Spotify artists.
///
/// # Examples
///
/// ```sh
/// # Seed the database, then discover channels with 3 workers
/// spotify_youtube_scraper import --csv artists.csv
/// spotify_youtube_scraper channels --workers 3
///
/// # Refresh videos for artists not checked in two weeks
/// spotify_youtube_scraper videos --stale-days 14 --screenshot-path ./shots
///
/// # Comments for one video
/// spotify_youtube_scraper comments --video-id 42 --max-comments 200
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// SQLite database file
    #[arg(long, global = true, env = "SCRAPER_DB_PATH", default_value = "data/youtube.sqlite3")]
    pub db_path: PathBuf,

    /// Optional path to config.yaml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Hide progress bars
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Seed the artist table from a CSV file
    Import {
        /// CSV with a header row naming `name` and `spotify_uri`
        #[arg(long)]
        csv: PathBuf,
    },

    /// Find the YouTube channel of each artist
    Channels(ChannelArgs),

    /// List videos on each artist's channel
    Videos(VideoArgs),

    /// Collect comments on videos
    Comments(CommentArgs),

    /// Save a screenshot of a channel page
    Screenshot {
        #[arg(long)]
        url: String,

        /// Output PNG file
        #[arg(long)]
        path: PathBuf,

        #[arg(long, default_value_t = 3)]
        max_retries: usize,
    },
}

/// Flags shared by every acquisition tool.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Attempts per target before it is marked failed
    #[arg(long)]
    pub max_retries: Option<usize>,

    /// Targets processed concurrently (1 = sequential)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Per-target time limit in seconds, retries included (0 = none)
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Passes over the failed targets
    #[arg(long)]
    pub passes: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct ChannelArgs {
    /// Look up a single artist (created if not yet known)
    #[arg(long, requires = "spotify_uri")]
    pub artist_name: Option<String>,

    #[arg(long, requires = "artist_name")]
    pub spotify_uri: Option<String>,

    /// Replace channels that are already known
    #[arg(long)]
    pub overwrite: bool,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Args, Debug, Clone)]
pub struct VideoArgs {
    /// Only this artist; otherwise every stale artist with a channel
    #[arg(long)]
    pub artist_id: Option<i64>,

    /// Artists checked less than this many days ago are skipped
    #[arg(long, default_value_t = 28)]
    pub stale_days: i64,

    /// Directory for per-artist channel screenshots
    #[arg(long)]
    pub screenshot_path: Option<PathBuf>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Args, Debug, Clone)]
pub struct CommentArgs {
    /// Only this video
    #[arg(long, conflicts_with = "artist_id")]
    pub video_id: Option<i64>,

    /// Every video of this artist
    #[arg(long, required_unless_present = "video_id")]
    pub artist_id: Option<i64>,

    /// Upper bound on comments read per video (0 = no limit)
    #[arg(long)]
    pub max_comments: Option<usize>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "spotify_youtube_scraper",
            "--db-path",
            "/tmp/db.sqlite3",
            "import",
            "--csv",
            "artists.csv",
        ]);

        assert_eq!(cli.db_path, PathBuf::from("/tmp/db.sqlite3"));
        assert!(matches!(cli.command, Command::Import { ref csv } if csv == &PathBuf::from("artists.csv")));
    }

    #[test]
    fn test_channels_single_artist() {
        let cli = Cli::parse_from([
            "spotify_youtube_scraper",
            "channels",
            "--artist-name",
            "Drake",
            "--spotify-uri",
            "spotify:artist:d",
            "-w",
            "1",
            "--quiet",
        ]);

        assert!(cli.quiet);
        let Command::Channels(args) = cli.command else {
            panic!("expected channels");
        };
        assert_eq!(args.artist_name.as_deref(), Some("Drake"));
        assert_eq!(args.run.workers, Some(1));
        assert_eq!(args.run.max_retries, None);
        assert!(!args.overwrite);
    }

    #[test]
    fn test_channels_name_requires_uri() {
        let res = Cli::try_parse_from(["spotify_youtube_scraper", "channels", "--artist-name", "Drake"]);
        assert!(res.is_err());
    }

    #[test]
    fn test_videos_defaults() {
        let cli = Cli::parse_from(["spotify_youtube_scraper", "videos"]);
        let Command::Videos(args) = cli.command else {
            panic!("expected videos");
        };
        assert_eq!(args.stale_days, 28);
        assert!(args.artist_id.is_none());
        assert!(args.screenshot_path.is_none());
    }

    #[test]
    fn test_comments_needs_a_target() {
        assert!(Cli::try_parse_from(["spotify_youtube_scraper", "comments"]).is_err());

        let cli = Cli::parse_from([
            "spotify_youtube_scraper",
            "comments",
            "--video-id",
            "42",
            "--max-comments",
            "200",
        ]);
        let Command::Comments(args) = cli.command else {
            panic!("expected comments");
        };
        assert_eq!(args.video_id, Some(42));
        assert_eq!(args.max_comments, Some(200));
    }
}
