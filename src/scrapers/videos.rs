//! Video listing for an artist's channel.
//!
//! Two sources are merged by URL: the channel's `/videos` tab (scrolled until
//! it stops growing or hits the cap) and the music-video cards YouTube shows in
//! the sidebar when searching for the artist. Channel entries come first.

use super::{open_channel_page, search_url};
use crate::browser::{Launcher, Node, Page, ScrollPoller, wait_for_any};
use crate::config::VideoSettings;
use crate::error::{Result, ScrapeError};
use crate::models::{Artist, VideoCandidate};
use crate::orchestrator::Pipeline;
use crate::store::Store;
use crate::utils::file_stem_for;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const VIDEO_ITEM: &str = "#content.ytd-rich-item-renderer";
const THUMBNAIL_ANCHOR: &str = "a#thumbnail";
const VIDEO_TITLE: &str = "#video-title";
const VIDEO_VIEWS: &str = "#metadata-line span";

const MUSIC_CARD: &str =
    ".ytd-two-column-search-results-renderer ytd-watch-card-compact-video-renderer.ytd-vertical-watch-card-list-renderer";
const MUSIC_ANCHOR: &str = "a";
const MUSIC_TITLE: &str = ".title";
const MUSIC_VIEWS: &str = ".subtitle";

static VIEW_COUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d[\d,]*)?(?:\.(\d+))?([KMB])?$").expect("valid view count regex"));

/// Convert a view-count label such as `"1.2M views"` to an integer.
///
/// Only the text before the first space is considered. `K`, `M` and `B`
/// scale by 1e3, 1e6 and 1e9; fractions are truncated after scaling.
/// Returns `None` for labels without a number (e.g. `"No views"`).
///
/// ```ignore
/// assert_eq!(views_to_int("1.2M views"), Some(1_200_000));
/// assert_eq!(views_to_int("950 views"), Some(950));
/// ```
pub fn views_to_int(label: &str) -> Option<i64> {
    let token = label.split_whitespace().next()?;
    let caps = VIEW_COUNT.captures(token)?;
    let whole = caps.get(1).map(|m| m.as_str().replace(',', ""));
    let frac = caps.get(2).map(|m| m.as_str());
    if whole.is_none() && frac.is_none() {
        return None;
    }

    let multiplier: i64 = match caps.get(3).map(|m| m.as_str()) {
        Some("K") => 1_000,
        Some("M") => 1_000_000,
        Some("B") => 1_000_000_000,
        _ => 1,
    };

    let whole: i64 = match whole {
        Some(w) => w.parse().ok()?,
        None => 0,
    };
    let mut value = whole.checked_mul(multiplier)?;

    if let Some(frac) = frac {
        // Exact decimal arithmetic, so "1.2M" is 1_200_000 and not 1_199_999.
        let digits = &frac[..frac.len().min(9)];
        let scale = 10i64.pow(digits.len() as u32);
        let numerator: i64 = digits.parse().ok()?;
        value = value.checked_add(numerator.checked_mul(multiplier)? / scale)?;
    }
    Some(value)
}

fn strip_extra_params(url: &str) -> &str {
    url.split('&').next().unwrap_or(url)
}

/// Read one video card. `None` when a required field is missing or the view
/// count is absent (premieres and members-only videos omit it).
fn read_video<N: Node>(item: &N, anchor: &str, title: &str, views: &str) -> Result<Option<VideoCandidate>> {
    let Some(href) = item.find(anchor).map(|a| a.attr("href")).transpose()?.flatten() else {
        debug!("Skipping video without link");
        return Ok(None);
    };
    let title = match item.find(title) {
        Some(node) => node.text()?,
        None => String::new(),
    };
    let Some(label) = item.find(views).map(|n| n.text()).transpose()? else {
        debug!(%href, "Skipping video without view count");
        return Ok(None);
    };
    let Some(views) = views_to_int(&label) else {
        debug!(%href, %label, "Skipping video with unparseable view count");
        return Ok(None);
    };
    let url = super::absolutize(strip_extra_params(&href))?;
    Ok(VideoCandidate::new(url, title, views))
}

/// Videos listed on the channel's `/videos` tab.
#[instrument(level = "info", skip(page, settings, screenshot))]
pub fn find_channel_videos<P: Page>(
    page: &P,
    channel_url: &str,
    settings: &VideoSettings,
    screenshot: Option<&Path>,
) -> Result<Vec<VideoCandidate>> {
    let url = format!("{}/videos", channel_url.trim_end_matches('/'));
    open_channel_page(page, &url, Duration::from_secs(settings.load_wait_secs))?;

    if let Some(path) = screenshot {
        if let Err(e) = page.screenshot(path) {
            warn!(path = %path.display(), error = %e, "Screenshot failed; continuing");
        }
    }

    let items = ScrollPoller::new(Duration::from_secs(settings.idle_wait_secs))
        .with_cap((settings.max_videos > 0).then_some(settings.max_videos))
        .collect(page, VIDEO_ITEM)?;

    let mut videos = Vec::with_capacity(items.len());
    for item in &items {
        if let Some(video) = read_video(item, THUMBNAIL_ANCHOR, VIDEO_TITLE, VIDEO_VIEWS)? {
            videos.push(video);
        }
    }
    info!(found = items.len(), parsed = videos.len(), "Read channel videos");
    Ok(videos)
}

/// Music videos shown beside the search results for `artist_name`.
///
/// Many artists have no such panel, so absence is an empty list.
#[instrument(level = "info", skip(page))]
pub fn find_music_videos<P: Page>(page: &P, artist_name: &str, wait: Duration) -> Result<Vec<VideoCandidate>> {
    page.goto(&search_url(artist_name))?;
    match wait_for_any(page, &[MUSIC_CARD], wait) {
        Ok(_) => {}
        Err(ScrapeError::NotFound { .. }) => {
            debug!("No music video panel");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    }

    let mut videos = Vec::new();
    for card in page.query_all(MUSIC_CARD)? {
        if let Some(video) = read_video(&card, MUSIC_ANCHOR, MUSIC_TITLE, MUSIC_VIEWS)? {
            videos.push(video);
        }
    }
    info!(count = videos.len(), "Read music videos");
    Ok(videos)
}

/// Channel videos followed by music videos not already listed.
pub fn merge_sources(channel: Vec<VideoCandidate>, music: Vec<VideoCandidate>) -> Vec<VideoCandidate> {
    channel
        .into_iter()
        .chain(music)
        .unique_by(|v| v.url.clone())
        .collect()
}

/// Lists and stores videos for artists with a known channel.
pub struct VideoPipeline<L> {
    launcher: L,
    settings: VideoSettings,
    screenshot_dir: Option<PathBuf>,
}

impl<L: Launcher> VideoPipeline<L> {
    pub fn new(launcher: L, settings: VideoSettings, screenshot_dir: Option<PathBuf>) -> Self {
        Self {
            launcher,
            settings,
            screenshot_dir,
        }
    }

    fn screenshot_path(&self, artist: &Artist) -> Option<PathBuf> {
        let file = format!("{}.png", file_stem_for(&artist.name));
        self.screenshot_dir.as_ref().map(|dir| dir.join(file))
    }
}

impl<L: Launcher> Pipeline for VideoPipeline<L> {
    type Target = Artist;
    type Record = VideoCandidate;
    const KIND: &'static str = "videos";

    fn label(&self, artist: &Artist) -> String {
        artist.name.clone()
    }

    fn acquire(&self, artist: &Artist) -> Result<Vec<VideoCandidate>> {
        let Some(channel) = artist.youtube_url.as_deref() else {
            return Err(ScrapeError::Config(format!(
                "artist '{}' has no channel; run channel discovery first",
                artist.name
            )));
        };

        let page = self.launcher.open()?;
        let screenshot = self.screenshot_path(artist);
        let channel_videos = find_channel_videos(&page, channel, &self.settings, screenshot.as_deref())?;

        let music_videos = if self.settings.include_music_videos {
            find_music_videos(&page, &artist.name, Duration::from_secs(self.settings.load_wait_secs))?
        } else {
            Vec::new()
        };

        let videos = merge_sources(channel_videos, music_videos);
        info!(artist = %artist.name, total = videos.len(), "Found videos");
        Ok(videos)
    }

    fn persist(
        &self,
        store: &mut Store,
        artist: &Artist,
        records: Vec<VideoCandidate>,
        now: &str,
    ) -> Result<usize> {
        store.commit_videos(artist.id, records, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{FakeLauncher, FakeNode, FakePage};
    use crate::models::NEVER_UPDATED;
    use crate::scrapers::CHANNEL_NAME;

    #[test]
    fn test_views_to_int() {
        assert_eq!(views_to_int("1.2M views"), Some(1_200_000));
        assert_eq!(views_to_int("950 views"), Some(950));
        assert_eq!(views_to_int("3B views"), Some(3_000_000_000));
        assert_eq!(views_to_int("12K views"), Some(12_000));
        assert_eq!(views_to_int("4.56K views"), Some(4_560));
        assert_eq!(views_to_int("1.2345K views"), Some(1_234));
        assert_eq!(views_to_int("1,234 views"), Some(1_234));
        assert_eq!(views_to_int("42"), Some(42));
    }

    #[test]
    fn test_views_to_int_rejects_non_numbers() {
        assert_eq!(views_to_int("No views"), None);
        assert_eq!(views_to_int(""), None);
        assert_eq!(views_to_int("Premieres 12/1/26"), None);
        assert_eq!(views_to_int("M views"), None);
    }

    fn channel_item(id: usize, views: Option<&str>) -> FakeNode {
        let mut item = FakeNode::new(VIDEO_ITEM)
            .child(FakeNode::new(THUMBNAIL_ANCHOR).attr("href", &format!("/watch?v={id}")))
            .child(FakeNode::new(VIDEO_TITLE).text(&format!("Song {id}")));
        if let Some(views) = views {
            item = item.child(FakeNode::new(VIDEO_VIEWS).text(views));
        }
        item
    }

    fn music_card(id: &str, views: &str) -> FakeNode {
        FakeNode::new(MUSIC_CARD)
            .child(FakeNode::new(MUSIC_ANCHOR).attr("href", &format!("/watch?v={id}&list=RD{id}")))
            .child(FakeNode::new(MUSIC_TITLE).text(&format!("Hit {id}")))
            .child(FakeNode::new(MUSIC_VIEWS).text(views))
    }

    fn settings() -> VideoSettings {
        VideoSettings {
            max_videos: 100,
            idle_wait_secs: 0,
            load_wait_secs: 0,
            include_music_videos: true,
        }
    }

    #[test]
    fn test_channel_videos_skip_missing_views() {
        let mut nodes = vec![FakeNode::new(CHANNEL_NAME).text("Drake")];
        nodes.push(channel_item(1, Some("1.2M views")));
        nodes.push(channel_item(2, None));
        nodes.push(channel_item(3, Some("950 views")));
        let page = FakePage::new(nodes);

        let videos =
            find_channel_videos(&page, "https://www.youtube.com/@drake", &settings(), None).unwrap();

        assert_eq!(
            videos,
            vec![
                VideoCandidate::new("https://www.youtube.com/watch?v=1", "Song 1", 1_200_000).unwrap(),
                VideoCandidate::new("https://www.youtube.com/watch?v=3", "Song 3", 950).unwrap(),
            ]
        );
        assert_eq!(page.visited(), vec!["https://www.youtube.com/@drake/videos"]);
    }

    #[test]
    fn test_channel_videos_respect_cap() {
        let mut nodes = vec![FakeNode::new(CHANNEL_NAME)];
        nodes.extend((0..20).map(|i| channel_item(i, Some("10 views"))));
        let page = FakePage::new(nodes).lazy(6, 5);
        let mut capped = settings();
        capped.max_videos = 8;

        let videos = find_channel_videos(&page, "https://www.youtube.com/@x", &capped, None).unwrap();
        assert_eq!(videos.len(), 8);
    }

    #[test]
    fn test_channel_screenshot_taken_after_load() {
        let page = FakePage::new(vec![FakeNode::new(CHANNEL_NAME)]);
        let path = Path::new("/tmp/shots/Drake.png");
        find_channel_videos(&page, "https://www.youtube.com/@drake", &settings(), Some(path)).unwrap();
        assert_eq!(page.screenshots(), vec![path.to_path_buf()]);
    }

    #[test]
    fn test_music_videos_strip_params() {
        let page = FakePage::new(vec![music_card("a", "2.5M views"), music_card("b", "3K views")]);
        let videos = find_music_videos(&page, "Drake", Duration::from_millis(10)).unwrap();

        assert_eq!(videos.len(), 2);
        assert_eq!(videos[0].url, "https://www.youtube.com/watch?v=a");
        assert_eq!(videos[0].views, 2_500_000);
        assert_eq!(videos[1].title, "Hit b");
    }

    #[test]
    fn test_music_videos_absent_is_empty() {
        let page = FakePage::new(Vec::new());
        let videos = find_music_videos(&page, "Drake", Duration::from_millis(10)).unwrap();
        assert!(videos.is_empty());
    }

    #[test]
    fn test_merge_sources_dedups_by_url() {
        let channel = vec![
            VideoCandidate::new("https://v/1", "one", 1).unwrap(),
            VideoCandidate::new("https://v/2", "two", 2).unwrap(),
        ];
        let music = vec![
            VideoCandidate::new("https://v/2", "two (music)", 2).unwrap(),
            VideoCandidate::new("https://v/3", "three", 3).unwrap(),
        ];
        let merged = merge_sources(channel, music);
        let titles: Vec<&str> = merged.iter().map(|v| v.title.as_str()).collect();
        assert_eq!(titles, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_pipeline_uses_one_session_per_attempt() {
        let launcher = FakeLauncher::new(|_| {
            Ok(FakePage::new(vec![
                FakeNode::new(CHANNEL_NAME),
                channel_item(1, Some("5 views")),
                music_card("1", "5 views"),
                music_card("9", "7 views"),
            ]))
        });
        let pipeline = VideoPipeline::new(launcher, settings(), None);
        let artist = Artist {
            id: 1,
            name: "Drake".into(),
            spotify_uri: "spotify:artist:d".into(),
            youtube_url: Some("https://www.youtube.com/@drake".into()),
            updated_at: NEVER_UPDATED.into(),
        };

        let videos = pipeline.acquire(&artist).unwrap();
        let urls: Vec<&str> = videos.iter().map(|v| v.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://www.youtube.com/watch?v=1", "https://www.youtube.com/watch?v=9"]
        );
        assert_eq!(pipeline.launcher.opened(), 1);
        assert_eq!(pipeline.launcher.released(), 1);
    }

    #[test]
    fn test_pipeline_requires_channel() {
        let launcher = FakeLauncher::new(|_| Ok(FakePage::new(Vec::new())));
        let pipeline = VideoPipeline::new(launcher, settings(), None);
        let artist = Artist {
            id: 1,
            name: "Unknown".into(),
            spotify_uri: "spotify:artist:u".into(),
            youtube_url: None,
            updated_at: NEVER_UPDATED.into(),
        };
        assert!(matches!(pipeline.acquire(&artist), Err(ScrapeError::Config(_))));
        assert_eq!(pipeline.launcher.opened(), 0);
    }
}
