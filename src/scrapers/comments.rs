//! Comment collection from a video's watch page.

use crate::browser::{Launcher, Node, Page, ScrollPoller};
use crate::config::CommentSettings;
use crate::error::{Result, ScrapeError};
use crate::models::{CommentCandidate, Video};
use crate::orchestrator::Pipeline;
use crate::store::Store;
use crate::utils::truncate_for_log;
use once_cell::sync::Lazy;
use regex::Regex;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, instrument};

const COMMENT_TEXT: &str = "#content-text";
const MESSAGE_RENDERER: &str = "ytd-message-renderer";
const COMMENT_COUNT: &str = "#count .count-text";
const COMMENTS_DISABLED: &str = "comments are turned off";

static LEADING_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d[\d,]*)").expect("valid comment count regex"));

/// Why a watch page legitimately shows no comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoComments {
    Disabled,
    ZeroReported,
}

/// Check the page for an explicit "no comments" signal.
fn explain_empty<P: Page>(page: &P) -> Result<Option<NoComments>> {
    for message in page.query_all(MESSAGE_RENDERER)? {
        if message.text()?.to_lowercase().contains(COMMENTS_DISABLED) {
            return Ok(Some(NoComments::Disabled));
        }
    }
    if let Some(count) = page.query_all(COMMENT_COUNT)?.into_iter().next() {
        let text = count.text()?;
        let reported = LEADING_NUMBER
            .captures(&text)
            .and_then(|c| c[1].replace(',', "").parse::<u64>().ok());
        if reported == Some(0) {
            return Ok(Some(NoComments::ZeroReported));
        }
    }
    Ok(None)
}

/// Collect comment texts for the video at `url`.
///
/// An empty result is only returned when the page says comments are disabled
/// or reports a count of zero; otherwise it is treated as a failed load.
#[instrument(level = "info", skip(page, settings))]
pub fn find_comments<P: Page>(page: &P, url: &str, settings: &CommentSettings) -> Result<Vec<CommentCandidate>> {
    page.goto(url)?;
    thread::sleep(Duration::from_secs(settings.settle_secs));

    let nodes = ScrollPoller::new(Duration::from_secs(settings.idle_wait_secs))
        .with_cap((settings.max_comments > 0).then_some(settings.max_comments))
        .collect(page, COMMENT_TEXT)?;

    if nodes.is_empty() {
        return match explain_empty(page)? {
            Some(reason) => {
                info!(?reason, "Video has no comments");
                Ok(Vec::new())
            }
            None => Err(ScrapeError::unexpected_empty("comments")),
        };
    }

    let mut comments = Vec::with_capacity(nodes.len());
    for node in &nodes {
        let text = node.text()?;
        match CommentCandidate::new(text) {
            Some(comment) => comments.push(comment),
            None => debug!("Skipping blank comment"),
        }
    }
    if let Some(first) = comments.first() {
        debug!(first = %truncate_for_log(&first.content, 80), "First comment");
    }
    info!(count = comments.len(), "Read comments");
    Ok(comments)
}

/// Collects and stores comments for videos.
pub struct CommentPipeline<L> {
    launcher: L,
    settings: CommentSettings,
}

impl<L: Launcher> CommentPipeline<L> {
    pub fn new(launcher: L, settings: CommentSettings) -> Self {
        Self { launcher, settings }
    }
}

impl<L: Launcher> Pipeline for CommentPipeline<L> {
    type Target = Video;
    type Record = CommentCandidate;
    const KIND: &'static str = "comments";

    fn label(&self, video: &Video) -> String {
        format!("{} ({})", video.title, video.youtube_url)
    }

    fn acquire(&self, video: &Video) -> Result<Vec<CommentCandidate>> {
        let page = self.launcher.open()?;
        find_comments(&page, &video.youtube_url, &self.settings)
    }

    fn persist(
        &self,
        store: &mut Store,
        video: &Video,
        records: Vec<CommentCandidate>,
        now: &str,
    ) -> Result<usize> {
        store.commit_comments(video.id, records, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{FakeLauncher, FakeNode, FakePage};

    const URL: &str = "https://www.youtube.com/watch?v=abc";

    fn quick() -> CommentSettings {
        CommentSettings {
            max_comments: 0,
            idle_wait_secs: 0,
            settle_secs: 0,
        }
    }

    fn comment(text: &str) -> FakeNode {
        FakeNode::new("ytd-comment-thread-renderer").child(FakeNode::new(COMMENT_TEXT).text(text))
    }

    #[test]
    fn test_collects_comments_in_page_order() {
        let page = FakePage::new(vec![comment("first!"), comment("  "), comment("great song")]);
        let comments = find_comments(&page, URL, &quick()).unwrap();

        let texts: Vec<&str> = comments.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(texts, vec!["first!", "great song"]);
        assert_eq!(page.visited(), vec![URL]);
    }

    #[test]
    fn test_cap_limits_comments() {
        let nodes = (0..30).map(|i| comment(&format!("c{i}"))).collect();
        let page = FakePage::new(nodes).lazy(10, 10);
        let mut settings = quick();
        settings.max_comments = 15;

        let comments = find_comments(&page, URL, &settings).unwrap();
        assert_eq!(comments.len(), 15);
        assert_eq!(comments[14].content, "c14");
    }

    #[test]
    fn test_disabled_comments_are_empty() {
        let page = FakePage::new(vec![
            FakeNode::new(MESSAGE_RENDERER).text("Comments are turned off. Learn more"),
        ]);
        assert!(find_comments(&page, URL, &quick()).unwrap().is_empty());
    }

    #[test]
    fn test_zero_reported_comments_are_empty() {
        let page = FakePage::new(vec![FakeNode::new(COMMENT_COUNT).text("0 Comments")]);
        assert!(find_comments(&page, URL, &quick()).unwrap().is_empty());
    }

    #[test]
    fn test_unexplained_empty_is_an_error() {
        let page = FakePage::new(vec![FakeNode::new(COMMENT_COUNT).text("1,204 Comments")]);
        let err = find_comments(&page, URL, &quick()).unwrap_err();
        assert!(matches!(err, ScrapeError::UnexpectedEmpty { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_pipeline_persists_delta_only() {
        let launcher = FakeLauncher::new(|_| Ok(FakePage::new(vec![comment("a"), comment("b")])));
        let pipeline = CommentPipeline::new(launcher, quick());
        let mut store = Store::open_in_memory().unwrap();
        let (artist, _) = store.ensure_artist("Drake", "spotify:artist:d", None).unwrap();
        store
            .commit_videos(
                artist.id,
                vec![crate::models::VideoCandidate::new(URL, "Song", 10).unwrap()],
                "2026-10-16 00:00:00",
            )
            .unwrap();
        let video = store.videos_by_artist(artist.id).unwrap().remove(0);

        let first = pipeline.acquire(&video).unwrap();
        assert_eq!(pipeline.persist(&mut store, &video, first, "2026-10-16 01:00:00").unwrap(), 2);
        let second = pipeline.acquire(&video).unwrap();
        assert_eq!(pipeline.persist(&mut store, &video, second, "2026-10-16 02:00:00").unwrap(), 0);

        assert_eq!(store.comments_by_video(video.id).unwrap().len(), 2);
        assert_eq!(
            store.video_by_id(video.id).unwrap().unwrap().updated_at,
            "2026-10-16 02:00:00"
        );
        assert_eq!(pipeline.launcher.released(), 2);
    }
}
