//! YouTube scrapers for channels, videos and comments.
//!
//! Each scraper follows the same two-layer pattern:
//!
//! 1. **Extraction**: a function generic over [`Page`] that drives one page and
//!    turns DOM nodes into candidate records
//! 2. **Pipeline**: an [`orchestrator::Pipeline`](crate::orchestrator::Pipeline)
//!    that opens a fresh session per attempt, runs the extraction and commits
//!    the reconciled delta
//!
//! | Content | Module | Source page | Empty result |
//! |---------|--------|-------------|--------------|
//! | Channel | [`channel`] | Search results | `NotFound` |
//! | Videos | [`videos`] | `<channel>/videos` + search sidebar | allowed |
//! | Comments | [`comments`] | Watch page | allowed only if disabled or reported zero |
//!
//! The selectors target YouTube's current markup and are the first thing to
//! check when a scraper starts failing.

pub mod channel;
pub mod comments;
pub mod screenshot;
pub mod videos;

use crate::browser::{Node, Page, wait_for_any};
use crate::error::{Result, ScrapeError};
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const BASE_URL: &str = "https://www.youtube.com";
pub const SEARCH_URL: &str = "https://www.youtube.com/results?search_query=";

pub(crate) const COOKIES_REJECT: &str = "button[aria-label='Reject all']";
pub(crate) const CHANNEL_NAME: &str = "#channel-name";

/// Search results URL for a free-text query.
pub fn search_url(query: &str) -> String {
    format!("{SEARCH_URL}{}", urlencoding::encode(query))
}

/// Resolve a possibly relative `href` against the site root.
pub fn absolutize(href: &str) -> Result<String> {
    let base = Url::parse(BASE_URL).map_err(|e| ScrapeError::Config(e.to_string()))?;
    base.join(href.trim())
        .map(|u| u.to_string())
        .map_err(|e| ScrapeError::unexpected_empty(&format!("valid link in '{href}' ({e})")))
}

/// Click the cookie-consent "Reject all" button if it shows up within `wait`.
pub(crate) fn dismiss_consent<P: Page>(page: &P, wait: Duration) -> Result<()> {
    match wait_for_any(page, &[COOKIES_REJECT], wait) {
        Ok(button) => {
            button.click()?;
            debug!("Rejected cookie consent");
            Ok(())
        }
        Err(ScrapeError::NotFound { .. }) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Wait for a channel page to render, dismissing the consent dialog first.
pub(crate) fn open_channel_page<P: Page>(page: &P, url: &str, wait: Duration) -> Result<()> {
    page.goto(url)?;
    dismiss_consent(page, wait.min(Duration::from_secs(3)))?;
    page.wait_for(CHANNEL_NAME, wait)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{FakeNode, FakePage};

    #[test]
    fn test_search_url_encodes_query() {
        assert_eq!(
            search_url("Simon & Garfunkel music"),
            "https://www.youtube.com/results?search_query=Simon%20%26%20Garfunkel%20music"
        );
    }

    #[test]
    fn test_absolutize() {
        assert_eq!(
            absolutize("/@drake").unwrap(),
            "https://www.youtube.com/@drake"
        );
        assert_eq!(
            absolutize("https://platform.example/channel/xyz").unwrap(),
            "https://platform.example/channel/xyz"
        );
    }

    #[test]
    fn test_open_channel_page_without_consent_dialog() {
        let page = FakePage::new(vec![FakeNode::new(CHANNEL_NAME).text("Drake")]);
        open_channel_page(&page, "https://www.youtube.com/@drake", Duration::from_millis(20))
            .unwrap();
        assert_eq!(page.visited(), vec!["https://www.youtube.com/@drake"]);
    }

    #[test]
    fn test_open_channel_page_not_loaded() {
        let page = FakePage::new(Vec::new());
        let err = open_channel_page(&page, "https://www.youtube.com/@x", Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, ScrapeError::NotFound { .. }));
    }
}
