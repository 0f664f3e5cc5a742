//! Channel discovery from the search results page.
//!
//! Searches for `"<artist> music"` and takes the first channel link, preferring
//! the sidebar (knowledge panel) over the top search result.

use super::{absolutize, search_url};
use crate::browser::{Launcher, Node, Page, wait_for_any};
use crate::config::ChannelSettings;
use crate::error::{Result, ScrapeError};
use crate::models::{Artist, ChannelCandidate};
use crate::orchestrator::Pipeline;
use crate::store::Store;
use std::time::Duration;
use tracing::{debug, info, instrument};

const SIDEBAR_ANCHOR: &str = ".ytd-secondary-search-container-renderer a";
const TOP_RESULT_ANCHOR: &str = "a.channel-link";

/// Find the channel URL for `artist_name` on a search results page.
#[instrument(level = "info", skip(page))]
pub fn find_channel<P: Page>(page: &P, artist_name: &str, wait: Duration) -> Result<ChannelCandidate> {
    page.goto(&search_url(&format!("{artist_name} music")))?;

    let anchor = wait_for_any(page, &[SIDEBAR_ANCHOR, TOP_RESULT_ANCHOR], wait)?;
    let href = anchor
        .attr("href")?
        .ok_or_else(|| ScrapeError::unexpected_empty("channel link href"))?;
    let url = absolutize(&href)?;
    debug!(%url, "Found channel");

    ChannelCandidate::new(url).ok_or_else(|| ScrapeError::unexpected_empty("channel link href"))
}

/// An artist whose channel is looked up.
///
/// `artist_id` is `None` for an artist not stored yet; it is only written once
/// its channel has been found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTarget {
    pub artist_id: Option<i64>,
    pub name: String,
    pub spotify_uri: String,
}

impl ChannelTarget {
    pub fn unsaved(name: &str, spotify_uri: &str) -> Self {
        Self {
            artist_id: None,
            name: name.to_string(),
            spotify_uri: spotify_uri.to_string(),
        }
    }
}

impl From<Artist> for ChannelTarget {
    fn from(artist: Artist) -> Self {
        Self {
            artist_id: Some(artist.id),
            name: artist.name,
            spotify_uri: artist.spotify_uri,
        }
    }
}

/// Discovers and stores channel references for artists.
pub struct ChannelPipeline<L> {
    launcher: L,
    settings: ChannelSettings,
    overwrite: bool,
}

impl<L: Launcher> ChannelPipeline<L> {
    pub fn new(launcher: L, settings: ChannelSettings, overwrite: bool) -> Self {
        Self {
            launcher,
            settings,
            overwrite,
        }
    }
}

impl<L: Launcher> Pipeline for ChannelPipeline<L> {
    type Target = ChannelTarget;
    type Record = ChannelCandidate;
    const KIND: &'static str = "channels";

    fn label(&self, artist: &ChannelTarget) -> String {
        artist.name.clone()
    }

    fn acquire(&self, artist: &ChannelTarget) -> Result<Vec<ChannelCandidate>> {
        let page = self.launcher.open()?;
        let wait = Duration::from_secs(self.settings.load_wait_secs);
        Ok(vec![find_channel(&page, &artist.name, wait)?])
    }

    fn persist(
        &self,
        store: &mut Store,
        artist: &ChannelTarget,
        records: Vec<ChannelCandidate>,
        now: &str,
    ) -> Result<usize> {
        let candidate = records
            .into_iter()
            .next()
            .ok_or_else(|| ScrapeError::unexpected_empty("channel"))?;
        let changed = match artist.artist_id {
            Some(id) => store.commit_channel(id, &candidate, self.overwrite, now)?,
            None => {
                let (id, changed) = store.commit_discovered_artist(
                    &artist.name,
                    &artist.spotify_uri,
                    &candidate,
                    self.overwrite,
                    now,
                )?;
                info!(artist_id = id, name = %artist.name, "Added artist");
                changed
            }
        };
        Ok(usize::from(changed))
    }
}
