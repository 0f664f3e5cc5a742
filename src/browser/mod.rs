//! Browser abstraction used by every scraper.
//!
//! The scrapers only talk to the [`Page`] and [`Node`] traits. The production
//! implementation in [`chrome`] drives a headless Chrome through
//! `headless_chrome`; tests use an in-memory page.
//!
//! A [`Launcher`] opens one page per acquisition attempt. The returned page
//! owns its browser process and tears it down when dropped, so a session is
//! released on every exit path of the attempt, including errors and panics.

pub mod chrome;
pub mod poller;

#[cfg(test)]
pub(crate) mod fake;

use crate::error::Result;
use std::path::Path;
use std::time::Duration;

pub use chrome::{ChromeLauncher, ChromePage};
pub use poller::{ScrollPoller, wait_for_any};

/// A live, navigable page.
pub trait Page {
    type Node<'a>: Node
    where
        Self: 'a;

    /// Navigate and wait for the navigation to finish.
    fn goto(&self, url: &str) -> Result<()>;

    /// Every element currently matching `selector`, in document order.
    ///
    /// No match is an empty vector, not an error.
    fn query_all(&self, selector: &str) -> Result<Vec<Self::Node<'_>>>;

    /// Wait up to `timeout` for the first element matching `selector`.
    ///
    /// Fails with [`ScrapeError::NotFound`](crate::error::ScrapeError::NotFound).
    fn wait_for(&self, selector: &str, timeout: Duration) -> Result<Self::Node<'_>>;

    /// Simulate an end-of-page key press to trigger lazy loading.
    fn scroll_to_end(&self) -> Result<()>;

    /// Write a PNG of the current viewport to `path`.
    fn screenshot(&self, path: &Path) -> Result<()>;
}

/// An element handle on a [`Page`].
pub trait Node: Sized {
    fn text(&self) -> Result<String>;
    fn attr(&self, name: &str) -> Result<Option<String>>;
    /// First descendant matching `selector`.
    fn find(&self, selector: &str) -> Option<Self>;
    fn click(&self) -> Result<()>;
}

/// Opens one browser session per call.
pub trait Launcher: Send + Sync + 'static {
    type Page: Page;

    fn open(&self) -> Result<Self::Page>;
}
