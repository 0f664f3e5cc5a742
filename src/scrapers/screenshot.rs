//! Diagnostic screenshots of channel pages.

use super::open_channel_page;
use crate::browser::{Launcher, Page};
use crate::error::{Result, ScrapeError};
use crate::retry::with_retries;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

/// Load a channel page and write a PNG of it to `path`.
pub fn capture_channel<P: Page>(page: &P, url: &str, path: &Path, wait: Duration) -> Result<()> {
    open_channel_page(page, url, wait)?;
    page.screenshot(path)?;
    info!(%url, path = %path.display(), "Saved screenshot");
    Ok(())
}

/// [`capture_channel`] in a fresh session per attempt, retried on failure.
#[instrument(level = "info", skip(launcher))]
pub async fn screenshot_with_retries<L: Launcher>(
    launcher: Arc<L>,
    url: String,
    path: PathBuf,
    wait: Duration,
    max_attempts: usize,
) -> Result<()> {
    with_retries(max_attempts, Duration::ZERO, || {
        let launcher = Arc::clone(&launcher);
        let url = url.clone();
        let path = path.clone();
        async move {
            tokio::task::spawn_blocking(move || {
                let page = launcher.open()?;
                capture_channel(&page, &url, &path, wait)
            })
            .await
            .map_err(|e| ScrapeError::Session(format!("screenshot task failed: {e}")))?
        }
    })
    .await
}
