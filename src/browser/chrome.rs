//! Headless Chrome implementation of [`Page`] via `headless_chrome`.

use super::{Launcher, Node, Page};
use crate::config::BrowserConfig;
use crate::error::{Result, ScrapeError};
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, trace};

/// Launches a fresh Chrome process for every session.
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    config: BrowserConfig,
}

impl ChromeLauncher {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }
}

impl Launcher for ChromeLauncher {
    type Page = ChromePage;

    fn open(&self) -> Result<ChromePage> {
        ChromePage::launch(&self.config)
    }
}

/// One tab in a browser process owned by this value.
///
/// Dropping the page closes the tab and kills the browser.
pub struct ChromePage {
    tab: Arc<Tab>,
    _browser: Browser,
    opened: Instant,
}

impl ChromePage {
    #[instrument(level = "debug", skip_all, fields(headless = config.headless))]
    pub fn launch(config: &BrowserConfig) -> Result<Self> {
        let args = config.chrome_args();
        let os_args: Vec<&OsStr> = args.iter().map(OsStr::new).collect();

        let options = LaunchOptions::default_builder()
            .headless(config.headless)
            .window_size(Some((config.window_width, config.window_height)))
            .idle_browser_timeout(Duration::from_secs(config.idle_browser_timeout_secs))
            .args(os_args)
            .build()
            .map_err(|e| ScrapeError::Session(e.to_string()))?;

        let browser = Browser::new(options)?;
        let tab = browser.new_tab()?;
        debug!("Browser session opened");
        Ok(Self {
            tab,
            _browser: browser,
            opened: Instant::now(),
        })
    }
}

impl Drop for ChromePage {
    fn drop(&mut self) {
        debug!(
            alive_ms = self.opened.elapsed().as_millis() as u64,
            "Browser session released"
        );
    }
}

impl Page for ChromePage {
    type Node<'a> = ChromeNode<'a>;

    fn goto(&self, url: &str) -> Result<()> {
        self.tab.navigate_to(url)?;
        self.tab.wait_until_navigated()?;
        Ok(())
    }

    fn query_all(&self, selector: &str) -> Result<Vec<ChromeNode<'_>>> {
        // The driver reports "no match" as an error. A dead session surfaces
        // on the next navigation or key press instead.
        match self.tab.find_elements(selector) {
            Ok(elements) => Ok(elements.into_iter().map(ChromeNode).collect()),
            Err(e) => {
                trace!(selector, error = %e, "No elements matched");
                Ok(Vec::new())
            }
        }
    }

    fn wait_for(&self, selector: &str, timeout: Duration) -> Result<ChromeNode<'_>> {
        self.tab
            .wait_for_element_with_custom_timeout(selector, timeout)
            .map(ChromeNode)
            .map_err(|_| ScrapeError::not_found(selector, timeout))
    }

    fn scroll_to_end(&self) -> Result<()> {
        self.tab.press_key("End")?;
        Ok(())
    }

    fn screenshot(&self, path: &Path) -> Result<()> {
        let png = self
            .tab
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)?;
        std::fs::write(path, png)?;
        debug!(path = %path.display(), "Saved screenshot");
        Ok(())
    }
}

pub struct ChromeNode<'a>(Element<'a>);

impl Node for ChromeNode<'_> {
    fn text(&self) -> Result<String> {
        Ok(self.0.get_inner_text()?)
    }

    fn attr(&self, name: &str) -> Result<Option<String>> {
        // Attributes come back as a flat [name, value, name, value, ...] list.
        let attributes = self.0.get_attributes()?.unwrap_or_default();
        Ok(attributes
            .chunks(2)
            .find(|pair| pair.first().is_some_and(|n| n == name))
            .and_then(|pair| pair.get(1).cloned()))
    }

    fn find(&self, selector: &str) -> Option<Self> {
        self.0.find_element(selector).ok().map(ChromeNode)
    }

    fn click(&self) -> Result<()> {
        self.0.click()?;
        Ok(())
    }
}
