//! Incremental loading of infinite-scroll pages.

use super::Page;
use crate::error::{Result, ScrapeError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

const SCROLL_PAUSE: Duration = Duration::from_millis(100);
const WAIT_POLL: Duration = Duration::from_millis(100);

/// Wait until one of `selectors` matches and return its first element.
///
/// When several match on the same poll, the earliest selector in the slice
/// wins. Fails with [`ScrapeError::NotFound`] once `timeout` has passed.
pub fn wait_for_any<'p, P: Page>(
    page: &'p P,
    selectors: &[&str],
    timeout: Duration,
) -> Result<P::Node<'p>> {
    let deadline = Instant::now() + timeout;
    loop {
        for selector in selectors {
            if let Some(node) = page.query_all(selector)?.into_iter().next() {
                trace!(selector, "Selector matched");
                return Ok(node);
            }
        }
        if Instant::now() >= deadline {
            return Err(ScrapeError::not_found(&selectors.join(", "), timeout));
        }
        thread::sleep(WAIT_POLL);
    }
}

/// Scrolls a page until its element count stops growing or reaches a cap.
///
/// The idle clock measures time since the count last *changed*, not total
/// elapsed time: a slow page that keeps growing is never cut short, and a
/// page where the selector never matches stops once `idle` has passed.
#[derive(Debug, Clone)]
pub struct ScrollPoller {
    idle: Duration,
    cap: Option<usize>,
    pause: Duration,
}

impl ScrollPoller {
    pub fn new(idle: Duration) -> Self {
        Self {
            idle,
            cap: None,
            pause: SCROLL_PAUSE,
        }
    }

    pub fn with_cap(mut self, cap: Option<usize>) -> Self {
        self.cap = cap;
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Collect every element matching `selector`, scrolling between polls.
    ///
    /// Returns at most `cap` elements when a cap is set.
    pub fn collect<'p, P: Page>(&self, page: &'p P, selector: &str) -> Result<Vec<P::Node<'p>>> {
        let started = Instant::now();
        let mut last_len: Option<usize> = None;
        let mut last_change = Instant::now();

        loop {
            let mut elements = page.query_all(selector)?;
            let len = elements.len();

            if let Some(cap) = self.cap {
                if len >= cap {
                    elements.truncate(cap);
                    debug!(
                        selector,
                        cap,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Reached element cap"
                    );
                    return Ok(elements);
                }
            }

            if last_len == Some(len) {
                if last_change.elapsed() > self.idle {
                    debug!(
                        selector,
                        count = len,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Element count stable; done scrolling"
                    );
                    return Ok(elements);
                }
            } else {
                trace!(selector, count = len, "Element count changed");
                last_change = Instant::now();
            }
            last_len = Some(len);

            page.scroll_to_end()?;
            thread::sleep(self.pause);
        }
    }
}
