//! In-memory page used by unit tests.

use super::{Launcher, Node, Page};
use crate::error::{Result, ScrapeError};
use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct FakeNode {
    selectors: Vec<String>,
    text: String,
    attrs: Vec<(String, String)>,
    children: Vec<FakeNode>,
}

impl FakeNode {
    pub fn new(selector: &str) -> Self {
        Self {
            selectors: vec![selector.to_string()],
            ..Default::default()
        }
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.push((name.to_string(), value.to_string()));
        self
    }

    pub fn child(mut self, child: FakeNode) -> Self {
        self.children.push(child);
        self
    }

    fn matches(&self, selector: &str) -> bool {
        self.selectors.iter().any(|s| s == selector)
    }

    fn collect_matching(&self, selector: &str, out: &mut Vec<FakeNode>) {
        if self.matches(selector) {
            out.push(self.clone());
        }
        for child in &self.children {
            child.collect_matching(selector, out);
        }
    }
}

impl Node for FakeNode {
    fn text(&self) -> Result<String> {
        Ok(self.text.clone())
    }

    fn attr(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone()))
    }

    fn find(&self, selector: &str) -> Option<Self> {
        let mut found = Vec::new();
        for child in &self.children {
            child.collect_matching(selector, &mut found);
        }
        found.into_iter().next()
    }

    fn click(&self) -> Result<()> {
        Ok(())
    }
}

/// A page whose top-level nodes are revealed a few at a time on scroll.
pub struct FakePage {
    nodes: Vec<FakeNode>,
    revealed: Cell<usize>,
    per_scroll: usize,
    reveal_every: usize,
    scrolls: Cell<usize>,
    visited: RefCell<Vec<String>>,
    screenshots: RefCell<Vec<PathBuf>>,
    released: Option<Arc<AtomicUsize>>,
}

impl FakePage {
    pub fn new(nodes: Vec<FakeNode>) -> Self {
        let revealed = nodes.len();
        Self {
            nodes,
            revealed: Cell::new(revealed),
            per_scroll: 0,
            reveal_every: 1,
            scrolls: Cell::new(0),
            visited: RefCell::new(Vec::new()),
            screenshots: RefCell::new(Vec::new()),
            released: None,
        }
    }

    pub fn lazy(mut self, initial: usize, per_scroll: usize) -> Self {
        self.revealed = Cell::new(initial.min(self.nodes.len()));
        self.per_scroll = per_scroll;
        self
    }

    pub fn reveal_every(mut self, scrolls: usize) -> Self {
        self.reveal_every = scrolls.max(1);
        self
    }

    pub fn scrolls(&self) -> usize {
        self.scrolls.get()
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.borrow().clone()
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.screenshots.borrow().clone()
    }

    fn track_release(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.released = Some(counter);
        self
    }
}

impl Drop for FakePage {
    fn drop(&mut self) {
        if let Some(counter) = &self.released {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Page for FakePage {
    type Node<'a> = FakeNode;

    fn goto(&self, url: &str) -> Result<()> {
        self.visited.borrow_mut().push(url.to_string());
        Ok(())
    }

    fn query_all(&self, selector: &str) -> Result<Vec<FakeNode>> {
        let mut found = Vec::new();
        for node in self.nodes.iter().take(self.revealed.get()) {
            node.collect_matching(selector, &mut found);
        }
        Ok(found)
    }

    fn wait_for(&self, selector: &str, timeout: Duration) -> Result<FakeNode> {
        self.query_all(selector)?
            .into_iter()
            .next()
            .ok_or_else(|| ScrapeError::not_found(selector, timeout))
    }

    fn scroll_to_end(&self) -> Result<()> {
        let scrolls = self.scrolls.get() + 1;
        self.scrolls.set(scrolls);
        if scrolls % self.reveal_every == 0 {
            let next = (self.revealed.get() + self.per_scroll).min(self.nodes.len());
            self.revealed.set(next);
        }
        Ok(())
    }

    fn screenshot(&self, path: &Path) -> Result<()> {
        self.screenshots.borrow_mut().push(path.to_path_buf());
        Ok(())
    }
}

type PageFactory = Box<dyn Fn(usize) -> Result<FakePage> + Send + Sync>;

/// Hands out fake pages and counts how many were opened and released.
pub struct FakeLauncher {
    factory: PageFactory,
    opened: AtomicUsize,
    released: Arc<AtomicUsize>,
}

impl FakeLauncher {
    /// `factory` receives the zero-based index of the session being opened.
    pub fn new(factory: impl Fn(usize) -> Result<FakePage> + Send + Sync + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            opened: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl Launcher for FakeLauncher {
    type Page = FakePage;

    fn open(&self) -> Result<FakePage> {
        let index = self.opened.fetch_add(1, Ordering::SeqCst);
        let page = (self.factory)(index)?;
        Ok(page.track_release(Arc::clone(&self.released)))
    }
}
