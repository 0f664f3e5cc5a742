//! Runtime configuration loaded from an optional YAML file.
//!
//! Every field has a default, so an absent file (or a file setting only a few
//! keys) is valid. Command-line flags override what is loaded here.
//!
//! ```yaml
//! browser:
//!   headless: true
//!   window_width: 2560
//!   window_height: 1440
//!   extra_args: ["--lang=en-US"]
//! videos:
//!   max_videos: 400
//! run:
//!   workers: 3
//! ```

use crate::error::{Result, ScrapeError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

/// Launch options for one headless browser session.
///
/// Passed explicitly to every session; there is no process-wide browser state.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub mute_audio: bool,
    pub disable_gpu: bool,
    /// Seconds an idle browser is kept alive by the driver.
    pub idle_browser_timeout_secs: u64,
    pub extra_args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 2560,
            window_height: 1440,
            mute_audio: true,
            disable_gpu: true,
            idle_browser_timeout_secs: 120,
            extra_args: Vec::new(),
        }
    }
}

impl BrowserConfig {
    /// Extra command-line switches handed to Chrome.
    pub fn chrome_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.mute_audio {
            args.push("--mute-audio".to_string());
        }
        if self.disable_gpu {
            args.push("--disable-gpu".to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChannelSettings {
    pub load_wait_secs: u64,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self { load_wait_secs: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct VideoSettings {
    pub max_videos: usize,
    pub idle_wait_secs: u64,
    pub load_wait_secs: u64,
    pub include_music_videos: bool,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            max_videos: 800,
            idle_wait_secs: 10,
            load_wait_secs: 10,
            include_music_videos: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CommentSettings {
    pub max_comments: usize,
    pub idle_wait_secs: u64,
    /// Pause after navigation before polling starts.
    pub settle_secs: u64,
}

impl Default for CommentSettings {
    fn default() -> Self {
        Self {
            max_comments: 1000,
            idle_wait_secs: 15,
            settle_secs: 5,
        }
    }
}

/// Orchestration tunables shared by every tool.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RunSettings {
    pub max_retries: usize,
    pub workers: usize,
    pub passes: usize,
    pub target_timeout_secs: u64,
    /// Base delay between retry attempts; zero disables backoff.
    pub retry_base_delay_ms: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            workers: 5,
            passes: 3,
            target_timeout_secs: 100,
            retry_base_delay_ms: 0,
        }
    }
}

impl RunSettings {
    pub fn target_timeout(&self) -> Duration {
        Duration::from_secs(self.target_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub browser: BrowserConfig,
    pub channels: ChannelSettings,
    pub videos: VideoSettings,
    pub comments: CommentSettings,
    pub run: RunSettings,
}

impl ScraperConfig {
    /// Load from `path`, or fall back to defaults when no path is given.
    #[instrument(level = "info")]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ScrapeError::Config(format!("{}: {e}", path.display())))?;
        let config = Self::from_yaml(&raw)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).map_err(|e| ScrapeError::Config(e.to_string()))
    }
}
