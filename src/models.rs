//! Persisted rows and freshly scraped candidate records.
//!
//! Rows ([`Artist`], [`Video`], [`Comment`]) mirror the three SQLite tables.
//! Candidates ([`ChannelCandidate`], [`VideoCandidate`], [`CommentCandidate`])
//! are what the scrapers produce before reconciliation; they carry no surrogate
//! ids and are validated on construction.

use crate::reconcile::NaturalKey;

/// Timestamp given to rows that have never been reconciled.
pub const NEVER_UPDATED: &str = "2001-01-01 00:00:00";

/// Format used for every `updated_at` column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artist {
    pub id: i64,
    pub name: String,
    /// External music-service identifier, e.g. `spotify:artist:3TVXtAsR1Inumwj472S9r4`.
    pub spotify_uri: String,
    /// Channel reference; `None` until discovered.
    pub youtube_url: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Video {
    pub id: i64,
    pub artist_id: i64,
    pub title: String,
    pub youtube_url: String,
    pub views: i64,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: i64,
    pub video_id: i64,
    pub content: String,
    pub language: Option<String>,
    pub updated_at: String,
}

/// An artist to be stored if its Spotify id is not known yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewArtist {
    pub name: String,
    pub spotify_uri: String,
    pub youtube_url: Option<String>,
}

impl NewArtist {
    pub fn new(name: &str, spotify_uri: &str, youtube_url: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            spotify_uri: spotify_uri.to_string(),
            youtube_url: youtube_url.map(str::to_string),
        }
    }
}

/// A channel URL found by channel discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCandidate {
    pub url: String,
}

impl ChannelCandidate {
    pub fn new(url: impl Into<String>) -> Option<Self> {
        let url = url.into();
        let url = url.trim();
        if url.is_empty() {
            return None;
        }
        Some(Self {
            url: url.to_string(),
        })
    }
}

/// A video listed on a channel page or in the search sidebar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoCandidate {
    pub url: String,
    pub title: String,
    pub views: i64,
}

impl VideoCandidate {
    pub fn new(url: impl Into<String>, title: impl Into<String>, views: i64) -> Option<Self> {
        let url = url.into();
        if url.trim().is_empty() || views < 0 {
            return None;
        }
        Some(Self {
            url: url.trim().to_string(),
            title: title.into().trim().to_string(),
            views,
        })
    }
}

/// The raw text of one comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentCandidate {
    pub content: String,
}

impl CommentCandidate {
    /// Comment text is its natural key, so it is kept exactly as scraped.
    pub fn new(content: impl Into<String>) -> Option<Self> {
        let content = content.into();
        if content.trim().is_empty() {
            return None;
        }
        Some(Self { content })
    }
}

impl NaturalKey for ChannelCandidate {
    fn natural_key(&self) -> &str {
        &self.url
    }
}

impl NaturalKey for VideoCandidate {
    fn natural_key(&self) -> &str {
        &self.url
    }
}

impl NaturalKey for CommentCandidate {
    fn natural_key(&self) -> &str {
        &self.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_reject_blank_keys() {
        assert!(ChannelCandidate::new("   ").is_none());
        assert!(VideoCandidate::new("", "title", 10).is_none());
        assert!(VideoCandidate::new("https://x/watch?v=1", "title", -1).is_none());
        assert!(CommentCandidate::new("\n ").is_none());
    }

    #[test]
    fn test_comment_text_kept_verbatim() {
        let c = CommentCandidate::new("  spaced out  ").unwrap();
        assert_eq!(c.natural_key(), "  spaced out  ");
    }

    #[test]
    fn test_video_candidate_trims() {
        let v = VideoCandidate::new(" https://x/watch?v=1 ", " Song ", 5).unwrap();
        assert_eq!(v.url, "https://x/watch?v=1");
        assert_eq!(v.title, "Song");
    }
}
