//! SQLite persistence for artists, videos and comments.
//!
//! The store wraps a single [`Connection`] and is the only writer. Every
//! reconciliation commit (new rows plus the parent's `updated_at`) runs inside
//! one transaction, so a failed target never leaves a partial write behind.

use crate::error::Result;
use crate::models::{
    Artist, ChannelCandidate, Comment, CommentCandidate, NEVER_UPDATED, NewArtist,
    TIMESTAMP_FORMAT, Video, VideoCandidate,
};
use crate::reconcile::new_records;
use chrono::{NaiveDateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, instrument};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS artist (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    spotify_uri TEXT NOT NULL,
    youtube_url TEXT,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS video (
    id INTEGER PRIMARY KEY,
    artist_id INTEGER NOT NULL,
    title TEXT NOT NULL,
    youtube_url TEXT NOT NULL,
    views BIGINT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (artist_id) REFERENCES artist (id)
);

CREATE TABLE IF NOT EXISTS comment (
    id INTEGER PRIMARY KEY,
    video_id INTEGER NOT NULL,
    content TEXT NOT NULL,
    language TEXT,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (video_id) REFERENCES video (id)
);

CREATE INDEX IF NOT EXISTS idx_artist_spotify ON artist (spotify_uri);
CREATE INDEX IF NOT EXISTS idx_video_artist ON video (artist_id);
CREATE INDEX IF NOT EXISTS idx_comment_video ON comment (video_id);
";

const ARTIST_COLUMNS: &str = "id, name, spotify_uri, youtube_url, updated_at";
const VIDEO_COLUMNS: &str = "id, artist_id, title, youtube_url, views, updated_at";
const COMMENT_COLUMNS: &str = "id, video_id, content, language, updated_at";

/// Current UTC time in the `updated_at` column format.
pub fn now_timestamp() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

fn artist_from_row(row: &Row<'_>) -> rusqlite::Result<Artist> {
    Ok(Artist {
        id: row.get(0)?,
        name: row.get(1)?,
        spotify_uri: row.get(2)?,
        youtube_url: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn video_from_row(row: &Row<'_>) -> rusqlite::Result<Video> {
    Ok(Video {
        id: row.get(0)?,
        artist_id: row.get(1)?,
        title: row.get(2)?,
        youtube_url: row.get(3)?,
        views: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        video_id: row.get(1)?,
        content: row.get(2)?,
        language: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if necessary) the database at `path` and ensure the schema.
    #[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path.as_ref())?;
        let store = Self::init(conn)?;
        info!(path = %path.as_ref().display(), "Connected to database");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    // ---- artists ----

    pub fn all_artists(&self) -> Result<Vec<Artist>> {
        self.query_artists(&format!("SELECT {ARTIST_COLUMNS} FROM artist ORDER BY id"), [])
    }

    pub fn artist_by_id(&self, id: i64) -> Result<Option<Artist>> {
        let artist = self
            .conn
            .query_row(
                &format!("SELECT {ARTIST_COLUMNS} FROM artist WHERE id = ?1"),
                params![id],
                artist_from_row,
            )
            .optional()?;
        if artist.is_none() {
            debug!(artist_id = id, "No artist found");
        }
        Ok(artist)
    }

    /// The artist row for an external identifier.
    ///
    /// Duplicate identifiers are tolerated on read; the oldest row wins.
    pub fn artist_by_spotify(&self, spotify_uri: &str) -> Result<Option<Artist>> {
        find_by_spotify(&self.conn, spotify_uri)
    }

    /// Artists with no channel yet, or every artist when `include_known` is set.
    pub fn artists_for_channel_discovery(&self, include_known: bool) -> Result<Vec<Artist>> {
        if include_known {
            return self.all_artists();
        }
        self.query_artists(
            &format!("SELECT {ARTIST_COLUMNS} FROM artist WHERE youtube_url IS NULL ORDER BY id"),
            [],
        )
    }

    /// Artists with a channel whose videos were last reconciled before `cutoff`,
    /// plus those with a channel but no stored videos yet.
    pub fn artists_stale_since(&self, cutoff: NaiveDateTime) -> Result<Vec<Artist>> {
        let cutoff = cutoff.format(TIMESTAMP_FORMAT).to_string();
        self.query_artists(
            &format!(
                "SELECT {ARTIST_COLUMNS} FROM artist
                 WHERE youtube_url IS NOT NULL
                   AND (updated_at < ?1
                        OR NOT EXISTS (SELECT 1 FROM video WHERE video.artist_id = artist.id))
                 ORDER BY id"
            ),
            params![cutoff],
        )
    }

    /// Insert an artist unless one with the same external identifier exists.
    ///
    /// Returns the row and whether it was newly created.
    #[instrument(level = "debug", skip(self))]
    pub fn ensure_artist(
        &mut self,
        name: &str,
        spotify_uri: &str,
        youtube_url: Option<&str>,
    ) -> Result<(Artist, bool)> {
        let tx = self.conn.transaction()?;
        if let Some(existing) = find_by_spotify(&tx, spotify_uri)? {
            return Ok((existing, false));
        }
        let artist = insert_artist(&tx, name, spotify_uri, youtube_url, NEVER_UPDATED)?;
        tx.commit()?;
        Ok((artist, true))
    }

    /// [`ensure_artist`](Self::ensure_artist) for a batch, all in one transaction.
    ///
    /// Either every new artist is written or, on error, none is. Returns the
    /// number created.
    #[instrument(level = "debug", skip_all, fields(artists = artists.len()))]
    pub fn ensure_artists(&mut self, artists: &[NewArtist]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut created = 0usize;
        for new in artists {
            if let Some(existing) = find_by_spotify(&tx, &new.spotify_uri)? {
                debug!(id = existing.id, spotify_uri = %new.spotify_uri, "Artist already known; skipping");
                continue;
            }
            insert_artist(
                &tx,
                &new.name,
                &new.spotify_uri,
                new.youtube_url.as_deref(),
                NEVER_UPDATED,
            )?;
            created += 1;
        }
        tx.commit()?;
        Ok(created)
    }

    /// Record a discovered channel for an artist and stamp it as reconciled.
    ///
    /// An existing channel is replaced only when `overwrite` is set. Returns
    /// whether the stored channel changed.
    #[instrument(level = "debug", skip(self, candidate), fields(url = %candidate.url))]
    pub fn commit_channel(
        &mut self,
        artist_id: i64,
        candidate: &ChannelCandidate,
        overwrite: bool,
        now: &str,
    ) -> Result<bool> {
        let tx = self.conn.transaction()?;
        let changed = set_channel(&tx, artist_id, candidate, overwrite)?;
        touch(&tx, "artist", artist_id, now)?;
        tx.commit()?;
        debug!(artist_id, changed, "Committed channel");
        Ok(changed)
    }

    /// Record a channel found for an artist that may not be stored yet.
    ///
    /// A missing artist is created together with its channel, already stamped
    /// with `now`. A known one is handled as in
    /// [`commit_channel`](Self::commit_channel). Returns the artist id and
    /// whether anything changed.
    #[instrument(level = "debug", skip(self, candidate), fields(url = %candidate.url))]
    pub fn commit_discovered_artist(
        &mut self,
        name: &str,
        spotify_uri: &str,
        candidate: &ChannelCandidate,
        overwrite: bool,
        now: &str,
    ) -> Result<(i64, bool)> {
        let tx = self.conn.transaction()?;
        let (id, changed) = match find_by_spotify(&tx, spotify_uri)? {
            Some(existing) => {
                let changed = set_channel(&tx, existing.id, candidate, overwrite)?;
                touch(&tx, "artist", existing.id, now)?;
                (existing.id, changed)
            }
            None => {
                let artist = insert_artist(&tx, name, spotify_uri, Some(&candidate.url), now)?;
                (artist.id, true)
            }
        };
        tx.commit()?;
        debug!(artist_id = id, changed, "Committed discovered artist");
        Ok((id, changed))
    }

    // ---- videos ----

    pub fn video_by_id(&self, id: i64) -> Result<Option<Video>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {VIDEO_COLUMNS} FROM video WHERE id = ?1"),
                params![id],
                video_from_row,
            )
            .optional()?)
    }

    pub fn videos_by_artist(&self, artist_id: i64) -> Result<Vec<Video>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {VIDEO_COLUMNS} FROM video WHERE artist_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![artist_id], video_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Insert the videos not yet stored for `artist_id` and stamp the artist.
    ///
    /// Returns the number of inserted rows.
    #[instrument(level = "debug", skip(self, candidates), fields(candidates = candidates.len()))]
    pub fn commit_videos(
        &mut self,
        artist_id: i64,
        candidates: Vec<VideoCandidate>,
        now: &str,
    ) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let known = keys(&tx, "SELECT youtube_url FROM video WHERE artist_id = ?1", artist_id)?;
        let delta = new_records(candidates, &known);
        {
            let mut insert = tx.prepare(
                "INSERT INTO video (artist_id, title, youtube_url, views, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for video in &delta {
                insert.execute(params![artist_id, video.title, video.url, video.views, NEVER_UPDATED])?;
            }
        }
        touch(&tx, "artist", artist_id, now)?;
        tx.commit()?;
        debug!(artist_id, inserted = delta.len(), "Saved videos");
        Ok(delta.len())
    }

    // ---- comments ----

    pub fn comments_by_video(&self, video_id: i64) -> Result<Vec<Comment>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comment WHERE video_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![video_id], comment_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Insert the comments not yet stored for `video_id` and stamp the video.
    #[instrument(level = "debug", skip(self, candidates), fields(candidates = candidates.len()))]
    pub fn commit_comments(
        &mut self,
        video_id: i64,
        candidates: Vec<CommentCandidate>,
        now: &str,
    ) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let known = keys(&tx, "SELECT content FROM comment WHERE video_id = ?1", video_id)?;
        let delta = new_records(candidates, &known);
        {
            let mut insert = tx.prepare(
                "INSERT INTO comment (video_id, content, language, updated_at)
                 VALUES (?1, ?2, NULL, ?3)",
            )?;
            for comment in &delta {
                insert.execute(params![video_id, comment.content, NEVER_UPDATED])?;
            }
        }
        touch(&tx, "video", video_id, now)?;
        tx.commit()?;
        debug!(video_id, inserted = delta.len(), "Saved comments");
        Ok(delta.len())
    }

    fn query_artists<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Artist>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, artist_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn find_by_spotify(conn: &Connection, spotify_uri: &str) -> Result<Option<Artist>> {
    Ok(conn
        .query_row(
            &format!("SELECT {ARTIST_COLUMNS} FROM artist WHERE spotify_uri = ?1 ORDER BY id LIMIT 1"),
            params![spotify_uri],
            artist_from_row,
        )
        .optional()?)
}

fn insert_artist(
    tx: &Transaction<'_>,
    name: &str,
    spotify_uri: &str,
    youtube_url: Option<&str>,
    updated_at: &str,
) -> Result<Artist> {
    tx.execute(
        "INSERT INTO artist (name, spotify_uri, youtube_url, updated_at) VALUES (?1, ?2, ?3, ?4)",
        params![name, spotify_uri, youtube_url, updated_at],
    )?;
    let id = tx.last_insert_rowid();
    debug!(artist_id = id, name, spotify_uri, "Saved artist");
    Ok(Artist {
        id,
        name: name.to_string(),
        spotify_uri: spotify_uri.to_string(),
        youtube_url: youtube_url.map(str::to_string),
        updated_at: updated_at.to_string(),
    })
}

/// Set the artist's channel if it has none, or unconditionally with `overwrite`.
fn set_channel(
    tx: &Transaction<'_>,
    artist_id: i64,
    candidate: &ChannelCandidate,
    overwrite: bool,
) -> Result<bool> {
    let current: Option<String> = tx.query_row(
        "SELECT youtube_url FROM artist WHERE id = ?1",
        params![artist_id],
        |r| r.get(0),
    )?;
    let known: HashSet<String> = current.iter().cloned().collect();
    match new_records(vec![candidate.clone()], &known).into_iter().next() {
        Some(fresh) if current.is_none() || overwrite => {
            tx.execute(
                "UPDATE artist SET youtube_url = ?1 WHERE id = ?2",
                params![fresh.url, artist_id],
            )?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn keys(tx: &Transaction<'_>, sql: &str, parent_id: i64) -> Result<HashSet<String>> {
    let mut stmt = tx.prepare(sql)?;
    let rows = stmt.query_map(params![parent_id], |r| r.get::<_, String>(0))?;
    Ok(rows.collect::<rusqlite::Result<HashSet<_>>>()?)
}

/// Stamp a parent row. Fails if the row does not exist.
fn touch(tx: &Transaction<'_>, table: &str, id: i64, now: &str) -> Result<()> {
    let updated = tx.execute(
        &format!("UPDATE {table} SET updated_at = ?1 WHERE id = ?2"),
        params![now, id],
    )?;
    if updated == 0 {
        return Err(rusqlite::Error::QueryReturnedNoRows.into());
    }
    Ok(())
}
