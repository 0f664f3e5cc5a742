//! Seeding the artist table from a CSV export.
//!
//! The header row must name `name` and `spotify_uri` columns; `youtube_url` is
//! optional and any other column (such as an exported `id`) is ignored.

use crate::error::{Result, ScrapeError};
use crate::models::NewArtist;
use crate::store::Store;
use std::mem::take;
use std::path::Path;
use tracing::{info, instrument};

/// One parsed CSV record with the line it started on.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Row {
    line: usize,
    fields: Vec<String>,
}

/// Minimal CSV parser (quotes, doubled quotes, CRLF).
///
/// Blank lines are skipped. A quote left open at end of input is an error.
fn parse_rows(text: &str) -> Result<Vec<Row>> {
    let mut rows = Vec::new();
    let mut field = String::new();
    let mut fields = Vec::new();
    let mut in_quotes = false;
    let mut line = 1usize;
    let mut row_start = 1usize;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' if field.is_empty() => in_quotes = true,
            ',' if !in_quotes => fields.push(take(&mut field)),
            '\r' | '\n' if !in_quotes => {
                if ch == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                fields.push(take(&mut field));
                if !(fields.len() == 1 && fields[0].trim().is_empty()) {
                    rows.push(Row {
                        line: row_start,
                        fields: take(&mut fields),
                    });
                } else {
                    fields.clear();
                }
                line += 1;
                row_start = line;
            }
            c => {
                if c == '\n' {
                    line += 1;
                }
                field.push(c);
            }
        }
    }

    if in_quotes {
        return Err(ScrapeError::Import {
            line: row_start,
            message: "unterminated quoted field".into(),
        });
    }
    fields.push(field);
    if !(fields.len() == 1 && fields[0].trim().is_empty()) {
        rows.push(Row {
            line: row_start,
            fields,
        });
    }
    Ok(rows)
}

fn column(header: &Row, name: &str) -> Option<usize> {
    header
        .fields
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
}

/// Import every artist in `text`, skipping those whose Spotify id is known.
///
/// Returns the number of artists created.
#[instrument(level = "info", skip_all)]
pub fn import_artists(store: &mut Store, text: &str) -> Result<usize> {
    let mut rows = parse_rows(text)?.into_iter();
    let header = rows.next().ok_or_else(|| ScrapeError::Import {
        line: 1,
        message: "missing header row".into(),
    })?;

    let missing = |name: &str| ScrapeError::Import {
        line: header.line,
        message: format!("header has no '{name}' column"),
    };
    let name_col = column(&header, "name").ok_or_else(|| missing("name"))?;
    let uri_col = column(&header, "spotify_uri").ok_or_else(|| missing("spotify_uri"))?;
    let url_col = column(&header, "youtube_url");

    // Validate everything before writing, then commit the batch at once.
    let mut artists = Vec::new();
    for row in rows {
        let cell = |i: usize| row.fields.get(i).map(|s| s.trim()).unwrap_or("");
        let name = cell(name_col);
        let uri = cell(uri_col);
        if name.is_empty() || uri.is_empty() {
            return Err(ScrapeError::Import {
                line: row.line,
                message: "both 'name' and 'spotify_uri' are required".into(),
            });
        }
        let youtube_url = url_col.map(cell).filter(|u| !u.is_empty());
        artists.push(NewArtist::new(name, uri, youtube_url));
    }

    let imported = store.ensure_artists(&artists)?;
    info!(imported, skipped = artists.len() - imported, "Imported artists");
    Ok(imported)
}

/// [`import_artists`] from a file on disk.
pub fn import_artists_from_path(store: &mut Store, path: &Path) -> Result<usize> {
    let text = std::fs::read_to_string(path)?;
    import_artists(store, &text)
}
