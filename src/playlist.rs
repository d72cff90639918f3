#![forbid(unsafe_code)]

//! `.bplist` playlist documents and the builder that selects which listing
//! entries end up in them.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::catalog::ListingEntry;
use crate::error::{BsmhError, Result};
use crate::identity::strip_reserved;
use crate::window::cutoff_for;

pub const PLAYLIST_EXTENSION: &str = "bplist";
pub const PLAYLIST_AUTHOR: &str = "meh";
/// 1x1 transparent PNG; the game requires some cover image.
pub const PLAYLIST_IMAGE: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAAC0lEQVQYV2NgAAIAAAUAAarVyFEAAAAASUVORK5CYII=";

/// One song of a playlist. `key` and `author_name` are missing from files
/// written by the first release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    #[serde(rename = "hash")]
    pub content_hash: String,
    #[serde(rename = "songName")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(
        default,
        rename = "levelAuthorName",
        skip_serializing_if = "Option::is_none"
    )]
    pub author_name: Option<String>,
}

impl From<&ListingEntry> for PlaylistEntry {
    fn from(entry: &ListingEntry) -> Self {
        Self {
            content_hash: entry.content_hash.clone(),
            display_name: entry.display_name.clone(),
            key: present(&entry.key),
            author_name: present(&entry.author_name),
        }
    }
}

/// The listing decodes absent strings as empty ones; the playlist keeps them
/// absent so readers fall back to a lookup.
fn present(value: &str) -> Option<String> {
    (!value.trim().is_empty()).then(|| value.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistDocument {
    #[serde(rename = "playlistTitle")]
    pub title: String,
    #[serde(rename = "playlistAuthor", default)]
    pub author: String,
    #[serde(rename = "image", default)]
    pub cover_image: String,
    #[serde(rename = "songs", default)]
    pub entries: Vec<PlaylistEntry>,
}

impl PlaylistDocument {
    pub fn new(title: impl Into<String>, entries: Vec<PlaylistEntry>) -> Self {
        Self {
            title: title.into(),
            author: PLAYLIST_AUTHOR.to_string(),
            cover_image: PLAYLIST_IMAGE.to_string(),
            entries,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// File name the playlist is stored under inside its output directory.
    pub fn file_name(&self) -> String {
        format!("{}.{PLAYLIST_EXTENSION}", strip_reserved(&self.title))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read(path).map_err(|err| BsmhError::io(path, err))?;
        serde_json::from_slice(&raw).map_err(|source| BsmhError::Playlist {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes `<output_dir>/<title>.bplist`, creating the directory if needed.
    pub fn write(&self, output_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(output_dir).map_err(|err| BsmhError::io(output_dir, err))?;
        let path = output_dir.join(self.file_name());
        let payload = serde_json::to_vec(self).map_err(|source| BsmhError::Playlist {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, payload).map_err(|err| BsmhError::io(&path, err))?;
        debug!("wrote {} entries to {}", self.entries.len(), path.display());
        Ok(path)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub title: Option<String>,
    pub hours: u32,
    pub count: Option<usize>,
}

impl BuildOptions {
    pub fn resolved_title(&self) -> String {
        match (&self.title, self.count) {
            (Some(title), _) => title.clone(),
            (None, Some(count)) => format!("last_{count}_maps"),
            (None, None) => format!("last_{}h_maps", self.hours),
        }
    }
}

/// Selects the playlist entries out of the fetched listing.
///
/// Count mode keeps the first `count` entries in listing order. Hours mode
/// keeps entries uploaded strictly after `now - hours`. Repeated hashes, which
/// show up when uploads shift the pages between two fetches, keep only their
/// first occurrence.
pub fn build(
    entries: &[ListingEntry],
    options: &BuildOptions,
    now: DateTime<Utc>,
) -> Result<PlaylistDocument> {
    let mut seen = HashSet::new();
    let unique = entries
        .iter()
        .filter(|entry| seen.insert(entry.content_hash.as_str()));

    let selected: Vec<PlaylistEntry> = match options.count {
        Some(count) => unique.take(count).map(PlaylistEntry::from).collect(),
        None => {
            let cutoff = cutoff_for(options.hours, now)?;
            unique
                .filter(|entry| entry.uploaded_at > cutoff)
                .map(PlaylistEntry::from)
                .collect()
        }
    };

    Ok(PlaylistDocument::new(options.resolved_title(), selected))
}

/// Builds the playlist and writes it into `output_dir`. An empty selection
/// writes nothing and yields `None`.
pub fn build_and_write(
    entries: &[ListingEntry],
    options: &BuildOptions,
    now: DateTime<Utc>,
    output_dir: &Path,
) -> Result<Option<(PlaylistDocument, PathBuf)>> {
    let document = build(entries, options, now)?;
    if document.is_empty() {
        debug!("empty selection, no playlist written");
        return Ok(None);
    }
    let path = document.write(output_dir)?;
    Ok(Some((document, path)))
}
