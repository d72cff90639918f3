#![forbid(unsafe_code)]

//! Maps a playlist entry to the folder it occupies on disk.

use log::debug;

use crate::catalog::Catalog;
use crate::error::{BsmhError, Result};
use crate::playlist::PlaylistEntry;

/// Characters the game and common filesystems refuse in folder names.
const RESERVED: &[char] = &['<', '>', ':', '/', '\\', '|', '?', '*', '"'];

/// Display fields that name a map's folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapIdentity {
    pub key: String,
    pub display_name: String,
    pub author_name: String,
}

impl MapIdentity {
    /// `"<key> (<name> - <author>)"` with reserved and control characters removed.
    pub fn folder_name(&self) -> String {
        local_folder_name(&self.key, &self.display_name, &self.author_name)
    }
}

pub fn local_folder_name(key: &str, display_name: &str, author_name: &str) -> String {
    strip_reserved(&format!("{key} ({display_name} - {author_name})"))
}

/// Drops every reserved punctuation character and C0 control code.
pub fn strip_reserved(value: &str) -> String {
    value
        .chars()
        .filter(|c| !RESERVED.contains(c) && !matches!(*c, '\u{0}'..='\u{1f}'))
        .collect()
}

/// Uses the entry's own key and author when both are present and non-blank;
/// otherwise the catalog is asked. Lookups that come back without a key or
/// author are reported as [`BsmhError::MissingField`].
pub fn resolve_identity(catalog: &impl Catalog, entry: &PlaylistEntry) -> Result<MapIdentity> {
    if let (Some(key), Some(author_name)) = (filled(&entry.key), filled(&entry.author_name)) {
        return Ok(MapIdentity {
            key: key.clone(),
            display_name: entry.display_name.clone(),
            author_name: author_name.clone(),
        });
    }

    debug!("enriching {} from the catalog", entry.content_hash);
    let remote = catalog.fetch_by_hash(&entry.content_hash)?;
    if remote.key.trim().is_empty() {
        return Err(BsmhError::MissingField {
            hash: entry.content_hash.clone(),
            field: "key",
        });
    }
    if remote.author_name.trim().is_empty() {
        return Err(BsmhError::MissingField {
            hash: entry.content_hash.clone(),
            field: "author name",
        });
    }
    Ok(MapIdentity {
        key: remote.key,
        display_name: entry.display_name.clone(),
        author_name: remote.author_name,
    })
}

fn filled(value: &Option<String>) -> Option<&String> {
    value.as_ref().filter(|value| !value.trim().is_empty())
}
