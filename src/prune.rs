#![forbid(unsafe_code)]

//! Removes the maps of a playlist from the maps folder.

use std::fs;
use std::path::Path;

use log::{debug, warn};

use crate::archive::SkippedEntry;
use crate::catalog::Catalog;
use crate::error::{BsmhError, Result};
use crate::identity::resolve_identity;
use crate::playlist::{PlaylistDocument, PlaylistEntry};

#[derive(Debug, Default)]
pub struct PruneReport {
    pub removed: Vec<String>,
    pub absent: Vec<String>,
    pub skipped: Vec<SkippedEntry>,
}

impl PruneReport {
    pub fn summary(&self) -> String {
        format!(
            "{} removed, {} not present, {} skipped",
            self.removed.len(),
            self.absent.len(),
            self.skipped.len()
        )
    }
}

enum PruneOutcome {
    Removed,
    Absent,
}

/// Deletes `root/<folder>` for every entry. Folders that are already gone
/// count as success; entries whose folder name cannot be resolved are
/// skipped. Fails before touching anything when `root` does not exist.
pub fn prune(
    catalog: &impl Catalog,
    document: &PlaylistDocument,
    root: &Path,
) -> Result<PruneReport> {
    if !root.is_dir() {
        return Err(BsmhError::Config(format!(
            "maps directory {} does not exist",
            root.display()
        )));
    }

    let mut report = PruneReport::default();
    let total = document.entries.len();
    for (index, entry) in document.entries.iter().enumerate() {
        let current = index + 1;
        match prune_entry(catalog, entry, root) {
            Ok((folder, PruneOutcome::Removed)) => {
                println!("[{current}/{total}] Removed {folder}");
                report.removed.push(folder);
            }
            Ok((folder, PruneOutcome::Absent)) => {
                debug!("{folder} is not installed");
                report.absent.push(folder);
            }
            Err(err) if err.is_recoverable() => {
                eprintln!(
                    "[{current}/{total}] Warning: skipping {}: {err}",
                    entry.content_hash
                );
                warn!("skipped {}: {err}", entry.content_hash);
                report.skipped.push(SkippedEntry {
                    content_hash: entry.content_hash.clone(),
                    reason: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
    }
    Ok(report)
}

fn prune_entry(
    catalog: &impl Catalog,
    entry: &PlaylistEntry,
    root: &Path,
) -> Result<(String, PruneOutcome)> {
    let folder = resolve_identity(catalog, entry)?.folder_name();
    let target = root.join(&folder);
    if !target.exists() {
        return Ok((folder, PruneOutcome::Absent));
    }
    fs::remove_dir_all(&target).map_err(|err| BsmhError::io(&target, err))?;
    Ok((folder, PruneOutcome::Removed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fake::{FakeCatalog, entry};
    use chrono::Utc;
    use tempfile::tempdir;

    fn complete(hash: &str) -> PlaylistEntry {
        PlaylistEntry {
            content_hash: hash.into(),
            display_name: format!("Song {hash}"),
            key: Some(format!("k{hash}")),
            author_name: Some("Mapper".into()),
        }
    }

    fn install(root: &Path, folder: &str) {
        let dir = root.join(folder);
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("Info.dat"), "{}").unwrap();
        fs::write(dir.join("nested/cover.jpg"), "jpg").unwrap();
    }

    #[test]
    fn missing_root_is_a_config_error() {
        let dir = tempdir().unwrap();
        let doc = PlaylistDocument::new("t", vec![complete("aaa")]);
        let err = prune(&FakeCatalog::default(), &doc, &dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, BsmhError::Config(_)));
    }

    #[test]
    fn removes_installed_folders_recursively() {
        let dir = tempdir().unwrap();
        install(dir.path(), "kaaa (Song aaa - Mapper)");
        install(dir.path(), "unrelated");
        let doc = PlaylistDocument::new("t", vec![complete("aaa")]);

        let report = prune(&FakeCatalog::default(), &doc, dir.path()).unwrap();

        assert!(!dir.path().join("kaaa (Song aaa - Mapper)").exists());
        assert!(dir.path().join("unrelated").exists());
        assert_eq!(report.removed, vec!["kaaa (Song aaa - Mapper)".to_string()]);
    }

    #[test]
    fn absent_folders_are_a_no_op() {
        let dir = tempdir().unwrap();
        let doc = PlaylistDocument::new("t", vec![complete("aaa"), complete("bbb")]);

        let report = prune(&FakeCatalog::default(), &doc, dir.path()).unwrap();

        assert!(report.removed.is_empty());
        assert!(report.skipped.is_empty());
        assert_eq!(report.absent.len(), 2);
    }

    #[test]
    fn legacy_entries_use_catalog_lookup() {
        let dir = tempdir().unwrap();
        install(dir.path(), "kaaa (Old name - Mapper)");
        let catalog = FakeCatalog::with_entries(vec![entry("aaa", "Whatever", Utc::now())]);
        let doc = PlaylistDocument::new(
            "t",
            vec![PlaylistEntry {
                content_hash: "aaa".into(),
                display_name: "Old name".into(),
                key: None,
                author_name: None,
            }],
        );

        let report = prune(&catalog, &doc, dir.path()).unwrap();

        assert_eq!(report.removed.len(), 1);
        assert!(!dir.path().join("kaaa (Old name - Mapper)").exists());
    }

    #[test]
    fn unresolvable_entries_are_skipped() {
        let dir = tempdir().unwrap();
        install(dir.path(), "kbbb (Song bbb - Mapper)");
        let doc = PlaylistDocument::new(
            "t",
            vec![
                PlaylistEntry {
                    content_hash: "gone".into(),
                    display_name: "Gone".into(),
                    key: None,
                    author_name: None,
                },
                complete("bbb"),
            ],
        );

        let report = prune(&FakeCatalog::default(), &doc, dir.path()).unwrap();

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.removed.len(), 1);
        assert_eq!(report.summary(), "1 removed, 0 not present, 1 skipped");
    }
}
