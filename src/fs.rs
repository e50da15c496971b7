use crate::error::AppError;
use crate::templates::TemplateEngine;
use crate::utils::display_location;
use chrono::{DateTime, Local};
use log::debug;
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// One child of a listed directory, captured at listing time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: SystemTime,
}

/// Everything needed to render one index page.
#[derive(Debug, Clone)]
pub struct ListingPage {
    pub title: String,
    /// Decoded request location of the directory, `""` for the root.
    pub location: String,
    pub entries: Vec<DirectoryEntry>,
}

impl ListingPage {
    /// Lists `path` and orders the entries for display.
    pub fn build(path: &Path, location: &str) -> Result<Self, AppError> {
        Ok(Self {
            title: display_location(location).to_string(),
            location: location.to_string(),
            entries: order_entries(read_entries(path)?),
        })
    }
}

/// Reads the immediate children of `path` in enumeration order.
///
/// Only directories and regular files are returned. Entry metadata does not
/// follow symlinks, so links are left out like other special files.
pub fn read_entries(path: &Path) -> Result<Vec<DirectoryEntry>, AppError> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        // Symlinks and special files are never served, so they are not offered either.
        if !metadata.is_dir() && !metadata.is_file() {
            continue;
        }
        entries.push(DirectoryEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir: metadata.is_dir(),
            size: metadata.len(),
            modified: metadata.modified().unwrap_or(UNIX_EPOCH),
        });
    }
    Ok(entries)
}

/// Directories first, then files; each group stably sorted by case-insensitive name.
pub fn order_entries(entries: Vec<DirectoryEntry>) -> Vec<DirectoryEntry> {
    let (mut dirs, mut files): (Vec<_>, Vec<_>) =
        entries.into_iter().partition(|entry| entry.is_dir);
    // sort_by_cached_key is stable: equal names keep their enumeration order
    dirs.sort_by_cached_key(|entry| entry.name.to_uppercase());
    files.sort_by_cached_key(|entry| entry.name.to_uppercase());
    dirs.extend(files);
    dirs
}

/// Local time, second precision.
pub fn format_modified(time: SystemTime) -> String {
    DateTime::<Local>::from(time)
        .format("%Y-%m-%d %H:%M:%S %z")
        .to_string()
}

/// Lists `path` and renders its index page fully into memory.
pub fn generate_directory_listing(path: &Path, location: &str) -> Result<Vec<u8>, AppError> {
    debug!("Generating directory listing for: '{}'", path.display());
    let page = ListingPage::build(path, location)?;
    let engine = TemplateEngine::new()?;
    Ok(engine.render_directory_listing(&page)?.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, is_dir: bool) -> DirectoryEntry {
        DirectoryEntry {
            name: name.to_string(),
            is_dir,
            size: 0,
            modified: UNIX_EPOCH,
        }
    }

    fn names(entries: &[DirectoryEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_directories_precede_files() {
        let ordered = order_entries(vec![
            entry("a.txt", false),
            entry("Sub", true),
            entry("B.txt", false),
            entry("alpha", true),
        ]);
        assert_eq!(names(&ordered), ["alpha", "Sub", "a.txt", "B.txt"]);
    }

    #[test]
    fn test_case_insensitive_ties_keep_enumeration_order() {
        let ordered = order_entries(vec![
            entry("readme", false),
            entry("README", false),
            entry("Readme", false),
            entry("a", false),
        ]);
        assert_eq!(names(&ordered), ["a", "readme", "README", "Readme"]);
    }

    #[test]
    fn test_format_modified_is_stable_width() {
        let early = format_modified(UNIX_EPOCH);
        let later = format_modified(UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000));
        assert_eq!(early.len(), later.len());
    }

    #[cfg(unix)]
    #[test]
    fn test_read_entries_skips_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("real.txt"), b"abc").unwrap();
        fs::create_dir(dir.path().join("inner")).unwrap();
        std::os::unix::fs::symlink("real.txt", dir.path().join("alias.txt")).unwrap();
        std::os::unix::fs::symlink("missing", dir.path().join("dangling")).unwrap();

        let ordered = order_entries(read_entries(dir.path()).unwrap());
        assert_eq!(names(&ordered), ["inner", "real.txt"]);
        assert_eq!(ordered[1].size, 3);
    }
}
