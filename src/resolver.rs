//! Maps decoded request locations onto the served directory tree.

use crate::error::AppError;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// What a resolved path points at on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    NotFound,
    Directory,
    RegularFile,
    /// Symlinks, sockets, devices and the like. Served as not found.
    Other,
}

/// Joins a decoded location (`/a/b`) onto `root`.
///
/// Resolution is lexical: empty and `.` segments are skipped, `..` drops the
/// previous segment. A `..` that would climb above `root`, or a segment that
/// the platform would not treat as a single file name, is refused.
pub fn resolve(root: &Path, location: &str) -> Result<PathBuf, AppError> {
    let mut resolved = root.to_path_buf();
    let mut depth = 0usize;

    for segment in location.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if depth == 0 {
                    return Err(AppError::Forbidden);
                }
                resolved.pop();
                depth -= 1;
            }
            name => {
                let mut components = Path::new(name).components();
                match (components.next(), components.next()) {
                    (Some(Component::Normal(_)), None) => {}
                    _ => return Err(AppError::Forbidden),
                }
                resolved.push(name);
                depth += 1;
            }
        }
    }

    Ok(resolved)
}

/// Classifies `path` without following symlinks.
pub fn classify(path: &Path) -> Result<PathKind, AppError> {
    match fs::symlink_metadata(path) {
        Ok(metadata) => {
            let file_type = metadata.file_type();
            Ok(if file_type.is_dir() {
                PathKind::Directory
            } else if file_type.is_file() {
                PathKind::RegularFile
            } else {
                PathKind::Other
            })
        }
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
            Ok(PathKind::NotFound)
        }
        Err(e) => Err(AppError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_resolve_joins_segments() {
        let root = Path::new("/srv/files");
        assert_eq!(resolve(root, "").unwrap(), root);
        assert_eq!(resolve(root, "/a/b.txt").unwrap(), root.join("a").join("b.txt"));
        assert_eq!(resolve(root, "/a//./b").unwrap(), root.join("a").join("b"));
        assert_eq!(resolve(root, "/a/../b").unwrap(), root.join("b"));
    }

    #[test]
    fn test_resolve_refuses_to_leave_root() {
        let root = Path::new("/srv/files");
        assert!(matches!(resolve(root, "/.."), Err(AppError::Forbidden)));
        assert!(matches!(resolve(root, "/a/../../etc"), Err(AppError::Forbidden)));
    }

    #[test]
    fn test_classify() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        File::create(&file).unwrap();

        assert_eq!(classify(dir.path()).unwrap(), PathKind::Directory);
        assert_eq!(classify(&file).unwrap(), PathKind::RegularFile);
        assert_eq!(classify(&dir.path().join("missing")).unwrap(), PathKind::NotFound);
        assert_eq!(classify(&file.join("below-a-file")).unwrap(), PathKind::NotFound);
    }

    #[cfg(unix)]
    #[test]
    fn test_classify_symlink_as_other() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        File::create(&file).unwrap();
        let link = dir.path().join("link.txt");
        std::os::unix::fs::symlink(&file, &link).unwrap();

        assert_eq!(classify(&link).unwrap(), PathKind::Other);
    }
}
