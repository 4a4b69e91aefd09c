//! Text storage capability.
//!
//! The applier never touches the filesystem directly; it goes through a
//! [`TextStorage`]. [`FsStorage`] is the real thing, [`MemoryStorage`] backs
//! unit tests, and [`OverlayStorage`] stages writes over another storage for
//! previews.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Read/write access to whole text files.
pub trait TextStorage {
    fn exists(&self, path: &Path) -> bool;

    /// Read the full content as UTF-8. Decode failures are `InvalidData` errors.
    fn read(&self, path: &Path) -> io::Result<String>;

    /// Replace the full content of `path`.
    fn write(&mut self, path: &Path, text: &str) -> io::Result<()>;

    fn remove(&mut self, path: &Path) -> io::Result<()>;
}

/// Filesystem storage with atomic writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsStorage;

impl TextStorage for FsStorage {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn write(&mut self, path: &Path, text: &str) -> io::Result<()> {
        atomic_write(path, text.as_bytes())
    }

    fn remove(&mut self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full write succeeds or the target is left untouched.
fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    // Same directory so the rename stays on one filesystem
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) => Path::new("."),
        None => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Path has no parent directory",
            ))
        }
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;

    // Keep the original permissions; NamedTempFile is created 0600
    if let Ok(metadata) = fs::metadata(path) {
        temp.as_file().set_permissions(metadata.permissions())?;
    }

    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// In-memory storage keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    files: HashMap<PathBuf, String>,
    writes: usize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        self.files.insert(path.into(), text.into());
        self
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&str> {
        self.files.get(path.as_ref()).map(String::as_str)
    }

    /// Number of successful `write` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes
    }
}

impl TextStorage for MemoryStorage {
    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    fn read(&self, path: &Path) -> io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such file: {}", path.display()),
            )
        })
    }

    fn write(&mut self, path: &Path, text: &str) -> io::Result<()> {
        self.files.insert(path.to_path_buf(), text.to_string());
        self.writes += 1;
        Ok(())
    }

    fn remove(&mut self, path: &Path) -> io::Result<()> {
        self.files.remove(path).map(|_| ()).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such file: {}", path.display()),
            )
        })
    }
}

/// Copy-on-write view over a read-only base storage.
///
/// Writes and removals are staged in memory and never reach the base, while
/// reads see the staged state first. A preview of several manifests run over
/// one overlay sees each file exactly as the real run would.
#[derive(Debug)]
pub struct OverlayStorage<'a, S: ?Sized> {
    base: &'a S,
    staged: HashMap<PathBuf, String>,
    removed: HashSet<PathBuf>,
}

impl<'a, S: TextStorage + ?Sized> OverlayStorage<'a, S> {
    pub fn new(base: &'a S) -> Self {
        Self {
            base,
            staged: HashMap::new(),
            removed: HashSet::new(),
        }
    }
}

impl<S: TextStorage + ?Sized> TextStorage for OverlayStorage<'_, S> {
    fn exists(&self, path: &Path) -> bool {
        self.staged.contains_key(path) || (!self.removed.contains(path) && self.base.exists(path))
    }

    fn read(&self, path: &Path) -> io::Result<String> {
        if let Some(text) = self.staged.get(path) {
            return Ok(text.clone());
        }
        if self.removed.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such file: {}", path.display()),
            ));
        }
        self.base.read(path)
    }

    fn write(&mut self, path: &Path, text: &str) -> io::Result<()> {
        self.removed.remove(path);
        self.staged.insert(path.to_path_buf(), text.to_string());
        Ok(())
    }

    fn remove(&mut self, path: &Path) -> io::Result<()> {
        if !self.exists(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such file: {}", path.display()),
            ));
        }
        self.staged.remove(path);
        self.removed.insert(path.to_path_buf());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_write_replaces_content() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("App.tsx");
        fs::write(&file_path, "original content").unwrap();

        let mut storage = FsStorage;
        storage.write(&file_path, "modified content").unwrap();

        assert_eq!(fs::read_to_string(&file_path).unwrap(), "modified content");
    }

    #[test]
    #[cfg(unix)]
    fn test_atomic_write_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("App.tsx");
        fs::write(&file_path, "x").unwrap();
        fs::set_permissions(&file_path, fs::Permissions::from_mode(0o644)).unwrap();

        FsStorage.write(&file_path, "y").unwrap();

        let mode = fs::metadata(&file_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn test_fs_read_rejects_invalid_utf8() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("binary.tsx");
        fs::write(&file_path, [0xff, 0xfe, 0x00]).unwrap();

        let err = FsStorage.read(&file_path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_fs_exists_ignores_directories() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(!FsStorage.exists(temp_dir.path()));
    }

    #[test]
    fn test_memory_storage_roundtrip() {
        let mut storage = MemoryStorage::new().with_file("a.tsx", "one");
        assert!(storage.exists(Path::new("a.tsx")));
        storage.write(Path::new("a.tsx"), "two").unwrap();
        assert_eq!(storage.get("a.tsx"), Some("two"));
        assert_eq!(storage.write_count(), 1);
        storage.remove(Path::new("a.tsx")).unwrap();
        assert!(!storage.exists(Path::new("a.tsx")));
    }

    #[test]
    fn test_overlay_stages_writes() {
        let base = MemoryStorage::new().with_file("a.tsx", "one");
        let mut overlay = OverlayStorage::new(&base);

        overlay.write(Path::new("a.tsx"), "two").unwrap();
        overlay.write(Path::new("b.tsx"), "new").unwrap();

        assert_eq!(overlay.read(Path::new("a.tsx")).unwrap(), "two");
        assert!(overlay.exists(Path::new("b.tsx")));
        assert_eq!(base.get("a.tsx"), Some("one"));
        assert!(!base.exists(Path::new("b.tsx")));
        assert_eq!(base.write_count(), 0);
    }

    #[test]
    fn test_overlay_remove_hides_base_file() {
        let base = MemoryStorage::new().with_file("a.tsx", "one");
        let mut overlay = OverlayStorage::new(&base);

        overlay.remove(Path::new("a.tsx")).unwrap();

        assert!(!overlay.exists(Path::new("a.tsx")));
        assert!(overlay.read(Path::new("a.tsx")).is_err());
        assert!(overlay.remove(Path::new("a.tsx")).is_err());
        assert!(base.exists(Path::new("a.tsx")));
    }
}
