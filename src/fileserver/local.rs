//! Local directory backing a file server.
//!
//! Request paths are relative to a configurable root directory.  Paths that
//! climb out of the root (`..`), absolute paths, and the reserved `.tmp`
//! scratch directory are rejected.
//!
//! All writes follow crash-only design: write to temp file, fsync, rename.

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use crate::errors::FileServerError;
use crate::protocol::DirEntry;

/// Scratch directory for atomic writes, directly under the root.
const TMP_DIR: &str = ".tmp";

#[derive(Debug, Clone)]
pub struct LocalDirectory {
    root: PathBuf,
}

impl LocalDirectory {
    /// Create a new `LocalDirectory` rooted at `root`.
    ///
    /// The directory will be created if it does not exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, FileServerError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        std::fs::create_dir_all(root.join(TMP_DIR))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a request path to an absolute path under the root.
    ///
    /// An empty path (or `.`) names the root itself.
    fn resolve(&self, path: &str) -> Result<PathBuf, FileServerError> {
        let invalid = || FileServerError::InvalidPath {
            path: path.to_string(),
        };
        let mut resolved = self.root.clone();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => {
                    if resolved == self.root && part == TMP_DIR {
                        return Err(invalid());
                    }
                    resolved.push(part);
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(invalid());
                }
            }
        }
        Ok(resolved)
    }

    /// Resolve a path that must name something other than the root.
    fn resolve_entry(&self, path: &str) -> Result<PathBuf, FileServerError> {
        let resolved = self.resolve(path)?;
        if resolved == self.root {
            return Err(FileServerError::InvalidPath {
                path: path.to_string(),
            });
        }
        Ok(resolved)
    }

    fn temp_path(&self) -> PathBuf {
        let id = uuid::Uuid::new_v4();
        self.root.join(TMP_DIR).join(format!("tmp-{}", id))
    }

    /// Create `path` and any missing parents.
    pub fn make_directory(&self, path: &str, mode: u32) -> Result<(), FileServerError> {
        let dir = self.resolve_entry(path)?;
        std::fs::create_dir_all(&dir)?;
        apply_mode(&dir, mode)?;
        Ok(())
    }

    /// Remove `path` and everything under it.
    ///
    /// Idempotent: removing a directory that does not exist succeeds.
    pub fn remove_directory(&self, path: &str) -> Result<(), FileServerError> {
        let dir = self.resolve_entry(path)?;
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the contents of `path` with `data`, creating parents.
    pub fn write_file(&self, path: &str, data: &[u8], mode: u32) -> Result<(), FileServerError> {
        let final_path = self.resolve_entry(path)?;
        if let Some(parent) = final_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Crash-only: temp-fsync-rename pattern.
        let tmp_path = self.temp_path();
        let result = (|| -> std::io::Result<()> {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(data)?;
            file.sync_all()?;
            apply_mode(&tmp_path, mode)?;
            std::fs::rename(&tmp_path, &final_path)
        })();
        if result.is_err() {
            let _ = std::fs::remove_file(&tmp_path);
        }
        result.map_err(FileServerError::from)
    }

    /// Remove the file at `path`. Idempotent.
    pub fn remove_file(&self, path: &str) -> Result<(), FileServerError> {
        let file = self.resolve_entry(path)?;
        match std::fs::remove_file(&file) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Entries of the directory at `path`, sorted by name.
    pub fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, FileServerError> {
        let dir = self.resolve(path)?;
        let at_root = dir == self.root;
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if at_root && name == TMP_DIR {
                continue;
            }
            let meta = entry.metadata()?;
            entries.push(DirEntry {
                name,
                is_dir: meta.is_dir(),
                size: if meta.is_dir() { 0 } else { meta.len() },
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    if mode == 0 {
        return Ok(());
    }
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}
