//! Working tree service
//!
//! Maps the user-visible working directory (`<repo>/current/`) to and from
//! tree objects. Every caller-supplied path is validated: after lexical
//! normalization it must remain under the working root, otherwise the
//! operation fails with `PathOutsideRoot`. Memory files live in the three
//! class directories (`episodic/`, `semantic/`, `procedural/`) but any
//! relative path is accepted.

use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use derive_new::new;
use walkdir::WalkDir;

use crate::errors::{Error, Result};

/// File metadata captured at staging time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub mtime: DateTime<Utc>,
}

/// Working directory manager rooted at `<repo>/current`.
#[derive(Debug, new)]
pub struct Workspace {
    /// Path to the working root
    path: Box<Path>,
}

impl Workspace {
    pub fn root(&self) -> &Path {
        &self.path
    }

    /// Validate a repo-relative path and resolve it under the root.
    ///
    /// Rejects absolute paths, `.`/`..` components, empty paths, and
    /// anything that would escape the working root after normalization.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let outside = || Error::PathOutsideRoot {
            path: PathBuf::from(relative),
        };

        if relative.is_empty() || relative.contains('\0') {
            return Err(outside());
        }

        let candidate = Path::new(relative);
        if candidate.is_absolute() {
            return Err(outside());
        }
        for component in candidate.components() {
            match component {
                Component::Normal(part) => {
                    if part.to_str().is_none() {
                        return Err(outside());
                    }
                }
                // `.` and `..` never appear in canonical repo paths
                _ => return Err(outside()),
            }
        }

        Ok(self.path.join(candidate))
    }

    /// Normalize an on-disk path back to the repo-relative `/` form.
    pub fn relativize(&self, path: &Path) -> Result<String> {
        let relative = path.strip_prefix(&self.path).map_err(|_| Error::PathOutsideRoot {
            path: path.to_path_buf(),
        })?;
        Ok(relative.to_string_lossy().replace('\\', "/"))
    }

    pub fn exists(&self, relative: &str) -> Result<bool> {
        Ok(self.resolve(relative)?.exists())
    }

    pub fn read_file(&self, relative: &str) -> Result<Bytes> {
        let path = self.resolve(relative)?;
        let raw = std::fs::read(&path)
            .map_err(|_| Error::not_found(format!("working file {relative}")))?;
        Ok(Bytes::from(raw))
    }

    pub fn write_file(&self, relative: &str, content: &[u8]) -> Result<()> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Remove a file, pruning directories it leaves empty.
    pub fn remove_file(&self, relative: &str) -> Result<()> {
        let path = self.resolve(relative)?;
        if path.exists() {
            std::fs::remove_file(&path)?;
            self.prune_empty_dirs(path.parent());
        }
        Ok(())
    }

    fn prune_empty_dirs(&self, start: Option<&Path>) {
        let mut current = start;
        while let Some(dir) = current {
            if dir == self.path.as_ref() || !dir.starts_with(&self.path) {
                break;
            }
            match dir.read_dir() {
                Ok(mut entries) => {
                    if entries.next().is_none() {
                        if std::fs::remove_dir(dir).is_err() {
                            break;
                        }
                    } else {
                        break;
                    }
                }
                _ => break,
            }
            current = dir.parent();
        }
    }

    /// File size and mtime for staging metadata.
    pub fn stat(&self, relative: &str) -> Result<FileStat> {
        let path = self.resolve(relative)?;
        let metadata = std::fs::metadata(&path)
            .map_err(|_| Error::not_found(format!("working file {relative}")))?;
        let mtime: DateTime<Utc> = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Ok(FileStat {
            size: metadata.len(),
            mtime,
        })
    }

    /// All files under the working root, repo-relative, sorted.
    pub fn list_files(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        if !self.path.exists() {
            return Ok(files);
        }
        for entry in WalkDir::new(&self.path).into_iter().filter_map(|e| e.ok()) {
            if entry.path().is_file() {
                files.push(self.relativize(entry.path())?);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Files on disk that are neither tracked nor staged.
    pub fn untracked(&self, known: &HashSet<String>) -> Result<Vec<String>> {
        Ok(self
            .list_files()?
            .into_iter()
            .filter(|path| !known.contains(path))
            .collect())
    }

    /// Replace the working tree's tracked content.
    ///
    /// # Arguments
    ///
    /// * `previous` - paths tracked before the switch; those absent from
    ///   `target` are deleted (untracked files are left alone)
    /// * `target` - path → content to materialize
    pub fn apply_tree(
        &self,
        previous: &BTreeMap<String, Bytes>,
        target: &BTreeMap<String, Bytes>,
    ) -> Result<()> {
        for path in previous.keys() {
            if !target.contains_key(path) {
                self.remove_file(path)?;
            }
        }
        for (path, content) in target {
            self.write_file(path, content)?;
        }
        Ok(())
    }
}
