//! Validated reference names
//!
//! Branch and tag names may contain `/` for hierarchy but must, once
//! resolved as a filesystem path under `refs/heads/` or `refs/tags/`,
//! remain inside that root. Validation therefore rejects anything that
//! could traverse upward or smuggle odd bytes into ref files.

use std::path::{Component, Path, PathBuf};

use crate::errors::{Error, Result};

/// A validated branch or tag name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefName(String);

impl RefName {
    /// Parse and validate a ref name.
    ///
    /// Rejected: empty names, `.` / `..` components, leading or trailing
    /// `/`, consecutive `/`, control bytes, whitespace, `\`, names ending
    /// in `.lock`, and the glob/range metacharacters `* : ? [ ^ ~`.
    pub fn try_parse(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let invalid = || Error::InvalidRefName { name: name.clone() };

        if name.is_empty() || name.starts_with('/') || name.ends_with('/') {
            return Err(invalid());
        }
        if name.ends_with(".lock") || name.contains("//") {
            return Err(invalid());
        }
        if name
            .chars()
            .any(|c| c.is_control() || c.is_whitespace() || "\\*:?[^~".contains(c))
        {
            return Err(invalid());
        }
        for component in name.split('/') {
            if component.is_empty() || component == "." || component == ".." {
                return Err(invalid());
            }
            if component.starts_with('.') {
                return Err(invalid());
            }
        }

        // belt and braces: the joined path must stay under the ref root
        let joined = Path::new("refs").join("heads").join(&name);
        if !Self::lexically_inside(&joined, Path::new("refs/heads")) {
            return Err(invalid());
        }

        Ok(RefName(name))
    }

    /// Lexical normalization check, no filesystem access.
    fn lexically_inside(path: &Path, root: &Path) -> bool {
        let mut depth: isize = 0;
        for component in path.components() {
            match component {
                Component::Normal(_) => depth += 1,
                Component::ParentDir => {
                    depth -= 1;
                    if depth < root.components().count() as isize {
                        return false;
                    }
                }
                Component::CurDir => {}
                _ => return false,
            }
        }
        path.starts_with(root)
    }

    /// Relative path of this ref under a ref root directory.
    pub fn to_path(&self) -> PathBuf {
        PathBuf::from(&self.0)
    }
}

impl AsRef<str> for RefName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RefName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
