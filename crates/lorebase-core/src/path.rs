//! Logical paths relative to the managed root.
//!
//! Every entity in the system is keyed by its logical path: a POSIX-style
//! relative path with `/` separators, no leading slash and no `.`/`..`
//! components. The empty path names the managed root itself.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::error::Error;

/// A validated path relative to the managed root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalPath(String);

impl LogicalPath {
    /// The managed root itself.
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Parse and validate a logical path.
    ///
    /// Accepts forward-slash separated relative paths. Backslashes, empty
    /// components, `.`/`..` components and leading slashes are rejected.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        if raw.starts_with('/') {
            return Err(Error::InvalidPath(format!("absolute path not allowed: {raw}")));
        }
        if trimmed.contains('\\') {
            return Err(Error::InvalidPath(format!("backslash in path: {raw}")));
        }
        for part in trimmed.split('/') {
            if part.is_empty() || part == "." || part == ".." {
                return Err(Error::InvalidPath(format!("invalid component in path: {raw}")));
            }
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Derive the logical path of `abs` relative to `root`.
    pub fn from_abs(root: &Path, abs: &Path) -> Result<Self, Error> {
        let rel = abs
            .strip_prefix(root)
            .map_err(|_| Error::InvalidPath(format!("{} is outside the managed root", abs.display())))?;
        let mut parts = Vec::new();
        for comp in rel.components() {
            match comp {
                Component::Normal(os) => parts.push(
                    os.to_str()
                        .ok_or_else(|| Error::InvalidPath(format!("non-UTF-8 path: {}", abs.display())))?
                        .to_string(),
                ),
                Component::CurDir => {}
                _ => {
                    return Err(Error::InvalidPath(format!(
                        "unexpected component in {}",
                        abs.display()
                    )))
                }
            }
        }
        Ok(Self(parts.join("/")))
    }

    /// Resolve to an absolute path under `root`.
    pub fn to_abs(&self, root: &Path) -> PathBuf {
        if self.0.is_empty() {
            root.to_path_buf()
        } else {
            root.join(&self.0)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Append a child component.
    pub fn join(&self, child: &str) -> Result<Self, Error> {
        if self.0.is_empty() {
            Self::parse(child)
        } else {
            Self::parse(&format!("{}/{}", self.0, child))
        }
    }

    /// Parent folder path; `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        match self.0.rsplit_once('/') {
            Some((head, _)) => Some(Self(head.to_string())),
            None => Some(Self::root()),
        }
    }

    /// Final component; empty string for the root.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }

    /// Lower-cased extension, if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        name.rsplit_once('.')
            .filter(|(stem, _)| !stem.is_empty())
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }

    /// True if `self` equals `other` or is an ancestor folder of it.
    pub fn contains(&self, other: &LogicalPath) -> bool {
        if self.0.is_empty() {
            return true;
        }
        other.0 == self.0 || other.0.starts_with(&format!("{}/", self.0))
    }

    /// Every proper ancestor, nearest first, excluding the root.
    pub fn ancestors(&self) -> Vec<LogicalPath> {
        let mut out = Vec::new();
        let mut cur = self.parent();
        while let Some(p) = cur {
            if p.is_root() {
                break;
            }
            cur = p.parent();
            out.push(p);
        }
        out
    }
}

impl fmt::Display for LogicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LogicalPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
