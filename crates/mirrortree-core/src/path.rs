//! Root-relative, platform-neutral paths.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PathError;

/// A path relative to the replicated root, always `/`-separated.
///
/// The empty path denotes the root itself. Components are never empty,
/// `.` or `..`, so a relative path can be joined onto any destination
/// root without escaping it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelativePath(String);

impl RelativePath {
    /// The root path.
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Parse a `/`-separated relative path received from elsewhere.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.is_empty() {
            return Ok(Self::root());
        }
        if raw.starts_with('/') {
            return Err(PathError::Absolute);
        }
        for component in raw.split('/') {
            validate_component(component)?;
        }
        Ok(Self(raw.to_string()))
    }

    /// Compute the relative path of `path` below `base`.
    pub fn from_native(base: &Path, path: &Path) -> Result<Self, PathError> {
        let suffix = path.strip_prefix(base).map_err(|_| PathError::OutsideRoot {
            path: path.to_path_buf(),
        })?;

        let mut rel = Self::root();
        for component in suffix.components() {
            match component {
                Component::Normal(name) => {
                    let name = name.to_str().ok_or_else(|| PathError::NonUtf8 {
                        path: path.to_path_buf(),
                    })?;
                    validate_component(name)?;
                    rel = rel.join(name);
                }
                Component::CurDir => {}
                _ => return Err(PathError::ParentComponent),
            }
        }
        Ok(rel)
    }

    /// Append a single component.
    pub fn join(&self, name: &str) -> Self {
        if self.0.is_empty() {
            Self(name.to_string())
        } else {
            Self(format!("{}/{name}", self.0))
        }
    }

    /// Whether this is the root path.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The path as a `/`-separated string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the path's components.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|c| !c.is_empty())
    }

    /// Last component, if any.
    pub fn file_name(&self) -> Option<&str> {
        self.components().last()
    }

    /// Whether `self` equals `ancestor` or lies below it.
    pub fn starts_with(&self, ancestor: &RelativePath) -> bool {
        if ancestor.is_root() {
            return true;
        }
        match self.0.strip_prefix(&ancestor.0) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Resolve against a native base directory.
    pub fn to_native(&self, base: &Path) -> PathBuf {
        self.components().fold(base.to_path_buf(), |acc, c| acc.join(c))
    }

    /// Number of components.
    pub fn depth(&self) -> usize {
        self.components().count()
    }
}

fn validate_component(component: &str) -> Result<(), PathError> {
    match component {
        "" => Err(PathError::EmptyComponent),
        "." | ".." => Err(PathError::ParentComponent),
        c if c.contains('\0') || c.contains('\\') => Err(PathError::InvalidCharacter {
            component: c.to_string(),
        }),
        _ => Ok(()),
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str(".")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl TryFrom<String> for RelativePath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RelativePath> for String {
    fn from(value: RelativePath) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_and_components() {
        let path = RelativePath::root().join("b").join("c.txt");
        assert_eq!(path.as_str(), "b/c.txt");
        assert_eq!(path.components().collect::<Vec<_>>(), vec!["b", "c.txt"]);
        assert_eq!(path.file_name(), Some("c.txt"));
        assert_eq!(path.depth(), 2);
    }

    #[test]
    fn test_parse_rejects_escapes() {
        assert_eq!(RelativePath::parse("/etc/passwd"), Err(PathError::Absolute));
        assert_eq!(RelativePath::parse("a/../b"), Err(PathError::ParentComponent));
        assert_eq!(RelativePath::parse("a//b"), Err(PathError::EmptyComponent));
        assert!(RelativePath::parse("a\\b").is_err());
        assert!(RelativePath::parse("a/b").is_ok());
        assert!(RelativePath::parse("").is_ok_and(|p| p.is_root()));
    }

    #[test]
    fn test_from_native() {
        let base = Path::new("/data/root");
        let rel = RelativePath::from_native(base, Path::new("/data/root/x/y.bin")).unwrap();
        assert_eq!(rel.as_str(), "x/y.bin");

        let outside = RelativePath::from_native(base, Path::new("/data/other"));
        assert!(matches!(outside, Err(PathError::OutsideRoot { .. })));
    }

    #[test]
    fn test_starts_with() {
        let dir = RelativePath::parse("a/b").unwrap();
        assert!(RelativePath::parse("a/b/c").unwrap().starts_with(&dir));
        assert!(dir.starts_with(&dir));
        assert!(!RelativePath::parse("a/bc").unwrap().starts_with(&dir));
        assert!(dir.starts_with(&RelativePath::root()));
    }

    #[test]
    fn test_to_native() {
        let rel = RelativePath::parse("b/c.txt").unwrap();
        assert_eq!(
            rel.to_native(Path::new("/mnt/mirror")),
            PathBuf::from("/mnt/mirror/b/c.txt")
        );
    }
}
