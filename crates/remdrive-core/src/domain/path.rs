//! Remote path handling
//!
//! A [`RemotePath`] is the full path of an entry on the remote filesystem,
//! always `/`-rooted. The metadata store keeps the *parent's* full path on
//! every row, which makes subtree operations (cascade deletes, rename
//! propagation) simple prefix queries.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// A remote filesystem path (must start with `/`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemotePath(String);

impl RemotePath {
    /// Create a new RemotePath
    ///
    /// # Errors
    /// Returns an error if the path doesn't start with `/`, contains double
    /// slashes, or contains `..` traversal.
    pub fn new(path: String) -> Result<Self, DomainError> {
        if !path.starts_with('/') {
            return Err(DomainError::InvalidPath(format!(
                "remote path must start with '/': {path}"
            )));
        }

        if path.len() > 1 && path.contains("//") {
            return Err(DomainError::InvalidPath(format!(
                "remote path contains double slashes: {path}"
            )));
        }

        if path.split('/').any(|component| component == "..") {
            return Err(DomainError::InvalidPath(format!(
                "remote path contains traversal: {path}"
            )));
        }

        Ok(Self(path))
    }

    /// The root path `/`
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the root path
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Join a validated path component
    ///
    /// # Errors
    /// Returns an error if the component is empty or contains `/` or `..`.
    pub fn join(&self, component: &str) -> Result<Self, DomainError> {
        if component.is_empty() || component.contains('/') || component == ".." {
            return Err(DomainError::InvalidPath(format!(
                "invalid path component: {component}"
            )));
        }

        Ok(self.child(component))
    }

    /// Join a component that is already known to be a valid single name
    ///
    /// Names read back from the metadata store have been validated on the
    /// way in, so this skips re-validation.
    #[must_use]
    pub fn child(&self, name: &str) -> Self {
        if self.is_root() {
            Self(format!("/{name}"))
        } else {
            Self(format!("{}/{name}", self.0))
        }
    }

    /// Get the parent path
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }

        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// Get the final name component
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.0.rsplit('/').next()
    }

    /// Returns true if `other` lies strictly inside this path's subtree
    ///
    /// The path itself is not contained in itself; the root contains every
    /// other path.
    #[must_use]
    pub fn contains(&self, other: &RemotePath) -> bool {
        if self.is_root() {
            return !other.is_root();
        }
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0.as_bytes()[self.0.len()] == b'/'
    }
}

impl Display for RemotePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RemotePath {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for RemotePath {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RemotePath> for String {
    fn from(path: RemotePath) -> Self {
        path.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_valid() {
        let path = RemotePath::new("/home/user/docs".to_string()).unwrap();
        assert_eq!(path.as_str(), "/home/user/docs");
    }

    #[test]
    fn test_root() {
        let root = RemotePath::root();
        assert!(root.is_root());
        assert_eq!(root.as_str(), "/");
    }

    #[test]
    fn test_no_leading_slash_fails() {
        assert!(RemotePath::new("docs/file.txt".to_string()).is_err());
    }

    #[test]
    fn test_double_slash_fails() {
        assert!(RemotePath::new("/docs//file.txt".to_string()).is_err());
    }

    #[test]
    fn test_traversal_fails() {
        assert!(RemotePath::new("/docs/../file.txt".to_string()).is_err());
    }

    #[test]
    fn test_join() {
        let root = RemotePath::root();
        let docs = root.join("docs").unwrap();
        assert_eq!(docs.as_str(), "/docs");
        assert_eq!(docs.join("a.txt").unwrap().as_str(), "/docs/a.txt");
    }

    #[test]
    fn test_join_rejects_slash() {
        assert!(RemotePath::root().join("a/b").is_err());
        assert!(RemotePath::root().join("").is_err());
        assert!(RemotePath::root().join("..").is_err());
    }

    #[test]
    fn test_join_allows_spaces_and_dots() {
        let path = RemotePath::root().join("my file 2.txt").unwrap();
        assert_eq!(path.as_str(), "/my file 2.txt");
    }

    #[test]
    fn test_parent() {
        let path = RemotePath::new("/docs/sub/file.txt".to_string()).unwrap();
        assert_eq!(path.parent().unwrap().as_str(), "/docs/sub");
        assert_eq!(RemotePath::new("/docs".to_string()).unwrap().parent().unwrap().as_str(), "/");
        assert!(RemotePath::root().parent().is_none());
    }

    #[test]
    fn test_file_name() {
        let path = RemotePath::new("/docs/file.txt".to_string()).unwrap();
        assert_eq!(path.file_name(), Some("file.txt"));
        assert_eq!(RemotePath::root().file_name(), None);
    }

    #[test]
    fn test_contains_descendants() {
        let docs = RemotePath::new("/docs".to_string()).unwrap();
        let nested = RemotePath::new("/docs/sub/file.txt".to_string()).unwrap();
        assert!(docs.contains(&nested));
        assert!(!docs.contains(&docs));
    }

    #[test]
    fn test_contains_rejects_sibling_prefix() {
        // "/doc" must not claim "/docs/x"
        let doc = RemotePath::new("/doc".to_string()).unwrap();
        let other = RemotePath::new("/docs/x".to_string()).unwrap();
        assert!(!doc.contains(&other));
    }

    #[test]
    fn test_root_contains_everything_but_itself() {
        let root = RemotePath::root();
        assert!(root.contains(&RemotePath::new("/a".to_string()).unwrap()));
        assert!(!root.contains(&RemotePath::root()));
    }
}
