//! Relative paths inside a synchronized tree.
//!
//! A [`RelPath`] is the backend independent identity of an entry: the
//! `/`-separated sequence of *sanitized* names from the sync root down to
//! the entry. It is never handed to a backend as is: backends resolve it
//! to their own native path with their own path algebra.
//! The sync root itself is the empty path.
use std::borrow::Borrow;
use std::cmp;
use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

pub const SEPARATOR: char = '/';

#[repr(transparent)]
pub struct RelPath {
    inner: str,
}

impl RelPath {
    pub fn new<S: AsRef<str> + ?Sized>(path: &S) -> &RelPath {
        unsafe { &*(path.as_ref() as *const str as *const RelPath) }
    }

    /// The sync root
    pub fn root() -> &'static RelPath {
        RelPath::new("")
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }

    pub fn to_rel_path_buf(&self) -> RelPathBuf {
        RelPathBuf {
            inner: self.inner.to_string(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterate over the names of this path, from the root down.
    ///
    /// ```
    /// use droidsync::path::RelPath;
    ///
    /// let names: Vec<_> = RelPath::new("a/b/c.txt").names().collect();
    /// assert_eq!(names, ["a", "b", "c.txt"]);
    /// assert_eq!(RelPath::root().names().count(), 0);
    /// ```
    pub fn names(&self) -> impl DoubleEndedIterator<Item = &str> + Clone {
        self.inner.split(SEPARATOR).filter(|n| !n.is_empty())
    }

    pub fn depth(&self) -> usize {
        self.names().count()
    }

    /// Returns the final name of the path, or `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        self.names().next_back()
    }

    /// Returns the path without its final name, or `None` for the root.
    ///
    /// ```
    /// use droidsync::path::RelPath;
    ///
    /// assert_eq!(RelPath::new("a/b").parent(), Some(RelPath::new("a")));
    /// assert_eq!(RelPath::new("a").parent(), Some(RelPath::root()));
    /// assert_eq!(RelPath::root().parent(), None);
    /// ```
    pub fn parent(&self) -> Option<&RelPath> {
        if self.is_root() {
            return None;
        }
        match self.inner.rfind(SEPARATOR) {
            Some(idx) => Some(RelPath::new(&self.inner[..idx])),
            None => Some(RelPath::root()),
        }
    }

    /// All the strict ancestors of this path, closest first, root excluded.
    pub fn ancestors(&self) -> impl Iterator<Item = &RelPath> {
        let mut cur = self.parent();
        std::iter::from_fn(move || {
            let p = cur.filter(|p| !p.is_root())?;
            cur = p.parent();
            Some(p)
        })
    }

    /// Whether `self` is a strict ancestor of `other`.
    /// The root is an ancestor of every other path.
    pub fn is_ancestor_of(&self, other: &RelPath) -> bool {
        if self.is_root() {
            return !other.is_root();
        }
        other.inner.len() > self.inner.len()
            && other.inner.starts_with(&self.inner)
            && other.inner.as_bytes()[self.inner.len()] == SEPARATOR as u8
    }

    pub fn join(&self, name: &str) -> RelPathBuf {
        debug_assert!(
            !name.is_empty() && !name.contains(SEPARATOR),
            "joining an invalid name: {name:?}"
        );
        let mut buf = self.to_rel_path_buf();
        buf.push(name);
        buf
    }

    /// Display helper that shows the root as "(root)"
    pub fn or_root(&self) -> &str {
        if self.is_root() {
            "(root)"
        } else {
            self.as_str()
        }
    }
}

impl fmt::Debug for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}

impl PartialEq for RelPath {
    fn eq(&self, other: &RelPath) -> bool {
        self.inner == other.inner
    }
}

impl Eq for RelPath {}

impl PartialOrd for RelPath {
    fn partial_cmp(&self, other: &RelPath) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RelPath {
    /// Paths compare name by name, so that `a/b` sorts before `a-b`
    /// and a directory is directly followed by its content.
    fn cmp(&self, other: &RelPath) -> cmp::Ordering {
        self.names().cmp(other.names())
    }
}

impl std::hash::Hash for RelPath {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.hash(state)
    }
}

impl AsRef<RelPath> for RelPath {
    fn as_ref(&self) -> &RelPath {
        self
    }
}

impl AsRef<RelPath> for str {
    fn as_ref(&self) -> &RelPath {
        RelPath::new(self)
    }
}

impl AsRef<str> for RelPath {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl ToOwned for RelPath {
    type Owned = RelPathBuf;

    fn to_owned(&self) -> RelPathBuf {
        self.to_rel_path_buf()
    }
}

impl Default for &RelPath {
    fn default() -> Self {
        RelPath::root()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct RelPathBuf {
    inner: String,
}

impl RelPathBuf {
    pub fn root() -> RelPathBuf {
        RelPathBuf::default()
    }

    pub fn as_rel_path(&self) -> &RelPath {
        RelPath::new(self.inner.as_str())
    }

    pub fn into_string(self) -> String {
        self.inner
    }

    pub fn push(&mut self, name: &str) {
        if !self.inner.is_empty() {
            self.inner.push(SEPARATOR);
        }
        self.inner.push_str(name);
    }
}

impl From<String> for RelPathBuf {
    /// Builds a path from a `/`-separated string.
    /// Empty names, such as leading or doubled separators, are dropped.
    fn from(value: String) -> Self {
        let mut buf = RelPathBuf::root();
        for name in RelPath::new(&value).names() {
            buf.push(name);
        }
        buf
    }
}

impl From<&str> for RelPathBuf {
    fn from(value: &str) -> Self {
        RelPathBuf::from(value.to_string())
    }
}

impl fmt::Debug for RelPathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_rel_path(), f)
    }
}

impl fmt::Display for RelPathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}

impl Deref for RelPathBuf {
    type Target = RelPath;

    fn deref(&self) -> &RelPath {
        self.as_rel_path()
    }
}

impl Borrow<RelPath> for RelPathBuf {
    fn borrow(&self) -> &RelPath {
        self.as_rel_path()
    }
}

impl AsRef<RelPath> for RelPathBuf {
    fn as_ref(&self) -> &RelPath {
        self.as_rel_path()
    }
}

impl PartialEq for RelPathBuf {
    fn eq(&self, other: &RelPathBuf) -> bool {
        self.as_rel_path() == other.as_rel_path()
    }
}

impl Eq for RelPathBuf {}

impl PartialEq<RelPath> for RelPathBuf {
    fn eq(&self, other: &RelPath) -> bool {
        self.as_rel_path() == other
    }
}

impl PartialEq<str> for RelPathBuf {
    fn eq(&self, other: &str) -> bool {
        self.inner == other
    }
}

impl PartialEq<&str> for RelPathBuf {
    fn eq(&self, other: &&str) -> bool {
        self.inner == *other
    }
}

impl PartialOrd for RelPathBuf {
    fn partial_cmp(&self, other: &RelPathBuf) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RelPathBuf {
    fn cmp(&self, other: &RelPathBuf) -> cmp::Ordering {
        self.as_rel_path().cmp(other.as_rel_path())
    }
}

impl std::hash::Hash for RelPathBuf {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_rel_path().hash(state)
    }
}
