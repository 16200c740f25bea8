//! The capability contract every filesystem backend implements.
//!
//! All paths exchanged with a backend are native to that backend.
//! The engine builds them exclusively through [`Naming`].
use std::borrow::Cow;

use chrono::{DateTime, Utc};
use droidsync::Metadata;
use futures::{Future, Stream};

pub mod device;
pub mod local;

/// Characters replaced by [`sanitize_name`]
pub const INVALID_NAME_CHARS: &[char] = &['\\', '/', '*', ':', '?', '"', '<', '>', '|'];

/// Replacement for each of [`INVALID_NAME_CHARS`]
pub const REPLACEMENT_CHAR: char = '_';

/// Replace the characters that are invalid in a file name on FAT-like or
/// Windows filesystems. Returns the name unchanged if `enabled` is false.
pub fn sanitize_name(name: &str, enabled: bool) -> Cow<'_, str> {
    if enabled && name.contains(INVALID_NAME_CHARS) {
        Cow::Owned(name.replace(INVALID_NAME_CHARS, &REPLACEMENT_CHAR.to_string()))
    } else {
        Cow::Borrowed(name)
    }
}

#[test]
fn test_sanitize_name() {
    assert_eq!(sanitize_name("a:b?c.txt", true), "a_b_c.txt");
    assert_eq!(sanitize_name("a:b?c.txt", false), "a:b?c.txt");
    assert_eq!(sanitize_name("plain.txt", true), "plain.txt");
    assert!(matches!(sanitize_name("plain.txt", true), Cow::Borrowed(_)));
}

/// What a backend can do, declared once at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Paths of this backend are directly accessible by the host process
    pub host_local: bool,
    /// Modification times can be set after a transfer
    pub set_mtime: bool,
}

pub trait DirEntries {
    /// Lists the entries of the directory at `path`, without following symlinks.
    /// Fails with `NotFound` or `NotADirectory`.
    /// Listing order is backend specific.
    fn dir_entries(&self, path: &str)
        -> impl Stream<Item = droidsync::Result<(String, Metadata)>> + Send;
}

pub trait Stat {
    /// Metadata of the entry at `path`, without following symlinks.
    /// Fails with `NotFound`.
    fn stat(&self, path: &str) -> impl Future<Output = droidsync::Result<Metadata>> + Send;

    /// `path` with every symlink resolved. Fails with `NotFound`.
    fn real_path(&self, path: &str) -> impl Future<Output = droidsync::Result<String>> + Send;
}

pub trait MkDir {
    /// Creates `path` and its missing parents.
    /// Succeeds if `path` already is a directory.
    fn make_dirs(&self, path: &str) -> impl Future<Output = droidsync::Result<()>> + Send;
}

/// A trait to delete files or folders
pub trait Remove {
    fn remove_file(&self, path: &str) -> impl Future<Output = droidsync::Result<()>> + Send;

    /// Deletes the folder pointed to by `path`.
    /// Only empty folders can be deleted. Fails with `NotEmpty` otherwise.
    fn remove_dir(&self, path: &str) -> impl Future<Output = droidsync::Result<()>> + Send;
}

pub trait SetMtime {
    /// Only called if [`Capabilities::set_mtime`] is set.
    fn set_mtime(
        &self,
        path: &str,
        mtime: DateTime<Utc>,
    ) -> impl Future<Output = droidsync::Result<()>> + Send;
}

/// Whole file transfers between this backend and the host.
pub trait Transfer {
    /// Copy `remote`, a path of this backend, to `local`, a host path.
    fn transfer_in(
        &self,
        remote: &str,
        local: &str,
    ) -> impl Future<Output = droidsync::Result<()>> + Send;

    /// Copy `local`, a host path, to `remote`, a path of this backend.
    fn transfer_out(
        &self,
        local: &str,
        remote: &str,
    ) -> impl Future<Output = droidsync::Result<()>> + Send;
}

/// Backend native path algebra and naming rules
pub trait Naming {
    fn separator(&self) -> char;

    fn join(&self, base: &str, name: &str) -> String;

    /// Split `path` into its parent and its final name
    fn split<'a>(&self, path: &'a str) -> (&'a str, &'a str);

    /// Lexical normalization: no filesystem access
    fn normalize(&self, path: &str) -> String;

    /// The name an entry named `name` has to take on this backend
    fn sanitize<'a>(&self, name: &'a str) -> Cow<'a, str>;

    /// Check a user supplied root path. Fails with `InvalidPath`.
    fn validate_root(&self, path: &str) -> droidsync::Result<()>;
}

/// A filesystem backend usable by the sync engine
pub trait FileSystem:
    Clone + DirEntries + Stat + MkDir + Remove + SetMtime + Transfer + Naming + Send + Sync + 'static
{
    fn capabilities(&self) -> Capabilities;

    /// Short description for log messages
    fn label(&self) -> String;
}
