use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Other,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => f.write_str("file"),
            Self::Directory => f.write_str("directory"),
            Self::Symlink => f.write_str("symlink"),
            Self::Other => f.write_str("special file"),
        }
    }
}

/// What a backend reports about a single path.
/// Symlinks are never followed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub kind: EntryKind,
    pub size: u64,
    pub mtime: DateTime<Utc>,
}

impl Metadata {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// A filesystem object, as seen by the walker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    name: String,
    sanitized: String,
    path: String,
    metadata: Metadata,
}

impl Entry {
    pub fn new(name: String, sanitized: String, path: String, metadata: Metadata) -> Self {
        Self {
            name,
            sanitized,
            path,
            metadata,
        }
    }

    /// The raw, backend native name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name used to pair entries across backends
    pub fn sanitized(&self) -> &str {
        &self.sanitized
    }

    /// The backend native full path
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn kind(&self) -> EntryKind {
        self.metadata.kind
    }

    /// Size in bytes. Only meaningful for files.
    pub fn size(&self) -> u64 {
        self.metadata.size
    }

    pub fn mtime(&self) -> DateTime<Utc> {
        self.metadata.mtime
    }

    pub fn is_dir(&self) -> bool {
        self.kind() == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind() == EntryKind::File
    }

    pub fn is_symlink(&self) -> bool {
        self.kind() == EntryKind::Symlink
    }

    /// Files and symlinks are transferred as whole files.
    pub fn is_transferable(&self) -> bool {
        matches!(self.kind(), EntryKind::File | EntryKind::Symlink)
    }
}
