use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{EntryKind, Side};

/// A situation the engine refuses to resolve on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Conflict {
    /// Same path, but not the same kind of entry on both sides
    KindMismatch {
        source: EntryKind,
        destination: EntryKind,
    },
    /// Several raw names end up with the same sanitized name
    NameCollision { side: Side, names: Vec<String> },
}

impl Conflict {
    /// Check whether two entries at the same path can be reconciled.
    /// Directories pair with directories, special files with special files.
    /// Files and symlinks pair with each other, as a symlink is transferred
    /// as the file it points to.
    pub fn check(source: EntryKind, destination: EntryKind) -> Option<Self> {
        use EntryKind::{File, Symlink};
        if source == destination
            || matches!((source, destination), (File, Symlink) | (Symlink, File))
        {
            None
        } else {
            Some(Self::KindMismatch {
                source,
                destination,
            })
        }
    }

    /// The same conflict, with source and destination exchanged
    pub fn mirrored(self) -> Self {
        match self {
            Self::KindMismatch {
                source,
                destination,
            } => Self::KindMismatch {
                source: destination,
                destination: source,
            },
            Self::NameCollision { side, names } => Self::NameCollision {
                side: side.opposite(),
                names,
            },
        }
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KindMismatch {
                source,
                destination,
            } => write!(f, "source is {source}, destination is {destination}"),
            Self::NameCollision { side, names } => {
                write!(f, "names collide on {side} after sanitization: ")?;
                for (i, name) in names.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name:?}")?;
                }
                Ok(())
            }
        }
    }
}

#[test]
fn test_check_conflict() {
    use EntryKind::*;
    assert_eq!(Conflict::check(File, File), None);
    assert_eq!(Conflict::check(Directory, Directory), None);
    assert_eq!(Conflict::check(Symlink, Symlink), None);
    assert_eq!(
        Conflict::check(File, Directory),
        Some(Conflict::KindMismatch {
            source: File,
            destination: Directory
        })
    );
    assert!(Conflict::check(Symlink, File).is_some());
}
