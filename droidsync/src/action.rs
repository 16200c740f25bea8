use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    path::{RelPath, RelPathBuf},
    Conflict, Entry, EntryKind,
};

/// One of the two backends of a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Side {
    Source,
    Destination,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Self::Source => Self::Destination,
            Self::Destination => Self::Source,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => f.write_str("source"),
            Self::Destination => f.write_str("destination"),
        }
    }
}

/// Direction of a whole-file transfer, from the point of view of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    /// Data leaves the host: the receiving backend fetches it (`transfer_out`)
    Push,
    /// Data enters the host: the sending backend delivers it (`transfer_in`)
    Pull,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push => f.write_str("push"),
            Self::Pull => f.write_str("pull"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    CreateDir { on: Side },
    RemoveDir { on: Side },
    CreateFile { to: Side, direction: Direction },
    UpdateFile { to: Side, direction: Direction },
    RemoveFile { on: Side },
    Skip,
    Conflict,
}

impl ActionKind {
    /// The side modified by this action
    pub fn target(&self) -> Option<Side> {
        match *self {
            Self::CreateDir { on } | Self::RemoveDir { on } | Self::RemoveFile { on } => Some(on),
            Self::CreateFile { to, .. } | Self::UpdateFile { to, .. } => Some(to),
            Self::Skip | Self::Conflict => None,
        }
    }

    pub fn is_remove(&self) -> bool {
        matches!(self, Self::RemoveDir { .. } | Self::RemoveFile { .. })
    }

    pub fn is_transfer(&self) -> bool {
        matches!(self, Self::CreateFile { .. } | Self::UpdateFile { .. })
    }

    /// The same action, with source and destination exchanged
    pub fn mirrored(self) -> Self {
        match self {
            Self::CreateDir { on } => Self::CreateDir { on: on.opposite() },
            Self::RemoveDir { on } => Self::RemoveDir { on: on.opposite() },
            Self::CreateFile { to, direction } => Self::CreateFile {
                to: to.opposite(),
                direction,
            },
            Self::UpdateFile { to, direction } => Self::UpdateFile {
                to: to.opposite(),
                direction,
            },
            Self::RemoveFile { on } => Self::RemoveFile { on: on.opposite() },
            Self::Skip => Self::Skip,
            Self::Conflict => Self::Conflict,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateDir { on } => write!(f, "mkdir ({on})"),
            Self::RemoveDir { on } => write!(f, "rmdir ({on})"),
            Self::CreateFile { to, direction } => write!(f, "create ({direction} to {to})"),
            Self::UpdateFile { to, direction } => write!(f, "update ({direction} to {to})"),
            Self::RemoveFile { on } => write!(f, "delete ({on})"),
            Self::Skip => f.write_str("skip"),
            Self::Conflict => f.write_str("conflict"),
        }
    }
}

/// Why the diff engine classified a path the way it did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Reason {
    /// The entry is absent on `side`
    Missing { side: Side },
    /// `side` is newer than the other side by `by_ms` milliseconds
    Newer { side: Side, by_ms: i64 },
    WithinTolerance,
    /// `side` is newer, but updates towards the other side are not allowed in this mode
    NewerNotPropagated { side: Side, by_ms: i64 },
    DeletionDisabled,
    /// Present only on the destination, and deletion is enabled
    Orphan,
    /// Some of the content of the directory is kept
    NotEmptied,
    UnsupportedKind(EntryKind),
    Conflict(Conflict),
    /// Not attempted because of the failure of an action at `path`
    Blocked { path: RelPathBuf },
}

impl Reason {
    /// The same reason, with source and destination exchanged
    pub fn mirrored(self) -> Self {
        match self {
            Self::Missing { side } => Self::Missing {
                side: side.opposite(),
            },
            Self::Newer { side, by_ms } => Self::Newer {
                side: side.opposite(),
                by_ms,
            },
            Self::NewerNotPropagated { side, by_ms } => Self::NewerNotPropagated {
                side: side.opposite(),
                by_ms,
            },
            Self::Conflict(conflict) => Self::Conflict(conflict.mirrored()),
            reason => reason,
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { side } => write!(f, "{side} missing"),
            Self::Newer { side, by_ms } => write!(f, "{side} newer by {}", Millis(*by_ms)),
            Self::WithinTolerance => f.write_str("up to date"),
            Self::NewerNotPropagated { side, by_ms } => {
                write!(f, "{side} newer by {} (not propagated)", Millis(*by_ms))
            }
            Self::DeletionDisabled => f.write_str("orphan kept, deletion disabled"),
            Self::Orphan => f.write_str("orphan"),
            Self::NotEmptied => f.write_str("directory keeps some content"),
            Self::UnsupportedKind(kind) => write!(f, "unsupported entry kind: {kind}"),
            Self::Conflict(conflict) => conflict.fmt(f),
            Self::Blocked { path } => write!(f, "blocked by the failure at {}", path.or_root()),
        }
    }
}

struct Millis(i64);

impl fmt::Display for Millis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}s", self.0 / 1000, (self.0 % 1000).abs())
    }
}

/// A single step of a [`Plan`].
///
/// Native paths are resolved for both sides at diff time, even when the entry
/// does not exist yet on a side: this is where it will be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub path: RelPathBuf,
    pub kind: ActionKind,
    pub reason: Reason,
    pub source: Option<Entry>,
    pub destination: Option<Entry>,
    pub source_path: String,
    pub destination_path: String,
}

impl Action {
    pub fn path(&self) -> &RelPath {
        &self.path
    }

    pub fn is_skip(&self) -> bool {
        self.kind == ActionKind::Skip
    }

    pub fn is_conflict(&self) -> bool {
        self.kind == ActionKind::Conflict
    }

    pub fn entry(&self, side: Side) -> Option<&Entry> {
        match side {
            Side::Source => self.source.as_ref(),
            Side::Destination => self.destination.as_ref(),
        }
    }

    pub fn native_path(&self, side: Side) -> &str {
        match side {
            Side::Source => &self.source_path,
            Side::Destination => &self.destination_path,
        }
    }

    /// Exchange the roles of source and destination.
    /// Used to express in the caller's terms a plan computed with swapped backends.
    pub fn mirrored(self) -> Self {
        Self {
            path: self.path,
            kind: self.kind.mirrored(),
            reason: self.reason.mirrored(),
            source: self.destination,
            destination: self.source,
            source_path: self.destination_path,
            destination_path: self.source_path,
        }
    }

    /// The conflict carried by this action, if it is one
    pub fn conflict(&self) -> Option<&Conflict> {
        match &self.reason {
            Reason::Conflict(conflict) if self.is_conflict() => Some(conflict),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.kind, self.path.or_root(), self.reason)
    }
}

/// A dependency ordered sequence of actions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plan {
    actions: Vec<Action>,
}

impl Plan {
    /// Wraps already ordered actions.
    /// Use the engine planner to order a raw diff.
    pub fn from_ordered(actions: Vec<Action>) -> Self {
        Self { actions }
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn into_actions(self) -> Vec<Action> {
        self.actions
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Action> {
        self.actions.iter()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Number of actions that would change something
    pub fn effective_len(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| !a.is_skip() && !a.is_conflict())
            .count()
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter().filter(|a| a.is_conflict())
    }

    /// Check the ordering invariants of the plan:
    ///  - a `CreateDir` precedes every action on a descendant
    ///  - a `RemoveDir` follows every action on a descendant
    ///
    /// Returns a description of the first violation found.
    pub fn check_order(&self) -> std::result::Result<(), String> {
        for (idx, action) in self.actions.iter().enumerate() {
            match action.kind {
                ActionKind::CreateDir { .. } => {
                    let before = &self.actions[..idx];
                    if let Some(desc) = before.iter().find(|a| action.path.is_ancestor_of(&a.path))
                    {
                        return Err(format!(
                            "{} is planned before the creation of {}",
                            desc.path,
                            action.path.or_root()
                        ));
                    }
                }
                ActionKind::RemoveDir { .. } => {
                    let after = &self.actions[idx + 1..];
                    if let Some(desc) = after.iter().find(|a| action.path.is_ancestor_of(&a.path)) {
                        return Err(format!(
                            "{} is planned after the removal of {}",
                            desc.path,
                            action.path.or_root()
                        ));
                    }
                }
                _ => (),
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Plan {
    type Item = &'a Action;
    type IntoIter = std::slice::Iter<'a, Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}
