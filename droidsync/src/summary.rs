use std::ops;

use serde::{Deserialize, Serialize};

use crate::{path::RelPathBuf, Action, ActionKind, Error, Plan};

/// Run level counters of a sync
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counts {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub conflicted: usize,
    pub failed: usize,
}

impl Counts {
    pub fn null() -> Self {
        Self::default()
    }

    pub fn is_null(&self) -> bool {
        *self == Self::null()
    }

    /// Entries that were (or would be) changed
    pub fn changed(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

impl ops::Add for Counts {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self {
            created: self.created + rhs.created,
            updated: self.updated + rhs.updated,
            deleted: self.deleted + rhs.deleted,
            skipped: self.skipped + rhs.skipped,
            conflicted: self.conflicted + rhs.conflicted,
            failed: self.failed + rhs.failed,
        }
    }
}

impl ops::AddAssign for Counts {
    fn add_assign(&mut self, rhs: Self) {
        self.created += rhs.created;
        self.updated += rhs.updated;
        self.deleted += rhs.deleted;
        self.skipped += rhs.skipped;
        self.conflicted += rhs.conflicted;
        self.failed += rhs.failed;
    }
}

/// The execution summary of a sync run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub counts: Counts,
    /// Files transferred to a backend that can't set modification times
    pub mtime_not_preserved: usize,
    pub transferred_bytes: u64,
    pub conflicts: Vec<RelPathBuf>,
    pub failures: Vec<(RelPathBuf, Error)>,
}

impl Summary {
    /// The summary the plan would produce if every action succeeded
    pub fn from_plan(plan: &Plan) -> Self {
        let mut summary = Self::default();
        for action in plan {
            match action.kind {
                ActionKind::Skip => summary.record_skipped(),
                ActionKind::Conflict => summary.record_conflict(action),
                _ => summary.record_applied(action),
            }
        }
        summary
    }

    pub fn record_applied(&mut self, action: &Action) {
        match action.kind {
            ActionKind::CreateDir { .. } | ActionKind::CreateFile { .. } => {
                self.counts.created += 1
            }
            ActionKind::UpdateFile { .. } => self.counts.updated += 1,
            ActionKind::RemoveDir { .. } | ActionKind::RemoveFile { .. } => {
                self.counts.deleted += 1
            }
            ActionKind::Skip => self.counts.skipped += 1,
            ActionKind::Conflict => self.record_conflict(action),
        }
        if action.kind.is_transfer() {
            let size = action
                .kind
                .target()
                .and_then(|to| action.entry(to.opposite()))
                .map(|e| e.size())
                .unwrap_or(0);
            self.transferred_bytes += size;
        }
    }

    pub fn record_skipped(&mut self) {
        self.counts.skipped += 1;
    }

    pub fn record_conflict(&mut self, action: &Action) {
        self.counts.conflicted += 1;
        self.conflicts.push(action.path.clone());
    }

    pub fn record_failure(&mut self, action: &Action, error: Error) {
        if error.is_conflict() {
            self.record_conflict(action);
        } else {
            self.counts.failed += 1;
            self.failures.push((action.path.clone(), error));
        }
    }

    pub fn record_mtime_not_preserved(&mut self) {
        self.mtime_not_preserved += 1;
    }

    pub fn is_clean(&self) -> bool {
        self.counts.failed == 0 && self.counts.conflicted == 0
    }
}
