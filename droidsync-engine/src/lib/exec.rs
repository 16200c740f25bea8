//! Application of a [`Plan`] to the live backends.
use chrono::{DateTime, Utc};
use droidsync::{
    path::RelPathBuf, Action, ActionKind, Direction, Error, FailurePolicy, Plan, Reason, Side,
    Summary,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{
    report::Reporter,
    storage::{FileSystem, MkDir, Remove, SetMtime, Transfer},
};

#[derive(Debug, Clone)]
pub enum Outcome {
    Applied,
    Skipped(Reason),
    /// Conflicts are reported as [`Error::Conflict`]
    Failed(Error),
}

#[derive(Debug, Clone)]
pub struct ActionResult {
    pub action: Action,
    pub outcome: Outcome,
}

/// Why an execution stopped before the end of the plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Halt {
    /// A failure occurred under [`FailurePolicy::Abort`]
    Aborted,
    Cancelled,
}

#[derive(Debug, Clone, Default)]
pub struct Execution {
    pub summary: Summary,
    pub results: Vec<ActionResult>,
    pub halt: Option<Halt>,
}

impl Execution {
    /// Completed with neither failure nor conflict
    pub fn is_clean(&self) -> bool {
        self.halt.is_none() && self.summary.is_clean()
    }
}

pub struct Executor<'a, S, D> {
    src: &'a S,
    dst: &'a D,
    policy: FailurePolicy,
}

impl<'a, S, D> Executor<'a, S, D>
where
    S: FileSystem,
    D: FileSystem,
{
    pub fn new(src: &'a S, dst: &'a D, policy: FailurePolicy) -> Self {
        Self { src, dst, policy }
    }

    /// Apply `plan` in order, one action at a time.
    /// `token` is checked between actions.
    pub async fn execute<R>(
        &self,
        plan: Plan,
        reporter: &mut R,
        token: &CancellationToken,
    ) -> Execution
    where
        R: Reporter + ?Sized,
    {
        let mut execution = Execution::default();
        // paths whose action failed or was blocked
        let mut troubled: Vec<RelPathBuf> = Vec::new();
        // directories that could not be created
        let mut missing_dirs: Vec<RelPathBuf> = Vec::new();

        for action in plan.into_actions() {
            if token.is_cancelled() {
                log::warn!("cancellation requested");
                execution.halt = Some(Halt::Cancelled);
                break;
            }

            let blocker = blocked_by(&action, &missing_dirs, &troubled);
            let outcome = if let Some(path) = blocker {
                Outcome::Skipped(Reason::Blocked { path })
            } else {
                match action.kind {
                    ActionKind::Skip => Outcome::Skipped(action.reason.clone()),
                    ActionKind::Conflict => Outcome::Failed(match action.conflict() {
                        Some(conflict) => Error::Conflict(action.path.clone(), conflict.clone()),
                        None => droidsync::other_error!("unexplained conflict at {}", action.path),
                    }),
                    _ => match self.apply(&action, &mut execution.summary).await {
                        Ok(()) => Outcome::Applied,
                        Err(err) => Outcome::Failed(err),
                    },
                }
            };

            let mut abort = false;
            match &outcome {
                Outcome::Applied => execution.summary.record_applied(&action),
                Outcome::Skipped(Reason::Blocked { .. }) => {
                    execution.summary.record_skipped();
                    troubled.push(action.path.clone());
                    if matches!(action.kind, ActionKind::CreateDir { .. }) {
                        missing_dirs.push(action.path.clone());
                    }
                }
                Outcome::Skipped(..) => execution.summary.record_skipped(),
                Outcome::Failed(err) => {
                    execution.summary.record_failure(&action, err.clone());
                    if !err.is_conflict() {
                        troubled.push(action.path.clone());
                        if matches!(action.kind, ActionKind::CreateDir { .. }) {
                            missing_dirs.push(action.path.clone());
                        }
                        abort = self.policy == FailurePolicy::Abort;
                    }
                }
            }

            let result = ActionResult { action, outcome };
            reporter.action_done(&result);
            execution.results.push(result);

            if abort {
                execution.halt = Some(Halt::Aborted);
                break;
            }
        }

        reporter.finished(&execution);
        execution
    }

    async fn apply(&self, action: &Action, summary: &mut Summary) -> droidsync::Result<()> {
        match action.kind {
            ActionKind::CreateDir { on } => {
                let path = action.native_path(on);
                match on {
                    Side::Source => self.src.make_dirs(path).await,
                    Side::Destination => self.dst.make_dirs(path).await,
                }
            }
            ActionKind::RemoveDir { on } => {
                let path = action.native_path(on);
                match on {
                    Side::Source => self.src.remove_dir(path).await,
                    Side::Destination => self.dst.remove_dir(path).await,
                }
            }
            ActionKind::RemoveFile { on } => {
                let path = action.native_path(on);
                match on {
                    Side::Source => self.src.remove_file(path).await,
                    Side::Destination => self.dst.remove_file(path).await,
                }
            }
            ActionKind::CreateFile { to, direction } | ActionKind::UpdateFile { to, direction } => {
                let from = to.opposite();
                let mtime = action
                    .entry(from)
                    .map(|e| e.mtime())
                    .ok_or_else(|| droidsync::other_error!("no {from} entry for {}", action.path))?;
                let from_path = action.native_path(from);
                let to_path = action.native_path(to);
                let preserved = match to {
                    Side::Destination => {
                        copy_file(self.src, self.dst, direction, from_path, to_path, mtime).await?
                    }
                    Side::Source => {
                        copy_file(self.dst, self.src, direction, from_path, to_path, mtime).await?
                    }
                };
                if !preserved {
                    summary.record_mtime_not_preserved();
                }
                Ok(())
            }
            ActionKind::Skip | ActionKind::Conflict => Ok(()),
        }
    }
}

/// Transfer a file from backend `from` to backend `to`, and set its
/// modification time if `to` supports it.
/// Returns whether the modification time was preserved.
async fn copy_file<F, T>(
    from: &F,
    to: &T,
    direction: Direction,
    from_path: &str,
    to_path: &str,
    mtime: DateTime<Utc>,
) -> droidsync::Result<bool>
where
    F: FileSystem,
    T: FileSystem,
{
    match direction {
        Direction::Push => to.transfer_out(from_path, to_path).await?,
        Direction::Pull => from.transfer_in(from_path, to_path).await?,
    }

    if !to.capabilities().set_mtime {
        log::warn!("{}: modification time not preserved on {}", to_path, to.label());
        return Ok(false);
    }
    match to.set_mtime(to_path, mtime).await {
        Ok(()) => Ok(true),
        Err(err) => {
            log::warn!("{to_path}: could not set modification time: {err}");
            Ok(false)
        }
    }
}

/// The path of the failure that prevents `action` from running, if any.
///
/// Anything below a directory that could not be created is blocked, and a
/// directory can't be removed if the removal of some of its content failed.
fn blocked_by(
    action: &Action,
    missing_dirs: &[RelPathBuf],
    troubled: &[RelPathBuf],
) -> Option<RelPathBuf> {
    if let Some(dir) = missing_dirs.iter().find(|d| d.is_ancestor_of(&action.path)) {
        return Some(dir.clone());
    }
    if matches!(action.kind, ActionKind::RemoveDir { .. }) {
        if let Some(path) = troubled.iter().find(|p| action.path.is_ancestor_of(p)) {
            return Some(path.clone());
        }
    }
    None
}
