use byte_unit::{AdjustedByte, Byte, UnitType};
use droidsync::{Plan, Summary};
use serde::Serialize;

use crate::exec::{ActionResult, Execution, Halt, Outcome};

pub fn adjusted_byte(val: u64) -> AdjustedByte {
    Byte::from(val).get_appropriate_unit(UnitType::Binary)
}

/// Machine readable outcome of a run, printed with `--json`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonReport<'a> {
    pub plan: &'a Plan,
    pub summary: &'a Summary,
    pub halt: Option<Halt>,
    pub dry_run: bool,
}

/// Consumer of the progress of a sync run
pub trait Reporter {
    fn planned(&mut self, _plan: &Plan) {}

    /// Called once per executed action, in plan order
    fn action_done(&mut self, result: &ActionResult);

    fn finished(&mut self, _execution: &Execution) {}
}

/// Reports through the `log` facade
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn planned(&mut self, plan: &Plan) {
        log::info!(
            "{} actions planned, {} effective",
            plan.len(),
            plan.effective_len()
        );
        for action in plan.iter().filter(|a| !a.is_skip()) {
            log::debug!("planned: {action}");
        }
        let conflicts = plan.conflicts().count();
        if conflicts > 0 {
            log::warn!("{conflicts} conflicts will be left for manual resolution");
        }
    }

    fn action_done(&mut self, result: &ActionResult) {
        let action = &result.action;
        match &result.outcome {
            Outcome::Applied => log::info!("{} {}", action.kind, action.path.or_root()),
            Outcome::Skipped(reason) => log::debug!("skip {}: {reason}", action.path.or_root()),
            Outcome::Failed(err) if err.is_conflict() => log::warn!("{err}"),
            Outcome::Failed(err) => log::error!("{} {} failed: {err}", action.kind, action.path.or_root()),
        }
    }

    fn finished(&mut self, execution: &Execution) {
        match execution.halt {
            Some(Halt::Aborted) => log::error!("Sync aborted after a failure"),
            Some(Halt::Cancelled) => log::warn!("Sync cancelled"),
            None => (),
        }
        log_summary(&execution.summary);
    }
}

pub fn log_summary(summary: &Summary) {
    let c = &summary.counts;
    log::info!(
        "created: {}, updated: {}, deleted: {}, skipped: {}, conflicted: {}, failed: {}",
        c.created,
        c.updated,
        c.deleted,
        c.skipped,
        c.conflicted,
        c.failed
    );
    log::info!(
        "transferred: {:#.2}",
        adjusted_byte(summary.transferred_bytes)
    );
    if summary.mtime_not_preserved > 0 {
        log::warn!(
            "modification time not preserved for {} file(s)",
            summary.mtime_not_preserved
        );
    }
    for path in summary.conflicts.iter() {
        log::warn!("unresolved conflict: {}", path.or_root());
    }
    for (path, err) in summary.failures.iter() {
        log::error!("failed: {}: {err}", path.or_root());
    }
}
