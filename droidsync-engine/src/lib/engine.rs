use droidsync::{config::PatternList, Config, Plan, Summary, SyncMode};
use tokio_util::sync::CancellationToken;

use crate::{
    diff::{Diff, DiffOptions},
    exec::{Execution, Executor},
    plan,
    report::Reporter,
    storage::{FileSystem, Naming},
};

/// A configured sync between a root on a source backend and a root on a destination backend
#[derive(Debug, Clone)]
pub struct Engine<S, D> {
    src: S,
    src_root: String,
    dst: D,
    dst_root: String,
    config: Config,
    excludes: PatternList,
}

impl<S, D> Engine<S, D>
where
    S: FileSystem,
    D: FileSystem,
{
    /// Validates and normalizes both roots. Fails with `InvalidPath`.
    pub fn new(
        src: S,
        src_root: &str,
        dst: D,
        dst_root: &str,
        config: Config,
    ) -> droidsync::Result<Self> {
        src.validate_root(src_root)?;
        dst.validate_root(dst_root)?;
        let src_root = src.normalize(src_root);
        let dst_root = dst.normalize(dst_root);

        if crate::diff::transfer_direction(&src, &dst).is_none() {
            droidsync::other_bail!(
                "Neither {} nor {} is reachable from this host",
                src.label(),
                dst.label()
            );
        }

        let excludes = config
            .exclude_patterns()
            .map_err(|err| droidsync::other_error!("Invalid exclude pattern: {err}"))?;

        log::info!(
            "sync {} ({}) -> {} ({}), mode {:?}",
            src_root,
            src.label(),
            dst_root,
            dst.label(),
            config.mode
        );

        Ok(Self {
            src,
            src_root,
            dst,
            dst_root,
            config,
            excludes,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn src_root(&self) -> &str {
        &self.src_root
    }

    pub fn dst_root(&self) -> &str {
        &self.dst_root
    }

    fn diff_options(&self) -> DiffOptions {
        DiffOptions {
            two_way: self.config.mode == SyncMode::TwoWay,
            delete: self.config.deletes(),
            tolerance: self.config.tolerance(),
        }
    }

    /// Compare both trees and order the differences into a plan.
    /// Nothing is modified.
    pub async fn plan(&self) -> droidsync::Result<Plan> {
        let opts = self.diff_options();
        let actions = match self.config.mode {
            SyncMode::DestinationToSource => {
                let diff = Diff::new(
                    &self.dst,
                    &self.dst_root,
                    &self.src,
                    &self.src_root,
                    &self.excludes,
                    opts,
                )?;
                diff.run()
                    .await?
                    .into_iter()
                    .map(|a| a.mirrored())
                    .collect()
            }
            SyncMode::SourceToDestination | SyncMode::TwoWay => {
                let diff = Diff::new(
                    &self.src,
                    &self.src_root,
                    &self.dst,
                    &self.dst_root,
                    &self.excludes,
                    opts,
                )?;
                diff.run().await?
            }
        };
        let plan = plan::plan(actions);
        log::debug!("plan has {} actions", plan.len());
        Ok(plan)
    }

    /// Apply a plan computed by [`Engine::plan`]
    pub async fn execute<R>(
        &self,
        plan: Plan,
        reporter: &mut R,
        token: &CancellationToken,
    ) -> Execution
    where
        R: Reporter + ?Sized,
    {
        let executor = Executor::new(&self.src, &self.dst, self.config.failure_policy);
        executor.execute(plan, reporter, token).await
    }

    /// Execute `plan`, or only predict its summary on a dry run
    pub async fn apply<R>(
        &self,
        plan: Plan,
        reporter: &mut R,
        token: &CancellationToken,
    ) -> Execution
    where
        R: Reporter + ?Sized,
    {
        if !self.config.dry_run {
            return self.execute(plan, reporter, token).await;
        }
        log::info!("dry run: nothing is modified");
        let execution = Execution {
            summary: Summary::from_plan(&plan),
            ..Execution::default()
        };
        reporter.finished(&execution);
        execution
    }

    /// Plan, then apply
    pub async fn run<R>(
        &self,
        reporter: &mut R,
        token: &CancellationToken,
    ) -> droidsync::Result<Execution>
    where
        R: Reporter + ?Sized,
    {
        let plan = self.plan().await?;
        reporter.planned(&plan);
        Ok(self.apply(plan, reporter, token).await)
    }
}
