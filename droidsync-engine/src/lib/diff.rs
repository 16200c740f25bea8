//! Lock-step comparison of the source and destination trees.
//!
//! Both sides of a directory level are listed concurrently and merged by
//! sanitized name. Every path is classified into exactly one [`Action`].
//! The produced list is unordered; see [`crate::plan`].
use std::cmp::Ordering;

use droidsync::{
    compare_mtime, config::PatternList, path::RelPathBuf, Action, ActionKind, Conflict,
    Direction, Entry, EntryKind, Reason, Side,
};
use futures::future::BoxFuture;

use crate::{
    storage::{FileSystem, Naming},
    walk::{Level, Slot, Tree, Walker},
};

/// Direction of a transfer from a backend with capabilities `from` to one with `to`.
/// `None` if neither backend is reachable from the host.
pub fn transfer_direction<F, T>(from: &F, to: &T) -> Option<Direction>
where
    F: FileSystem,
    T: FileSystem,
{
    if from.capabilities().host_local {
        Some(Direction::Push)
    } else if to.capabilities().host_local {
        Some(Direction::Pull)
    } else {
        None
    }
}

/// Options of a diff run, as resolved from the [`droidsync::Config`]
#[derive(Debug, Clone, Copy)]
pub struct DiffOptions {
    pub two_way: bool,
    pub delete: bool,
    pub tolerance: chrono::Duration,
}

pub struct Diff<'a, S, D> {
    src: Walker<'a, S, D>,
    dst: Walker<'a, D, S>,
    src_root: &'a str,
    dst_root: &'a str,
    opts: DiffOptions,
    to_dst: Direction,
    to_src: Direction,
}

struct Subtree {
    actions: Vec<Action>,
    /// Entries of the destination hidden by exclude patterns
    dst_hidden: bool,
}

impl<'a, S, D> Diff<'a, S, D>
where
    S: FileSystem,
    D: FileSystem,
{
    pub fn new(
        src: &'a S,
        src_root: &'a str,
        dst: &'a D,
        dst_root: &'a str,
        excludes: &'a PatternList,
        opts: DiffOptions,
    ) -> droidsync::Result<Self> {
        let to_dst = transfer_direction(src, dst).ok_or_else(|| {
            droidsync::other_error!(
                "No transfer possible between {} and {}",
                src.label(),
                dst.label()
            )
        })?;
        let to_src = transfer_direction(dst, src).unwrap_or(to_dst);
        Ok(Self {
            src: Walker::new(src, dst, excludes),
            dst: Walker::new(dst, src, excludes),
            src_root,
            dst_root,
            opts,
            to_dst,
            to_src,
        })
    }

    /// Compare both trees from their roots
    pub async fn run(&self) -> droidsync::Result<Vec<Action>> {
        let (src, dst) = tokio::join!(self.src.root(self.src_root), self.dst.root(self.dst_root));
        let src = src?.ok_or_else(|| droidsync::Error::NotFound(self.src_root.to_string()))?;
        let dst = dst?;

        log::debug!(
            "comparing {} ({}) with {} ({})",
            self.src_root,
            self.src.fs().label(),
            self.dst_root,
            self.dst.fs().label()
        );

        let src_path = src.entry().path().to_string();
        let dst_path = match &dst {
            Some(tree) => tree.entry().path().to_string(),
            None => self.dst_root.to_string(),
        };
        self.pair(
            RelPathBuf::root(),
            Some(src.entry().clone()),
            dst.map(|t| t.entry().clone()),
            src_path,
            dst_path,
        )
        .await
    }

    /// Classify the entries found at `rel` on each side.
    /// `src_path` and `dst_path` are the native paths on each side, planned or existing.
    fn pair(
        &self,
        rel: RelPathBuf,
        src: Option<Entry>,
        dst: Option<Entry>,
        src_path: String,
        dst_path: String,
    ) -> BoxFuture<'_, droidsync::Result<Vec<Action>>> {
        Box::pin(async move {
            let act = |kind, reason, src, dst| Action {
                path: rel.clone(),
                kind,
                reason,
                source: src,
                destination: dst,
                source_path: src_path.clone(),
                destination_path: dst_path.clone(),
            };

            let (s, d) = match (src, dst) {
                (None, None) => return Ok(Vec::new()),
                (Some(s), None) => {
                    return self
                        .one_sided(rel.clone(), Side::Source, s, src_path.clone(), dst_path.clone())
                        .await;
                }
                (None, Some(d)) => {
                    return self
                        .one_sided(rel.clone(), Side::Destination, d, src_path.clone(), dst_path.clone())
                        .await;
                }
                (Some(s), Some(d)) => (s, d),
            };

            if s.is_dir() && d.is_dir() {
                let sub = self
                    .children(rel.clone(), Some(s), Some(d), src_path.clone(), dst_path.clone())
                    .await?;
                return Ok(sub.actions);
            }

            if let Some(conflict) = Conflict::check(s.kind(), d.kind()) {
                log::warn!("conflict at {}: {conflict}", rel.or_root());
                let reason = Reason::Conflict(conflict);
                return Ok(vec![act(ActionKind::Conflict, reason, Some(s), Some(d))]);
            }

            if !s.is_transferable() || !d.is_transferable() {
                let reason = Reason::UnsupportedKind(s.kind());
                return Ok(vec![act(ActionKind::Skip, reason, Some(s), Some(d))]);
            }

            let (kind, reason) = match compare_mtime(s.mtime(), d.mtime(), self.opts.tolerance) {
                Ordering::Greater => (
                    ActionKind::UpdateFile {
                        to: Side::Destination,
                        direction: self.to_dst,
                    },
                    Reason::Newer {
                        side: Side::Source,
                        by_ms: (s.mtime() - d.mtime()).num_milliseconds(),
                    },
                ),
                Ordering::Less if self.opts.two_way => (
                    ActionKind::UpdateFile {
                        to: Side::Source,
                        direction: self.to_src,
                    },
                    Reason::Newer {
                        side: Side::Destination,
                        by_ms: (d.mtime() - s.mtime()).num_milliseconds(),
                    },
                ),
                Ordering::Less => (
                    ActionKind::Skip,
                    Reason::NewerNotPropagated {
                        side: Side::Destination,
                        by_ms: (d.mtime() - s.mtime()).num_milliseconds(),
                    },
                ),
                Ordering::Equal => (ActionKind::Skip, Reason::WithinTolerance),
            };
            Ok(vec![act(kind, reason, Some(s), Some(d))])
        })
    }

    /// An entry found only on `side`
    fn one_sided(
        &self,
        rel: RelPathBuf,
        side: Side,
        entry: Entry,
        src_path: String,
        dst_path: String,
    ) -> BoxFuture<'_, droidsync::Result<Vec<Action>>> {
        Box::pin(async move {
            let missing = side.opposite();
            let mut action = Action {
                path: rel.clone(),
                kind: ActionKind::Skip,
                reason: Reason::Missing { side: missing },
                source: None,
                destination: None,
                source_path: src_path.clone(),
                destination_path: dst_path.clone(),
            };
            let kind = entry.kind();
            let is_dir = entry.is_dir();
            match side {
                Side::Source => action.source = Some(entry.clone()),
                Side::Destination => action.destination = Some(entry.clone()),
            }

            let propagate = side == Side::Source || self.opts.two_way;
            if propagate {
                let direction = match missing {
                    Side::Destination => self.to_dst,
                    Side::Source => self.to_src,
                };
                match kind {
                    EntryKind::Directory => {
                        action.kind = ActionKind::CreateDir { on: missing };
                        let (src, dst) = match side {
                            Side::Source => (Some(entry), None),
                            Side::Destination => (None, Some(entry)),
                        };
                        let sub = self.children(rel, src, dst, src_path, dst_path).await?;
                        let mut actions = Vec::with_capacity(sub.actions.len() + 1);
                        actions.push(action);
                        actions.extend(sub.actions);
                        return Ok(actions);
                    }
                    EntryKind::File | EntryKind::Symlink => {
                        action.kind = ActionKind::CreateFile {
                            to: missing,
                            direction,
                        };
                    }
                    EntryKind::Other => {
                        action.reason = Reason::UnsupportedKind(EntryKind::Other);
                        log::debug!("skipping {}: {}", rel.or_root(), action.reason);
                    }
                }
                return Ok(vec![action]);
            }

            // orphan of the destination
            if !self.opts.delete {
                action.reason = Reason::DeletionDisabled;
                log::debug!("skipping {}: {}", rel.or_root(), action.reason);
                return Ok(vec![action]);
            }
            action.reason = Reason::Orphan;
            if !is_dir {
                action.kind = ActionKind::RemoveFile { on: Side::Destination };
                return Ok(vec![action]);
            }

            let sub = self
                .children(rel.clone(), None, Some(entry), src_path, dst_path)
                .await?;
            let emptied = !sub.dst_hidden && sub.actions.iter().all(|a| a.kind.is_remove());
            if emptied {
                action.kind = ActionKind::RemoveDir { on: Side::Destination };
            } else {
                action.reason = Reason::NotEmptied;
                log::debug!("keeping {}: {}", rel.or_root(), action.reason);
            }
            let mut actions = sub.actions;
            actions.push(action);
            Ok(actions)
        })
    }

    /// Merge the children of the directories at `rel`.
    /// A side without entry is treated as an empty directory that will be
    /// created at its native path.
    fn children(
        &self,
        rel: RelPathBuf,
        src: Option<Entry>,
        dst: Option<Entry>,
        src_dir: String,
        dst_dir: String,
    ) -> BoxFuture<'_, droidsync::Result<Subtree>> {
        Box::pin(async move {
            let mut src_tree = src.map(|e| Tree::new(rel.clone(), e));
            let mut dst_tree = dst.map(|e| Tree::new(rel.clone(), e));

            let (src_children, dst_children) = tokio::join!(
                expand(src_tree.as_mut(), &self.src),
                expand(dst_tree.as_mut(), &self.dst)
            );
            let empty = Level::default();
            let src_children = src_children?.unwrap_or(&empty);
            let dst_children = dst_children?.unwrap_or(&empty);

            let mut actions = Vec::new();

            let mut src_iter = src_children.iter();
            let mut dst_iter = dst_children.iter();
            let mut src_child = src_iter.next();
            let mut dst_child = dst_iter.next();

            loop {
                let (name, src_slot, dst_slot) = match (src_child, dst_child) {
                    (None, None) => break,
                    (Some((sn, ss)), Some((dn, ds))) => match sn.cmp(dn) {
                        Ordering::Equal => {
                            src_child = src_iter.next();
                            dst_child = dst_iter.next();
                            (sn, Some(ss), Some(ds))
                        }
                        Ordering::Less => {
                            src_child = src_iter.next();
                            (sn, Some(ss), None)
                        }
                        Ordering::Greater => {
                            dst_child = dst_iter.next();
                            (dn, None, Some(ds))
                        }
                    },
                    (Some((sn, ss)), None) => {
                        src_child = src_iter.next();
                        (sn, Some(ss), None)
                    }
                    (None, Some((dn, ds))) => {
                        dst_child = dst_iter.next();
                        (dn, None, Some(ds))
                    }
                };
                let child_actions = self
                    .child(&rel, name, src_slot, dst_slot, &src_dir, &dst_dir)
                    .await?;
                actions.extend(child_actions);
            }

            Ok(Subtree {
                actions,
                dst_hidden: dst_children.excluded() > 0,
            })
        })
    }

    async fn child(
        &self,
        parent: &RelPathBuf,
        name: &str,
        src: Option<&Slot>,
        dst: Option<&Slot>,
        src_dir: &str,
        dst_dir: &str,
    ) -> droidsync::Result<Vec<Action>> {
        let rel = parent.join(name);
        let src_entry = src.and_then(Slot::entry);
        let dst_entry = dst.and_then(Slot::entry);

        let src_path = match src_entry {
            Some(e) => e.path().to_string(),
            None => self.src.fs().join(src_dir, name),
        };
        let dst_path = match dst_entry {
            Some(e) => e.path().to_string(),
            None => self.dst.fs().join(dst_dir, name),
        };

        let collision = match (src, dst) {
            (Some(slot), _) if slot.is_collision() => Some((Side::Source, slot)),
            (_, Some(slot)) if slot.is_collision() => Some((Side::Destination, slot)),
            _ => None,
        };
        if let Some((side, slot)) = collision {
            let conflict = Conflict::NameCollision {
                side,
                names: slot.raw_names(),
            };
            log::warn!("conflict at {rel}: {conflict}");
            return Ok(vec![Action {
                path: rel,
                kind: ActionKind::Conflict,
                reason: Reason::Conflict(conflict),
                source: src_entry.cloned(),
                destination: dst_entry.cloned(),
                source_path: src_path,
                destination_path: dst_path,
            }]);
        }

        self.pair(
            rel,
            src_entry.cloned(),
            dst_entry.cloned(),
            src_path,
            dst_path,
        )
        .await
    }
}

async fn expand<'t, F, P>(
    tree: Option<&'t mut Tree>,
    walker: &Walker<'_, F, P>,
) -> droidsync::Result<Option<&'t Level>>
where
    F: FileSystem,
    P: Naming + Sync,
{
    match tree {
        Some(tree) => Ok(Some(tree.children(walker).await?)),
        None => Ok(None),
    }
}
