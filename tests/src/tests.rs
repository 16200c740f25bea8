use std::{collections::BTreeSet, time::Duration};

use droidsync::{
    Action, ActionKind, Config, Conflict, Direction, EntryKind, Error, ErrorKind, FailurePolicy,
    Plan, Reason, Side, SyncMode,
};
use droidsync_engine::{
    exec::{Halt, Outcome},
    report::LogReporter,
    storage::{
        device::{Adb, DeviceFs, DeviceOptions},
        local::LocalFs,
    },
    Engine,
};
use tokio_util::sync::CancellationToken;

use crate::{
    build_harness,
    dataset::{aged_file, dir, file, Dataset, Patch},
    device_harness, harness,
    harness::shape,
    stubs, utils,
};

fn actions_at<'a>(plan: &'a Plan, path: &str) -> Vec<&'a Action> {
    plan.iter().filter(|a| a.path == path).collect()
}

fn single_at<'a>(plan: &'a Plan, path: &str) -> &'a Action {
    let actions = actions_at(plan, path);
    assert_eq!(actions.len(), 1, "expected a single action at {path}: {actions:?}");
    actions[0]
}

fn position(plan: &Plan, path: &str) -> usize {
    plan.iter()
        .position(|a| a.path == path)
        .unwrap_or_else(|| panic!("no action at {path}"))
}

fn deleting() -> Config {
    Config {
        delete: true,
        ..Config::default()
    }
}

const PUSH_TO_DST: ActionKind = ActionKind::CreateFile {
    to: Side::Destination,
    direction: Direction::Push,
};

#[tokio::test]
async fn walk_is_depth_first_in_name_order() {
    let harness = harness(Dataset::default()).await;
    let tree = shape(&harness.src_tree().await);
    let paths: Vec<&str> = tree.iter().map(|(p, _)| p.as_str()).collect();
    assert_eq!(
        paths,
        [
            "both",
            "both/both.txt",
            "both/deep",
            "both/deep/file1.txt",
            "both/only-src.txt",
            "both.txt",
            "conflict",
            "newer.txt",
            "older.txt",
            "only-src",
            "only-src/deep",
            "only-src/deep/file1.txt",
            "only-src/file1.txt",
            "only-src/file2.txt",
            "only-src.txt",
        ]
    );
    assert_eq!(tree[0].1, EntryKind::Directory);
    assert_eq!(tree[1].1, EntryKind::File);
}

#[tokio::test]
async fn mirror_default_dataset() {
    let harness = harness(Dataset::default()).await;
    let plan = harness.plan(Config::default()).await;

    assert_eq!(single_at(&plan, "only-src.txt").kind, PUSH_TO_DST);
    assert_eq!(
        single_at(&plan, "only-src").kind,
        ActionKind::CreateDir {
            on: Side::Destination
        }
    );
    assert_eq!(
        single_at(&plan, "newer.txt").kind,
        ActionKind::UpdateFile {
            to: Side::Destination,
            direction: Direction::Push
        }
    );
    assert!(matches!(
        single_at(&plan, "older.txt").reason,
        Reason::NewerNotPropagated {
            side: Side::Destination,
            ..
        }
    ));
    assert_eq!(single_at(&plan, "both.txt").reason, Reason::WithinTolerance);
    assert_eq!(single_at(&plan, "only-dst").reason, Reason::DeletionDisabled);
    assert!(actions_at(&plan, "both").is_empty());
    assert!(single_at(&plan, "conflict").is_conflict());

    let execution = harness.run(Config::default()).await;
    assert_eq!(execution.halt, None);
    let counts = &execution.summary.counts;
    assert_eq!(counts.created, 7);
    assert_eq!(counts.updated, 1);
    assert_eq!(counts.deleted, 0);
    assert_eq!(counts.skipped, 7);
    assert_eq!(counts.conflicted, 1);
    assert_eq!(counts.failed, 0);
    assert_eq!(execution.summary.conflicts, ["conflict"]);

    assert_eq!(
        harness.dst_content("only-src/deep/file1.txt").await.as_deref(),
        Some("/only-src/deep/file1.txt")
    );
    assert_eq!(
        harness.dst_content("newer.txt").await.as_deref(),
        Some("/newer.txt - src")
    );
    assert_eq!(
        harness.dst_content("older.txt").await.as_deref(),
        Some("/older.txt - dst")
    );
    assert_eq!(
        harness.dst_content("only-dst.txt").await.as_deref(),
        Some("/only-dst.txt")
    );
}

#[tokio::test]
async fn second_run_only_skips() {
    let dataset = Dataset::new(
        vec![
            file("a.txt", "a"),
            dir("d", vec![file("b.txt", "b"), dir("e", vec![file("c.txt", "c")])]),
        ],
        vec![],
    );
    let harness = harness(dataset).await;

    let first = harness.run(deleting()).await;
    assert!(first.is_clean());
    assert_eq!(first.summary.counts.created, 5);

    let plan = harness.plan(deleting()).await;
    assert!(!plan.is_empty());
    assert!(plan.iter().all(Action::is_skip), "{plan:#?}");
}

#[cfg(unix)]
#[tokio::test]
async fn second_run_only_skips_with_symlinks() {
    let dataset = Dataset::new(
        vec![file("target.txt", "target"), dir("d", vec![file("b.txt", "b")])],
        vec![],
    );
    let harness = harness(dataset).await;
    tokio::fs::symlink("target.txt", harness.src_path("link"))
        .await
        .unwrap();
    tokio::fs::symlink("../target.txt", harness.src_path("d/link"))
        .await
        .unwrap();

    let first = harness.run(deleting()).await;
    assert!(first.is_clean());
    assert_eq!(first.summary.counts.created, 5);

    let plan = harness.plan(deleting()).await;
    assert!(plan.iter().all(Action::is_skip), "{plan:#?}");
    let action = single_at(&plan, "link");
    assert_eq!(action.reason, Reason::WithinTolerance);
    assert_eq!(
        action.source.as_ref().map(|e| e.kind()),
        Some(EntryKind::Symlink)
    );
    assert_eq!(
        action.destination.as_ref().map(|e| e.kind()),
        Some(EntryKind::File)
    );
}

#[tokio::test]
async fn second_run_only_skips_on_device() {
    let dataset = Dataset::new(
        vec![file("a.txt", "a"), dir("d", vec![file("b.txt", "b")])],
        vec![],
    );
    let harness = device_harness(dataset).await;

    let first = harness.run(deleting()).await;
    assert!(first.is_clean());
    assert_eq!(first.summary.mtime_not_preserved, 2);

    let plan = harness.plan(deleting()).await;
    assert!(plan.iter().all(Action::is_skip), "{plan:#?}");
}

#[tokio::test]
async fn only_mtime_differences_matter() {
    let dataset = Dataset::identical(Dataset::default().source)
        .apply_source(Patch::Age("both/both.txt", Duration::ZERO))
        .apply_source(Patch::Content("both.txt", "same age, other content".into()))
        .apply_destination(Patch::Delete("only-src/deep"));
    let harness = harness(dataset).await;

    let plan = harness.plan(deleting()).await;
    let effective: Vec<(&str, ActionKind)> = plan
        .iter()
        .filter(|a| !a.is_skip())
        .map(|a| (a.path.as_str(), a.kind))
        .collect();
    assert_eq!(
        effective,
        [
            (
                "both/both.txt",
                ActionKind::UpdateFile {
                    to: Side::Destination,
                    direction: Direction::Push
                }
            ),
            (
                "only-src/deep",
                ActionKind::CreateDir {
                    on: Side::Destination
                }
            ),
            ("only-src/deep/file1.txt", PUSH_TO_DST),
        ]
    );
    assert_eq!(single_at(&plan, "both.txt").reason, Reason::WithinTolerance);
}

#[tokio::test]
async fn every_source_only_path_is_created_once() {
    let harness = harness(Dataset::default()).await;

    let src: BTreeSet<String> = shape(&harness.src_tree().await)
        .into_iter()
        .map(|(p, _)| p)
        .collect();
    let dst: BTreeSet<String> = shape(&harness.dst_tree().await)
        .into_iter()
        .map(|(p, _)| p)
        .collect();

    let plan = harness.plan(deleting()).await;

    for path in src.difference(&dst) {
        let actions = actions_at(&plan, path);
        assert_eq!(actions.len(), 1, "{path}");
        assert!(
            matches!(
                actions[0].kind,
                ActionKind::CreateDir { .. } | ActionKind::CreateFile { .. }
            ),
            "{path}: {}",
            actions[0]
        );
        let idx = position(&plan, path);
        let early_removal = plan.actions()[..idx]
            .iter()
            .any(|a| a.kind.is_remove() && a.path.is_ancestor_of(&actions[0].path));
        assert!(!early_removal, "{path}");
    }
}

#[tokio::test]
async fn plan_order() {
    let harness = harness(Dataset::default()).await;
    let plan = harness.plan(deleting()).await;
    plan.check_order().unwrap();

    assert!(position(&plan, "only-src") < position(&plan, "only-src/deep"));
    assert!(position(&plan, "only-src/deep") < position(&plan, "only-src/deep/file1.txt"));
    assert!(position(&plan, "only-src") < position(&plan, "only-src/file2.txt"));

    assert_eq!(
        single_at(&plan, "only-dst").kind,
        ActionKind::RemoveDir {
            on: Side::Destination
        }
    );
    assert!(position(&plan, "only-dst/deep/file1.txt") < position(&plan, "only-dst/deep"));
    assert!(position(&plan, "only-dst/deep") < position(&plan, "only-dst"));
    assert!(position(&plan, "only-dst/file1.txt") < position(&plan, "only-dst"));

    let execution = harness.run(deleting()).await;
    assert_eq!(execution.summary.counts.deleted, 6);
    assert_eq!(execution.summary.counts.failed, 0);
    assert!(!harness.dst_path("only-dst").exists());
    assert!(!harness.dst_path("both/only-dst.txt").exists());
    // not touched because of the conflict
    assert!(harness.dst_path("conflict/inner.txt").exists());
}

#[tokio::test]
async fn plan_is_deterministic() {
    let harness = harness(Dataset::default()).await;
    let first = harness.plan(deleting()).await;
    let second = harness.plan(deleting()).await;
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[tokio::test]
async fn tolerance_boundary() {
    let tol = Duration::from_millis(Config::default().tolerance_ms);

    let at_boundary = Dataset::new(
        vec![file("f.txt", "src")],
        vec![aged_file("f.txt", "dst", tol)],
    );
    let harness = harness(at_boundary).await;
    let plan = harness.plan(Config::default()).await;
    let action = single_at(&plan, "f.txt");
    assert_eq!(action.kind, ActionKind::Skip);
    assert_eq!(action.reason, Reason::WithinTolerance);

    let beyond = Dataset::new(
        vec![file("f.txt", "src")],
        vec![aged_file("f.txt", "dst", tol + Duration::from_millis(1))],
    );
    let harness = crate::harness(beyond).await;
    let plan = harness.plan(Config::default()).await;
    let action = single_at(&plan, "f.txt");
    assert!(matches!(action.kind, ActionKind::UpdateFile { .. }));
    assert_eq!(
        action.reason,
        Reason::Newer {
            side: Side::Source,
            by_ms: 2001
        }
    );
}

#[tokio::test]
async fn huge_tolerance_skips_everything() {
    let harness = harness(Dataset::default()).await;
    let config = Config {
        tolerance_ms: 10_000_000_000_000_000,
        ..Config::default()
    };
    let plan = harness.plan(config).await;
    assert_eq!(single_at(&plan, "newer.txt").reason, Reason::WithinTolerance);
    assert_eq!(single_at(&plan, "older.txt").reason, Reason::WithinTolerance);

    let config = Config {
        tolerance_ms: u64::MAX,
        mode: SyncMode::TwoWay,
        ..Config::default()
    };
    let plan = harness.plan(config).await;
    assert!(!plan
        .iter()
        .any(|a| matches!(a.kind, ActionKind::UpdateFile { .. })));
}

#[tokio::test]
async fn kind_mismatch_is_never_resolved() {
    let dataset = Dataset::new(
        vec![file("x", "src file")],
        vec![dir("x", vec![file("y", "dst file")])],
    );
    let harness = harness(dataset).await;

    let plan = harness.plan(deleting()).await;
    assert_eq!(plan.len(), 1);
    assert_eq!(plan.conflicts().count(), 1);
    let action = single_at(&plan, "x");
    assert_eq!(action.kind, ActionKind::Conflict);
    assert_eq!(
        action.conflict(),
        Some(&Conflict::KindMismatch {
            source: EntryKind::File,
            destination: EntryKind::Directory
        })
    );

    let execution = harness.run(deleting()).await;
    assert_eq!(execution.halt, None);
    assert_eq!(execution.summary.counts.conflicted, 1);
    assert_eq!(execution.summary.counts.failed, 0);
    assert!(matches!(
        &execution.results[0].outcome,
        Outcome::Failed(err) if err.kind() == ErrorKind::Conflict
    ));
    assert_eq!(harness.dst_content("x/y").await.as_deref(), Some("dst file"));
}

#[tokio::test]
async fn conflict_does_not_block_siblings() {
    let dataset = Dataset::new(
        vec![file("a", "a"), file("x", "x"), file("z", "z")],
        vec![dir("x", vec![])],
    );
    let harness = harness(dataset).await;
    let execution = harness.run(Config::default()).await;
    assert_eq!(execution.halt, None);
    assert_eq!(execution.summary.counts.created, 2);
    assert_eq!(execution.summary.counts.conflicted, 1);
    assert!(harness.dst_path("z").exists());
}

#[tokio::test]
async fn update_newer_source_file() {
    let dataset = Dataset::new(
        vec![dir("a", vec![file("b.txt", "new content")])],
        vec![dir(
            "a",
            vec![aged_file("b.txt", "old content", Duration::from_secs(5))],
        )],
    );
    let harness = harness(dataset).await;

    let plan = harness.plan(Config::default()).await;
    assert_eq!(plan.effective_len(), 1);
    let action = single_at(&plan, "a/b.txt");
    assert_eq!(
        action.kind,
        ActionKind::UpdateFile {
            to: Side::Destination,
            direction: Direction::Push
        }
    );
    assert_eq!(action.reason.to_string(), "source newer by 5.000s");

    let execution = harness.run(Config::default()).await;
    assert_eq!(execution.summary.counts.updated, 1);
    assert_eq!(execution.summary.transferred_bytes, "new content".len() as u64);
    assert_eq!(execution.summary.mtime_not_preserved, 0);
    assert_eq!(
        harness.dst_content("a/b.txt").await.as_deref(),
        Some("new content")
    );

    let src_mtime = utils::mtime(&harness.src_path("a/b.txt")).await;
    let dst_mtime = utils::mtime(&harness.dst_path("a/b.txt")).await;
    let diff = match src_mtime.duration_since(dst_mtime) {
        Ok(d) => d,
        Err(err) => err.duration(),
    };
    assert!(diff < Duration::from_secs(1), "{diff:?}");
}

#[tokio::test]
async fn orphan_kept_without_deletion() {
    let dataset = Dataset::new(
        vec![dir("c", vec![])],
        vec![dir("c", vec![file("old.bin", "old")])],
    );
    let harness = harness(dataset).await;

    let plan = harness.plan(Config::default()).await;
    let action = single_at(&plan, "c/old.bin");
    assert_eq!(action.kind, ActionKind::Skip);
    assert_eq!(action.reason, Reason::DeletionDisabled);
    assert!(!plan
        .iter()
        .any(|a| matches!(a.kind, ActionKind::RemoveFile { .. })));

    let execution = harness.run(Config::default()).await;
    assert!(execution.summary.counts.skipped >= 1);
    assert_eq!(execution.summary.counts.deleted, 0);
    assert!(harness.dst_path("c/old.bin").exists());
}

#[tokio::test]
async fn exclude_patterns_hide_entries() {
    let harness = harness(Dataset::default()).await;
    let config = Config {
        exclude: vec!["deep".into(), "*.txt".into()],
        delete: true,
        ..Config::default()
    };
    let plan = harness.plan(config.clone()).await;
    assert!(plan.iter().all(|a| !a.path.as_str().contains("deep")));
    assert!(plan.iter().all(|a| !a.path.as_str().ends_with(".txt")));

    // only-dst keeps excluded content, so it can't be removed
    let action = single_at(&plan, "only-dst");
    assert_eq!(action.kind, ActionKind::Skip);
    assert_eq!(action.reason, Reason::NotEmptied);

    let execution = harness.run(config).await;
    assert_eq!(execution.summary.counts.failed, 0);
    assert!(harness.dst_path("only-src").is_dir());
    assert!(!harness.dst_path("only-src/file1.txt").exists());
    assert!(harness.dst_path("only-dst/file1.txt").exists());
}

#[tokio::test]
async fn two_way_newest_wins() {
    let harness = harness(Dataset::default()).await;
    let config = Config {
        mode: SyncMode::TwoWay,
        delete: true,
        ..Config::default()
    };
    let plan = harness.plan(config.clone()).await;

    assert!(plan.iter().all(|a| !a.kind.is_remove()));
    assert_eq!(
        single_at(&plan, "older.txt").kind,
        ActionKind::UpdateFile {
            to: Side::Source,
            direction: Direction::Push
        }
    );
    assert_eq!(
        single_at(&plan, "newer.txt").kind,
        ActionKind::UpdateFile {
            to: Side::Destination,
            direction: Direction::Push
        }
    );
    assert_eq!(
        single_at(&plan, "only-dst").kind,
        ActionKind::CreateDir { on: Side::Source }
    );
    assert_eq!(
        single_at(&plan, "both/only-dst.txt").kind,
        ActionKind::CreateFile {
            to: Side::Source,
            direction: Direction::Push
        }
    );

    let execution = harness.run(config).await;
    assert_eq!(execution.summary.counts.failed, 0);
    assert_eq!(execution.summary.counts.deleted, 0);
    assert_eq!(
        harness.src_content("older.txt").await.as_deref(),
        Some("/older.txt - dst")
    );
    assert_eq!(
        harness.dst_content("newer.txt").await.as_deref(),
        Some("/newer.txt - src")
    );
    assert_eq!(
        harness.src_content("only-dst/deep/file1.txt").await.as_deref(),
        Some("/only-dst/deep/file1.txt")
    );
    assert_eq!(
        harness.dst_content("only-src.txt").await.as_deref(),
        Some("/only-src.txt")
    );
}

#[tokio::test]
async fn destination_to_source() {
    let harness = harness(Dataset::default()).await;
    let config = Config {
        mode: SyncMode::DestinationToSource,
        ..Config::default()
    };
    let plan = harness.plan(config.clone()).await;

    let action = single_at(&plan, "only-dst.txt");
    assert_eq!(
        action.kind,
        ActionKind::CreateFile {
            to: Side::Source,
            direction: Direction::Push
        }
    );
    assert_eq!(action.reason, Reason::Missing { side: Side::Source });
    assert!(action.destination.is_some());
    assert!(action.source_path.ends_with("only-dst.txt"));
    assert!(action.source_path.starts_with(utils::path_str(&harness.src_root)));

    assert_eq!(
        single_at(&plan, "older.txt").kind,
        ActionKind::UpdateFile {
            to: Side::Source,
            direction: Direction::Push
        }
    );
    assert!(matches!(
        single_at(&plan, "newer.txt").reason,
        Reason::NewerNotPropagated {
            side: Side::Source,
            ..
        }
    ));
    assert_eq!(single_at(&plan, "only-src").reason, Reason::DeletionDisabled);

    let execution = harness.run(config).await;
    assert_eq!(execution.summary.counts.failed, 0);
    assert_eq!(
        harness.src_content("only-dst.txt").await.as_deref(),
        Some("/only-dst.txt")
    );
    assert_eq!(
        harness.src_content("older.txt").await.as_deref(),
        Some("/older.txt - dst")
    );
}

#[tokio::test]
async fn device_names_are_sanitized() {
    let dataset = Dataset::new(vec![file("c:d.txt", "colon")], vec![]);
    let harness = device_harness(dataset).await;

    let plan = harness.plan(Config::default()).await;
    let action = single_at(&plan, "c_d.txt");
    assert_eq!(action.kind, PUSH_TO_DST);
    assert!(action.destination_path.ends_with("c_d.txt"));
    assert!(action.source_path.ends_with("c:d.txt"));

    let execution = harness.run(Config::default()).await;
    assert_eq!(execution.summary.counts.created, 1);
    assert_eq!(execution.summary.mtime_not_preserved, 1);
    assert_eq!(
        harness.dst_content("c_d.txt").await.as_deref(),
        Some("colon")
    );

    let plan = harness.plan(Config::default()).await;
    assert_eq!(plan.effective_len(), 0);
}

#[tokio::test]
async fn sanitized_name_collision_is_a_conflict() {
    let dataset = Dataset::new(
        vec![
            file("a:b.txt", "colon"),
            file("a?b.txt", "question mark"),
            file("other.txt", "other"),
        ],
        vec![],
    );
    let harness = device_harness(dataset).await;

    let plan = harness.plan(Config::default()).await;
    let action = single_at(&plan, "a_b.txt");
    assert_eq!(
        action.conflict(),
        Some(&Conflict::NameCollision {
            side: Side::Source,
            names: vec!["a:b.txt".into(), "a?b.txt".into()]
        })
    );

    let execution = harness.run(Config::default()).await;
    assert_eq!(execution.summary.counts.conflicted, 1);
    assert_eq!(execution.summary.counts.created, 1);
    assert!(!harness.dst_path("a_b.txt").exists());
    assert!(harness.dst_path("other.txt").exists());
}

#[tokio::test]
async fn pull_from_device() {
    let dataset = Dataset::new(
        vec![dir("DCIM", vec![file("img.jpg", "jpeg data")])],
        vec![],
    );
    let harness = build_harness(dataset, stubs::device::Stub::default(), LocalFs::default()).await;

    let plan = harness.plan(Config::default()).await;
    assert_eq!(
        single_at(&plan, "DCIM/img.jpg").kind,
        ActionKind::CreateFile {
            to: Side::Destination,
            direction: Direction::Pull
        }
    );

    let execution = harness.run(Config::default()).await;
    assert!(execution.is_clean());
    assert_eq!(execution.summary.mtime_not_preserved, 0);
    assert_eq!(
        harness.dst_content("DCIM/img.jpg").await.as_deref(),
        Some("jpeg data")
    );
}

fn blocked_dataset() -> Dataset {
    Dataset::new(
        vec![
            dir("a", vec![file("f1", "1"), file("f2", "2")]),
            file("b.txt", "b"),
        ],
        vec![],
    )
}

#[tokio::test]
async fn failure_aborts_by_default() {
    let harness = harness(blocked_dataset()).await;
    let engine = harness.engine(Config::default());
    let plan = engine.plan().await.unwrap();

    // a file now stands where the directory is to be created
    tokio::fs::write(harness.dst_path("a"), "in the way").await.unwrap();

    let execution = engine
        .execute(plan, &mut LogReporter, &CancellationToken::new())
        .await;
    assert_eq!(execution.halt, Some(Halt::Aborted));
    assert_eq!(execution.results.len(), 1);
    assert!(matches!(
        &execution.results[0].outcome,
        Outcome::Failed(Error::NotADirectory(..))
    ));
    assert_eq!(execution.summary.counts.failed, 1);
    assert!(!harness.dst_path("b.txt").exists());
}

#[tokio::test]
async fn keep_going_blocks_descendants() {
    let harness = harness(blocked_dataset()).await;
    let config = Config {
        failure_policy: FailurePolicy::Continue,
        ..Config::default()
    };
    let engine = harness.engine(config);
    let plan = engine.plan().await.unwrap();

    tokio::fs::write(harness.dst_path("a"), "in the way").await.unwrap();

    let execution = engine
        .execute(plan, &mut LogReporter, &CancellationToken::new())
        .await;
    assert_eq!(execution.halt, None);
    assert_eq!(execution.results.len(), 4);
    for result in execution.results[1..3].iter() {
        assert!(
            matches!(
                &result.outcome,
                Outcome::Skipped(Reason::Blocked { path }) if *path == "a"
            ),
            "{:?}",
            result.outcome
        );
    }
    let counts = &execution.summary.counts;
    assert_eq!(counts.failed, 1);
    assert_eq!(counts.skipped, 2);
    assert_eq!(counts.created, 1);
    assert_eq!(execution.summary.failures.len(), 1);
    assert_eq!(execution.summary.failures[0].0, "a");
    assert!(harness.dst_path("b.txt").exists());
}

#[tokio::test]
async fn cancelled_before_first_action() {
    let harness = harness(blocked_dataset()).await;
    let engine = harness.engine(Config::default());
    let plan = engine.plan().await.unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let execution = engine.execute(plan, &mut LogReporter, &token).await;
    assert_eq!(execution.halt, Some(Halt::Cancelled));
    assert!(execution.results.is_empty());
    assert!(!harness.dst_path("b.txt").exists());
}

#[tokio::test]
async fn dry_run_changes_nothing() {
    let harness = harness(Dataset::default()).await;
    let config = Config {
        dry_run: true,
        delete: true,
        ..Config::default()
    };
    let execution = harness.run(config).await;
    assert!(execution.results.is_empty());
    assert_eq!(execution.summary.counts.created, 7);
    assert_eq!(execution.summary.counts.deleted, 6);
    assert_eq!(execution.summary.counts.updated, 1);
    assert!(!harness.dst_path("only-src.txt").exists());
    assert!(harness.dst_path("only-dst.txt").exists());
}

#[tokio::test]
async fn missing_destination_root_is_created() {
    let harness = harness(Dataset::new(vec![file("a.txt", "a")], vec![])).await;
    let dst_root = harness.dst_root.join("new").join("root");
    let engine = Engine::new(
        LocalFs::default(),
        utils::path_str(&harness.src_root),
        LocalFs::default(),
        utils::path_str(&dst_root),
        Config::default(),
    )
    .unwrap();

    let plan = engine.plan().await.unwrap();
    assert_eq!(plan.len(), 2);
    assert!(plan.actions()[0].path.is_root());
    assert_eq!(
        plan.actions()[0].kind,
        ActionKind::CreateDir {
            on: Side::Destination
        }
    );

    let execution = engine
        .run(&mut LogReporter, &CancellationToken::new())
        .await
        .unwrap();
    assert!(execution.is_clean());
    assert_eq!(
        utils::file_content(&dst_root.join("a.txt")).await.as_deref(),
        Some("a")
    );
}

#[tokio::test]
async fn source_root_can_be_a_file() {
    let harness = harness(Dataset::new(vec![file("single.txt", "single")], vec![])).await;
    let src_root = harness.src_root.join("single.txt");
    let dst_root = harness.dst_root.join("copy.txt");
    let engine = Engine::new(
        LocalFs::default(),
        utils::path_str(&src_root),
        LocalFs::default(),
        utils::path_str(&dst_root),
        Config::default(),
    )
    .unwrap();

    let plan = engine.plan().await.unwrap();
    assert_eq!(plan.len(), 1);
    assert!(plan.actions()[0].path.is_root());
    assert_eq!(plan.actions()[0].kind, PUSH_TO_DST);

    let execution = engine
        .run(&mut LogReporter, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(execution.summary.counts.created, 1);
    assert_eq!(
        utils::file_content(&dst_root).await.as_deref(),
        Some("single")
    );
}

#[tokio::test]
async fn missing_source_root_fails() {
    let harness = harness(Dataset::new(vec![], vec![])).await;
    let engine = Engine::new(
        LocalFs::default(),
        utils::path_str(&harness.src_root.join("nothing")),
        LocalFs::default(),
        utils::path_str(&harness.dst_root),
        Config::default(),
    )
    .unwrap();
    let err = engine.plan().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn relative_device_root_is_rejected() {
    let device = DeviceFs::new(Adb::default(), DeviceOptions::default());
    let err = Engine::new(
        LocalFs::default(),
        "/home/user/Pictures",
        device,
        "sdcard/DCIM",
        Config::default(),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPath);
}

#[test]
fn unreachable_backends_are_rejected() {
    let err = Engine::new(
        stubs::device::Stub::default(),
        "/sdcard/a",
        stubs::device::Stub::default(),
        "/sdcard/b",
        Config::default(),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Other);
}

#[cfg(unix)]
#[tokio::test]
async fn symlinks_are_transferred_as_files() {
    let harness = harness(Dataset::new(vec![file("target.txt", "target")], vec![])).await;
    tokio::fs::symlink("target.txt", harness.src_path("link"))
        .await
        .unwrap();

    let plan = harness.plan(Config::default()).await;
    let action = single_at(&plan, "link");
    assert_eq!(action.kind, PUSH_TO_DST);
    assert_eq!(
        action.source.as_ref().map(|e| e.kind()),
        Some(EntryKind::Symlink)
    );

    let execution = harness.run(Config::default()).await;
    assert!(execution.is_clean());
    assert_eq!(harness.dst_content("link").await.as_deref(), Some("target"));
}

#[cfg(unix)]
#[tokio::test]
async fn symlinked_roots_are_followed() {
    let dataset = Dataset::new(
        vec![dir("pictures", vec![file("a.txt", "a")])],
        vec![dir("backup", vec![])],
    );
    let harness = harness(dataset).await;
    let src_link = harness.root.join("src-link");
    let dst_link = harness.root.join("dst-link");
    tokio::fs::symlink(harness.src_path("pictures"), &src_link)
        .await
        .unwrap();
    tokio::fs::symlink(harness.dst_path("backup"), &dst_link)
        .await
        .unwrap();

    let engine = Engine::new(
        LocalFs::default(),
        utils::path_str(&src_link),
        LocalFs::default(),
        utils::path_str(&dst_link),
        Config::default(),
    )
    .unwrap();
    let plan = engine.plan().await.unwrap();
    assert_eq!(plan.len(), 1, "{plan:#?}");
    assert_eq!(single_at(&plan, "a.txt").kind, PUSH_TO_DST);

    let execution = engine
        .run(&mut LogReporter, &CancellationToken::new())
        .await
        .unwrap();
    assert!(execution.is_clean());
    assert_eq!(
        harness.dst_content("backup/a.txt").await.as_deref(),
        Some("a")
    );
    assert!(tokio::fs::symlink_metadata(&dst_link)
        .await
        .unwrap()
        .file_type()
        .is_symlink());
}

#[cfg(unix)]
#[tokio::test]
async fn symlinked_root_into_missing_destination() {
    let harness = harness(Dataset::new(
        vec![dir("pictures", vec![file("a.txt", "a")])],
        vec![],
    ))
    .await;
    let src_link = harness.root.join("src-link");
    tokio::fs::symlink(harness.src_path("pictures"), &src_link)
        .await
        .unwrap();
    let dst_root = harness.dst_path("copy");

    let engine = Engine::new(
        LocalFs::default(),
        utils::path_str(&src_link),
        LocalFs::default(),
        utils::path_str(&dst_root),
        Config::default(),
    )
    .unwrap();
    let plan = engine.plan().await.unwrap();
    assert_eq!(plan.len(), 2, "{plan:#?}");
    assert_eq!(
        plan.actions()[0].kind,
        ActionKind::CreateDir {
            on: Side::Destination
        }
    );
    assert_eq!(single_at(&plan, "a.txt").kind, PUSH_TO_DST);

    let execution = engine
        .run(&mut LogReporter, &CancellationToken::new())
        .await
        .unwrap();
    assert!(execution.is_clean());
    assert!(dst_root.is_dir());
    assert_eq!(harness.dst_content("copy/a.txt").await.as_deref(), Some("a"));
}

#[cfg(unix)]
#[tokio::test]
async fn read_only_files_keep_their_mtime() {
    use std::os::unix::fs::PermissionsExt;

    let dataset = Dataset::new(
        vec![file("ro.txt", "read only")],
        vec![aged_file("ro-dst.txt", "read only too", Duration::from_secs(60))],
    );
    let harness = harness(dataset).await;
    for path in [harness.src_path("ro.txt"), harness.dst_path("ro-dst.txt")] {
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o444))
            .await
            .unwrap();
    }
    let config = Config {
        mode: SyncMode::TwoWay,
        ..Config::default()
    };

    let first = harness.run(config.clone()).await;
    assert!(first.is_clean());
    assert_eq!(first.summary.counts.created, 2);
    assert_eq!(first.summary.mtime_not_preserved, 0);

    let plan = harness.plan(config).await;
    assert!(plan.iter().all(Action::is_skip), "{plan:#?}");
}
