// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;

/// Initialize a repo with one commit on `main`.
async fn init_repo(dir: &TempDir) -> std::path::PathBuf {
    let root = dir.path().join("repo");
    std::fs::create_dir_all(&root).unwrap();
    for args in [
        vec!["init", "-b", "main"],
        vec!["config", "user.email", "coven@test"],
        vec!["config", "user.name", "coven"],
    ] {
        let out = tokio::process::Command::new("git")
            .arg("-C")
            .arg(&root)
            .args(&args)
            .output()
            .await
            .unwrap();
        assert!(out.status.success(), "git {args:?} failed");
    }
    std::fs::write(root.join("README.md"), "hello\n").unwrap();
    git(&root, &["add", "-A"]).await;
    git(&root, &["commit", "-m", "init"]).await;
    root
}

async fn git(dir: &std::path::Path, args: &[&str]) {
    let out = tokio::process::Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .await
        .unwrap();
    assert!(out.status.success(), "git {args:?}: {}", String::from_utf8_lossy(&out.stderr));
}

fn adapter(dir: &TempDir, root: &std::path::Path) -> GitWorktreeAdapter {
    GitWorktreeAdapter::new(root, dir.path().join("worktrees"), "main")
}

#[tokio::test]
async fn create_makes_branch_and_checkout() {
    let dir = TempDir::new().unwrap();
    let root = init_repo(&dir).await;
    let adapter = adapter(&dir, &root);

    let info = adapter.create(&coven_core::TaskId::from_string("task-1")).await.unwrap();
    assert_eq!(info.branch, "coven/task-1");
    assert!(info.path.join("README.md").exists());

    // Idempotent: a second create reuses the checkout.
    let again = adapter.create(&coven_core::TaskId::from_string("task-1")).await.unwrap();
    assert_eq!(again, info);
}

#[tokio::test]
async fn dirty_worktree_reports_uncommitted_changes_and_diff() {
    let dir = TempDir::new().unwrap();
    let root = init_repo(&dir).await;
    let adapter = adapter(&dir, &root);
    let info = adapter.create(&coven_core::TaskId::from_string("task-1")).await.unwrap();

    assert!(!adapter.has_uncommitted_changes(&info.path).await.unwrap());

    std::fs::write(info.path.join("README.md"), "hello\nchanged\n").unwrap();
    assert!(adapter.has_uncommitted_changes(&info.path).await.unwrap());
    assert!(adapter.diff(&info.path).await.unwrap().contains("+changed"));
}

#[tokio::test]
async fn commit_all_then_stats_and_clean_merge() {
    let dir = TempDir::new().unwrap();
    let root = init_repo(&dir).await;
    let adapter = adapter(&dir, &root);
    let info = adapter.create(&coven_core::TaskId::from_string("task-1")).await.unwrap();

    std::fs::write(info.path.join("feature.txt"), "one\ntwo\n").unwrap();
    adapter.commit_all(&info.path, "add feature").await.unwrap();

    assert_eq!(adapter.commits_ahead(&info.path).await.unwrap(), 1);
    let stats = adapter.numstat(&info.path).await.unwrap();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].path, "feature.txt");
    assert_eq!(stats[0].additions, 2);

    assert!(adapter.conflict_files(&info.path).await.unwrap().is_empty());
    assert_eq!(adapter.merge_to_target(&info.path).await.unwrap(), MergeOutcome::Merged);

    // main now carries the commit.
    let out = tokio::process::Command::new("git")
        .arg("-C")
        .arg(&root)
        .args(["rev-list", "--count", "main"])
        .output()
        .await
        .unwrap();
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "2");
}

#[tokio::test]
async fn conflicting_edits_are_detected_and_merge_blocks() {
    let dir = TempDir::new().unwrap();
    let root = init_repo(&dir).await;
    let adapter = adapter(&dir, &root);
    let info = adapter.create(&coven_core::TaskId::from_string("task-1")).await.unwrap();

    // Diverge: same line changed on main and on the worktree branch.
    std::fs::write(info.path.join("README.md"), "worktree version\n").unwrap();
    adapter.commit_all(&info.path, "worktree edit").await.unwrap();
    std::fs::write(root.join("README.md"), "main version\n").unwrap();
    git(&root, &["add", "-A"]).await;
    git(&root, &["commit", "-m", "main edit"]).await;

    let conflicts = adapter.conflict_files(&info.path).await.unwrap();
    assert_eq!(conflicts, vec!["README.md".to_string()]);

    match adapter.merge_to_target(&info.path).await.unwrap() {
        MergeOutcome::Conflicts { files } => assert_eq!(files, vec!["README.md".to_string()]),
        other => panic!("expected conflicts, got {other:?}"),
    }
    // The worktree is left usable for inspection.
    assert!(info.path.join("README.md").exists());
}

#[tokio::test]
async fn remove_deletes_checkout_and_branch() {
    let dir = TempDir::new().unwrap();
    let root = init_repo(&dir).await;
    let adapter = adapter(&dir, &root);
    let info = adapter.create(&coven_core::TaskId::from_string("task-1")).await.unwrap();

    adapter.remove(&info).await.unwrap();
    assert!(!info.path.exists());
}

#[test]
fn numstat_parses_binary_markers() {
    let stats = parse_numstat("3\t1\tsrc/lib.rs\n-\t-\tassets/logo.png\n");
    assert_eq!(stats.len(), 2);
    assert_eq!(stats[0].additions, 3);
    assert_eq!(stats[1].additions, 0);
    assert_eq!(stats[1].path, "assets/logo.png");
}
