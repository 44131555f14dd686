//! End-to-end tests for the `txfile` binary.

mod common;

use std::fs;

use common::*;
use predicates::prelude::*;
use tempfile::TempDir;

const PLAN: &str = r#"
[[op]]
kind = "mkdir"
path = "out/nested"

[[op]]
kind = "write"
path = "out/nested/hello.txt"
text = "hello"

[[op]]
kind = "append"
path = "notes.txt"
text = " world"

[[op]]
kind = "move"
from = "draft.txt"
to = "out/final.txt"
"#;

fn setup() -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("plan.toml"), PLAN).unwrap();
    fs::write(temp.path().join("notes.txt"), "hello").unwrap();
    fs::write(temp.path().join("draft.txt"), "draft").unwrap();
    temp
}

#[test]
fn test_apply_commits_plan() {
    let temp = setup();
    let scratch = temp.path().join(".scratch");

    run_txfile(temp.path(), &scratch, &["apply", "plan.toml"])
        .success()
        .stdout(predicate::str::contains("Changes committed"));

    assert_eq!(read(&temp.path().join("out/nested/hello.txt")), "hello");
    assert_eq!(read(&temp.path().join("notes.txt")), "hello world");
    assert_eq!(read(&temp.path().join("out/final.txt")), "draft");
    assert!(!temp.path().join("draft.txt").exists());
    assert_eq!(fs::read_dir(&scratch).unwrap().count(), 0);
}

#[test]
fn test_apply_abort_leaves_tree_untouched() {
    let temp = setup();
    let scratch = temp.path().join(".scratch");

    run_txfile(temp.path(), &scratch, &["apply", "plan.toml", "--abort"])
        .success()
        .stdout(predicate::str::contains("rolled back"));

    assert!(!temp.path().join("out").exists());
    assert_eq!(read(&temp.path().join("notes.txt")), "hello");
    assert_eq!(read(&temp.path().join("draft.txt")), "draft");
}

#[test]
fn test_failing_step_rolls_back_earlier_steps() {
    let temp = setup();
    let scratch = temp.path().join(".scratch");
    fs::remove_file(temp.path().join("draft.txt")).unwrap();

    run_txfile(temp.path(), &scratch, &["apply", "plan.toml"])
        .failure()
        .stderr(predicate::str::contains("step 4"))
        .stderr(predicate::str::contains("Rollback successful"));

    assert!(!temp.path().join("out").exists());
    assert_eq!(read(&temp.path().join("notes.txt")), "hello");
}

#[test]
fn test_no_transaction_keeps_partial_work() {
    let temp = setup();
    let scratch = temp.path().join(".scratch");
    fs::remove_file(temp.path().join("draft.txt")).unwrap();

    run_txfile(temp.path(), &scratch, &["apply", "plan.toml", "--no-transaction"]).failure();

    assert_eq!(read(&temp.path().join("out/nested/hello.txt")), "hello");
    assert_eq!(read(&temp.path().join("notes.txt")), "hello world");
}

#[test]
fn test_abort_conflicts_with_no_transaction() {
    let temp = setup();
    let scratch = temp.path().join(".scratch");

    run_txfile(
        temp.path(),
        &scratch,
        &["apply", "plan.toml", "--abort", "--no-transaction"],
    )
    .failure();

    assert!(!temp.path().join("out").exists());
}

#[test]
fn test_invalid_plan_is_reported() {
    let temp = TempDir::new().unwrap();
    let scratch = temp.path().join(".scratch");
    fs::write(
        temp.path().join("plan.toml"),
        "[[op]]\nkind = \"shred\"\npath = \"x\"\n",
    )
    .unwrap();

    run_txfile(temp.path(), &scratch, &["apply", "plan.toml"])
        .failure()
        .stderr(predicate::str::contains("unknown kind 'shred'"));
}

#[test]
fn test_root_flag_resolves_relative_paths() {
    let temp = TempDir::new().unwrap();
    let scratch = temp.path().join(".scratch");
    let target = temp.path().join("target");
    fs::create_dir(&target).unwrap();
    fs::write(
        temp.path().join("plan.toml"),
        "[[op]]\nkind = \"write\"\npath = \"x.txt\"\ntext = \"x\"\n",
    )
    .unwrap();

    run_txfile(
        temp.path(),
        &scratch,
        &["apply", "plan.toml", "--root", "target"],
    )
    .success();

    assert_eq!(read(&target.join("x.txt")), "x");
    assert!(!temp.path().join("x.txt").exists());
}

#[test]
fn test_sweep_removes_orphans() {
    let temp = TempDir::new().unwrap();
    let scratch = temp.path().join(".scratch");
    fs::create_dir_all(scratch.join("0a1b2c3d4e5f")).unwrap();
    fs::write(scratch.join("0a1b2c3d4e5f/inner.txt"), "x").unwrap();
    fs::write(scratch.join("9f8e7d6c5b4a.cfg"), "y").unwrap();

    run_txfile(temp.path(), &scratch, &["sweep", "--dry-run"])
        .success()
        .stdout(predicate::str::contains("would be removed"));
    assert_eq!(fs::read_dir(&scratch).unwrap().count(), 2);

    run_txfile(temp.path(), &scratch, &["sweep"])
        .success()
        .stdout(predicate::str::contains("Removed 2 of 2"));
    assert_eq!(fs::read_dir(&scratch).unwrap().count(), 0);
}

#[test]
fn test_sweep_min_age_keeps_fresh_backups() {
    let temp = TempDir::new().unwrap();
    let scratch = temp.path().join(".scratch");
    fs::create_dir_all(&scratch).unwrap();
    fs::write(scratch.join("fresh.txt"), "y").unwrap();

    run_txfile(temp.path(), &scratch, &["sweep", "--min-age", "3600"])
        .success()
        .stdout(predicate::str::contains("No orphaned backups"));
    assert!(scratch.join("fresh.txt").exists());
}

#[test]
fn test_sweep_leaves_temp_file_names_alone() {
    let temp = TempDir::new().unwrap();
    let files = manager(&temp);
    let scratch = files.scratch_dir().to_path_buf();
    fs::create_dir_all(&scratch).unwrap();
    let work = files.temp_file_name(Some("dat")).unwrap();
    fs::write(&work, "caller data").unwrap();

    run_txfile(temp.path(), &scratch, &["sweep"]).success();

    assert_eq!(read(&work), "caller data");
    fs::remove_file(&work).unwrap();
}
