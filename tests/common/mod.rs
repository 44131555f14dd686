//! Shared helpers for txfile integration tests.

use assert_cmd::cargo::cargo_bin_cmd;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use txfile::{Config, FileManager};

/// Manager whose scratch directory lives inside `temp`.
#[allow(unused)]
pub fn manager(temp: &TempDir) -> FileManager {
    FileManager::with_config(Config::default().with_scratch_dir(temp.path().join(".scratch")))
}

/// Same as [`manager`] with the log-and-continue rollback policy.
#[allow(unused)]
pub fn lenient_manager(temp: &TempDir) -> FileManager {
    FileManager::with_config(
        Config::default()
            .with_scratch_dir(temp.path().join(".scratch"))
            .with_ignore_rollback_errors(true),
    )
}

/// Number of entries left in the scratch directory (0 if it does not exist).
#[allow(unused)]
pub fn scratch_entries(files: &FileManager) -> usize {
    fs::read_dir(files.scratch_dir())
        .map(|entries| entries.count())
        .unwrap_or(0)
}

#[allow(unused)]
pub fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

/// Helper to run a `txfile` subcommand with an isolated scratch directory.
#[allow(unused)]
pub fn run_txfile(workdir: &Path, scratch: &Path, args: &[&str]) -> assert_cmd::assert::Assert {
    let mut cmd = cargo_bin_cmd!("txfile");
    cmd.args(args)
        .env("TXFILE_SCRATCH_DIR", scratch)
        .env_remove("RUST_LOG")
        .current_dir(workdir);

    cmd.assert()
}
