//! Per-transaction journal of compensating actions.
//!
//! ## Execution Guarantees
//!
//! - **Eager**: every mutation hits the file system before the call returns
//! - **Capture first**: the compensating action exists before the mutation
//!   runs, and is disposed if the mutation fails
//! - **LIFO undo**: rollback walks the journal newest to oldest
//! - **Always completes**: commit, rollback and in-doubt all clear the
//!   journal and deregister, even when an undo step fails
//!
//! ## States
//!
//! 1. **Unregistered**: created, not yet known to the coordinator
//! 2. **Registered**: enlisted as a volatile participant; accepts operations
//! 3. **Completing**: prepare was called; no further operations
//! 4. **Completed**: committed or rolled back; removed from the registry

use super::{Participant, TransactionContext, TransactionId, Vote, registry};
use crate::error::{Result, TxError};
use crate::fs::action::{CompensatingAction, dispose_all};
use crate::fs::temp::TempStore;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnlistmentState {
    Unregistered,
    Registered,
    Completing,
    Completed,
}

#[derive(Debug)]
struct Journal {
    state: EnlistmentState,
    actions: Vec<CompensatingAction>,
}

/// Journal bound to one ambient transaction, or an anonymous single-use
/// journal when no transaction is present.
#[derive(Debug)]
pub struct Enlistment {
    id: Option<TransactionId>,
    store: TempStore,
    ignore_rollback_errors: bool,
    journal: Mutex<Journal>,
}

impl Enlistment {
    /// Creates a journal for the transaction `id`.
    pub fn new(id: TransactionId, store: TempStore, ignore_rollback_errors: bool) -> Self {
        Self::build(Some(id), store, ignore_rollback_errors)
    }

    /// Creates a journal that is never registered and discards its actions
    /// as soon as each operation returns.
    pub fn anonymous(store: TempStore) -> Self {
        Self::build(None, store, false)
    }

    fn build(id: Option<TransactionId>, store: TempStore, ignore_rollback_errors: bool) -> Self {
        Self {
            id,
            store,
            ignore_rollback_errors,
            journal: Mutex::new(Journal {
                state: EnlistmentState::Unregistered,
                actions: Vec::new(),
            }),
        }
    }

    pub fn id(&self) -> Option<TransactionId> {
        self.id
    }

    pub fn state(&self) -> EnlistmentState {
        self.lock().state
    }

    /// True once the coordinator knows about this enlistment.
    pub fn is_registered(&self) -> bool {
        self.state() != EnlistmentState::Unregistered
    }

    pub fn len(&self) -> usize {
        self.lock().actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().actions.is_empty()
    }

    /// Snapshot of the journal, oldest first.
    pub fn actions(&self) -> Vec<CompensatingAction> {
        self.lock().actions.clone()
    }

    /// Enlists as a volatile participant of `ctx`.
    pub(crate) fn register(self: &Arc<Self>, ctx: &dyn TransactionContext) -> Result<()> {
        let participant: Arc<dyn Participant> = Arc::clone(self) as Arc<dyn Participant>;
        ctx.enlist_volatile(participant)?;

        let mut journal = self.lock();
        if journal.state == EnlistmentState::Unregistered {
            journal.state = EnlistmentState::Registered;
        }
        log::debug!("Enlisted in transaction {}", ctx.id());
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Journal> {
        self.journal
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_active(&self) -> Result<()> {
        let Some(id) = self.id else {
            return Ok(());
        };
        match self.lock().state {
            EnlistmentState::Unregistered | EnlistmentState::Registered => Ok(()),
            EnlistmentState::Completing | EnlistmentState::Completed => {
                Err(TxError::TransactionInactive(id))
            }
        }
    }
}

// Operations. Each one captures, mutates, then journals.
impl Enlistment {
    pub fn append_text(&self, path: &Path, text: &str) -> Result<()> {
        self.ensure_active()?;
        let actions = self.capture_files(&[path])?;
        self.apply(actions, || {
            fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)
                .and_then(|mut file| file.write_all(text.as_bytes()))
                .map_err(|e| TxError::operation("append to", path, e))
        })
    }

    pub fn copy(&self, from: &Path, to: &Path, overwrite: bool) -> Result<()> {
        self.ensure_active()?;
        if !overwrite && fs::symlink_metadata(to).is_ok() {
            return Err(TxError::operation(
                "copy to",
                to,
                io::Error::new(io::ErrorKind::AlreadyExists, "destination already exists"),
            ));
        }

        let actions = self.capture_files(&[to])?;
        self.apply(actions, || {
            fs::copy(from, to)
                .map(|_| ())
                .map_err(|e| TxError::operation("copy", from, e))
        })?;
        log::debug!("Copied: {} → {}", from.display(), to.display());
        Ok(())
    }

    /// Creates `path` and any missing parents, journaling one marker per
    /// directory that did not exist yet.
    pub fn create_directory(&self, path: &Path) -> Result<()> {
        self.ensure_active()?;
        let path = std::path::absolute(path)?;

        let mut actions = Vec::new();
        for segment in root_to_leaf(&path) {
            match fs::metadata(&segment) {
                Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                    log::debug!("Cannot probe {}, skipping", segment.display());
                }
                _ => {
                    let marker = CompensatingAction::capture_directory_creation(&segment)?;
                    if matches!(marker, CompensatingAction::DirectoryCreation { existed: false, .. }) {
                        actions.push(marker);
                    }
                }
            }
        }

        self.apply(actions, || {
            fs::create_dir_all(&path).map_err(|e| TxError::operation("create directory", &path, e))
        })
    }

    /// Deletes a file. Deleting a missing file succeeds without journaling.
    pub fn delete(&self, path: &Path) -> Result<()> {
        self.ensure_active()?;
        match fs::symlink_metadata(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("Nothing to delete at {}", path.display());
                return Ok(());
            }
            _ => {}
        }

        let actions = self.capture(&[path], CompensatingAction::capture_entry)?;
        self.apply(actions, || {
            fs::remove_file(path).map_err(|e| TxError::operation("delete", path, e))
        })
    }

    /// Deletes a directory tree after copying it to scratch storage.
    pub fn delete_directory(&self, path: &Path) -> Result<()> {
        self.ensure_active()?;
        let actions = vec![CompensatingAction::capture_directory(path, &self.store)?];
        self.apply(actions, || {
            fs::remove_dir_all(path).map_err(|e| TxError::operation("delete directory", path, e))
        })
    }

    /// Moves a file, replacing `to` if it exists. Both locations are backed up.
    pub fn move_file(&self, from: &Path, to: &Path) -> Result<()> {
        self.ensure_active()?;
        let actions = self.capture(&[from, to], CompensatingAction::capture_entry)?;
        self.apply(actions, || {
            let moved = match fs::rename(from, to) {
                Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                    fs::copy(from, to).and_then(|_| fs::remove_file(from))
                }
                other => other,
            };
            moved.map_err(|e| TxError::operation("move", from, e))
        })?;
        log::debug!("Moved: {} → {}", from.display(), to.display());
        Ok(())
    }

    /// Journals a backup of `path` without touching it.
    pub fn snapshot(&self, path: &Path) -> Result<()> {
        self.ensure_active()?;
        let actions = self.capture_files(&[path])?;
        self.apply(actions, || Ok(()))
    }

    pub fn write_bytes(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.ensure_active()?;
        let actions = self.capture_files(&[path])?;
        self.apply(actions, || {
            fs::write(path, contents).map_err(|e| TxError::operation("write", path, e))
        })
    }

    /// Captures a file backup per path, following symlinks to the content
    /// that will change.
    fn capture_files(&self, paths: &[&Path]) -> Result<Vec<CompensatingAction>> {
        self.capture(paths, CompensatingAction::capture_file)
    }

    /// Runs `capture` per path; on failure, earlier captures are disposed.
    fn capture<C>(&self, paths: &[&Path], capture: C) -> Result<Vec<CompensatingAction>>
    where
        C: Fn(&Path, &TempStore) -> Result<CompensatingAction>,
    {
        let mut actions = Vec::with_capacity(paths.len());
        for &path in paths {
            match capture(path, &self.store) {
                Ok(action) => actions.push(action),
                Err(e) => {
                    dispose_all(&mut actions);
                    return Err(e);
                }
            }
        }
        Ok(actions)
    }

    fn apply<F>(&self, mut actions: Vec<CompensatingAction>, mutation: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        if let Err(e) = mutation() {
            dispose_all(&mut actions);
            return Err(e);
        }

        let Some(id) = self.id else {
            // Direct mode: nothing can roll this back later.
            dispose_all(&mut actions);
            return Ok(());
        };

        let mut journal = self.lock();
        if matches!(
            journal.state,
            EnlistmentState::Completing | EnlistmentState::Completed
        ) {
            drop(journal);
            log::warn!("Transaction {} completed mid-operation, undoing it", id);
            while let Some(mut action) = actions.pop() {
                if let Err(e) = action.undo().and_then(|()| action.dispose()) {
                    log::warn!("{}", e);
                }
            }
            return Err(TxError::TransactionInactive(id));
        }
        journal.actions.extend(actions);
        log::debug!("Journal now has {} actions", journal.actions.len());
        Ok(())
    }
}

// Completion.
impl Enlistment {
    fn take_actions(&self) -> Vec<CompensatingAction> {
        let mut journal = self.lock();
        journal.state = EnlistmentState::Completing;
        std::mem::take(&mut journal.actions)
    }

    fn finish(&self) {
        self.lock().state = EnlistmentState::Completed;
        if let Some(id) = self.id {
            registry::remove(id);
        }
    }

    fn unwind(&self) -> Result<()> {
        let actions = self.take_actions();
        let result = self.undo_all(actions);
        self.finish();
        result
    }

    /// Undoes actions newest first.
    fn undo_all(&self, mut actions: Vec<CompensatingAction>) -> Result<()> {
        if actions.is_empty() {
            return Ok(());
        }
        log::warn!("Rolling back {} operations...", actions.len());

        while let Some(mut action) = actions.pop() {
            let outcome = action.undo().and_then(|()| action.dispose());
            let Err(e) = outcome else {
                continue;
            };

            if self.ignore_rollback_errors {
                match action.backup() {
                    Some(backup) => log::warn!(
                        "Ignoring rollback error: {} (backup kept at {})",
                        e,
                        backup.display()
                    ),
                    None => log::warn!("Ignoring rollback error: {}", e),
                }
                continue;
            }

            let kept: Vec<String> = actions
                .iter()
                .chain(std::iter::once(&action))
                .filter_map(CompensatingAction::backup)
                .map(|p| p.display().to_string())
                .collect();
            if !kept.is_empty() {
                log::error!("Rollback stopped; backups left in place: {}", kept.join(", "));
            }
            return Err(TxError::RollbackFailed(format!(
                "{} ({} operations not undone)",
                e,
                actions.len()
            )));
        }

        log::info!("Rollback completed");
        Ok(())
    }
}

impl Participant for Enlistment {
    fn prepare(&self) -> Vote {
        // Every mutation already happened; there is nothing left to check.
        self.lock().state = EnlistmentState::Completing;
        Vote::Prepared
    }

    fn commit(&self) -> Result<()> {
        let mut actions = self.take_actions();
        log::debug!("Committing: releasing {} backups", actions.len());
        dispose_all(&mut actions);
        self.finish();
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.unwind()
    }

    fn in_doubt(&self) -> Result<()> {
        log::warn!("Transaction outcome in doubt, rolling back");
        self.unwind()
    }
}

impl Drop for Enlistment {
    fn drop(&mut self) {
        let journal = self
            .journal
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !journal.actions.is_empty() {
            log::warn!(
                "Enlistment dropped with {} uncompleted actions; backups left in {}",
                journal.actions.len(),
                self.store.root().display()
            );
        }
    }
}

/// Ancestors of `path` from the outermost down to `path` itself, excluding
/// the file system root.
fn root_to_leaf(path: &Path) -> Vec<PathBuf> {
    let mut segments: Vec<PathBuf> = path
        .ancestors()
        .filter(|p| p.parent().is_some() && !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .collect();
    segments.reverse();
    segments
}
