//! Transactional file operations facade.
//!
//! Every mutating method runs immediately. When a transaction is ambient on
//! the calling thread (and transactions are enabled), the change is journaled
//! in that transaction's [`Enlistment`] and undone if the transaction aborts.
//! Otherwise the call runs in direct mode and cannot be rolled back.

use crate::config::Config;
use crate::error::Result;
use crate::fs::temp::{self, TempStore};
use crate::txn::{self, Enlistment, TransactionContext, registry};

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Entry point for transactional file operations.
#[derive(Debug, Clone)]
pub struct FileManager {
    config: Config,
    store: TempStore,
}

impl Default for FileManager {
    fn default() -> Self {
        Self::new()
    }
}

impl FileManager {
    /// Creates a manager with the default [`Config`].
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let store = TempStore::new(config.scratch_dir.clone(), config.backup_prefix.clone());
        Self { config, store }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Scratch directory holding backups.
    pub fn scratch_dir(&self) -> &Path {
        self.store.root()
    }

    pub fn append_text(&self, path: impl AsRef<Path>, text: &str) -> Result<()> {
        self.enlistment()?.append_text(path.as_ref(), text)
    }

    /// Copies `from` to `to`. With `overwrite == false` an existing
    /// destination is an error.
    pub fn copy(&self, from: impl AsRef<Path>, to: impl AsRef<Path>, overwrite: bool) -> Result<()> {
        self.enlistment()?
            .copy(from.as_ref(), to.as_ref(), overwrite)
    }

    /// Creates a directory and all missing parents.
    pub fn create_directory(&self, path: impl AsRef<Path>) -> Result<()> {
        self.enlistment()?.create_directory(path.as_ref())
    }

    pub fn delete(&self, path: impl AsRef<Path>) -> Result<()> {
        self.enlistment()?.delete(path.as_ref())
    }

    pub fn delete_directory(&self, path: impl AsRef<Path>) -> Result<()> {
        self.enlistment()?.delete_directory(path.as_ref())
    }

    pub fn move_file(&self, from: impl AsRef<Path>, to: impl AsRef<Path>) -> Result<()> {
        self.enlistment()?.move_file(from.as_ref(), to.as_ref())
    }

    /// Backs up `path` so a later abort restores it, for callers that change
    /// the file through some other channel.
    pub fn snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        self.enlistment()?.snapshot(path.as_ref())
    }

    pub fn write_text(&self, path: impl AsRef<Path>, text: &str) -> Result<()> {
        self.enlistment()?.write_bytes(path.as_ref(), text.as_bytes())
    }

    pub fn write_bytes(&self, path: impl AsRef<Path>, contents: &[u8]) -> Result<()> {
        self.enlistment()?.write_bytes(path.as_ref(), contents)
    }

    /// Unique, not yet existing file name in the system temp directory.
    pub fn temp_file_name(&self, extension: Option<&str>) -> Result<PathBuf> {
        temp::temp_file_name(None, extension)
    }

    /// Creates a unique directory under `parent`, or the system temp dir.
    pub fn temp_directory(&self, parent: Option<&Path>, prefix: Option<&str>) -> Result<PathBuf> {
        temp::create_temp_directory(parent, prefix)
    }

    pub fn file_exists(&self, path: impl AsRef<Path>) -> bool {
        path.as_ref().is_file()
    }

    pub fn directory_exists(&self, path: impl AsRef<Path>) -> bool {
        path.as_ref().is_dir()
    }

    /// Number of journaled actions for the ambient transaction, if this
    /// thread has one with pending work.
    pub fn pending_actions(&self) -> Option<usize> {
        let ctx = txn::current()?;
        registry::get(ctx.id()).map(|enlistment| enlistment.len())
    }

    /// Resolves the enlistment for the ambient transaction, enlisting with
    /// the coordinator on first use. Falls back to a throwaway anonymous one.
    fn enlistment(&self) -> Result<Arc<Enlistment>> {
        match txn::current() {
            Some(ctx) if self.config.transactions_enabled => self.enlistment_for(ctx.as_ref()),
            _ => Ok(Arc::new(Enlistment::anonymous(self.store.clone()))),
        }
    }

    fn enlistment_for(&self, ctx: &dyn TransactionContext) -> Result<Arc<Enlistment>> {
        let id = ctx.id();
        let (enlistment, created) = registry::get_or_insert_with(id, || {
            Enlistment::new(id, self.store.clone(), self.config.ignore_rollback_errors)
        });

        if created {
            if let Err(e) = enlistment.register(ctx) {
                log::warn!("Could not enlist in transaction {}: {}", id, e);
                registry::remove(id);
                return Err(e);
            }
        }

        Ok(enlistment)
    }
}

/// True while the transaction `id` has a live enlistment.
pub fn is_enlisted(id: txn::TransactionId) -> bool {
    registry::contains(id)
}
