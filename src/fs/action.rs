//! Compensating actions.
//!
//! An action is captured immediately *before* the mutation it compensates
//! for. [`CompensatingAction::undo`] restores the captured state and
//! [`CompensatingAction::dispose`] releases the backup. Rollback calls both
//! (undo first); commit calls only `dispose`.

use crate::error::{Result, TxError};
use crate::fs::temp::TempStore;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A recorded way to reverse one file system mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompensatingAction {
    /// Byte-for-byte copy of a file taken before it was changed.
    ///
    /// `backup` is `None` when no file existed at `target`; undo then
    /// deletes whatever file the transaction left there.
    FileBackup {
        target: PathBuf,
        backup: Option<PathBuf>,
    },
    /// One directory segment that a create-directory call may have created.
    DirectoryCreation { path: PathBuf, existed: bool },
    /// Recursive copy of a directory tree taken before it was deleted.
    DirectoryBackup {
        target: PathBuf,
        backup: Option<PathBuf>,
    },
    /// A symbolic link that was removed or replaced. Undo recreates the link
    /// itself rather than a copy of what it pointed to.
    Symlink { target: PathBuf, points_to: PathBuf },
}

impl CompensatingAction {
    /// Backs up the file at `target` (if any) into `store`.
    pub fn capture_file(target: &Path, store: &TempStore) -> Result<Self> {
        let target = std::path::absolute(target)?;

        let backup = match fs::metadata(&target) {
            Ok(meta) if meta.is_file() => {
                let backup = store.backup_path_for(&target)?;
                if let Err(e) = fs::copy(&target, &backup) {
                    let _ = fs::remove_file(&backup);
                    return Err(TxError::operation("back up", target, e));
                }
                log::debug!(
                    "Backed up {} → {}",
                    target.display(),
                    backup.display()
                );
                Some(backup)
            }
            _ => None,
        };

        Ok(Self::FileBackup { target, backup })
    }

    /// Like [`capture_file`](Self::capture_file), but a symlink at `target`
    /// is recorded as a link. Used by operations that remove or replace the
    /// directory entry instead of writing through it.
    pub fn capture_entry(target: &Path, store: &TempStore) -> Result<Self> {
        let target = std::path::absolute(target)?;
        match fs::symlink_metadata(&target) {
            Ok(meta) if meta.file_type().is_symlink() => {
                let points_to =
                    fs::read_link(&target).map_err(|e| TxError::operation("read link", &target, e))?;
                log::debug!("Recorded link {} → {}", target.display(), points_to.display());
                Ok(Self::Symlink { target, points_to })
            }
            _ => Self::capture_file(&target, store),
        }
    }

    /// Records whether the directory at `path` exists right now.
    pub fn capture_directory_creation(path: &Path) -> Result<Self> {
        let path = std::path::absolute(path)?;
        let existed = path.is_dir();
        Ok(Self::DirectoryCreation { path, existed })
    }

    /// Copies the directory tree at `target` (if any) into `store`.
    pub fn capture_directory(target: &Path, store: &TempStore) -> Result<Self> {
        let target = std::path::absolute(target)?;

        let backup = if target.is_dir() {
            let backup = store.backup_dir_path()?;
            if let Err(e) = copy_dir_recursive(&target, &backup) {
                let _ = remove_tree(&backup);
                return Err(TxError::operation("back up", target, e));
            }
            log::debug!(
                "Backed up directory {} → {}",
                target.display(),
                backup.display()
            );
            Some(backup)
        } else {
            None
        };

        Ok(Self::DirectoryBackup { target, backup })
    }

    /// The path this action protects.
    pub fn target(&self) -> &Path {
        match self {
            Self::FileBackup { target, .. }
            | Self::DirectoryBackup { target, .. }
            | Self::Symlink { target, .. } => target,
            Self::DirectoryCreation { path, .. } => path,
        }
    }

    /// Backup location in scratch storage, if one is held.
    pub fn backup(&self) -> Option<&Path> {
        match self {
            Self::FileBackup { backup, .. } | Self::DirectoryBackup { backup, .. } => {
                backup.as_deref()
            }
            Self::DirectoryCreation { .. } | Self::Symlink { .. } => None,
        }
    }

    /// Restores the state captured by this action.
    pub fn undo(&self) -> Result<()> {
        match self {
            Self::FileBackup {
                target,
                backup: Some(backup),
            } => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|e| TxError::operation("recreate directory", parent, e))?;
                }
                if target.is_file() {
                    clear_readonly(target)
                        .map_err(|e| TxError::operation("clear read-only on", target, e))?;
                }
                fs::copy(backup, target).map_err(|e| TxError::operation("restore", target, e))?;
                log::debug!("Restored: {}", target.display());
                Ok(())
            }
            Self::FileBackup {
                target,
                backup: None,
            } => match fs::symlink_metadata(target) {
                Ok(meta) if meta.is_dir() => {
                    log::warn!(
                        "Expected a file at {} but found a directory, leaving it in place",
                        target.display()
                    );
                    Ok(())
                }
                Ok(_) => {
                    fs::remove_file(target).map_err(|e| TxError::operation("remove", target, e))?;
                    log::debug!("Removed created file: {}", target.display());
                    Ok(())
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(TxError::operation("inspect", target, e)),
            },
            Self::DirectoryCreation { existed: true, .. } => Ok(()),
            Self::DirectoryCreation {
                path,
                existed: false,
            } => {
                if !path.is_dir() {
                    return Ok(());
                }
                let mut entries =
                    fs::read_dir(path).map_err(|e| TxError::operation("inspect", path, e))?;
                if entries.next().is_some() {
                    log::warn!(
                        "Directory {} is not empty, skipping removal",
                        path.display()
                    );
                    return Ok(());
                }
                fs::remove_dir(path).map_err(|e| TxError::operation("remove directory", path, e))?;
                log::debug!("Removed created directory: {}", path.display());
                Ok(())
            }
            Self::DirectoryBackup {
                target,
                backup: Some(backup),
            } => {
                copy_dir_recursive(backup, target)
                    .map_err(|e| TxError::operation("restore directory", target, e))?;
                log::debug!("Restored directory: {}", target.display());
                Ok(())
            }
            Self::DirectoryBackup { backup: None, .. } => Ok(()),
            Self::Symlink { target, points_to } => {
                match fs::symlink_metadata(target) {
                    Ok(meta) if meta.is_dir() => {
                        log::warn!(
                            "Expected a link at {} but found a directory, leaving it in place",
                            target.display()
                        );
                        return Ok(());
                    }
                    Ok(_) => {
                        fs::remove_file(target).map_err(|e| TxError::operation("remove", target, e))?;
                    }
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(TxError::operation("inspect", target, e)),
                }
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|e| TxError::operation("recreate directory", parent, e))?;
                }
                symlink(points_to, target).map_err(|e| TxError::operation("restore link", target, e))?;
                log::debug!("Restored link: {}", target.display());
                Ok(())
            }
        }
    }

    /// Deletes any backup held by this action. Safe to call repeatedly.
    pub fn dispose(&mut self) -> Result<()> {
        match self {
            Self::FileBackup { backup, .. } => {
                if let Some(path) = backup.take() {
                    match remove_backup_file(&path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                        Err(e) => {
                            let err = TxError::operation("delete backup", &path, e);
                            *backup = Some(path);
                            return Err(err);
                        }
                    }
                }
                Ok(())
            }
            Self::DirectoryBackup { backup, .. } => {
                if let Some(path) = backup.take() {
                    match remove_tree(&path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                        Err(e) => {
                            let err = TxError::operation("delete backup", &path, e);
                            *backup = Some(path);
                            return Err(err);
                        }
                    }
                }
                Ok(())
            }
            Self::DirectoryCreation { .. } | Self::Symlink { .. } => Ok(()),
        }
    }
}

/// Disposes every action, logging failures. Used when an operation fails
/// after capture, or when a journal is discarded.
pub(crate) fn dispose_all(actions: &mut [CompensatingAction]) {
    for action in actions.iter_mut() {
        if let Err(e) = action.dispose() {
            log::warn!("{}", e);
        }
    }
}

/// Removes a backup file or directory tree from scratch storage.
pub(crate) fn remove_backup(path: &Path) -> io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        remove_tree(path)
    } else {
        remove_backup_file(path)
    }
}

fn remove_backup_file(path: &Path) -> io::Result<()> {
    clear_readonly(path)?;
    fs::remove_file(path)
}

fn remove_tree(path: &Path) -> io::Result<()> {
    clear_readonly_recursive(path)?;
    fs::remove_dir_all(path)
}

/// Recursively copies directory tree.
pub(crate) fn copy_dir_recursive(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir_all(to)?;

    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let from_path = entry.path();
        let to_path = to.join(entry.file_name());

        if file_type.is_dir() {
            copy_dir_recursive(&from_path, &to_path)?;
        } else {
            if to_path.is_file() {
                clear_readonly(&to_path)?;
            }
            fs::copy(&from_path, &to_path)?;
        }
    }

    Ok(())
}

fn clear_readonly_recursive(path: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        clear_readonly(path)?;
        for entry in fs::read_dir(path)? {
            clear_readonly_recursive(&entry?.path())?;
        }
        Ok(())
    } else {
        clear_readonly(path)
    }
}

#[cfg(unix)]
fn symlink(points_to: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(points_to, link)
}

#[cfg(windows)]
fn symlink(points_to: &Path, link: &Path) -> io::Result<()> {
    let resolved = link.parent().map_or_else(|| points_to.to_path_buf(), |p| p.join(points_to));
    if resolved.is_dir() {
        std::os::windows::fs::symlink_dir(points_to, link)
    } else {
        std::os::windows::fs::symlink_file(points_to, link)
    }
}

#[cfg(not(any(unix, windows)))]
fn symlink(_points_to: &Path, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symbolic links are not supported on this platform",
    ))
}

#[cfg(unix)]
fn clear_readonly(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let meta = fs::symlink_metadata(path)?;
    if meta.file_type().is_symlink() || !meta.permissions().readonly() {
        return Ok(());
    }

    // Owner write only; other bits are preserved.
    let mut perms = meta.permissions();
    perms.set_mode(perms.mode() | 0o200);
    fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn clear_readonly(path: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.file_type().is_symlink() || !meta.permissions().readonly() {
        return Ok(());
    }

    let mut perms = meta.permissions();
    #[allow(clippy::permissions_set_readonly_false)]
    perms.set_readonly(false);
    fs::set_permissions(path, perms)
}
