//! Scratch storage for backups and unique temp names.
//!
//! Every name is `<prefix><token>[.<ext>]` where `token` is a short random
//! string. Names are probed against the file system and regenerated on
//! collision, so a returned path never exists at the time it is handed out.

use crate::error::Result;

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

const TOKEN_LEN: usize = 12;
const DEFAULT_TEMP_EXTENSION: &str = "tmp";

/// Directory that holds backup copies for one [`FileManager`](crate::FileManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempStore {
    root: PathBuf,
    prefix: Option<String>,
}

impl TempStore {
    pub fn new(root: impl Into<PathBuf>, prefix: Option<String>) -> Self {
        Self {
            root: root.into(),
            prefix,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the scratch directory if it is missing.
    pub fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    /// Allocates a backup path for `original`, keeping its extension.
    pub fn backup_path_for(&self, original: &Path) -> Result<PathBuf> {
        self.ensure_root()?;
        Ok(unique_path(
            &self.root,
            self.prefix.as_deref(),
            original.extension(),
        ))
    }

    /// Allocates a path for a directory tree backup.
    pub fn backup_dir_path(&self) -> Result<PathBuf> {
        self.ensure_root()?;
        Ok(unique_path(&self.root, self.prefix.as_deref(), None))
    }

    /// Lists entries in the scratch directory last modified at least
    /// `min_age` ago. A missing scratch directory yields an empty list.
    pub fn orphans(&self, min_age: Duration) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let now = SystemTime::now();
        let mut found = Vec::new();
        for entry in entries {
            let entry = entry?;
            let modified = entry.metadata()?.modified()?;
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age >= min_age {
                found.push(entry.path());
            }
        }
        found.sort();
        Ok(found)
    }
}

/// Allocates an unused file name under `parent` (or the system temp
/// directory). Never under a scratch root, which `sweep` empties.
///
/// `extension` may carry a leading dot. Defaults to `tmp`.
pub fn temp_file_name(parent: Option<&Path>, extension: Option<&str>) -> Result<PathBuf> {
    let parent = parent
        .map(Path::to_path_buf)
        .unwrap_or_else(std::env::temp_dir);
    fs::create_dir_all(&parent)?;

    let ext = extension
        .map(|e| e.trim_start_matches('.'))
        .filter(|e| !e.is_empty())
        .unwrap_or(DEFAULT_TEMP_EXTENSION);
    Ok(unique_path(&parent, None, Some(OsStr::new(ext))))
}

/// Creates a fresh directory under `parent` (or the system temp directory).
pub fn create_temp_directory(parent: Option<&Path>, prefix: Option<&str>) -> Result<PathBuf> {
    let parent = parent
        .map(Path::to_path_buf)
        .unwrap_or_else(std::env::temp_dir);
    fs::create_dir_all(&parent)?;

    loop {
        let candidate = unique_path(&parent, prefix, None);
        match fs::create_dir(&candidate) {
            Ok(()) => {
                log::debug!("Created temp directory: {}", candidate.display());
                return Ok(candidate);
            }
            // Lost a race with another allocator; draw again.
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Short random token used in every generated name.
pub fn random_token() -> String {
    let mut token = Uuid::new_v4().simple().to_string();
    token.truncate(TOKEN_LEN);
    token
}

fn unique_path(dir: &Path, prefix: Option<&str>, extension: Option<&OsStr>) -> PathBuf {
    loop {
        let mut name = format!("{}{}", prefix.unwrap_or(""), random_token());
        if let Some(ext) = extension.filter(|e| !e.is_empty()) {
            name.push('.');
            name.push_str(&ext.to_string_lossy());
        }
        let candidate = dir.join(name);
        if fs::symlink_metadata(&candidate).is_err() {
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    #[test]
    fn test_random_token_shape() {
        let token = random_token();
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_backup_path_keeps_extension_and_prefix() {
        let temp = TempDir::new().unwrap();
        let store = TempStore::new(temp.path().join("scratch"), Some("bk_".to_string()));

        let backup = store.backup_path_for(Path::new("/some/dir/report.csv")).unwrap();

        assert!(store.root().is_dir());
        assert_eq!(backup.parent().unwrap(), store.root());
        assert_eq!(backup.extension().unwrap(), "csv");
        let name = backup.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("bk_"));
        assert!(!backup.exists());
    }

    #[test]
    fn test_backup_path_without_extension() {
        let temp = TempDir::new().unwrap();
        let store = TempStore::new(temp.path(), None);

        let backup = store.backup_path_for(Path::new("Makefile")).unwrap();

        assert!(backup.extension().is_none());
    }

    #[test]
    fn test_temp_file_name_extension_handling() {
        let temp = TempDir::new().unwrap();
        let dir = Some(temp.path());

        assert_eq!(temp_file_name(dir, None).unwrap().extension().unwrap(), "tmp");
        assert_eq!(
            temp_file_name(dir, Some(".log")).unwrap().extension().unwrap(),
            "log"
        );
        assert_eq!(
            temp_file_name(dir, Some("json")).unwrap().extension().unwrap(),
            "json"
        );
    }

    #[test]
    fn test_temp_file_name_defaults_to_system_temp() {
        let name = temp_file_name(None, Some("dat")).unwrap();

        assert_eq!(name.parent().unwrap(), std::env::temp_dir());
        assert!(!name.exists());
    }

    #[test]
    fn test_names_are_unique() {
        let temp = TempDir::new().unwrap();

        let names: HashSet<_> = (0..200)
            .map(|_| temp_file_name(Some(temp.path()), None).unwrap())
            .collect();

        assert_eq!(names.len(), 200);
    }

    #[test]
    fn test_create_temp_directory() {
        let temp = TempDir::new().unwrap();

        let dir = create_temp_directory(Some(temp.path()), Some("work-")).unwrap();

        assert!(dir.is_dir());
        assert_eq!(dir.parent().unwrap(), temp.path());
        assert!(dir.file_name().unwrap().to_string_lossy().starts_with("work-"));
    }

    #[test]
    fn test_orphans_missing_root_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = TempStore::new(temp.path().join("never-created"), None);

        assert!(store.orphans(Duration::ZERO).unwrap().is_empty());
    }

    #[test]
    fn test_orphans_respects_min_age() {
        let temp = TempDir::new().unwrap();
        let store = TempStore::new(temp.path(), None);
        fs::write(temp.path().join("a.bak"), "x").unwrap();

        assert_eq!(store.orphans(Duration::ZERO).unwrap().len(), 1);
        assert!(store.orphans(Duration::from_secs(3600)).unwrap().is_empty());
    }
}
