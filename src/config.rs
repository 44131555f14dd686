//! Runtime knobs for [`FileManager`](crate::FileManager).

use std::path::PathBuf;

/// Name of the scratch directory created under the system temp directory.
pub const DEFAULT_SCRATCH_DIR_NAME: &str = "txfile";

/// Configuration shared by every operation a [`FileManager`](crate::FileManager) performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// When false, every call runs in direct (non-journaling) mode even
    /// inside an ambient transaction.
    pub transactions_enabled: bool,

    /// Log and continue when an undo step fails instead of aborting the
    /// rollback with [`TxError::RollbackFailed`](crate::TxError::RollbackFailed).
    pub ignore_rollback_errors: bool,

    /// Directory holding backup copies. Created on first use.
    pub scratch_dir: PathBuf,

    /// Optional label prepended to every backup file name.
    pub backup_prefix: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transactions_enabled: true,
            ignore_rollback_errors: false,
            scratch_dir: default_scratch_dir(),
            backup_prefix: None,
        }
    }
}

impl Config {
    pub fn with_transactions_enabled(mut self, enabled: bool) -> Self {
        self.transactions_enabled = enabled;
        self
    }

    pub fn with_ignore_rollback_errors(mut self, ignore: bool) -> Self {
        self.ignore_rollback_errors = ignore;
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub fn with_backup_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.backup_prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }
}

/// `<system temp>/txfile`
pub fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join(DEFAULT_SCRATCH_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.transactions_enabled);
        assert!(!config.ignore_rollback_errors);
        assert!(config.scratch_dir.ends_with(DEFAULT_SCRATCH_DIR_NAME));
        assert_eq!(config.backup_prefix, None);
    }

    #[test]
    fn test_empty_prefix_is_none() {
        let config = Config::default().with_backup_prefix("");
        assert_eq!(config.backup_prefix, None);

        let config = Config::default().with_backup_prefix("bk_");
        assert_eq!(config.backup_prefix.as_deref(), Some("bk_"));
    }
}
