//! TOML plans: a list of file operations to run as one transaction.
//!
//! ```toml
//! [[op]]
//! kind = "mkdir"
//! path = "out/reports"
//!
//! [[op]]
//! kind = "write"
//! path = "out/reports/summary.txt"
//! text = "ok\n"
//!
//! [[op]]
//! kind = "move"
//! from = "draft.txt"
//! to = "out/final.txt"
//! ```
//!
//! Relative paths resolve against the plan's root directory.

use crate::error::{Result, TxError};
use crate::manager::FileManager;

use anyhow::Context;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use toml_edit::{DocumentMut, Item, Table};

/// One operation in a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    AppendText { path: PathBuf, text: String },
    Copy { from: PathBuf, to: PathBuf, overwrite: bool },
    CreateDirectory { path: PathBuf },
    Delete { path: PathBuf },
    DeleteDirectory { path: PathBuf },
    Move { from: PathBuf, to: PathBuf },
    Snapshot { path: PathBuf },
    WriteText { path: PathBuf, text: String },
}

impl Step {
    pub fn apply(&self, files: &FileManager) -> Result<()> {
        match self {
            Step::AppendText { path, text } => files.append_text(path, text),
            Step::Copy {
                from,
                to,
                overwrite,
            } => files.copy(from, to, *overwrite),
            Step::CreateDirectory { path } => files.create_directory(path),
            Step::Delete { path } => files.delete(path),
            Step::DeleteDirectory { path } => files.delete_directory(path),
            Step::Move { from, to } => files.move_file(from, to),
            Step::Snapshot { path } => files.snapshot(path),
            Step::WriteText { path, text } => files.write_text(path, text),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::AppendText { path, .. } => write!(f, "Append: {}", path.display()),
            Step::Copy { from, to, .. } => {
                write!(f, "Copy: {} → {}", from.display(), to.display())
            }
            Step::CreateDirectory { path } => write!(f, "Create directory: {}", path.display()),
            Step::Delete { path } => write!(f, "Delete: {}", path.display()),
            Step::DeleteDirectory { path } => write!(f, "Delete directory: {}", path.display()),
            Step::Move { from, to } => {
                write!(f, "Move: {} → {}", from.display(), to.display())
            }
            Step::Snapshot { path } => write!(f, "Snapshot: {}", path.display()),
            Step::WriteText { path, .. } => write!(f, "Write: {}", path.display()),
        }
    }
}

/// An ordered list of steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    steps: Vec<Step>,
}

impl Plan {
    /// Reads and parses the plan at `path`.
    pub fn load(path: &Path, root: &Path) -> Result<Self> {
        let source = fs::read_to_string(path).map_err(|e| TxError::operation("read", path, e))?;
        Self::parse(&source, root)
    }

    pub fn parse(source: &str, root: &Path) -> Result<Self> {
        let doc: DocumentMut = source.parse()?;

        let Some(item) = doc.as_table().get("op") else {
            return Ok(Self::default());
        };
        let tables = item.as_array_of_tables().ok_or_else(|| {
            TxError::InvalidPlan("`op` must be an array of tables ([[op]])".to_string())
        })?;

        let steps = tables
            .iter()
            .enumerate()
            .map(|(index, table)| parse_step(table, index + 1, root))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs the steps in order, stopping at the first failure.
    ///
    /// Returns how many steps completed.
    pub fn apply(&self, files: &FileManager) -> Result<usize> {
        for (index, step) in self.steps.iter().enumerate() {
            log::debug!("Step {}: {}", index + 1, step);
            step.apply(files)
                .map_err(anyhow::Error::new)
                .with_context(|| format!("step {} ({})", index + 1, step))?;
        }
        Ok(self.steps.len())
    }
}

fn parse_step(table: &Table, index: usize, root: &Path) -> Result<Step> {
    let path = |key: &str| -> Result<PathBuf> { Ok(root.join(str_field(table, key, index)?)) };
    let text = |key: &str| -> Result<String> { Ok(str_field(table, key, index)?.to_string()) };

    let step = match str_field(table, "kind", index)? {
        "append" => Step::AppendText {
            path: path("path")?,
            text: text("text")?,
        },
        "copy" => Step::Copy {
            from: path("from")?,
            to: path("to")?,
            overwrite: bool_field(table, "overwrite", index)?.unwrap_or(false),
        },
        "mkdir" => Step::CreateDirectory {
            path: path("path")?,
        },
        "delete" => Step::Delete {
            path: path("path")?,
        },
        "rmdir" => Step::DeleteDirectory {
            path: path("path")?,
        },
        "move" => Step::Move {
            from: path("from")?,
            to: path("to")?,
        },
        "snapshot" => Step::Snapshot {
            path: path("path")?,
        },
        "write" => Step::WriteText {
            path: path("path")?,
            text: text("text")?,
        },
        other => {
            return Err(TxError::InvalidPlan(format!(
                "op #{index}: unknown kind '{other}'"
            )));
        }
    };
    Ok(step)
}

fn str_field<'a>(table: &'a Table, key: &str, index: usize) -> Result<&'a str> {
    table.get(key).and_then(Item::as_str).ok_or_else(|| {
        TxError::InvalidPlan(format!("op #{index}: missing string field `{key}`"))
    })
}

fn bool_field(table: &Table, key: &str, index: usize) -> Result<Option<bool>> {
    match table.get(key) {
        None => Ok(None),
        Some(item) => item.as_bool().map(Some).ok_or_else(|| {
            TxError::InvalidPlan(format!("op #{index}: field `{key}` must be a boolean"))
        }),
    }
}
