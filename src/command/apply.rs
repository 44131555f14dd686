use crate::config::{Config, default_scratch_dir};
use crate::error::Result;
use crate::manager::FileManager;
use crate::plan::{Plan, Step};
use crate::txn::TransactionScope;
use clap::Parser;
use colored::Colorize;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug, Clone)]
pub struct ApplyArgs {
    /// Path to the TOML plan
    pub plan: PathBuf,

    /// Directory that relative plan paths resolve against (defaults to the plan's directory)
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Run every step, then roll all of them back
    #[arg(long)]
    pub abort: bool,

    /// Run steps directly; nothing can be rolled back
    #[arg(long, conflicts_with = "abort")]
    pub no_transaction: bool,

    /// Keep undoing the remaining steps when one of them fails to roll back
    #[arg(long)]
    pub ignore_rollback_errors: bool,

    /// Directory for backup copies
    #[arg(long, value_name = "DIR", env = "TXFILE_SCRATCH_DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Label prepended to backup file names
    #[arg(long, value_name = "PREFIX")]
    pub backup_prefix: Option<String>,
}

impl ApplyArgs {
    /// Root for relative plan paths.
    pub fn resolve_root(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(|| {
            self.plan
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        })
    }

    pub fn config(&self) -> Config {
        let mut config = Config::default()
            .with_transactions_enabled(!self.no_transaction)
            .with_ignore_rollback_errors(self.ignore_rollback_errors)
            .with_scratch_dir(self.scratch_dir.clone().unwrap_or_else(default_scratch_dir));
        if let Some(prefix) = &self.backup_prefix {
            config = config.with_backup_prefix(prefix.clone());
        }
        config
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Committed,
    RolledBack,
    Direct,
}

pub fn execute(args: ApplyArgs) -> Result<()> {
    let root = args.resolve_root();
    log::debug!("Plan root: {}", root.display());

    let plan = Plan::load(&args.plan, &root)?;
    if plan.is_empty() {
        println!("\n{}", "No operations in plan".yellow());
        return Ok(());
    }

    let files = FileManager::with_config(args.config());
    log::debug!("Scratch directory: {}", files.scratch_dir().display());

    if args.no_transaction {
        plan.apply(&files)?;
        print_summary(&plan, &root, Outcome::Direct);
        return Ok(());
    }

    let scope = TransactionScope::begin();

    if let Err(e) = plan.apply(&files) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        eprintln!("{}", "Rolling back changes...".yellow().bold());
        match scope.rollback() {
            Ok(()) => eprintln!("{}", "✓ Rollback successful.".green()),
            Err(rollback_err) => {
                eprintln!("{} {}", "✗ Rollback failed:".red().bold(), rollback_err);
            }
        }
        return Err(e);
    }

    if args.abort {
        scope.rollback()?;
        print_summary(&plan, &root, Outcome::RolledBack);
    } else {
        scope.commit()?;
        print_summary(&plan, &root, Outcome::Committed);
    }

    Ok(())
}

/// Prints the plan grouped by kind of change, paths relative to `root`.
fn print_summary(plan: &Plan, root: &Path, outcome: Outcome) {
    let display_path = |path: &Path| -> String {
        let relative = pathdiff::diff_paths(path, root).unwrap_or_else(|| path.to_path_buf());
        relative.to_string_lossy().replace('\\', "/")
    };

    let mut writes = Vec::new();
    let mut relocations = Vec::new();
    let mut directories = Vec::new();
    let mut deletions = Vec::new();
    let mut snapshots = Vec::new();

    for step in plan.steps() {
        match step {
            Step::AppendText { path, .. } | Step::WriteText { path, .. } => {
                writes.push(display_path(path));
            }
            Step::Copy { from, to, .. } | Step::Move { from, to } => {
                relocations.push((display_path(from), display_path(to)));
            }
            Step::CreateDirectory { path } => directories.push(display_path(path)),
            Step::Delete { path } | Step::DeleteDirectory { path } => {
                deletions.push(display_path(path));
            }
            Step::Snapshot { path } => snapshots.push(display_path(path)),
        }
    }

    match outcome {
        Outcome::Committed => println!("\n{}", "Changes committed:".green().bold()),
        Outcome::RolledBack => println!("\n{}", "ABORTED - all changes rolled back".yellow().bold()),
        Outcome::Direct => println!("\n{}", "Changes applied (no transaction):".green().bold()),
    }

    let mark = || {
        if outcome == Outcome::RolledBack {
            "↺".yellow().to_string()
        } else {
            "✓".green().to_string()
        }
    };

    print_group("📁", "Directories", &directories, 5, &mark);
    print_group("📝", "Written", &writes, 8, &mark);
    print_group("🗑", "Deleted", &deletions, 5, &mark);
    print_group("📸", "Snapshots", &snapshots, 5, &mark);

    if !relocations.is_empty() {
        println!("\n{} Copied / moved", "🔀".bold());
        for (from, to) in &relocations {
            println!("   {} {} → {}", mark(), from.dimmed(), to.green());
        }
    }

    println!();
    let total = plan.len();
    match outcome {
        Outcome::RolledBack => println!(
            "{} {} operation{} undone",
            "↺".yellow().bold(),
            total.to_string().cyan().bold(),
            if total == 1 { "" } else { "s" }
        ),
        _ => println!(
            "{} Successfully completed {} operation{}",
            "✓".green().bold(),
            total,
            if total == 1 { "" } else { "s" }
        ),
    }
}

fn print_group(icon: &str, title: &str, paths: &[String], limit: usize, mark: &dyn Fn() -> String) {
    if paths.is_empty() {
        return;
    }

    println!(
        "\n{} {} ({} path{})",
        icon.bold(),
        title,
        paths.len(),
        if paths.len() == 1 { "" } else { "s" }
    );
    for path in paths.iter().take(limit) {
        println!("   {} {}", mark(), path.dimmed());
    }
    if paths.len() > limit {
        println!("   {} {} more...", mark(), paths.len() - limit);
    }
}
