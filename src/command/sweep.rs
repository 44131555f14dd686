use crate::config::default_scratch_dir;
use crate::error::Result;
use crate::fs::TempStore;
use crate::fs::action::remove_backup;
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;

/// Backups are only orphaned once the process that made them is gone, so
/// only sweep while no transaction that uses this scratch directory is live.
#[derive(Parser, Debug, Clone)]
pub struct SweepArgs {
    /// Directory holding backup copies
    #[arg(long, value_name = "DIR", env = "TXFILE_SCRATCH_DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Only remove entries at least this many seconds old
    #[arg(long, value_name = "SECS", default_value_t = 0)]
    pub min_age: u64,

    /// List what would be removed without deleting anything
    #[arg(long, short = 'n')]
    pub dry_run: bool,
}

pub fn execute(args: SweepArgs) -> Result<()> {
    let root = args.scratch_dir.clone().unwrap_or_else(default_scratch_dir);
    let store = TempStore::new(root, None);
    let orphans = store.orphans(Duration::from_secs(args.min_age))?;

    if orphans.is_empty() {
        println!("{}", "No orphaned backups".yellow());
        return Ok(());
    }

    if args.dry_run {
        println!("{}", "DRY RUN - No files will be removed".yellow().bold());
        for path in &orphans {
            println!("   • {}", path.display().to_string().dimmed());
        }
        println!(
            "\n{} {} would be removed. Run without {} to apply.",
            orphans.len().to_string().cyan().bold(),
            if orphans.len() == 1 { "entry" } else { "entries" },
            "--dry-run".cyan()
        );
        return Ok(());
    }

    let mut removed = 0;
    let mut failed = 0;
    for path in &orphans {
        match remove_backup(path) {
            Ok(()) => {
                removed += 1;
                println!("   {} {}", "✓".green(), path.display().to_string().dimmed());
            }
            Err(e) => {
                failed += 1;
                log::warn!("Could not remove {}: {}", path.display(), e);
                println!("   {} {}", "✗".red(), path.display());
            }
        }
    }

    println!(
        "\n{} Removed {} of {} orphaned backups",
        "✓".green().bold(),
        removed,
        orphans.len()
    );
    if failed > 0 {
        println!("{} {} could not be removed", "!".yellow().bold(), failed);
    }
    Ok(())
}
