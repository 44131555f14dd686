pub mod apply;
pub mod sweep;

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Command {
    /// Run a TOML plan of file operations as one transaction.
    Apply(apply::ApplyArgs),

    /// Remove orphaned backups from the scratch directory.
    Sweep(sweep::SweepArgs),
}
