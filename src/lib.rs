#![doc = include_str!("../README.md")]

pub mod cli;
pub mod command;
pub mod config;
pub mod error;
pub mod fs;
pub mod manager;
pub mod plan;
pub mod txn;

pub use config::Config;
pub use error::*;
pub use manager::{FileManager, is_enlisted};
pub use txn::{Transaction, TransactionContext, TransactionId, TransactionScope};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn run() -> Result<()> {
    use clap::Parser;
    use command::Command;

    let cli = cli::Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Apply(args) => command::apply::execute(args),
        Command::Sweep(args) => command::sweep::execute(args),
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .try_init();
}
