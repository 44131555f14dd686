use crate::command::Command;
use clap::Parser;

#[derive(Parser)]
#[command(name = "txfile", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Print debug logging (overridden by RUST_LOG)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}
