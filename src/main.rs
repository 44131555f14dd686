//! Binary entry point for `txfile`.

use std::process;

fn main() {
    if let Err(e) = txfile::run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
