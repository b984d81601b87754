extern crate tidemark;

use clap::Parser;
use tidemark::app::{self, cli::Cli};

fn main() {
    let cli = Cli::parse();
    if let Err(e) = app::run(cli) {
        eprintln!("error: {}", e);
        if let Some(id) = e.migration_id() {
            eprintln!("failed migration: {}", id);
        }
        std::process::exit(1);
    }
}
