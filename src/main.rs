mod app;
mod cli;
mod config;
mod deploy;
mod error;
mod game;
mod importer;
mod launch;
mod library;
mod logging;
mod order;
mod reconcile;
mod scan;
mod skyrim;

use anyhow::Result;

fn main() -> Result<()> {
    cli::run()
}
