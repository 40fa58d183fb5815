//! CLI argument parsing for the aguas-worker binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "aguas-worker", about = "Water utility meter-reading backend worker")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the worker server (default if no subcommand given)
    Serve,
    /// Run database migrations and exit
    Migrate,
    /// Import a CSV file of meter readings and print the summary
    Import {
        /// Path to the CSV file
        path: PathBuf,
        /// Validate against an empty in-memory store instead of the database
        #[arg(long)]
        dry_run: bool,
    },
    /// Recompute consumption and debt totals of every neighborhood
    Recompute,
    /// Delete all readings, households and neighborhoods
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}
