//! CLI command definitions for shop-schedule
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

use clap::{Args, Parser, Subcommand};

/// Weekly production scheduling board
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Port for the board server (overrides config)
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the board server with background refresh (default)
    Serve,

    /// Print the merged task list as JSON
    Tasks,

    /// Print one week of the board
    Board(BoardArgs),

    /// Search projects by name
    Search {
        /// Case-insensitive substring of the project name
        query: String,
    },

    /// Print the build plan of a project
    Plan {
        /// Project name
        project: String,
    },
}

#[derive(Args, Debug)]
pub struct BoardArgs {
    /// Any date in the week to show (MM/DD/YYYY or YYYY-MM-DD); defaults to the saved week
    #[arg(short, long)]
    pub week: Option<String>,

    /// Comma-separated departments, or "all"; remembered for next time
    #[arg(short, long)]
    pub departments: Option<String>,

    /// Output format: json or markdown
    #[arg(short, long, default_value = "markdown")]
    pub format: String,
}
