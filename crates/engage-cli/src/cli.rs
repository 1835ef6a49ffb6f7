//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::compute::ComputeArgs;

/// Learner engagement computer.
///
/// Splits course activity into sessions, estimates time on task and writes
/// per-course engagement tables as CSV.
#[derive(Debug, Parser)]
#[command(name = "engage", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Import activity events (JSONL) from stdin.
    Import,

    /// Manage course start dates.
    #[command(subcommand)]
    Course(CourseAction),

    /// Compute engagement tables for one or more courses.
    Compute(ComputeArgs),

    /// Show loaded courses.
    Status,
}

/// Course runtime actions.
#[derive(Debug, Subcommand)]
pub enum CourseAction {
    /// Record when a course starts (and optionally ends).
    Add {
        /// Course ID, e.g. `CME/MedStats/2013-2015`.
        course: String,

        /// Start timestamp or date (`2013-07-30 03:27:00`, `2013-07-30`).
        #[arg(long)]
        start: String,

        /// End timestamp or date.
        #[arg(long)]
        end: Option<String>,
    },

    /// List recorded course runtimes.
    List,
}
