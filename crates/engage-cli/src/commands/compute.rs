//! Compute command: runs the engagement pipeline over matching courses.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use engage_db::{CourseFilter, CourseStartCache, Database};

use crate::Config;
use crate::dispatch::{self, DispatchOutcome};
use crate::pipeline::WorkerParams;
use crate::writer::TablePaths;

#[derive(Debug, Args)]
pub struct ComputeArgs {
    /// Course ID, or a pattern where `*` or `%` match anything.
    #[arg(long)]
    pub course: String,

    /// Only courses that started in or after this year.
    #[arg(long)]
    pub min_start_year: Option<i32>,

    /// Compute over video events only.
    #[arg(long)]
    pub video_only: bool,

    /// Directory for the CSV tables (overrides `output_dir`).
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Worker pool size (overrides `workers`).
    #[arg(long)]
    pub workers: Option<usize>,
}

/// Runs the computation and reports on `writer`.
///
/// Fails only when every selected course failed.
pub fn run<W: Write>(writer: &mut W, args: &ComputeArgs, config: &Config) -> Result<()> {
    let engagement = config
        .engagement_config()
        .context("invalid engagement configuration")?;

    let db = Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    let filter = CourseFilter::new(&args.course).with_min_start_year(args.min_start_year);
    let courses = db.list_courses(&filter)?;
    if courses.is_empty() {
        anyhow::bail!("no courses with activity match {}", args.course);
    }
    let cache: CourseStartCache = db
        .list_course_runtimes()?
        .into_iter()
        .map(|runtime| {
            let start = runtime.start_date();
            (runtime.course, start)
        })
        .collect();
    drop(db);

    let output_dir = args.out_dir.clone().unwrap_or_else(|| config.output_dir.clone());
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    let params = WorkerParams {
        database_path: config.database_path.clone(),
        output_dir,
        engagement,
        video_only: args.video_only,
    };
    let workers = args
        .workers
        .or(config.workers)
        .unwrap_or_else(dispatch::default_workers);
    let outcome = dispatch::run_many(&courses, &params, &cache, workers)?;

    write_report(writer, &outcome)?;
    if outcome.all_failed() {
        anyhow::bail!("all {} courses failed", outcome.failed.len());
    }
    Ok(())
}

fn write_report<W: Write>(writer: &mut W, outcome: &DispatchOutcome) -> Result<()> {
    writeln!(
        writer,
        "Computed {} of {} courses",
        outcome.courses.len(),
        outcome.courses.len() + outcome.failed.len()
    )?;
    for output in &outcome.courses {
        let engagement = &output.engagement;
        let summary = &engagement.summary;
        writeln!(
            writer,
            "- {}: {} sessions, {} minutes (1-20: {}, 21-60: {}, >60: {})",
            engagement.course,
            summary.total_sessions,
            summary.total_minutes,
            summary.sessions_1to20min,
            summary.sessions_21to60min,
            summary.sessions_over60min
        )?;
        if !engagement.skipped_students.is_empty() {
            writeln!(
                writer,
                "  skipped students: {}",
                engagement.skipped_students.len()
            )?;
        }
        if engagement.pre_start_events > 0 {
            writeln!(
                writer,
                "  events before course start: {}",
                engagement.pre_start_events
            )?;
        }
        write_paths(writer, &output.paths)?;
    }

    if !outcome.failed.is_empty() {
        writeln!(writer, "Failed:")?;
        for failed in &outcome.failed {
            writeln!(writer, "- {}: {}", failed.course, failed.error)?;
        }
    }

    if let Some(combined) = &outcome.combined {
        writeln!(writer, "Combined:")?;
        write_paths(writer, combined)?;
    }
    Ok(())
}

fn write_paths<W: Write>(writer: &mut W, paths: &TablePaths) -> Result<()> {
    writeln!(writer, "  {}", paths.summary.display())?;
    writeln!(writer, "  {}", paths.detail.display())?;
    writeln!(writer, "  {}", paths.weekly.display())?;
    Ok(())
}
