//! The per-course pipeline run by each worker.

use std::path::PathBuf;

use engage_core::{CourseEngagement, CourseId, EngagementConfig, compute_course};
use engage_db::{CourseStartCache, DataSourceError, Database};
use thiserror::Error;

use crate::writer::{self, PartialWriteError, TablePaths};

/// Immutable inputs shared by every course worker.
#[derive(Debug, Clone)]
pub struct WorkerParams {
    pub database_path: PathBuf,
    pub output_dir: PathBuf,
    pub engagement: EngagementConfig,
    /// Compute over video events only.
    pub video_only: bool,
}

/// Why one course could not be computed.
#[derive(Debug, Error)]
pub enum CourseError {
    #[error(transparent)]
    DataSource(#[from] DataSourceError),
    #[error(transparent)]
    Write(#[from] PartialWriteError),
}

/// A computed and written course.
#[derive(Debug)]
pub struct CourseOutput {
    pub engagement: CourseEngagement,
    pub paths: TablePaths,
}

/// Loads, computes and writes one course under the file stem `stem`.
pub fn run_course(
    course: &CourseId,
    stem: &str,
    params: &WorkerParams,
    cache: &CourseStartCache,
) -> Result<CourseOutput, CourseError> {
    let span = tracing::info_span!("course", course = %course);
    let _guard = span.enter();

    let db = Database::open_read_only(&params.database_path)?;
    let course_start = cache.get_or_try_load(course, || db.require_course_start(course))?;
    let events = db.activities_for_course(course, params.video_only)?;
    tracing::debug!(events = events.len(), %course_start, "loaded course");

    let engagement = compute_course(course, course_start, events, &params.engagement);
    for skipped in &engagement.skipped_students {
        tracing::warn!(student = %skipped.student, error = %skipped.error, "skipped student");
    }

    let paths = writer::write_tables(&params.output_dir, stem, &engagement)?;
    tracing::info!(
        sessions = engagement.summary.total_sessions,
        minutes = engagement.summary.total_minutes,
        skipped = engagement.skipped_students.len(),
        "course complete"
    );
    Ok(CourseOutput { engagement, paths })
}
