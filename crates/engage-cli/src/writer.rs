//! CSV output for computed engagement tables.
//!
//! Each table is rendered in memory, written to a temporary file next to its
//! destination and renamed into place, so a reader never sees a truncated
//! file.

use std::borrow::Cow;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use engage_core::{CourseEngagement, CourseId, PLATFORM};
use regex::{Captures, Regex};
use tempfile::NamedTempFile;
use thiserror::Error;

pub const DETAIL_HEADER: &str = "platform,course,student,date,time,session_minutes";
pub const WEEKLY_HEADER: &str = "platform,course,student,week,minutes";
pub const SUMMARY_HEADER: &str = "platform,course,total_sessions,total_minutes,sessions_1to20min,sessions_21to60min,sessions_over60min";

/// File stem of the tables merged across courses.
///
/// Course stems all start with `engagement_`, so this can never collide with one.
pub const COMBINED_STEM: &str = "combined_engagement";

static ESCAPED_CHAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9.-]").unwrap());

/// A table could not be written; any previous file at `path` is untouched.
#[derive(Debug, Error)]
#[error("failed to write {}", path.display())]
pub struct PartialWriteError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Locations of the three tables for one stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePaths {
    pub summary: PathBuf,
    pub detail: PathBuf,
    pub weekly: PathBuf,
}

impl TablePaths {
    pub fn for_stem(dir: &Path, stem: &str) -> Self {
        Self {
            summary: dir.join(format!("{stem}_summary.csv")),
            detail: dir.join(format!("{stem}_allData.csv")),
            weekly: dir.join(format!("{stem}_weeklyEffort.csv")),
        }
    }
}

/// File stem for a course: `engagement_` plus the escaped course ID.
///
/// The escaping is reversible, so distinct courses never share a stem:
/// `_` becomes `__` and every other character outside `[A-Za-z0-9.-]`
/// becomes `_` plus the lowercase hex of each of its UTF-8 bytes
/// (`CME/MedStats/2013-2015` gives `engagement_CME_2fMedStats_2f2013-2015`).
pub fn course_stem(course: &CourseId) -> String {
    let escaped = ESCAPED_CHAR_RE.replace_all(course.as_str(), |caps: &Captures<'_>| {
        let matched = &caps[0];
        if matched == "_" {
            "__".to_string()
        } else {
            matched.bytes().map(|b| format!("_{b:02x}")).collect()
        }
    });
    format!("engagement_{escaped}")
}

/// Writes the summary, detail and weekly-effort tables for one course.
pub fn write_tables(
    dir: &Path,
    stem: &str,
    engagement: &CourseEngagement,
) -> Result<TablePaths, PartialWriteError> {
    let paths = TablePaths::for_stem(dir, stem);
    write_atomic(&paths.summary, render_summary(engagement).as_bytes())?;
    write_atomic(&paths.detail, render_detail(engagement).as_bytes())?;
    write_atomic(&paths.weekly, render_weekly(engagement).as_bytes())?;
    tracing::debug!(course = %engagement.course, summary = %paths.summary.display(), "wrote tables");
    Ok(paths)
}

pub fn render_detail(engagement: &CourseEngagement) -> String {
    let mut out = String::from(DETAIL_HEADER);
    out.push('\n');
    for row in &engagement.details {
        push_record(
            &mut out,
            &[
                PLATFORM,
                engagement.course.as_str(),
                row.student.as_str(),
                &row.date.format("%Y-%m-%d").to_string(),
                &row.time.format("%H:%M:%S").to_string(),
                &row.minutes.to_string(),
            ],
        );
    }
    out
}

pub fn render_weekly(engagement: &CourseEngagement) -> String {
    let mut out = String::from(WEEKLY_HEADER);
    out.push('\n');
    for row in &engagement.weekly {
        push_record(
            &mut out,
            &[
                PLATFORM,
                engagement.course.as_str(),
                row.student.as_str(),
                &row.week.to_string(),
                &row.minutes.to_string(),
            ],
        );
    }
    out
}

pub fn render_summary(engagement: &CourseEngagement) -> String {
    let summary = &engagement.summary;
    let mut out = String::from(SUMMARY_HEADER);
    out.push('\n');
    push_record(
        &mut out,
        &[
            PLATFORM,
            engagement.course.as_str(),
            &summary.total_sessions.to_string(),
            &summary.total_minutes.to_string(),
            &summary.sessions_1to20min.to_string(),
            &summary.sessions_21to60min.to_string(),
            &summary.sessions_over60min.to_string(),
        ],
    );
    out
}

/// Concatenates CSV files into `output`, keeping only the first file's header.
///
/// Inputs are appended in the order given.
pub fn concat_csv(inputs: &[&Path], output: &Path) -> Result<(), PartialWriteError> {
    let mut combined = String::new();
    for (idx, input) in inputs.iter().enumerate() {
        let content = fs::read_to_string(input).map_err(|source| PartialWriteError {
            path: output.to_path_buf(),
            source,
        })?;
        let body = if idx == 0 {
            content.as_str()
        } else {
            content.split_once('\n').map_or("", |(_, rest)| rest)
        };
        combined.push_str(body);
        if !combined.is_empty() && !combined.ends_with('\n') {
            combined.push('\n');
        }
    }
    write_atomic(output, combined.as_bytes())
}

/// Merges per-course tables into one set of tables under `stem`.
pub fn combine_tables(
    dir: &Path,
    stem: &str,
    parts: &[&TablePaths],
) -> Result<TablePaths, PartialWriteError> {
    let paths = TablePaths::for_stem(dir, stem);
    let summaries: Vec<&Path> = parts.iter().map(|p| p.summary.as_path()).collect();
    let details: Vec<&Path> = parts.iter().map(|p| p.detail.as_path()).collect();
    let weeklies: Vec<&Path> = parts.iter().map(|p| p.weekly.as_path()).collect();
    concat_csv(&summaries, &paths.summary)?;
    concat_csv(&details, &paths.detail)?;
    concat_csv(&weeklies, &paths.weekly)?;
    Ok(paths)
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), PartialWriteError> {
    let wrap = |source: io::Error| PartialWriteError {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(wrap)?;
    tmp.write_all(contents).map_err(wrap)?;
    tmp.as_file().sync_all().map_err(wrap)?;
    tmp.persist(path).map_err(|e| wrap(e.error))?;
    Ok(())
}

fn push_record(out: &mut String, fields: &[&str]) {
    for (idx, field) in fields.iter().enumerate() {
        if idx > 0 {
            out.push(',');
        }
        out.push_str(&escape_field(field));
    }
    out.push('\n');
}

fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}
