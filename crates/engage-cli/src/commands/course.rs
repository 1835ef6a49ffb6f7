//! Course runtime management.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};

use engage_core::{CourseId, format_timestamp, parse_timestamp};
use engage_db::{CourseRuntime, Database};

/// Records a course's start (and optional end).
pub fn add(db: &Database, course: &str, start: &str, end: Option<&str>) -> Result<CourseRuntime> {
    let runtime = CourseRuntime {
        course: CourseId::new(course)?,
        start: parse_course_time(start).context("invalid --start")?,
        end: end
            .map(|end| parse_course_time(end).context("invalid --end"))
            .transpose()?,
    };
    if let Some(end) = runtime.end.filter(|end| *end < runtime.start) {
        anyhow::bail!("course end {end} is before its start {}", runtime.start);
    }
    db.upsert_course_runtime(&runtime)?;
    Ok(runtime)
}

pub fn list<W: Write>(writer: &mut W, db: &Database) -> Result<()> {
    let runtimes = db.list_course_runtimes()?;
    if runtimes.is_empty() {
        writeln!(writer, "No courses recorded.")?;
        return Ok(());
    }
    for runtime in runtimes {
        let start = format_timestamp(runtime.start);
        match runtime.end {
            Some(end) => writeln!(
                writer,
                "- {}: {start} to {}",
                runtime.course,
                format_timestamp(end)
            )?,
            None => writeln!(writer, "- {}: from {start}", runtime.course)?,
        }
    }
    Ok(())
}

/// Accepts a full timestamp or a bare date (midnight).
fn parse_course_time(raw: &str) -> Result<NaiveDateTime> {
    if let Ok(ts) = parse_timestamp(raw) {
        return Ok(ts);
    }
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("expected YYYY-MM-DD [HH:MM:SS], got {raw}"))?;
    Ok(date.and_time(chrono::NaiveTime::MIN))
}
