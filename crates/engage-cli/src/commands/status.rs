//! Status command for showing loaded courses.

use std::io::Write;

use anyhow::{Context, Result};

use engage_db::Database;

use crate::Config;

pub fn run<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let db = Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    let courses = db.course_status()?;

    writeln!(writer, "Engagement store status")?;
    writeln!(writer, "Database: {}", config.database_path.display())?;

    if courses.is_empty() {
        writeln!(writer, "No activity recorded.")?;
        return Ok(());
    }

    writeln!(writer, "Courses:")?;
    for course in courses {
        let start = course
            .start
            .map_or_else(|| "no start date".to_string(), |s| format!("starts {}", s.date()));
        writeln!(
            writer,
            "- {}: {} events, {} students, {start}",
            course.course, course.events, course.students
        )?;
    }

    Ok(())
}
