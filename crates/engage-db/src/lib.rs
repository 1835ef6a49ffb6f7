//! Storage layer for the engagement computer.
//!
//! Provides the activity event source and the course-runtime lookup using
//! `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! Parallel course workers each open their own connection with
//! [`Database::open_read_only`]; nothing in the computation writes to the store.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in the warehouse layout (`2013-08-30 03:27:00`),
//! so lexicographic ordering matches chronological ordering.
//!
//! ## Course Runtimes
//!
//! `course_runtimes.start_time` anchors week numbering for a course. A course
//! with activity but no runtime row cannot be computed.

mod cache;

use std::path::Path;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use engage_core::{ActivityEvent, CourseId, StudentId, format_timestamp, parse_timestamp};
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params};
use thiserror::Error;

pub use cache::CourseStartCache;

/// How long a read-only worker waits on a locked database.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors reading from or writing to the activity store.
#[derive(Debug, Error)]
pub enum DataSourceError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored timestamp could not be parsed.
    #[error("invalid timestamp in {table} row {row_id}: {timestamp}")]
    TimestampParse {
        table: &'static str,
        row_id: i64,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored row violates the data model.
    #[error("invalid {table} row {row_id}: {message}")]
    InvalidRow {
        table: &'static str,
        row_id: i64,
        message: String,
    },
    /// The course has no recorded start date.
    #[error("no start date recorded for course {0}")]
    MissingCourseStart(CourseId),
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// A course's recorded runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseRuntime {
    pub course: CourseId,
    pub start: NaiveDateTime,
    pub end: Option<NaiveDateTime>,
}

impl CourseRuntime {
    /// The date week 1 starts on.
    pub fn start_date(&self) -> NaiveDate {
        self.start.date()
    }
}

/// Which courses to compute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseFilter {
    pattern: CoursePattern,
    min_start_year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CoursePattern {
    Exact(String),
    /// A SQL `LIKE` pattern with `\` as the escape character.
    Like(String),
}

impl CourseFilter {
    /// Builds a filter from a course ID or wildcard pattern.
    ///
    /// `%` and `*` match any run of characters; everything else, including
    /// `_`, matches literally. A pattern without wildcards is an exact match.
    pub fn new(pattern: &str) -> Self {
        let pattern = if pattern.contains(['%', '*']) {
            let mut like = String::with_capacity(pattern.len());
            for c in pattern.chars() {
                match c {
                    '*' | '%' => like.push('%'),
                    '_' | '\\' => {
                        like.push('\\');
                        like.push(c);
                    }
                    _ => like.push(c),
                }
            }
            CoursePattern::Like(like)
        } else {
            CoursePattern::Exact(pattern.to_string())
        };
        Self {
            pattern,
            min_start_year: None,
        }
    }

    /// Only courses whose recorded start year is at least `year`.
    #[must_use]
    pub const fn with_min_start_year(mut self, year: Option<i32>) -> Self {
        self.min_start_year = year;
        self
    }
}

/// Event volume and runtime for one course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseStatus {
    pub course: CourseId,
    pub events: i64,
    pub students: i64,
    pub start: Option<NaiveDateTime>,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DataSourceError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an existing database for reading only.
    ///
    /// Used by course workers; does not touch the schema.
    pub fn open_read_only(path: &Path) -> Result<Self, DataSourceError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self { conn })
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DataSourceError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DataSourceError> {
        self.conn.execute_batch(
            "
            -- Raw learner activity, one row per browser/LMS event
            -- timestamp: 'YYYY-MM-DD HH:MM:SS'
            CREATE TABLE IF NOT EXISTS activities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                course_id TEXT NOT NULL,
                student_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                is_video INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_activities_course_student_time
                ON activities(course_id, student_id, timestamp);

            CREATE TABLE IF NOT EXISTS course_runtimes (
                course_id TEXT PRIMARY KEY,
                start_time TEXT NOT NULL,
                end_time TEXT
            );
            ",
        )?;
        Ok(())
    }

    /// Inserts a batch of activity events in one transaction.
    pub fn insert_activities(&mut self, events: &[ActivityEvent]) -> Result<usize, DataSourceError> {
        if events.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO activities (course_id, student_id, event_type, timestamp, is_video)
                VALUES (?, ?, ?, ?, ?)
                ",
            )?;
            for event in events {
                inserted += stmt.execute(params![
                    event.course.as_str(),
                    event.student.as_str(),
                    event.event_type,
                    format_timestamp(event.timestamp),
                    event.is_video,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Records (or replaces) a course's runtime.
    pub fn upsert_course_runtime(&self, runtime: &CourseRuntime) -> Result<(), DataSourceError> {
        self.conn.execute(
            "
            INSERT INTO course_runtimes (course_id, start_time, end_time)
            VALUES (?, ?, ?)
            ON CONFLICT(course_id) DO UPDATE SET
                start_time = excluded.start_time,
                end_time = excluded.end_time
            ",
            params![
                runtime.course.as_str(),
                format_timestamp(runtime.start),
                runtime.end.map(format_timestamp),
            ],
        )?;
        Ok(())
    }

    /// Lists all course runtimes ordered by course ID.
    pub fn list_course_runtimes(&self) -> Result<Vec<CourseRuntime>, DataSourceError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT rowid, course_id, start_time, end_time
            FROM course_runtimes
            ORDER BY course_id ASC
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;
        let mut runtimes = Vec::new();
        for row in rows {
            let (row_id, course, start, end) = row?;
            runtimes.push(CourseRuntime {
                course: course_id(&course, "course_runtimes", row_id)?,
                start: timestamp(&start, "course_runtimes", row_id)?,
                end: end
                    .map(|end| timestamp(&end, "course_runtimes", row_id))
                    .transpose()?,
            });
        }
        Ok(runtimes)
    }

    /// Looks up the date a course started, if recorded.
    pub fn course_start_date(&self, course: &CourseId) -> Result<Option<NaiveDate>, DataSourceError> {
        let row = self
            .conn
            .query_row(
                "SELECT rowid, start_time FROM course_runtimes WHERE course_id = ?",
                params![course.as_str()],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        row.map(|(row_id, start)| timestamp(&start, "course_runtimes", row_id).map(|ts| ts.date()))
            .transpose()
    }

    /// Like [`Self::course_start_date`], but a missing runtime is an error.
    pub fn require_course_start(&self, course: &CourseId) -> Result<NaiveDate, DataSourceError> {
        self.course_start_date(course)?
            .ok_or_else(|| DataSourceError::MissingCourseStart(course.clone()))
    }

    /// Lists courses with activity that match `filter`, ordered by course ID.
    ///
    /// With a minimum start year, courses without a recorded runtime are excluded.
    pub fn list_courses(&self, filter: &CourseFilter) -> Result<Vec<CourseId>, DataSourceError> {
        let (comparison, pattern) = match &filter.pattern {
            CoursePattern::Exact(id) => ("a.course_id = ?1", id),
            CoursePattern::Like(like) => ("a.course_id LIKE ?1 ESCAPE '\\'", like),
        };
        let query = format!(
            "
            SELECT a.course_id, MIN(a.id)
            FROM activities a
            LEFT JOIN course_runtimes r ON r.course_id = a.course_id
            WHERE {comparison}
              AND (?2 IS NULL OR CAST(substr(r.start_time, 1, 4) AS INTEGER) >= ?2)
            GROUP BY a.course_id
            ORDER BY a.course_id ASC
            "
        );
        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map(params![pattern, filter.min_start_year], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut courses = Vec::new();
        for row in rows {
            let (course, row_id) = row?;
            courses.push(course_id(&course, "activities", row_id)?);
        }
        Ok(courses)
    }

    /// Loads a course's events ordered by student, then time.
    ///
    /// With `video_only`, non-video events are left out entirely.
    pub fn activities_for_course(
        &self,
        course: &CourseId,
        video_only: bool,
    ) -> Result<Vec<ActivityEvent>, DataSourceError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT id, course_id, student_id, event_type, timestamp, is_video
            FROM activities
            WHERE course_id = ?1 AND (?2 = 0 OR is_video = 1)
            ORDER BY student_id ASC, timestamp ASC, id ASC
            ",
        )?;
        let rows = stmt.query_map(params![course.as_str(), video_only], read_activity_row)?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?.into_event()?);
        }
        tracing::debug!(course = %course, video_only, count = events.len(), "loaded activities");
        Ok(events)
    }

    /// Per-course event counts, with the recorded start if any.
    pub fn course_status(&self) -> Result<Vec<CourseStatus>, DataSourceError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT a.course_id, MIN(a.id), COUNT(*), COUNT(DISTINCT a.student_id),
                   r.rowid, r.start_time
            FROM activities a
            LEFT JOIN course_runtimes r ON r.course_id = a.course_id
            GROUP BY a.course_id
            ORDER BY a.course_id ASC
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, Option<i64>>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;
        let mut statuses = Vec::new();
        for row in rows {
            let (course, first_row, events, students, runtime_row, start) = row?;
            let start = match (start, runtime_row) {
                (Some(start), Some(row_id)) => Some(timestamp(&start, "course_runtimes", row_id)?),
                _ => None,
            };
            statuses.push(CourseStatus {
                course: course_id(&course, "activities", first_row)?,
                events,
                students,
                start,
            });
        }
        Ok(statuses)
    }
}

/// An `activities` row before validation.
struct ActivityRow {
    id: i64,
    course: String,
    student: String,
    event_type: String,
    timestamp: String,
    is_video: bool,
}

fn read_activity_row(row: &Row<'_>) -> rusqlite::Result<ActivityRow> {
    Ok(ActivityRow {
        id: row.get(0)?,
        course: row.get(1)?,
        student: row.get(2)?,
        event_type: row.get(3)?,
        timestamp: row.get(4)?,
        is_video: row.get(5)?,
    })
}

impl ActivityRow {
    fn into_event(self) -> Result<ActivityEvent, DataSourceError> {
        let student = StudentId::new(self.student).map_err(|e| DataSourceError::InvalidRow {
            table: "activities",
            row_id: self.id,
            message: e.to_string(),
        })?;
        Ok(ActivityEvent::new(
            course_id(&self.course, "activities", self.id)?,
            student,
            self.event_type,
            timestamp(&self.timestamp, "activities", self.id)?,
            self.is_video,
        ))
    }
}

fn course_id(raw: &str, table: &'static str, row_id: i64) -> Result<CourseId, DataSourceError> {
    CourseId::new(raw).map_err(|e| DataSourceError::InvalidRow {
        table,
        row_id,
        message: e.to_string(),
    })
}

fn timestamp(raw: &str, table: &'static str, row_id: i64) -> Result<NaiveDateTime, DataSourceError> {
    parse_timestamp(raw).map_err(|source| DataSourceError::TimestampParse {
        table,
        row_id,
        timestamp: raw.to_string(),
        source,
    })
}
