//! Raw learner activity events.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::types::{CourseId, StudentId};

/// Timestamp layout used by the activity warehouse (second resolution).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One row of raw learner activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub course: CourseId,
    pub student: StudentId,
    /// Browser/LMS action, e.g. `page_close` or `load_video`.
    pub event_type: String,
    pub timestamp: NaiveDateTime,
    /// Video events get the video cap and the video trailing attribution.
    pub is_video: bool,
}

impl ActivityEvent {
    pub fn new(
        course: CourseId,
        student: StudentId,
        event_type: impl Into<String>,
        timestamp: NaiveDateTime,
        is_video: bool,
    ) -> Self {
        Self {
            course,
            student,
            event_type: event_type.into(),
            timestamp,
            is_video,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }

    pub fn time(&self) -> NaiveTime {
        self.timestamp.time()
    }

    /// Whether `other` belongs to the same (course, student) stream.
    pub fn same_stream(&self, other: &Self) -> bool {
        self.course == other.course && self.student == other.student
    }
}

/// Parses an event timestamp.
///
/// Accepts the warehouse layout (`2013-08-30 03:27:00`), the same with a `T`
/// separator, and RFC 3339 (converted to its UTC wall-clock time).
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.naive_utc()))
}

/// Formats a timestamp in the warehouse layout.
pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}
