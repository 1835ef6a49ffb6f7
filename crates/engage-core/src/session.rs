//! Session segmentation.
//!
//! A session is a maximal run of one student's events in one course where no
//! two consecutive events are further apart than the inactivity gap.

use chrono::{Duration, NaiveDateTime};
use thiserror::Error;

use crate::event::ActivityEvent;
use crate::types::{CourseId, StudentId};

/// Input to [`segment`] violated its ordering precondition.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderingError {
    /// An event is earlier than the one before it.
    #[error(
        "event {index} for student {student} at {current} precedes the previous event at {previous}"
    )]
    OutOfOrder {
        student: StudentId,
        index: usize,
        previous: NaiveDateTime,
        current: NaiveDateTime,
    },

    /// An event belongs to a different (course, student) stream.
    #[error("event {index} belongs to {found_course}/{found_student}, expected {course}/{student}")]
    MixedStream {
        course: CourseId,
        student: StudentId,
        index: usize,
        found_course: CourseId,
        found_student: StudentId,
    },
}

/// A run of consecutive events for one student in one course.
///
/// Always holds at least one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session<'a> {
    events: &'a [ActivityEvent],
}

impl<'a> Session<'a> {
    pub const fn events(&self) -> &'a [ActivityEvent] {
        self.events
    }

    fn first(&self) -> &'a ActivityEvent {
        &self.events[0]
    }

    fn last(&self) -> &'a ActivityEvent {
        &self.events[self.events.len() - 1]
    }

    pub fn course(&self) -> &'a CourseId {
        &self.first().course
    }

    pub fn student(&self) -> &'a StudentId {
        &self.first().student
    }

    pub fn start(&self) -> NaiveDateTime {
        self.first().timestamp
    }

    pub fn end(&self) -> NaiveDateTime {
        self.last().timestamp
    }

    /// Wall-clock time between the first and last event.
    pub fn span(&self) -> Duration {
        self.end() - self.start()
    }

    pub const fn len(&self) -> usize {
        self.events.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Splits one student's ordered events into sessions.
///
/// A gap strictly greater than `gap` closes the current session. Every event
/// lands in exactly one session, and sessions come back in event order.
pub fn segment(events: &[ActivityEvent], gap: Duration) -> Result<Vec<Session<'_>>, OrderingError> {
    let Some(head) = events.first() else {
        return Ok(Vec::new());
    };

    let mut sessions = Vec::new();
    let mut start = 0;
    for (index, pair) in events.windows(2).enumerate() {
        let (prev, next) = (&pair[0], &pair[1]);
        if !head.same_stream(next) {
            return Err(OrderingError::MixedStream {
                course: head.course.clone(),
                student: head.student.clone(),
                index: index + 1,
                found_course: next.course.clone(),
                found_student: next.student.clone(),
            });
        }
        if next.timestamp < prev.timestamp {
            return Err(OrderingError::OutOfOrder {
                student: head.student.clone(),
                index: index + 1,
                previous: prev.timestamp,
                current: next.timestamp,
            });
        }
        if next.timestamp - prev.timestamp > gap {
            sessions.push(Session {
                events: &events[start..=index],
            });
            start = index + 1;
        }
    }
    sessions.push(Session {
        events: &events[start..],
    });

    tracing::trace!(
        student = %head.student,
        events = events.len(),
        sessions = sessions.len(),
        "segmented event stream"
    );
    Ok(sessions)
}
