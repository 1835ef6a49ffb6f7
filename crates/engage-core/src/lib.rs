//! Core domain logic for the engagement computer.
//!
//! This crate contains the pure, I/O-free pipeline:
//! - Session segmentation: splitting a student's events on inactivity gaps
//! - Allocation: crediting each event with capped time-on-task
//! - Week numbering relative to each course's start date
//! - Aggregation into detail, weekly-effort and summary tables

mod aggregate;
mod allocation;
pub mod config;
mod event;
pub mod event_type;
pub mod session;
mod types;
pub mod week;

pub use aggregate::{
    CourseEngagement, CourseSummary, DetailRow, PLATFORM, SkippedStudent, WeeklyEffortRow,
    aggregate, compute_course,
};
pub use allocation::{AllocatedSession, EventTimeAllocation, allocate, allocate_sessions};
pub use config::{
    BucketBasis, ConfigurationError, DetailGranularity, EngagementConfig, EngagementSettings,
};
pub use event::{ActivityEvent, TIMESTAMP_FORMAT, format_timestamp, parse_timestamp};
pub use event_type::{EventType, UnknownEventType};
pub use session::{OrderingError, Session, segment};
pub use types::{CourseId, StudentId, ValidationError};
pub use week::to_week;
