//! Course-relative week numbering.
//!
//! Week 1 starts on the course's recorded start date. Dates before the start
//! are clamped to week 1; callers that care can detect them with
//! [`is_before_start`].

use chrono::NaiveDate;

/// 1-indexed academic week of `event_date` relative to `course_start`.
pub fn to_week(event_date: NaiveDate, course_start: NaiveDate) -> u32 {
    let days = (event_date - course_start).num_days();
    if days < 0 {
        return 1;
    }
    u32::try_from(days / 7).map_or(u32::MAX, |w| w.saturating_add(1))
}

/// Whether `event_date` falls before the course's recorded start.
pub fn is_before_start(event_date: NaiveDate, course_start: NaiveDate) -> bool {
    event_date < course_start
}
