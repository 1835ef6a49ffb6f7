//! Reduction of allocated sessions into the three engagement tables.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::allocation::{AllocatedSession, allocate_sessions};
use crate::config::{BucketBasis, DetailGranularity, EngagementConfig};
use crate::event::ActivityEvent;
use crate::session::{OrderingError, segment};
use crate::types::{CourseId, StudentId};
use crate::week::{is_before_start, to_week};

/// Provenance tag written as the first column of every table.
pub const PLATFORM: &str = "OpenEdX";

/// One detail-table row: a session (or a single event, see
/// [`DetailGranularity`]) and the minutes credited to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailRow {
    pub student: StudentId,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub minutes: i64,
}

/// Minutes one student spent in one course week.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklyEffortRow {
    pub student: StudentId,
    pub week: u32,
    pub minutes: i64,
}

/// Course-level totals and session-length histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CourseSummary {
    pub total_sessions: usize,
    pub total_minutes: i64,
    pub sessions_1to20min: usize,
    pub sessions_21to60min: usize,
    pub sessions_over60min: usize,
    /// Histogram values under one minute; counted in no bucket.
    pub zero_minute: usize,
}

impl CourseSummary {
    /// Number of values that landed in one of the three buckets.
    pub const fn bucketed(&self) -> usize {
        self.sessions_1to20min + self.sessions_21to60min + self.sessions_over60min
    }

    fn record(&mut self, half_minutes: i64) {
        match half_minutes {
            i64::MIN..=1 => self.zero_minute += 1,
            2..=40 => self.sessions_1to20min += 1,
            41..=120 => self.sessions_21to60min += 1,
            _ => self.sessions_over60min += 1,
        }
    }
}

/// A student left out of the aggregates because their events were unusable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedStudent {
    pub student: StudentId,
    pub error: OrderingError,
}

/// Everything computed for one course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseEngagement {
    pub course: CourseId,
    pub course_start: NaiveDate,
    /// Ordered by student, then time.
    pub details: Vec<DetailRow>,
    /// Ordered by student, then week.
    pub weekly: Vec<WeeklyEffortRow>,
    pub summary: CourseSummary,
    pub skipped_students: Vec<SkippedStudent>,
    /// Events dated before `course_start` (credited to week 1).
    pub pre_start_events: usize,
}

/// Aggregates allocated sessions of one course.
///
/// Sessions may arrive in any student order; output ordering depends only on
/// student IDs and timestamps.
pub fn aggregate(
    course: &CourseId,
    course_start: NaiveDate,
    sessions: &[AllocatedSession<'_>],
    config: &EngagementConfig,
) -> CourseEngagement {
    let mut details: Vec<(NaiveDateTime, DetailRow)> = Vec::new();
    let mut weekly: BTreeMap<(&StudentId, u32), i64> = BTreeMap::new();
    let mut medians: BTreeMap<(&StudentId, u32), Vec<i64>> = BTreeMap::new();
    let mut summary = CourseSummary::default();
    let mut pre_start_events = 0;

    for allocated in sessions {
        let session = &allocated.session;
        let session_minutes = allocated.total_minutes();
        summary.total_sessions += 1;
        summary.total_minutes += session_minutes;

        match config.detail_granularity() {
            DetailGranularity::Session => details.push((
                session.start(),
                DetailRow {
                    student: session.student().clone(),
                    date: session.start().date(),
                    time: session.start().time(),
                    minutes: session_minutes,
                },
            )),
            DetailGranularity::Event => {
                details.extend(allocated.allocations.iter().map(|a| {
                    (
                        a.event.timestamp,
                        DetailRow {
                            student: a.student().clone(),
                            date: a.date(),
                            time: a.time(),
                            minutes: a.minutes,
                        },
                    )
                }));
            }
        }

        for allocation in &allocated.allocations {
            if is_before_start(allocation.date(), course_start) {
                pre_start_events += 1;
            }
            let week = to_week(allocation.date(), course_start);
            *weekly.entry((allocation.student(), week)).or_insert(0) += allocation.minutes;
        }

        match config.bucket_basis() {
            BucketBasis::Session => summary.record(session_minutes * 2),
            BucketBasis::StudentWeekMedian => {
                let week = to_week(session.start().date(), course_start);
                medians
                    .entry((session.student(), week))
                    .or_default()
                    .push(session_minutes);
            }
        }
    }

    for totals in medians.values_mut() {
        summary.record(doubled_median(totals));
    }

    if pre_start_events > 0 {
        tracing::warn!(
            course = %course,
            pre_start_events,
            %course_start,
            "events before course start credited to week 1"
        );
    }

    details.sort_by(|(a_ts, a), (b_ts, b)| a.student.cmp(&b.student).then(a_ts.cmp(b_ts)));

    CourseEngagement {
        course: course.clone(),
        course_start,
        details: details.into_iter().map(|(_, row)| row).collect(),
        weekly: weekly
            .into_iter()
            .map(|((student, week), minutes)| WeeklyEffortRow {
                student: student.clone(),
                week,
                minutes,
            })
            .collect(),
        summary,
        skipped_students: Vec::new(),
        pre_start_events,
    }
}

/// Runs segmentation, allocation and aggregation for one course.
///
/// Events may interleave students but must be time-ordered per student.
/// Students whose events fail segmentation are skipped and reported in
/// [`CourseEngagement::skipped_students`]; events of other courses are ignored.
pub fn compute_course(
    course: &CourseId,
    course_start: NaiveDate,
    events: Vec<ActivityEvent>,
    config: &EngagementConfig,
) -> CourseEngagement {
    let mut by_student: BTreeMap<StudentId, Vec<ActivityEvent>> = BTreeMap::new();
    let mut foreign = 0usize;
    for event in events {
        if event.course != *course {
            foreign += 1;
            continue;
        }
        by_student.entry(event.student.clone()).or_default().push(event);
    }
    if foreign > 0 {
        tracing::warn!(course = %course, foreign, "ignoring events of other courses");
    }

    let mut skipped_students = Vec::new();
    let mut allocated = Vec::new();
    for (student, stream) in &by_student {
        match segment(stream, config.session_gap()) {
            Ok(sessions) => allocated.extend(allocate_sessions(sessions, config)),
            Err(error) => {
                tracing::warn!(course = %course, %student, %error, "skipping student");
                skipped_students.push(SkippedStudent {
                    student: student.clone(),
                    error,
                });
            }
        }
    }

    tracing::debug!(
        course = %course,
        students = by_student.len(),
        sessions = allocated.len(),
        "allocated sessions"
    );

    let mut engagement = aggregate(course, course_start, &allocated, config);
    engagement.skipped_students = skipped_students;
    engagement
}

/// Twice the median, so that even-length medians stay integral.
fn doubled_median(values: &mut [i64]) -> i64 {
    values.sort_unstable();
    let mid = values.len() / 2;
    match values.len() {
        0 => 0,
        n if n % 2 == 1 => values[mid] * 2,
        _ => values[mid - 1] + values[mid],
    }
}
