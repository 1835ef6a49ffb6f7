//! Time-on-task allocation.
//!
//! Each event is credited with the time until the next event in its session,
//! capped by event kind and rounded to whole minutes. The final event of a
//! session has nothing to measure against and receives a fixed trailing credit
//! instead (see [`EngagementConfig::trailing_minutes`]).

use chrono::{Duration, NaiveDate, NaiveTime};

use crate::config::EngagementConfig;
use crate::event::ActivityEvent;
use crate::session::Session;
use crate::types::{CourseId, StudentId};

/// Minutes credited to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventTimeAllocation<'a> {
    pub event: &'a ActivityEvent,
    pub minutes: i64,
    /// True for the session's final event (fixed trailing credit).
    pub trailing: bool,
}

impl<'a> EventTimeAllocation<'a> {
    pub fn course(&self) -> &'a CourseId {
        &self.event.course
    }

    pub fn student(&self) -> &'a StudentId {
        &self.event.student
    }

    pub fn date(&self) -> NaiveDate {
        self.event.date()
    }

    pub fn time(&self) -> NaiveTime {
        self.event.time()
    }
}

/// A session together with the allocations of its events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatedSession<'a> {
    pub session: Session<'a>,
    pub allocations: Vec<EventTimeAllocation<'a>>,
}

impl AllocatedSession<'_> {
    /// Sum of the session's event allocations.
    pub fn total_minutes(&self) -> i64 {
        self.allocations.iter().map(|a| a.minutes).sum()
    }
}

/// Credits every event in `session`, preserving event order.
pub fn allocate<'a>(session: &Session<'a>, config: &EngagementConfig) -> Vec<EventTimeAllocation<'a>> {
    let events = session.events();
    let mut allocations = Vec::with_capacity(events.len());

    for pair in events.windows(2) {
        let (event, next) = (&pair[0], &pair[1]);
        let gap = (next.timestamp - event.timestamp).min(config.cap(event.is_video));
        allocations.push(EventTimeAllocation {
            event,
            minutes: whole_minutes(gap),
            trailing: false,
        });
    }

    if let Some(last) = events.last() {
        allocations.push(EventTimeAllocation {
            event: last,
            minutes: config.trailing_minutes(last.is_video),
            trailing: true,
        });
    }

    allocations
}

/// Allocates every session of one student.
pub fn allocate_sessions<'a>(
    sessions: Vec<Session<'a>>,
    config: &EngagementConfig,
) -> Vec<AllocatedSession<'a>> {
    sessions
        .into_iter()
        .map(|session| AllocatedSession {
            allocations: allocate(&session, config),
            session,
        })
        .collect()
}

/// Rounds a non-negative duration to the nearest minute, halves up.
///
/// 20s -> 0, 9m40s -> 10, 28m25s -> 28.
fn whole_minutes(duration: Duration) -> i64 {
    let seconds = duration.num_seconds().max(0);
    (seconds + 30) / 60
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngagementSettings;
    use crate::event::parse_timestamp;
    use crate::session::segment;

    fn event(ts: &str, event_type: &str, is_video: bool) -> ActivityEvent {
        ActivityEvent::new(
            CourseId::new("CME/MedStats/2013-2015").unwrap(),
            StudentId::new("abc").unwrap(),
            event_type,
            parse_timestamp(ts).unwrap(),
            is_video,
        )
    }

    fn minutes(events: &[ActivityEvent], config: &EngagementConfig) -> Vec<i64> {
        let sessions = segment(events, config.session_gap()).unwrap();
        assert_eq!(sessions.len(), 1, "fixture should be a single session");
        allocate(&sessions[0], config)
            .iter()
            .map(|a| a.minutes)
            .collect()
    }

    #[test]
    fn test_whole_minutes_rounding() {
        assert_eq!(whole_minutes(Duration::seconds(20)), 0);
        assert_eq!(whole_minutes(Duration::seconds(30)), 1);
        assert_eq!(whole_minutes(Duration::seconds(9 * 60 + 40)), 10);
        assert_eq!(whole_minutes(Duration::seconds(28 * 60 + 25)), 28);
        assert_eq!(whole_minutes(Duration::seconds(-5)), 0);
    }

    #[test]
    fn test_first_fixture_session() {
        // page_close, 20s, load_video, 9m40s, seq_goto (last, non-video)
        let events = [
            event("2013-08-30 03:27:00", "page_close", false),
            event("2013-08-30 03:27:20", "load_video", true),
            event("2013-08-30 03:37:00", "seq_goto", false),
        ];
        assert_eq!(minutes(&events, &EngagementConfig::default()), vec![0, 10, 5]);
    }

    #[test]
    fn test_fourth_fixture_session() {
        let events = [
            event("2013-09-15 03:27:25", "seq_goto", false),
            event("2013-09-15 03:30:35", "page_close", false),
            event("2013-09-15 03:59:00", "load_video", true),
            event("2013-09-15 04:05:00", "seq_goto", false),
        ];
        let allocated = minutes(&events, &EngagementConfig::default());
        assert_eq!(allocated, vec![3, 28, 6, 5]);
        assert_eq!(allocated.iter().sum::<i64>(), 42);
    }

    #[test]
    fn test_single_video_event_gets_video_trailing_credit() {
        let events = [event("2013-09-14 03:27:24", "load_video", true)];
        assert_eq!(minutes(&events, &EngagementConfig::default()), vec![15]);
    }

    #[test]
    fn test_single_non_video_event_gets_non_video_trailing_credit() {
        let events = [event("2013-08-30 04:10:00", "page_close", false)];
        assert_eq!(minutes(&events, &EngagementConfig::default()), vec![5]);
    }

    #[test]
    fn test_non_video_cap_applies() {
        let config = EngagementConfig::new(&EngagementSettings {
            non_video_cap_minutes: 10,
            ..EngagementSettings::default()
        })
        .unwrap();
        let events = [
            event("2013-09-15 03:30:35", "page_close", false),
            event("2013-09-15 03:59:00", "load_video", true),
            event("2013-09-15 04:20:00", "seq_goto", false),
        ];
        // page_close capped at 10; load_video keeps its 21 minutes
        assert_eq!(minutes(&events, &config), vec![10, 21, 5]);
    }

    #[test]
    fn test_video_cap_applies() {
        let config = EngagementConfig::new(&EngagementSettings {
            video_cap_minutes: 12,
            ..EngagementSettings::default()
        })
        .unwrap();
        let events = [
            event("2013-09-15 03:00:00", "play_video", true),
            event("2013-09-15 03:25:00", "seq_goto", false),
        ];
        assert_eq!(minutes(&events, &config), vec![12, 5]);
    }

    #[test]
    fn test_zero_trailing_yields_zero_minute_session() {
        let config = EngagementConfig::new(&EngagementSettings {
            trailing_non_video_minutes: 0,
            ..EngagementSettings::default()
        })
        .unwrap();
        let events = [event("2013-08-30 04:10:00", "page_close", false)];
        assert_eq!(minutes(&events, &config), vec![0]);
    }

    #[test]
    fn test_only_final_event_is_trailing() {
        let events = [
            event("2013-08-30 03:27:00", "page_close", false),
            event("2013-08-30 03:28:00", "seq_goto", false),
        ];
        let config = EngagementConfig::default();
        let sessions = segment(&events, config.session_gap()).unwrap();
        let allocated = allocate(&sessions[0], &config);
        assert!(!allocated[0].trailing);
        assert!(allocated[1].trailing);
        assert_eq!(allocated[1].time().to_string(), "03:28:00");
    }

    #[test]
    fn test_allocated_session_total() {
        let events = [
            event("2013-08-30 03:27:00", "page_close", false),
            event("2013-08-30 03:27:20", "load_video", true),
            event("2013-08-30 03:37:00", "seq_goto", false),
        ];
        let config = EngagementConfig::default();
        let sessions = segment(&events, config.session_gap()).unwrap();
        let allocated = allocate_sessions(sessions, &config);
        assert_eq!(allocated[0].total_minutes(), 15);
    }
}
