//! Import command for loading activity events into the `SQLite` store.

use std::io::{self, BufRead};

use anyhow::{Context, Result};
use serde::Deserialize;

use engage_core::{ActivityEvent, CourseId, EventType, StudentId, parse_timestamp};
use engage_db::Database;

use crate::Config;

pub fn run(config: &Config) -> Result<usize> {
    let stdin = io::stdin();
    let events = parse_events(stdin.lock())?;

    let mut db = Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    let inserted = db.insert_activities(&events)?;
    tracing::debug!(inserted, "imported activities");
    Ok(inserted)
}

fn parse_events<R: BufRead>(reader: R) -> Result<Vec<ActivityEvent>> {
    let mut events = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let parsed: ImportEvent = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid JSON on line {}", idx + 1))?;
        let event = parsed
            .into_event()
            .with_context(|| format!("invalid event on line {}", idx + 1))?;
        events.push(event);
    }
    Ok(events)
}

#[derive(Debug, Deserialize)]
struct ImportEvent {
    course_id: String,
    student_id: String,
    event_type: String,
    timestamp: String,
    #[serde(default)]
    is_video: Option<VideoFlag>,
}

/// Warehouse exports write the flag as `0`/`1`; hand-written input uses booleans.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VideoFlag {
    Bool(bool),
    Int(i64),
}

impl ImportEvent {
    fn into_event(self) -> Result<ActivityEvent> {
        if self.event_type.trim().is_empty() {
            return Err(anyhow::anyhow!("missing event_type"));
        }
        let timestamp = parse_timestamp(&self.timestamp)
            .with_context(|| format!("invalid timestamp: {}", self.timestamp))?;
        let is_video = match self.is_video {
            Some(VideoFlag::Bool(flag)) => flag,
            Some(VideoFlag::Int(0)) => false,
            Some(VideoFlag::Int(1)) => true,
            Some(VideoFlag::Int(other)) => {
                return Err(anyhow::anyhow!("is_video must be 0 or 1, got {other}"));
            }
            None => EventType::is_video_type(&self.event_type),
        };
        Ok(ActivityEvent::new(
            CourseId::new(self.course_id)?,
            StudentId::new(self.student_id)?,
            self.event_type,
            timestamp,
            is_video,
        ))
    }
}
