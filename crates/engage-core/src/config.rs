//! Engagement computation parameters.
//!
//! [`EngagementSettings`] is the plain, serializable form loaded from config
//! files. It must be validated into an [`EngagementConfig`] before use; invalid
//! values are rejected rather than replaced by defaults.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Inactivity gap after which a new session starts (minutes).
pub const DEFAULT_SESSION_GAP_MINUTES: i64 = 30;
/// Longest time a single video event may be credited with (minutes).
pub const DEFAULT_VIDEO_CAP_MINUTES: i64 = 30;
/// Longest time a single non-video event may be credited with (minutes).
///
/// Matches the video cap so that the reference export's 28 minute credit for
/// a `page_close` is reproduced. A smaller non-video cap (such as 10) changes
/// those published figures and must be set deliberately.
pub const DEFAULT_NON_VIDEO_CAP_MINUTES: i64 = 30;
/// Credit for a session's final event when it is a video event (minutes).
///
/// There is no following event to measure against, so this stands in for
/// unmeasured trailing watch time.
pub const DEFAULT_TRAILING_VIDEO_MINUTES: i64 = 15;
/// Credit for a session's final event when it is not a video event (minutes).
pub const DEFAULT_TRAILING_NON_VIDEO_MINUTES: i64 = 5;

/// Invalid engagement parameters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: i64 },

    #[error("{field} cannot be negative, got {value}")]
    Negative { field: &'static str, value: i64 },

    #[error("{field} ({value} min) cannot exceed session_gap_minutes ({gap} min)")]
    CapExceedsGap {
        field: &'static str,
        value: i64,
        gap: i64,
    },
}

/// What the session-length histogram counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketBasis {
    /// One value per (student, week): the median total of the sessions that
    /// started in that week.
    #[default]
    StudentWeekMedian,
    /// One value per session: its total minutes.
    Session,
}

/// Granularity of the detail table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailGranularity {
    /// One row per session, stamped with the session start.
    #[default]
    Session,
    /// One row per event allocation.
    Event,
}

/// Raw engagement parameters as they appear in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngagementSettings {
    pub session_gap_minutes: i64,
    pub video_cap_minutes: i64,
    pub non_video_cap_minutes: i64,
    pub trailing_video_minutes: i64,
    pub trailing_non_video_minutes: i64,
    pub bucket_basis: BucketBasis,
    pub detail_granularity: DetailGranularity,
}

impl Default for EngagementSettings {
    fn default() -> Self {
        Self {
            session_gap_minutes: DEFAULT_SESSION_GAP_MINUTES,
            video_cap_minutes: DEFAULT_VIDEO_CAP_MINUTES,
            non_video_cap_minutes: DEFAULT_NON_VIDEO_CAP_MINUTES,
            trailing_video_minutes: DEFAULT_TRAILING_VIDEO_MINUTES,
            trailing_non_video_minutes: DEFAULT_TRAILING_NON_VIDEO_MINUTES,
            bucket_basis: BucketBasis::default(),
            detail_granularity: DetailGranularity::default(),
        }
    }
}

/// Validated engagement parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngagementConfig {
    session_gap: Duration,
    video_cap: Duration,
    non_video_cap: Duration,
    trailing_video_minutes: i64,
    trailing_non_video_minutes: i64,
    bucket_basis: BucketBasis,
    detail_granularity: DetailGranularity,
}

impl EngagementConfig {
    pub fn new(settings: &EngagementSettings) -> Result<Self, ConfigurationError> {
        let gap = positive("session_gap_minutes", settings.session_gap_minutes)?;
        let video_cap = positive("video_cap_minutes", settings.video_cap_minutes)?;
        let non_video_cap = positive("non_video_cap_minutes", settings.non_video_cap_minutes)?;
        for (field, value) in [
            ("video_cap_minutes", video_cap),
            ("non_video_cap_minutes", non_video_cap),
        ] {
            if value > gap {
                return Err(ConfigurationError::CapExceedsGap { field, value, gap });
            }
        }
        let trailing_video = non_negative("trailing_video_minutes", settings.trailing_video_minutes)?;
        let trailing_non_video = non_negative(
            "trailing_non_video_minutes",
            settings.trailing_non_video_minutes,
        )?;

        Ok(Self {
            session_gap: Duration::minutes(gap),
            video_cap: Duration::minutes(video_cap),
            non_video_cap: Duration::minutes(non_video_cap),
            trailing_video_minutes: trailing_video,
            trailing_non_video_minutes: trailing_non_video,
            bucket_basis: settings.bucket_basis,
            detail_granularity: settings.detail_granularity,
        })
    }

    pub const fn session_gap(&self) -> Duration {
        self.session_gap
    }

    /// Cap on the credit for a non-final event.
    pub const fn cap(&self, is_video: bool) -> Duration {
        if is_video {
            self.video_cap
        } else {
            self.non_video_cap
        }
    }

    /// Fixed credit for a session's final event.
    pub const fn trailing_minutes(&self, is_video: bool) -> i64 {
        if is_video {
            self.trailing_video_minutes
        } else {
            self.trailing_non_video_minutes
        }
    }

    pub const fn bucket_basis(&self) -> BucketBasis {
        self.bucket_basis
    }

    pub const fn detail_granularity(&self) -> DetailGranularity {
        self.detail_granularity
    }
}

impl Default for EngagementConfig {
    fn default() -> Self {
        let settings = EngagementSettings::default();
        Self {
            session_gap: Duration::minutes(settings.session_gap_minutes),
            video_cap: Duration::minutes(settings.video_cap_minutes),
            non_video_cap: Duration::minutes(settings.non_video_cap_minutes),
            trailing_video_minutes: settings.trailing_video_minutes,
            trailing_non_video_minutes: settings.trailing_non_video_minutes,
            bucket_basis: settings.bucket_basis,
            detail_granularity: settings.detail_granularity,
        }
    }
}

const fn positive(field: &'static str, value: i64) -> Result<i64, ConfigurationError> {
    if value > 0 {
        Ok(value)
    } else {
        Err(ConfigurationError::NotPositive { field, value })
    }
}

const fn non_negative(field: &'static str, value: i64) -> Result<i64, ConfigurationError> {
    if value >= 0 {
        Ok(value)
    } else {
        Err(ConfigurationError::Negative { field, value })
    }
}
