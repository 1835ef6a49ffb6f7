//! Known OpenEdX browser/LMS event types.
//!
//! Events carry their type as a plain string, so unknown types never block a
//! computation. This vocabulary exists to classify video activity when a data
//! source does not supply an explicit video flag.

use std::fmt;
use std::str::FromStr;

/// Canonical OpenEdX event types the engagement computer recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    PageClose,
    SeqGoto,
    SeqNext,
    SeqPrev,
    ProblemCheck,
    ProblemShow,
    ProblemReset,
    LoadVideo,
    PlayVideo,
    PauseVideo,
    SeekVideo,
    StopVideo,
    SpeedChangeVideo,
    ShowTranscript,
    HideTranscript,
}

impl EventType {
    /// Whether this event type reflects video activity.
    pub const fn is_video(self) -> bool {
        matches!(
            self,
            Self::LoadVideo
                | Self::PlayVideo
                | Self::PauseVideo
                | Self::SeekVideo
                | Self::StopVideo
                | Self::SpeedChangeVideo
                | Self::ShowTranscript
                | Self::HideTranscript
        )
    }

    /// Classifies a raw event type string; unknown types are not video.
    pub fn is_video_type(raw: &str) -> bool {
        raw.parse::<Self>().is_ok_and(Self::is_video)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PageClose => "page_close",
            Self::SeqGoto => "seq_goto",
            Self::SeqNext => "seq_next",
            Self::SeqPrev => "seq_prev",
            Self::ProblemCheck => "problem_check",
            Self::ProblemShow => "problem_show",
            Self::ProblemReset => "problem_reset",
            Self::LoadVideo => "load_video",
            Self::PlayVideo => "play_video",
            Self::PauseVideo => "pause_video",
            Self::SeekVideo => "seek_video",
            Self::StopVideo => "stop_video",
            Self::SpeedChangeVideo => "speed_change_video",
            Self::ShowTranscript => "show_transcript",
            Self::HideTranscript => "hide_transcript",
        };
        write!(f, "{s}")
    }
}

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "page_close" => Ok(Self::PageClose),
            "seq_goto" => Ok(Self::SeqGoto),
            "seq_next" => Ok(Self::SeqNext),
            "seq_prev" => Ok(Self::SeqPrev),
            "problem_check" | "save_problem_check" => Ok(Self::ProblemCheck),
            "problem_show" => Ok(Self::ProblemShow),
            "problem_reset" => Ok(Self::ProblemReset),
            "load_video" => Ok(Self::LoadVideo),
            "play_video" => Ok(Self::PlayVideo),
            "pause_video" => Ok(Self::PauseVideo),
            "seek_video" => Ok(Self::SeekVideo),
            "stop_video" => Ok(Self::StopVideo),
            "speed_change_video" => Ok(Self::SpeedChangeVideo),
            "show_transcript" => Ok(Self::ShowTranscript),
            "hide_transcript" => Ok(Self::HideTranscript),
            _ => Err(UnknownEventType(s.to_string())),
        }
    }
}

/// Error type for unknown event type strings.
#[derive(Debug, Clone)]
pub struct UnknownEventType(String);

impl fmt::Display for UnknownEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event type: {}", self.0)
    }
}

impl std::error::Error for UnknownEventType {}
