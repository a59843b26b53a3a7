use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

use crate::model::ids::UserId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MeetingError {
    #[error("meeting link must be an absolute http(s) URL: {0}")]
    InvalidUrl(String),

    #[error("meeting link may contain at most {max} characters")]
    UrlTooLong { max: usize },

    #[error("unknown meeting tool: {0}")]
    UnknownTool(String),

    #[error("meeting time could not be parsed: {0}")]
    InvalidTime(String),
}

pub const MAX_MEETING_URL_LEN: usize = 500;

/// Video tool used for a meeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingTool {
    Zoom,
    Meet,
    Teams,
    Other,
}

impl MeetingTool {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MeetingTool::Zoom => "zoom",
            MeetingTool::Meet => "meet",
            MeetingTool::Teams => "teams",
            MeetingTool::Other => "other",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            MeetingTool::Zoom => "Zoom",
            MeetingTool::Meet => "Google Meet",
            MeetingTool::Teams => "Microsoft Teams",
            MeetingTool::Other => "Other",
        }
    }

    /// Parses an optional form value; blank means "no tool".
    ///
    /// # Errors
    ///
    /// Returns `MeetingError::UnknownTool` for unrecognised values.
    pub fn parse_optional(raw: Option<&str>) -> Result<Option<Self>, MeetingError> {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            Some(value) => value.parse().map(Some),
            None => Ok(None),
        }
    }
}

impl fmt::Display for MeetingTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for MeetingTool {
    type Err = MeetingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zoom" => Ok(MeetingTool::Zoom),
            "meet" => Ok(MeetingTool::Meet),
            "teams" => Ok(MeetingTool::Teams),
            "other" => Ok(MeetingTool::Other),
            other => Err(MeetingError::UnknownTool(other.to_owned())),
        }
    }
}

/// A validated meeting link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MeetingUrl(String);

impl MeetingUrl {
    /// # Errors
    ///
    /// Returns `MeetingError` if the link is too long or not an http(s) URL.
    pub fn parse(raw: &str) -> Result<Self, MeetingError> {
        let raw = raw.trim();
        if raw.chars().count() > MAX_MEETING_URL_LEN {
            return Err(MeetingError::UrlTooLong {
                max: MAX_MEETING_URL_LEN,
            });
        }
        let url = Url::parse(raw).map_err(|_| MeetingError::InvalidUrl(raw.to_owned()))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(MeetingError::InvalidUrl(raw.to_owned()));
        }
        Ok(Self(raw.to_owned()))
    }

    /// Blank input means "no link".
    ///
    /// # Errors
    ///
    /// Propagates `MeetingUrl::parse` failures for non-blank input.
    pub fn parse_optional(raw: Option<&str>) -> Result<Option<Self>, MeetingError> {
        raw.map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Self::parse)
            .transpose()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Next-meeting fields stored on a learner's profile.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MeetingSlot {
    pub scheduled_at: Option<DateTime<Utc>>,
    pub url: Option<MeetingUrl>,
    pub tool: Option<MeetingTool>,
    pub notes: String,
}

impl MeetingSlot {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scheduled_at.is_none() && self.url.is_none() && self.tool.is_none()
    }
}

/// A user's fallback meeting link and tool.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MeetingDefaults {
    pub url: Option<MeetingUrl>,
    pub tool: Option<MeetingTool>,
}

/// Display-ready description of a learner's upcoming meeting.
///
/// Link and tool fall back to the mentor's defaults when the slot leaves them
/// blank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextMeeting {
    scheduled_at: Option<DateTime<Utc>>,
    url: Option<MeetingUrl>,
    tool: Option<MeetingTool>,
    notes: String,
    mentor: UserId,
}

impl NextMeeting {
    /// Returns `None` when there is no mentor or nothing has been scheduled.
    #[must_use]
    pub fn resolve(
        slot: &MeetingSlot,
        mentor: Option<UserId>,
        mentor_defaults: Option<&MeetingDefaults>,
    ) -> Option<Self> {
        let mentor = mentor?;
        if slot.is_empty() {
            return None;
        }
        let url = slot
            .url
            .clone()
            .or_else(|| mentor_defaults.and_then(|d| d.url.clone()));
        let tool = slot.tool.or_else(|| mentor_defaults.and_then(|d| d.tool));
        Some(Self {
            scheduled_at: slot.scheduled_at,
            url,
            tool,
            notes: slot.notes.clone(),
            mentor,
        })
    }

    #[must_use]
    pub fn scheduled_at(&self) -> Option<DateTime<Utc>> {
        self.scheduled_at
    }

    #[must_use]
    pub fn url(&self) -> Option<&MeetingUrl> {
        self.url.as_ref()
    }

    #[must_use]
    pub fn tool(&self) -> Option<MeetingTool> {
        self.tool
    }

    #[must_use]
    pub fn notes(&self) -> &str {
        &self.notes
    }

    #[must_use]
    pub fn mentor(&self) -> UserId {
        self.mentor
    }
}
