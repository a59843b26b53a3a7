//! Switches for behaviors that are deliberately lenient by default.

use serde::Deserialize;

/// How re-completing an already completed session treats its timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStampPolicy {
    /// Keep the first completion time.
    #[default]
    PreserveFirst,
    /// Stamp the current time on every completion.
    Restamp,
}

/// What `unassign` does when the mentor is not assigned to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnassignPolicy {
    /// Leave the target untouched and report success.
    #[default]
    SilentNoop,
    /// Deny the request.
    Reject,
}

/// How an unparseable meeting time is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingTimePolicy {
    /// Store no time and keep the rest of the update.
    #[default]
    NullOnInvalid,
    /// Fail the update with a validation error.
    Reject,
}

/// Bundle of the policies above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct Policies {
    pub completion_stamp: CompletionStampPolicy,
    pub unassign: UnassignPolicy,
    pub meeting_time: MeetingTimePolicy,
}
