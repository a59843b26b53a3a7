mod curriculum;
mod ids;
mod meeting;
mod message;
mod profile;
mod user;

pub use ids::{MessageId, ParseIdError, TemplateId, UserId};

pub use curriculum::{
    CurriculumError, Eligibility, MAX_TITLE_LEN, SessionCompletion, SessionTemplate,
    SessionTemplateDraft, reconcile_completions, sort_for_display,
};
pub use meeting::{
    MAX_MEETING_URL_LEN, MeetingDefaults, MeetingError, MeetingSlot, MeetingTool, MeetingUrl,
    NextMeeting,
};
pub use message::{Message, MessageBody, MessageError, NewMessage};
pub use profile::{
    Profile, ProfileError, ProfileParts, TestKind, TestRecord, TestResult, is_paired_with,
};
pub use user::{
    MAX_NAME_LEN, MAX_USERNAME_LEN, Registration, RegistrationDraft, User, UserError,
    username_candidates,
};
