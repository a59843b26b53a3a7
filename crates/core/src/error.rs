use thiserror::Error;

use crate::model::{CurriculumError, MeetingError, MessageError, ProfileError, UserError};
use crate::quiz::QuizError;

/// Any domain validation failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    User(#[from] UserError),
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error(transparent)]
    Curriculum(#[from] CurriculumError),
    #[error(transparent)]
    Meeting(#[from] MeetingError),
    #[error(transparent)]
    Message(#[from] MessageError),
    #[error(transparent)]
    Quiz(#[from] QuizError),
}
