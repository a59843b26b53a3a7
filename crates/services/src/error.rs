//! Shared error types for the services crate.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use mentor_core::model::{
    CurriculumError, MeetingError, MessageError, ProfileError, TemplateId, UserError, UserId,
};
use mentor_core::quiz::QuizError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Why an operation was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ForbiddenReason {
    /// The actor lacks the mentor role.
    NotAMentor,
    /// The actor is a mentor, but not the target's assigned mentor.
    NotAssignedMentor,
    /// The learner has no mentor to address.
    NoMentorAssigned,
    /// Neither side is the other's assigned mentor.
    NotPaired,
    /// The curriculum is not finished yet.
    NotEligible,
}

impl fmt::Display for ForbiddenReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NotAMentor => "only mentors may do this",
            Self::NotAssignedMentor => "not the assigned mentor",
            Self::NoMentorAssigned => "no mentor assigned",
            Self::NotPaired => "users are not paired",
            Self::NotEligible => "all sessions must be completed first",
        };
        f.write_str(text)
    }
}

/// Record kinds reported by `ServiceError::NotFound`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Entity {
    User(UserId),
    Profile(UserId),
    Template(TemplateId),
    Email(String),
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user {id}"),
            Self::Profile(id) => write!(f, "profile of user {id}"),
            Self::Template(id) => write!(f, "session template {id}"),
            Self::Email(email) => write!(f, "account for {email}"),
        }
    }
}

/// Errors emitted by the mentorship services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServiceError {
    #[error("forbidden: {0}")]
    Forbidden(ForbiddenReason),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(Entity),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

macro_rules! validation_from {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl From<$ty> for ServiceError {
                fn from(err: $ty) -> Self {
                    Self::Validation(err.to_string())
                }
            }
        )+
    };
}

validation_from!(
    mentor_core::Error,
    UserError,
    ProfileError,
    CurriculumError,
    MeetingError,
    MessageError,
    QuizError,
);

/// Errors emitted while loading `AppConfig` or the question banks it names.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("question bank {path}: {source}")]
    QuestionBank {
        path: PathBuf,
        #[source]
        source: QuizError,
    },
    #[error(transparent)]
    BuiltinBank(#[from] QuizError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_become_validation() {
        let err: ServiceError = MessageError::EmptyBody.into();
        assert!(matches!(err, ServiceError::Validation(_)));
        let err: ServiceError = ProfileError::SelfAssignment.into();
        assert_eq!(
            err.to_string(),
            "invalid input: a mentor cannot be assigned to themselves"
        );
    }

    #[test]
    fn not_found_names_the_record() {
        let err = ServiceError::NotFound(Entity::Template(TemplateId::new(4)));
        assert_eq!(err.to_string(), "session template 4 not found");
    }
}
