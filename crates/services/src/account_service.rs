use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use mentor_core::model::{
    Eligibility, MAX_USERNAME_LEN, MeetingDefaults, MeetingTool, MeetingUrl, NextMeeting, Profile,
    Registration, RegistrationDraft, TestRecord, User, UserId, username_candidates,
};
use storage::repository::{
    CurriculumRepository, MessageRepository, ProfileRepository, StorageError, UserRepository,
};

use crate::Clock;
use crate::error::{Entity, ServiceError};
use crate::lookup;

/// Room left for the numeric suffix of a generated username.
const SUFFIX_RESERVE: usize = 6;

/// Everything a learner's home screen shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    pub user_id: UserId,
    pub username: String,
    pub display_name: String,
    pub is_mentor: bool,
    pub assigned_mentor: Option<UserId>,
    pub intro_test: TestRecord,
    pub end_test: TestRecord,
    pub eligibility: Eligibility,
    pub eligible_for_end_test: bool,
    pub next_meeting: Option<NextMeeting>,
    pub unread_messages: u64,
}

/// Registration, login lookup and per-user settings.
#[derive(Clone)]
pub struct AccountService {
    clock: Clock,
    users: Arc<dyn UserRepository>,
    profiles: Arc<dyn ProfileRepository>,
    curriculum: Arc<dyn CurriculumRepository>,
    messages: Arc<dyn MessageRepository>,
}

impl AccountService {
    #[must_use]
    pub fn new(
        clock: Clock,
        users: Arc<dyn UserRepository>,
        profiles: Arc<dyn ProfileRepository>,
        curriculum: Arc<dyn CurriculumRepository>,
        messages: Arc<dyn MessageRepository>,
    ) -> Self {
        Self {
            clock,
            users,
            profiles,
            curriculum,
            messages,
        }
    }

    /// Create a user and its profile.
    ///
    /// Without an explicit username one is derived from the email, with a
    /// numeric suffix when taken.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for malformed input or when the
    /// email or chosen username is already registered.
    #[instrument(skip(self, draft), fields(email = %draft.email.trim()))]
    pub async fn register(&self, draft: RegistrationDraft) -> Result<User, ServiceError> {
        let registration = draft.validate()?;

        if self
            .users
            .find_by_email(registration.email())
            .await?
            .is_some()
        {
            warn!("email already registered");
            return Err(ServiceError::Validation(
                "a user with that email already exists".into(),
            ));
        }

        let username = match registration.username() {
            Some(chosen) => {
                if self.users.username_taken(chosen).await? {
                    return Err(ServiceError::Validation(format!(
                        "username {chosen} is already taken"
                    )));
                }
                chosen.to_owned()
            }
            None => self.free_username(&registration).await?,
        };

        let user = self
            .users
            .create_user(&registration, &username, self.clock.now())
            .await
            .map_err(|err| match err {
                // lost a race with a concurrent registration
                StorageError::Conflict(what) => {
                    ServiceError::Validation(format!("{what} is already registered"))
                }
                other => other.into(),
            })?;

        info!(
            user_id = %user.id(),
            username = user.username(),
            mentor = registration.is_mentor(),
            "user registered"
        );
        Ok(user)
    }

    async fn free_username(&self, registration: &Registration) -> Result<String, ServiceError> {
        let base = username_base(registration.username_base());
        for candidate in username_candidates(&base) {
            if !self.users.username_taken(&candidate).await? {
                return Ok(candidate);
            }
        }
        // `username_candidates` never ends
        Err(ServiceError::Validation("no free username".into()))
    }

    /// Resolve the account behind a login email. Password checks happen
    /// elsewhere.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` when no user has that email.
    pub async fn resolve_login(&self, email: &str) -> Result<User, ServiceError> {
        let email = email.trim();
        self.users
            .find_by_email(email)
            .await?
            .ok_or_else(|| ServiceError::NotFound(Entity::Email(email.to_owned())))
    }

    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` when the user is missing.
    pub async fn user(&self, id: UserId) -> Result<User, ServiceError> {
        lookup::user(self.users.as_ref(), id).await
    }

    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` when the profile is missing.
    pub async fn profile(&self, user: UserId) -> Result<Profile, ServiceError> {
        lookup::profile(self.profiles.as_ref(), user).await
    }

    /// Store the user's own fallback meeting link and tool.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for a malformed link or unknown tool
    /// and `ServiceError::NotFound` when the profile is missing.
    #[instrument(skip(self))]
    pub async fn set_meeting_defaults(
        &self,
        user: UserId,
        url: Option<&str>,
        tool: Option<&str>,
    ) -> Result<Profile, ServiceError> {
        let defaults = MeetingDefaults {
            url: MeetingUrl::parse_optional(url)?,
            tool: MeetingTool::parse_optional(tool)?,
        };
        lookup::profile(self.profiles.as_ref(), user).await?;
        self.profiles
            .set_meeting_defaults(user, &defaults, self.clock.now())
            .await?;
        info!("meeting defaults updated");
        lookup::profile(self.profiles.as_ref(), user).await
    }

    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` when the user or profile is missing.
    pub async fn dashboard(&self, user: UserId) -> Result<Dashboard, ServiceError> {
        let account = lookup::user(self.users.as_ref(), user).await?;
        let profile = lookup::profile(self.profiles.as_ref(), user).await?;
        let eligibility = lookup::eligibility(self.curriculum.as_ref(), user).await?;

        let mentor_defaults = match profile.assigned_mentor() {
            Some(mentor) => self
                .profiles
                .get_profile(mentor)
                .await?
                .map(|p| p.default_meeting().clone()),
            None => None,
        };
        let next_meeting = NextMeeting::resolve(
            profile.next_meeting(),
            profile.assigned_mentor(),
            mentor_defaults.as_ref(),
        );

        Ok(Dashboard {
            user_id: user,
            username: account.username().to_owned(),
            display_name: account.display_name().to_owned(),
            is_mentor: profile.is_mentor(),
            assigned_mentor: profile.assigned_mentor(),
            intro_test: *profile.intro_test(),
            end_test: *profile.end_test(),
            eligibility,
            eligible_for_end_test: eligibility.eligible_for_end_test(),
            next_meeting,
            unread_messages: self.messages.unread_count(user).await?,
        })
    }
}

/// Keep only characters a username may hold and leave room for a suffix.
fn username_base(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '+' | '-' | '_'))
        .take(MAX_USERNAME_LEN - SUFFIX_RESERVE)
        .collect();
    if cleaned.is_empty() {
        "user".to_owned()
    } else {
        cleaned
    }
}
