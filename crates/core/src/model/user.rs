use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::UserId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum UserError {
    #[error("email is required")]
    MissingEmail,

    #[error("email address is not valid: {0}")]
    InvalidEmail(String),

    #[error("username may contain at most {max} characters")]
    UsernameTooLong { max: usize },

    #[error("username contains characters other than letters, digits and @.+-_")]
    InvalidUsername,

    #[error("name fields may contain at most {max} characters")]
    NameTooLong { max: usize },
}

pub const MAX_USERNAME_LEN: usize = 150;
pub const MAX_NAME_LEN: usize = 30;

//
// ─── DRAFT ─────────────────────────────────────────────────────────────────────
//

/// Registration input before validation.
#[derive(Debug, Clone, Default)]
pub struct RegistrationDraft {
    pub email: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_mentor: bool,
}

/// A validated registration, ready for uniqueness checks in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    email: String,
    username: Option<String>,
    first_name: String,
    last_name: String,
    is_mentor: bool,
}

impl RegistrationDraft {
    /// Normalize and validate the draft.
    ///
    /// # Errors
    ///
    /// Returns `UserError` when the email is missing or malformed, or when the
    /// username or names break their length/charset rules.
    pub fn validate(self) -> Result<Registration, UserError> {
        let email = self.email.trim().to_owned();
        if email.is_empty() {
            return Err(UserError::MissingEmail);
        }
        validate_email(&email)?;

        let username = self
            .username
            .map(|u| u.trim().to_owned())
            .filter(|u| !u.is_empty());
        if let Some(username) = username.as_deref() {
            validate_username(username)?;
        }

        let first_name = normalize_name(self.first_name)?;
        let last_name = normalize_name(self.last_name)?;

        Ok(Registration {
            email,
            username,
            first_name,
            last_name,
            is_mentor: self.is_mentor,
        })
    }
}

impl Registration {
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Explicit username, if the registrant chose one.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    #[must_use]
    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    #[must_use]
    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    #[must_use]
    pub fn is_mentor(&self) -> bool {
        self.is_mentor
    }

    /// Base for a generated username: the local part of the email.
    #[must_use]
    pub fn username_base(&self) -> &str {
        self.email.split('@').next().unwrap_or(&self.email)
    }
}

/// Yields `base`, `base1`, `base2`, ... for username generation.
pub fn username_candidates(base: &str) -> impl Iterator<Item = String> + '_ {
    std::iter::once(base.to_owned()).chain((1_u32..).map(move |i| format!("{base}{i}")))
}

fn validate_email(email: &str) -> Result<(), UserError> {
    let mut parts = email.splitn(2, '@');
    let local = parts.next().unwrap_or_default();
    let domain = parts.next().unwrap_or_default();
    let ok = !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace);
    if ok {
        Ok(())
    } else {
        Err(UserError::InvalidEmail(email.to_owned()))
    }
}

fn validate_username(username: &str) -> Result<(), UserError> {
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(UserError::UsernameTooLong {
            max: MAX_USERNAME_LEN,
        });
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
    {
        return Err(UserError::InvalidUsername);
    }
    Ok(())
}

fn normalize_name(name: Option<String>) -> Result<String, UserError> {
    let name = name.map(|n| n.trim().to_owned()).unwrap_or_default();
    if name.chars().count() > MAX_NAME_LEN {
        return Err(UserError::NameTooLong { max: MAX_NAME_LEN });
    }
    Ok(name)
}

//
// ─── USER ──────────────────────────────────────────────────────────────────────
//

/// A registered identity. Credentials live with the auth provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    id: UserId,
    username: String,
    email: String,
    first_name: String,
    last_name: String,
    created_at: DateTime<Utc>,
}

impl User {
    #[must_use]
    pub fn from_persisted(
        id: UserId,
        username: String,
        email: String,
        first_name: String,
        last_name: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            username,
            email,
            first_name,
            last_name,
            created_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> UserId {
        self.id
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    #[must_use]
    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// First name when set, otherwise the email.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.first_name.is_empty() {
            &self.email
        } else {
            &self.first_name
        }
    }
}
