use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mentor_core::model::{
    MeetingDefaults, MeetingSlot, Message, MessageId, NewMessage, Profile,
    Registration, SessionCompletion, SessionTemplate, SessionTemplateDraft, TemplateId, TestKind,
    TestResult, User, UserId, sort_for_display,
};
use mentor_core::policy::CompletionStampPolicy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

/// Identity records. Every user is created together with its profile.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user and its empty profile atomically.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the username or email
    /// (case-insensitive) is already taken.
    async fn create_user(
        &self,
        registration: &Registration,
        username: &str,
        created_at: DateTime<Utc>,
    ) -> Result<User, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_user(&self, id: UserId) -> Result<Option<User>, StorageError>;

    /// Case-insensitive email lookup.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn username_taken(&self, username: &str) -> Result<bool, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_users(&self) -> Result<Vec<User>, StorageError>;
}

/// Profile rows. Writes touch only the named columns so concurrent updates of
/// unrelated fields do not overwrite each other.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_profile(&self, user: UserId) -> Result<Option<Profile>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_profiles(&self) -> Result<Vec<Profile>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the profile does not exist.
    async fn set_assigned_mentor(
        &self,
        user: UserId,
        mentor: Option<UserId>,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Clear the mentor link only if it still points at `mentor`.
    ///
    /// Returns whether a row changed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn clear_assigned_mentor_if(
        &self,
        user: UserId,
        mentor: UserId,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the profile does not exist.
    async fn record_test(
        &self,
        user: UserId,
        kind: TestKind,
        result: &TestResult,
    ) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the profile does not exist.
    async fn set_next_meeting(
        &self,
        user: UserId,
        slot: &MeetingSlot,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the profile does not exist.
    async fn set_meeting_defaults(
        &self,
        user: UserId,
        defaults: &MeetingDefaults,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Clear test results, next meeting and every completion flag of `user`
    /// in one unit. Completion rows are kept.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the profile does not exist.
    async fn reset_progress(&self, user: UserId, at: DateTime<Utc>) -> Result<(), StorageError>;
}

/// Session templates and per-user completions.
#[async_trait]
pub trait CurriculumRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the template cannot be stored or fails
    /// validation.
    async fn insert_template(
        &self,
        draft: SessionTemplateDraft,
        created_at: DateTime<Utc>,
    ) -> Result<SessionTemplate, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_template(&self, id: TemplateId) -> Result<Option<SessionTemplate>, StorageError>;

    /// Templates in display order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_templates(&self) -> Result<Vec<SessionTemplate>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn count_templates(&self) -> Result<u64, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_completion(
        &self,
        user: UserId,
        template: TemplateId,
    ) -> Result<Option<SessionCompletion>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn completions_for_user(
        &self,
        user: UserId,
    ) -> Result<Vec<SessionCompletion>, StorageError>;

    /// Completed records of `user` that still point at an existing template.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn count_completed(&self, user: UserId) -> Result<u64, StorageError>;

    /// Create-or-update the (user, template) record and set its flag in one
    /// atomic step. Never creates a second row for the pair.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn set_completion(
        &self,
        user: UserId,
        template: TemplateId,
        completed: bool,
        now: DateTime<Utc>,
        policy: CompletionStampPolicy,
    ) -> Result<SessionCompletion, StorageError>;

    /// Upsert a batch of records in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures; nothing is written then.
    async fn save_completions(&self, records: &[SessionCompletion]) -> Result<(), StorageError>;
}

/// Direct messages.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn insert_message(&self, message: NewMessage) -> Result<Message, StorageError>;

    /// Both directions between `a` and `b`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn thread(&self, a: UserId, b: UserId) -> Result<Vec<Message>, StorageError>;

    /// Mark every unread message from `other` to `viewer` as read in a single
    /// update. Returns the number of messages changed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn mark_thread_read(
        &self,
        viewer: UserId,
        other: UserId,
        at: DateTime<Utc>,
    ) -> Result<u64, StorageError>;

    /// Every message sent or received by `user`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn messages_for(&self, user: UserId) -> Result<Vec<Message>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn unread_count(&self, user: UserId) -> Result<u64, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct State {
    users: HashMap<UserId, User>,
    profiles: HashMap<UserId, Profile>,
    templates: HashMap<TemplateId, SessionTemplate>,
    completions: HashMap<(UserId, TemplateId), SessionCompletion>,
    messages: Vec<Message>,
    next_user_id: u64,
    next_template_id: u64,
    next_message_id: u64,
}

impl State {
    fn profile_mut(&mut self, user: UserId) -> Result<&mut Profile, StorageError> {
        self.profiles.get_mut(&user).ok_or(StorageError::NotFound)
    }
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// One lock guards every table, so multi-table operations are atomic.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<State>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl UserRepository for InMemoryRepository {
    async fn create_user(
        &self,
        registration: &Registration,
        username: &str,
        created_at: DateTime<Utc>,
    ) -> Result<User, StorageError> {
        let mut guard = self.lock()?;
        if guard.users.values().any(|u| u.username() == username) {
            return Err(StorageError::Conflict(format!("username {username}")));
        }
        let email = registration.email();
        if guard
            .users
            .values()
            .any(|u| u.email().eq_ignore_ascii_case(email))
        {
            return Err(StorageError::Conflict(format!("email {email}")));
        }

        guard.next_user_id += 1;
        let id = UserId::new(guard.next_user_id);
        let user = User::from_persisted(
            id,
            username.to_owned(),
            email.to_owned(),
            registration.first_name().to_owned(),
            registration.last_name().to_owned(),
            created_at,
        );
        guard.users.insert(id, user.clone());
        guard
            .profiles
            .insert(id, Profile::new(id, registration.is_mentor(), created_at));
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StorageError> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        let email = email.trim();
        Ok(self
            .lock()?
            .users
            .values()
            .find(|u| u.email().eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn username_taken(&self, username: &str) -> Result<bool, StorageError> {
        Ok(self
            .lock()?
            .users
            .values()
            .any(|u| u.username() == username))
    }

    async fn list_users(&self) -> Result<Vec<User>, StorageError> {
        let mut users: Vec<User> = self.lock()?.users.values().cloned().collect();
        users.sort_by_key(User::id);
        Ok(users)
    }
}

#[async_trait]
impl ProfileRepository for InMemoryRepository {
    async fn get_profile(&self, user: UserId) -> Result<Option<Profile>, StorageError> {
        Ok(self.lock()?.profiles.get(&user).cloned())
    }

    async fn list_profiles(&self) -> Result<Vec<Profile>, StorageError> {
        let mut profiles: Vec<Profile> = self.lock()?.profiles.values().cloned().collect();
        profiles.sort_by_key(Profile::user_id);
        Ok(profiles)
    }

    async fn set_assigned_mentor(
        &self,
        user: UserId,
        mentor: Option<UserId>,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.profile_mut(user)?.set_assigned_mentor(mentor, at);
        Ok(())
    }

    async fn clear_assigned_mentor_if(
        &self,
        user: UserId,
        mentor: UserId,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let mut guard = self.lock()?;
        let profile = guard.profile_mut(user)?;
        if !profile.is_mentored_by(mentor) {
            return Ok(false);
        }
        profile.clear_mentor(at);
        Ok(true)
    }

    async fn record_test(
        &self,
        user: UserId,
        kind: TestKind,
        result: &TestResult,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard
            .profile_mut(user)?
            .record_test(kind, result)
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }

    async fn set_next_meeting(
        &self,
        user: UserId,
        slot: &MeetingSlot,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.profile_mut(user)?.set_next_meeting(slot.clone(), at);
        Ok(())
    }

    async fn set_meeting_defaults(
        &self,
        user: UserId,
        defaults: &MeetingDefaults,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard
            .profile_mut(user)?
            .set_default_meeting(defaults.clone(), at);
        Ok(())
    }

    async fn reset_progress(&self, user: UserId, at: DateTime<Utc>) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.profile_mut(user)?.reset_progress(at);
        guard
            .completions
            .values_mut()
            .filter(|c| c.user_id == user)
            .for_each(SessionCompletion::reset);
        Ok(())
    }
}

#[async_trait]
impl CurriculumRepository for InMemoryRepository {
    async fn insert_template(
        &self,
        draft: SessionTemplateDraft,
        created_at: DateTime<Utc>,
    ) -> Result<SessionTemplate, StorageError> {
        let mut guard = self.lock()?;
        let id = TemplateId::new(guard.next_template_id + 1);
        let template = draft
            .validate(id, created_at)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        guard.next_template_id += 1;
        guard.templates.insert(id, template.clone());
        Ok(template)
    }

    async fn get_template(&self, id: TemplateId) -> Result<Option<SessionTemplate>, StorageError> {
        Ok(self.lock()?.templates.get(&id).cloned())
    }

    async fn list_templates(&self) -> Result<Vec<SessionTemplate>, StorageError> {
        let mut templates: Vec<SessionTemplate> =
            self.lock()?.templates.values().cloned().collect();
        sort_for_display(&mut templates);
        Ok(templates)
    }

    async fn count_templates(&self) -> Result<u64, StorageError> {
        Ok(self.lock()?.templates.len() as u64)
    }

    async fn get_completion(
        &self,
        user: UserId,
        template: TemplateId,
    ) -> Result<Option<SessionCompletion>, StorageError> {
        Ok(self.lock()?.completions.get(&(user, template)).cloned())
    }

    async fn completions_for_user(
        &self,
        user: UserId,
    ) -> Result<Vec<SessionCompletion>, StorageError> {
        let mut out: Vec<SessionCompletion> = self
            .lock()?
            .completions
            .values()
            .filter(|c| c.user_id == user)
            .cloned()
            .collect();
        out.sort_by_key(|c| c.template_id);
        Ok(out)
    }

    async fn count_completed(&self, user: UserId) -> Result<u64, StorageError> {
        let guard = self.lock()?;
        let count = guard
            .completions
            .values()
            .filter(|c| {
                c.user_id == user && c.completed && guard.templates.contains_key(&c.template_id)
            })
            .count();
        Ok(count as u64)
    }

    async fn set_completion(
        &self,
        user: UserId,
        template: TemplateId,
        completed: bool,
        now: DateTime<Utc>,
        policy: CompletionStampPolicy,
    ) -> Result<SessionCompletion, StorageError> {
        let mut guard = self.lock()?;
        let record = guard
            .completions
            .entry((user, template))
            .or_insert_with(|| SessionCompletion::pending(user, template));
        record.set_completed(completed, now, policy);
        Ok(record.clone())
    }

    async fn save_completions(&self, records: &[SessionCompletion]) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        for record in records {
            guard
                .completions
                .insert((record.user_id, record.template_id), record.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl MessageRepository for InMemoryRepository {
    async fn insert_message(&self, message: NewMessage) -> Result<Message, StorageError> {
        let mut guard = self.lock()?;
        guard.next_message_id += 1;
        let stored = Message::from_new(MessageId::new(guard.next_message_id), message);
        guard.messages.push(stored.clone());
        Ok(stored)
    }

    async fn thread(&self, a: UserId, b: UserId) -> Result<Vec<Message>, StorageError> {
        let mut out: Vec<Message> = self
            .lock()?
            .messages
            .iter()
            .filter(|m| m.is_between(a, b))
            .cloned()
            .collect();
        out.sort_by_key(|m| (m.created_at, m.id));
        Ok(out)
    }

    async fn mark_thread_read(
        &self,
        viewer: UserId,
        other: UserId,
        at: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let mut guard = self.lock()?;
        let changed = guard
            .messages
            .iter_mut()
            .filter(|m| m.sender == other)
            .map(|m| m.mark_read_by(viewer, at))
            .filter(|changed| *changed)
            .count();
        Ok(changed as u64)
    }

    async fn messages_for(&self, user: UserId) -> Result<Vec<Message>, StorageError> {
        let mut out: Vec<Message> = self
            .lock()?
            .messages
            .iter()
            .filter(|m| m.sender == user || m.recipient == user)
            .cloned()
            .collect();
        out.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(out)
    }

    async fn unread_count(&self, user: UserId) -> Result<u64, StorageError> {
        let count = self
            .lock()?
            .messages
            .iter()
            .filter(|m| m.recipient == user && !m.read)
            .count();
        Ok(count as u64)
    }
}

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub users: Arc<dyn UserRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub curriculum: Arc<dyn CurriculumRepository>,
    pub messages: Arc<dyn MessageRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repo(InMemoryRepository::new())
    }

    /// Wire every repository to the same backend instance.
    pub fn from_repo<R>(repo: R) -> Self
    where
        R: UserRepository
            + ProfileRepository
            + CurriculumRepository
            + MessageRepository
            + Clone
            + 'static,
    {
        let users: Arc<dyn UserRepository> = Arc::new(repo.clone());
        let profiles: Arc<dyn ProfileRepository> = Arc::new(repo.clone());
        let curriculum: Arc<dyn CurriculumRepository> = Arc::new(repo.clone());
        let messages: Arc<dyn MessageRepository> = Arc::new(repo);
        Self {
            users,
            profiles,
            curriculum,
            messages,
        }
    }
}
