use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use mentor_core::model::{Message, MessageBody, NewMessage, UserId, is_paired_with};
use storage::repository::{MessageRepository, ProfileRepository};

use crate::Clock;
use crate::error::{ForbiddenReason, ServiceError};
use crate::lookup;

/// Latest message and unread count for one correspondent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboxEntry {
    pub correspondent: UserId,
    pub latest: Message,
    pub unread: u64,
}

/// Direct messages between learners and their mentors.
#[derive(Clone)]
pub struct MessagingService {
    clock: Clock,
    profiles: Arc<dyn ProfileRepository>,
    messages: Arc<dyn MessageRepository>,
}

impl MessagingService {
    #[must_use]
    pub fn new(
        clock: Clock,
        profiles: Arc<dyn ProfileRepository>,
        messages: Arc<dyn MessageRepository>,
    ) -> Self {
        Self {
            clock,
            profiles,
            messages,
        }
    }

    /// Send to the sender's assigned mentor.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Forbidden` when no mentor is assigned and
    /// `ServiceError::Validation` for an empty body.
    #[instrument(skip(self, body))]
    pub async fn send_message_to_mentor(
        &self,
        sender: UserId,
        body: &str,
    ) -> Result<Message, ServiceError> {
        let profile = lookup::profile(self.profiles.as_ref(), sender).await?;
        let Some(mentor) = profile.assigned_mentor() else {
            warn!("no mentor to write to");
            return Err(ServiceError::Forbidden(ForbiddenReason::NoMentorAssigned));
        };
        self.deliver(sender, mentor, body).await
    }

    /// Learner path: `recipient` must be the sender's assigned mentor.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` for an unknown recipient,
    /// `ServiceError::Forbidden` if it is not the sender's mentor and
    /// `ServiceError::Validation` for an empty body.
    #[instrument(skip(self, body))]
    pub async fn send_message(
        &self,
        sender: UserId,
        recipient: UserId,
        body: &str,
    ) -> Result<Message, ServiceError> {
        let profile = lookup::profile(self.profiles.as_ref(), sender).await?;
        lookup::profile(self.profiles.as_ref(), recipient).await?;
        if !profile.is_mentored_by(recipient) {
            warn!("recipient is not the sender's mentor");
            return Err(ServiceError::Forbidden(ForbiddenReason::NotAssignedMentor));
        }
        self.deliver(sender, recipient, body).await
    }

    /// Reply inside an existing pairing, in either direction.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` for an unknown user,
    /// `ServiceError::Forbidden` if the two are not paired and
    /// `ServiceError::Validation` for an empty body.
    #[instrument(skip(self, body))]
    pub async fn send_in_thread(
        &self,
        sender: UserId,
        recipient: UserId,
        body: &str,
    ) -> Result<Message, ServiceError> {
        self.require_paired(sender, recipient).await?;
        self.deliver(sender, recipient, body).await
    }

    /// Mark everything `other` sent to `viewer` as read. Returns how many
    /// messages changed.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Storage` if the update fails.
    pub async fn mark_thread_read(
        &self,
        viewer: UserId,
        other: UserId,
    ) -> Result<u64, ServiceError> {
        let changed = self
            .messages
            .mark_thread_read(viewer, other, self.clock.now())
            .await?;
        Ok(changed)
    }

    /// Both directions, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Storage` if the query fails.
    pub async fn list_thread(&self, a: UserId, b: UserId) -> Result<Vec<Message>, ServiceError> {
        Ok(self.messages.thread(a, b).await?)
    }

    /// View a conversation: requires pairing, marks incoming messages read and
    /// returns the thread.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Forbidden` if the two are not paired.
    pub async fn open_thread(
        &self,
        viewer: UserId,
        other: UserId,
    ) -> Result<Vec<Message>, ServiceError> {
        self.require_paired(viewer, other).await?;
        self.mark_thread_read(viewer, other).await?;
        self.list_thread(viewer, other).await
    }

    /// One entry per correspondent, most recent conversation first.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Storage` if the query fails.
    pub async fn inbox(&self, viewer: UserId) -> Result<Vec<InboxEntry>, ServiceError> {
        let messages = self.messages.messages_for(viewer).await?;
        let mut entries: Vec<InboxEntry> = Vec::new();
        for message in messages {
            let correspondent = message.counterpart(viewer);
            let unread = u64::from(message.recipient == viewer && !message.read);
            match entries.iter_mut().find(|e| e.correspondent == correspondent) {
                Some(entry) => entry.unread += unread,
                None => entries.push(InboxEntry {
                    correspondent,
                    latest: message,
                    unread,
                }),
            }
        }
        Ok(entries)
    }

    /// # Errors
    ///
    /// Returns `ServiceError::Storage` if the count fails.
    pub async fn unread_count(&self, viewer: UserId) -> Result<u64, ServiceError> {
        Ok(self.messages.unread_count(viewer).await?)
    }

    async fn require_paired(&self, a: UserId, b: UserId) -> Result<(), ServiceError> {
        let first = lookup::profile(self.profiles.as_ref(), a).await?;
        let second = lookup::profile(self.profiles.as_ref(), b).await?;
        if is_paired_with(&first, &second) {
            Ok(())
        } else {
            warn!(%a, %b, "users are not paired");
            Err(ServiceError::Forbidden(ForbiddenReason::NotPaired))
        }
    }

    async fn deliver(
        &self,
        sender: UserId,
        recipient: UserId,
        body: &str,
    ) -> Result<Message, ServiceError> {
        let body = MessageBody::parse(body)?;
        let message = NewMessage::new(sender, recipient, body, self.clock.now())?;
        let stored = self.messages.insert_message(message).await?;
        info!(message_id = %stored.id, %recipient, "message sent");
        Ok(stored)
    }
}
