use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::model::ids::{MessageId, UserId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MessageError {
    #[error("message body cannot be empty")]
    EmptyBody,

    #[error("cannot send a message to yourself")]
    SelfAddressed,
}

/// Message content after trimming. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBody(String);

impl MessageBody {
    /// # Errors
    ///
    /// Returns `MessageError::EmptyBody` if nothing remains after trimming.
    pub fn parse(raw: &str) -> Result<Self, MessageError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(MessageError::EmptyBody);
        }
        Ok(Self(trimmed.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

/// A message ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender: UserId,
    pub recipient: UserId,
    pub body: MessageBody,
    pub created_at: DateTime<Utc>,
}

impl NewMessage {
    /// # Errors
    ///
    /// Returns `MessageError::SelfAddressed` when sender and recipient match.
    pub fn new(
        sender: UserId,
        recipient: UserId,
        body: MessageBody,
        created_at: DateTime<Utc>,
    ) -> Result<Self, MessageError> {
        if sender == recipient {
            return Err(MessageError::SelfAddressed);
        }
        Ok(Self {
            sender,
            recipient,
            body,
            created_at,
        })
    }
}

/// Stored direct message. Only the read flag changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: MessageId,
    pub sender: UserId,
    pub recipient: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
}

impl Message {
    #[must_use]
    pub fn from_new(id: MessageId, new: NewMessage) -> Self {
        Self {
            id,
            sender: new.sender,
            recipient: new.recipient,
            body: new.body.into_inner(),
            created_at: new.created_at,
            read: false,
            read_at: None,
        }
    }

    /// True when the message travels between `a` and `b` in either direction.
    #[must_use]
    pub fn is_between(&self, a: UserId, b: UserId) -> bool {
        (self.sender == a && self.recipient == b) || (self.sender == b && self.recipient == a)
    }

    /// The other party from `viewer`'s point of view.
    #[must_use]
    pub fn counterpart(&self, viewer: UserId) -> UserId {
        if self.sender == viewer {
            self.recipient
        } else {
            self.sender
        }
    }

    /// Flip to read if `viewer` is the recipient. Returns whether it changed.
    pub fn mark_read_by(&mut self, viewer: UserId, at: DateTime<Utc>) -> bool {
        if self.recipient != viewer || self.read {
            return false;
        }
        self.read = true;
        self.read_at = Some(at);
        true
    }
}
