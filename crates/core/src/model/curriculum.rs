use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use thiserror::Error;

use crate::model::ids::{TemplateId, UserId};
use crate::policy::CompletionStampPolicy;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CurriculumError {
    #[error("session title cannot be empty")]
    EmptyTitle,

    #[error("session title may contain at most {max} characters")]
    TitleTooLong { max: usize },

    #[error("completion belongs to template {found}, expected {expected}")]
    TemplateMismatch {
        expected: TemplateId,
        found: TemplateId,
    },
}

pub const MAX_TITLE_LEN: usize = 200;

//
// ─── TEMPLATE ──────────────────────────────────────────────────────────────────
//

/// Input for a new or edited session template.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionTemplateDraft {
    pub title: String,
    #[serde(default)]
    pub content_markdown: String,
    #[serde(default)]
    pub mentor_content_markdown: String,
    #[serde(default)]
    pub order: u32,
}

/// Shared curriculum unit. Content is markdown and is never rendered here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTemplate {
    id: TemplateId,
    title: String,
    content_markdown: String,
    mentor_content_markdown: String,
    order: u32,
    created_at: DateTime<Utc>,
}

impl SessionTemplateDraft {
    /// # Errors
    ///
    /// Returns `CurriculumError` if the title is blank or too long.
    pub fn validate(
        self,
        id: TemplateId,
        created_at: DateTime<Utc>,
    ) -> Result<SessionTemplate, CurriculumError> {
        SessionTemplate::new(
            id,
            self.title,
            self.content_markdown,
            self.mentor_content_markdown,
            self.order,
            created_at,
        )
    }
}

impl SessionTemplate {
    /// # Errors
    ///
    /// Returns `CurriculumError` if the title is blank or too long.
    pub fn new(
        id: TemplateId,
        title: impl Into<String>,
        content_markdown: impl Into<String>,
        mentor_content_markdown: impl Into<String>,
        order: u32,
        created_at: DateTime<Utc>,
    ) -> Result<Self, CurriculumError> {
        let title = title.into().trim().to_owned();
        if title.is_empty() {
            return Err(CurriculumError::EmptyTitle);
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(CurriculumError::TitleTooLong { max: MAX_TITLE_LEN });
        }
        Ok(Self {
            id,
            title,
            content_markdown: content_markdown.into(),
            mentor_content_markdown: mentor_content_markdown.into(),
            order,
            created_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> TemplateId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn content_markdown(&self) -> &str {
        &self.content_markdown
    }

    /// Mentor-only guidance. Callers must check the viewer's role.
    #[must_use]
    pub fn mentor_content_markdown(&self) -> &str {
        &self.mentor_content_markdown
    }

    #[must_use]
    pub fn order(&self) -> u32 {
        self.order
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Display ordering: `order` ascending, newest first within the same slot.
    #[must_use]
    pub fn display_cmp(&self, other: &Self) -> Ordering {
        self.order
            .cmp(&other.order)
            .then_with(|| other.created_at.cmp(&self.created_at))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Sort templates into curriculum display order.
pub fn sort_for_display(templates: &mut [SessionTemplate]) {
    templates.sort_by(SessionTemplate::display_cmp);
}

//
// ─── COMPLETION ────────────────────────────────────────────────────────────────
//

/// A user's completion record for one template. Unique per (user, template).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionCompletion {
    pub user_id: UserId,
    pub template_id: TemplateId,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: String,
}

impl SessionCompletion {
    /// Blank record, as created lazily on first toggle.
    #[must_use]
    pub fn pending(user_id: UserId, template_id: TemplateId) -> Self {
        Self {
            user_id,
            template_id,
            completed: false,
            completed_at: None,
            notes: String::new(),
        }
    }

    /// Set the completion flag at `now`.
    ///
    /// Undo always clears the timestamp. Completing keeps an existing
    /// timestamp under `PreserveFirst` and restamps under `Restamp`.
    pub fn set_completed(&mut self, completed: bool, now: DateTime<Utc>, policy: CompletionStampPolicy) {
        if completed {
            self.completed_at = match (policy, self.completed_at) {
                (CompletionStampPolicy::PreserveFirst, Some(existing)) if self.completed => {
                    Some(existing)
                }
                _ => Some(now),
            };
            self.completed = true;
        } else {
            self.completed = false;
            self.completed_at = None;
        }
    }

    /// Clear state while keeping the row.
    pub fn reset(&mut self) {
        self.completed = false;
        self.completed_at = None;
    }
}

/// Reconcile a user's completions to exactly the `completed` set.
///
/// Returns one record per template, in template order. Existing rows are
/// reused; newly completed ones keep any earlier timestamp.
#[must_use]
pub fn reconcile_completions(
    user_id: UserId,
    templates: &[SessionTemplate],
    existing: &[SessionCompletion],
    completed: &HashSet<TemplateId>,
    now: DateTime<Utc>,
) -> Vec<SessionCompletion> {
    templates
        .iter()
        .map(|template| {
            let mut record = existing
                .iter()
                .find(|c| c.template_id == template.id())
                .cloned()
                .unwrap_or_else(|| SessionCompletion::pending(user_id, template.id()));
            if completed.contains(&template.id()) {
                record.completed = true;
                record.completed_at = record.completed_at.or(Some(now));
            } else {
                record.reset();
            }
            record
        })
        .collect()
}

//
// ─── ELIGIBILITY ───────────────────────────────────────────────────────────────
//

/// Progress through the curriculum and the exit-test gate derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Eligibility {
    pub total_templates: u64,
    pub completed: u64,
}

impl Eligibility {
    #[must_use]
    pub fn new(total_templates: u64, completed: u64) -> Self {
        Self {
            total_templates,
            completed,
        }
    }

    /// An empty curriculum never unlocks the exit test.
    #[must_use]
    pub fn eligible_for_end_test(&self) -> bool {
        self.total_templates > 0 && self.completed >= self.total_templates
    }

    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.total_templates.saturating_sub(self.completed)
    }
}
