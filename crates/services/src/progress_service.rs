use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use mentor_core::model::{
    Eligibility, SessionCompletion, SessionTemplate, SessionTemplateDraft, TemplateId, UserId,
};
use mentor_core::policy::CompletionStampPolicy;
use storage::repository::{CurriculumRepository, ProfileRepository};

use crate::Clock;
use crate::error::ServiceError;
use crate::lookup;

/// A template as shown to one viewer.
///
/// `mentor_content_markdown` is only filled in for mentors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionDetail {
    pub template_id: TemplateId,
    pub title: String,
    pub order: u32,
    pub content_markdown: String,
    pub mentor_content_markdown: Option<String>,
    pub completion: Option<SessionCompletion>,
}

/// A row of the curriculum list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionListItem {
    pub template_id: TemplateId,
    pub title: String,
    pub order: u32,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Learner-side curriculum progress.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    completion_stamp: CompletionStampPolicy,
    profiles: Arc<dyn ProfileRepository>,
    curriculum: Arc<dyn CurriculumRepository>,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        completion_stamp: CompletionStampPolicy,
        profiles: Arc<dyn ProfileRepository>,
        curriculum: Arc<dyn CurriculumRepository>,
    ) -> Self {
        Self {
            clock,
            completion_stamp,
            profiles,
            curriculum,
        }
    }

    /// Add a template to the shared curriculum.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for an empty or overlong title and
    /// `ServiceError::Storage` if persistence fails.
    #[instrument(skip(self, draft), fields(title = %draft.title))]
    pub async fn add_template(
        &self,
        draft: SessionTemplateDraft,
    ) -> Result<SessionTemplate, ServiceError> {
        let now = self.clock.now();
        // validate up front so the caller sees a domain error, not a storage one
        draft.clone().validate(TemplateId::new(0), now)?;
        let template = self.curriculum.insert_template(draft, now).await?;
        info!(template_id = %template.id(), "template added");
        Ok(template)
    }

    /// # Errors
    ///
    /// Returns `ServiceError::Storage` if the count fails.
    pub async fn template_count(&self) -> Result<u64, ServiceError> {
        Ok(self.curriculum.count_templates().await?)
    }

    /// Mark one of the actor's own sessions done or not done.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the template or the actor's profile
    /// does not exist.
    #[instrument(skip(self))]
    pub async fn toggle_completion(
        &self,
        actor: UserId,
        template: TemplateId,
        completed: bool,
    ) -> Result<SessionCompletion, ServiceError> {
        lookup::profile(self.profiles.as_ref(), actor).await?;
        lookup::template(self.curriculum.as_ref(), template).await?;

        let record = self
            .curriculum
            .set_completion(
                actor,
                template,
                completed,
                self.clock.now(),
                self.completion_stamp,
            )
            .await?;
        info!(completed, "completion toggled");
        Ok(record)
    }

    /// # Errors
    ///
    /// Returns `ServiceError::Storage` if the counts cannot be read.
    pub async fn compute_eligibility(&self, user: UserId) -> Result<Eligibility, ServiceError> {
        lookup::eligibility(self.curriculum.as_ref(), user).await
    }

    /// Clear test results, the next meeting and every completion of `user`.
    /// The mentor link stays.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the profile does not exist.
    #[instrument(skip(self))]
    pub async fn reset_progress(&self, user: UserId) -> Result<(), ServiceError> {
        lookup::profile(self.profiles.as_ref(), user).await?;
        self.profiles
            .reset_progress(user, self.clock.now())
            .await?;
        info!("progress reset");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the viewer or template is missing.
    pub async fn session_detail(
        &self,
        viewer: UserId,
        template: TemplateId,
    ) -> Result<SessionDetail, ServiceError> {
        let profile = lookup::profile(self.profiles.as_ref(), viewer).await?;
        let template = lookup::template(self.curriculum.as_ref(), template).await?;
        let completion = self
            .curriculum
            .get_completion(viewer, template.id())
            .await?;

        Ok(SessionDetail {
            template_id: template.id(),
            title: template.title().to_owned(),
            order: template.order(),
            content_markdown: template.content_markdown().to_owned(),
            mentor_content_markdown: profile
                .is_mentor()
                .then(|| template.mentor_content_markdown().to_owned()),
            completion,
        })
    }

    /// Every template in display order with the viewer's completion state.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Storage` on repository failures.
    pub async fn session_list(&self, viewer: UserId) -> Result<Vec<SessionListItem>, ServiceError> {
        let templates = self.curriculum.list_templates().await?;
        let completions = self.curriculum.completions_for_user(viewer).await?;

        Ok(templates
            .iter()
            .map(|template| {
                let record = completions.iter().find(|c| c.template_id == template.id());
                SessionListItem {
                    template_id: template.id(),
                    title: template.title().to_owned(),
                    order: template.order(),
                    completed: record.is_some_and(|c| c.completed),
                    completed_at: record.and_then(|c| c.completed_at),
                }
            })
            .collect())
    }
}
