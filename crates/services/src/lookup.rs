use mentor_core::model::{Eligibility, Profile, SessionTemplate, TemplateId, User, UserId};
use storage::repository::{CurriculumRepository, ProfileRepository, UserRepository};

use crate::error::{Entity, ForbiddenReason, ServiceError};

pub(crate) async fn profile(
    profiles: &dyn ProfileRepository,
    user: UserId,
) -> Result<Profile, ServiceError> {
    profiles
        .get_profile(user)
        .await?
        .ok_or(ServiceError::NotFound(Entity::Profile(user)))
}

pub(crate) async fn user(users: &dyn UserRepository, id: UserId) -> Result<User, ServiceError> {
    users
        .get_user(id)
        .await?
        .ok_or(ServiceError::NotFound(Entity::User(id)))
}

pub(crate) async fn template(
    curriculum: &dyn CurriculumRepository,
    id: TemplateId,
) -> Result<SessionTemplate, ServiceError> {
    curriculum
        .get_template(id)
        .await?
        .ok_or(ServiceError::NotFound(Entity::Template(id)))
}

/// Load `actor`'s profile and require the mentor role.
pub(crate) async fn mentor(
    profiles: &dyn ProfileRepository,
    actor: UserId,
) -> Result<Profile, ServiceError> {
    let profile = profile(profiles, actor).await?;
    if profile.is_mentor() {
        Ok(profile)
    } else {
        tracing::warn!(%actor, "mentor-only operation denied");
        Err(ServiceError::Forbidden(ForbiddenReason::NotAMentor))
    }
}

/// Load `target`'s profile and require `actor` to be its assigned mentor.
pub(crate) async fn mentee_of(
    profiles: &dyn ProfileRepository,
    actor: UserId,
    target: UserId,
) -> Result<Profile, ServiceError> {
    mentor(profiles, actor).await?;
    let target_profile = profile(profiles, target).await?;
    if target_profile.is_mentored_by(actor) {
        Ok(target_profile)
    } else {
        tracing::warn!(%actor, %target, "not the assigned mentor");
        Err(ServiceError::Forbidden(ForbiddenReason::NotAssignedMentor))
    }
}

/// Fresh counts every call; nothing is cached.
pub(crate) async fn eligibility(
    curriculum: &dyn CurriculumRepository,
    user: UserId,
) -> Result<Eligibility, ServiceError> {
    let total = curriculum.count_templates().await?;
    let completed = curriculum.count_completed(user).await?;
    Ok(Eligibility::new(total, completed))
}
