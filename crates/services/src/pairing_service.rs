use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use mentor_core::model::{
    Eligibility, MeetingError, MeetingSlot, MeetingTool, MeetingUrl, NextMeeting, Profile,
    SessionCompletion, TemplateId, TestRecord, UserId, reconcile_completions,
};
use mentor_core::policy::{MeetingTimePolicy, Policies, UnassignPolicy};
use mentor_core::time::parse_meeting_time;
use storage::repository::{CurriculumRepository, ProfileRepository, UserRepository};

use crate::Clock;
use crate::error::{Entity, ForbiddenReason, ServiceError};
use crate::lookup;

/// Raw next-meeting form input. Blank fields mean "not set".
#[derive(Debug, Clone, Default)]
pub struct MeetingRequest {
    pub scheduled_at: Option<String>,
    pub url: Option<String>,
    pub tool: Option<String>,
    pub notes: String,
}

/// One of a mentor's learners, as listed on the mentor dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenteeSummary {
    pub user_id: UserId,
    pub username: String,
    pub display_name: String,
    pub intro_test: TestRecord,
    pub end_test: TestRecord,
    pub eligibility: Eligibility,
    pub eligible_for_end_test: bool,
    pub next_meeting: Option<NextMeeting>,
}

/// A learner nobody mentors yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnpairedLearner {
    pub user_id: UserId,
    pub username: String,
    pub display_name: String,
    pub intro_test: TestRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MentorDashboard {
    pub mentees: Vec<MenteeSummary>,
    pub unpaired: Vec<UnpairedLearner>,
}

/// Mentor-side operations: pairing, meetings and progress on behalf of
/// mentees.
#[derive(Clone)]
pub struct PairingService {
    clock: Clock,
    policies: Policies,
    users: Arc<dyn UserRepository>,
    profiles: Arc<dyn ProfileRepository>,
    curriculum: Arc<dyn CurriculumRepository>,
}

impl PairingService {
    #[must_use]
    pub fn new(
        clock: Clock,
        policies: Policies,
        users: Arc<dyn UserRepository>,
        profiles: Arc<dyn ProfileRepository>,
        curriculum: Arc<dyn CurriculumRepository>,
    ) -> Self {
        Self {
            clock,
            policies,
            users,
            profiles,
            curriculum,
        }
    }

    /// Make `actor` the mentor of `target`. A later assignment by another
    /// mentor replaces this one.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Forbidden` if `actor` is not a mentor,
    /// `ServiceError::NotFound` if either profile is missing and
    /// `ServiceError::Validation` for self-assignment.
    #[instrument(skip(self))]
    pub async fn assign_mentor(
        &self,
        actor: UserId,
        target: UserId,
    ) -> Result<Profile, ServiceError> {
        let mentor = lookup::mentor(self.profiles.as_ref(), actor).await?;
        let mut learner = lookup::profile(self.profiles.as_ref(), target).await?;

        let now = self.clock.now();
        let previous = learner.assigned_mentor();
        learner.assign_mentor(&mentor, now)?;
        self.profiles
            .set_assigned_mentor(target, Some(actor), now)
            .await?;

        info!(?previous, "mentor assigned");
        Ok(learner)
    }

    /// Release `target` from `actor`.
    ///
    /// When `actor` is not the assigned mentor, `UnassignPolicy` decides
    /// between a silent no-op and `Forbidden`.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Forbidden` if `actor` is not a mentor (or not
    /// the assigned one under `UnassignPolicy::Reject`) and
    /// `ServiceError::NotFound` if the target is missing.
    #[instrument(skip(self))]
    pub async fn unassign_mentor(
        &self,
        actor: UserId,
        target: UserId,
    ) -> Result<Profile, ServiceError> {
        lookup::mentor(self.profiles.as_ref(), actor).await?;
        lookup::profile(self.profiles.as_ref(), target).await?;

        let cleared = self
            .profiles
            .clear_assigned_mentor_if(target, actor, self.clock.now())
            .await?;
        if cleared {
            info!("mentor unassigned");
        } else {
            match self.policies.unassign {
                UnassignPolicy::SilentNoop => info!("not assigned to this mentor; nothing to do"),
                UnassignPolicy::Reject => {
                    warn!("unassign by a mentor who is not assigned");
                    return Err(ServiceError::Forbidden(ForbiddenReason::NotAssignedMentor));
                }
            }
        }
        lookup::profile(self.profiles.as_ref(), target).await
    }

    /// Overwrite the target's next-meeting fields.
    ///
    /// Returns the meeting as the learner will see it, or `None` when the
    /// request left every field blank.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Forbidden` unless `actor` is the target's
    /// assigned mentor and `ServiceError::Validation` for a malformed link,
    /// unknown tool, or (under `MeetingTimePolicy::Reject`) unparseable time.
    #[instrument(skip(self, request))]
    pub async fn set_next_meeting(
        &self,
        actor: UserId,
        target: UserId,
        request: MeetingRequest,
    ) -> Result<Option<NextMeeting>, ServiceError> {
        lookup::mentee_of(self.profiles.as_ref(), actor, target).await?;
        let slot = self.meeting_slot(request)?;

        self.profiles
            .set_next_meeting(target, &slot, self.clock.now())
            .await?;
        info!(scheduled_at = ?slot.scheduled_at, "next meeting updated");

        let mentor = lookup::profile(self.profiles.as_ref(), actor).await?;
        Ok(NextMeeting::resolve(
            &slot,
            Some(actor),
            Some(mentor.default_meeting()),
        ))
    }

    fn meeting_slot(&self, request: MeetingRequest) -> Result<MeetingSlot, ServiceError> {
        let raw_time = request
            .scheduled_at
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let scheduled_at = match raw_time {
            None => None,
            Some(raw) => match (parse_meeting_time(raw), self.policies.meeting_time) {
                (Some(at), _) => Some(at),
                (None, MeetingTimePolicy::NullOnInvalid) => {
                    warn!(raw, "unparseable meeting time stored as empty");
                    None
                }
                (None, MeetingTimePolicy::Reject) => {
                    return Err(MeetingError::InvalidTime(raw.to_owned()).into());
                }
            },
        };

        Ok(MeetingSlot {
            scheduled_at,
            url: MeetingUrl::parse_optional(request.url.as_deref())?,
            tool: MeetingTool::parse_optional(request.tool.as_deref())?,
            notes: request.notes.trim().to_owned(),
        })
    }

    /// Set the target's completions to exactly `completed`.
    ///
    /// Sessions already complete keep their first completion time; sessions
    /// left out are cleared.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Forbidden` unless `actor` is the target's
    /// assigned mentor and `ServiceError::NotFound` for an unknown template.
    #[instrument(skip(self, completed), fields(completed = completed.len()))]
    pub async fn bulk_set_completions(
        &self,
        actor: UserId,
        target: UserId,
        completed: &HashSet<TemplateId>,
    ) -> Result<Vec<SessionCompletion>, ServiceError> {
        lookup::mentee_of(self.profiles.as_ref(), actor, target).await?;

        let templates = self.curriculum.list_templates().await?;
        if let Some(unknown) = completed
            .iter()
            .find(|id| !templates.iter().any(|t| t.id() == **id))
        {
            return Err(ServiceError::NotFound(Entity::Template(*unknown)));
        }

        let existing = self.curriculum.completions_for_user(target).await?;
        let records =
            reconcile_completions(target, &templates, &existing, completed, self.clock.now());
        self.curriculum.save_completions(&records).await?;

        info!(total = records.len(), "completions reconciled");
        Ok(records)
    }

    /// The mentor's learners plus every learner still waiting for a mentor.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Forbidden` if `actor` is not a mentor.
    pub async fn mentor_dashboard(&self, actor: UserId) -> Result<MentorDashboard, ServiceError> {
        let mentor = lookup::mentor(self.profiles.as_ref(), actor).await?;
        let profiles = self.profiles.list_profiles().await?;

        let mut mentees = Vec::new();
        let mut unpaired = Vec::new();
        for profile in profiles {
            if profile.is_mentored_by(actor) {
                let user = lookup::user(self.users.as_ref(), profile.user_id()).await?;
                let eligibility =
                    lookup::eligibility(self.curriculum.as_ref(), profile.user_id()).await?;
                mentees.push(MenteeSummary {
                    user_id: profile.user_id(),
                    username: user.username().to_owned(),
                    display_name: user.display_name().to_owned(),
                    intro_test: *profile.intro_test(),
                    end_test: *profile.end_test(),
                    eligibility,
                    eligible_for_end_test: eligibility.eligible_for_end_test(),
                    next_meeting: NextMeeting::resolve(
                        profile.next_meeting(),
                        Some(actor),
                        Some(mentor.default_meeting()),
                    ),
                });
            } else if !profile.is_mentor() && profile.assigned_mentor().is_none() {
                let user = lookup::user(self.users.as_ref(), profile.user_id()).await?;
                unpaired.push(UnpairedLearner {
                    user_id: profile.user_id(),
                    username: user.username().to_owned(),
                    display_name: user.display_name().to_owned(),
                    intro_test: *profile.intro_test(),
                });
            }
        }

        Ok(MentorDashboard { mentees, unpaired })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use mentor_core::model::{RegistrationDraft, SessionTemplateDraft};
    use mentor_core::time::fixed_now;
    use storage::repository::InMemoryRepository;

    struct Fixture {
        repo: InMemoryRepository,
        mentor: UserId,
        other_mentor: UserId,
        learner: UserId,
    }

    async fn fixture() -> Fixture {
        let repo = InMemoryRepository::new();
        let mut ids = Vec::new();
        for (email, mentor) in [
            ("ada@example.com", true),
            ("grace@example.com", true),
            ("linus@example.com", false),
        ] {
            let registration = RegistrationDraft {
                email: email.into(),
                first_name: Some(email.split('@').next().unwrap_or_default().into()),
                is_mentor: mentor,
                ..RegistrationDraft::default()
            }
            .validate()
            .unwrap();
            ids.push(
                repo.create_user(&registration, email, fixed_now())
                    .await
                    .unwrap()
                    .id(),
            );
        }
        Fixture {
            repo,
            mentor: ids[0],
            other_mentor: ids[1],
            learner: ids[2],
        }
    }

    fn service(repo: &InMemoryRepository, policies: Policies) -> PairingService {
        PairingService::new(
            Clock::Fixed(fixed_now()),
            policies,
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        )
    }

    #[tokio::test]
    async fn only_mentors_assign() {
        let f = fixture().await;
        let svc = service(&f.repo, Policies::default());

        let err = svc.assign_mentor(f.learner, f.mentor).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Forbidden(ForbiddenReason::NotAMentor)
        ));

        let missing = svc
            .assign_mentor(f.mentor, UserId::new(99))
            .await
            .unwrap_err();
        assert!(matches!(missing, ServiceError::NotFound(Entity::Profile(_))));

        let own = svc.assign_mentor(f.mentor, f.mentor).await.unwrap_err();
        assert!(matches!(own, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn later_assignment_hands_off() {
        let f = fixture().await;
        let svc = service(&f.repo, Policies::default());

        svc.assign_mentor(f.mentor, f.learner).await.unwrap();
        let handed = svc.assign_mentor(f.other_mentor, f.learner).await.unwrap();
        assert_eq!(handed.assigned_mentor(), Some(f.other_mentor));

        let stored = f.repo.get_profile(f.learner).await.unwrap().unwrap();
        assert_eq!(stored.assigned_mentor(), Some(f.other_mentor));
    }

    #[tokio::test]
    async fn unassign_by_other_mentor_follows_policy() {
        let f = fixture().await;
        let lenient = service(&f.repo, Policies::default());
        lenient.assign_mentor(f.mentor, f.learner).await.unwrap();

        let untouched = lenient
            .unassign_mentor(f.other_mentor, f.learner)
            .await
            .unwrap();
        assert_eq!(untouched.assigned_mentor(), Some(f.mentor));

        let strict = service(
            &f.repo,
            Policies {
                unassign: UnassignPolicy::Reject,
                ..Policies::default()
            },
        );
        let err = strict
            .unassign_mentor(f.other_mentor, f.learner)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Forbidden(ForbiddenReason::NotAssignedMentor)
        ));

        let cleared = strict.unassign_mentor(f.mentor, f.learner).await.unwrap();
        assert_eq!(cleared.assigned_mentor(), None);
    }

    #[tokio::test]
    async fn meeting_requires_assigned_mentor() {
        let f = fixture().await;
        let svc = service(&f.repo, Policies::default());
        svc.assign_mentor(f.mentor, f.learner).await.unwrap();

        let err = svc
            .set_next_meeting(f.other_mentor, f.learner, MeetingRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Forbidden(ForbiddenReason::NotAssignedMentor)
        ));

        let meeting = svc
            .set_next_meeting(
                f.mentor,
                f.learner,
                MeetingRequest {
                    scheduled_at: Some("2024-05-01T17:30".into()),
                    url: Some("https://zoom.example.com/j/42".into()),
                    tool: Some("zoom".into()),
                    notes: " chapter 3 ".into(),
                },
            )
            .await
            .unwrap()
            .expect("meeting set");
        assert_eq!(
            meeting.scheduled_at().map(|t| t.to_rfc3339()),
            Some("2024-05-01T17:30:00+00:00".to_owned())
        );
        assert_eq!(meeting.tool(), Some(MeetingTool::Zoom));
        assert_eq!(meeting.notes(), "chapter 3");
    }

    #[tokio::test]
    async fn invalid_meeting_time_follows_policy() {
        let f = fixture().await;
        let lenient = service(&f.repo, Policies::default());
        lenient.assign_mentor(f.mentor, f.learner).await.unwrap();

        let request = MeetingRequest {
            scheduled_at: Some("next tuesday".into()),
            url: Some("https://meet.example.com/x".into()),
            ..MeetingRequest::default()
        };
        let stored = lenient
            .set_next_meeting(f.mentor, f.learner, request.clone())
            .await
            .unwrap()
            .expect("url still set");
        assert_eq!(stored.scheduled_at(), None);

        let strict = service(
            &f.repo,
            Policies {
                meeting_time: MeetingTimePolicy::Reject,
                ..Policies::default()
            },
        );
        let err = strict
            .set_next_meeting(f.mentor, f.learner, request)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let bad_url = lenient
            .set_next_meeting(
                f.mentor,
                f.learner,
                MeetingRequest {
                    url: Some("ftp://files.example.com".into()),
                    ..MeetingRequest::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(bad_url, ServiceError::Validation(_)));
        let profile = f.repo.get_profile(f.learner).await.unwrap().unwrap();
        assert!(profile.next_meeting().url.is_some(), "rejected update wrote nothing");
    }

    #[tokio::test]
    async fn bulk_update_reconciles_every_template() {
        let f = fixture().await;
        let svc = service(&f.repo, Policies::default());
        svc.assign_mentor(f.mentor, f.learner).await.unwrap();

        let mut ids = Vec::new();
        for (i, title) in ["One", "Two", "Three"].into_iter().enumerate() {
            let t = f
                .repo
                .insert_template(
                    SessionTemplateDraft {
                        title: title.into(),
                        order: u32::try_from(i).unwrap(),
                        ..SessionTemplateDraft::default()
                    },
                    fixed_now(),
                )
                .await
                .unwrap();
            ids.push(t.id());
        }

        let first: HashSet<TemplateId> = [ids[0], ids[1]].into_iter().collect();
        svc.bulk_set_completions(f.mentor, f.learner, &first)
            .await
            .unwrap();
        assert_eq!(f.repo.count_completed(f.learner).await.unwrap(), 2);

        let second: HashSet<TemplateId> = [ids[1], ids[2]].into_iter().collect();
        let records = svc
            .bulk_set_completions(f.mentor, f.learner, &second)
            .await
            .unwrap();
        assert_eq!(records.len(), 3);
        assert!(!records[0].completed && records[0].completed_at.is_none());
        assert!(records[1].completed && records[2].completed);

        let stranger = svc
            .bulk_set_completions(f.other_mentor, f.learner, &second)
            .await
            .unwrap_err();
        assert!(matches!(stranger, ServiceError::Forbidden(_)));

        let unknown: HashSet<TemplateId> = [TemplateId::new(77)].into_iter().collect();
        let err = svc
            .bulk_set_completions(f.mentor, f.learner, &unknown)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(Entity::Template(_))));
        assert_eq!(f.repo.count_completed(f.learner).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn mentor_dashboard_lists_mentees_and_unpaired_learners() {
        let f = fixture().await;
        let svc = service(&f.repo, Policies::default());

        let before = svc.mentor_dashboard(f.mentor).await.unwrap();
        assert!(before.mentees.is_empty());
        assert_eq!(before.unpaired.len(), 1);
        assert_eq!(before.unpaired[0].display_name, "linus");

        svc.assign_mentor(f.mentor, f.learner).await.unwrap();
        let after = svc.mentor_dashboard(f.mentor).await.unwrap();
        assert_eq!(after.mentees.len(), 1);
        assert!(after.unpaired.is_empty());
        assert!(!after.mentees[0].eligible_for_end_test);

        let denied = svc.mentor_dashboard(f.learner).await.unwrap_err();
        assert!(matches!(denied, ServiceError::Forbidden(_)));
    }
}
