use std::sync::Arc;

use tracing::{info, instrument, warn};

use mentor_core::model::{TestKind, TestResult, UserId};
use mentor_core::quiz::{QuestionBank, QuestionBankSet, score_test};
use storage::repository::{CurriculumRepository, ProfileRepository};

use crate::Clock;
use crate::error::{ForbiddenReason, ServiceError};
use crate::lookup;

/// Placement and exit tests.
#[derive(Clone)]
pub struct TestingService {
    clock: Clock,
    banks: Arc<QuestionBankSet>,
    profiles: Arc<dyn ProfileRepository>,
    curriculum: Arc<dyn CurriculumRepository>,
}

impl TestingService {
    #[must_use]
    pub fn new(
        clock: Clock,
        banks: Arc<QuestionBankSet>,
        profiles: Arc<dyn ProfileRepository>,
        curriculum: Arc<dyn CurriculumRepository>,
    ) -> Self {
        Self {
            clock,
            banks,
            profiles,
            curriculum,
        }
    }

    #[must_use]
    pub fn bank_version(&self) -> &str {
        &self.banks.version
    }

    /// The placement test. Anyone with a profile may take it.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the profile does not exist.
    pub async fn intro_test_questions(&self, user: UserId) -> Result<QuestionBank, ServiceError> {
        lookup::profile(self.profiles.as_ref(), user).await?;
        Ok(self.banks.bank(TestKind::Intro)?.clone())
    }

    /// The exit test, only once every session is complete.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Forbidden` while the user is not eligible.
    pub async fn exit_test_questions(&self, user: UserId) -> Result<QuestionBank, ServiceError> {
        self.require_eligible(user).await?;
        Ok(self.banks.bank(TestKind::Exit)?.clone())
    }

    /// Score and record the placement test. Retakes overwrite the result.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the profile does not exist.
    #[instrument(skip(self, answers))]
    pub async fn submit_intro_test(
        &self,
        user: UserId,
        answers: &[Option<String>],
    ) -> Result<TestResult, ServiceError> {
        lookup::profile(self.profiles.as_ref(), user).await?;
        self.score_and_record(user, TestKind::Intro, answers).await
    }

    /// Score and record the exit test.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Forbidden` while the user is not eligible;
    /// nothing is scored or written then.
    #[instrument(skip(self, answers))]
    pub async fn submit_exit_test(
        &self,
        user: UserId,
        answers: &[Option<String>],
    ) -> Result<TestResult, ServiceError> {
        self.require_eligible(user).await?;
        self.score_and_record(user, TestKind::Exit, answers).await
    }

    async fn require_eligible(&self, user: UserId) -> Result<(), ServiceError> {
        lookup::profile(self.profiles.as_ref(), user).await?;
        let eligibility = lookup::eligibility(self.curriculum.as_ref(), user).await?;
        if eligibility.eligible_for_end_test() {
            Ok(())
        } else {
            warn!(
                %user,
                remaining = eligibility.remaining(),
                total = eligibility.total_templates,
                "exit test locked"
            );
            Err(ServiceError::Forbidden(ForbiddenReason::NotEligible))
        }
    }

    async fn score_and_record(
        &self,
        user: UserId,
        kind: TestKind,
        answers: &[Option<String>],
    ) -> Result<TestResult, ServiceError> {
        let bank = self.banks.bank(kind)?;
        let score = score_test(bank, answers);
        let result = TestResult {
            score: score.score,
            total: score.total,
            taken_at: self.clock.now(),
        };
        self.profiles.record_test(user, kind, &result).await?;
        info!(?kind, score = result.score, total = result.total, "test recorded");
        Ok(result)
    }
}
