use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::UserId;
use crate::model::meeting::{MeetingDefaults, MeetingSlot};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProfileError {
    #[error("user {0} is not a mentor")]
    NotAMentor(UserId),

    #[error("a mentor cannot be assigned to themselves")]
    SelfAssignment,

    #[error("test score {score} is outside 0..={total}")]
    ScoreOutOfRange { score: u32, total: u32 },
}

//
// ─── TESTS TAKEN ───────────────────────────────────────────────────────────────
//

/// Which proficiency test a result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestKind {
    Intro,
    Exit,
}

impl TestKind {
    /// Identifier of the question bank for this test.
    #[must_use]
    pub fn bank_id(self) -> &'static str {
        match self {
            TestKind::Intro => "intro",
            TestKind::Exit => "exit",
        }
    }
}

/// Outcome of one test submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TestResult {
    pub score: u32,
    pub total: u32,
    pub taken_at: DateTime<Utc>,
}

/// Persisted state for one test on a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TestRecord {
    pub done: bool,
    pub score: Option<u32>,
    pub taken_at: Option<DateTime<Utc>>,
}

impl TestRecord {
    #[must_use]
    pub fn from_result(result: &TestResult) -> Self {
        Self {
            done: true,
            score: Some(result.score),
            taken_at: Some(result.taken_at),
        }
    }
}

//
// ─── PROFILE ───────────────────────────────────────────────────────────────────
//

/// Persisted shape used by storage adapters to rebuild a `Profile`.
#[derive(Debug, Clone)]
pub struct ProfileParts {
    pub user_id: UserId,
    pub intro_test: TestRecord,
    pub end_test: TestRecord,
    pub assigned_mentor: Option<UserId>,
    pub is_mentor: bool,
    pub next_meeting: MeetingSlot,
    pub default_meeting: MeetingDefaults,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-user extension record: tests, mentor link and meeting details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    user_id: UserId,
    intro_test: TestRecord,
    end_test: TestRecord,
    assigned_mentor: Option<UserId>,
    is_mentor: bool,
    next_meeting: MeetingSlot,
    default_meeting: MeetingDefaults,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Profile {
    /// Fresh profile created alongside its user.
    #[must_use]
    pub fn new(user_id: UserId, is_mentor: bool, created_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            intro_test: TestRecord::default(),
            end_test: TestRecord::default(),
            assigned_mentor: None,
            is_mentor,
            next_meeting: MeetingSlot::default(),
            default_meeting: MeetingDefaults::default(),
            created_at,
            updated_at: created_at,
        }
    }

    #[must_use]
    pub fn from_persisted(parts: ProfileParts) -> Self {
        Self {
            user_id: parts.user_id,
            intro_test: parts.intro_test,
            end_test: parts.end_test,
            assigned_mentor: parts.assigned_mentor,
            is_mentor: parts.is_mentor,
            next_meeting: parts.next_meeting,
            default_meeting: parts.default_meeting,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn intro_test(&self) -> &TestRecord {
        &self.intro_test
    }

    #[must_use]
    pub fn end_test(&self) -> &TestRecord {
        &self.end_test
    }

    #[must_use]
    pub fn assigned_mentor(&self) -> Option<UserId> {
        self.assigned_mentor
    }

    #[must_use]
    pub fn is_mentor(&self) -> bool {
        self.is_mentor
    }

    #[must_use]
    pub fn next_meeting(&self) -> &MeetingSlot {
        &self.next_meeting
    }

    #[must_use]
    pub fn default_meeting(&self) -> &MeetingDefaults {
        &self.default_meeting
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// True when `mentor` is this profile's assigned mentor.
    #[must_use]
    pub fn is_mentored_by(&self, mentor: UserId) -> bool {
        self.assigned_mentor == Some(mentor)
    }

    /// Point this profile at `mentor`.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::NotAMentor` if `mentor` lacks the mentor role and
    /// `ProfileError::SelfAssignment` when both sides are the same user.
    pub fn assign_mentor(&mut self, mentor: &Profile, at: DateTime<Utc>) -> Result<(), ProfileError> {
        if !mentor.is_mentor {
            return Err(ProfileError::NotAMentor(mentor.user_id));
        }
        if mentor.user_id == self.user_id {
            return Err(ProfileError::SelfAssignment);
        }
        self.assigned_mentor = Some(mentor.user_id);
        self.updated_at = at;
        Ok(())
    }

    pub fn clear_mentor(&mut self, at: DateTime<Utc>) {
        self.set_assigned_mentor(None, at);
    }

    /// Overwrite the mentor link as stored. Role checks belong to
    /// `assign_mentor`.
    pub fn set_assigned_mentor(&mut self, mentor: Option<UserId>, at: DateTime<Utc>) {
        self.assigned_mentor = mentor;
        self.updated_at = at;
    }

    /// Store a submitted test result.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::ScoreOutOfRange` if the score exceeds the total.
    pub fn record_test(&mut self, kind: TestKind, result: &TestResult) -> Result<(), ProfileError> {
        if result.score > result.total {
            return Err(ProfileError::ScoreOutOfRange {
                score: result.score,
                total: result.total,
            });
        }
        let record = TestRecord::from_result(result);
        match kind {
            TestKind::Intro => self.intro_test = record,
            TestKind::Exit => self.end_test = record,
        }
        self.updated_at = result.taken_at;
        Ok(())
    }

    pub fn set_next_meeting(&mut self, slot: MeetingSlot, at: DateTime<Utc>) {
        self.next_meeting = slot;
        self.updated_at = at;
    }

    pub fn set_default_meeting(&mut self, defaults: MeetingDefaults, at: DateTime<Utc>) {
        self.default_meeting = defaults;
        self.updated_at = at;
    }

    /// Wipe test results and the next meeting. Mentor link and role survive.
    pub fn reset_progress(&mut self, at: DateTime<Utc>) {
        self.intro_test = TestRecord::default();
        self.end_test = TestRecord::default();
        self.next_meeting = MeetingSlot::default();
        self.updated_at = at;
    }
}

/// True when either side is the other's assigned mentor.
///
/// The stored link points from mentee to mentor; messaging and thread access
/// treat it as symmetric.
#[must_use]
pub fn is_paired_with(a: &Profile, b: &Profile) -> bool {
    a.is_mentored_by(b.user_id) || b.is_mentored_by(a.user_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn mentor(id: u64) -> Profile {
        Profile::new(UserId::new(id), true, fixed_now())
    }

    fn learner(id: u64) -> Profile {
        Profile::new(UserId::new(id), false, fixed_now())
    }

    #[test]
    fn assign_requires_mentor_role() {
        let mut target = learner(1);
        let err = target.assign_mentor(&learner(2), fixed_now()).unwrap_err();
        assert_eq!(err, ProfileError::NotAMentor(UserId::new(2)));
        assert_eq!(target.assigned_mentor(), None);
    }

    #[test]
    fn assign_rejects_self() {
        let mut me = mentor(3);
        let copy = me.clone();
        assert_eq!(
            me.assign_mentor(&copy, fixed_now()).unwrap_err(),
            ProfileError::SelfAssignment
        );
    }

    #[test]
    fn reassign_is_last_write_wins() {
        let mut target = learner(1);
        target.assign_mentor(&mentor(2), fixed_now()).unwrap();
        target.assign_mentor(&mentor(3), fixed_now()).unwrap();
        assert_eq!(target.assigned_mentor(), Some(UserId::new(3)));
    }

    #[test]
    fn stored_mentor_link_overwrites_and_clears() {
        let mut p = learner(1);
        let later = fixed_now() + chrono::Duration::minutes(1);
        p.set_assigned_mentor(Some(UserId::new(4)), later);
        assert!(p.is_mentored_by(UserId::new(4)));
        assert_eq!(p.updated_at(), later);
        p.clear_mentor(later);
        assert_eq!(p.assigned_mentor(), None);
    }

    #[test]
    fn pairing_is_symmetric() {
        let m = mentor(2);
        let mut l = learner(1);
        let stranger = learner(5);
        l.assign_mentor(&m, fixed_now()).unwrap();
        assert!(is_paired_with(&l, &m));
        assert!(is_paired_with(&m, &l));
        assert!(!is_paired_with(&m, &stranger));
        assert!(!is_paired_with(&l, &stranger));
    }

    #[test]
    fn record_test_rejects_impossible_score() {
        let mut p = learner(1);
        let result = TestResult {
            score: 21,
            total: 20,
            taken_at: fixed_now(),
        };
        assert!(p.record_test(TestKind::Intro, &result).is_err());
        assert!(!p.intro_test().done);
    }

    #[test]
    fn reset_keeps_mentor_link() {
        let m = mentor(2);
        let mut p = learner(1);
        p.assign_mentor(&m, fixed_now()).unwrap();
        let result = TestResult {
            score: 12,
            total: 20,
            taken_at: fixed_now(),
        };
        p.record_test(TestKind::Exit, &result).unwrap();
        p.reset_progress(fixed_now());
        assert_eq!(*p.end_test(), TestRecord::default());
        assert_eq!(p.assigned_mentor(), Some(UserId::new(2)));
    }
}
