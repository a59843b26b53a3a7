//! Proficiency test content and scoring.
//!
//! Question banks are loaded from a versioned TOML resource so content can
//! change without touching the scoring code. A default resource ships with the
//! crate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::model::TestKind;

/// The question banks bundled with the crate.
pub const DEFAULT_QUESTION_BANKS: &str = include_str!("../resources/question_banks.toml");

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizError {
    #[error("question bank resource is not valid TOML: {0}")]
    Parse(String),

    #[error("question bank `{0}` is not defined")]
    MissingBank(String),

    #[error("question bank `{0}` has no questions")]
    EmptyBank(String),

    #[error("question {index} in bank `{bank}` needs at least two options")]
    TooFewOptions { bank: String, index: usize },

    #[error("question {index} in bank `{bank}` has answer `{answer}` that names no option")]
    AnswerOutOfRange {
        bank: String,
        index: usize,
        answer: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

/// A fixed-option question. `correct_answer` is the option index as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    #[serde(default)]
    pub difficulty: Difficulty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionBank {
    #[serde(default)]
    pub title: String,
    pub questions: Vec<Question>,
}

impl QuestionBank {
    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    fn validate(&self, id: &str) -> Result<(), QuizError> {
        if self.questions.is_empty() {
            return Err(QuizError::EmptyBank(id.to_owned()));
        }
        for (index, q) in self.questions.iter().enumerate() {
            if q.options.len() < 2 {
                return Err(QuizError::TooFewOptions {
                    bank: id.to_owned(),
                    index,
                });
            }
            let in_range = q
                .correct_answer
                .trim()
                .parse::<usize>()
                .is_ok_and(|i| i < q.options.len());
            if !in_range {
                return Err(QuizError::AnswerOutOfRange {
                    bank: id.to_owned(),
                    index,
                    answer: q.correct_answer.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Versioned set of banks keyed by identifier (`intro`, `exit`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionBankSet {
    pub version: String,
    pub banks: BTreeMap<String, QuestionBank>,
}

impl QuestionBankSet {
    /// Parse and validate a TOML resource. Both test banks must be present.
    ///
    /// # Errors
    ///
    /// Returns `QuizError` for malformed TOML, missing banks or questions whose
    /// answer does not point at an option.
    pub fn from_toml(raw: &str) -> Result<Self, QuizError> {
        let set: Self = toml::from_str(raw).map_err(|e| QuizError::Parse(e.to_string()))?;
        for kind in [TestKind::Intro, TestKind::Exit] {
            set.bank(kind)?;
        }
        for (id, bank) in &set.banks {
            bank.validate(id)?;
        }
        Ok(set)
    }

    /// The bundled banks.
    ///
    /// # Errors
    ///
    /// Fails only if the bundled resource is broken.
    pub fn builtin() -> Result<Self, QuizError> {
        Self::from_toml(DEFAULT_QUESTION_BANKS)
    }

    /// # Errors
    ///
    /// Returns `QuizError::MissingBank` when the bank is not defined.
    pub fn bank(&self, kind: TestKind) -> Result<&QuestionBank, QuizError> {
        let id = kind.bank_id();
        self.banks
            .get(id)
            .ok_or_else(|| QuizError::MissingBank(id.to_owned()))
    }
}

/// Score and question count for one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Score {
    pub score: u32,
    pub total: u32,
}

/// Count exact matches between answers and the bank's canonical answers.
///
/// Answers must equal the canonical answer exactly; padding is a mismatch.
/// Missing or mismatched answers earn nothing; there is no penalty beyond
/// that. Answers past the end of the bank are ignored.
#[must_use]
pub fn score_test(bank: &QuestionBank, answers: &[Option<String>]) -> Score {
    let score = bank
        .questions
        .iter()
        .enumerate()
        .filter(|(i, q)| {
            answers
                .get(*i)
                .and_then(Option::as_deref)
                .is_some_and(|given| given == q.correct_answer)
        })
        .count();
    Score {
        score: u32::try_from(score).unwrap_or(u32::MAX),
        total: u32::try_from(bank.len()).unwrap_or(u32::MAX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank() -> QuestionBank {
        QuestionBank {
            title: "t".into(),
            questions: vec![
                Question {
                    text: "a".into(),
                    options: vec!["x".into(), "y".into()],
                    correct_answer: "0".into(),
                    difficulty: Difficulty::Easy,
                },
                Question {
                    text: "b".into(),
                    options: vec!["x".into(), "y".into(), "z".into()],
                    correct_answer: "2".into(),
                    difficulty: Difficulty::Medium,
                },
                Question {
                    text: "c".into(),
                    options: vec!["x".into(), "y".into()],
                    correct_answer: "1".into(),
                    difficulty: Difficulty::Hard,
                },
            ],
        }
    }

    #[test]
    fn builtin_banks_have_twenty_questions_each() {
        let set = QuestionBankSet::builtin().unwrap();
        assert_eq!(set.bank(TestKind::Intro).unwrap().len(), 20);
        assert_eq!(set.bank(TestKind::Exit).unwrap().len(), 20);
    }

    #[test]
    fn blanks_and_wrong_answers_score_zero() {
        let answers = vec![Some("0".into()), None, Some("0".into())];
        assert_eq!(score_test(&bank(), &answers), Score { score: 1, total: 3 });
    }

    #[test]
    fn padded_answer_is_not_a_match() {
        let answers = vec![Some(" 0 ".into()), Some("2\n".into()), None];
        assert_eq!(score_test(&bank(), &answers), Score { score: 0, total: 3 });
    }

    #[test]
    fn short_answer_list_is_not_an_error() {
        assert_eq!(score_test(&bank(), &[]), Score { score: 0, total: 3 });
    }

    #[test]
    fn perfect_submission() {
        let answers = vec![Some("0".into()), Some("2".into()), Some("1".into())];
        assert_eq!(score_test(&bank(), &answers).score, 3);
    }

    #[test]
    fn rejects_answer_without_option() {
        let raw = r#"
            version = "test"
            [banks.intro]
            [[banks.intro.questions]]
            text = "q"
            options = ["a", "b"]
            correct_answer = "4"
            [banks.exit]
            [[banks.exit.questions]]
            text = "q"
            options = ["a", "b"]
            correct_answer = "0"
        "#;
        let err = QuestionBankSet::from_toml(raw).unwrap_err();
        assert!(matches!(err, QuizError::AnswerOutOfRange { index: 0, .. }));
    }

    #[test]
    fn requires_both_banks() {
        let raw = r#"
            version = "test"
            [banks.intro]
            [[banks.intro.questions]]
            text = "q"
            options = ["a", "b"]
            correct_answer = "0"
        "#;
        assert_eq!(
            QuestionBankSet::from_toml(raw).unwrap_err(),
            QuizError::MissingBank("exit".into())
        );
    }
}
