//! Question bank collaborator: selects a question for a category and difficulty tier.

mod pool;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::state::session::SkillGroup;

pub use self::pool::QuestionPool;

/// Shape of a question as presented to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum QuestionKind {
    /// Pick one of the listed options.
    MultipleChoice,
    /// Type the answer.
    Input,
}

/// Which question kinds a session may receive, derived from the pair's skill group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DifficultyTier {
    /// Groups 1 and 2: multiple choice only.
    MultipleChoiceOnly,
    /// Group 3: coin flip between multiple choice and free input.
    Mixed,
    /// Group 4 and above: free input only.
    InputOnly,
}

impl DifficultyTier {
    /// Tier played by a pair in skill group `group`.
    pub fn from_skill_group(group: SkillGroup) -> Self {
        match group {
            ..=2 => Self::MultipleChoiceOnly,
            3 => Self::Mixed,
            _ => Self::InputOnly,
        }
    }

    /// Kinds to try in order; the mixed tier falls back to the other kind when the first draw
    /// has nothing left.
    pub fn kinds(self, input_first: bool) -> Vec<QuestionKind> {
        match self {
            Self::MultipleChoiceOnly => vec![QuestionKind::MultipleChoice],
            Self::InputOnly => vec![QuestionKind::Input],
            Self::Mixed if input_first => vec![QuestionKind::Input, QuestionKind::MultipleChoice],
            Self::Mixed => vec![QuestionKind::MultipleChoice, QuestionKind::Input],
        }
    }
}

/// A question with its answer. The answer never leaves the server before the round settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Unique within the bank.
    pub id: String,
    /// Category the question belongs to.
    pub category: String,
    /// How the answer is given.
    pub kind: QuestionKind,
    /// Question text.
    pub text: String,
    /// Choices, for multiple choice questions.
    pub options: Option<Vec<String>>,
    /// Expected answer, matched exactly.
    pub correct_answer: String,
}

/// Error raised when a question cannot be drawn.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuestionBankError {
    /// Every matching question was used or none exist.
    #[error("no question available for category `{category}`")]
    NotFound {
        /// Category that ran dry.
        category: String,
    },
}

/// Source of quiz questions.
///
/// Selection is synchronous so it can run inside a lobby mutation without suspending.
pub trait QuestionBank: Send + Sync {
    fn get_question(
        &self,
        category: &str,
        tier: DifficultyTier,
        exclude: &HashSet<String>,
    ) -> Result<Question, QuestionBankError>;
}
