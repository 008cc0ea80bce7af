use std::{
    collections::{HashMap, HashSet},
    fs,
    io::ErrorKind,
    path::Path,
};

use rand::{Rng, seq::IndexedRandom};
use serde::Deserialize;
use tracing::{info, warn};

use super::{DifficultyTier, Question, QuestionBank, QuestionBankError, QuestionKind};

/// File holding free-input questions for every category.
const FACTS_FILE: &str = "facts.json";
/// Suffix of per-category multiple-choice files (`{category}-mc.json`).
const MULTIPLE_CHOICE_SUFFIX: &str = "-mc.json";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMultipleChoice {
    id: Option<String>,
    question: String,
    options: Vec<String>,
    correct_answer: String,
}

#[derive(Debug, Deserialize)]
struct RawFact {
    id: Option<String>,
    category: String,
    question: String,
    answer: String,
}

/// In-memory question bank indexed by category and kind.
#[derive(Debug, Default)]
pub struct QuestionPool {
    questions: HashMap<(String, QuestionKind), Vec<Question>>,
}

impl QuestionPool {
    /// Pool holding exactly `questions`.
    pub fn from_questions(questions: impl IntoIterator<Item = Question>) -> Self {
        let mut pool = Self::default();
        for question in questions {
            pool.questions
                .entry((question.category.clone(), question.kind))
                .or_default()
                .push(question);
        }
        pool
    }

    /// Load every `{category}-mc.json` file and `facts.json` from `dir`.
    ///
    /// Unreadable or malformed files are logged and skipped; a missing directory yields an
    /// empty pool.
    pub fn from_dir(dir: &Path) -> Self {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!(path = %dir.display(), "question directory not found; bank is empty");
                return Self::default();
            }
            Err(err) => {
                warn!(path = %dir.display(), error = %err, "failed to read question directory");
                return Self::default();
            }
        };

        let mut questions = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            let contents = match fs::read_to_string(&path) {
                Ok(contents) => contents,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to read question file");
                    continue;
                }
            };

            let parsed = if name == FACTS_FILE {
                parse_facts(&contents)
            } else if let Some(category) = name.strip_suffix(MULTIPLE_CHOICE_SUFFIX) {
                parse_multiple_choice(category, &contents)
            } else {
                continue;
            };

            match parsed {
                Ok(batch) => questions.extend(batch),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to parse question file")
                }
            }
        }

        let pool = Self::from_questions(questions);
        info!(
            path = %dir.display(),
            count = pool.len(),
            "loaded question bank"
        );
        pool
    }

    /// Number of questions across every category.
    pub fn len(&self) -> usize {
        self.questions.values().map(Vec::len).sum()
    }

    /// Whether the pool holds no question at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn pick(
        &self,
        category: &str,
        kind: QuestionKind,
        exclude: &HashSet<String>,
    ) -> Option<Question> {
        let candidates = self
            .questions
            .get(&(category.to_string(), kind))?
            .iter()
            .filter(|question| !exclude.contains(&question.id))
            .collect::<Vec<_>>();
        candidates
            .choose(&mut rand::rng())
            .map(|question| (*question).clone())
    }
}

impl QuestionBank for QuestionPool {
    fn get_question(
        &self,
        category: &str,
        tier: DifficultyTier,
        exclude: &HashSet<String>,
    ) -> Result<Question, QuestionBankError> {
        let input_first = rand::rng().random_bool(0.5);
        tier.kinds(input_first)
            .into_iter()
            .find_map(|kind| self.pick(category, kind, exclude))
            .ok_or_else(|| QuestionBankError::NotFound {
                category: category.to_string(),
            })
    }
}

fn parse_multiple_choice(category: &str, contents: &str) -> serde_json::Result<Vec<Question>> {
    let raw: Vec<RawMultipleChoice> = serde_json::from_str(contents)?;
    Ok(raw
        .into_iter()
        .enumerate()
        .map(|(index, item)| Question {
            id: item
                .id
                .unwrap_or_else(|| format!("{category}-mc-{index}")),
            category: category.to_string(),
            kind: QuestionKind::MultipleChoice,
            text: item.question,
            options: Some(item.options),
            correct_answer: item.correct_answer,
        })
        .collect())
}

fn parse_facts(contents: &str) -> serde_json::Result<Vec<Question>> {
    let raw: Vec<RawFact> = serde_json::from_str(contents)?;
    Ok(raw
        .into_iter()
        .enumerate()
        .map(|(index, item)| Question {
            id: item
                .id
                .unwrap_or_else(|| format!("{}-fact-{index}", item.category)),
            category: item.category,
            kind: QuestionKind::Input,
            text: item.question,
            options: None,
            correct_answer: item.answer,
        })
        .collect())
}
