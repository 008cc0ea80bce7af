//! Application-level configuration loading: round pacing, scoring and question sourcing.

use std::{
    env, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, serde_as};
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZ_DUEL_CONFIG_PATH";
/// Directory scanned for question files when the config does not name one.
const DEFAULT_QUESTIONS_DIR: &str = "data/questions";

const DEFAULT_TOTAL_ROUNDS: u32 = 5;
const DEFAULT_PHASE_DELAY: Duration = Duration::from_secs(5);
const DEFAULT_LOSER_PENALTY: u32 = 2;
const DEFAULT_DISPATCH_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Pacing and scoring rules applied to every session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundRules {
    /// Rounds per quiz.
    pub total_rounds: u32,
    /// Pause between `matchFound` and the first question.
    pub match_start_delay: Duration,
    /// Pause between a round's results and the next question.
    pub round_transition_delay: Duration,
    /// Pause between the last round's results and `quizEnd`.
    pub settlement_delay: Duration,
    /// Points the loser pays.
    pub loser_penalty: u32,
    /// Force-settle an open round after this long. Disabled when `None`.
    pub answer_timeout: Option<Duration>,
    /// Categories tried, in order, when the session's own category has nothing left.
    pub fallback_categories: Vec<String>,
    pub question_dispatch_retries: u32,
    pub question_retry_delay: Duration,
}

impl Default for RoundRules {
    fn default() -> Self {
        Self {
            total_rounds: DEFAULT_TOTAL_ROUNDS,
            match_start_delay: DEFAULT_PHASE_DELAY,
            round_transition_delay: DEFAULT_PHASE_DELAY,
            settlement_delay: DEFAULT_PHASE_DELAY,
            loser_penalty: DEFAULT_LOSER_PENALTY,
            answer_timeout: None,
            fallback_categories: Vec::new(),
            question_dispatch_retries: DEFAULT_DISPATCH_RETRIES,
            question_retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    rules: RoundRules,
    questions_dir: PathBuf,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json_str(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        total_rounds = app_config.rules.total_rounds,
                        questions_dir = %app_config.questions_dir.display(),
                        "loaded quiz configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a JSON document; absent fields keep their defaults.
    pub fn from_json_str(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }

    /// Configuration with the given rules and the default question directory.
    pub fn with_rules(rules: RoundRules) -> Self {
        Self {
            rules,
            questions_dir: PathBuf::from(DEFAULT_QUESTIONS_DIR),
        }
    }

    /// Rules every session plays by.
    pub fn rules(&self) -> &RoundRules {
        &self.rules
    }

    /// Directory holding the question files.
    pub fn questions_dir(&self) -> &Path {
        &self.questions_dir
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::with_rules(RoundRules::default())
    }
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    total_rounds: u32,
    #[serde(rename = "match_start_delay_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    match_start_delay: Duration,
    #[serde(rename = "round_transition_delay_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    round_transition_delay: Duration,
    #[serde(rename = "settlement_delay_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    settlement_delay: Duration,
    loser_penalty: u32,
    #[serde(rename = "answer_timeout_ms")]
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    answer_timeout: Option<Duration>,
    fallback_categories: Vec<String>,
    question_dispatch_retries: u32,
    #[serde(rename = "question_retry_delay_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    question_retry_delay: Duration,
    questions_dir: PathBuf,
}

impl Default for RawConfig {
    fn default() -> Self {
        let rules = RoundRules::default();
        Self {
            total_rounds: rules.total_rounds,
            match_start_delay: rules.match_start_delay,
            round_transition_delay: rules.round_transition_delay,
            settlement_delay: rules.settlement_delay,
            loser_penalty: rules.loser_penalty,
            answer_timeout: rules.answer_timeout,
            fallback_categories: rules.fallback_categories,
            question_dispatch_retries: rules.question_dispatch_retries,
            question_retry_delay: rules.question_retry_delay,
            questions_dir: PathBuf::from(DEFAULT_QUESTIONS_DIR),
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        if value.total_rounds == 0 {
            warn!("total_rounds must be at least 1; using 1");
        }
        Self {
            rules: RoundRules {
                total_rounds: value.total_rounds.max(1),
                match_start_delay: value.match_start_delay,
                round_transition_delay: value.round_transition_delay,
                settlement_delay: value.settlement_delay,
                loser_penalty: value.loser_penalty,
                answer_timeout: value.answer_timeout.filter(|timeout| !timeout.is_zero()),
                fallback_categories: value.fallback_categories,
                question_dispatch_retries: value.question_dispatch_retries,
                question_retry_delay: value.question_retry_delay,
            },
            questions_dir: value.questions_dir,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
