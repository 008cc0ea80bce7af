use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::{
    dao::{
        profile_store::ProfileStore,
        storage::{StorageError, StorageResult},
    },
    state::session::SkillGroup,
};

/// Skill group handed to auto-enrolled participants.
const DEFAULT_SKILL_GROUP: SkillGroup = 1;
/// Hints granted to auto-enrolled participants.
const DEFAULT_HINTS: u32 = 3;

/// Achievement thresholds: name, minimum points, minimum completed quizzes.
const ACHIEVEMENTS: &[(&str, i64, u32)] = &[
    ("First Quiz", i64::MIN, 1),
    ("Bronze Champion", 25, 0),
    ("High Score", 50, 0),
    ("Gold Master", 100, 0),
];

/// Profile data kept per participant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    /// Point balance.
    pub points: i64,
    /// Level derived from `points`.
    pub level: u32,
    /// Quizzes finished with an opponent.
    pub quizzes_completed: u32,
    /// Hints left to spend.
    pub hints: u32,
    /// Skill group per category.
    pub groups: HashMap<String, SkillGroup>,
    /// Unlocked achievement names.
    pub achievements: BTreeSet<String>,
}

impl Profile {
    /// Profile with the same skill group in every listed category.
    pub fn with_group(categories: &[&str], group: SkillGroup) -> Self {
        Self {
            level: 1,
            groups: categories
                .iter()
                .map(|category| (category.to_string(), group))
                .collect(),
            ..Self::default()
        }
    }

    fn enrolled() -> Self {
        Self {
            level: 1,
            hints: DEFAULT_HINTS,
            ..Self::default()
        }
    }
}

/// Process-local profile store.
///
/// With auto-enrolment enabled, unknown participants get a fresh profile on first access and
/// every category resolves to the default skill group. Otherwise unknown participants and
/// categories are reported as [`StorageError::Missing`].
#[derive(Clone, Default)]
pub struct MemoryProfileStore {
    profiles: Arc<DashMap<String, Profile>>,
    auto_enroll: bool,
}

impl MemoryProfileStore {
    /// Empty store that only knows inserted profiles.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty store that enrols unknown participants on first access.
    pub fn with_auto_enroll() -> Self {
        Self {
            profiles: Arc::default(),
            auto_enroll: true,
        }
    }

    /// Store `profile`, replacing any existing one.
    pub fn insert_profile(&self, participant_id: impl Into<String>, profile: Profile) {
        self.profiles.insert(participant_id.into(), profile);
    }

    /// Copy of the stored profile, if any.
    pub fn profile(&self, participant_id: &str) -> Option<Profile> {
        self.profiles.get(participant_id).map(|entry| entry.clone())
    }

    fn update<T>(
        &self,
        participant_id: &str,
        apply: impl FnOnce(&mut Profile) -> T,
    ) -> StorageResult<T> {
        if self.auto_enroll {
            let mut entry = self
                .profiles
                .entry(participant_id.to_string())
                .or_insert_with(Profile::enrolled);
            return Ok(apply(entry.value_mut()));
        }
        let mut entry = self
            .profiles
            .get_mut(participant_id)
            .ok_or_else(|| StorageError::Missing(participant_id.to_string()))?;
        Ok(apply(entry.value_mut()))
    }

    fn lookup_group(&self, participant_id: &str, category: &str) -> StorageResult<SkillGroup> {
        let auto_enroll = self.auto_enroll;
        self.update(participant_id, |profile| {
            profile.groups.get(category).copied().or_else(|| {
                auto_enroll.then(|| {
                    profile
                        .groups
                        .insert(category.to_string(), DEFAULT_SKILL_GROUP);
                    DEFAULT_SKILL_GROUP
                })
            })
        })?
        .ok_or_else(|| StorageError::Missing(format!("{participant_id}/{category}")))
    }
}

impl ProfileStore for MemoryProfileStore {
    fn skill_group(
        &self,
        participant_id: &str,
        category: &str,
    ) -> BoxFuture<'static, StorageResult<SkillGroup>> {
        let result = self.lookup_group(participant_id, category);
        Box::pin(async move { result })
    }

    fn points(&self, participant_id: &str) -> BoxFuture<'static, StorageResult<i64>> {
        let result = self.update(participant_id, |profile| profile.points);
        Box::pin(async move { result })
    }

    fn adjust_points(
        &self,
        participant_id: &str,
        delta: i64,
    ) -> BoxFuture<'static, StorageResult<i64>> {
        let result = self.update(participant_id, |profile| {
            profile.points += delta;
            profile.points
        });
        Box::pin(async move { result })
    }

    fn record_quiz_completed(
        &self,
        participant_id: &str,
    ) -> BoxFuture<'static, StorageResult<u32>> {
        let result = self.update(participant_id, |profile| {
            profile.quizzes_completed += 1;
            profile.quizzes_completed
        });
        Box::pin(async move { result })
    }

    fn update_level(
        &self,
        participant_id: &str,
        level: u32,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.update(participant_id, |profile| profile.level = level);
        Box::pin(async move { result })
    }

    fn evaluate_achievements(
        &self,
        participant_id: &str,
        total_points: i64,
        quizzes_completed: u32,
    ) -> BoxFuture<'static, StorageResult<Vec<String>>> {
        let result = self.update(participant_id, |profile| {
            ACHIEVEMENTS
                .iter()
                .filter(|(_, min_points, min_quizzes)| {
                    total_points >= *min_points && quizzes_completed >= *min_quizzes
                })
                .filter(|(name, ..)| profile.achievements.insert(name.to_string()))
                .map(|(name, ..)| name.to_string())
                .collect()
        });
        Box::pin(async move { result })
    }

    fn consume_hint(&self, participant_id: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let result = self.update(participant_id, |profile| {
            if profile.hints == 0 {
                false
            } else {
                profile.hints -= 1;
                true
            }
        });
        Box::pin(async move { result })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
