#[cfg(feature = "http-profile-store")]
pub mod http;
/// In-process backend.
pub mod memory;

use futures::future::BoxFuture;

use crate::{dao::storage::StorageResult, state::session::SkillGroup};

/// External profile service consumed by the quiz core.
///
/// Every method returns an owned future so callers can spawn the work without borrowing the
/// store. Failures are reported but never block gameplay: matchmaking aborts on a failed
/// skill-group lookup, everything else is logged by the caller and skipped.
pub trait ProfileStore: Send + Sync {
    /// Skill group of `participant_id` for `category`.
    fn skill_group(
        &self,
        participant_id: &str,
        category: &str,
    ) -> BoxFuture<'static, StorageResult<SkillGroup>>;
    /// Current point balance.
    fn points(&self, participant_id: &str) -> BoxFuture<'static, StorageResult<i64>>;
    /// Apply `delta` to the point balance, returning the new balance.
    fn adjust_points(
        &self,
        participant_id: &str,
        delta: i64,
    ) -> BoxFuture<'static, StorageResult<i64>>;
    /// Record one more completed quiz, returning the new total.
    fn record_quiz_completed(
        &self,
        participant_id: &str,
    ) -> BoxFuture<'static, StorageResult<u32>>;
    /// Store the level derived from the point balance.
    fn update_level(
        &self,
        participant_id: &str,
        level: u32,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Unlock any achievement reached, returning the names unlocked by this call.
    fn evaluate_achievements(
        &self,
        participant_id: &str,
        total_points: i64,
        quizzes_completed: u32,
    ) -> BoxFuture<'static, StorageResult<Vec<String>>>;
    /// Spend one hint. Resolves to `false` when the participant has none left.
    fn consume_hint(&self, participant_id: &str) -> BoxFuture<'static, StorageResult<bool>>;
    /// Cheap reachability check used by the supervisor.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Level reached for a point balance.
pub fn level_for_points(points: i64) -> u32 {
    (points.max(0) / 100) as u32 + 1
}
