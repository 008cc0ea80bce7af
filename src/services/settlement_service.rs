use tracing::{info, warn};

use crate::{
    dao::{
        profile_store::{ProfileStore, level_for_points},
        storage::StorageResult,
    },
    error::ServiceError,
    state::{
        SharedState,
        session::SessionId,
        settlement::{PointsEntry, SettlementOrder},
    },
};

/// Persist the outcome of a released session.
///
/// Every step is attempted for every participant; failures are logged and skipped so one broken
/// call never blocks the rest.
pub async fn settle(state: SharedState, order: SettlementOrder) {
    let Some(store) = state.profile_store().await else {
        warn!(session_id = %order.session_id, "profile store unavailable; settlement skipped");
        return;
    };

    for entry in &order.entries {
        settle_participant(store.as_ref(), order.session_id, entry).await;
    }
    info!(session_id = %order.session_id, "settlement persisted");
}

async fn settle_participant(store: &dyn ProfileStore, session_id: SessionId, entry: &PointsEntry) {
    let participant_id = entry.participant_id.as_str();

    let points = if entry.delta == 0 {
        step(session_id, participant_id, "read points", store.points(participant_id).await)
    } else {
        step(
            session_id,
            participant_id,
            "adjust points",
            store.adjust_points(participant_id, entry.delta).await,
        )
    };

    if let Some(points) = points {
        step(
            session_id,
            participant_id,
            "update level",
            store
                .update_level(participant_id, level_for_points(points))
                .await,
        );
    }

    let quizzes_completed = step(
        session_id,
        participant_id,
        "record completed quiz",
        store.record_quiz_completed(participant_id).await,
    );

    let (Some(points), Some(quizzes_completed)) = (points, quizzes_completed) else {
        return;
    };
    let unlocked = step(
        session_id,
        participant_id,
        "evaluate achievements",
        store
            .evaluate_achievements(participant_id, points, quizzes_completed)
            .await,
    );
    if let Some(unlocked) = unlocked.filter(|unlocked| !unlocked.is_empty()) {
        info!(
            session_id = %session_id,
            participant_id = %participant_id,
            ?unlocked,
            "achievements unlocked"
        );
    }
}

/// Log a failed step and turn it into `None`.
fn step<T>(
    session_id: SessionId,
    participant_id: &str,
    name: &'static str,
    result: StorageResult<T>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(source) => {
            let err = ServiceError::Persistence { step: name, source };
            warn!(
                session_id = %session_id,
                participant_id = %participant_id,
                error = %err,
                cause = ?std::error::Error::source(&err),
                "settlement step failed"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;
    use crate::{
        config::RoundRules,
        dao::profile_store::memory::Profile,
        services::test_support::{bare_state, test_state},
    };

    fn order(entries: &[(&str, i64)]) -> SettlementOrder {
        SettlementOrder {
            session_id: Uuid::new_v4(),
            entries: entries
                .iter()
                .map(|(id, delta)| PointsEntry {
                    participant_id: id.to_string(),
                    delta: *delta,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn victory_moves_points_and_updates_progress() {
        let (state, store) = test_state(RoundRules::default()).await;
        let mut rich = Profile::with_group(&["science"], 2);
        rich.points = 98;
        store.insert_profile("a", rich);

        settle(state, order(&[("a", 4), ("b", -2)])).await;

        let a = store.profile("a").unwrap();
        assert_eq!(a.points, 102);
        assert_eq!(a.level, 2);
        assert_eq!(a.quizzes_completed, 1);
        assert!(a.achievements.contains("Gold Master"));
        assert!(a.achievements.contains("First Quiz"));

        let b = store.profile("b").unwrap();
        assert_eq!(b.points, -2);
        assert_eq!(b.level, 1);
        assert_eq!(b.quizzes_completed, 1);
        assert!(b.achievements.contains("First Quiz"));
    }

    #[tokio::test]
    async fn draw_records_completion_without_moving_points() {
        let (state, store) = test_state(RoundRules::default()).await;
        settle(state, order(&[("a", 0), ("b", 0)])).await;

        for id in ["a", "b"] {
            let profile = store.profile(id).unwrap();
            assert_eq!(profile.points, 0);
            assert_eq!(profile.quizzes_completed, 1);
        }
    }

    #[tokio::test]
    async fn failing_participant_does_not_block_the_other() {
        let (state, store) = test_state(RoundRules::default()).await;
        settle(state, order(&[("ghost", 3), ("b", -2)])).await;

        assert!(store.profile("ghost").is_none());
        assert_eq!(store.profile("b").unwrap().points, -2);
    }

    #[tokio::test]
    async fn missing_store_skips_settlement() {
        let state = bare_state(RoundRules::default());
        settle(Arc::clone(&state), order(&[("a", 3)])).await;
        assert!(state.profile_store().await.is_none());
    }
}
