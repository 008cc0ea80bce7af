use tracing::info;

use crate::{
    error::ServiceError,
    services::lobby_service,
    state::{SharedState, session::SkillGroup},
};

/// Resolve the participant's skill group for `category`, then pair or queue them.
///
/// A failed lookup aborts the request before the queue is touched.
pub async fn find_match(
    state: &SharedState,
    participant_id: &str,
    category: &str,
) -> Result<(), ServiceError> {
    let skill_group = lookup_group(state, participant_id, category).await?;
    lobby_service::apply(state, |lobby| {
        lobby.find_match(participant_id, category, skill_group, |id| {
            state.is_live(id)
        })
    })
    .await;
    Ok(())
}

/// Leave the matchmaking queue.
pub async fn cancel_match(state: &SharedState, participant_id: &str) {
    lobby_service::apply(state, |lobby| lobby.cancel_match(participant_id)).await;
}

/// Invite `target` to a quiz in `category`.
pub async fn challenge(state: &SharedState, challenger: &str, target: &str, category: &str) {
    lobby_service::apply(state, |lobby| lobby.challenge(challenger, target, category)).await;
}

/// Accept the pending challenge from `challenger`.
///
/// The session uses the challenger's skill group for the challenged category.
pub async fn accept_challenge(
    state: &SharedState,
    accepter: &str,
    challenger: &str,
) -> Result<(), ServiceError> {
    let category = state
        .with_lobby(|lobby| {
            lobby
                .pending_challenge(challenger, accepter)
                .map(str::to_string)
        })
        .await
        .ok_or_else(|| {
            ServiceError::NotFound(format!("no pending challenge from `{challenger}`"))
        })?;

    let skill_group = lookup_group(state, challenger, &category).await?;
    lobby_service::apply(state, |lobby| {
        lobby.accept_challenge(accepter, challenger, skill_group, |id| state.is_live(id))
    })
    .await;
    Ok(())
}

/// Turn down the pending challenge from `challenger`.
pub async fn decline_challenge(state: &SharedState, decliner: &str, challenger: &str) {
    lobby_service::apply(state, |lobby| lobby.decline_challenge(decliner, challenger)).await;
}

async fn lookup_group(
    state: &SharedState,
    participant_id: &str,
    category: &str,
) -> Result<SkillGroup, ServiceError> {
    let store = state.require_profile_store().await?;
    let skill_group = store
        .skill_group(participant_id, category)
        .await
        .map_err(|source| ServiceError::GroupLookup {
            category: category.to_string(),
            source,
        })?;
    info!(
        participant_id = %participant_id,
        category = %category,
        skill_group,
        "skill group resolved"
    );
    Ok(skill_group)
}
