use tracing::debug;

use crate::{
    error::ServiceError,
    services::lobby_service,
    state::{SharedState, lobby::HintGate, session::SessionId},
};

/// Spend one hint and reveal the next prefix of the current answer.
///
/// The round is checked before the hint is consumed so a closed round never costs one.
pub async fn use_hint(
    state: &SharedState,
    participant_id: &str,
    session_id: SessionId,
) -> Result<(), ServiceError> {
    match state
        .with_lobby(|lobby| lobby.hint_gate(participant_id, session_id))
        .await
    {
        HintGate::Open => {}
        HintGate::Stale => {
            debug!(session_id = %session_id, "hint for a released session ignored");
            return Ok(());
        }
        HintGate::Denied(reason) => return Err(ServiceError::InvalidState(reason.into())),
    }

    let store = state.require_profile_store().await?;
    if !store.consume_hint(participant_id).await? {
        return Err(ServiceError::InvalidState("no hints available".into()));
    }

    lobby_service::apply(state, |lobby| lobby.reveal_hint(participant_id, session_id)).await;
    Ok(())
}
