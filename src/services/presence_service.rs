use crate::{
    dto::{
        format_system_time,
        presence::{PresenceListResponse, PresenceResponse},
    },
    state::SharedState,
};

/// List every online participant.
pub async fn online(state: &SharedState) -> PresenceListResponse {
    let participants = state
        .with_lobby(|lobby| lobby.presence().online_ids())
        .await;
    PresenceListResponse { participants }
}

/// Report whether `participant_id` is online and since when.
pub async fn status(state: &SharedState, participant_id: &str) -> PresenceResponse {
    let since = state
        .with_lobby(|lobby| {
            lobby
                .presence()
                .entry(participant_id)
                .map(|entry| entry.since)
        })
        .await;

    PresenceResponse {
        participant_id: participant_id.to_string(),
        online: since.is_some(),
        since: since.map(format_system_time),
    }
}
