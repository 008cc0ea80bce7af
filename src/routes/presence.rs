use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use validator::Validate;

use crate::{
    dto::presence::{PresenceListResponse, PresencePath, PresenceResponse},
    error::AppError,
    services::presence_service,
    state::SharedState,
};

/// Read-only presence endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/presence", get(list_online))
        .route("/presence/{participant_id}", get(participant_status))
}

/// List the participants currently connected.
#[utoipa::path(
    get,
    path = "/presence",
    tag = "presence",
    responses((status = 200, description = "Online participants", body = PresenceListResponse))
)]
pub async fn list_online(State(state): State<SharedState>) -> Json<PresenceListResponse> {
    Json(presence_service::online(&state).await)
}

/// Report whether one participant is connected.
#[utoipa::path(
    get,
    path = "/presence/{participant_id}",
    tag = "presence",
    params(PresencePath),
    responses(
        (status = 200, description = "Presence of the participant", body = PresenceResponse),
        (status = 400, description = "Malformed participant identifier")
    )
)]
pub async fn participant_status(
    State(state): State<SharedState>,
    Path(path): Path<PresencePath>,
) -> Result<Json<PresenceResponse>, AppError> {
    path.validate()?;
    Ok(Json(
        presence_service::status(&state, &path.participant_id).await,
    ))
}
