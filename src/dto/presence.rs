use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::dto::validation::validate_participant_id;

/// Participants currently holding a live connection.
#[derive(Debug, Serialize, ToSchema)]
pub struct PresenceListResponse {
    /// Online participant identifiers, sorted.
    pub participants: Vec<String>,
}

/// Presence of a single participant.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PresenceResponse {
    /// Participant asked about.
    pub participant_id: String,
    /// Whether they hold a live connection.
    pub online: bool,
    /// RFC 3339 timestamp of the current connection, when online.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
}

/// Path parameters of `/presence/{participant_id}`.
#[derive(Debug, Deserialize, IntoParams, Validate)]
#[into_params(parameter_in = Path)]
pub struct PresencePath {
    /// Participant identifier.
    #[validate(custom(function = "validate_participant_id"))]
    pub participant_id: String,
}
