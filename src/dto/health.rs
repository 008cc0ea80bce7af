use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Participants with a live connection.
    pub online_participants: usize,
    /// Sessions currently in progress.
    pub active_sessions: usize,
}

impl HealthResponse {
    /// Response for a server whose profile store answers its health checks.
    pub fn ok(online_participants: usize, active_sessions: usize) -> Self {
        Self {
            status: "ok".to_string(),
            online_participants,
            active_sessions,
        }
    }

    /// Response for a server running without a reachable profile store.
    pub fn degraded(online_participants: usize, active_sessions: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            ..Self::ok(online_participants, active_sessions)
        }
    }
}
