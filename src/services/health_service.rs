use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report degraded mode plus lobby occupancy, logging profile store issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_profile_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "profile store health check failed");
            }
        }
        Err(_) => warn!("profile store unavailable (degraded mode)"),
    }

    let (online, sessions) = state
        .with_lobby(|lobby| (lobby.presence().online_ids().len(), lobby.session_count()))
        .await;

    if state.is_degraded() {
        HealthResponse::degraded(online, sessions)
    } else {
        HealthResponse::ok(online, sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::RoundRules,
        services::test_support::{TestClient, bare_state, test_state},
    };

    #[tokio::test]
    async fn degraded_until_a_store_is_installed() {
        let state = bare_state(RoundRules::default());
        assert_eq!(health_status(&state).await.status, "degraded");

        let (state, _store) = test_state(RoundRules::default()).await;
        let _a = TestClient::connect(&state, "a").await;
        let response = health_status(&state).await;
        assert_eq!(response.status, "ok");
        assert_eq!(response.online_participants, 1);
        assert_eq!(response.active_sessions, 0);
    }
}
