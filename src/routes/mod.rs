use axum::Router;

use crate::state::SharedState;

/// Swagger UI and the raw OpenAPI document.
pub mod docs;
/// `/healthcheck`.
pub mod health;
/// `/presence` queries.
pub mod presence;
/// `/ws` upgrade.
pub mod websocket;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(presence::router())
        .merge(websocket::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
