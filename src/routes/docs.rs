use axum::{Json, Router, routing::get};
use utoipa::{OpenApi, openapi::OpenApi as OpenApiDocument};
use utoipa_swagger_ui::SwaggerUi;

use crate::{services::documentation::ApiDoc, state::SharedState};

const OPENAPI_PATH: &str = "/api-doc/openapi.json";

/// Serve the Swagger UI plus the bare document for client generators.
pub fn router(state: SharedState) -> Router<SharedState> {
    let ui: Router<SharedState> = SwaggerUi::new("/docs")
        .url(OPENAPI_PATH, ApiDoc::openapi())
        .into();

    ui.route("/openapi.json", get(openapi_document))
        .with_state(state)
}

async fn openapi_document() -> Json<OpenApiDocument> {
    Json(ApiDoc::openapi())
}
