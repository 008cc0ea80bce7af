use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Quiz Duel Back.
///
/// WebSocket events are listed as schemas; the `/ws` path only documents the upgrade.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::presence::list_online,
        crate::routes::presence::participant_status,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::presence::PresenceListResponse,
            crate::dto::presence::PresenceResponse,
            crate::dto::ws::IdentificationRequest,
            crate::dto::ws::FindMatchRequest,
            crate::dto::ws::SubmitAnswerRequest,
            crate::dto::ws::UseHintRequest,
            crate::dto::ws::ChallengeRequest,
            crate::dto::ws::ChallengeReplyRequest,
            crate::dto::ws::IdentifiedPayload,
            crate::dto::ws::MatchFoundPayload,
            crate::dto::ws::NewQuestionPayload,
            crate::dto::ws::ResultsPayload,
            crate::dto::ws::QuizEndPayload,
            crate::dto::ws::ParticipantsPayload,
            crate::dto::ws::HintPayload,
            crate::dto::ws::ChallengeReceivedPayload,
            crate::dto::ws::ChallengeDeclinedPayload,
            crate::dto::ws::ErrorPayload,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "presence", description = "Who is online"),
        (name = "quiz", description = "WebSocket quiz protocol"),
    )
)]
pub struct ApiDoc;
