/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Hint spending for open rounds.
pub mod hint_service;
/// Runs lobby handlers and delivers the effects they produce.
pub mod lobby_service;
/// Matchmaking queues and direct challenges.
pub mod matchmaking_service;
/// Presence queries.
pub mod presence_service;
/// Answers and timer callbacks for running sessions.
pub mod round_service;
/// Persists session outcomes to the profile store.
pub mod settlement_service;
/// Profile store connection supervisor.
pub mod storage_supervisor;
/// WebSocket connection and message handling service.
pub mod websocket_service;

#[cfg(test)]
mod test_support;
