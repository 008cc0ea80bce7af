//! Library crate for quiz-duel-back, exposing modules for binaries and integration tests.

mod config;
/// Profile and question collaborators.
pub mod dao;
mod dto;
mod error;
/// HTTP and WebSocket routes.
pub mod routes;
/// Operations behind the routes.
pub mod services;
/// Shared state and the lobby.
pub mod state;
