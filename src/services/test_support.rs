//! In-memory collaborators and channel-backed connections for service tests.

use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    config::RoundRules,
    dao::{
        profile_store::memory::{MemoryProfileStore, Profile},
        question_bank::{Question, QuestionKind, QuestionPool},
    },
    dto::ws::ServerMessage,
    services::lobby_service,
    state::{AppState, ParticipantConnection, SharedState, session::SessionId},
};

/// Participants known to the profile store built by [`test_state`].
const KNOWN: &[&str] = &["a", "b", "c", "d"];

/// State with ten science questions and no profile store installed.
pub fn bare_state(rules: RoundRules) -> SharedState {
    let questions = QuestionPool::from_questions((0..10).map(|index| Question {
        id: format!("science-{index}"),
        category: "science".into(),
        kind: QuestionKind::MultipleChoice,
        text: format!("science question {index}"),
        options: Some(vec![format!("answer {index}"), "nope".into()]),
        correct_answer: format!("answer {index}"),
    }));
    AppState::new(rules, Arc::new(questions))
}

/// [`bare_state`] plus an installed profile store where every known participant sits in skill
/// group 2 of science with two hints.
pub async fn test_state(rules: RoundRules) -> (SharedState, MemoryProfileStore) {
    let store = MemoryProfileStore::new();
    for id in KNOWN {
        let mut profile = Profile::with_group(&["science"], 2);
        profile.hints = 2;
        store.insert_profile(*id, profile);
    }

    let state = bare_state(rules);
    state.set_profile_store(Arc::new(store.clone())).await;
    state.update_degraded(false);
    (state, store)
}

/// Correct answer of the question currently open in `session_id`.
pub async fn correct_answer(state: &SharedState, session_id: SessionId) -> String {
    state
        .with_lobby(|lobby| {
            lobby
                .session(&session_id)
                .and_then(|session| session.current_question())
                .map(|question| question.correct_answer.clone())
        })
        .await
        .expect("a question is open")
}

/// Fake socket: registered like a real connection, reads what the writer would send.
pub struct TestClient {
    id: String,
    connection_id: Uuid,
    rx: mpsc::UnboundedReceiver<Message>,
}

impl TestClient {
    pub async fn connect(state: &SharedState, id: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection_id = Uuid::new_v4();
        state.connections().insert(
            id.to_string(),
            ParticipantConnection { connection_id, tx },
        );
        let display_name = id.to_uppercase();
        lobby_service::apply(state, |lobby| lobby.connect(id, &display_name)).await;

        let mut client = Self {
            id: id.to_string(),
            connection_id,
            rx,
        };
        assert!(matches!(client.next().await, ServerMessage::Identified(_)));
        client
    }

    /// Next event pushed to this participant.
    pub async fn next(&mut self) -> ServerMessage {
        loop {
            match self.rx.recv().await.expect("connection still open") {
                Message::Text(text) => {
                    return serde_json::from_str(text.as_str()).expect("valid server message");
                }
                _ => continue,
            }
        }
    }

    pub async fn disconnect(self, state: &SharedState) {
        let connection_id = self.connection_id;
        state
            .connections()
            .remove_if(&self.id, |_, connection| connection.connection_id == connection_id);
        lobby_service::apply(state, |lobby| lobby.disconnect(&self.id)).await;
    }
}
