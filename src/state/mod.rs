pub mod lobby;
/// Matchmaking queues.
pub mod matchmaking;
/// Effects returned by lobby handlers.
pub mod outbox;
/// Who is online.
pub mod presence;
/// Quiz sessions and their seats.
pub mod session;
/// Final standings and point deltas.
pub mod settlement;
/// Round phase machine.
pub mod state_machine;

use std::sync::Arc;

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use uuid::Uuid;

use crate::{
    config::RoundRules,
    dao::{profile_store::ProfileStore, question_bank::QuestionBank},
    error::ServiceError,
    state::{lobby::Lobby, session::ParticipantId},
};

/// Shared handle passed to routes and services.
pub type SharedState = Arc<AppState>;

#[derive(Clone)]
/// Handle used to push messages to a connected participant.
pub struct ParticipantConnection {
    /// Distinguishes successive sockets of the same participant.
    pub connection_id: Uuid,
    /// Writer task queue for this socket.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Central application state: the lobby, live connections and external collaborators.
pub struct AppState {
    lobby: Mutex<Lobby>,
    connections: DashMap<ParticipantId, ParticipantConnection>,
    questions: Arc<dyn QuestionBank>,
    profile_store: RwLock<Option<Arc<dyn ProfileStore>>>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a profile store is installed.
    pub fn new(rules: RoundRules, questions: Arc<dyn QuestionBank>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            lobby: Mutex::new(Lobby::new(rules)),
            connections: DashMap::new(),
            questions,
            profile_store: RwLock::new(None),
            degraded: degraded_tx,
        })
    }

    /// The lobby lock. Holders must not await while it is held.
    pub fn lobby(&self) -> &Mutex<Lobby> {
        &self.lobby
    }

    /// Run `read` against the lobby and return its result.
    pub async fn with_lobby<T>(&self, read: impl FnOnce(&Lobby) -> T) -> T {
        let lobby = self.lobby.lock().await;
        read(&lobby)
    }

    /// Registry of open participant sockets.
    pub fn connections(&self) -> &DashMap<ParticipantId, ParticipantConnection> {
        &self.connections
    }

    /// Whether messages can still be written to `participant_id`.
    pub fn is_live(&self, participant_id: &str) -> bool {
        self.connections
            .get(participant_id)
            .is_some_and(|connection| !connection.tx.is_closed())
    }

    /// Question bank rounds draw from.
    pub fn questions(&self) -> Arc<dyn QuestionBank> {
        self.questions.clone()
    }

    /// Obtain a handle to the current profile store, if one is installed.
    pub async fn profile_store(&self) -> Option<Arc<dyn ProfileStore>> {
        let guard = self.profile_store.read().await;
        guard.as_ref().cloned()
    }

    /// Profile store or [`ServiceError::Degraded`] when none is installed.
    pub async fn require_profile_store(&self) -> Result<Arc<dyn ProfileStore>, ServiceError> {
        self.profile_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new profile store implementation.
    pub async fn set_profile_store(&self, store: Arc<dyn ProfileStore>) {
        let mut guard = self.profile_store.write().await;
        *guard = Some(store);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }
}
