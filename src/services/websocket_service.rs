use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ClientMessage, IdentificationRequest, ServerMessage},
    error::ServiceError,
    services::{hint_service, lobby_service, matchmaking_service, round_service},
    state::{AppState, ParticipantConnection, SharedState},
};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);

/// The writer side of a participant connection has gone away.
#[derive(Debug, Error)]
#[error("connection closed")]
pub struct ConnectionClosed;

/// Handle the full lifecycle for an individual participant WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let initial_message = match tokio::time::timeout(IDENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!("websocket identification timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let identification = match ClientMessage::from_json_str(&initial_message) {
        Ok(ClientMessage::Identification(identification)) => identification,
        Ok(_) => {
            warn!("first message was not identification");
            let _ = send_message_to_websocket(
                &outbound_tx,
                &ServerMessage::error("identify before sending other events"),
            );
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Err(err) => {
            warn!(error = %err, "failed to parse or validate identification");
            let _ = send_message_to_websocket(&outbound_tx, &ServerMessage::error(err.to_string()));
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let participant_id = identification.participant_id.clone();
    let connection_id = register(&state, &identification, outbound_tx.clone()).await;

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                debug!(participant_id = %participant_id, payload = %text, "received message");

                let result = match ClientMessage::from_json_str(&text) {
                    Ok(message) => handle_message(&state, &participant_id, message).await,
                    Err(err) => Err(ServiceError::InvalidInput(err.to_string())),
                };
                if let Err(err) = result {
                    warn!(participant_id = %participant_id, error = %err, "message rejected");
                    let reply = ServerMessage::error(err.to_string());
                    if send_message_to_websocket(&outbound_tx, &reply).is_err() {
                        info!(
                            participant_id = %participant_id,
                            "connection closed while reporting an error"
                        );
                        break;
                    }
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(participant_id = %participant_id, "participant closed the connection");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(participant_id = %participant_id, error = %err, "websocket error");
                break;
            }
        }
    }

    unregister(&state, &participant_id, connection_id).await;
    finalize(writer_task, outbound_tx).await;
}

/// Bind the socket to the participant, replacing any previous socket of theirs.
async fn register(
    state: &SharedState,
    identification: &IdentificationRequest,
    tx: mpsc::UnboundedSender<Message>,
) -> Uuid {
    let participant_id = identification.participant_id.as_str();
    let connection_id = Uuid::new_v4();
    let previous = state.connections().insert(
        participant_id.to_string(),
        ParticipantConnection { connection_id, tx },
    );
    if let Some(previous) = previous {
        info!(participant_id = %participant_id, "replacing previous connection");
        let _ = previous.tx.send(Message::Close(None));
    }

    lobby_service::apply(state, |lobby| {
        lobby.connect(participant_id, &identification.display_name)
    })
    .await;
    connection_id
}

/// Release the participant unless a newer socket already took over their identity.
async fn unregister(state: &SharedState, participant_id: &str, connection_id: Uuid) {
    let owned = state
        .connections()
        .remove_if(participant_id, |_, connection| {
            connection.connection_id == connection_id
        })
        .is_some();
    if owned {
        lobby_service::apply(state, |lobby| lobby.disconnect(participant_id)).await;
        info!(participant_id = %participant_id, "participant disconnected");
    } else {
        debug!(participant_id = %participant_id, "superseded connection closed");
    }
}

/// Route one validated client event to the service owning it.
pub async fn handle_message(
    state: &SharedState,
    participant_id: &str,
    message: ClientMessage,
) -> Result<(), ServiceError> {
    match message {
        ClientMessage::Identification(_) => Err(ServiceError::InvalidState(
            "connection already identified".into(),
        )),
        ClientMessage::FindMatch(request) => {
            matchmaking_service::find_match(state, participant_id, &request.category).await
        }
        ClientMessage::CancelMatch => {
            matchmaking_service::cancel_match(state, participant_id).await;
            Ok(())
        }
        ClientMessage::SubmitAnswer(request) => {
            round_service::submit_answer(state, participant_id, request.session_id, request.answer)
                .await;
            Ok(())
        }
        ClientMessage::UseHint(request) => {
            hint_service::use_hint(state, participant_id, request.session_id).await
        }
        ClientMessage::Challenge(request) => {
            matchmaking_service::challenge(
                state,
                participant_id,
                &request.participant_id,
                &request.category,
            )
            .await;
            Ok(())
        }
        ClientMessage::AcceptChallenge(request) => {
            matchmaking_service::accept_challenge(state, participant_id, &request.challenger_id)
                .await
        }
        ClientMessage::DeclineChallenge(request) => {
            matchmaking_service::decline_challenge(state, participant_id, &request.challenger_id)
                .await;
            Ok(())
        }
        ClientMessage::Unknown => Err(ServiceError::InvalidInput("unknown event".into())),
    }
}

/// Queue `message` on the participant's writer, if they are connected.
pub fn send_to_participant(state: &AppState, participant_id: &str, message: &ServerMessage) {
    let Some(tx) = state
        .connections()
        .get(participant_id)
        .map(|connection| connection.tx.clone())
    else {
        debug!(participant_id = %participant_id, "participant not connected, message dropped");
        return;
    };

    if send_message_to_websocket(&tx, message).is_err() {
        debug!(participant_id = %participant_id, "send failed (writer closed)");
    }
}

/// Serialize a payload and push it onto the provided WebSocket sender.
///
/// Serialization failures are logged and swallowed; only a closed writer is reported.
fn send_message_to_websocket<T>(
    tx: &mpsc::UnboundedSender<Message>,
    value: &T,
) -> Result<(), ConnectionClosed>
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{value:?}`");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .map_err(|_| ConnectionClosed)
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
