use tracing::debug;

use crate::{
    services::lobby_service,
    state::{
        SharedState,
        outbox::{Timer, TimerAction},
        session::SessionId,
    },
};

/// Record an answer for the open round of `session_id`.
pub async fn submit_answer(
    state: &SharedState,
    participant_id: &str,
    session_id: SessionId,
    answer: String,
) {
    lobby_service::apply(state, |lobby| {
        lobby.submit_answer(participant_id, session_id, answer)
    })
    .await;
}

/// Re-enter the lobby for an elapsed timer. Stale timers are dropped by the lobby.
pub async fn fire(state: &SharedState, timer: Timer) {
    debug!(session_id = %timer.session_id, action = ?timer.action, "timer fired");
    let questions = state.questions();
    lobby_service::apply(state, |lobby| match timer.action {
        TimerAction::DispatchRound => {
            lobby.dispatch_round(timer.session_id, timer.version, questions.as_ref())
        }
        TimerAction::AnswerTimeout => lobby.answer_timeout(timer.session_id, timer.version),
        TimerAction::Settle => lobby.settle_session(timer.session_id, timer.version),
    })
    .await;
}
