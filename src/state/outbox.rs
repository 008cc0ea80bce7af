use std::time::Duration;

use crate::{
    dto::ws::ServerMessage,
    state::{
        session::{ParticipantId, SessionId},
        settlement::SettlementOrder,
    },
};

/// Work a timer performs when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// Send the next question.
    DispatchRound,
    /// Close the answer window of the open round.
    AnswerTimeout,
    /// Announce final standings and release the session.
    Settle,
}

/// Deferred re-entry into the lobby.
///
/// `version` is the session's state machine version when the timer was scheduled; the timer is
/// stale if the session has moved on by the time it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timer {
    /// Session the timer belongs to.
    pub session_id: SessionId,
    /// What to do when it fires.
    pub action: TimerAction,
    /// Session version at scheduling time.
    pub version: u64,
    /// Time to wait before firing.
    pub delay: Duration,
}

/// Message addressed to a single participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Recipient.
    pub to: ParticipantId,
    /// Event to deliver.
    pub message: ServerMessage,
}

/// Side effects produced by a lobby handler. Messages are queued before the lobby lock is
/// released; timers and settlements run afterwards.
#[derive(Debug, Default)]
pub struct Outbox {
    /// Events to deliver, in order.
    pub messages: Vec<Envelope>,
    /// Timers to spawn.
    pub timers: Vec<Timer>,
    /// Profile updates to run in the background.
    pub settlements: Vec<SettlementOrder>,
}

impl Outbox {
    /// Outbox with nothing to do.
    pub fn new() -> Self {
        Self::default()
    }

    /// Outbox holding a single message.
    pub fn single(to: &str, message: ServerMessage) -> Self {
        let mut outbox = Self::new();
        outbox.send(to, message);
        outbox
    }

    /// Queue `message` for `to`.
    pub fn send(&mut self, to: &str, message: ServerMessage) {
        self.messages.push(Envelope {
            to: to.to_string(),
            message,
        });
    }

    /// Send the same message to every listed participant.
    pub fn broadcast<'a>(
        &mut self,
        recipients: impl IntoIterator<Item = &'a ParticipantId>,
        message: ServerMessage,
    ) {
        for to in recipients {
            self.send(to, message.clone());
        }
    }

    /// Queue a timer.
    pub fn schedule(&mut self, timer: Timer) {
        self.timers.push(timer);
    }

    /// Append everything `other` holds, after what is already queued.
    pub fn extend(&mut self, other: Outbox) {
        self.messages.extend(other.messages);
        self.timers.extend(other.timers);
        self.settlements.extend(other.settlements);
    }

    /// Whether the handler produced no effect at all.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.timers.is_empty() && self.settlements.is_empty()
    }

    /// Messages addressed to `participant_id`, in order.
    pub fn messages_for(&self, participant_id: &str) -> Vec<&ServerMessage> {
        self.messages
            .iter()
            .filter(|envelope| envelope.to == participant_id)
            .map(|envelope| &envelope.message)
            .collect()
    }
}
