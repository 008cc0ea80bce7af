use thiserror::Error;

/// Phases a quiz session moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    /// Session allocated, not yet announced.
    Idle,
    /// Both participants were told about the match; waiting for the first dispatch.
    AwaitingStart,
    /// A question is out and answers are being collected.
    QuestionActive,
    /// The last round was settled and its results broadcast; next dispatch pending.
    Settling,
    /// Every round was played (or the quiz was aborted); settlement pending.
    Completed,
}

/// Events that can be applied to the round state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundEvent {
    /// Match announced to both participants.
    Start,
    /// A question was selected and broadcast.
    Dispatch,
    /// Both answers are in (or the answer window closed); score the round.
    Settle,
    /// The final round was settled.
    Complete,
    /// The quiz cannot continue.
    Abort,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: RoundPhase,
    /// The event that cannot be applied from this phase.
    pub event: RoundEvent,
}

/// Per-session round state machine.
///
/// `version` increases on every applied transition. Timers capture it when they are scheduled
/// and compare on fire, so a callback scheduled for an earlier phase never acts on a later one.
#[derive(Debug, Clone)]
pub struct RoundStateMachine {
    phase: RoundPhase,
    version: u64,
}

impl Default for RoundStateMachine {
    fn default() -> Self {
        Self {
            phase: RoundPhase::Idle,
            version: 0,
        }
    }
}

impl RoundStateMachine {
    /// Create a new state machine initialised in the idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    /// Number of transitions applied so far.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Apply `event`, returning the new phase.
    pub fn apply(&mut self, event: RoundEvent) -> Result<RoundPhase, InvalidTransition> {
        let next = self.compute_transition(event)?;
        self.phase = next;
        self.version += 1;
        Ok(next)
    }

    /// Compute a transition from an event if the transition is valid.
    fn compute_transition(&self, event: RoundEvent) -> Result<RoundPhase, InvalidTransition> {
        let next = match (self.phase, event) {
            (RoundPhase::Idle, RoundEvent::Start) => RoundPhase::AwaitingStart,
            (RoundPhase::AwaitingStart, RoundEvent::Dispatch) => RoundPhase::QuestionActive,
            (RoundPhase::Settling, RoundEvent::Dispatch) => RoundPhase::QuestionActive,
            (RoundPhase::QuestionActive, RoundEvent::Settle) => RoundPhase::Settling,
            (RoundPhase::Settling, RoundEvent::Complete) => RoundPhase::Completed,
            (from, RoundEvent::Abort) if from != RoundPhase::Completed => RoundPhase::Completed,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}
