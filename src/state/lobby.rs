//! Process-wide quiz state and the handlers that mutate it.
//!
//! Every handler runs to completion without suspending and returns an [`Outbox`] of effects for
//! the caller to carry out.

use std::collections::HashMap;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::RoundRules,
    dao::question_bank::QuestionBank,
    dto::ws::{
        ChallengeDeclinedPayload, ChallengeReceivedPayload, HintPayload, IdentifiedPayload,
        MatchFoundPayload, NewQuestionPayload, ParticipantSummary, ParticipantsPayload,
        QuizEndPayload, ResultsPayload, ServerMessage, summarize,
    },
    state::{
        matchmaking::{MatchmakingQueue, QueueKey},
        outbox::{Outbox, Timer, TimerAction},
        presence::PresenceTracker,
        session::{
            AnswerOutcome, Participant, ParticipantId, Session, SessionId, SessionStore,
            SkillGroup,
        },
        settlement::{Outcome, SettlementOrder, decide_outcome},
        state_machine::RoundPhase,
    },
};

const DRAW_MESSAGE: &str = "It's a draw!";
const OPPONENT_LEFT_MESSAGE: &str = "opponent left";
const ABORTED_MESSAGE: &str = "quiz aborted: no questions available";

/// Whether a hint request may go ahead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HintGate {
    /// A question is open and the participant is seated.
    Open,
    /// The session no longer exists; the request is dropped silently.
    Stale,
    /// The request is refused with the given client-facing reason.
    Denied(&'static str),
}

/// Owner of every session, waiting list, presence entry and pending challenge.
#[derive(Debug)]
pub struct Lobby {
    rules: RoundRules,
    sessions: SessionStore,
    queue: MatchmakingQueue,
    presence: PresenceTracker,
    /// Pending direct challenges keyed by `(challenger, target)`, valued by category.
    challenges: HashMap<(ParticipantId, ParticipantId), String>,
}

impl Lobby {
    /// Empty lobby playing by `rules`.
    pub fn new(rules: RoundRules) -> Self {
        Self {
            rules,
            sessions: SessionStore::default(),
            queue: MatchmakingQueue::default(),
            presence: PresenceTracker::default(),
            challenges: HashMap::new(),
        }
    }

    /// Who is online.
    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// Session by id, if it is still held.
    pub fn session(&self, session_id: &SessionId) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    /// Session `participant_id` belongs to.
    pub fn session_of(&self, participant_id: &str) -> Option<SessionId> {
        self.sessions.session_of(participant_id)
    }

    /// Sessions in progress or awaiting settlement.
    pub fn session_count(&self) -> usize {
        self.sessions.active_count()
    }

    /// Whether `participant_id` sits in a matchmaking queue.
    pub fn is_waiting(&self, participant_id: &str) -> bool {
        self.queue.waiting_in(participant_id).is_some()
    }

    /// Mark a freshly identified participant online.
    pub fn connect(&mut self, participant_id: &str, display_name: &str) -> Outbox {
        self.presence.add(participant_id, display_name);
        info!(participant_id = %participant_id, "participant online");
        Outbox::single(
            participant_id,
            ServerMessage::Identified(IdentifiedPayload {
                participant_id: participant_id.to_string(),
            }),
        )
    }

    /// Pair `requester` with the oldest live opponent waiting for the same category and skill
    /// group, or queue them.
    ///
    /// `is_live` reports whether a participant's connection can still be written to; dequeued
    /// opponents that fail it are discarded rather than put back.
    pub fn find_match(
        &mut self,
        requester: &str,
        category: &str,
        skill_group: SkillGroup,
        is_live: impl Fn(&str) -> bool,
    ) -> Outbox {
        let Some(display_name) = self.display_name(requester) else {
            debug!(participant_id = %requester, "matchmaking request from a participant who left");
            return Outbox::new();
        };
        let mut outbox = self.leave_abandoned_session(requester);
        if self.sessions.session_of(requester).is_some() {
            outbox.send(requester, ServerMessage::error("already in a quiz session"));
            return outbox;
        }

        let key = QueueKey::new(category, skill_group);
        match self.queue.waiting_in(requester) {
            Some(current) if *current == key => {
                outbox.send(requester, ServerMessage::FindingOpponent);
                return outbox;
            }
            Some(_) => {
                self.queue.remove(requester);
                debug!(participant_id = %requester, "replacing previous matchmaking request");
            }
            None => {}
        }

        while let Some(opponent_id) = self.queue.dequeue_opponent(&key) {
            let reachable =
                is_live(&opponent_id) && self.sessions.session_of(&opponent_id).is_none();
            let Some(opponent_name) = self.display_name(&opponent_id).filter(|_| reachable) else {
                warn!(
                    participant_id = %opponent_id,
                    category = %category,
                    skill_group,
                    "discarding unreachable opponent from queue"
                );
                continue;
            };

            outbox.extend(self.create_session(
                category,
                skill_group,
                [
                    Participant::new(opponent_id, opponent_name, skill_group),
                    Participant::new(requester, display_name, skill_group),
                ],
            ));
            return outbox;
        }

        self.queue.enqueue(requester, key);
        info!(
            participant_id = %requester,
            category = %category,
            skill_group,
            "waiting for an opponent"
        );
        outbox.send(requester, ServerMessage::FindingOpponent);
        outbox
    }

    /// Withdraw `participant_id` from matchmaking.
    pub fn cancel_match(&mut self, participant_id: &str) -> Outbox {
        if self.queue.remove(participant_id) {
            info!(participant_id = %participant_id, "matchmaking cancelled");
            Outbox::single(participant_id, ServerMessage::MatchCancelled)
        } else {
            Outbox::single(participant_id, ServerMessage::error("not waiting for a match"))
        }
    }

    fn create_session(
        &mut self,
        category: &str,
        skill_group: SkillGroup,
        seats: [Participant; 2],
    ) -> Outbox {
        let session_id = loop {
            let candidate = Uuid::new_v4();
            if self.sessions.get(&candidate).is_none() {
                break candidate;
            }
        };

        let mut outbox = Outbox::new();
        let mut session = Session::new(
            session_id,
            category,
            skill_group,
            self.rules.total_rounds,
            seats,
        );
        if let Err(err) = session.begin() {
            warn!(session_id = %session_id, error = %err, "failed to start session");
            return outbox;
        }

        let recipients = session.participant_ids();
        info!(
            session_id = %session_id,
            category = %category,
            skill_group,
            participants = ?recipients,
            "session created"
        );
        outbox.broadcast(
            &recipients,
            ServerMessage::MatchFound(MatchFoundPayload {
                session_id,
                category: category.to_string(),
                participants: summarize(session.participants()),
            }),
        );
        outbox.schedule(Timer {
            session_id,
            action: TimerAction::DispatchRound,
            version: session.version(),
            delay: self.rules.match_start_delay,
        });
        self.sessions.insert(session);
        outbox
    }

    /// Send the next question of `session_id`.
    ///
    /// Tries the session's category, then each fallback category. When nothing is available the
    /// dispatch is retried a bounded number of times before the session is aborted.
    pub fn dispatch_round(
        &mut self,
        session_id: SessionId,
        version: u64,
        bank: &dyn QuestionBank,
    ) -> Outbox {
        let mut outbox = Outbox::new();
        let Some(session) = self.sessions.get(&session_id) else {
            debug!(session_id = %session_id, "dispatch for a released session ignored");
            return outbox;
        };
        if session.version() != version
            || !matches!(
                session.phase(),
                RoundPhase::AwaitingStart | RoundPhase::Settling
            )
        {
            debug!(session_id = %session_id, phase = ?session.phase(), "stale dispatch ignored");
            return outbox;
        }
        if session.participant_count() < 2 {
            return self.release_abandoned(session_id);
        }

        let rules = &self.rules;
        let Some(session) = self.sessions.get_mut(&session_id) else {
            return outbox;
        };

        let recipients = session.participant_ids();
        let question = std::iter::once(session.category())
            .chain(
                rules
                    .fallback_categories
                    .iter()
                    .map(String::as_str)
                    .filter(|category| *category != session.category()),
            )
            .find_map(|category| {
                match bank.get_question(category, session.tier(), session.used_question_ids()) {
                    Ok(question) => Some(question),
                    Err(err) => {
                        warn!(session_id = %session_id, error = %err, "question lookup failed");
                        None
                    }
                }
            });

        match question {
            Some(question) => {
                let round = session.round_index() + 1;
                let payload =
                    NewQuestionPayload::new(session_id, round, session.total_rounds(), &question);
                if let Err(err) = session.dispatch(question) {
                    warn!(session_id = %session_id, error = %err, "failed to open round");
                    return outbox;
                }
                info!(session_id = %session_id, round, "question dispatched");
                outbox.broadcast(&recipients, ServerMessage::NewQuestion(payload));
                if let Some(timeout) = rules.answer_timeout {
                    outbox.schedule(Timer {
                        session_id,
                        action: TimerAction::AnswerTimeout,
                        version: session.version(),
                        delay: timeout,
                    });
                }
            }
            None => {
                let attempts = session.record_failed_dispatch();
                if attempts <= rules.question_dispatch_retries {
                    warn!(
                        session_id = %session_id,
                        attempts,
                        "no question available; retrying dispatch"
                    );
                    outbox.broadcast(
                        &recipients,
                        ServerMessage::error(format!(
                            "no question available for `{}`; retrying",
                            session.category()
                        )),
                    );
                    outbox.schedule(Timer {
                        session_id,
                        action: TimerAction::DispatchRound,
                        version,
                        delay: rules.question_retry_delay,
                    });
                    return outbox;
                }

                warn!(
                    session_id = %session_id,
                    attempts,
                    "no question available after retries; aborting"
                );
                if let Err(err) = session.abort() {
                    warn!(session_id = %session_id, error = %err, "failed to abort session");
                }
                let participants = summarize(session.participants());
                self.sessions.remove(&session_id);
                outbox.broadcast(
                    &recipients,
                    ServerMessage::QuizEnd(QuizEndPayload {
                        session_id,
                        winner_name: None,
                        loser_name: None,
                        draw_message: Some(ABORTED_MESSAGE.to_string()),
                        participants,
                    }),
                );
            }
        }
        outbox
    }

    /// Record an answer; the second distinct answer settles the round in the same step.
    pub fn submit_answer(
        &mut self,
        participant_id: &str,
        session_id: SessionId,
        answer: String,
    ) -> Outbox {
        let Some(session) = self.sessions.get_mut(&session_id) else {
            debug!(
                participant_id = %participant_id,
                session_id = %session_id,
                "answer for a released session ignored"
            );
            return Outbox::new();
        };

        // Everyone still seated has answered; after a departure that can be a single answer.
        let seated = session.participant_count();
        match session.record_answer(participant_id, answer) {
            AnswerOutcome::Recorded(count) if count >= seated => self.settle_round(session_id),
            AnswerOutcome::Recorded(_) => Outbox::new(),
            AnswerOutcome::NotAccepting => {
                debug!(
                    participant_id = %participant_id,
                    session_id = %session_id,
                    "answer outside an open round ignored"
                );
                Outbox::new()
            }
            AnswerOutcome::NotParticipant => Outbox::single(
                participant_id,
                ServerMessage::error("not a participant of this session"),
            ),
        }
    }

    /// Close the answer window of a round that is still open.
    pub fn answer_timeout(&mut self, session_id: SessionId, version: u64) -> Outbox {
        let answered = self
            .sessions
            .get(&session_id)
            .filter(|session| {
                session.version() == version && session.phase() == RoundPhase::QuestionActive
            })
            .map(Session::pending_answer_count);
        let Some(answered) = answered else {
            debug!(session_id = %session_id, "stale answer timeout ignored");
            return Outbox::new();
        };

        info!(session_id = %session_id, answered, "answer window closed; settling round");
        self.settle_round(session_id)
    }

    fn settle_round(&mut self, session_id: SessionId) -> Outbox {
        let mut outbox = Outbox::new();
        let Some(session) = self.sessions.get_mut(&session_id) else {
            return outbox;
        };
        let result = match session.settle() {
            Ok(result) => result,
            Err(err) => {
                warn!(session_id = %session_id, error = %err, "failed to settle round");
                return outbox;
            }
        };

        info!(
            session_id = %session_id,
            round = session.round_index(),
            final_round = result.final_round,
            "round settled"
        );
        outbox.broadcast(
            &session.participant_ids(),
            ServerMessage::Results(ResultsPayload::new(session_id, &result)),
        );

        let (action, delay) = if result.final_round {
            (TimerAction::Settle, self.rules.settlement_delay)
        } else {
            (TimerAction::DispatchRound, self.rules.round_transition_delay)
        };
        outbox.schedule(Timer {
            session_id,
            action,
            version: session.version(),
            delay,
        });
        outbox
    }

    /// Announce final standings, release the session and hand back the point changes to persist.
    pub fn settle_session(&mut self, session_id: SessionId, version: u64) -> Outbox {
        let mut outbox = Outbox::new();
        let completed = self.sessions.get(&session_id).is_some_and(|session| {
            session.version() == version && session.phase() == RoundPhase::Completed
        });
        if !completed {
            debug!(session_id = %session_id, "stale settlement ignored");
            return outbox;
        }
        let Some(session) = self.sessions.remove(&session_id) else {
            return outbox;
        };

        let participants = session.participants().cloned().collect::<Vec<_>>();
        let recipients = session.participant_ids();
        let summaries = summarize(&participants);
        let payload = match participants.as_slice() {
            [first, second] => {
                let outcome = decide_outcome(first, second);
                outbox.settlements.push(SettlementOrder::from_outcome(
                    session_id,
                    &outcome,
                    &participants,
                    self.rules.loser_penalty,
                ));
                match outcome {
                    Outcome::Victory { winner, loser } => {
                        info!(
                            session_id = %session_id,
                            winner = %winner.id,
                            loser = %loser.id,
                            "quiz finished"
                        );
                        QuizEndPayload {
                            session_id,
                            winner_name: Some(winner.display_name),
                            loser_name: Some(loser.display_name),
                            draw_message: None,
                            participants: summaries,
                        }
                    }
                    Outcome::Draw => {
                        info!(session_id = %session_id, "quiz finished in a draw");
                        QuizEndPayload {
                            session_id,
                            winner_name: None,
                            loser_name: None,
                            draw_message: Some(DRAW_MESSAGE.to_string()),
                            participants: summaries,
                        }
                    }
                }
            }
            _ => {
                info!(
                    session_id = %session_id,
                    "opponent left before the final round; no points moved"
                );
                opponent_left(session_id, summaries)
            }
        };

        outbox.broadcast(&recipients, ServerMessage::QuizEnd(payload));
        outbox
    }

    /// Forget everything tied to `participant_id` after their connection closed.
    pub fn disconnect(&mut self, participant_id: &str) -> Outbox {
        let mut outbox = Outbox::new();
        self.presence.remove(participant_id);
        if self.queue.remove(participant_id) {
            debug!(participant_id = %participant_id, "removed from matchmaking");
        }
        self.challenges.retain(|(challenger, target), _| {
            challenger != participant_id && target != participant_id
        });

        if let Some(departure) = self.sessions.remove_participant(participant_id) {
            if departure.settlement_pending {
                info!(
                    session_id = %departure.session_id,
                    participant_id = %participant_id,
                    "participant left after the final round; settlement still applies"
                );
            } else if departure.remaining.is_empty() {
                info!(session_id = %departure.session_id, "session released: everyone left");
            } else {
                info!(
                    session_id = %departure.session_id,
                    participant_id = %participant_id,
                    "participant left an active session"
                );
                let recipients = departure
                    .remaining
                    .iter()
                    .map(|participant| participant.id.clone())
                    .collect::<Vec<_>>();
                outbox.broadcast(
                    &recipients,
                    ServerMessage::Participants(ParticipantsPayload {
                        session_id: departure.session_id,
                        participants: summarize(&departure.remaining),
                    }),
                );
                let answered = self.sessions.get(&departure.session_id).is_some_and(|session| {
                    session.phase() == RoundPhase::QuestionActive
                        && session.pending_answer_count() >= session.participant_count()
                });
                if answered {
                    outbox.extend(self.settle_round(departure.session_id));
                }
            }
        }

        info!(participant_id = %participant_id, "participant offline");
        outbox
    }

    /// Invite an online, idle participant to a quiz in `category`.
    pub fn challenge(&mut self, challenger: &str, target: &str, category: &str) -> Outbox {
        let Some(challenger_name) = self.display_name(challenger) else {
            return Outbox::new();
        };
        let mut outbox = self.leave_abandoned_session(challenger);
        let refusal = if challenger == target {
            Some("cannot challenge yourself".to_string())
        } else if self.sessions.session_of(challenger).is_some() {
            Some("already in a quiz session".to_string())
        } else if !self.presence.is_online(target) {
            Some(format!("participant `{target}` is not online"))
        } else if self.is_engaged(target) {
            Some(format!("participant `{target}` is already in a quiz"))
        } else {
            None
        };
        if let Some(message) = refusal {
            outbox.send(challenger, ServerMessage::error(message));
            return outbox;
        }

        self.challenges.insert(
            (challenger.to_string(), target.to_string()),
            category.to_string(),
        );
        info!(challenger = %challenger, target = %target, category = %category, "challenge issued");
        outbox.send(
            target,
            ServerMessage::ChallengeReceived(ChallengeReceivedPayload {
                challenger_id: challenger.to_string(),
                challenger_name,
                category: category.to_string(),
            }),
        );
        outbox
    }

    /// Category of the pending challenge from `challenger` to `target`.
    pub fn pending_challenge(&self, challenger: &str, target: &str) -> Option<&str> {
        self.challenges
            .get(&(challenger.to_string(), target.to_string()))
            .map(String::as_str)
    }

    /// Turn an accepted challenge into a session, re-checking that both sides are still free.
    pub fn accept_challenge(
        &mut self,
        accepter: &str,
        challenger: &str,
        skill_group: SkillGroup,
        is_live: impl Fn(&str) -> bool,
    ) -> Outbox {
        let Some(category) = self
            .challenges
            .remove(&(challenger.to_string(), accepter.to_string()))
        else {
            return Outbox::single(
                accepter,
                ServerMessage::error(format!("no pending challenge from `{challenger}`")),
            );
        };
        let Some(accepter_name) = self.display_name(accepter) else {
            return Outbox::new();
        };
        let mut outbox = self.leave_abandoned_session(accepter);
        if self.sessions.session_of(accepter).is_some() {
            outbox.send(accepter, ServerMessage::error("already in a quiz session"));
            return outbox;
        }
        let challenger_name = self
            .display_name(challenger)
            .filter(|_| is_live(challenger) && !self.is_engaged(challenger));
        let Some(challenger_name) = challenger_name else {
            outbox.send(
                accepter,
                ServerMessage::error(format!("participant `{challenger}` is no longer available")),
            );
            return outbox;
        };
        outbox.extend(self.leave_abandoned_session(challenger));

        self.queue.remove(challenger);
        self.queue.remove(accepter);
        let involved = |id: &str| id == challenger || id == accepter;
        self.challenges
            .retain(|(from, to), _| !involved(from) && !involved(to));
        info!(challenger = %challenger, accepter = %accepter, "challenge accepted");

        outbox.extend(self.create_session(
            &category,
            skill_group,
            [
                Participant::new(challenger, challenger_name, skill_group),
                Participant::new(accepter, accepter_name, skill_group),
            ],
        ));
        outbox
    }

    /// Drop the pending challenge and let the challenger know.
    pub fn decline_challenge(&mut self, decliner: &str, challenger: &str) -> Outbox {
        if self
            .challenges
            .remove(&(challenger.to_string(), decliner.to_string()))
            .is_none()
        {
            return Outbox::single(
                decliner,
                ServerMessage::error(format!("no pending challenge from `{challenger}`")),
            );
        }
        info!(challenger = %challenger, decliner = %decliner, "challenge declined");
        Outbox::single(
            challenger,
            ServerMessage::ChallengeDeclined(ChallengeDeclinedPayload {
                participant_id: decliner.to_string(),
            }),
        )
    }

    /// Check that a hint can be spent before consuming one from the profile store.
    pub fn hint_gate(&self, participant_id: &str, session_id: SessionId) -> HintGate {
        match self.sessions.get(&session_id) {
            None => HintGate::Stale,
            Some(session) if !session.is_participant(participant_id) => {
                HintGate::Denied("not a participant of this session")
            }
            Some(session) if session.phase() != RoundPhase::QuestionActive => {
                HintGate::Denied("no question is open")
            }
            Some(_) => HintGate::Open,
        }
    }

    /// Reveal the next hint prefix to `participant_id`.
    pub fn reveal_hint(&mut self, participant_id: &str, session_id: SessionId) -> Outbox {
        let Some(session) = self.sessions.get_mut(&session_id) else {
            debug!(session_id = %session_id, "hint for a released session ignored");
            return Outbox::new();
        };
        match session.reveal_hint(participant_id) {
            Some(hint) => Outbox::single(
                participant_id,
                ServerMessage::Hint(HintPayload { session_id, hint }),
            ),
            None => {
                warn!(
                    participant_id = %participant_id,
                    session_id = %session_id,
                    "hint consumed but the round closed meanwhile"
                );
                Outbox::single(participant_id, ServerMessage::error("no question is open"))
            }
        }
    }

    fn display_name(&self, participant_id: &str) -> Option<String> {
        self.presence
            .entry(participant_id)
            .map(|entry| entry.display_name.clone())
    }

    /// Seated in a session that still has an opponent or is waiting for its settlement.
    fn is_engaged(&self, participant_id: &str) -> bool {
        self.sessions
            .session_of(participant_id)
            .and_then(|session_id| self.sessions.get(&session_id))
            .is_some_and(|session| {
                session.participant_count() >= 2 || session.phase() == RoundPhase::Completed
            })
    }

    /// Release `participant_id` from a session whose opponent already left, so they can play
    /// again without finishing the round alone.
    fn leave_abandoned_session(&mut self, participant_id: &str) -> Outbox {
        match self.sessions.session_of(participant_id) {
            Some(session_id) if !self.is_engaged(participant_id) => {
                self.release_abandoned(session_id)
            }
            _ => Outbox::new(),
        }
    }

    /// End a session that lost its opponent. No points move.
    fn release_abandoned(&mut self, session_id: SessionId) -> Outbox {
        let mut outbox = Outbox::new();
        let Some(session) = self.sessions.remove(&session_id) else {
            return outbox;
        };
        info!(session_id = %session_id, "session released: opponent left");
        outbox.broadcast(
            &session.participant_ids(),
            ServerMessage::QuizEnd(opponent_left(
                session_id,
                summarize(session.participants()),
            )),
        );
        outbox
    }
}

fn opponent_left(session_id: SessionId, participants: Vec<ParticipantSummary>) -> QuizEndPayload {
    QuizEndPayload {
        session_id,
        winner_name: None,
        loser_name: None,
        draw_message: Some(OPPONENT_LEFT_MESSAGE.to_string()),
        participants,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::dao::question_bank::{Question, QuestionKind, QuestionPool};

    fn question(category: &str, index: usize) -> Question {
        Question {
            id: format!("{category}-{index}"),
            category: category.into(),
            kind: QuestionKind::MultipleChoice,
            text: format!("{category} question {index}"),
            options: Some(vec![format!("right {index}"), "wrong".into()]),
            correct_answer: format!("right {index}"),
        }
    }

    fn pool(category: &str, count: usize) -> QuestionPool {
        QuestionPool::from_questions((0..count).map(|index| question(category, index)))
    }

    fn lobby_with(rules: RoundRules, ids: &[&str]) -> Lobby {
        let mut lobby = Lobby::new(rules);
        for id in ids {
            lobby.connect(id, &id.to_uppercase());
        }
        lobby
    }

    fn live(_: &str) -> bool {
        true
    }

    /// Pair `a` and `b` in science/2 and return the session id plus the first dispatch timer.
    fn paired(lobby: &mut Lobby) -> (SessionId, Timer) {
        lobby.find_match("a", "science", 2, live);
        let outbox = lobby.find_match("b", "science", 2, live);
        let session_id = lobby.session_of("a").unwrap();
        (session_id, outbox.timers[0].clone())
    }

    fn correct_answer(lobby: &Lobby, session_id: &SessionId) -> String {
        lobby
            .session(session_id)
            .and_then(Session::current_question)
            .map(|question| question.correct_answer.clone())
            .unwrap()
    }

    #[test]
    fn lone_requester_waits_then_pairs() {
        let mut lobby = lobby_with(RoundRules::default(), &["a", "b"]);

        let outbox = lobby.find_match("a", "science", 2, live);
        assert_eq!(outbox.messages_for("a"), vec![&ServerMessage::FindingOpponent]);
        assert!(outbox.messages_for("b").is_empty());
        assert!(lobby.is_waiting("a"));

        let outbox = lobby.find_match("b", "science", 2, live);
        let session_id = lobby.session_of("a").unwrap();
        assert_eq!(lobby.session_of("b"), Some(session_id));
        for id in ["a", "b"] {
            let messages = outbox.messages_for(id);
            assert_eq!(messages.len(), 1);
            assert!(matches!(
                messages[0],
                ServerMessage::MatchFound(payload) if payload.session_id == session_id
            ));
        }
        assert_eq!(
            outbox.timers,
            vec![Timer {
                session_id,
                action: TimerAction::DispatchRound,
                version: 1,
                delay: Duration::from_secs(5),
            }]
        );
        assert!(!lobby.is_waiting("a"));
    }

    #[test]
    fn pairing_is_fifo_within_one_queue() {
        let mut lobby = lobby_with(RoundRules::default(), &["a", "b", "c", "d"]);
        lobby.find_match("a", "science", 2, live);
        lobby.find_match("b", "science", 3, live);
        lobby.find_match("c", "science", 2, live);

        let session_id = lobby.session_of("a").unwrap();
        assert_eq!(lobby.session_of("c"), Some(session_id));
        assert!(lobby.is_waiting("b"));

        let outbox = lobby.find_match("d", "history", 2, live);
        assert_eq!(outbox.messages_for("d"), vec![&ServerMessage::FindingOpponent]);
    }

    #[test]
    fn unreachable_opponent_is_discarded() {
        let mut lobby = lobby_with(RoundRules::default(), &["a", "b"]);
        lobby.find_match("a", "science", 2, live);

        let outbox = lobby.find_match("b", "science", 2, |id| id != "a");
        assert_eq!(outbox.messages_for("b"), vec![&ServerMessage::FindingOpponent]);
        assert!(!lobby.is_waiting("a"));
        assert!(lobby.is_waiting("b"));
        assert_eq!(lobby.session_count(), 0);
    }

    #[test]
    fn repeated_requests_do_not_duplicate_entries() {
        let mut lobby = lobby_with(RoundRules::default(), &["a", "b"]);
        lobby.find_match("a", "science", 2, live);
        let outbox = lobby.find_match("a", "science", 2, live);
        assert_eq!(outbox.messages_for("a"), vec![&ServerMessage::FindingOpponent]);

        lobby.find_match("a", "history", 2, live);
        let outbox = lobby.find_match("b", "science", 2, live);
        assert_eq!(outbox.messages_for("b"), vec![&ServerMessage::FindingOpponent]);
        assert_eq!(lobby.session_count(), 0);
    }

    #[test]
    fn requests_from_seated_participants_fail() {
        let mut lobby = lobby_with(RoundRules::default(), &["a", "b"]);
        paired(&mut lobby);
        let outbox = lobby.find_match("a", "science", 2, live);
        assert!(matches!(outbox.messages_for("a")[..], [ServerMessage::Error(_)]));
    }

    #[test]
    fn cancel_removes_waiting_entry() {
        let mut lobby = lobby_with(RoundRules::default(), &["a"]);
        lobby.find_match("a", "science", 2, live);
        let outbox = lobby.cancel_match("a");
        assert_eq!(outbox.messages_for("a"), vec![&ServerMessage::MatchCancelled]);
        assert!(!lobby.is_waiting("a"));

        let outbox = lobby.cancel_match("a");
        assert!(matches!(outbox.messages_for("a")[..], [ServerMessage::Error(_)]));
    }

    #[test]
    fn all_correct_answers_end_in_a_draw_without_point_changes() {
        let bank = pool("science", 10);
        let mut lobby = lobby_with(RoundRules::default(), &["a", "b"]);
        let (session_id, mut timer) = paired(&mut lobby);

        for round in 1..=5 {
            let outbox = lobby.dispatch_round(session_id, timer.version, &bank);
            assert!(matches!(
                outbox.messages_for("a")[..],
                [ServerMessage::NewQuestion(payload)] if payload.round == round
            ));
            let answer = correct_answer(&lobby, &session_id);
            assert!(lobby.submit_answer("a", session_id, answer.clone()).is_empty());
            let outbox = lobby.submit_answer("b", session_id, answer);
            assert!(matches!(outbox.messages_for("b")[..], [ServerMessage::Results(_)]));
            timer = outbox.timers[0].clone();
        }

        assert_eq!(timer.action, TimerAction::Settle);
        let outbox = lobby.settle_session(session_id, timer.version);
        let [ServerMessage::QuizEnd(payload)] = outbox.messages_for("a")[..] else {
            panic!("expected quizEnd");
        };
        assert_eq!(payload.draw_message.as_deref(), Some(DRAW_MESSAGE));
        assert!(payload.participants.iter().all(|summary| summary.score == 5));
        assert_eq!(outbox.settlements.len(), 1);
        assert!(outbox.settlements[0].entries.iter().all(|entry| entry.delta == 0));

        assert!(lobby.session(&session_id).is_none());
        assert_eq!(lobby.session_of("a"), None);
        assert!(lobby.submit_answer("a", session_id, "x".into()).is_empty());
    }

    #[test]
    fn winner_gains_score_and_loser_pays_penalty() {
        let bank = pool("science", 10);
        let rules = RoundRules {
            total_rounds: 2,
            ..RoundRules::default()
        };
        let mut lobby = lobby_with(rules, &["a", "b"]);
        let (session_id, mut timer) = paired(&mut lobby);

        for _ in 0..2 {
            lobby.dispatch_round(session_id, timer.version, &bank);
            let answer = correct_answer(&lobby, &session_id);
            lobby.submit_answer("a", session_id, answer);
            let outbox = lobby.submit_answer("b", session_id, "nope".into());
            timer = outbox.timers[0].clone();
        }

        let outbox = lobby.settle_session(session_id, timer.version);
        let [ServerMessage::QuizEnd(payload)] = outbox.messages_for("b")[..] else {
            panic!("expected quizEnd");
        };
        assert_eq!(payload.winner_name.as_deref(), Some("A"));
        assert_eq!(payload.loser_name.as_deref(), Some("B"));
        let deltas = outbox.settlements[0]
            .entries
            .iter()
            .map(|entry| (entry.participant_id.as_str(), entry.delta))
            .collect::<Vec<_>>();
        assert_eq!(deltas, vec![("a", 2), ("b", -2)]);
    }

    #[test]
    fn duplicate_answers_do_not_settle_the_round() {
        let bank = pool("science", 3);
        let mut lobby = lobby_with(RoundRules::default(), &["a", "b"]);
        let (session_id, timer) = paired(&mut lobby);
        lobby.dispatch_round(session_id, timer.version, &bank);

        assert!(lobby.submit_answer("a", session_id, "one".into()).is_empty());
        assert!(lobby.submit_answer("a", session_id, "two".into()).is_empty());
        assert_eq!(
            lobby.session(&session_id).unwrap().pending_answer_count(),
            1
        );

        let outbox = lobby.submit_answer("b", session_id, "three".into());
        let [ServerMessage::Results(results)] = outbox.messages_for("a")[..] else {
            panic!("expected results");
        };
        assert_eq!(results.answers[0].answer.as_deref(), Some("two"));

        // A late third message lands on a settled round.
        assert!(lobby.submit_answer("a", session_id, "four".into()).is_empty());
    }

    #[test]
    fn outsiders_cannot_answer() {
        let bank = pool("science", 3);
        let mut lobby = lobby_with(RoundRules::default(), &["a", "b", "c"]);
        let (session_id, timer) = paired(&mut lobby);
        lobby.dispatch_round(session_id, timer.version, &bank);

        let outbox = lobby.submit_answer("c", session_id, "x".into());
        assert!(matches!(outbox.messages_for("c")[..], [ServerMessage::Error(_)]));
    }

    #[test]
    fn stale_timers_are_ignored() {
        let bank = pool("science", 3);
        let mut lobby = lobby_with(RoundRules::default(), &["a", "b"]);
        let (session_id, timer) = paired(&mut lobby);

        assert!(!lobby.dispatch_round(session_id, timer.version, &bank).is_empty());
        // Same ticket again: the session already moved on.
        assert!(lobby.dispatch_round(session_id, timer.version, &bank).is_empty());
        assert!(lobby.settle_session(session_id, timer.version).is_empty());
        assert!(lobby.dispatch_round(Uuid::new_v4(), 0, &bank).is_empty());
    }

    #[test]
    fn disconnect_mid_round_waits_for_the_opponent() {
        let bank = pool("science", 3);
        let mut lobby = lobby_with(RoundRules::default(), &["a", "b"]);
        let (session_id, timer) = paired(&mut lobby);
        lobby.dispatch_round(session_id, timer.version, &bank);
        lobby.submit_answer("a", session_id, "x".into());

        let outbox = lobby.disconnect("a");
        let [ServerMessage::Participants(payload)] = outbox.messages_for("b")[..] else {
            panic!("expected participants update");
        };
        assert_eq!(payload.participants.len(), 1);

        let session = lobby.session(&session_id).unwrap();
        assert_eq!(session.phase(), RoundPhase::QuestionActive);
        assert_eq!(session.pending_answer_count(), 0);
        assert!(!lobby.presence().is_online("a"));

        let outbox = lobby.disconnect("b");
        assert!(outbox.is_empty());
        assert!(lobby.session(&session_id).is_none());
    }

    #[test]
    fn loser_leaving_after_the_final_round_still_settles() {
        let bank = pool("science", 3);
        let rules = RoundRules {
            total_rounds: 1,
            ..RoundRules::default()
        };
        let mut lobby = lobby_with(rules, &["a", "b"]);
        let (session_id, timer) = paired(&mut lobby);
        lobby.dispatch_round(session_id, timer.version, &bank);
        let answer = correct_answer(&lobby, &session_id);
        lobby.submit_answer("a", session_id, answer);
        let outbox = lobby.submit_answer("b", session_id, "nope".into());
        let settle = outbox.timers[0].clone();

        let outbox = lobby.disconnect("b");
        assert!(outbox.messages_for("a").is_empty());
        assert_eq!(lobby.session_of("b"), None);

        let outbox = lobby.settle_session(session_id, settle.version);
        let [ServerMessage::QuizEnd(payload)] = outbox.messages_for("a")[..] else {
            panic!("expected quizEnd");
        };
        assert_eq!(payload.winner_name.as_deref(), Some("A"));
        assert_eq!(payload.loser_name.as_deref(), Some("B"));
        let deltas = outbox.settlements[0]
            .entries
            .iter()
            .map(|entry| (entry.participant_id.as_str(), entry.delta))
            .collect::<Vec<_>>();
        assert_eq!(deltas, vec![("a", 1), ("b", -2)]);
        assert_eq!(lobby.session_count(), 0);
    }

    #[test]
    fn survivor_answering_alone_finishes_without_points() {
        let bank = pool("science", 3);
        let rules = RoundRules {
            total_rounds: 1,
            ..RoundRules::default()
        };
        let mut lobby = lobby_with(rules, &["a", "b"]);
        let (session_id, timer) = paired(&mut lobby);
        lobby.dispatch_round(session_id, timer.version, &bank);
        lobby.disconnect("a");

        let outbox = lobby.submit_answer("b", session_id, "y".into());
        assert!(matches!(outbox.messages_for("b")[..], [ServerMessage::Results(_)]));
        let settle = outbox.timers[0].clone();

        let outbox = lobby.settle_session(session_id, settle.version);
        let [ServerMessage::QuizEnd(payload)] = outbox.messages_for("b")[..] else {
            panic!("expected quizEnd");
        };
        assert_eq!(payload.draw_message.as_deref(), Some(OPPONENT_LEFT_MESSAGE));
        assert!(outbox.settlements.is_empty());
        assert_eq!(lobby.session_count(), 0);
    }

    #[test]
    fn survivor_answer_settles_when_the_opponent_leaves() {
        let bank = pool("science", 5);
        let mut lobby = lobby_with(RoundRules::default(), &["a", "b"]);
        let (session_id, timer) = paired(&mut lobby);
        lobby.dispatch_round(session_id, timer.version, &bank);
        lobby.submit_answer("b", session_id, "y".into());

        let outbox = lobby.disconnect("a");
        let messages = outbox.messages_for("b");
        assert!(matches!(
            messages[..],
            [ServerMessage::Participants(_), ServerMessage::Results(_)]
        ));
        assert_eq!(outbox.timers[0].action, TimerAction::DispatchRound);
    }

    #[test]
    fn next_dispatch_releases_a_survivor() {
        let bank = pool("science", 5);
        let mut lobby = lobby_with(RoundRules::default(), &["a", "b"]);
        let (session_id, timer) = paired(&mut lobby);
        lobby.dispatch_round(session_id, timer.version, &bank);
        lobby.submit_answer("a", session_id, "x".into());
        let outbox = lobby.submit_answer("b", session_id, "y".into());
        let next = outbox.timers[0].clone();

        lobby.disconnect("a");
        let outbox = lobby.dispatch_round(session_id, next.version, &bank);
        let [ServerMessage::QuizEnd(payload)] = outbox.messages_for("b")[..] else {
            panic!("expected quizEnd");
        };
        assert_eq!(payload.draw_message.as_deref(), Some(OPPONENT_LEFT_MESSAGE));
        assert!(outbox.settlements.is_empty());
        assert!(outbox.timers.is_empty());
        assert_eq!(lobby.session_of("b"), None);

        let outbox = lobby.find_match("b", "science", 2, live);
        assert_eq!(outbox.messages_for("b"), vec![&ServerMessage::FindingOpponent]);
    }

    #[test]
    fn survivor_can_leave_mid_round_and_play_again() {
        let bank = pool("science", 5);
        let mut lobby = lobby_with(RoundRules::default(), &["a", "b", "c"]);
        let (session_id, timer) = paired(&mut lobby);
        lobby.dispatch_round(session_id, timer.version, &bank);
        lobby.disconnect("a");

        let outbox = lobby.find_match("b", "science", 2, live);
        let messages = outbox.messages_for("b");
        assert_eq!(messages.len(), 2);
        let ServerMessage::QuizEnd(payload) = messages[0] else {
            panic!("expected quizEnd");
        };
        assert_eq!(payload.draw_message.as_deref(), Some(OPPONENT_LEFT_MESSAGE));
        assert_eq!(messages[1], &ServerMessage::FindingOpponent);
        assert!(lobby.session(&session_id).is_none());
        assert!(lobby.is_waiting("b"));

        lobby.cancel_match("b");
        let outbox = lobby.challenge("c", "b", "science");
        assert!(matches!(
            outbox.messages_for("b")[..],
            [ServerMessage::ChallengeReceived(_)]
        ));
    }

    #[test]
    fn abandoned_participant_is_free_to_be_challenged() {
        let bank = pool("science", 5);
        let mut lobby = lobby_with(RoundRules::default(), &["a", "b", "c"]);
        let (session_id, timer) = paired(&mut lobby);
        lobby.dispatch_round(session_id, timer.version, &bank);
        lobby.disconnect("a");

        lobby.challenge("c", "b", "science");
        let outbox = lobby.accept_challenge("b", "c", 2, live);
        let quiz_end = outbox
            .messages_for("b")
            .into_iter()
            .any(|message| matches!(message, ServerMessage::QuizEnd(_)));
        assert!(quiz_end);
        let new_session = lobby.session_of("b").unwrap();
        assert_ne!(new_session, session_id);
        assert_eq!(lobby.session_of("c"), Some(new_session));
    }

    #[test]
    fn dispatch_falls_back_to_other_categories() {
        let bank = pool("general", 2);
        let rules = RoundRules {
            fallback_categories: vec!["general".into()],
            ..RoundRules::default()
        };
        let mut lobby = lobby_with(rules, &["a", "b"]);
        let (session_id, timer) = paired(&mut lobby);

        let outbox = lobby.dispatch_round(session_id, timer.version, &bank);
        assert!(matches!(outbox.messages_for("a")[..], [ServerMessage::NewQuestion(_)]));
    }

    #[test]
    fn exhausted_bank_retries_then_aborts() {
        let bank = pool("science", 1);
        let rules = RoundRules {
            total_rounds: 3,
            question_dispatch_retries: 1,
            ..RoundRules::default()
        };
        let mut lobby = lobby_with(rules, &["a", "b"]);
        let (session_id, timer) = paired(&mut lobby);
        lobby.dispatch_round(session_id, timer.version, &bank);
        lobby.submit_answer("a", session_id, "x".into());
        let outbox = lobby.submit_answer("b", session_id, "y".into());
        let next = outbox.timers[0].clone();

        let outbox = lobby.dispatch_round(session_id, next.version, &bank);
        assert!(matches!(outbox.messages_for("a")[..], [ServerMessage::Error(_)]));
        assert_eq!(outbox.timers.len(), 1);
        assert_eq!(outbox.timers[0].version, next.version);
        assert_eq!(outbox.timers[0].delay, Duration::from_secs(2));

        let outbox = lobby.dispatch_round(session_id, next.version, &bank);
        let [ServerMessage::QuizEnd(payload)] = outbox.messages_for("b")[..] else {
            panic!("expected quizEnd");
        };
        assert_eq!(payload.draw_message.as_deref(), Some(ABORTED_MESSAGE));
        assert!(outbox.settlements.is_empty());
        assert!(lobby.session(&session_id).is_none());
    }

    #[test]
    fn answer_timeout_scores_missing_answers_incorrect() {
        let bank = pool("science", 3);
        let rules = RoundRules {
            answer_timeout: Some(Duration::from_secs(20)),
            ..RoundRules::default()
        };
        let mut lobby = lobby_with(rules, &["a", "b"]);
        let (session_id, timer) = paired(&mut lobby);
        let outbox = lobby.dispatch_round(session_id, timer.version, &bank);
        let timeout = outbox.timers[0].clone();
        assert_eq!(timeout.action, TimerAction::AnswerTimeout);

        let answer = correct_answer(&lobby, &session_id);
        lobby.submit_answer("a", session_id, answer);
        let outbox = lobby.answer_timeout(session_id, timeout.version);
        let [ServerMessage::Results(results)] = outbox.messages_for("a")[..] else {
            panic!("expected results");
        };
        assert!(results.answers[0].correct);
        assert_eq!(results.answers[1].answer, None);
        assert!(!results.answers[1].correct);

        assert!(lobby.answer_timeout(session_id, timeout.version).is_empty());
    }

    #[test]
    fn challenges_create_sessions_or_notify_refusals() {
        let mut lobby = lobby_with(RoundRules::default(), &["a", "b", "c"]);

        let outbox = lobby.challenge("a", "ghost", "science");
        assert!(matches!(outbox.messages_for("a")[..], [ServerMessage::Error(_)]));

        let outbox = lobby.challenge("a", "b", "science");
        assert!(matches!(
            outbox.messages_for("b")[..],
            [ServerMessage::ChallengeReceived(payload)] if payload.challenger_name == "A"
        ));
        assert_eq!(lobby.pending_challenge("a", "b"), Some("science"));

        lobby.find_match("b", "history", 1, live);
        let outbox = lobby.accept_challenge("b", "a", 3, live);
        let session_id = lobby.session_of("a").unwrap();
        assert_eq!(lobby.session_of("b"), Some(session_id));
        assert!(!lobby.is_waiting("b"));
        assert!(matches!(
            outbox.messages_for("a")[..],
            [ServerMessage::MatchFound(payload)] if payload.category == "science"
        ));
        assert_eq!(lobby.pending_challenge("a", "b"), None);

        let outbox = lobby.challenge("c", "a", "science");
        assert!(matches!(outbox.messages_for("c")[..], [ServerMessage::Error(_)]));
    }

    #[test]
    fn declined_and_dropped_challenges() {
        let mut lobby = lobby_with(RoundRules::default(), &["a", "b"]);
        lobby.challenge("a", "b", "science");
        let outbox = lobby.decline_challenge("b", "a");
        assert!(matches!(
            outbox.messages_for("a")[..],
            [ServerMessage::ChallengeDeclined(payload)] if payload.participant_id == "b"
        ));

        lobby.challenge("a", "b", "science");
        lobby.disconnect("a");
        let outbox = lobby.accept_challenge("b", "a", 1, live);
        assert!(matches!(outbox.messages_for("b")[..], [ServerMessage::Error(_)]));
        assert_eq!(lobby.session_count(), 0);
    }

    #[test]
    fn hints_are_gated_on_an_open_round() {
        let bank = pool("science", 3);
        let mut lobby = lobby_with(RoundRules::default(), &["a", "b", "c"]);
        let (session_id, timer) = paired(&mut lobby);

        assert_eq!(
            lobby.hint_gate("a", session_id),
            HintGate::Denied("no question is open")
        );
        assert_eq!(lobby.hint_gate("a", Uuid::new_v4()), HintGate::Stale);

        lobby.dispatch_round(session_id, timer.version, &bank);
        assert_eq!(lobby.hint_gate("a", session_id), HintGate::Open);
        assert!(matches!(lobby.hint_gate("c", session_id), HintGate::Denied(_)));

        let outbox = lobby.reveal_hint("a", session_id);
        assert!(matches!(
            outbox.messages_for("a")[..],
            [ServerMessage::Hint(payload)] if payload.hint == "r"
        ));
    }
}
