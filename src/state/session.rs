use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use uuid::Uuid;

use crate::{
    dao::question_bank::{DifficultyTier, Question},
    state::state_machine::{InvalidTransition, RoundEvent, RoundPhase, RoundStateMachine},
};

/// Identifier of an authenticated participant, as provided by the identity layer.
pub type ParticipantId = String;
/// Identifier of a quiz session; unique for the lifetime of the process.
pub type SessionId = Uuid;
/// Skill bucket of a participant within a category.
pub type SkillGroup = u32;

/// A player seated in a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Stable participant identifier.
    pub id: ParticipantId,
    /// Name shown to the opponent.
    pub display_name: String,
    /// Skill group in the session's category.
    pub skill_group: SkillGroup,
    /// Correct answers in this session.
    pub score: u32,
    /// Prefix of the correct answer revealed through hints during the current round.
    pub current_answer: String,
}

impl Participant {
    /// Fresh seat with a zero score.
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        skill_group: SkillGroup,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            skill_group,
            score: 0,
            current_answer: String::new(),
        }
    }
}

/// How a participant fared in a settled round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundAnswer {
    /// Who answered.
    pub participant_id: ParticipantId,
    /// What they sent, if anything.
    pub answer: Option<String>,
    /// Whether it scored.
    pub correct: bool,
}

/// Outcome of a settled round. Broadcast once, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundResult {
    /// Answer of the settled question.
    pub correct_answer: String,
    /// One entry per seated participant.
    pub answers: Vec<RoundAnswer>,
    /// Seats after scoring.
    pub participants: Vec<Participant>,
    /// True when this was the last round and the session is now completed.
    pub final_round: bool,
}

/// Outcome of recording an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// Stored; carries the number of participants who have answered.
    Recorded(usize),
    /// The sender is not seated in this session.
    NotParticipant,
    /// No question is open for answers.
    NotAccepting,
}

/// A two-player quiz in progress.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    category: String,
    skill_group: SkillGroup,
    participants: IndexMap<ParticipantId, Participant>,
    total_rounds: u32,
    round_index: u32,
    machine: RoundStateMachine,
    current_question: Option<Question>,
    pending_answers: HashMap<ParticipantId, String>,
    used_question_ids: HashSet<String>,
    failed_dispatches: u32,
}

impl Session {
    /// New session in the idle phase with scores reset.
    pub fn new(
        id: SessionId,
        category: impl Into<String>,
        skill_group: SkillGroup,
        total_rounds: u32,
        participants: [Participant; 2],
    ) -> Self {
        Self {
            id,
            category: category.into(),
            skill_group,
            participants: participants
                .into_iter()
                .map(|mut participant| {
                    participant.score = 0;
                    (participant.id.clone(), participant)
                })
                .collect(),
            total_rounds,
            round_index: 0,
            machine: RoundStateMachine::new(),
            current_question: None,
            pending_answers: HashMap::new(),
            used_question_ids: HashSet::new(),
            failed_dispatches: 0,
        }
    }

    /// Session identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Category every question is drawn from.
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Question kinds this pair may receive.
    pub fn tier(&self) -> DifficultyTier {
        DifficultyTier::from_skill_group(self.skill_group)
    }

    /// Current round phase.
    pub fn phase(&self) -> RoundPhase {
        self.machine.phase()
    }

    /// Transition counter used to detect stale timers.
    pub fn version(&self) -> u64 {
        self.machine.version()
    }

    /// Rounds dispatched so far.
    pub fn round_index(&self) -> u32 {
        self.round_index
    }

    /// Rounds in the whole quiz.
    pub fn total_rounds(&self) -> u32 {
        self.total_rounds
    }

    /// Seated participants in seat order.
    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    /// Seated participant ids in seat order.
    pub fn participant_ids(&self) -> Vec<ParticipantId> {
        self.participants.keys().cloned().collect()
    }

    /// Seats still taken.
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// Whether `participant_id` holds a seat.
    pub fn is_participant(&self, participant_id: &str) -> bool {
        self.participants.contains_key(participant_id)
    }

    /// Questions already asked in this session.
    pub fn used_question_ids(&self) -> &HashSet<String> {
        &self.used_question_ids
    }

    /// Answers recorded for the open round.
    pub fn pending_answer_count(&self) -> usize {
        self.pending_answers.len()
    }

    /// Question of the open round.
    pub fn current_question(&self) -> Option<&Question> {
        self.current_question.as_ref()
    }

    /// Announce the session; moves it to `AwaitingStart`.
    pub fn begin(&mut self) -> Result<(), InvalidTransition> {
        self.machine.apply(RoundEvent::Start).map(|_| ())
    }

    /// Open the next round with `question`.
    pub fn dispatch(&mut self, question: Question) -> Result<(), InvalidTransition> {
        self.machine.apply(RoundEvent::Dispatch)?;
        self.used_question_ids.insert(question.id.clone());
        self.pending_answers.clear();
        for participant in self.participants.values_mut() {
            participant.current_answer.clear();
        }
        self.current_question = Some(question);
        self.failed_dispatches = 0;
        Ok(())
    }

    /// Count a failed question lookup for the pending round and return the running total.
    pub fn record_failed_dispatch(&mut self) -> u32 {
        self.failed_dispatches += 1;
        self.failed_dispatches
    }

    /// Store `answer` for `participant_id`, replacing any earlier answer this round.
    pub fn record_answer(&mut self, participant_id: &str, answer: String) -> AnswerOutcome {
        if !self.is_participant(participant_id) {
            return AnswerOutcome::NotParticipant;
        }
        if self.phase() != RoundPhase::QuestionActive {
            return AnswerOutcome::NotAccepting;
        }
        self.pending_answers
            .insert(participant_id.to_string(), answer);
        AnswerOutcome::Recorded(self.pending_answers.len())
    }

    /// Score the open round, clear it, and advance the round index.
    ///
    /// Participants without an answer are scored incorrect. When the last round is settled the
    /// session moves straight to `Completed`.
    pub fn settle(&mut self) -> Result<RoundResult, InvalidTransition> {
        self.machine.apply(RoundEvent::Settle)?;

        let correct_answer = self
            .current_question
            .take()
            .map(|question| question.correct_answer)
            .unwrap_or_default();
        let mut pending = std::mem::take(&mut self.pending_answers);

        let answers: Vec<RoundAnswer> = self
            .participants
            .values_mut()
            .map(|participant| {
                let answer = pending.remove(&participant.id);
                let correct = answer.as_deref() == Some(correct_answer.as_str());
                if correct {
                    participant.score += 1;
                }
                RoundAnswer {
                    participant_id: participant.id.clone(),
                    answer,
                    correct,
                }
            })
            .collect();

        self.round_index += 1;
        let final_round = self.round_index >= self.total_rounds;
        if final_round {
            self.machine.apply(RoundEvent::Complete)?;
        }

        Ok(RoundResult {
            correct_answer,
            answers,
            participants: self.participants.values().cloned().collect(),
            final_round,
        })
    }

    /// Stop the quiz without playing the remaining rounds.
    pub fn abort(&mut self) -> Result<(), InvalidTransition> {
        self.current_question = None;
        self.pending_answers.clear();
        self.machine.apply(RoundEvent::Abort).map(|_| ())
    }

    /// Reveal one more character of the correct answer to `participant_id`.
    ///
    /// Returns `None` when no question is open or the participant is not seated.
    pub fn reveal_hint(&mut self, participant_id: &str) -> Option<String> {
        if self.phase() != RoundPhase::QuestionActive {
            return None;
        }
        let correct = &self.current_question.as_ref()?.correct_answer;
        let participant = self.participants.get_mut(participant_id)?;
        let hint = next_hint(correct, &participant.current_answer);
        participant.current_answer = hint.clone();
        Some(hint)
    }

    /// Unseat `participant_id`, dropping their pending answer.
    fn remove_participant(&mut self, participant_id: &str) -> bool {
        self.pending_answers.remove(participant_id);
        self.participants.shift_remove(participant_id).is_some()
    }
}

/// Next hint prefix given what was already revealed.
///
/// The first hint is the first character; each later one extends the prefix by one character,
/// skipping over spaces. Saturates at the full answer.
pub fn next_hint(correct_answer: &str, revealed: &str) -> String {
    let chars = correct_answer.chars().collect::<Vec<_>>();
    let mut next = revealed.chars().count();
    if next == 0 {
        return chars.first().map(char::to_string).unwrap_or_default();
    }
    while next < chars.len() && chars[next] == ' ' {
        next += 1;
    }
    if next < chars.len() {
        chars[..=next].iter().collect()
    } else {
        correct_answer.to_string()
    }
}

/// Participant leaving a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    /// Session the participant was seated in.
    pub session_id: SessionId,
    /// Participants still seated; empty when the session was deleted.
    pub remaining: Vec<Participant>,
    /// The final round was already played. The seat is kept so the final standings still settle.
    pub settlement_pending: bool,
}

/// Active sessions plus the participant → session index that enforces one session per
/// participant.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<SessionId, Session>,
    membership: HashMap<ParticipantId, SessionId>,
}

impl SessionStore {
    /// Store `session` and seat its participants.
    pub fn insert(&mut self, session: Session) {
        for participant_id in session.participant_ids() {
            self.membership.insert(participant_id, session.id());
        }
        self.sessions.insert(session.id(), session);
    }

    /// Session by id.
    pub fn get(&self, session_id: &SessionId) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    /// Mutable session by id.
    pub fn get_mut(&mut self, session_id: &SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(session_id)
    }

    /// Delete a session and release its participants.
    pub fn remove(&mut self, session_id: &SessionId) -> Option<Session> {
        let session = self.sessions.remove(session_id)?;
        for participant in session.participants() {
            if self.membership.get(&participant.id) == Some(session_id) {
                self.membership.remove(&participant.id);
            }
        }
        Some(session)
    }

    /// Session the participant is currently seated in.
    pub fn session_of(&self, participant_id: &str) -> Option<SessionId> {
        self.membership.get(participant_id).copied()
    }

    /// Release a participant from their session; deletes the session when nobody is left.
    ///
    /// Once the session is `Completed` the participant only loses their membership: their seat
    /// and score stay until the session is settled.
    pub fn remove_participant(&mut self, participant_id: &str) -> Option<Departure> {
        let session_id = self.membership.remove(participant_id)?;
        let session = self.sessions.get_mut(&session_id)?;
        if session.phase() == RoundPhase::Completed {
            return Some(Departure {
                session_id,
                remaining: session.participants().cloned().collect(),
                settlement_pending: true,
            });
        }

        session.remove_participant(participant_id);
        let remaining = session.participants().cloned().collect::<Vec<_>>();
        if remaining.is_empty() {
            self.sessions.remove(&session_id);
        }
        Some(Departure {
            session_id,
            remaining,
            settlement_pending: false,
        })
    }

    /// Number of sessions still held.
    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::question_bank::QuestionKind;

    fn question(id: &str, answer: &str) -> Question {
        Question {
            id: id.into(),
            category: "science".into(),
            kind: QuestionKind::Input,
            text: format!("question {id}"),
            options: None,
            correct_answer: answer.into(),
        }
    }

    fn session(total_rounds: u32) -> Session {
        let mut session = Session::new(
            Uuid::new_v4(),
            "science",
            2,
            total_rounds,
            [Participant::new("a", "Ana", 2), Participant::new("b", "Ben", 2)],
        );
        session.begin().unwrap();
        session
    }

    #[test]
    fn resubmission_overwrites_previous_answer() {
        let mut session = session(5);
        session.dispatch(question("q1", "Mars")).unwrap();

        assert_eq!(
            session.record_answer("a", "Venus".into()),
            AnswerOutcome::Recorded(1)
        );
        assert_eq!(
            session.record_answer("a", "Mars".into()),
            AnswerOutcome::Recorded(1)
        );
        assert_eq!(session.pending_answer_count(), 1);

        session.record_answer("b", "Venus".into());
        let result = session.settle().unwrap();
        assert_eq!(result.answers[0].answer.as_deref(), Some("Mars"));
        assert!(result.answers[0].correct);
        assert!(!result.answers[1].correct);
        assert_eq!(session.pending_answer_count(), 0);
    }

    #[test]
    fn correctness_is_case_sensitive() {
        let mut session = session(5);
        session.dispatch(question("q1", "Mars")).unwrap();
        session.record_answer("a", "mars".into());
        session.record_answer("b", "Mars".into());

        let result = session.settle().unwrap();
        let scores = result
            .participants
            .iter()
            .map(|participant| participant.score)
            .collect::<Vec<_>>();
        assert_eq!(scores, vec![0, 1]);
    }

    #[test]
    fn answers_outside_active_round_are_rejected() {
        let mut session = session(5);
        assert_eq!(
            session.record_answer("a", "x".into()),
            AnswerOutcome::NotAccepting
        );
        session.dispatch(question("q1", "x")).unwrap();
        assert_eq!(
            session.record_answer("intruder", "x".into()),
            AnswerOutcome::NotParticipant
        );
    }

    #[test]
    fn final_settlement_completes_session() {
        let mut session = session(2);
        for (round, id) in ["q1", "q2"].into_iter().enumerate() {
            session.dispatch(question(id, "yes")).unwrap();
            session.record_answer("a", "yes".into());
            session.record_answer("b", "no".into());
            let result = session.settle().unwrap();
            assert_eq!(result.final_round, round == 1);
        }
        assert_eq!(session.phase(), RoundPhase::Completed);
        assert_eq!(session.round_index(), 2);
        assert_eq!(
            session.used_question_ids(),
            &HashSet::from(["q1".to_string(), "q2".to_string()])
        );
        assert!(session.dispatch(question("q3", "yes")).is_err());
    }

    #[test]
    fn hints_extend_one_character_skipping_spaces() {
        assert_eq!(next_hint("Blue whale", ""), "B");
        assert_eq!(next_hint("Blue whale", "B"), "Bl");
        assert_eq!(next_hint("Blue whale", "Blue"), "Blue w");
        assert_eq!(next_hint("Blue whale", "Blue whale"), "Blue whale");
        assert_eq!(next_hint("", ""), "");
    }

    #[test]
    fn hint_progress_resets_each_round() {
        let mut session = session(5);
        session.dispatch(question("q1", "Mars")).unwrap();
        assert_eq!(session.reveal_hint("a").as_deref(), Some("M"));
        assert_eq!(session.reveal_hint("a").as_deref(), Some("Ma"));
        session.record_answer("a", "Mars".into());
        session.record_answer("b", "Mars".into());
        session.settle().unwrap();
        assert_eq!(session.reveal_hint("a"), None);

        session.dispatch(question("q2", "Venus")).unwrap();
        assert_eq!(session.reveal_hint("a").as_deref(), Some("V"));
    }

    #[test]
    fn store_tracks_membership_and_departures() {
        let mut store = SessionStore::default();
        let session = session(5);
        let id = session.id();
        store.insert(session);
        assert_eq!(store.session_of("a"), Some(id));

        let departure = store.remove_participant("a").unwrap();
        assert_eq!(departure.remaining.len(), 1);
        assert_eq!(store.session_of("a"), None);
        assert!(store.get(&id).is_some());

        let departure = store.remove_participant("b").unwrap();
        assert!(departure.remaining.is_empty());
        assert_eq!(store.active_count(), 0);
        assert_eq!(store.remove_participant("b"), None);
    }

    #[test]
    fn completed_sessions_keep_departed_seats_until_settled() {
        let mut store = SessionStore::default();
        let mut session = session(1);
        session.dispatch(question("q1", "x")).unwrap();
        session.record_answer("a", "x".into());
        session.record_answer("b", "y".into());
        session.settle().unwrap();
        let id = session.id();
        store.insert(session);

        for id in ["a", "b"] {
            let departure = store.remove_participant(id).unwrap();
            assert!(departure.settlement_pending);
            assert_eq!(departure.remaining.len(), 2);
            assert_eq!(store.session_of(id), None);
        }
        let session = store.get(&id).unwrap();
        let scores = session
            .participants()
            .map(|participant| (participant.id.as_str(), participant.score))
            .collect::<Vec<_>>();
        assert_eq!(scores, vec![("a", 1), ("b", 0)]);

        store.remove(&id);
        assert_eq!(store.active_count(), 0);
    }

    #[test]
    fn departed_participant_answer_is_dropped() {
        let mut store = SessionStore::default();
        let mut session = session(5);
        session.dispatch(question("q1", "x")).unwrap();
        session.record_answer("a", "x".into());
        let id = session.id();
        store.insert(session);

        store.remove_participant("a");
        assert_eq!(store.get(&id).unwrap().pending_answer_count(), 0);
    }
}
