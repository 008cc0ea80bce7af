use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::question_bank::{Question, QuestionKind},
    dto::validation::{validate_category, validate_participant_id},
    state::session::{Participant, RoundResult},
};

/// Error raised when an inbound frame cannot be accepted.
#[derive(Debug, Error)]
pub enum ClientMessageError {
    /// Not JSON, or not a known event shape.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Well-formed but failed field validation.
    #[error("invalid message: {0}")]
    Invalid(#[from] ValidationErrors),
}

#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
/// First frame a client must send to bind the connection to a participant.
pub struct IdentificationRequest {
    /// Stable identifier shared with the profile service.
    #[validate(custom(function = "validate_participant_id"))]
    pub participant_id: String,
    /// Name shown to opponents.
    #[validate(length(min = 1, max = 64))]
    pub display_name: String,
}

#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
/// Ask to be paired with an opponent of the same skill group in `category`.
pub struct FindMatchRequest {
    /// Question category to play.
    #[validate(custom(function = "validate_category"))]
    pub category: String,
}

#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
/// Answer for the question currently open in `session_id`.
pub struct SubmitAnswerRequest {
    /// Session the answer belongs to.
    pub session_id: Uuid,
    /// Free text or the chosen option.
    #[validate(length(max = 256))]
    pub answer: String,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Spend a hint on the question currently open in `session_id`.
pub struct UseHintRequest {
    /// Session holding the open question.
    pub session_id: Uuid,
}

#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
/// Challenge an online participant directly.
pub struct ChallengeRequest {
    /// Participant being challenged.
    #[validate(custom(function = "validate_participant_id"))]
    pub participant_id: String,
    /// Category of the proposed quiz.
    #[validate(custom(function = "validate_category"))]
    pub category: String,
}

#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
/// Answer to a pending challenge from `challenger_id`.
pub struct ChallengeReplyRequest {
    /// Participant who issued the challenge.
    #[validate(custom(function = "validate_participant_id"))]
    pub challenger_id: String,
}

#[derive(Debug, Deserialize, Serialize)]
/// Messages accepted from quiz WebSocket clients.
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Binds the socket; must come first.
    Identification(IdentificationRequest),
    /// Join the matchmaking queue.
    FindMatch(FindMatchRequest),
    /// Leave the matchmaking queue.
    CancelMatch,
    /// Answer the open question.
    SubmitAnswer(SubmitAnswerRequest),
    /// Reveal part of the current answer.
    UseHint(UseHintRequest),
    /// Invite someone directly.
    Challenge(ChallengeRequest),
    /// Start a session with the challenger.
    AcceptChallenge(ChallengeReplyRequest),
    /// Turn a challenge down.
    DeclineChallenge(ChallengeReplyRequest),
    /// Any event this server does not know.
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Parse and validate a text frame.
    pub fn from_json_str(text: &str) -> Result<Self, ClientMessageError> {
        let message: Self = serde_json::from_str(text)?;
        message.validate()?;
        Ok(message)
    }
}

impl Validate for ClientMessage {
    fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            Self::Identification(request) => request.validate(),
            Self::FindMatch(request) => request.validate(),
            Self::SubmitAnswer(request) => request.validate(),
            Self::Challenge(request) => request.validate(),
            Self::AcceptChallenge(request) | Self::DeclineChallenge(request) => request.validate(),
            Self::CancelMatch | Self::UseHint(_) | Self::Unknown => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
/// Public view of a seated participant.
pub struct ParticipantSummary {
    /// Participant identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Correct answers so far.
    pub score: u32,
}

impl From<&Participant> for ParticipantSummary {
    fn from(participant: &Participant) -> Self {
        Self {
            id: participant.id.clone(),
            name: participant.display_name.clone(),
            score: participant.score,
        }
    }
}

/// Summaries for every participant, in seat order.
pub fn summarize<'a>(
    participants: impl IntoIterator<Item = &'a Participant>,
) -> Vec<ParticipantSummary> {
    participants
        .into_iter()
        .map(ParticipantSummary::from)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Acknowledges a successful identification.
pub struct IdentifiedPayload {
    /// Identity the socket is now bound to.
    pub participant_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Sent to both participants when a session is created.
pub struct MatchFoundPayload {
    /// New session identifier.
    pub session_id: Uuid,
    /// Category every round is drawn from.
    pub category: String,
    /// Both seats, in seat order.
    pub participants: Vec<ParticipantSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// A new round's question. The correct answer is withheld.
pub struct NewQuestionPayload {
    /// Session the question belongs to.
    pub session_id: Uuid,
    /// One-based round number.
    pub round: u32,
    /// Rounds in the whole quiz.
    pub total_rounds: u32,
    /// Question text.
    pub question: String,
    /// Multiple choice or free text.
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    /// Choices for multiple choice questions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

impl NewQuestionPayload {
    /// Client view of `question` for the given round.
    pub fn new(session_id: Uuid, round: u32, total_rounds: u32, question: &Question) -> Self {
        Self {
            session_id,
            round,
            total_rounds,
            question: question.text.clone(),
            kind: question.kind,
            options: question.options.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// One participant's answer in a settled round.
pub struct AnswerSummary {
    /// Who answered.
    pub participant_id: String,
    /// Submitted answer, absent when none arrived in time.
    pub answer: Option<String>,
    /// Whether it matched the correct answer.
    pub correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Broadcast once a round is settled.
pub struct ResultsPayload {
    /// Settled session.
    pub session_id: Uuid,
    /// One entry per seated participant.
    pub answers: Vec<AnswerSummary>,
    /// The answer that scored.
    pub correct_answer: String,
    /// Standings after this round.
    pub participants: Vec<ParticipantSummary>,
}

impl ResultsPayload {
    /// Wire view of a settled round.
    pub fn new(session_id: Uuid, result: &RoundResult) -> Self {
        Self {
            session_id,
            answers: result
                .answers
                .iter()
                .map(|answer| AnswerSummary {
                    participant_id: answer.participant_id.clone(),
                    answer: answer.answer.clone(),
                    correct: answer.correct,
                })
                .collect(),
            correct_answer: result.correct_answer.clone(),
            participants: summarize(&result.participants),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Final standings once the quiz is over.
pub struct QuizEndPayload {
    /// Released session.
    pub session_id: Uuid,
    /// Set when someone won outright.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_name: Option<String>,
    /// Set together with `winner_name`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loser_name: Option<String>,
    /// Draw, abort or opponent-left notice when there is no winner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draw_message: Option<String>,
    /// Final standings.
    pub participants: Vec<ParticipantSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Updated seat list after someone left the session.
pub struct ParticipantsPayload {
    /// Session whose seats changed.
    pub session_id: Uuid,
    /// Remaining seats.
    pub participants: Vec<ParticipantSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Revealed prefix of the current answer.
pub struct HintPayload {
    /// Session holding the open question.
    pub session_id: Uuid,
    /// Leading characters of the answer.
    pub hint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Delivered to the challenged participant.
pub struct ChallengeReceivedPayload {
    /// Who sent the challenge.
    pub challenger_id: String,
    /// Their display name.
    pub challenger_name: String,
    /// Proposed category.
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Delivered to the challenger when the challenge is turned down.
pub struct ChallengeDeclinedPayload {
    /// Participant who declined.
    pub participant_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
/// Non-fatal error; the connection stays open.
pub struct ErrorPayload {
    /// Human-readable reason.
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Messages pushed to quiz WebSocket clients.
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Identification accepted.
    Identified(IdentifiedPayload),
    /// Queued; waiting for an opponent.
    FindingOpponent,
    /// Queue entry removed.
    MatchCancelled,
    /// A session was created.
    MatchFound(MatchFoundPayload),
    /// A round started.
    NewQuestion(NewQuestionPayload),
    /// A round was settled.
    Results(ResultsPayload),
    /// The quiz is over and the session released.
    QuizEnd(QuizEndPayload),
    /// Someone left the session.
    Participants(ParticipantsPayload),
    /// Hint for the open question.
    Hint(HintPayload),
    /// Someone challenged this participant.
    ChallengeReceived(ChallengeReceivedPayload),
    /// The challenged participant said no.
    ChallengeDeclined(ChallengeDeclinedPayload),
    /// Request refused.
    Error(ErrorPayload),
}

impl ServerMessage {
    /// Error event carrying `message`.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_client_messages() {
        let message = ClientMessage::from_json_str(
            r#"{"event":"findMatch","payload":{"category":"science"}}"#,
        )
        .unwrap();
        assert!(matches!(
            message,
            ClientMessage::FindMatch(FindMatchRequest { category }) if category == "science"
        ));

        let message = ClientMessage::from_json_str(r#"{"event":"cancelMatch"}"#).unwrap();
        assert!(matches!(message, ClientMessage::CancelMatch));
    }

    #[test]
    fn unknown_events_are_tolerated() {
        let message = ClientMessage::from_json_str(r#"{"event":"chatMessage"}"#).unwrap();
        assert!(matches!(message, ClientMessage::Unknown));
    }

    #[test]
    fn invalid_payloads_are_rejected() {
        let err = ClientMessage::from_json_str(
            r#"{"event":"identification","payload":{"participantId":"","displayName":"Ana"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ClientMessageError::Invalid(_)));

        let err = ClientMessage::from_json_str(
            r#"{"event":"findMatch","payload":{"category":"../etc"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ClientMessageError::Invalid(_)));

        let err = ClientMessage::from_json_str("not json").unwrap_err();
        assert!(matches!(err, ClientMessageError::Malformed(_)));
    }

    #[test]
    fn new_question_withholds_answer() {
        let question = Question {
            id: "q1".into(),
            category: "science".into(),
            kind: QuestionKind::MultipleChoice,
            text: "Red planet?".into(),
            options: Some(vec!["Mars".into(), "Venus".into()]),
            correct_answer: "Mars".into(),
        };
        let message =
            ServerMessage::NewQuestion(NewQuestionPayload::new(Uuid::nil(), 1, 5, &question));
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["event"], "newQuestion");
        assert_eq!(json["payload"]["type"], "multipleChoice");
        assert_eq!(json["payload"]["question"], "Red planet?");
        assert!(!json.to_string().contains("correct"));
    }

    #[test]
    fn unit_events_serialize_without_payload() {
        let json = serde_json::to_string(&ServerMessage::FindingOpponent).unwrap();
        assert_eq!(json, r#"{"event":"findingOpponent"}"#);
    }
}
