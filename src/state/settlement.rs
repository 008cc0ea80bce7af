use crate::state::session::{Participant, ParticipantId, SessionId};

/// Final standing of a two-player quiz.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// One participant scored strictly more.
    Victory {
        /// Higher score.
        winner: Participant,
        /// Lower score.
        loser: Participant,
    },
    /// Equal scores.
    Draw,
}

/// Winner has a strictly higher score; equal scores are a draw.
pub fn decide_outcome(first: &Participant, second: &Participant) -> Outcome {
    if first.score > second.score {
        Outcome::Victory {
            winner: first.clone(),
            loser: second.clone(),
        }
    } else if second.score > first.score {
        Outcome::Victory {
            winner: second.clone(),
            loser: first.clone(),
        }
    } else {
        Outcome::Draw
    }
}

/// Point change to apply to one participant's external balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointsEntry {
    /// Whose balance changes.
    pub participant_id: ParticipantId,
    /// Signed change to apply.
    pub delta: i64,
}

/// Persistence work to run after a session was released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementOrder {
    /// Session being settled.
    pub session_id: SessionId,
    /// One entry per participant, in seat order.
    pub entries: Vec<PointsEntry>,
}

impl SettlementOrder {
    /// Winner gains their in-session score, loser pays `loser_penalty`; a draw moves nothing.
    pub fn from_outcome(
        session_id: SessionId,
        outcome: &Outcome,
        participants: &[Participant],
        loser_penalty: u32,
    ) -> Self {
        let entries = participants
            .iter()
            .map(|participant| {
                let delta = match outcome {
                    Outcome::Victory { winner, .. } if winner.id == participant.id => {
                        i64::from(winner.score)
                    }
                    Outcome::Victory { loser, .. } if loser.id == participant.id => {
                        -i64::from(loser_penalty)
                    }
                    _ => 0,
                };
                PointsEntry {
                    participant_id: participant.id.clone(),
                    delta,
                }
            })
            .collect();
        Self {
            session_id,
            entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn scored(id: &str, score: u32) -> Participant {
        let mut participant = Participant::new(id, id.to_uppercase(), 1);
        participant.score = score;
        participant
    }

    #[test]
    fn higher_score_wins() {
        let a = scored("a", 2);
        let b = scored("b", 4);
        let outcome = decide_outcome(&a, &b);
        assert_eq!(
            outcome,
            Outcome::Victory {
                winner: b.clone(),
                loser: a.clone()
            }
        );

        let order = SettlementOrder::from_outcome(Uuid::nil(), &outcome, &[a, b], 2);
        assert_eq!(
            order.entries,
            vec![
                PointsEntry {
                    participant_id: "a".into(),
                    delta: -2
                },
                PointsEntry {
                    participant_id: "b".into(),
                    delta: 4
                },
            ]
        );
    }

    #[test]
    fn equal_scores_are_a_draw_without_deltas() {
        let a = scored("a", 5);
        let b = scored("b", 5);
        let outcome = decide_outcome(&a, &b);
        assert_eq!(outcome, Outcome::Draw);

        let order = SettlementOrder::from_outcome(Uuid::nil(), &outcome, &[a, b], 2);
        assert!(order.entries.iter().all(|entry| entry.delta == 0));
    }
}
