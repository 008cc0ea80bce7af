use std::collections::{HashMap, VecDeque};

use crate::state::session::{ParticipantId, SkillGroup};

/// Queue selector: only participants with the same category and skill group are paired.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueKey {
    /// Requested category.
    pub category: String,
    /// Requester's skill group in that category.
    pub skill_group: SkillGroup,
}

impl QueueKey {
    /// Key for `category` at `skill_group`.
    pub fn new(category: impl Into<String>, skill_group: SkillGroup) -> Self {
        Self {
            category: category.into(),
            skill_group,
        }
    }
}

/// FIFO waiting lists, one per (category, skill group). Queues are independent of each other.
#[derive(Debug, Default)]
pub struct MatchmakingQueue {
    queues: HashMap<QueueKey, VecDeque<ParticipantId>>,
}

impl MatchmakingQueue {
    /// Append to the queue for `key` unless the participant is already waiting there.
    ///
    /// Returns whether a new entry was created.
    pub fn enqueue(&mut self, participant_id: &str, key: QueueKey) -> bool {
        let queue = self.queues.entry(key).or_default();
        if queue.iter().any(|waiting| waiting == participant_id) {
            return false;
        }
        queue.push_back(participant_id.to_string());
        true
    }

    /// Pop the longest-waiting participant for `key`.
    pub fn dequeue_opponent(&mut self, key: &QueueKey) -> Option<ParticipantId> {
        let queue = self.queues.get_mut(key)?;
        let opponent = queue.pop_front();
        if queue.is_empty() {
            self.queues.remove(key);
        }
        opponent
    }

    /// Remove the participant from every queue. Returns whether anything was removed.
    pub fn remove(&mut self, participant_id: &str) -> bool {
        let mut removed = false;
        self.queues.retain(|_, queue| {
            let before = queue.len();
            queue.retain(|waiting| waiting != participant_id);
            removed |= queue.len() != before;
            !queue.is_empty()
        });
        removed
    }

    /// Queue the participant is currently waiting in, if any.
    pub fn waiting_in(&self, participant_id: &str) -> Option<&QueueKey> {
        self.queues
            .iter()
            .find(|(_, queue)| queue.iter().any(|waiting| waiting == participant_id))
            .map(|(key, _)| key)
    }

    /// Number of participants waiting for `key`.
    pub fn waiting(&self, key: &QueueKey) -> usize {
        self.queues.get(key).map_or(0, VecDeque::len)
    }
}
