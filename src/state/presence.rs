use std::{collections::HashMap, time::SystemTime};

use crate::state::session::ParticipantId;

/// Presence record for an online participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEntry {
    /// Name given at identification.
    pub display_name: String,
    /// When the current connection was established.
    pub since: SystemTime,
}

/// Tracks which participants currently hold a live connection.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    online: HashMap<ParticipantId, PresenceEntry>,
}

impl PresenceTracker {
    /// Mark `participant_id` online, restarting its connection time.
    pub fn add(&mut self, participant_id: &str, display_name: &str) {
        self.online.insert(
            participant_id.to_string(),
            PresenceEntry {
                display_name: display_name.to_string(),
                since: SystemTime::now(),
            },
        );
    }

    /// Mark `participant_id` offline. Returns whether they were online.
    pub fn remove(&mut self, participant_id: &str) -> bool {
        self.online.remove(participant_id).is_some()
    }

    /// Whether `participant_id` is connected.
    pub fn is_online(&self, participant_id: &str) -> bool {
        self.online.contains_key(participant_id)
    }

    /// Presence record of `participant_id`, if online.
    pub fn entry(&self, participant_id: &str) -> Option<&PresenceEntry> {
        self.online.get(participant_id)
    }

    /// Online participant identifiers, sorted for stable output.
    pub fn online_ids(&self) -> Vec<ParticipantId> {
        let mut ids = self.online.keys().cloned().collect::<Vec<_>>();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_connect_and_disconnect() {
        let mut presence = PresenceTracker::default();
        presence.add("b", "Ben");
        presence.add("a", "Ana");
        assert!(presence.is_online("a"));
        assert_eq!(presence.entry("b").unwrap().display_name, "Ben");
        assert_eq!(presence.online_ids(), vec!["a", "b"]);

        assert!(presence.remove("a"));
        assert!(!presence.remove("a"));
        assert!(!presence.is_online("a"));
    }
}
