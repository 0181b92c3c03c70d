use std::collections::HashMap;
use std::sync::Mutex;

use stocky_core::dialogue::Turn;

/// Per-caller dialogue history, bounded to the most recent `max_turns`
/// turns with FIFO eviction. The leading system instruction is never stored
/// here; the completion client prepends it at send time, so eviction cannot
/// remove it.
///
/// A single mutex guards the map. It is held only for the map operation
/// itself, never across a network call, so an `append` is atomic per
/// identity. Two concurrent requests from the same caller may still
/// interleave their appends in either order; the resulting history order is
/// non-deterministic and accepted as such.
#[derive(Debug)]
pub struct ConversationStore {
    max_turns: usize,
    conversations: Mutex<HashMap<String, Vec<Turn>>>,
}

impl ConversationStore {
    pub fn new(max_turns: usize) -> Self {
        Self { max_turns, conversations: Mutex::new(HashMap::new()) }
    }

    /// Returns the stored turns for `identity` in append order, or an empty
    /// vector for an unseen identity.
    pub fn get(&self, identity: &str) -> Vec<Turn> {
        // Lock poisoning cannot leave the map half-updated; recover and serve.
        let conversations =
            self.conversations.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        conversations.get(identity).cloned().unwrap_or_default()
    }

    /// Appends `turns` in order, then truncates from the front so at most
    /// `max_turns` remain.
    pub fn append(&self, identity: &str, turns: impl IntoIterator<Item = Turn>) {
        let mut conversations =
            self.conversations.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let conversation = conversations.entry(identity.to_string()).or_default();
        conversation.extend(turns);

        if conversation.len() > self.max_turns {
            let excess = conversation.len() - self.max_turns;
            conversation.drain(..excess);
        }
    }

    /// Number of distinct caller identities currently held. Surfaced by the
    /// health endpoint.
    pub fn active_conversations(&self) -> usize {
        self.conversations.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use stocky_core::dialogue::Turn;

    use super::ConversationStore;

    fn contents(store: &ConversationStore, identity: &str) -> Vec<String> {
        store
            .get(identity)
            .into_iter()
            .map(|turn| turn.content.unwrap_or_default())
            .collect()
    }

    #[test]
    fn unseen_identity_returns_empty_history() {
        let store = ConversationStore::new(10);
        assert!(store.get("203.0.113.7").is_empty());
        assert_eq!(store.active_conversations(), 0);
    }

    #[test]
    fn append_then_get_preserves_order() {
        let store = ConversationStore::new(10);
        store.append("203.0.113.7", [Turn::user("first"), Turn::assistant("second")]);
        store.append("203.0.113.7", [Turn::user("third")]);

        assert_eq!(contents(&store, "203.0.113.7"), vec!["first", "second", "third"]);
    }

    #[test]
    fn evicts_oldest_turns_beyond_the_cap() {
        let store = ConversationStore::new(10);
        for index in 0..13 {
            store.append("203.0.113.7", [Turn::user(format!("turn-{index}"))]);
        }

        let stored = contents(&store, "203.0.113.7");
        assert_eq!(stored.len(), 10);
        assert_eq!(stored.first().map(String::as_str), Some("turn-3"));
        assert_eq!(stored.last().map(String::as_str), Some("turn-12"));
    }

    #[test]
    fn oversized_single_append_keeps_the_most_recent_turns() {
        let store = ConversationStore::new(3);
        store.append(
            "203.0.113.7",
            (0..5).map(|index| Turn::user(format!("turn-{index}"))),
        );

        assert_eq!(contents(&store, "203.0.113.7"), vec!["turn-2", "turn-3", "turn-4"]);
    }

    #[test]
    fn identities_are_isolated() {
        let store = ConversationStore::new(10);
        store.append("203.0.113.7", [Turn::user("from seven")]);
        store.append("203.0.113.8", [Turn::user("from eight")]);

        assert_eq!(contents(&store, "203.0.113.7"), vec!["from seven"]);
        assert_eq!(contents(&store, "203.0.113.8"), vec!["from eight"]);
        assert_eq!(store.active_conversations(), 2);
    }

    #[test]
    fn concurrent_appends_are_not_lost() {
        let store = Arc::new(ConversationStore::new(1000));
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for index in 0..50 {
                        store.append("203.0.113.7", [Turn::user(format!("{worker}-{index}"))]);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker should finish");
        }

        assert_eq!(store.get("203.0.113.7").len(), 400);
    }
}
