use crate::reducer::{merge_channel, MergePlan};
use crate::snapshot::StateSnapshot;
use crate::update::Update;
use serde_json::Value;
use std::collections::BTreeMap;

/// Holds one run's mutable state.
///
/// The store is owned by the run driver for the run's duration, so there
/// is a single writer. Every node output funnels through
/// [`StateStore::apply`], which
/// consults the merge plan per channel.
#[derive(Debug, Clone)]
pub struct StateStore {
    channels: BTreeMap<String, Value>,
    plan: MergePlan,
}

impl StateStore {
    pub fn new(plan: MergePlan) -> Self {
        Self {
            channels: BTreeMap::new(),
            plan,
        }
    }

    /// Apply one partial update through the per-channel reducers.
    ///
    /// Entries apply in order, so a later entry for the same channel sees
    /// the earlier one's effect.
    pub fn apply(&mut self, update: Update) {
        for (channel, value) in update.into_entries() {
            let policy = self.plan.policy(&channel);
            let current = self.channels.remove(&channel);
            self.channels
                .insert(channel, merge_channel(current, value, policy));
        }
    }

    /// Copy raw channels in from a snapshot (sub-graph input boundary)
    pub fn import(&mut self, snapshot: &StateSnapshot) {
        for (channel, value) in snapshot.iter() {
            self.channels.insert(channel.clone(), value.clone());
        }
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot::new(self.channels.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use estuary_types::Message;
    use serde_json::json;

    #[test]
    fn test_apply_ordered_append() {
        let mut store = StateStore::new(MergePlan::new().append("summaries"));
        store.apply(Update::new().set("summaries", json!(["a"])));
        store.apply(Update::new().set("summaries", json!(["b", "c"])));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.get("summaries").unwrap(), &json!(["a", "b", "c"]));
    }

    #[test]
    fn test_message_append_and_tombstone_removal() {
        let mut store = StateStore::new(MergePlan::new().append_with_tombstones("messages"));

        let first = Message::user("hello").with_id("m1");
        let second = Message::assistant("hi").with_id("m2");
        store.apply(
            Update::new()
                .push_message("messages", first)
                .push_message("messages", second),
        );

        store.apply(
            Update::new()
                .remove_message("messages", "m1")
                .push_message("messages", Message::system("summary").with_id("m3")),
        );

        let messages: Vec<Message> = store.snapshot().get_as("messages").unwrap();
        let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m2", "m3"]);
    }

    #[test]
    fn test_overwrite_with_null_clears() {
        let mut store = StateStore::new(MergePlan::new());
        store.apply(Update::new().set("summary", json!("old")));
        store.apply(Update::new().clear("summary"));

        assert!(!store.snapshot().contains("summary"));
    }
}
