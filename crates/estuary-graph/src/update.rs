use estuary_types::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One element of a message-channel update.
///
/// Tombstones (`Remove`) are applied before appends when the update is
/// merged, so a single update can drop old messages and append new ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageChange {
    Remove { remove: String },
    Push(Message),
}

/// Partial state produced by one node invocation.
///
/// An update is a list of (channel, value) entries; how each entry combines
/// with existing state is decided by the merge plan, not by the node.
#[derive(Debug, Clone, Default)]
pub struct Update {
    entries: Vec<(String, Value)>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a channel to a raw JSON value
    pub fn set(mut self, channel: impl Into<String>, value: Value) -> Self {
        self.entries.push((channel.into(), value));
        self
    }

    /// Set a channel to a serialized value.
    ///
    /// Serialization of the domain types used on channels cannot fail; a
    /// defect here degrades to a null entry rather than panicking.
    pub fn set_ser<T: Serialize>(self, channel: impl Into<String>, value: &T) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.set(channel, value)
    }

    /// Clear a channel (overwrite with null; snapshots read null as absent)
    pub fn clear(self, channel: impl Into<String>) -> Self {
        self.set(channel, Value::Null)
    }

    /// Append one message to the messages channel entry of this update
    pub fn push_message(self, channel: &str, message: Message) -> Self {
        self.push_change(channel, MessageChange::Push(message))
    }

    /// Tombstone a message by id
    pub fn remove_message(self, channel: &str, id: impl Into<String>) -> Self {
        self.push_change(channel, MessageChange::Remove { remove: id.into() })
    }

    fn push_change(mut self, channel: &str, change: MessageChange) -> Self {
        let value = serde_json::to_value(&change).unwrap_or(Value::Null);
        match self
            .entries
            .iter_mut()
            .find(|(c, v)| c == channel && v.is_array())
        {
            Some((_, Value::Array(items))) => items.push(value),
            _ => self
                .entries
                .push((channel.to_string(), Value::Array(vec![value]))),
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(String, Value)] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<(String, Value)> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use estuary_types::Role;

    #[test]
    fn test_message_change_shapes() {
        let push = MessageChange::Push(Message::user("hi").with_id("m1"));
        let json = serde_json::to_value(&push).unwrap();
        assert_eq!(json["id"], "m1");

        let remove = MessageChange::Remove {
            remove: "m1".to_string(),
        };
        let json = serde_json::to_value(&remove).unwrap();
        assert_eq!(json, serde_json::json!({"remove": "m1"}));
    }

    #[test]
    fn test_message_change_untagged_roundtrip() {
        let raw = serde_json::json!([
            {"remove": "m1"},
            {"id": "m2", "role": "assistant", "content": "ok"}
        ]);
        let changes: Vec<MessageChange> = serde_json::from_value(raw).unwrap();

        assert!(matches!(&changes[0], MessageChange::Remove { remove } if remove == "m1"));
        assert!(matches!(&changes[1], MessageChange::Push(m) if m.role == Role::Assistant));
    }

    #[test]
    fn test_push_and_remove_accumulate_in_one_entry() {
        let update = Update::new()
            .remove_message("messages", "m1")
            .push_message("messages", Message::system("summary").with_id("m9"));

        assert_eq!(update.entries().len(), 1);
        let (_, value) = &update.entries()[0];
        assert_eq!(value.as_array().map(Vec::len), Some(2));
    }
}
