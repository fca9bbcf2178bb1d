use crate::update::Update;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Immutable view of run state handed to a node.
///
/// Channels holding JSON null read as absent, so nodes can clear a channel
/// by overwriting it with null and readers stay uniform.
#[derive(Debug, Clone, Default)]
pub struct StateSnapshot {
    channels: Arc<BTreeMap<String, Value>>,
}

impl StateSnapshot {
    pub(crate) fn new(channels: BTreeMap<String, Value>) -> Self {
        Self {
            channels: Arc::new(channels),
        }
    }

    /// Build a snapshot from a branch seed update (fan-out branch state)
    pub fn from_update(update: &Update) -> Self {
        let mut channels = BTreeMap::new();
        for (channel, value) in update.entries() {
            channels.insert(channel.clone(), value.clone());
        }
        Self::new(channels)
    }

    /// Raw channel value, including null
    pub fn raw(&self, channel: &str) -> Option<&Value> {
        self.channels.get(channel)
    }

    /// Channel value, with null read as absent
    pub fn get(&self, channel: &str) -> Option<&Value> {
        self.channels.get(channel).filter(|v| !v.is_null())
    }

    /// Typed read of a channel.
    ///
    /// Returns None when the channel is absent, null, or fails to
    /// deserialize; callers treat all three as "not populated".
    pub fn get_as<T: DeserializeOwned>(&self, channel: &str) -> Option<T> {
        self.get(channel)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Text channel shortcut
    pub fn text(&self, channel: &str) -> Option<&str> {
        self.get(channel).and_then(|v| v.as_str())
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.get(channel).is_some()
    }

    /// Restrict to the given channels (sub-graph input projection)
    pub fn project(&self, channels: &[String]) -> StateSnapshot {
        let projected = self
            .channels
            .iter()
            .filter(|(name, _)| channels.iter().any(|c| c == *name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Self::new(projected)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.channels.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_reads_as_absent() {
        let mut channels = BTreeMap::new();
        channels.insert("summary".to_string(), Value::Null);
        channels.insert("route".to_string(), Value::String("answer".into()));
        let snapshot = StateSnapshot::new(channels);

        assert!(!snapshot.contains("summary"));
        assert!(snapshot.raw("summary").is_some());
        assert_eq!(snapshot.text("route"), Some("answer"));
    }

    #[test]
    fn test_projection_drops_other_channels() {
        let mut channels = BTreeMap::new();
        channels.insert("a".to_string(), Value::from(1));
        channels.insert("b".to_string(), Value::from(2));
        let snapshot = StateSnapshot::new(channels);

        let projected = snapshot.project(&["a".to_string()]);
        assert!(projected.contains("a"));
        assert!(!projected.contains("b"));
    }
}
