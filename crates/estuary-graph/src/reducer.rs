use serde_json::Value;
use std::collections::HashMap;

/// How a node's value for one channel combines with existing state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergePolicy {
    /// Replace the current value (the default for undeclared channels)
    #[default]
    Overwrite,
    /// Concatenate onto the current list; order-independent across fan-out
    /// branches only when elements carry their own ordering key
    Append,
    /// List append where incoming `{"remove": id}` tombstones delete the
    /// matching element (by its `id` field) before remaining items append
    AppendWithTombstones,
}

/// Channel → merge policy table, supplied at graph construction.
#[derive(Debug, Clone, Default)]
pub struct MergePlan {
    policies: HashMap<String, MergePolicy>,
}

impl MergePlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(mut self, channel: impl Into<String>) -> Self {
        self.policies.insert(channel.into(), MergePolicy::Append);
        self
    }

    pub fn append_with_tombstones(mut self, channel: impl Into<String>) -> Self {
        self.policies
            .insert(channel.into(), MergePolicy::AppendWithTombstones);
        self
    }

    pub fn overwrite(mut self, channel: impl Into<String>) -> Self {
        self.policies.insert(channel.into(), MergePolicy::Overwrite);
        self
    }

    pub fn policy(&self, channel: &str) -> MergePolicy {
        self.policies.get(channel).copied().unwrap_or_default()
    }
}

/// Merge one incoming channel value into the current one.
pub(crate) fn merge_channel(
    current: Option<Value>,
    incoming: Value,
    policy: MergePolicy,
) -> Value {
    match policy {
        MergePolicy::Overwrite => incoming,
        MergePolicy::Append => {
            let mut items = as_list(current);
            match incoming {
                Value::Array(new_items) => items.extend(new_items),
                other => items.push(other),
            }
            Value::Array(items)
        }
        MergePolicy::AppendWithTombstones => {
            let mut items = as_list(current);
            let (tombstones, additions): (Vec<Value>, Vec<Value>) = match incoming {
                Value::Array(new_items) => new_items.into_iter().partition(is_tombstone),
                other => (Vec::new(), vec![other]),
            };

            // Removals apply before appends within the same update
            for tombstone in &tombstones {
                if let Some(id) = tombstone.get("remove").and_then(Value::as_str) {
                    items.retain(|item| item.get("id").and_then(Value::as_str) != Some(id));
                }
            }
            items.extend(additions);
            Value::Array(items)
        }
    }
}

fn as_list(value: Option<Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other],
    }
}

fn is_tombstone(value: &Value) -> bool {
    value
        .as_object()
        .map(|obj| obj.len() == 1 && obj.contains_key("remove"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_overwrite_replaces() {
        let merged = merge_channel(Some(json!("old")), json!("new"), MergePolicy::Overwrite);
        assert_eq!(merged, json!("new"));
    }

    #[test]
    fn test_append_concatenates_in_order() {
        let merged = merge_channel(
            Some(json!([1, 2])),
            json!([3, 4]),
            MergePolicy::Append,
        );
        assert_eq!(merged, json!([1, 2, 3, 4]));
    }

    #[test]
    fn test_append_starts_from_empty() {
        let merged = merge_channel(None, json!(["a"]), MergePolicy::Append);
        assert_eq!(merged, json!(["a"]));
    }

    #[test]
    fn test_tombstones_remove_before_append() {
        let current = json!([
            {"id": "m1", "content": "one"},
            {"id": "m2", "content": "two"}
        ]);
        let incoming = json!([
            {"remove": "m1"},
            {"id": "m3", "content": "three"}
        ]);

        let merged = merge_channel(
            Some(current),
            incoming,
            MergePolicy::AppendWithTombstones,
        );
        let items = merged.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["id"], "m2");
        assert_eq!(items[1]["id"], "m3");
    }

    #[test]
    fn test_tombstone_for_unknown_id_is_noop() {
        let merged = merge_channel(
            Some(json!([{"id": "m1"}])),
            json!([{"remove": "zz"}]),
            MergePolicy::AppendWithTombstones,
        );
        assert_eq!(merged.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_default_policy_is_overwrite() {
        let plan = MergePlan::new().append("chunk_summaries");
        assert_eq!(plan.policy("chunk_summaries"), MergePolicy::Append);
        assert_eq!(plan.policy("anything_else"), MergePolicy::Overwrite);
    }
}
