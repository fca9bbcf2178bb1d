use crate::snapshot::StateSnapshot;
use crate::update::Update;
use anyhow::Result;
use async_trait::async_trait;
use estuary_types::TraceEvent;
use tokio::sync::mpsc;

pub type EventSender = mpsc::Sender<TraceEvent>;

/// One concurrent branch invocation produced by a fan-out node.
///
/// The seed update is the branch's entire visible state; branches do not
/// see the parent run's channels.
#[derive(Debug, Clone)]
pub struct Branch {
    pub destination: String,
    pub seed: Update,
}

impl Branch {
    pub fn new(destination: impl Into<String>, seed: Update) -> Self {
        Self {
            destination: destination.into(),
            seed,
        }
    }
}

/// Tagged node result: a plain partial update, or dynamic fan-out.
pub enum NodeOutput {
    Update(Update),
    Spawn {
        update: Update,
        branches: Vec<Branch>,
    },
}

impl NodeOutput {
    /// Empty update shorthand for nodes with nothing to report
    pub fn empty() -> Self {
        NodeOutput::Update(Update::new())
    }
}

/// Core abstraction for a unit of work in the graph.
///
/// A compiled sub-graph implements this same interface, which is what makes
/// nesting uniform: the engine cannot tell a leaf node from a graph.
#[async_trait]
pub trait Node: Send + Sync {
    async fn run(&self, state: &StateSnapshot, events: &EventSender) -> Result<NodeOutput>;
}
