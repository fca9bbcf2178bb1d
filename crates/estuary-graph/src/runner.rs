use crate::builder::{Edge, END, START};
use crate::error::GraphError;
use crate::node::{Branch, EventSender, Node, NodeOutput};
use crate::reducer::MergePlan;
use crate::snapshot::StateSnapshot;
use crate::state::StateStore;
use crate::update::Update;
use anyhow::{Context, Result};
use async_trait::async_trait;
use estuary_types::TraceEvent;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Done,
    Cancelled,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Done => "done",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
        }
    }
}

/// Handle to a spawned run: status observation and best-effort cancellation.
pub struct RunHandle {
    pub run_id: String,
    cancel: watch::Sender<bool>,
    status: watch::Receiver<RunStatus>,
}

impl RunHandle {
    pub fn status(&self) -> RunStatus {
        *self.status.borrow()
    }

    /// Stop scheduling new node invocations. In-flight branches are not
    /// awaited; there is no compensation.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// Wait for the run to reach a terminal status
    pub async fn finished(&self) -> RunStatus {
        let mut status = self.status.clone();
        loop {
            let current = *status.borrow();
            if current != RunStatus::Running {
                return current;
            }
            if status.changed().await.is_err() {
                return *status.borrow();
            }
        }
    }
}

/// An executable graph. Also usable as a node inside another graph, with
/// state translated at the boundary by explicit channel projection.
pub struct CompiledGraph {
    nodes: HashMap<String, Arc<dyn Node>>,
    edges: HashMap<String, Edge>,
    plan: MergePlan,
    input_channels: Option<Vec<String>>,
    output_channels: Option<Vec<String>>,
}

impl CompiledGraph {
    pub(crate) fn new(
        nodes: HashMap<String, Arc<dyn Node>>,
        edges: HashMap<String, Edge>,
        plan: MergePlan,
    ) -> Self {
        Self {
            nodes,
            edges,
            plan,
            input_channels: None,
            output_channels: None,
        }
    }

    /// Restrict the channels a nested invocation sees
    pub fn with_input_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_channels = Some(channels.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict the channels a nested invocation exports.
    ///
    /// Exported channels overwrite in the parent, so they should carry
    /// overwrite policy in the parent's merge plan.
    pub fn with_output_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_channels = Some(channels.into_iter().map(Into::into).collect());
        self
    }

    /// Spawn execution in the background, returning a handle plus the raw
    /// trace event receiver.
    pub fn spawn_run(
        self: &Arc<Self>,
        input: Update,
        conversation_id: impl Into<String>,
    ) -> (RunHandle, mpsc::Receiver<TraceEvent>) {
        let (tx, rx) = mpsc::channel(1000);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (status_tx, status_rx) = watch::channel(RunStatus::Running);

        let run_id = uuid::Uuid::new_v4().to_string();
        let conversation_id = conversation_id.into();
        let graph = Arc::clone(self);
        let task_run_id = run_id.clone();

        tokio::spawn(async move {
            let start = Instant::now();
            let _ = tx
                .send(TraceEvent::RunStarted {
                    run_id: task_run_id.clone(),
                    conversation_id,
                    timestamp: chrono::Utc::now().timestamp_millis(),
                })
                .await;

            let mut store = StateStore::new(graph.plan.clone());
            store.apply(input);

            let status = match graph.run_inner(&mut store, &tx, &cancel_rx).await {
                Ok(()) => RunStatus::Done,
                Err(e)
                    if matches!(
                        e.downcast_ref::<GraphError>(),
                        Some(GraphError::Cancelled)
                    ) =>
                {
                    tracing::info!(run_id = %task_run_id, "run cancelled");
                    RunStatus::Cancelled
                }
                Err(e) => {
                    tracing::error!(run_id = %task_run_id, "run failed: {:#}", e);
                    let _ = tx
                        .send(TraceEvent::RunError {
                            message: e.to_string(),
                            node: None,
                        })
                        .await;
                    RunStatus::Failed
                }
            };

            let _ = status_tx.send(status);
            let _ = tx
                .send(TraceEvent::RunFinished {
                    status: status.as_str().to_string(),
                    total_duration_ms: start.elapsed().as_millis() as u64,
                })
                .await;
        });

        (
            RunHandle {
                run_id,
                cancel: cancel_tx,
                status: status_rx,
            },
            rx,
        )
    }

    /// Cooperative driver loop for one run
    pub(crate) async fn run_inner(
        &self,
        store: &mut StateStore,
        events: &EventSender,
        cancel: &watch::Receiver<bool>,
    ) -> Result<()> {
        let mut current = self.advance(START, &store.snapshot())?;

        while current != END {
            if *cancel.borrow() {
                return Err(GraphError::Cancelled.into());
            }

            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| GraphError::UnknownNode(current.clone()))?;

            let _ = events
                .send(TraceEvent::NodeStarted {
                    node: current.clone(),
                })
                .await;
            let started = Instant::now();

            let output = node
                .run(&store.snapshot(), events)
                .await
                .with_context(|| format!("node '{}' failed", current))?;
            let duration_ms = started.elapsed().as_millis() as u64;

            current = match output {
                NodeOutput::Update(update) => {
                    store.apply(update);
                    let _ = events
                        .send(TraceEvent::NodeFinished {
                            node: current.clone(),
                            duration_ms,
                        })
                        .await;
                    self.advance(&current, &store.snapshot())?
                }
                NodeOutput::Spawn { update, branches } => {
                    store.apply(update);
                    let _ = events
                        .send(TraceEvent::NodeFinished {
                            node: current.clone(),
                            duration_ms,
                        })
                        .await;

                    let branch_node = match self.edges.get(&current) {
                        Some(Edge::FanOut { branch }) => branch.clone(),
                        _ => {
                            return Err(GraphError::UnexpectedSpawn {
                                node: current.clone(),
                            }
                            .into())
                        }
                    };

                    self.run_branches(&branch_node, branches, store, events)
                        .await?;
                    self.join_of(&branch_node)?
                }
            };
        }

        Ok(())
    }

    /// Execute fan-out branches concurrently and barrier on completion.
    ///
    /// Branch updates merge through the regular reducers; with no
    /// relative-ordering guarantee across siblings, fan-out channels must
    /// use order-independent policies.
    async fn run_branches(
        &self,
        branch_node: &str,
        branches: Vec<Branch>,
        store: &mut StateStore,
        events: &EventSender,
    ) -> Result<()> {
        if branches.is_empty() {
            return Ok(());
        }

        let node = self
            .nodes
            .get(branch_node)
            .cloned()
            .ok_or_else(|| GraphError::UnknownNode(branch_node.to_string()))?;

        let mut tasks = tokio::task::JoinSet::new();
        for branch in branches {
            if branch.destination != branch_node {
                return Err(GraphError::UndeclaredBranchTarget {
                    node: branch_node.to_string(),
                    destination: branch.destination,
                }
                .into());
            }

            let node = Arc::clone(&node);
            let events = events.clone();
            let seed = StateSnapshot::from_update(&branch.seed);
            let name = branch_node.to_string();

            tasks.spawn(async move {
                let _ = events.send(TraceEvent::NodeStarted { node: name.clone() }).await;
                let started = Instant::now();
                let output = node.run(&seed, &events).await;
                let _ = events
                    .send(TraceEvent::NodeFinished {
                        node: name,
                        duration_ms: started.elapsed().as_millis() as u64,
                    })
                    .await;
                output
            });
        }

        let mut updates = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let output = joined.context("fan-out branch task panicked")?;
            match output? {
                NodeOutput::Update(update) => updates.push(update),
                NodeOutput::Spawn { .. } => {
                    return Err(GraphError::UnexpectedSpawn {
                        node: branch_node.to_string(),
                    }
                    .into())
                }
            }
        }

        for update in updates {
            store.apply(update);
        }

        Ok(())
    }

    fn advance(&self, from: &str, snapshot: &StateSnapshot) -> Result<String, GraphError> {
        match self.edges.get(from) {
            Some(Edge::Plain(to)) => Ok(to.clone()),
            Some(Edge::Conditional { decide, routes }) => {
                let key = decide(snapshot);
                routes
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| GraphError::UnmappedBranch {
                        node: from.to_string(),
                        key,
                    })
            }
            // A fan-out producer that returned a plain update (or spawned
            // zero branches) proceeds straight to the join node
            Some(Edge::FanOut { branch }) => self.join_of(branch),
            None if from == START => Err(GraphError::MissingEntry),
            None => Err(GraphError::MissingEdge {
                node: from.to_string(),
            }),
        }
    }

    fn join_of(&self, branch_node: &str) -> Result<String, GraphError> {
        match self.edges.get(branch_node) {
            Some(Edge::Plain(to)) => Ok(to.clone()),
            _ => Err(GraphError::MissingJoin {
                node: branch_node.to_string(),
            }),
        }
    }
}

#[async_trait]
impl Node for CompiledGraph {
    async fn run(&self, state: &StateSnapshot, events: &EventSender) -> Result<NodeOutput> {
        let view = match &self.input_channels {
            Some(channels) => state.project(channels),
            None => state.clone(),
        };

        let mut store = StateStore::new(self.plan.clone());
        store.import(&view);

        // Nested runs are not individually cancellable; the parent stops
        // scheduling at its next node boundary.
        let (_cancel_guard, cancel) = watch::channel(false);
        self.run_inner(&mut store, events, &cancel).await?;

        let result = store.snapshot();
        let mut update = Update::new();
        match &self.output_channels {
            Some(channels) => {
                for channel in channels {
                    if let Some(value) = result.raw(channel) {
                        update = update.set(channel.clone(), value.clone());
                    }
                }
            }
            None => {
                for (channel, value) in result.iter() {
                    update = update.set(channel.clone(), value.clone());
                }
            }
        }

        Ok(NodeOutput::Update(update))
    }
}
