use crate::error::GraphError;
use crate::node::Node;
use crate::reducer::MergePlan;
use crate::runner::CompiledGraph;
use crate::snapshot::StateSnapshot;
use std::collections::HashMap;
use std::sync::Arc;

pub const START: &str = "__start__";
pub const END: &str = "__end__";

pub(crate) type Decider = Arc<dyn Fn(&StateSnapshot) -> String + Send + Sync>;

pub(crate) enum Edge {
    Plain(String),
    Conditional {
        decide: Decider,
        routes: HashMap<String, String>,
    },
    FanOut {
        branch: String,
    },
}

/// Fluent construction of a graph plus its merge plan.
///
/// Compilation validates the wiring (edge targets exist, fan-out branches
/// have a join) so defects surface at build time, not mid-run.
pub struct GraphBuilder {
    nodes: HashMap<String, Arc<dyn Node>>,
    edges: HashMap<String, Edge>,
    plan: MergePlan,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            plan: MergePlan::new(),
        }
    }

    pub fn merge_plan(mut self, plan: MergePlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn add_node(mut self, name: impl Into<String>, node: impl Node + 'static) -> Self {
        self.nodes.insert(name.into(), Arc::new(node));
        self
    }

    /// Unconditional edge from → to (`to` may be END)
    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.insert(from.into(), Edge::Plain(to.into()));
        self
    }

    /// Conditional edge: `decide(state)` produces a key looked up in
    /// `routes`. An unmapped key at runtime aborts the run.
    pub fn add_conditional_edges<F, I, K, V>(
        mut self,
        from: impl Into<String>,
        decide: F,
        routes: I,
    ) -> Self
    where
        F: Fn(&StateSnapshot) -> String + Send + Sync + 'static,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let routes = routes
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.edges.insert(
            from.into(),
            Edge::Conditional {
                decide: Arc::new(decide),
                routes,
            },
        );
        self
    }

    /// Fan-out edge: the node at `from` returns `NodeOutput::Spawn` with
    /// branches targeting `branch`; the plain edge out of `branch` is the
    /// join node, which fires once after all branches complete.
    pub fn add_fanout(mut self, from: impl Into<String>, branch: impl Into<String>) -> Self {
        self.edges.insert(
            from.into(),
            Edge::FanOut {
                branch: branch.into(),
            },
        );
        self
    }

    pub fn compile(self) -> Result<CompiledGraph, GraphError> {
        let Self { nodes, edges, plan } = self;

        if !edges.contains_key(START) {
            return Err(GraphError::MissingEntry);
        }

        let known = |name: &str| name == END || nodes.contains_key(name);

        for (from, edge) in &edges {
            if from != START && !nodes.contains_key(from) {
                return Err(GraphError::UnknownNode(from.clone()));
            }
            match edge {
                Edge::Plain(to) => {
                    if !known(to) {
                        return Err(GraphError::UnknownNode(to.clone()));
                    }
                }
                Edge::Conditional { routes, .. } => {
                    for to in routes.values() {
                        if !known(to) {
                            return Err(GraphError::UnknownNode(to.clone()));
                        }
                    }
                }
                Edge::FanOut { branch } => {
                    if !nodes.contains_key(branch) {
                        return Err(GraphError::UnknownNode(branch.clone()));
                    }
                    // The branch node's join edge must exist and be plain
                    match edges.get(branch) {
                        Some(Edge::Plain(to)) if known(to) => {}
                        _ => {
                            return Err(GraphError::MissingJoin {
                                node: branch.clone(),
                            })
                        }
                    }
                }
            }
        }

        Ok(CompiledGraph::new(nodes, edges, plan))
    }
}
