//! The orchestration engine.
//!
//! A [`Graph`] is an immutable topology: named nodes, fallback edges, an
//! entry point and an iteration ceiling. It is built once at start-up and
//! shared behind an `Arc`. Each run gets its own [`Execution`] cursor that
//! owns the run's state, so nothing about a run lives in the graph itself.
//!
//! One step executes exactly one node. The node's delta is merged into the
//! state, then the engine routes to the node the delta named (or the
//! node's fallback edge) until it reaches [`NodeId::END`].

use agentcanvas_core::error::{Error, Result, RunError};
use agentcanvas_core::memory::MemoryHandle;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::state::{ExecutionState, StateDelta, merge};

/// Name of a node in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Cow<'static, str>);

impl NodeId {
    pub const AGENT_TURN: NodeId = NodeId(Cow::Borrowed("call_agent"));
    pub const TOOL_TURN: NodeId = NodeId(Cow::Borrowed("execute_tools"));
    /// Terminal marker; never registered as a node.
    pub const END: NodeId = NodeId(Cow::Borrowed("__end__"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_end(&self) -> bool {
        *self == Self::END
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Run-scoped capabilities handed to every node.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub conversation_id: Uuid,
    /// Shared by every step of the run.
    pub memory: MemoryHandle,
}

#[async_trait]
pub trait Node: Send + Sync {
    async fn execute(&self, state: &ExecutionState, ctx: &RunContext) -> Result<StateDelta>;
}

/// Observable output of one step.
#[derive(Debug, Clone)]
pub struct StepEvent {
    /// 1-based step number within the run
    pub step: usize,
    pub node: NodeId,
    pub delta: StateDelta,
}

pub struct GraphBuilder {
    entry: NodeId,
    nodes: HashMap<NodeId, Arc<dyn Node>>,
    edges: HashMap<NodeId, NodeId>,
    recursion_limit: usize,
}

impl GraphBuilder {
    pub fn new(entry: NodeId) -> Self {
        Self {
            entry,
            nodes: HashMap::new(),
            edges: HashMap::new(),
            recursion_limit: 50,
        }
    }

    pub fn node(mut self, id: NodeId, node: Arc<dyn Node>) -> Self {
        self.nodes.insert(id, node);
        self
    }

    /// Route taken from `from` when its delta does not name a next node.
    pub fn edge(mut self, from: NodeId, to: NodeId) -> Self {
        self.edges.insert(from, to);
        self
    }

    pub fn recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub fn build(self) -> Result<Graph> {
        if !self.nodes.contains_key(&self.entry) {
            return Err(Error::Config {
                message: format!("graph entry node '{}' is not registered", self.entry),
            });
        }
        if self.recursion_limit == 0 {
            return Err(Error::Config {
                message: "graph recursion limit must be greater than zero".into(),
            });
        }
        for (from, to) in &self.edges {
            if !to.is_end() && !self.nodes.contains_key(to) {
                return Err(Error::Config {
                    message: format!("edge {from} -> {to} targets an unregistered node"),
                });
            }
        }
        Ok(Graph {
            entry: self.entry,
            nodes: self.nodes,
            edges: self.edges,
            recursion_limit: self.recursion_limit,
        })
    }
}

/// An immutable orchestration topology.
pub struct Graph {
    entry: NodeId,
    nodes: HashMap<NodeId, Arc<dyn Node>>,
    edges: HashMap<NodeId, NodeId>,
    recursion_limit: usize,
}

impl Graph {
    pub fn builder(entry: NodeId) -> GraphBuilder {
        GraphBuilder::new(entry)
    }

    pub fn recursion_limit(&self) -> usize {
        self.recursion_limit
    }

    pub fn entry(&self) -> &NodeId {
        &self.entry
    }

    /// Begin a run. Nothing executes until the cursor is polled.
    pub fn start(&self, initial: ExecutionState, ctx: RunContext) -> Execution<'_> {
        Execution {
            graph: self,
            ctx,
            state: initial,
            current: Some(self.entry.clone()),
            steps: 0,
        }
    }

    /// Lazily yield one event per executed step.
    ///
    /// The stream ends after the terminal step or after the first error.
    pub fn stream(
        &self,
        initial: ExecutionState,
        ctx: RunContext,
    ) -> impl Stream<Item = Result<StepEvent>> + Send + '_ {
        futures::stream::unfold(Some(self.start(initial, ctx)), |cursor| async move {
            let mut cursor = cursor?;
            match cursor.next_step().await? {
                Ok(event) => Some((Ok(event), Some(cursor))),
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    /// Drive a run to its terminal state.
    pub async fn run(&self, initial: ExecutionState, ctx: RunContext) -> Result<ExecutionState> {
        let mut execution = self.start(initial, ctx);
        while let Some(step) = execution.next_step().await {
            step?;
        }
        Ok(execution.into_state())
    }
}

/// The cursor of one run.
pub struct Execution<'g> {
    graph: &'g Graph,
    ctx: RunContext,
    state: ExecutionState,
    /// `None` once the run has terminated or failed
    current: Option<NodeId>,
    steps: usize,
}

impl Execution<'_> {
    /// Execute the next node. `None` once the run is over.
    pub async fn next_step(&mut self) -> Option<Result<StepEvent>> {
        let node_id = self.current.take()?;

        if self.steps >= self.graph.recursion_limit {
            warn!(
                conversation_id = %self.ctx.conversation_id,
                limit = self.graph.recursion_limit,
                "Recursion limit reached"
            );
            return Some(Err(RunError::RecursionLimitExceeded {
                limit: self.graph.recursion_limit,
                snapshot: Box::new(self.state.snapshot(self.steps)),
            }
            .into()));
        }

        let Some(node) = self.graph.nodes.get(&node_id) else {
            return Some(Err(RunError::UnknownNode(node_id.to_string()).into()));
        };

        self.steps += 1;
        debug!(
            conversation_id = %self.ctx.conversation_id,
            step = self.steps,
            node = %node_id,
            "Executing node"
        );

        let delta = match node.execute(&self.state, &self.ctx).await {
            Ok(delta) => delta,
            Err(e) => return Some(Err(e)),
        };

        let next = delta
            .next_node
            .clone()
            .or_else(|| self.graph.edges.get(&node_id).cloned())
            .unwrap_or(NodeId::END);

        let event = StepEvent {
            step: self.steps,
            node: node_id,
            delta: delta.clone(),
        };

        let mut state = merge(std::mem::take(&mut self.state), delta);
        state.next_node = Some(next.clone());
        self.state = state;

        if !next.is_end() {
            self.current = Some(next);
        }
        Some(Ok(event))
    }

    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn is_finished(&self) -> bool {
        self.current.is_none()
    }

    pub fn into_state(self) -> ExecutionState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{quiet_memory, run_ctx};
    use agentcanvas_core::message::ChatMessage;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Emits one message and routes to a fixed node.
    struct Say {
        text: &'static str,
        next: Option<NodeId>,
        calls: AtomicUsize,
    }

    impl Say {
        fn new(text: &'static str, next: Option<NodeId>) -> Arc<Self> {
            Arc::new(Self {
                text,
                next,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Node for Say {
        async fn execute(&self, _state: &ExecutionState, _ctx: &RunContext) -> Result<StateDelta> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(StateDelta {
                messages: vec![ChatMessage::assistant(self.text)],
                next_node: self.next.clone(),
                ..Default::default()
            })
        }
    }

    fn ctx() -> RunContext {
        run_ctx(quiet_memory())
    }

    #[tokio::test]
    async fn runs_until_end_marker() {
        let graph = Graph::builder(NodeId::AGENT_TURN)
            .node(NodeId::AGENT_TURN, Say::new("a", Some(NodeId::TOOL_TURN)))
            .node(NodeId::TOOL_TURN, Say::new("b", Some(NodeId::END)))
            .build()
            .unwrap();

        let state = graph.run(ExecutionState::default(), ctx()).await.unwrap();
        let contents: Vec<&str> = state.messages.iter().map(|m| m.content()).collect();
        assert_eq!(contents, vec!["a", "b"]);
        assert_eq!(state.next_node, Some(NodeId::END));
    }

    #[tokio::test]
    async fn fallback_edge_used_when_delta_is_silent() {
        let graph = Graph::builder(NodeId::AGENT_TURN)
            .node(NodeId::AGENT_TURN, Say::new("a", None))
            .node(NodeId::TOOL_TURN, Say::new("b", Some(NodeId::END)))
            .edge(NodeId::AGENT_TURN, NodeId::TOOL_TURN)
            .build()
            .unwrap();

        let state = graph.run(ExecutionState::default(), ctx()).await.unwrap();
        assert_eq!(state.messages.len(), 2);
    }

    #[tokio::test]
    async fn endless_loop_hits_recursion_limit() {
        let agent = Say::new("again", Some(NodeId::TOOL_TURN));
        let tools = Say::new("tool", Some(NodeId::AGENT_TURN));
        let graph = Graph::builder(NodeId::AGENT_TURN)
            .node(NodeId::AGENT_TURN, agent.clone())
            .node(NodeId::TOOL_TURN, tools.clone())
            .recursion_limit(5)
            .build()
            .unwrap();

        let err = graph.run(ExecutionState::default(), ctx()).await.unwrap_err();
        match err {
            Error::Run(RunError::RecursionLimitExceeded { limit, snapshot }) => {
                assert_eq!(limit, 5);
                assert_eq!(snapshot.steps, 5);
                assert_eq!(snapshot.messages.len(), 5);
            }
            other => panic!("unexpected error: {other}"),
        }
        let total = agent.calls.load(Ordering::SeqCst) + tools.calls.load(Ordering::SeqCst);
        assert_eq!(total, 5);
        assert!(agent.calls.load(Ordering::SeqCst) <= 5);
    }

    #[tokio::test]
    async fn unknown_route_is_an_error() {
        let graph = Graph::builder(NodeId::AGENT_TURN)
            .node(NodeId::AGENT_TURN, Say::new("a", Some(NodeId::new("router"))))
            .build()
            .unwrap();

        let err = graph.run(ExecutionState::default(), ctx()).await.unwrap_err();
        assert_eq!(err.kind(), "UnknownNode");
    }

    #[tokio::test]
    async fn stream_yields_each_step_in_order() {
        let graph = Graph::builder(NodeId::AGENT_TURN)
            .node(NodeId::AGENT_TURN, Say::new("a", Some(NodeId::TOOL_TURN)))
            .node(NodeId::TOOL_TURN, Say::new("b", Some(NodeId::END)))
            .build()
            .unwrap();

        let events: Vec<StepEvent> = graph
            .stream(ExecutionState::default(), ctx())
            .map(|e| e.unwrap())
            .collect()
            .await;
        let nodes: Vec<(usize, &str)> = events.iter().map(|e| (e.step, e.node.as_str())).collect();
        assert_eq!(nodes, vec![(1, "call_agent"), (2, "execute_tools")]);
    }

    #[test]
    fn builder_rejects_missing_entry() {
        let result = Graph::builder(NodeId::AGENT_TURN).build();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn builder_rejects_dangling_edge() {
        let result = Graph::builder(NodeId::AGENT_TURN)
            .node(NodeId::AGENT_TURN, Say::new("a", None))
            .edge(NodeId::AGENT_TURN, NodeId::TOOL_TURN)
            .build();
        assert!(result.is_err());
    }
}
