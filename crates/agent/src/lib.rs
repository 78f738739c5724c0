//! The agent graph of AgentCanvas.
//!
//! A conversation turn is a bounded loop over two nodes sharing one
//! [`ExecutionState`]:
//!
//! 1. **Agent turn** ([`TurnExecutor`]): the active agent answers, maybe
//!    requesting tool calls
//! 2. **Tool turn** ([`ToolRunner`]): every pending call runs, each result
//!    becomes a tool message, control returns to the agent
//!
//! The loop ends when an agent turn requests no tools, or fails with
//! `RecursionLimitExceeded` once the step ceiling is reached. The
//! [`SessionService`] wraps a run with history loading, memory and
//! persistence.

pub mod graph;
pub mod resolver;
pub mod session;
pub mod state;
pub mod tool_runner;
pub mod turn;

#[cfg(test)]
pub(crate) mod testing;

use agentcanvas_core::error::Result;
use agentcanvas_core::provider::Provider;
use agentcanvas_core::store::AgentCatalog;
use agentcanvas_core::tool::ToolRegistry;
use std::sync::Arc;

pub use graph::{Execution, Graph, GraphBuilder, Node, NodeId, RunContext, StepEvent};
pub use resolver::{AgentResolver, ConversationTeamResolver, FixedAgentResolver};
pub use session::{PersistenceFailure, SessionService, SessionSettings, TurnOutcome, UserUtterance};
pub use state::{ExecutionState, StateDelta, merge};
pub use tool_runner::ToolRunner;
pub use turn::{ToolRouting, TurnConfig, TurnExecutor};

/// Build the two-node agent graph.
///
/// Called once at start-up; the returned topology is immutable and meant
/// to be shared behind an `Arc`.
pub fn build_agent_graph(
    catalog: Arc<dyn AgentCatalog>,
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    turn: TurnConfig,
    recursion_limit: usize,
) -> Result<Graph> {
    Graph::builder(NodeId::AGENT_TURN)
        .node(
            NodeId::AGENT_TURN,
            Arc::new(TurnExecutor::new(catalog, provider, Arc::clone(&tools), turn)),
        )
        .node(NodeId::TOOL_TURN, Arc::new(ToolRunner::new(tools)))
        .edge(NodeId::AGENT_TURN, NodeId::TOOL_TURN)
        .edge(NodeId::TOOL_TURN, NodeId::AGENT_TURN)
        .recursion_limit(recursion_limit)
        .build()
}
