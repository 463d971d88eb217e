//! Minimal directed state-graph runtime.
//!
//! Nodes are named, produce partial state updates, and are wired together
//! with fixed or conditional edges. Execution is strictly sequential and
//! bounded by a recursion limit, which makes agent behavior deterministic
//! for a given sequence of node outputs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rq_core::Result;
use tracing::debug;

use crate::state::{AgentState, StateUpdate};

/// Default bound on node transitions per run.
pub const RECURSION_LIMIT: usize = 15;

#[async_trait]
pub trait FlowNode: Send + Sync {
    async fn run(&self, state: &AgentState) -> Result<StateUpdate>;
}

/// Where control goes after a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Node(&'static str),
    End,
}

type Router = Box<dyn Fn(&AgentState) -> Next + Send + Sync>;

enum Edge {
    Fixed(Next),
    Conditional(Router),
}

#[derive(Default)]
pub struct FlowBuilder {
    nodes: HashMap<&'static str, Arc<dyn FlowNode>>,
    edges: HashMap<&'static str, Edge>,
    entry: Option<&'static str>,
}

impl FlowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(mut self, name: &'static str, node: Arc<dyn FlowNode>) -> Self {
        self.nodes.insert(name, node);
        self
    }

    pub fn add_edge(mut self, from: &'static str, to: Next) -> Self {
        self.edges.insert(from, Edge::Fixed(to));
        self
    }

    pub fn add_conditional_edge(
        mut self,
        from: &'static str,
        router: impl Fn(&AgentState) -> Next + Send + Sync + 'static,
    ) -> Self {
        self.edges.insert(from, Edge::Conditional(Box::new(router)));
        self
    }

    pub fn set_entry_point(mut self, name: &'static str) -> Self {
        self.entry = Some(name);
        self
    }

    /// Validate wiring and produce a runnable flow.
    pub fn compile(self) -> Result<CompiledFlow> {
        let entry = self
            .entry
            .ok_or_else(|| rq_core::Error::Internal("flow has no entry point".into()))?;
        if !self.nodes.contains_key(entry) {
            return Err(rq_core::Error::Internal(format!("unknown entry node: {entry}")));
        }
        for (from, edge) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(rq_core::Error::Internal(format!("edge from unknown node: {from}")));
            }
            if let Edge::Fixed(Next::Node(to)) = edge {
                if !self.nodes.contains_key(to) {
                    return Err(rq_core::Error::Internal(format!("edge to unknown node: {to}")));
                }
            }
        }
        for name in self.nodes.keys() {
            if !self.edges.contains_key(name) {
                return Err(rq_core::Error::Internal(format!("node has no outgoing edge: {name}")));
            }
        }

        Ok(CompiledFlow {
            nodes: self.nodes,
            edges: self.edges,
            entry,
            recursion_limit: RECURSION_LIMIT,
        })
    }
}

pub struct CompiledFlow {
    nodes: HashMap<&'static str, Arc<dyn FlowNode>>,
    edges: HashMap<&'static str, Edge>,
    entry: &'static str,
    recursion_limit: usize,
}

impl CompiledFlow {
    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Run the flow to its terminal state.
    pub async fn run(&self, mut state: AgentState) -> Result<AgentState> {
        let mut current = self.entry;

        for _ in 0..self.recursion_limit {
            let node = self
                .nodes
                .get(current)
                .ok_or_else(|| rq_core::Error::Internal(format!("unknown node: {current}")))?;

            debug!(node = current, "running flow node");
            let update = node.run(&state).await?;
            state.apply(update);

            let next = match self
                .edges
                .get(current)
                .ok_or_else(|| rq_core::Error::Internal(format!("no edge from node: {current}")))?
            {
                Edge::Fixed(next) => *next,
                Edge::Conditional(router) => router(&state),
            };

            match next {
                Next::Node(name) => current = name,
                Next::End => return Ok(state),
            }
        }

        Err(rq_core::Error::Internal(format!(
            "flow exceeded recursion limit of {}",
            self.recursion_limit
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ToolRun;
    use crate::tools::ToolKind;
    use uuid::Uuid;

    struct AppendStep;

    #[async_trait]
    impl FlowNode for AppendStep {
        async fn run(&self, _state: &AgentState) -> Result<StateUpdate> {
            Ok(StateUpdate {
                intermediate_steps: vec![ToolRun::new(ToolKind::NoOp, "tick")],
                ..Default::default()
            })
        }
    }

    struct Finish;

    #[async_trait]
    impl FlowNode for Finish {
        async fn run(&self, _state: &AgentState) -> Result<StateUpdate> {
            Ok(StateUpdate { final_answer: Some("done".into()), ..Default::default() })
        }
    }

    fn state() -> AgentState {
        AgentState::new("q", vec![], Uuid::new_v4(), "s", "k", "m")
    }

    #[tokio::test]
    async fn conditional_loop_routes_until_bound_then_ends() {
        let flow = FlowBuilder::new()
            .add_node("work", Arc::new(AppendStep))
            .add_node("finish", Arc::new(Finish))
            .add_conditional_edge("work", |s: &AgentState| {
                if s.intermediate_steps.len() >= 3 {
                    Next::Node("finish")
                } else {
                    Next::Node("work")
                }
            })
            .add_edge("finish", Next::End)
            .set_entry_point("work")
            .compile()
            .unwrap();

        let out = flow.run(state()).await.unwrap();
        assert_eq!(out.intermediate_steps.len(), 3);
        assert_eq!(out.final_answer.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn recursion_limit_is_enforced() {
        let flow = FlowBuilder::new()
            .add_node("spin", Arc::new(AppendStep))
            .add_conditional_edge("spin", |_s: &AgentState| Next::Node("spin"))
            .set_entry_point("spin")
            .compile()
            .unwrap()
            .with_recursion_limit(5);

        let err = flow.run(state()).await.unwrap_err();
        assert!(matches!(err, rq_core::Error::Internal(_)));
    }

    #[test]
    fn compile_rejects_dangling_wiring() {
        let missing_entry = FlowBuilder::new()
            .add_node("a", Arc::new(Finish))
            .add_edge("a", Next::End)
            .compile();
        assert!(missing_entry.is_err());

        let dangling_edge = FlowBuilder::new()
            .add_node("a", Arc::new(Finish))
            .add_edge("a", Next::Node("ghost"))
            .set_entry_point("a")
            .compile();
        assert!(dangling_edge.is_err());

        let missing_edge = FlowBuilder::new()
            .add_node("a", Arc::new(Finish))
            .set_entry_point("a")
            .compile();
        assert!(missing_edge.is_err());
    }
}
