//! Retrieval grader: decides whether the gathered context is worth
//! synthesizing from.

use async_trait::async_trait;
use rq_core::Result;
use tracing::info;

use crate::flow::FlowNode;
use crate::state::{AgentState, StateUpdate};

/// The contract downstream is a boolean the synthesizer can trust. The
/// check here is deliberately cheap: context is relevant when at least one
/// tool step produced usable output.
pub struct RetrievalGraderNode;

#[async_trait]
impl FlowNode for RetrievalGraderNode {
    async fn run(&self, state: &AgentState) -> Result<StateUpdate> {
        let relevant = state.intermediate_steps.iter().any(|step| step.has_content());
        info!(relevant, steps = state.intermediate_steps.len(), "graded gathered context");
        Ok(StateUpdate { context_is_relevant: Some(relevant), ..Default::default() })
    }
}
