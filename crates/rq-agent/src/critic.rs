//! Critic node. Currently approves every answer unchanged; the node exists
//! so policy checks can slot in without rewiring the flow. It must leave
//! `final_answer` intact in the terminal state.

use async_trait::async_trait;
use rq_core::Result;

use crate::flow::FlowNode;
use crate::state::{AgentState, StateUpdate};

pub struct CriticNode;

#[async_trait]
impl FlowNode for CriticNode {
    async fn run(&self, state: &AgentState) -> Result<StateUpdate> {
        Ok(StateUpdate { final_answer: state.final_answer.clone(), ..Default::default() })
    }
}
