//! Query-agent assembly: the compiled state graph.
//!
//! Planner → Tool-Executor loop → Grader → Synthesizer → Critic. The
//! executor loops on itself until it has recorded one step per plan entry;
//! a guard compares steps taken against plan length after every visit.

use std::sync::Arc;

use rq_core::Result;
use rq_engine::fetch::FileReader;
use rq_engine::graph::CodeGraph;
use rq_engine::vector::VectorIndex;
use rq_engine::Embedder;

use crate::critic::CriticNode;
use crate::executor::ToolExecutorNode;
use crate::flow::{CompiledFlow, FlowBuilder, Next};
use crate::grader::RetrievalGraderNode;
use crate::llm::ChatModel;
use crate::planner::PlannerNode;
use crate::state::AgentState;
use crate::synthesizer::SynthesizerNode;

pub struct QueryAgent {
    flow: CompiledFlow,
}

impl QueryAgent {
    pub fn new(
        llm: Arc<dyn ChatModel>,
        graph: Arc<dyn CodeGraph>,
        vectors: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        files: Arc<dyn FileReader>,
    ) -> Result<Self> {
        let flow = FlowBuilder::new()
            .add_node("planner", Arc::new(PlannerNode::new(llm.clone())))
            .add_node(
                "tool_executor",
                Arc::new(ToolExecutorNode::new(llm.clone(), graph, vectors, embedder, files)),
            )
            .add_node("retrieval_grader", Arc::new(RetrievalGraderNode))
            .add_node("synthesizer", Arc::new(SynthesizerNode::new(llm)))
            .add_node("critic", Arc::new(CriticNode))
            .set_entry_point("planner")
            .add_edge("planner", Next::Node("tool_executor"))
            .add_conditional_edge("tool_executor", |state: &AgentState| {
                if state.intermediate_steps.len() >= state.plan.len() {
                    Next::Node("retrieval_grader")
                } else {
                    Next::Node("tool_executor")
                }
            })
            .add_edge("retrieval_grader", Next::Node("synthesizer"))
            .add_edge("synthesizer", Next::Node("critic"))
            .add_edge("critic", Next::End)
            .compile()?;

        Ok(Self { flow })
    }

    /// Run the agent to its terminal state.
    pub async fn answer(&self, state: AgentState) -> Result<AgentState> {
        self.flow.run(state).await
    }
}
