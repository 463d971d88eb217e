//! Synthesizer node: turns the gathered tool outputs into the final
//! Markdown answer.

use std::sync::Arc;

use async_trait::async_trait;
use rq_core::{ChatTurn, Result};

use crate::flow::FlowNode;
use crate::llm::{ChatModel, ChatRequest};
use crate::state::{AgentState, StateUpdate};

/// Answer used when grading found nothing to synthesize from.
pub const NO_CONTEXT_ANSWER: &str = "I could not find the information needed to \
answer this question in the indexed codebase.";

const SYNTHESIZER_PROMPT: &str = "\
You are an expert software engineering assistant. Provide a clear, concise \
answer to the user's question based only on the provided context.

Instructions:
1. Answer the query directly, without meta-commentary about the tools or \
the retrieval process.
2. Base the answer strictly on the provided context; do not invent details \
the context does not support.
3. Cite the specific function, class, and file names from the context.
4. If the context is empty or insufficient, say honestly that the \
information was not found in the codebase.
5. Format the answer in Markdown; use code formatting for identifiers.";

pub struct SynthesizerNode {
    llm: Arc<dyn ChatModel>,
}

impl SynthesizerNode {
    pub fn new(llm: Arc<dyn ChatModel>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl FlowNode for SynthesizerNode {
    async fn run(&self, state: &AgentState) -> Result<StateUpdate> {
        if !state.context_is_relevant {
            return Ok(StateUpdate {
                final_answer: Some(NO_CONTEXT_ANSWER.to_string()),
                ..Default::default()
            });
        }

        let context = state
            .intermediate_steps
            .iter()
            .map(|step| format!("Tool: {}\nResult:\n{}", step.tool, step.output))
            .collect::<Vec<_>>()
            .join("\n\n");

        let messages = vec![
            ChatTurn::system(SYNTHESIZER_PROMPT),
            ChatTurn::user(format!(
                "User's Question:\n{}\n\nContext from Codebase Analysis:\n{context}\n\nFinal Answer:",
                state.decomposed_query
            )),
        ];

        let reply = self
            .llm
            .complete(ChatRequest::new(&state.model_id, &state.api_key, messages))
            .await?;

        let final_answer = if reply.trim().is_empty() {
            NO_CONTEXT_ANSWER.to_string()
        } else {
            reply
        };

        Ok(StateUpdate { final_answer: Some(final_answer), ..Default::default() })
    }
}
