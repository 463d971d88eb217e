//! Planner node: rewrites the user's latest turn into a self-contained
//! question and produces a short tool plan.

use std::sync::Arc;

use async_trait::async_trait;
use rq_core::{ChatTurn, Result};
use serde::Deserialize;
use tracing::warn;

use crate::flow::FlowNode;
use crate::llm::{parse_structured, ChatModel, ChatRequest};
use crate::state::{AgentState, StateUpdate};

const PLANNER_PROMPT: &str = "\
You are the planner for a repository question-answering agent. Analyze the \
user's latest query together with the conversation history and produce a \
plan for the agent's tool steps.

1. Decompose the query: rewrite the user's latest query into a clear, \
standalone question optimized for retrieval. Resolve pronouns and vague \
references (\"that peer thing\") into the concrete names they refer to.

2. Create a plan: a list of short instructions, each naming exactly one \
tool. The available tools are:
  * `knowledge_graph_search`: for questions about code structure, \
definitions, and relationships (\"What functions call X?\", \"Where is Y \
defined?\"). For a code question this is normally the ONLY step you need; \
prefer a single-step plan using it.
  * `semantic_code_search`: for questions about purpose or functionality \
(\"How does authentication work?\").
  * `file_reader_tool`: ONLY when the user explicitly asks to read a \
specific file. The step MUST name the file path in quotes, e.g. \
\"Use 'file_reader_tool' to read 'src/app.py'\".

Respond with a single valid JSON object with exactly two keys: \
\"decomposed_query\" (a string) and \"plan\" (a list of strings). No other \
text.

Example response:
{\"decomposed_query\": \"What does the Peer class in module a do and which \
functions call its connect method?\", \"plan\": [\"Use \
'knowledge_graph_search' to find the Peer class, its methods, and callers \
of connect.\"]}";

fn planner_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "decomposed_query": {"type": "string"},
            "plan": {"type": "array", "items": {"type": "string"}}
        },
        "required": ["decomposed_query", "plan"]
    })
}

#[derive(Debug, Deserialize)]
struct PlannerOutput {
    #[serde(default)]
    decomposed_query: String,
    #[serde(default)]
    plan: Vec<String>,
}

pub struct PlannerNode {
    llm: Arc<dyn ChatModel>,
}

impl PlannerNode {
    pub fn new(llm: Arc<dyn ChatModel>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl FlowNode for PlannerNode {
    async fn run(&self, state: &AgentState) -> Result<StateUpdate> {
        let history = state
            .chat_history
            .iter()
            .map(|turn| format!("{}: {}", turn.role, turn.content))
            .collect::<Vec<_>>()
            .join("\n");

        let messages = vec![
            ChatTurn::system(PLANNER_PROMPT),
            ChatTurn::user(format!(
                "User Query: {}\n\nChat History:\n{history}",
                state.original_query
            )),
        ];
        let request = ChatRequest::new(&state.model_id, &state.api_key, messages)
            .with_schema(planner_schema());

        let reply = self.llm.complete(request).await?;

        match parse_structured::<PlannerOutput>(&reply) {
            Ok(output) => {
                let decomposed_query = if output.decomposed_query.trim().is_empty() {
                    state.original_query.clone()
                } else {
                    output.decomposed_query
                };
                Ok(StateUpdate {
                    decomposed_query: Some(decomposed_query),
                    plan: Some(output.plan),
                    ..Default::default()
                })
            }
            Err(e) => {
                // An unusable plan is recoverable: the executor runs zero
                // steps and the synthesizer reports that nothing was found.
                warn!(error = %e, "planner returned unusable output, falling back to empty plan");
                Ok(StateUpdate {
                    decomposed_query: Some(state.original_query.clone()),
                    plan: Some(Vec::new()),
                    ..Default::default()
                })
            }
        }
    }
}
