//! Shared agent state and the per-transition update record.
//!
//! Nodes never mutate the state directly; each returns a `StateUpdate`
//! carrying only the keys it produced, and the flow runtime merges updates
//! in order. Scalar keys are last-write-wins; `intermediate_steps` is
//! append-only.

use rq_core::{ChatTurn, RepoId, SessionId};

use crate::tools::ToolKind;

/// One executed tool step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRun {
    pub tool: ToolKind,
    pub output: String,
}

impl ToolRun {
    pub fn new(tool: ToolKind, output: impl Into<String>) -> Self {
        Self { tool, output: output.into() }
    }

    /// Whether this step contributed usable context.
    pub fn has_content(&self) -> bool {
        let trimmed = self.output.trim();
        !trimmed.is_empty() && trimmed != "[]"
    }
}

#[derive(Debug, Clone)]
pub struct AgentState {
    // Core inputs from the request.
    pub original_query: String,
    pub chat_history: Vec<ChatTurn>,
    pub repo_id: RepoId,
    pub session_id: SessionId,
    pub api_key: String,
    pub model_id: String,

    // Planner outputs.
    pub decomposed_query: String,
    pub plan: Vec<String>,

    // Tool execution.
    pub intermediate_steps: Vec<ToolRun>,

    // Grading and synthesis.
    pub context_is_relevant: bool,
    pub final_answer: Option<String>,
}

impl AgentState {
    pub fn new(
        original_query: impl Into<String>,
        chat_history: Vec<ChatTurn>,
        repo_id: RepoId,
        session_id: impl Into<SessionId>,
        api_key: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            original_query: original_query.into(),
            chat_history,
            repo_id,
            session_id: session_id.into(),
            api_key: api_key.into(),
            model_id: model_id.into(),
            decomposed_query: String::new(),
            plan: Vec::new(),
            intermediate_steps: Vec::new(),
            context_is_relevant: false,
            final_answer: None,
        }
    }

    pub fn apply(&mut self, update: StateUpdate) {
        if let Some(decomposed_query) = update.decomposed_query {
            self.decomposed_query = decomposed_query;
        }
        if let Some(plan) = update.plan {
            self.plan = plan;
        }
        self.intermediate_steps.extend(update.intermediate_steps);
        if let Some(relevant) = update.context_is_relevant {
            self.context_is_relevant = relevant;
        }
        if let Some(final_answer) = update.final_answer {
            self.final_answer = Some(final_answer);
        }
    }
}

/// The keys one node transition produced.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub decomposed_query: Option<String>,
    pub plan: Option<Vec<String>>,
    pub intermediate_steps: Vec<ToolRun>,
    pub context_is_relevant: Option<bool>,
    pub final_answer: Option<String>,
}
