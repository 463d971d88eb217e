//! repliq query agent.
//!
//! A staged pipeline over a shared state: the planner decomposes the
//! question, the tool executor gathers context from the code graph, the
//! vector index, or file contents, and the synthesizer writes a grounded
//! answer.

pub mod agent;
pub mod critic;
pub mod executor;
pub mod flow;
pub mod grader;
pub mod llm;
pub mod planner;
pub mod query_gen;
pub mod state;
pub mod synthesizer;
pub mod tools;

pub use agent::QueryAgent;
pub use llm::{complete_structured, ChatModel, ChatRequest, GeminiChat, DEFAULT_TIMEOUT};
pub use state::{AgentState, StateUpdate, ToolRun};
pub use synthesizer::NO_CONTEXT_ANSWER;
pub use tools::ToolKind;
