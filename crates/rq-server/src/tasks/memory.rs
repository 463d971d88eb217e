//! Memory-maintenance tasks: the per-(user, repo) conversation summary and
//! the per-user general facts, both produced by structured LLM calls over
//! the chat history.

use rq_agent::llm::{complete_structured, ChatRequest};
use rq_core::{ChatTurn, Result};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::state::AppState;

/// Model used for internal utility calls.
const UTILITY_MODEL: &str = "gemini-1.5-flash";

const SUMMARY_PROMPT: &str = "\
You are a summarization assistant. Summarize the following conversation, \
focusing on key questions, answers, decisions, and knowledge gained about \
the codebase. If a previous summary is provided, integrate the new turns \
into an updated, concise, coherent summary of the entire conversation, no \
more than 200 words. If the conversation has not discussed a codebase or \
any technical details, state that explicitly, for example: 'No codebase or \
technical details discussed yet.'";

const FACTS_PROMPT: &str = "\
You extract concise, general facts about the user from their conversation \
history: name, role, affiliation, preferred tools, hobbies, strong \
preferences. Only facts about the user personally; never details of the \
code under discussion, greetings, or conversational filler. Each fact has \
a brief snake_case fact_key (e.g. 'user_name', 'user_role') and a \
fact_value. If no relevant facts are present, return an empty list.";

#[derive(Debug, Deserialize)]
struct SummaryOutput {
    summary: String,
}

#[derive(Debug, Deserialize)]
struct FactsOutput {
    #[serde(default)]
    facts: Vec<FactItem>,
}

#[derive(Debug, Deserialize)]
struct FactItem {
    fact_key: String,
    fact_value: String,
}

fn summary_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {"summary": {"type": "string"}},
        "required": ["summary"]
    })
}

fn facts_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "facts": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "fact_key": {"type": "string"},
                        "fact_value": {"type": "string"}
                    },
                    "required": ["fact_key", "fact_value"]
                }
            }
        },
        "required": ["facts"]
    })
}

/// Update the stored conversation summary for one (user, repo) from the
/// messages newer than the last summarized timestamp. A run with no new
/// messages writes nothing.
pub async fn generate_repo_summary(
    platform: &AppState,
    user_id: &str,
    data_source_id: Uuid,
) -> Result<()> {
    let memory = platform.memory();
    let chat = platform.chat_history();

    let existing = memory.get_summary(user_id, data_source_id).await?;
    let watermark = existing.as_ref().and_then(|s| s.last_message_timestamp);

    let messages = chat
        .user_repo_messages_after(user_id, data_source_id, watermark)
        .await?;
    if messages.is_empty() {
        info!(user_id, %data_source_id, "no new messages to summarize");
        return Ok(());
    }

    let mut turns = Vec::new();
    turns.push(ChatTurn::system(SUMMARY_PROMPT));
    if let Some(prev) = existing.as_ref().filter(|s| !s.summary_text.is_empty()) {
        turns.push(ChatTurn::system(format!(
            "Previous conversation summary: {}",
            prev.summary_text
        )));
    }
    let mut has_content = false;
    for message in &messages {
        if message.message_content.trim().is_empty() {
            continue;
        }
        if let Some(turn) = message.as_turn() {
            turns.push(turn);
            has_content = true;
        }
    }
    if !has_content {
        info!(user_id, %data_source_id, "no substantive messages to summarize");
        return Ok(());
    }

    let api_key = platform.utility_api_key().await?;
    let request =
        ChatRequest::new(UTILITY_MODEL, api_key, turns).with_schema(summary_schema());
    let output: SummaryOutput = complete_structured(platform.llm.as_ref(), request).await?;

    let summary_text = if output.summary.trim().is_empty() {
        // Keep the old summary rather than erasing it with a blank reply.
        existing.map(|s| s.summary_text).unwrap_or_default()
    } else {
        output.summary
    };

    let last_timestamp = messages.last().map(|m| m.timestamp).unwrap_or_else(chrono::Utc::now);
    memory
        .upsert_summary(user_id, data_source_id, &summary_text, last_timestamp)
        .await?;

    info!(user_id, %data_source_id, chars = summary_text.len(), "conversation summary updated");
    Ok(())
}

/// Extract general facts about the user from their full chat history and
/// upsert them by `fact_key`. An empty extraction produces no writes.
pub async fn extract_user_facts(platform: &AppState, user_id: &str) -> Result<()> {
    let chat = platform.chat_history();
    let memory = platform.memory();

    let messages = chat.user_messages(user_id).await?;
    let mut turns = vec![ChatTurn::system(FACTS_PROMPT)];
    let before = turns.len();
    for message in &messages {
        if message.message_content.trim().is_empty() {
            continue;
        }
        if let Some(turn) = message.as_turn() {
            turns.push(turn);
        }
    }
    if turns.len() == before {
        info!(user_id, "no messages available for fact extraction");
        return Ok(());
    }

    let api_key = platform.utility_api_key().await?;
    let request = ChatRequest::new(UTILITY_MODEL, api_key, turns).with_schema(facts_schema());
    let output: FactsOutput = complete_structured(platform.llm.as_ref(), request).await?;

    if output.facts.is_empty() {
        info!(user_id, "no user facts extracted");
        return Ok(());
    }

    let pairs: Vec<(String, String)> = output
        .facts
        .into_iter()
        .map(|f| (f.fact_key, f.fact_value))
        .collect();
    let count = pairs.len();
    memory.upsert_facts(user_id, &pairs).await?;

    info!(user_id, count, "user facts updated");
    Ok(())
}
