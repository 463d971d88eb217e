//! Chat endpoints: question submission (SSE) and session history.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::header::{HeaderName, HeaderValue, CACHE_CONTROL};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rq_agent::AgentState;
use rq_core::{ChatRole, ChatTurn};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::auth::AuthUser;
use super::error::{ApiError, ApiResult};
use crate::jobs::Job;
use crate::state::AppState;

/// Countdowns before the memory tasks run, so the answer's commit is
/// visible to them.
const SUMMARY_TASK_DELAY: Duration = Duration::from_secs(5);
const FACTS_TASK_DELAY: Duration = Duration::from_secs(10);

const FALLBACK_ANSWER: &str =
    "I was unable to produce a final answer based on the information I found.";

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub data_source_id: Option<Uuid>,
    #[serde(default)]
    pub session_id: Option<String>,
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, ApiError> {
    value.ok_or_else(|| ApiError(rq_core::Error::MissingInput(field.to_string())))
}

pub async fn chat(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<ChatBody>,
) -> ApiResult<Response> {
    let query = required(body.query.filter(|q| !q.trim().is_empty()), "query")?;
    let model_id = required(body.model, "model")?;
    let data_source_id = required(body.data_source_id, "data_source_id")?;
    let session_id = required(body.session_id.filter(|s| !s.is_empty()), "session_id")?;

    let model = state
        .models()
        .get_active(&model_id)
        .await?
        .ok_or_else(|| {
            rq_core::Error::InvalidInput(format!("model '{model_id}' is not configured or active"))
        })?;

    let source = state
        .data_sources()
        .get(data_source_id)
        .await?
        .ok_or_else(|| rq_core::Error::NotFound(format!("data source {data_source_id}")))?;

    let api_key = state.resolve_model_key(&model).await?;

    info!(%data_source_id, source = %source.name, model = %model.model_id, "chat request received");

    // Persist the user's turn before anything reads the history.
    let chat_store = state.chat_history();
    chat_store
        .append(&session_id, &user_id, data_source_id, ChatRole::User, &query)
        .await?;

    // Memory layers for the agent prompt: general user facts, the
    // per-repo conversation summary, then the session turns.
    let memory = state.memory();
    let facts = memory.list_facts(&user_id).await?;
    let facts_text = if facts.is_empty() {
        "No general facts known about the user yet.".to_string()
    } else {
        facts
            .iter()
            .map(|(key, value)| format!("- {key}: {value}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let summary_text = memory
        .get_summary(&user_id, data_source_id)
        .await?
        .map(|s| s.summary_text)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "No previous conversation summary for this repository.".to_string());

    let mut history = vec![
        ChatTurn::system(format!(
            "You are repliq, an assistant answering questions about a code \
             repository.\nUser general facts:\n{facts_text}"
        )),
        ChatTurn::system(format!(
            "Summary of the previous conversation about the '{}' repository: {summary_text}",
            source.name
        )),
    ];
    history.extend(
        chat_store
            .session_history(&session_id, &user_id, data_source_id)
            .await?
            .iter()
            .filter_map(|m| m.as_turn()),
    );

    let agent_state = AgentState::new(
        &query,
        history,
        data_source_id,
        &session_id,
        api_key,
        &model.model_id,
    );
    let final_state = state.agent.answer(agent_state).await?;

    let answer = final_state
        .final_answer
        .filter(|a| !a.trim().is_empty())
        .unwrap_or_else(|| {
            warn!("agent finished without a final answer");
            FALLBACK_ANSWER.to_string()
        });

    // The answer must be committed before the memory tasks that read it
    // are enqueued; the countdown gives the commit time to be visible.
    let saved = chat_store
        .append(&session_id, &user_id, data_source_id, ChatRole::Llm, &answer)
        .await?;

    state
        .jobs
        .enqueue_in(
            &Job::RepoSummary {
                user_id: user_id.clone(),
                data_source_id,
                last_chat_timestamp: saved.timestamp,
            },
            SUMMARY_TASK_DELAY,
        )
        .await?;
    state
        .jobs
        .enqueue_in(&Job::UserFacts { user_id }, FACTS_TASK_DELAY)
        .await?;

    Ok(sse_response(answer_frames(&answer)))
}

/// Frame payloads of a successful answer stream: the full text as one
/// `chunk`, then the terminal `done` status.
pub fn answer_frames(answer: &str) -> Vec<String> {
    vec![
        serde_json::json!({ "chunk": answer }).to_string(),
        serde_json::json!({ "status": "done" }).to_string(),
    ]
}

fn sse_response(frames: Vec<String>) -> Response {
    let stream = futures::stream::iter(
        frames
            .into_iter()
            .map(|payload| Ok::<Event, Infallible>(Event::default().data(payload))),
    );

    let mut response = Sse::new(stream).into_response();
    let headers = response.headers_mut();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
    response
}

// ── History ──

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default)]
    pub repo_id: Option<Uuid>,
}

pub async fn history(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(session_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<impl IntoResponse> {
    let repo_id = required(params.repo_id, "repo_id")?;
    let messages = state
        .chat_history()
        .session_history(&session_id, &user_id, repo_id)
        .await?;
    Ok(Json(messages))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_frames_emit_chunk_then_done() {
        let frames = answer_frames("The `open` function opens a connection.");
        assert_eq!(frames.len(), 2);

        let chunk: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(chunk["chunk"], "The `open` function opens a connection.");

        let done: serde_json::Value = serde_json::from_str(&frames[1]).unwrap();
        assert_eq!(done, serde_json::json!({"status": "done"}));
    }

    #[test]
    fn answer_frames_are_single_line() {
        // SSE data frames cannot carry raw newlines in one data: line; the
        // JSON encoding keeps each payload on one line.
        let frames = answer_frames("line one\nline two");
        for frame in frames {
            assert!(!frame.contains('\n'));
        }
    }
}
