//! Graph-query generation and the information-gathering loop.
//!
//! Each attempt asks the LLM for a fresh graph query given the schema, the
//! repo id, and every previously tried query; execution results steer
//! whether the loop continues. The loop is bounded and exits early on an
//! empty reply, a repeated query, or an empty result set.

use rq_core::{ChatTurn, RepoId, Result};
use rq_engine::graph::CodeGraph;
use tracing::warn;

use crate::llm::{ChatModel, ChatRequest};

/// Upper bound on query attempts per graph-search step.
pub const MAX_QUERY_ATTEMPTS: usize = 3;

/// Sentinel the generator returns when the schema cannot answer the
/// question.
const SCHEMA_UNHELPFUL: &str = "SCHEMA_UNHELPFUL";

const QUERY_GENERATION_PROMPT: &str = "\
You are an expert graph-database developer. Generate one Cypher query to \
answer a question about a software repository.

Rules:
- Every node in the graph carries a `repo_id` property. EVERY node pattern \
in your query MUST include `repo_id: '{repo_id}'` so only this repository \
is matched. This is critical.
- Use only the node labels, properties, and relationship types from the \
schema below.
- When matching names, prefer the CONTAINS operator for flexibility \
(e.g. `WHERE func.name CONTAINS 'auth'`).
- Do NOT repeat any of the previously tried queries; produce a different \
query that could surface additional information, or return nothing if \
there is nothing new to try.
- If the question cannot be answered with this schema, return only the \
string \"SCHEMA_UNHELPFUL\".
- Return only the query itself, with no explanation or formatting.";

/// Accumulated result of one gathering loop.
#[derive(Debug, Default)]
pub struct GatheringOutcome {
    pub records: Vec<serde_json::Value>,
    pub attempted_queries: Vec<String>,
}

pub async fn gather_graph_context(
    llm: &dyn ChatModel,
    graph: &dyn CodeGraph,
    repo_id: RepoId,
    question: &str,
    model_id: &str,
    api_key: &str,
) -> GatheringOutcome {
    let schema = graph.schema_description();
    let mut outcome = GatheringOutcome::default();

    for _ in 0..MAX_QUERY_ATTEMPTS {
        let query = match generate_query(
            llm,
            &schema,
            repo_id,
            question,
            &outcome.attempted_queries,
            model_id,
            api_key,
        )
        .await
        {
            Ok(query) => query,
            Err(e) => {
                warn!(error = %e, "graph query generation failed, ending gathering loop");
                break;
            }
        };

        // Nothing new to try.
        let Some(query) = query else { break };
        if outcome.attempted_queries.contains(&query) {
            break;
        }
        outcome.attempted_queries.push(query.clone());

        match graph.run_query(&query).await {
            Err(e) => {
                // A bad query costs one attempt but gives the generator a
                // chance to correct itself.
                warn!(error = %e, query, "graph query failed to execute");
            }
            Ok(records) if records.is_empty() => break,
            Ok(records) => outcome.records.extend(records),
        }
    }

    outcome
}

/// Ask the LLM for the next query. `Ok(None)` means the generator had
/// nothing further to offer.
async fn generate_query(
    llm: &dyn ChatModel,
    schema: &str,
    repo_id: RepoId,
    question: &str,
    tried: &[String],
    model_id: &str,
    api_key: &str,
) -> Result<Option<String>> {
    let tried_section = if tried.is_empty() {
        "None".to_string()
    } else {
        tried
            .iter()
            .enumerate()
            .map(|(i, q)| format!("{}. {q}", i + 1))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let prompt = QUERY_GENERATION_PROMPT.replace("{repo_id}", &repo_id.to_string());
    let messages = vec![
        ChatTurn::system(prompt),
        ChatTurn::user(format!(
            "Schema:\n{schema}\n\nPreviously tried queries:\n{tried_section}\n\n\
             Question: {question}\n\nCypher query:"
        )),
    ];

    let reply = llm
        .complete(ChatRequest::new(model_id, api_key, messages))
        .await?;
    let query = strip_code_fences(&reply);

    if query.is_empty() || query.contains(SCHEMA_UNHELPFUL) {
        return Ok(None);
    }
    Ok(Some(query))
}

/// Remove markdown code fences (```cypher … ``` or ``` … ```) around a
/// generated query.
fn strip_code_fences(reply: &str) -> String {
    let mut text = reply.trim();
    for prefix in ["```cypher", "```"] {
        if let Some(stripped) = text.strip_prefix(prefix) {
            text = stripped;
            break;
        }
    }
    if let Some(stripped) = text.strip_suffix("```") {
        text = stripped;
    }
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fenced_queries() {
        assert_eq!(
            strip_code_fences("```cypher\nMATCH (n) RETURN n\n```"),
            "MATCH (n) RETURN n"
        );
        assert_eq!(strip_code_fences("```\nMATCH (n) RETURN n\n```"), "MATCH (n) RETURN n");
        assert_eq!(strip_code_fences("  MATCH (n) RETURN n  "), "MATCH (n) RETURN n");
        assert_eq!(strip_code_fences(""), "");
    }
}
