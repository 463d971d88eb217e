//! Tool-executor node: runs exactly one plan step per visit.

use std::sync::Arc;

use async_trait::async_trait;
use rq_core::Result;
use rq_engine::fetch::FileReader;
use rq_engine::graph::CodeGraph;
use rq_engine::vector::{VectorIndex, VectorMatch};
use rq_engine::Embedder;
use tracing::info;

use crate::flow::FlowNode;
use crate::llm::ChatModel;
use crate::query_gen::gather_graph_context;
use crate::state::{AgentState, StateUpdate, ToolRun};
use crate::tools::ToolKind;

/// Matches requested per semantic search.
const SEMANTIC_TOP_K: usize = 5;

pub struct ToolExecutorNode {
    llm: Arc<dyn ChatModel>,
    graph: Arc<dyn CodeGraph>,
    vectors: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    files: Arc<dyn FileReader>,
}

impl ToolExecutorNode {
    pub fn new(
        llm: Arc<dyn ChatModel>,
        graph: Arc<dyn CodeGraph>,
        vectors: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        files: Arc<dyn FileReader>,
    ) -> Self {
        Self { llm, graph, vectors, embedder, files }
    }

    async fn run_graph_search(&self, state: &AgentState) -> ToolRun {
        let outcome = gather_graph_context(
            self.llm.as_ref(),
            self.graph.as_ref(),
            state.repo_id,
            &state.decomposed_query,
            &state.model_id,
            &state.api_key,
        )
        .await;

        info!(
            attempts = outcome.attempted_queries.len(),
            records = outcome.records.len(),
            "graph gathering loop finished"
        );

        // All accumulated records become one structured-text entry; no
        // records means no context from this step.
        let output = if outcome.records.is_empty() {
            String::new()
        } else {
            serde_json::to_string_pretty(&outcome.records).unwrap_or_default()
        };
        ToolRun::new(ToolKind::KnowledgeGraphSearch, output)
    }

    async fn run_semantic_search(&self, state: &AgentState) -> ToolRun {
        let result = async {
            let vector = self.embedder.embed_query(&state.decomposed_query).await?;
            self.vectors
                .query(&state.repo_id.to_string(), vector, SEMANTIC_TOP_K)
                .await
        }
        .await;

        let output = match result {
            Ok(matches) => format_matches(&matches),
            Err(e) => format!("Error during semantic search: {e}"),
        };
        ToolRun::new(ToolKind::SemanticCodeSearch, output)
    }

    async fn run_file_reader(&self, state: &AgentState, step: &str) -> ToolRun {
        let output = match file_path_from_step(step) {
            Some(path) => match self.files.read_file(state.repo_id, &path).await {
                Ok(content) => content,
                Err(e) => format!("Error reading file '{path}': {e}"),
            },
            None => "Error: the plan step does not name a file to read.".to_string(),
        };
        ToolRun::new(ToolKind::FileReaderTool, output)
    }
}

#[async_trait]
impl FlowNode for ToolExecutorNode {
    async fn run(&self, state: &AgentState) -> Result<StateUpdate> {
        let next_index = state.intermediate_steps.len();
        let Some(step) = state.plan.get(next_index) else {
            // Plan already exhausted (or empty); the guard routes onward.
            return Ok(StateUpdate::default());
        };

        info!(step = next_index + 1, total = state.plan.len(), instruction = %step, "executing plan step");

        let run = match ToolKind::from_step(step) {
            ToolKind::KnowledgeGraphSearch => self.run_graph_search(state).await,
            ToolKind::SemanticCodeSearch => self.run_semantic_search(state).await,
            ToolKind::FileReaderTool => self.run_file_reader(state, step).await,
            ToolKind::NoOp => {
                ToolRun::new(ToolKind::NoOp, format!("No tool available for step: '{step}'"))
            }
        };

        Ok(StateUpdate { intermediate_steps: vec![run], ..Default::default() })
    }
}

fn format_matches(matches: &[VectorMatch]) -> String {
    if matches.is_empty() {
        return "No relevant functions found in the vector database.".to_string();
    }

    let mut out = String::from("Found relevant functions:\n\n");
    for m in matches {
        out.push_str(&format!(
            "--- Function: {} ---\nFile: {}\nSimilarity Score: {:.4}\n",
            m.metadata.function_name, m.metadata.file_path, m.score
        ));
    }
    out
}

/// Extract the file path a plan step names: the first quoted token that
/// looks like a path. The planner is instructed to quote the path, so no
/// unquoted fallback exists.
fn file_path_from_step(step: &str) -> Option<String> {
    for quote in ['\'', '"'] {
        // Odd-indexed fragments of the split sit between quote pairs.
        for token in step.split(quote).skip(1).step_by(2) {
            if !token.is_empty()
                && !token.contains(char::is_whitespace)
                && (token.contains('.') || token.contains('/'))
                && token != ToolKind::FileReaderTool.name()
            {
                return Some(token.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rq_engine::vector::{ChunkKind, ChunkMetadata};

    #[test]
    fn file_path_extraction_requires_a_quoted_path() {
        assert_eq!(
            file_path_from_step("Use 'file_reader_tool' to read 'src/app.py'."),
            Some("src/app.py".to_string())
        );
        assert_eq!(
            file_path_from_step("Use \"file_reader_tool\" to read \"peer.py\""),
            Some("peer.py".to_string())
        );
        assert_eq!(file_path_from_step("Use 'file_reader_tool' to read the config"), None);
        assert_eq!(file_path_from_step("read src/app.py"), None);
    }

    #[test]
    fn match_formatting_includes_names_and_scores() {
        let matches = vec![VectorMatch {
            id: "r:a.py:open".into(),
            score: 0.87654,
            metadata: ChunkMetadata {
                repo_id: "r".into(),
                file_path: "a.py".into(),
                function_name: "open".into(),
                kind: ChunkKind::Function,
                class_name: None,
            },
        }];
        let text = format_matches(&matches);
        assert!(text.contains("--- Function: open ---"));
        assert!(text.contains("File: a.py"));
        assert!(text.contains("Similarity Score: 0.8765"));

        assert_eq!(
            format_matches(&[]),
            "No relevant functions found in the vector database."
        );
    }
}
