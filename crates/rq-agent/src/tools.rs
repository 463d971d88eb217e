//! The closed tool set the planner can schedule.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    KnowledgeGraphSearch,
    SemanticCodeSearch,
    FileReaderTool,
    /// A plan step that names no known tool. Recorded so the loop still
    /// advances through the plan.
    NoOp,
}

impl ToolKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::KnowledgeGraphSearch => "knowledge_graph_search",
            Self::SemanticCodeSearch => "semantic_code_search",
            Self::FileReaderTool => "file_reader_tool",
            Self::NoOp => "no_op",
        }
    }

    /// Tagged dispatch over a plan step's instruction text.
    pub fn from_step(step: &str) -> Self {
        let step = step.to_lowercase();
        if step.contains("knowledge_graph_search") {
            Self::KnowledgeGraphSearch
        } else if step.contains("semantic_code_search") {
            Self::SemanticCodeSearch
        } else if step.contains("file_reader_tool") {
            Self::FileReaderTool
        } else {
            Self::NoOp
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_matches_tool_names_case_insensitively() {
        assert_eq!(
            ToolKind::from_step("Use 'knowledge_graph_search' to find callers of X."),
            ToolKind::KnowledgeGraphSearch
        );
        assert_eq!(
            ToolKind::from_step("Run SEMANTIC_CODE_SEARCH for auth flow."),
            ToolKind::SemanticCodeSearch
        );
        assert_eq!(
            ToolKind::from_step("Use 'file_reader_tool' to read 'app.py'."),
            ToolKind::FileReaderTool
        );
        assert_eq!(ToolKind::from_step("Think about the answer."), ToolKind::NoOp);
    }
}
