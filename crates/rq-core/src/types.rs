use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

// ── ID types ──
pub type RepoId = Uuid;
pub type UserId = String;
pub type SessionId = String;

// ── Parsed file facts (analyzer output) ──

/// One `import` or `from … import …` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportFact {
    /// Dotted module path, e.g. `os.path`. Relative imports keep their dots.
    pub module: String,
    /// Imported name for `from module import name`; `None` for plain imports.
    pub name: Option<String>,
    /// `as` alias, when present.
    pub alias: Option<String>,
}

impl ImportFact {
    /// The name a Module node is keyed by: the imported name when present,
    /// otherwise the module path itself.
    pub fn target_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.module)
    }
}

/// A function or method extracted from one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionFacts {
    pub name: String,
    /// Positional argument names, in declaration order (`self` included).
    pub args: Vec<String>,
    /// First documentation string of the body; empty when absent.
    pub docstring: String,
    /// Verbatim source text of the definition.
    pub source_code: String,
    /// De-duplicated callee names appearing as invocation heads anywhere in
    /// the body, nested definitions included. Attribute calls record the
    /// rightmost attribute name.
    pub calls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassFacts {
    pub name: String,
    pub docstring: String,
    /// Base-class names that are plain identifiers; anything more complex
    /// (attribute access, subscripts) is not resolvable by name and dropped.
    pub base_classes: Vec<String>,
    pub methods: Vec<FunctionFacts>,
}

/// Everything the analyzer extracts from one source file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFacts {
    pub imports: Vec<ImportFact>,
    pub classes: Vec<ClassFacts>,
    pub functions: Vec<FunctionFacts>,
}

impl FileFacts {
    pub fn is_empty(&self) -> bool {
        self.imports.is_empty() && self.classes.is_empty() && self.functions.is_empty()
    }
}

// ── Chat ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Llm,
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::System => "system",
            Self::User => "user",
            Self::Llm => "llm",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ChatRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "llm" => Ok(Self::Llm),
            other => Err(format!("unknown chat role: {other}")),
        }
    }
}

/// One turn of a conversation, as handed to the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn llm(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Llm, content: content.into() }
    }
}

// ── Data sources ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    PendingIndexing,
    Indexed,
    Failed,
}

impl std::fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PendingIndexing => "pending_indexing",
            Self::Indexed => "indexed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for IndexStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending_indexing" => Ok(Self::PendingIndexing),
            "indexed" => Ok(Self::Indexed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown index status: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_target_name_prefers_imported_name() {
        let plain = ImportFact { module: "os".into(), name: None, alias: None };
        assert_eq!(plain.target_name(), "os");

        let from = ImportFact {
            module: "os.path".into(),
            name: Some("join".into()),
            alias: None,
        };
        assert_eq!(from.target_name(), "join");
    }

    #[test]
    fn index_status_roundtrip() {
        for status in [IndexStatus::PendingIndexing, IndexStatus::Indexed, IndexStatus::Failed] {
            assert_eq!(status.to_string().parse::<IndexStatus>().unwrap(), status);
        }
    }
}
