//! Property-graph abstraction for structural code facts.
//!
//! The trait is the seam between the ingestion pipeline / query agent and
//! the backing graph engine. All write operations use merge semantics and
//! key every node on `repo_id`, so re-ingestion is idempotent and multiple
//! repositories coexist in one store.

pub mod neo4j;

pub use neo4j::Neo4jCodeGraph;

use async_trait::async_trait;
use rq_core::{RepoId, Result};

/// Kind of node a CONTAINS edge points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
    Directory,
    File,
}

impl ChildKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Directory => "Directory",
            Self::File => "File",
        }
    }
}

/// Trait for code-graph backends.
#[async_trait]
pub trait CodeGraph: Send + Sync + 'static {
    async fn upsert_directory(&self, repo_id: RepoId, path: &str) -> Result<()>;

    /// Link a parent Directory to a child Directory or File.
    async fn link_contains(
        &self,
        repo_id: RepoId,
        parent_path: &str,
        child_path: &str,
        child_kind: ChildKind,
    ) -> Result<()>;

    async fn upsert_file(&self, repo_id: RepoId, path: &str) -> Result<()>;

    /// Create or merge a Class node and its DEFINES_CLASS edge. The summary
    /// and base names are set on create only; inheritance edges are emitted
    /// separately once every Class node exists.
    async fn upsert_class(
        &self,
        repo_id: RepoId,
        file_path: &str,
        name: &str,
        docstring: &str,
        base_class_names: &[String],
    ) -> Result<()>;

    /// Create or merge a Function node. With `class_name` the function is a
    /// method linked via HAS_METHOD; otherwise it hangs off its file via
    /// DEFINES_FUNCTION.
    async fn upsert_function(
        &self,
        repo_id: RepoId,
        file_path: &str,
        name: &str,
        docstring: &str,
        class_name: Option<&str>,
    ) -> Result<()>;

    /// Add a CALLS edge. The callee is matched by `{name, repo_id}` only;
    /// when several functions share the name, every match gets an edge.
    async fn add_call(
        &self,
        repo_id: RepoId,
        caller_name: &str,
        caller_file: &str,
        callee_name: &str,
    ) -> Result<()>;

    /// Add an IMPORTS edge from a file to a (global) Module node.
    async fn add_import(&self, repo_id: RepoId, file_path: &str, module_name: &str) -> Result<()>;

    /// Add INHERITS_FROM edges to every base class that exists in the same
    /// repo; unresolvable base names are dropped.
    async fn add_inherits(
        &self,
        repo_id: RepoId,
        class_name: &str,
        file_path: &str,
        base_names: &[String],
    ) -> Result<()>;

    /// Run a read-only graph query and return one record per row.
    async fn run_query(&self, query: &str) -> Result<Vec<serde_json::Value>>;

    /// Textual schema of the graph, for prompt construction.
    fn schema_description(&self) -> String;

    /// Remove every node carrying this `repo_id` together with its
    /// relationships. Global Module nodes are left in place.
    async fn cascade_delete(&self, repo_id: RepoId) -> Result<()>;
}

/// Schema text shared by every backend that implements the standard layout.
///
/// This is what the graph-query generator sees, so it names exactly the
/// labels, properties, and relationship types the ingestion pipeline writes.
pub const GRAPH_SCHEMA: &str = "\
Node labels and properties:
  Directory {path: STRING, repo_id: STRING, summary: STRING}
  File {path: STRING, repo_id: STRING, summary: STRING}
  Class {name: STRING, file_path: STRING, repo_id: STRING, summary: STRING, base_classes: LIST}
  Function {name: STRING, file_path: STRING, repo_id: STRING, summary: STRING}
  Module {name: STRING}
Relationships:
  (Directory)-[:CONTAINS]->(Directory|File)
  (File)-[:DEFINES_CLASS]->(Class)
  (File)-[:DEFINES_FUNCTION]->(Function)
  (Class)-[:HAS_METHOD]->(Function)
  (Class)-[:INHERITS_FROM]->(Class)
  (Function)-[:CALLS]->(Function)
  (File)-[:IMPORTS]->(Module)";
