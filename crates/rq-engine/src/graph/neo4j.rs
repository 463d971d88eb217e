//! Neo4j-backed code graph.
//!
//! All statements are parameterized Cypher with merge semantics; `repo_id`
//! is part of every node's matching key so repeated ingestion converges to
//! the same graph.

use async_trait::async_trait;
use neo4rs::{Graph, Query};
use rq_core::{RepoId, Result};
use tracing::debug;

use super::{ChildKind, CodeGraph, GRAPH_SCHEMA};

pub struct Neo4jCodeGraph {
    graph: Graph,
}

impl Neo4jCodeGraph {
    /// Connect to a Neo4j instance over bolt.
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .map_err(|e| rq_core::Error::UpstreamUnavailable(format!("neo4j connect: {e}")))?;
        Ok(Self { graph })
    }

    async fn run(&self, query: Query) -> Result<()> {
        self.graph
            .run(query)
            .await
            .map_err(|e| rq_core::Error::UpstreamUnavailable(format!("neo4j write: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl CodeGraph for Neo4jCodeGraph {
    async fn upsert_directory(&self, repo_id: RepoId, path: &str) -> Result<()> {
        let query = Query::new(
            "MERGE (d:Directory {path: $path, repo_id: $repo_id}) \
             ON CREATE SET d.summary = ''"
                .into(),
        )
        .param("path", path)
        .param("repo_id", repo_id.to_string());
        self.run(query).await
    }

    async fn link_contains(
        &self,
        repo_id: RepoId,
        parent_path: &str,
        child_path: &str,
        child_kind: ChildKind,
    ) -> Result<()> {
        let query = Query::new(format!(
            "MATCH (parent:Directory {{path: $parent_path, repo_id: $repo_id}}) \
             MATCH (child:{} {{path: $child_path, repo_id: $repo_id}}) \
             MERGE (parent)-[:CONTAINS]->(child)",
            child_kind.label()
        ))
        .param("parent_path", parent_path)
        .param("child_path", child_path)
        .param("repo_id", repo_id.to_string());
        self.run(query).await
    }

    async fn upsert_file(&self, repo_id: RepoId, path: &str) -> Result<()> {
        let query = Query::new(
            "MERGE (f:File {path: $path, repo_id: $repo_id}) \
             ON CREATE SET f.summary = ''"
                .into(),
        )
        .param("path", path)
        .param("repo_id", repo_id.to_string());
        self.run(query).await
    }

    async fn upsert_class(
        &self,
        repo_id: RepoId,
        file_path: &str,
        name: &str,
        docstring: &str,
        base_class_names: &[String],
    ) -> Result<()> {
        let query = Query::new(
            "MERGE (file:File {path: $file_path, repo_id: $repo_id}) \
             MERGE (class:Class {name: $name, file_path: $file_path, repo_id: $repo_id}) \
             ON CREATE SET class.summary = $docstring, class.base_classes = $base_classes \
             MERGE (file)-[:DEFINES_CLASS]->(class)"
                .into(),
        )
        .param("file_path", file_path)
        .param("name", name)
        .param("docstring", docstring)
        .param("base_classes", base_class_names.to_vec())
        .param("repo_id", repo_id.to_string());
        self.run(query).await
    }

    async fn upsert_function(
        &self,
        repo_id: RepoId,
        file_path: &str,
        name: &str,
        docstring: &str,
        class_name: Option<&str>,
    ) -> Result<()> {
        let query = match class_name {
            Some(class_name) => Query::new(
                "MATCH (class:Class {name: $class_name, file_path: $file_path, repo_id: $repo_id}) \
                 MERGE (func:Function {name: $name, file_path: $file_path, repo_id: $repo_id}) \
                 ON CREATE SET func.summary = $docstring \
                 MERGE (class)-[:HAS_METHOD]->(func)"
                    .into(),
            )
            .param("class_name", class_name),
            None => Query::new(
                "MATCH (file:File {path: $file_path, repo_id: $repo_id}) \
                 MERGE (func:Function {name: $name, file_path: $file_path, repo_id: $repo_id}) \
                 ON CREATE SET func.summary = $docstring \
                 MERGE (file)-[:DEFINES_FUNCTION]->(func)"
                    .into(),
            ),
        };

        let query = query
            .param("file_path", file_path)
            .param("name", name)
            .param("docstring", docstring)
            .param("repo_id", repo_id.to_string());
        self.run(query).await
    }

    async fn add_call(
        &self,
        repo_id: RepoId,
        caller_name: &str,
        caller_file: &str,
        callee_name: &str,
    ) -> Result<()> {
        let query = Query::new(
            "MATCH (caller:Function {name: $caller_name, file_path: $caller_file, repo_id: $repo_id}) \
             MATCH (callee:Function {name: $callee_name, repo_id: $repo_id}) \
             MERGE (caller)-[:CALLS]->(callee)"
                .into(),
        )
        .param("caller_name", caller_name)
        .param("caller_file", caller_file)
        .param("callee_name", callee_name)
        .param("repo_id", repo_id.to_string());
        self.run(query).await
    }

    async fn add_import(&self, repo_id: RepoId, file_path: &str, module_name: &str) -> Result<()> {
        // Module nodes are global import targets, deliberately not scoped
        // to a repo.
        let query = Query::new(
            "MERGE (file:File {path: $file_path, repo_id: $repo_id}) \
             MERGE (mod:Module {name: $module_name}) \
             MERGE (file)-[:IMPORTS]->(mod)"
                .into(),
        )
        .param("file_path", file_path)
        .param("module_name", module_name)
        .param("repo_id", repo_id.to_string());
        self.run(query).await
    }

    async fn add_inherits(
        &self,
        repo_id: RepoId,
        class_name: &str,
        file_path: &str,
        base_names: &[String],
    ) -> Result<()> {
        if base_names.is_empty() {
            return Ok(());
        }

        let query = Query::new(
            "MATCH (class:Class {name: $class_name, file_path: $file_path, repo_id: $repo_id}) \
             UNWIND $base_names AS base_name \
             MATCH (base:Class {name: base_name, repo_id: $repo_id}) \
             MERGE (class)-[:INHERITS_FROM]->(base)"
                .into(),
        )
        .param("class_name", class_name)
        .param("file_path", file_path)
        .param("base_names", base_names.to_vec())
        .param("repo_id", repo_id.to_string());
        self.run(query).await
    }

    async fn run_query(&self, query: &str) -> Result<Vec<serde_json::Value>> {
        debug!(query, "executing graph query");
        let mut stream = self
            .graph
            .execute(Query::new(query.to_string()))
            .await
            .map_err(|e| rq_core::Error::UpstreamUnavailable(format!("neo4j query: {e}")))?;

        let mut records = Vec::new();
        while let Some(row) = stream
            .next()
            .await
            .map_err(|e| rq_core::Error::UpstreamUnavailable(format!("neo4j row: {e}")))?
        {
            let record = row
                .to::<serde_json::Value>()
                .map_err(|e| rq_core::Error::Internal(format!("neo4j row decode: {e}")))?;
            records.push(record);
        }
        Ok(records)
    }

    fn schema_description(&self) -> String {
        GRAPH_SCHEMA.to_string()
    }

    async fn cascade_delete(&self, repo_id: RepoId) -> Result<()> {
        let query = Query::new("MATCH (n {repo_id: $repo_id}) DETACH DELETE n".into())
            .param("repo_id", repo_id.to_string());
        self.run(query).await
    }
}
