//! Repository ingestion pipeline.
//!
//! Orchestrates clone → walk → parse → two-pass graph population →
//! embedding → vector indexing for one repository. Re-running the pipeline
//! for the same repo id is observationally equivalent to a first run: the
//! prepare phase wipes the repo's graph nodes and vector namespace, and all
//! writes use merge semantics.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rq_core::{FileFacts, FunctionFacts, RepoId, Result};
use tracing::{info, warn};

use crate::embed::Embedder;
use crate::fetch::{clone_repo, remove_workdir};
use crate::graph::{ChildKind, CodeGraph};
use crate::parser::ParserRegistry;
use crate::vector::{record_id, ChunkKind, ChunkMetadata, VectorIndex, VectorRecord};

/// Directories never descended into: VCS metadata, dependency caches,
/// virtual environments, compiled-code caches.
const EXCLUDED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "__pycache__",
    "node_modules",
    "venv",
    ".venv",
    "target",
    ".mypy_cache",
    ".pytest_cache",
];

/// Sentinel path for the repository root directory.
const ROOT_DIR: &str = ".";

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Clones land in `<work_root>/<repo_id>`.
    pub work_root: PathBuf,
    pub embedding_batch_size: usize,
    pub embedding_request_delay: Duration,
}

impl IngestConfig {
    pub fn new(work_root: PathBuf) -> Self {
        Self {
            work_root,
            embedding_batch_size: 100,
            embedding_request_delay: Duration::from_millis(1500),
        }
    }
}

/// Counters reported after a successful run.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub files_seen: usize,
    pub files_parsed: usize,
    pub chunks_indexed: usize,
}

/// One embeddable chunk: a function or method description.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub text: String,
    pub id: String,
    pub metadata: ChunkMetadata,
}

pub struct IngestionPipeline {
    graph: Arc<dyn CodeGraph>,
    vectors: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    parser: ParserRegistry,
    config: IngestConfig,
}

impl IngestionPipeline {
    pub fn new(
        graph: Arc<dyn CodeGraph>,
        vectors: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        config: IngestConfig,
    ) -> Self {
        Self {
            graph,
            vectors,
            embedder,
            parser: ParserRegistry::new(),
            config,
        }
    }

    /// Run the full pipeline for one repository.
    ///
    /// The temporary clone is removed whether indexing succeeds or fails;
    /// status bookkeeping for the data-source row belongs to the caller.
    pub async fn run(&self, repo_id: RepoId, clone_url: &str) -> Result<IngestReport> {
        // Prepare: the scoped wipe is the only safe point to clear old
        // data, so a failure here aborts before anything else happens.
        info!(%repo_id, "ingestion: clearing existing data");
        self.graph.cascade_delete(repo_id).await?;
        self.vectors.delete_namespace(&repo_id.to_string()).await?;

        // Fetch.
        let workdir = self.config.work_root.join(repo_id.to_string());
        clone_repo(clone_url, &workdir).await?;

        let result = self.index_workdir(repo_id, &workdir).await;

        if let Err(e) = remove_workdir(&workdir).await {
            warn!(%repo_id, error = %e, "failed to remove temporary clone");
        }

        result
    }

    /// Walk, parse, and index an already-present working copy.
    pub async fn index_workdir(&self, repo_id: RepoId, root: &Path) -> Result<IngestReport> {
        let mut report = IngestReport::default();

        let parsed = self.walk_and_parse(repo_id, root, &mut report).await?;
        info!(%repo_id, files = report.files_seen, parsed = report.files_parsed, "walk complete");

        self.populate_graph(repo_id, &parsed).await?;
        info!(%repo_id, "graph population complete");

        let chunks = build_chunks(repo_id, &parsed);
        report.chunks_indexed = self.embed_and_index(repo_id, chunks).await?;
        info!(%repo_id, chunks = report.chunks_indexed, "vector indexing complete");

        Ok(report)
    }

    /// Breadth-first walk of the working copy. Upserts Directory/File nodes
    /// and CONTAINS edges as it goes, and parses every supported file. A
    /// file that fails to parse contributes no facts and does not abort the
    /// walk.
    async fn walk_and_parse(
        &self,
        repo_id: RepoId,
        root: &Path,
        report: &mut IngestReport,
    ) -> Result<BTreeMap<String, FileFacts>> {
        let mut parsed: BTreeMap<String, FileFacts> = BTreeMap::new();

        self.graph.upsert_directory(repo_id, ROOT_DIR).await?;

        let mut queue: VecDeque<PathBuf> = VecDeque::new();
        queue.push_back(PathBuf::new());

        while let Some(rel_dir) = queue.pop_front() {
            let abs_dir = root.join(&rel_dir);
            let parent_label = dir_label(&rel_dir);

            let mut entries: Vec<_> = std::fs::read_dir(&abs_dir)?
                .filter_map(|e| e.ok())
                .collect();
            entries.sort_by_key(|e| e.file_name());

            for entry in entries {
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                let rel_child = rel_dir.join(name);
                let child_path = path_label(&rel_child);
                let file_type = match entry.file_type() {
                    Ok(t) => t,
                    Err(_) => continue,
                };

                if file_type.is_dir() {
                    if EXCLUDED_DIRS.contains(&name) {
                        continue;
                    }
                    self.graph.upsert_directory(repo_id, &child_path).await?;
                    self.graph
                        .link_contains(repo_id, &parent_label, &child_path, ChildKind::Directory)
                        .await?;
                    queue.push_back(rel_child);
                } else if file_type.is_file() {
                    report.files_seen += 1;
                    self.graph.upsert_file(repo_id, &child_path).await?;
                    self.graph
                        .link_contains(repo_id, &parent_label, &child_path, ChildKind::File)
                        .await?;

                    if self.parser.supports_file(Path::new(name)) {
                        let bytes = std::fs::read(entry.path())?;
                        let source = String::from_utf8_lossy(&bytes);
                        match self.parser.parse_file(Path::new(name), &source) {
                            Ok(facts) => {
                                report.files_parsed += 1;
                                parsed.insert(child_path, facts);
                            }
                            Err(e) => {
                                warn!(%repo_id, file = %child_path, error = %e, "could not parse file");
                            }
                        }
                    }
                }
            }
        }

        Ok(parsed)
    }

    /// Two-pass graph population. CALLS and INHERITS_FROM reference nodes
    /// that may be defined in later files, so all nodes are written before
    /// any of those edges.
    async fn populate_graph(
        &self,
        repo_id: RepoId,
        parsed: &BTreeMap<String, FileFacts>,
    ) -> Result<()> {
        // Pass 1: nodes.
        for (file_path, facts) in parsed {
            for class in &facts.classes {
                self.graph
                    .upsert_class(
                        repo_id,
                        file_path,
                        &class.name,
                        &class.docstring,
                        &class.base_classes,
                    )
                    .await?;
                for method in &class.methods {
                    self.graph
                        .upsert_function(
                            repo_id,
                            file_path,
                            &method.name,
                            &method.docstring,
                            Some(&class.name),
                        )
                        .await?;
                }
            }
            for func in &facts.functions {
                self.graph
                    .upsert_function(repo_id, file_path, &func.name, &func.docstring, None)
                    .await?;
            }
        }

        // Pass 2: edges.
        for (file_path, facts) in parsed {
            for import in &facts.imports {
                self.graph
                    .add_import(repo_id, file_path, import.target_name())
                    .await?;
            }
            for func in &facts.functions {
                for callee in &func.calls {
                    self.graph
                        .add_call(repo_id, &func.name, file_path, callee)
                        .await?;
                }
            }
            for class in &facts.classes {
                for method in &class.methods {
                    for callee in &method.calls {
                        self.graph
                            .add_call(repo_id, &method.name, file_path, callee)
                            .await?;
                    }
                }
                self.graph
                    .add_inherits(repo_id, &class.name, file_path, &class.base_classes)
                    .await?;
            }
        }

        Ok(())
    }

    /// Embed chunks in batches and upsert them into the repo's namespace.
    /// A failed batch is skipped; partial vector coverage is acceptable.
    async fn embed_and_index(&self, repo_id: RepoId, chunks: Vec<Chunk>) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let namespace = repo_id.to_string();
        let batch_size = self.config.embedding_batch_size.max(1);
        let total_batches = chunks.len().div_ceil(batch_size);
        let mut indexed = 0;

        for (batch_no, batch) in chunks.chunks(batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();

            let vectors = match self.embedder.embed_batch(&texts).await {
                Ok(vectors) => vectors,
                Err(e) => {
                    warn!(%repo_id, batch = batch_no + 1, error = %e, "embedding batch failed, skipping");
                    continue;
                }
            };

            let records: Vec<VectorRecord> = batch
                .iter()
                .zip(vectors)
                .map(|(chunk, vector)| VectorRecord {
                    id: chunk.id.clone(),
                    vector,
                    metadata: chunk.metadata.clone(),
                })
                .collect();

            indexed += records.len();
            self.vectors.upsert(&namespace, records).await?;

            if batch_no + 1 < total_batches {
                tokio::time::sleep(self.config.embedding_request_delay).await;
            }
        }

        Ok(indexed)
    }
}

fn dir_label(rel: &Path) -> String {
    if rel.as_os_str().is_empty() {
        ROOT_DIR.to_string()
    } else {
        path_label(rel)
    }
}

fn path_label(rel: &Path) -> String {
    rel.to_string_lossy().replace('\\', "/")
}

/// Build one embeddable chunk per function and per method.
pub fn build_chunks(repo_id: RepoId, parsed: &BTreeMap<String, FileFacts>) -> Vec<Chunk> {
    let repo = repo_id.to_string();
    let mut chunks = Vec::new();

    for (file_path, facts) in parsed {
        for func in &facts.functions {
            chunks.push(Chunk {
                text: chunk_text(&func.name, None, file_path, func),
                id: record_id(&repo, file_path, &func.name),
                metadata: ChunkMetadata {
                    repo_id: repo.clone(),
                    file_path: file_path.clone(),
                    function_name: func.name.clone(),
                    kind: ChunkKind::Function,
                    class_name: None,
                },
            });
        }
        for class in &facts.classes {
            for method in &class.methods {
                chunks.push(Chunk {
                    text: chunk_text(&method.name, Some(&class.name), file_path, method),
                    id: record_id(&repo, file_path, &method.name),
                    metadata: ChunkMetadata {
                        repo_id: repo.clone(),
                        file_path: file_path.clone(),
                        function_name: method.name.clone(),
                        kind: ChunkKind::Method,
                        class_name: Some(class.name.clone()),
                    },
                });
            }
        }
    }

    chunks
}

fn chunk_text(name: &str, class_name: Option<&str>, file_path: &str, func: &FunctionFacts) -> String {
    let header = match class_name {
        Some(class) => format!("Method: {class}.{name}"),
        None => format!("Function: {name}"),
    };
    let args = if func.args.is_empty() {
        "None".to_string()
    } else {
        func.args.join(", ")
    };
    format!(
        "{header}\nFile: {file_path}\nArguments: {args}\nDocumentation:\n{}",
        func.docstring
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn func(name: &str, args: &[&str], doc: &str) -> FunctionFacts {
        FunctionFacts {
            name: name.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            docstring: doc.into(),
            source_code: String::new(),
            calls: vec![],
        }
    }

    #[test]
    fn chunk_text_formats_function_and_method() {
        let f = func("open", &[], "Open a connection.");
        let text = chunk_text("open", None, "a/svc.py", &f);
        assert_eq!(
            text,
            "Function: open\nFile: a/svc.py\nArguments: None\nDocumentation:\nOpen a connection."
        );

        let m = func("connect", &["self", "addr"], "");
        let text = chunk_text("connect", Some("Peer"), "a/svc.py", &m);
        assert!(text.starts_with("Method: Peer.connect\n"));
        assert!(text.contains("Arguments: self, addr\n"));
    }

    #[test]
    fn dir_labels_use_root_sentinel() {
        assert_eq!(dir_label(Path::new("")), ".");
        assert_eq!(dir_label(Path::new("a")), "a");
        assert_eq!(path_label(Path::new("a/b.py")), "a/b.py");
    }
}
