use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rq_core::{RepoId, Result};
use rq_engine::graph::{ChildKind, CodeGraph, GRAPH_SCHEMA};
use rq_engine::ingest::{IngestConfig, IngestionPipeline};
use rq_engine::vector::{ChunkMetadata, VectorIndex, VectorMatch, VectorRecord};
use rq_engine::Embedder;
use uuid::Uuid;

// ── In-memory fakes behind the pipeline's seams ──

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct GraphSnapshot {
    directories: BTreeSet<(String, String)>,
    files: BTreeSet<(String, String)>,
    classes: BTreeSet<(String, String, String)>,
    functions: BTreeSet<(String, String, String)>,
    modules: BTreeSet<String>,
    contains: BTreeSet<(String, String, String, String)>,
    has_method: BTreeSet<(String, String, String)>,
    calls: BTreeSet<(String, String, String, String)>,
    imports: BTreeSet<(String, String, String)>,
    inherits: BTreeSet<(String, String, String)>,
}

#[derive(Default)]
struct MemoryGraph {
    data: Mutex<GraphSnapshot>,
}

impl MemoryGraph {
    fn snapshot(&self) -> GraphSnapshot {
        self.data.lock().unwrap().clone()
    }
}

#[async_trait]
impl CodeGraph for MemoryGraph {
    async fn upsert_directory(&self, repo_id: RepoId, path: &str) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        data.directories.insert((repo_id.to_string(), path.to_string()));
        Ok(())
    }

    async fn link_contains(
        &self,
        repo_id: RepoId,
        parent_path: &str,
        child_path: &str,
        child_kind: ChildKind,
    ) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        data.contains.insert((
            repo_id.to_string(),
            parent_path.to_string(),
            child_path.to_string(),
            child_kind.label().to_string(),
        ));
        Ok(())
    }

    async fn upsert_file(&self, repo_id: RepoId, path: &str) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        data.files.insert((repo_id.to_string(), path.to_string()));
        Ok(())
    }

    async fn upsert_class(
        &self,
        repo_id: RepoId,
        file_path: &str,
        name: &str,
        _docstring: &str,
        _base_class_names: &[String],
    ) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        data.classes
            .insert((repo_id.to_string(), file_path.to_string(), name.to_string()));
        Ok(())
    }

    async fn upsert_function(
        &self,
        repo_id: RepoId,
        file_path: &str,
        name: &str,
        _docstring: &str,
        class_name: Option<&str>,
    ) -> Result<()> {
        let repo = repo_id.to_string();
        let mut data = self.data.lock().unwrap();
        if let Some(class) = class_name {
            // Mirrors the MATCH-then-MERGE statement: no class node, no
            // method node.
            if !data
                .classes
                .contains(&(repo.clone(), file_path.to_string(), class.to_string()))
            {
                return Ok(());
            }
            data.has_method
                .insert((repo.clone(), class.to_string(), name.to_string()));
        }
        data.functions.insert((repo, file_path.to_string(), name.to_string()));
        Ok(())
    }

    async fn add_call(
        &self,
        repo_id: RepoId,
        caller_name: &str,
        caller_file: &str,
        callee_name: &str,
    ) -> Result<()> {
        let repo = repo_id.to_string();
        let mut data = self.data.lock().unwrap();
        if !data.functions.contains(&(
            repo.clone(),
            caller_file.to_string(),
            caller_name.to_string(),
        )) {
            return Ok(());
        }
        let callees: Vec<String> = data
            .functions
            .iter()
            .filter(|(r, _, name)| *r == repo && name == callee_name)
            .map(|(_, _, name)| name.clone())
            .collect();
        for callee in callees {
            data.calls.insert((
                repo.clone(),
                caller_file.to_string(),
                caller_name.to_string(),
                callee,
            ));
        }
        Ok(())
    }

    async fn add_import(&self, repo_id: RepoId, file_path: &str, module_name: &str) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        data.modules.insert(module_name.to_string());
        data.imports.insert((
            repo_id.to_string(),
            file_path.to_string(),
            module_name.to_string(),
        ));
        Ok(())
    }

    async fn add_inherits(
        &self,
        repo_id: RepoId,
        class_name: &str,
        _file_path: &str,
        base_names: &[String],
    ) -> Result<()> {
        let repo = repo_id.to_string();
        let mut data = self.data.lock().unwrap();
        for base in base_names {
            let exists = data
                .classes
                .iter()
                .any(|(r, _, name)| *r == repo && name == base);
            if exists {
                data.inherits
                    .insert((repo.clone(), class_name.to_string(), base.clone()));
            }
        }
        Ok(())
    }

    async fn run_query(&self, _query: &str) -> Result<Vec<serde_json::Value>> {
        Ok(vec![])
    }

    fn schema_description(&self) -> String {
        GRAPH_SCHEMA.to_string()
    }

    async fn cascade_delete(&self, repo_id: RepoId) -> Result<()> {
        let repo = repo_id.to_string();
        let mut data = self.data.lock().unwrap();
        data.directories.retain(|(r, _)| *r != repo);
        data.files.retain(|(r, _)| *r != repo);
        data.classes.retain(|(r, _, _)| *r != repo);
        data.functions.retain(|(r, _, _)| *r != repo);
        data.contains.retain(|(r, _, _, _)| *r != repo);
        data.has_method.retain(|(r, _, _)| *r != repo);
        data.calls.retain(|(r, _, _, _)| *r != repo);
        data.imports.retain(|(r, _, _)| *r != repo);
        data.inherits.retain(|(r, _, _)| *r != repo);
        Ok(())
    }
}

#[derive(Default)]
struct MemoryVectors {
    namespaces: Mutex<BTreeMap<String, BTreeMap<String, ChunkMetadata>>>,
}

impl MemoryVectors {
    fn ids(&self, namespace: &str) -> Vec<String> {
        self.namespaces
            .lock()
            .unwrap()
            .get(namespace)
            .map(|ns| ns.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl VectorIndex for MemoryVectors {
    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> Result<()> {
        let mut namespaces = self.namespaces.lock().unwrap();
        let ns = namespaces.entry(namespace.to_string()).or_default();
        for record in records {
            ns.insert(record.id, record.metadata);
        }
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        _vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<VectorMatch>> {
        let namespaces = self.namespaces.lock().unwrap();
        Ok(namespaces
            .get(namespace)
            .map(|ns| {
                ns.iter()
                    .take(top_k)
                    .map(|(id, metadata)| VectorMatch {
                        id: id.clone(),
                        score: 1.0,
                        metadata: metadata.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        self.namespaces.lock().unwrap().remove(namespace);
        Ok(())
    }
}

struct StubEmbedder;

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| vec![t.len() as f32, 0.0, 0.0, 0.0])
            .collect())
    }

    fn dimension(&self) -> u64 {
        4
    }
}

struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(rq_core::Error::UpstreamUnavailable("embedding quota".into()))
    }

    fn dimension(&self) -> u64 {
        4
    }
}

// ── Fixtures ──

fn toy_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("a")).unwrap();
    std::fs::write(dir.path().join("a/__init__.py"), "").unwrap();
    std::fs::write(
        dir.path().join("a/svc.py"),
        r#"
class Peer:
    def connect(self):
        self.open()

def open(self):
    pass
"#,
    )
    .unwrap();
    dir
}

struct Harness {
    graph: Arc<MemoryGraph>,
    vectors: Arc<MemoryVectors>,
    pipeline: IngestionPipeline,
}

fn harness(work_root: &Path, embedder: Arc<dyn Embedder>) -> Harness {
    let graph = Arc::new(MemoryGraph::default());
    let vectors = Arc::new(MemoryVectors::default());
    let mut config = IngestConfig::new(work_root.to_path_buf());
    config.embedding_request_delay = Duration::from_millis(0);
    let pipeline = IngestionPipeline::new(graph.clone(), vectors.clone(), embedder, config);
    Harness { graph, vectors, pipeline }
}

/// Wipe + index, mirroring the full run minus the clone step.
async fn ingest(h: &Harness, repo_id: RepoId, root: &Path) -> rq_engine::IngestReport {
    h.graph.cascade_delete(repo_id).await.unwrap();
    h.vectors.delete_namespace(&repo_id.to_string()).await.unwrap();
    h.pipeline.index_workdir(repo_id, root).await.unwrap()
}

// ── Scenarios ──

#[tokio::test]
async fn ingest_toy_repo_builds_expected_graph_and_vectors() {
    let repo = toy_repo();
    let work = tempfile::tempdir().unwrap();
    let h = harness(work.path(), Arc::new(StubEmbedder));
    let repo_id = Uuid::new_v4();
    let r = repo_id.to_string();

    let report = ingest(&h, repo_id, repo.path()).await;
    assert_eq!(report.files_seen, 2);
    assert_eq!(report.files_parsed, 2);

    let data = h.graph.snapshot();

    // File nodes for both files.
    assert!(data.files.contains(&(r.clone(), "a/__init__.py".into())));
    assert!(data.files.contains(&(r.clone(), "a/svc.py".into())));

    // Class Peer with method connect; standalone function open.
    assert!(data.classes.contains(&(r.clone(), "a/svc.py".into(), "Peer".into())));
    assert!(data.has_method.contains(&(r.clone(), "Peer".into(), "connect".into())));
    assert!(data.functions.contains(&(r.clone(), "a/svc.py".into(), "open".into())));

    // CALLS edge from Peer.connect to open, resolved by name.
    assert!(
        data.calls
            .contains(&(r.clone(), "a/svc.py".into(), "connect".into(), "open".into())),
        "calls: {:?}",
        data.calls
    );

    // Directory hierarchy: . -> a -> both files.
    assert!(data
        .contains
        .contains(&(r.clone(), ".".into(), "a".into(), "Directory".into())));
    assert!(data
        .contains
        .contains(&(r.clone(), "a".into(), "a/svc.py".into(), "File".into())));
    assert!(data
        .contains
        .contains(&(r.clone(), "a".into(), "a/__init__.py".into(), "File".into())));

    // Vector namespace holds entries for connect and open.
    let ids = h.vectors.ids(&r);
    assert!(ids.contains(&format!("{r}:a/svc.py:connect")), "ids: {ids:?}");
    assert!(ids.contains(&format!("{r}:a/svc.py:open")), "ids: {ids:?}");
    assert_eq!(report.chunks_indexed, 2);
}

#[tokio::test]
async fn reingest_is_idempotent() {
    let repo = toy_repo();
    let work = tempfile::tempdir().unwrap();
    let h = harness(work.path(), Arc::new(StubEmbedder));
    let repo_id = Uuid::new_v4();

    ingest(&h, repo_id, repo.path()).await;
    let first = h.graph.snapshot();
    let first_ids = h.vectors.ids(&repo_id.to_string());

    ingest(&h, repo_id, repo.path()).await;
    let second = h.graph.snapshot();
    let second_ids = h.vectors.ids(&repo_id.to_string());

    assert_eq!(first, second);
    assert_eq!(first_ids, second_ids);
}

#[tokio::test]
async fn calls_resolve_across_files_regardless_of_walk_order() {
    let repo = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(repo.path().join("a")).unwrap();
    std::fs::create_dir_all(repo.path().join("z")).unwrap();
    // The caller's file sorts before the callee's, so resolution only
    // works because all nodes land before any CALLS edge.
    std::fs::write(repo.path().join("a/app.py"), "def main():\n    serve()\n").unwrap();
    std::fs::write(repo.path().join("z/server.py"), "def serve():\n    pass\n").unwrap();

    let work = tempfile::tempdir().unwrap();
    let h = harness(work.path(), Arc::new(StubEmbedder));
    let repo_id = Uuid::new_v4();
    let r = repo_id.to_string();

    ingest(&h, repo_id, repo.path()).await;
    let data = h.graph.snapshot();

    assert!(
        data.calls
            .contains(&(r.clone(), "a/app.py".into(), "main".into(), "serve".into())),
        "calls: {:?}",
        data.calls
    );

    // No dangling endpoints: every CALLS edge connects existing functions
    // in the same repo.
    for (edge_repo, caller_file, caller, callee) in &data.calls {
        assert!(data
            .functions
            .contains(&(edge_repo.clone(), caller_file.clone(), caller.clone())));
        assert!(data
            .functions
            .iter()
            .any(|(fr, _, name)| fr == edge_repo && name == callee));
    }
}

#[tokio::test]
async fn inherits_edges_only_link_existing_classes() {
    let repo = tempfile::tempdir().unwrap();
    std::fs::write(
        repo.path().join("models.py"),
        r#"
class Base:
    pass

class Peer(Base, ExternalMixin):
    pass
"#,
    )
    .unwrap();

    let work = tempfile::tempdir().unwrap();
    let h = harness(work.path(), Arc::new(StubEmbedder));
    let repo_id = Uuid::new_v4();
    let r = repo_id.to_string();

    ingest(&h, repo_id, repo.path()).await;
    let data = h.graph.snapshot();

    assert!(data.inherits.contains(&(r.clone(), "Peer".into(), "Base".into())));
    // ExternalMixin is not defined in the repo, so no edge exists.
    assert!(!data
        .inherits
        .iter()
        .any(|(_, _, base)| base == "ExternalMixin"));
}

#[tokio::test]
async fn vendor_directories_are_excluded() {
    let repo = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(repo.path().join("src")).unwrap();
    std::fs::create_dir_all(repo.path().join(".git")).unwrap();
    std::fs::create_dir_all(repo.path().join("node_modules/pkg")).unwrap();
    std::fs::create_dir_all(repo.path().join("venv/lib")).unwrap();
    std::fs::create_dir_all(repo.path().join("__pycache__")).unwrap();
    std::fs::write(repo.path().join("src/app.py"), "def run():\n    pass\n").unwrap();
    std::fs::write(repo.path().join(".git/config"), "[core]\n").unwrap();
    std::fs::write(repo.path().join("node_modules/pkg/index.js"), "x").unwrap();
    std::fs::write(repo.path().join("venv/lib/site.py"), "def hidden():\n    pass\n").unwrap();
    std::fs::write(repo.path().join("__pycache__/app.pyc"), "x").unwrap();

    let work = tempfile::tempdir().unwrap();
    let h = harness(work.path(), Arc::new(StubEmbedder));
    let repo_id = Uuid::new_v4();
    let r = repo_id.to_string();

    ingest(&h, repo_id, repo.path()).await;
    let data = h.graph.snapshot();

    assert!(data.files.contains(&(r.clone(), "src/app.py".into())));
    for (_, path) in &data.files {
        assert!(
            !path.starts_with(".git")
                && !path.starts_with("node_modules")
                && !path.starts_with("venv")
                && !path.starts_with("__pycache__"),
            "vendor path leaked into graph: {path}"
        );
    }
    assert!(!data.functions.iter().any(|(_, _, name)| name == "hidden"));
}

#[tokio::test]
async fn parse_error_in_one_file_does_not_abort_ingestion() {
    let repo = toy_repo();
    std::fs::write(repo.path().join("a/broken.py"), "def broken(:\n    pass\n").unwrap();

    let work = tempfile::tempdir().unwrap();
    let h = harness(work.path(), Arc::new(StubEmbedder));
    let repo_id = Uuid::new_v4();
    let r = repo_id.to_string();

    let report = ingest(&h, repo_id, repo.path()).await;
    let data = h.graph.snapshot();

    // The broken file is present as a File node but contributed no facts.
    assert!(data.files.contains(&(r.clone(), "a/broken.py".into())));
    assert_eq!(report.files_seen, 3);
    assert_eq!(report.files_parsed, 2);

    // Everything else survived.
    assert!(data.classes.contains(&(r.clone(), "a/svc.py".into(), "Peer".into())));
}

#[tokio::test]
async fn embedding_failure_leaves_graph_intact() {
    let repo = toy_repo();
    let work = tempfile::tempdir().unwrap();
    let h = harness(work.path(), Arc::new(FailingEmbedder));
    let repo_id = Uuid::new_v4();
    let r = repo_id.to_string();

    let report = ingest(&h, repo_id, repo.path()).await;

    assert_eq!(report.chunks_indexed, 0);
    assert!(h.vectors.ids(&r).is_empty());
    assert!(h
        .graph
        .snapshot()
        .classes
        .contains(&(r.clone(), "a/svc.py".into(), "Peer".into())));
}

#[tokio::test]
async fn cascade_delete_clears_repo_scope_only() {
    let repo = toy_repo();
    let work = tempfile::tempdir().unwrap();
    let h = harness(work.path(), Arc::new(StubEmbedder));
    let repo_a = Uuid::new_v4();
    let repo_b = Uuid::new_v4();

    ingest(&h, repo_a, repo.path()).await;
    ingest(&h, repo_b, repo.path()).await;

    h.graph.cascade_delete(repo_a).await.unwrap();
    h.vectors.delete_namespace(&repo_a.to_string()).await.unwrap();

    let data = h.graph.snapshot();
    let a = repo_a.to_string();
    let b = repo_b.to_string();

    assert!(!data.files.iter().any(|(r, _)| *r == a));
    assert!(!data.functions.iter().any(|(r, _, _)| *r == a));
    assert!(!data.calls.iter().any(|(r, _, _, _)| *r == a));
    assert!(h.vectors.ids(&a).is_empty());

    // The other repo is untouched.
    assert!(data.files.iter().any(|(r, _)| *r == b));
    assert!(!h.vectors.ids(&b).is_empty());
}
