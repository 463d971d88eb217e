//! repliq indexing engine.
//!
//! Turns a cloned repository into a dual representation: a property graph
//! of structural code facts and a vector index of embedded function
//! descriptions.

pub mod embed;
pub mod fetch;
pub mod graph;
pub mod ingest;
pub mod parser;
pub mod vector;

pub use embed::{Embedder, GeminiEmbedder};
pub use fetch::{build_clone_url, CloneUrlProvider, FileReader, GitFileReader};
pub use graph::{ChildKind, CodeGraph, Neo4jCodeGraph};
pub use ingest::{IngestConfig, IngestReport, IngestionPipeline};
pub use parser::{LanguageParser, ParserRegistry};
pub use vector::{ChunkKind, ChunkMetadata, QdrantIndex, VectorIndex, VectorMatch, VectorRecord};
