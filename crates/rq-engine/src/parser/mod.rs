pub mod python;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use rq_core::{FileFacts, Result};

/// Trait implemented by each language-specific analyzer.
///
/// An analyzer turns one source file into structured facts: imports,
/// classes with their methods and base names, and standalone functions
/// with their outgoing call names. Resolution of call names across files
/// is the ingestion pipeline's job, not the analyzer's.
pub trait LanguageParser: Send + Sync {
    /// File extensions this parser handles (without leading dot).
    fn extensions(&self) -> &[&str];

    /// Extract all facts from one file's source text.
    fn parse(&self, source: &str) -> Result<FileFacts>;
}

/// Central registry that maps file extensions to their language parsers.
///
/// Each parser is wrapped in an `Arc` so multiple extensions can share the
/// same parser instance without cloning.
pub struct ParserRegistry {
    parsers: HashMap<String, Arc<dyn LanguageParser>>,
}

impl ParserRegistry {
    /// Create a new registry with all built-in language parsers registered.
    pub fn new() -> Self {
        let mut parsers: HashMap<String, Arc<dyn LanguageParser>> = HashMap::new();

        let py = Arc::new(python::PythonParser::new()) as Arc<dyn LanguageParser>;
        for ext in py.extensions() {
            parsers.insert(ext.to_string(), Arc::clone(&py));
        }

        Self { parsers }
    }

    /// Return `true` if the file extension is handled by a registered parser.
    pub fn supports_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.parsers.contains_key(ext))
            .unwrap_or(false)
    }

    /// Parse a source file, selecting the parser by file extension.
    ///
    /// Returns `Error::Parse` when no parser is registered for the
    /// extension (or the path has no extension).
    pub fn parse_file(&self, path: &Path, source: &str) -> Result<FileFacts> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| rq_core::Error::Parse(format!("no extension: {}", path.display())))?;

        let parser = self
            .parsers
            .get(ext)
            .ok_or_else(|| rq_core::Error::Parse(format!("unsupported language: {ext}")))?;

        parser.parse(source)
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}
