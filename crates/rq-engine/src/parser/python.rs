use rq_core::{ClassFacts, FileFacts, FunctionFacts, ImportFact, Result};
use tree_sitter::{Node, Parser};

use super::LanguageParser;

/// Python analyzer backed by tree-sitter.
///
/// Extracts imports, classes (with methods and base names), and standalone
/// functions. Function bodies are walked once for call heads, so calls made
/// inside nested `def`s surface on the enclosing function; the nested
/// functions themselves are not emitted.
pub struct PythonParser;

impl PythonParser {
    pub fn new() -> Self {
        Self
    }

    fn create_parser() -> Result<Parser> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| rq_core::Error::Parse(format!("failed to load Python grammar: {e}")))?;
        Ok(parser)
    }

    fn node_text<'a>(node: &Node, source: &'a str) -> &'a str {
        node.utf8_text(source.as_bytes()).unwrap_or("")
    }

    /// Extract the docstring from a function or class body: the first
    /// statement, when it is a bare string expression. Returns an empty
    /// string when absent, matching the facts contract.
    fn extract_docstring(node: &Node, source: &str) -> String {
        let Some(body) = node.child_by_field_name("body") else {
            return String::new();
        };
        let Some(first_stmt) = body.named_child(0) else {
            return String::new();
        };
        if first_stmt.kind() != "expression_statement" {
            return String::new();
        }
        let Some(expr) = first_stmt.child(0) else {
            return String::new();
        };
        if expr.kind() != "string" {
            return String::new();
        }

        let raw = Self::node_text(&expr, source);
        Self::strip_string_delimiters(raw).trim().to_string()
    }

    /// Strip quote delimiters (and any `r`/`b`/`f` prefix) from a string
    /// literal's source text.
    fn strip_string_delimiters(raw: &str) -> &str {
        let body = raw.trim_start_matches(|c: char| c.is_ascii_alphabetic());
        for delim in ["\"\"\"", "'''", "\"", "'"] {
            if let Some(inner) = body
                .strip_prefix(delim)
                .and_then(|s| s.strip_suffix(delim))
            {
                return inner;
            }
        }
        body
    }

    /// Argument names from a `parameters` node, in declaration order.
    /// Splat parameters (`*args`, `**kwargs`) and bare separators are
    /// skipped, leaving plain, typed, and defaulted names.
    fn extract_args(node: &Node, source: &str) -> Vec<String> {
        let Some(params) = node.child_by_field_name("parameters") else {
            return Vec::new();
        };

        let mut args = Vec::new();
        let mut cursor = params.walk();
        for child in params.named_children(&mut cursor) {
            match child.kind() {
                "identifier" => {
                    args.push(Self::node_text(&child, source).to_string());
                }
                "default_parameter" | "typed_default_parameter" => {
                    if let Some(name) = child.child_by_field_name("name") {
                        if name.kind() == "identifier" {
                            args.push(Self::node_text(&name, source).to_string());
                        }
                    }
                }
                "typed_parameter" => {
                    if let Some(name) = child.named_child(0) {
                        if name.kind() == "identifier" {
                            args.push(Self::node_text(&name, source).to_string());
                        }
                    }
                }
                _ => {}
            }
        }
        args
    }

    /// Collect the invocation-head name of every `call` in the subtree.
    /// `a.b.c()` records `c`; duplicates keep their first position only.
    fn collect_calls(node: &Node, source: &str, seen: &mut Vec<String>) {
        if node.kind() == "call" {
            if let Some(func) = node.child_by_field_name("function") {
                let callee = match func.kind() {
                    "attribute" => func
                        .child_by_field_name("attribute")
                        .map(|a| Self::node_text(&a, source).to_string()),
                    "identifier" => Some(Self::node_text(&func, source).to_string()),
                    _ => None,
                };
                if let Some(name) = callee {
                    if !name.is_empty() && !seen.iter().any(|c| c == &name) {
                        seen.push(name);
                    }
                }
            }
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            Self::collect_calls(&child, source, seen);
        }
    }

    /// Build `FunctionFacts` from a `function_definition` node.
    fn extract_function(node: &Node, source: &str) -> Option<FunctionFacts> {
        let name_node = node.child_by_field_name("name")?;
        let name = Self::node_text(&name_node, source).to_string();
        if name.is_empty() {
            return None;
        }

        let mut calls = Vec::new();
        if let Some(body) = node.child_by_field_name("body") {
            Self::collect_calls(&body, source, &mut calls);
        }

        Some(FunctionFacts {
            name,
            args: Self::extract_args(node, source),
            docstring: Self::extract_docstring(node, source),
            source_code: Self::node_text(node, source).to_string(),
            calls,
        })
    }

    /// Base-class names from the `superclasses` argument list. Only plain
    /// identifiers are kept; attribute bases like `module.Base` cannot be
    /// matched by name within the repo.
    fn extract_base_names(node: &Node, source: &str) -> Vec<String> {
        let Some(supers) = node.child_by_field_name("superclasses") else {
            return Vec::new();
        };

        let mut bases = Vec::new();
        let mut cursor = supers.walk();
        for child in supers.named_children(&mut cursor) {
            if child.kind() == "identifier" {
                bases.push(Self::node_text(&child, source).to_string());
            }
        }
        bases
    }

    /// Build `ClassFacts` from a `class_definition` node, collecting every
    /// method defined directly in the class body (decorated or not).
    fn extract_class(node: &Node, source: &str) -> Option<ClassFacts> {
        let name_node = node.child_by_field_name("name")?;
        let name = Self::node_text(&name_node, source).to_string();
        if name.is_empty() {
            return None;
        }

        let mut methods = Vec::new();
        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for stmt in body.named_children(&mut cursor) {
                let def = match stmt.kind() {
                    "function_definition" => Some(stmt),
                    "decorated_definition" => stmt
                        .child_by_field_name("definition")
                        .filter(|d| d.kind() == "function_definition"),
                    _ => None,
                };
                if let Some(def) = def {
                    if let Some(method) = Self::extract_function(&def, source) {
                        methods.push(method);
                    }
                }
            }
        }

        Some(ClassFacts {
            name,
            docstring: Self::extract_docstring(node, source),
            base_classes: Self::extract_base_names(node, source),
            methods,
        })
    }

    /// Imports from an `import_statement`, e.g. `import os, sys as system`.
    fn extract_import_statement(node: &Node, source: &str) -> Vec<ImportFact> {
        let mut imports = Vec::new();
        let mut cursor = node.walk();

        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "dotted_name" => {
                    let module = Self::node_text(&child, source).to_string();
                    if !module.is_empty() {
                        imports.push(ImportFact { module, name: None, alias: None });
                    }
                }
                "aliased_import" => {
                    if let Some(name_node) = child.child_by_field_name("name") {
                        let module = Self::node_text(&name_node, source).to_string();
                        let alias = child
                            .child_by_field_name("alias")
                            .map(|a| Self::node_text(&a, source).to_string());
                        imports.push(ImportFact { module, name: None, alias });
                    }
                }
                _ => {}
            }
        }

        imports
    }

    /// Imports from an `import_from_statement`, e.g.
    /// `from os.path import join, exists as there` or `from . import util`.
    fn extract_import_from_statement(node: &Node, source: &str) -> Vec<ImportFact> {
        let module = node
            .child_by_field_name("module_name")
            .map(|m| Self::node_text(&m, source).to_string())
            .unwrap_or_default();

        let mut imports = Vec::new();
        let mut cursor = node.walk();
        let mut past_import_keyword = false;

        for child in node.children(&mut cursor) {
            if child.kind() == "import" {
                past_import_keyword = true;
                continue;
            }
            if !past_import_keyword {
                continue;
            }

            match child.kind() {
                "dotted_name" | "identifier" => {
                    let name = Self::node_text(&child, source).to_string();
                    if !name.is_empty() {
                        imports.push(ImportFact {
                            module: module.clone(),
                            name: Some(name),
                            alias: None,
                        });
                    }
                }
                "aliased_import" => {
                    if let Some(name_node) = child.child_by_field_name("name") {
                        let name = Self::node_text(&name_node, source).to_string();
                        let alias = child
                            .child_by_field_name("alias")
                            .map(|a| Self::node_text(&a, source).to_string());
                        imports.push(ImportFact { module: module.clone(), name: Some(name), alias });
                    }
                }
                "wildcard_import" => {
                    imports.push(ImportFact {
                        module: module.clone(),
                        name: Some("*".to_string()),
                        alias: None,
                    });
                }
                _ => {}
            }
        }

        imports
    }
}

impl Default for PythonParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageParser for PythonParser {
    fn extensions(&self) -> &[&str] {
        &["py"]
    }

    fn parse(&self, source: &str) -> Result<FileFacts> {
        if source.trim().is_empty() {
            return Ok(FileFacts::default());
        }

        let mut parser = Self::create_parser()?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| rq_core::Error::Parse("tree-sitter parse returned None".into()))?;
        let root = tree.root_node();

        // A file with syntax errors contributes no facts; the caller logs
        // and continues with the rest of the repository.
        if root.has_error() {
            return Err(rq_core::Error::Parse("syntax error in source file".into()));
        }

        let mut facts = FileFacts::default();
        let mut cursor = root.walk();

        for node in root.children(&mut cursor) {
            match node.kind() {
                "import_statement" => {
                    facts.imports.extend(Self::extract_import_statement(&node, source));
                }
                "import_from_statement" => {
                    facts
                        .imports
                        .extend(Self::extract_import_from_statement(&node, source));
                }
                "function_definition" => {
                    if let Some(func) = Self::extract_function(&node, source) {
                        facts.functions.push(func);
                    }
                }
                "class_definition" => {
                    if let Some(class) = Self::extract_class(&node, source) {
                        facts.classes.push(class);
                    }
                }
                "decorated_definition" => {
                    if let Some(def) = node.child_by_field_name("definition") {
                        match def.kind() {
                            "function_definition" => {
                                if let Some(func) = Self::extract_function(&def, source) {
                                    facts.functions.push(func);
                                }
                            }
                            "class_definition" => {
                                if let Some(class) = Self::extract_class(&def, source) {
                                    facts.classes.push(class);
                                }
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(facts)
    }
}
