use std::path::Path;

use rq_engine::parser::ParserRegistry;

fn parse(source: &str) -> rq_core::FileFacts {
    ParserRegistry::new()
        .parse_file(Path::new("test.py"), source)
        .unwrap()
}

#[test]
fn test_extract_imports() {
    let facts = parse(
        r#"
import os
import numpy as np
from os.path import join, exists as there
from .models import db
"#,
    );

    let modules: Vec<(&str, Option<&str>, Option<&str>)> = facts
        .imports
        .iter()
        .map(|i| (i.module.as_str(), i.name.as_deref(), i.alias.as_deref()))
        .collect();

    assert!(modules.contains(&("os", None, None)), "got: {modules:?}");
    assert!(modules.contains(&("numpy", None, Some("np"))), "got: {modules:?}");
    assert!(
        modules.contains(&("os.path", Some("join"), None)),
        "got: {modules:?}"
    );
    assert!(
        modules.contains(&("os.path", Some("exists"), Some("there"))),
        "got: {modules:?}"
    );
    assert!(modules.contains(&(".models", Some("db"), None)), "got: {modules:?}");

    // Module node key: imported name when present, module path otherwise.
    let os_import = facts.imports.iter().find(|i| i.module == "os").unwrap();
    assert_eq!(os_import.target_name(), "os");
    let join_import = facts
        .imports
        .iter()
        .find(|i| i.name.as_deref() == Some("join"))
        .unwrap();
    assert_eq!(join_import.target_name(), "join");
}

#[test]
fn test_extract_classes_with_methods_and_bases() {
    let facts = parse(
        r#"
class Base:
    pass

class Peer(Base, mixins.Reconnect):
    """A network peer."""

    def connect(self, addr):
        """Open a connection to addr."""
        self.open()
        retry(self.open)

    @property
    def address(self):
        return self._addr
"#,
    );

    assert_eq!(facts.classes.len(), 2);

    let peer = facts.classes.iter().find(|c| c.name == "Peer").unwrap();
    assert_eq!(peer.docstring, "A network peer.");
    // Only plain identifier bases survive; `mixins.Reconnect` is dropped.
    assert_eq!(peer.base_classes, vec!["Base".to_string()]);

    let method_names: Vec<&str> = peer.methods.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(method_names, vec!["connect", "address"]);

    let connect = &peer.methods[0];
    assert_eq!(connect.args, vec!["self", "addr"]);
    assert_eq!(connect.docstring, "Open a connection to addr.");
    assert!(connect.calls.contains(&"open".to_string()), "got: {:?}", connect.calls);
    assert!(connect.calls.contains(&"retry".to_string()), "got: {:?}", connect.calls);

    // Methods are not standalone functions.
    assert!(facts.functions.is_empty());
}

#[test]
fn test_call_heads_use_rightmost_attribute_and_deduplicate() {
    let facts = parse(
        r#"
def handler(request):
    token = request.headers.get("Authorization")
    user = validate(token)
    validate(token)
    return render(request, user)
"#,
    );

    let handler = &facts.functions[0];
    // `request.headers.get(...)` records `get`; the repeated `validate`
    // appears once.
    assert_eq!(handler.calls, vec!["get", "validate", "render"]);
}

#[test]
fn test_nested_function_calls_surface_on_enclosing_function() {
    let facts = parse(
        r#"
def outer():
    def inner():
        helper()
    inner()
"#,
    );

    assert_eq!(facts.functions.len(), 1, "nested defs are not separate functions");
    let outer = &facts.functions[0];
    assert!(outer.calls.contains(&"helper".to_string()), "got: {:?}", outer.calls);
    assert!(outer.calls.contains(&"inner".to_string()), "got: {:?}", outer.calls);
}

#[test]
fn test_decorated_definitions_are_unwrapped() {
    let facts = parse(
        r#"
@app.route("/api")
def endpoint(request):
    return jsonify({})

@dataclass
class Record:
    pass
"#,
    );

    assert_eq!(facts.functions.len(), 1);
    assert_eq!(facts.functions[0].name, "endpoint");
    assert_eq!(facts.classes.len(), 1);
    assert_eq!(facts.classes[0].name, "Record");
}

#[test]
fn test_docstring_absent_is_empty_string() {
    let facts = parse("def silent():\n    pass\n");
    assert_eq!(facts.functions[0].docstring, "");
}

#[test]
fn test_args_cover_typed_and_defaulted_parameters() {
    let facts = parse(
        r#"
def query(repo_id: str, top_k=5, timeout: float = 1.5, *extra, **options):
    pass
"#,
    );

    let args = &facts.functions[0].args;
    assert_eq!(args, &vec!["repo_id", "top_k", "timeout"]);
}

#[test]
fn test_source_code_is_captured() {
    let facts = parse("def one():\n    return 1\n");
    assert!(facts.functions[0].source_code.starts_with("def one():"));
}

#[test]
fn test_syntax_error_yields_parse_error() {
    let registry = ParserRegistry::new();
    let result = registry.parse_file(Path::new("broken.py"), "def broken(:\n    pass\n");
    assert!(matches!(result, Err(rq_core::Error::Parse(_))));
}

#[test]
fn test_empty_file_yields_no_facts() {
    let facts = parse("");
    assert!(facts.is_empty());
}

#[test]
fn test_registry_selects_by_extension() {
    let registry = ParserRegistry::new();
    assert!(registry.supports_file(Path::new("app.py")));
    assert!(!registry.supports_file(Path::new("notes.txt")));
    assert!(!registry.supports_file(Path::new("Makefile")));

    let result = registry.parse_file(Path::new("notes.txt"), "hello");
    assert!(matches!(result, Err(rq_core::Error::Parse(_))));
}
