//! Symbol Lookup Tool
//!
//! `get_info(name, path, line?)` returns the source of a class, function, or
//! method from a Python file, parsed with tree-sitter. Dotted names address
//! nested definitions (`C.foo` is method `foo` of class `C`). Large classes
//! are summarized to their header and method signatures.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use assertflip_llm::ParameterSchema;

use crate::executor::ToolResult;
use crate::tool::{Tool, ToolContext};

/// Classes longer than this are rendered as a summary.
const MAX_FULL_CLASS_LINES: usize = 120;

const OMITTED_NOTE: &str = "\"...\" below indicates omitted code.\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DefinitionKind {
    Class,
    Function,
}

#[derive(Debug, Clone)]
struct Definition {
    qualified_name: String,
    kind: DefinitionKind,
    /// First row, including decorators (0-based)
    start_row: usize,
    end_row: usize,
    /// Row of the first body statement
    body_row: usize,
    depth: usize,
}

impl Definition {
    fn contains_row(&self, row: usize) -> bool {
        self.start_row <= row && row <= self.end_row
    }

    fn line_count(&self) -> usize {
        self.end_row - self.start_row + 1
    }
}

fn collect_definitions(
    node: tree_sitter::Node,
    source: &[u8],
    scope: &[String],
    out: &mut Vec<Definition>,
) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        let (def_node, outer) = if child.kind() == "decorated_definition" {
            match child.child_by_field_name("definition") {
                Some(d) => (d, child),
                None => continue,
            }
        } else {
            (child, child)
        };

        let kind = match def_node.kind() {
            "class_definition" => DefinitionKind::Class,
            "function_definition" => DefinitionKind::Function,
            _ => {
                collect_definitions(child, source, scope, out);
                continue;
            }
        };

        let Some(name) = def_node
            .child_by_field_name("name")
            .and_then(|n| n.utf8_text(source).ok())
        else {
            continue;
        };

        let mut inner_scope = scope.to_vec();
        inner_scope.push(name.to_string());

        let body = def_node.child_by_field_name("body");
        out.push(Definition {
            qualified_name: inner_scope.join("."),
            kind,
            start_row: outer.start_position().row,
            end_row: outer.end_position().row,
            body_row: body
                .map(|b| b.start_position().row)
                .unwrap_or_else(|| def_node.start_position().row),
            depth: scope.len(),
        });

        if let Some(body) = body {
            collect_definitions(body, source, &inner_scope, out);
        }
    }
}

/// Parse Python source into its list of definitions.
fn parse_definitions(source: &str) -> Option<Vec<Definition>> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .ok()?;
    let tree = parser.parse(source, None)?;
    let mut defs = Vec::new();
    collect_definitions(tree.root_node(), source.as_bytes(), &[], &mut defs);
    Some(defs)
}

/// Pick the definition matching `name`.
///
/// Exact qualified matches win over suffix matches (`foo` matching `C.foo`).
/// With a 1-based `line`, the match starting closest at or after it wins.
fn find_definition<'a>(defs: &'a [Definition], name: &str, line: usize) -> Option<&'a Definition> {
    let suffix = format!(".{}", name);
    let exact: Vec<&Definition> = defs.iter().filter(|d| d.qualified_name == name).collect();
    let candidates: Vec<&Definition> = if exact.is_empty() {
        defs.iter()
            .filter(|d| d.qualified_name.ends_with(&suffix))
            .collect()
    } else {
        exact
    };

    if line == 0 {
        return candidates.into_iter().min_by_key(|d| (d.depth, d.start_row));
    }
    let row = line - 1;
    candidates
        .iter()
        .copied()
        .filter(|d| d.start_row >= row || d.contains_row(row))
        .min_by_key(|d| d.start_row.abs_diff(row))
        .or_else(|| {
            candidates
                .into_iter()
                .min_by_key(|d| d.start_row.abs_diff(row))
        })
}

/// Innermost definition enclosing a 1-based line.
fn enclosing_definition(defs: &[Definition], line: usize) -> Option<&Definition> {
    if line == 0 {
        return None;
    }
    defs.iter()
        .filter(|d| d.contains_row(line - 1))
        .max_by_key(|d| d.depth)
}

fn numbered(lines: &[&str], from: usize, to: usize, out: &mut Vec<String>) {
    for row in from..=to.min(lines.len().saturating_sub(1)) {
        out.push(format!("{}: {}", row + 1, lines[row]));
    }
}

fn indent_of(line: &str) -> String {
    line.chars().take_while(|c| c.is_whitespace()).collect()
}

fn render(defs: &[Definition], def: &Definition, source: &str) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let mut out = Vec::new();

    if def.kind == DefinitionKind::Class && def.line_count() > MAX_FULL_CLASS_LINES {
        numbered(&lines, def.start_row, def.body_row.saturating_sub(1).max(def.start_row), &mut out);
        let prefix = format!("{}.", def.qualified_name);
        let methods = defs.iter().filter(|d| {
            d.depth == def.depth + 1
                && d.qualified_name.starts_with(&prefix)
                && def.contains_row(d.start_row)
        });
        for method in methods {
            let sig_end = method.body_row.saturating_sub(1).max(method.start_row);
            numbered(&lines, method.start_row, sig_end, &mut out);
            let indent = lines
                .get(method.body_row)
                .map(|l| indent_of(l))
                .unwrap_or_default();
            out.push(format!("{}...", indent));
        }
        return format!("{}{}", OMITTED_NOTE, out.join("\n"));
    }

    numbered(&lines, def.start_row, def.end_row, &mut out);
    out.join("\n")
}

/// Resolve the requested path as given, then relative to the source root.
fn resolve_path(ctx: &ToolContext, path: &str) -> PathBuf {
    let direct = Path::new(path);
    if direct.exists() {
        return direct.to_path_buf();
    }
    ctx.source_root.join(path.trim_start_matches('/'))
}

/// Look up a symbol in a Python source string. Returns `None` when the symbol
/// cannot be found.
pub fn lookup_symbol(source: &str, name: &str, line: usize) -> Option<String> {
    let defs = parse_definitions(source)?;
    if let Some(def) = find_definition(&defs, name, line) {
        return Some(render(&defs, def, source));
    }
    let def = enclosing_definition(&defs, line)?;
    Some(format!(
        "{} was not found; showing the definition enclosing line {}.\n\n{}",
        name,
        line,
        render(&defs, def, source)
    ))
}

pub struct GetInfoTool;

#[async_trait]
impl Tool for GetInfoTool {
    fn name(&self) -> &str {
        "get_info"
    }

    fn description(&self) -> &str {
        "Returns information about a symbol."
    }

    fn parameters_schema(&self) -> ParameterSchema {
        let mut props = HashMap::new();
        props.insert(
            "name".to_string(),
            ParameterSchema::string(Some(
                "class, function or method name, as in 'f' for function f or 'C.foo' for method foo in class C.",
            )),
        );
        props.insert(
            "path".to_string(),
            ParameterSchema::string(Some("Exact path to the file containing the symbol")),
        );
        props.insert(
            "line".to_string(),
            ParameterSchema::integer(Some(
                "Starting line number in the file of the closest parent class, function or method to begin the search.",
            )),
        );
        ParameterSchema::object(None, props, vec!["name".to_string(), "path".to_string()])
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> ToolResult {
        let Some(name) = args.get("name").and_then(|v| v.as_str()) else {
            return ToolResult::err("missing required argument: name");
        };
        let Some(path) = args.get("path").and_then(|v| v.as_str()) else {
            return ToolResult::err("missing required argument: path");
        };
        let line = args
            .get("line")
            .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .unwrap_or(0) as usize;

        let resolved = resolve_path(ctx, path);
        tracing::debug!(
            "[tool:get_info] {} name={} path={} line={}",
            ctx.instance_id,
            name,
            resolved.display(),
            line
        );

        if !resolved.exists() {
            return ToolResult::ok(format!(
                "Unable to obtain information on {}.\n\nFile {} does not exist.",
                name,
                resolved.display()
            ));
        }
        if !resolved.is_file() {
            return ToolResult::ok(format!(
                "Unable to obtain information on {}.\n\nFile {} is not a file.",
                name,
                resolved.display()
            ));
        }

        let source = match tokio::fs::read_to_string(&resolved).await {
            Ok(s) => s,
            Err(e) => return ToolResult::err(format!("failed to read {}: {}", resolved.display(), e)),
        };

        match lookup_symbol(&source, name, line) {
            Some(info) => ToolResult::ok(info),
            None => ToolResult::ok(format!("Unable to obtain information on {}.", name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = "\
import re


def helper(x):
    return x + 1


class Validator:
    regex = r'^x$'

    def __call__(self, value):
        return re.match(self.regex, value)

    @staticmethod
    def clean(value):
        return value.strip()


def clean(value):
    return value
";

    #[test]
    fn test_lookup_top_level_function() {
        let info = lookup_symbol(SAMPLE, "helper", 0).unwrap();
        assert!(info.starts_with("4: def helper(x):"));
        assert!(info.contains("5:     return x + 1"));
        assert!(!info.contains("class Validator"));
    }

    #[test]
    fn test_lookup_method_by_dotted_name_includes_decorator() {
        let info = lookup_symbol(SAMPLE, "Validator.clean", 0).unwrap();
        assert!(info.contains("@staticmethod"));
        assert!(info.contains("return value.strip()"));
    }

    #[test]
    fn test_exact_match_beats_suffix_match() {
        let info = lookup_symbol(SAMPLE, "clean", 0).unwrap();
        assert!(info.contains("19: def clean(value):"));
    }

    #[test]
    fn test_line_hint_selects_nearest_candidate() {
        let source = "class A:\n    def f(self):\n        return 1\n\nclass B:\n    def f(self):\n        return 2\n";
        let info = lookup_symbol(source, "f", 5).unwrap();
        assert!(info.contains("return 2"));
        assert!(!info.contains("return 1"));
    }

    #[test]
    fn test_missing_symbol_falls_back_to_enclosing_definition() {
        let info = lookup_symbol(SAMPLE, "nope", 12).unwrap();
        assert!(info.contains("showing the definition enclosing line 12"));
        assert!(info.contains("def __call__(self, value):"));
        assert!(lookup_symbol(SAMPLE, "nope", 0).is_none());
    }

    #[test]
    fn test_large_class_is_summarized() {
        let mut source = String::from("class Big:\n");
        for i in 0..40 {
            source.push_str(&format!(
                "    def m{}(self):\n        a = {}\n        return a\n\n",
                i, i
            ));
        }
        let info = lookup_symbol(&source, "Big", 0).unwrap();
        assert!(info.starts_with(OMITTED_NOTE));
        assert!(info.contains("def m0(self):"));
        assert!(info.contains("def m39(self):"));
        assert!(info.contains("        ..."));
        assert!(!info.contains("a = 0"));
    }

    #[tokio::test]
    async fn test_tool_resolves_relative_to_source_root() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg")).unwrap();
        std::fs::write(dir.path().join("pkg/mod.py"), SAMPLE).unwrap();
        let ctx = ToolContext::new("inst", dir.path());

        let result = GetInfoTool
            .execute(&ctx, serde_json::json!({"name": "helper", "path": "pkg/mod.py"}))
            .await;
        assert!(result.success);
        assert!(result.to_content().contains("def helper(x):"));
    }

    #[tokio::test]
    async fn test_tool_reports_missing_file_and_arguments() {
        let dir = TempDir::new().unwrap();
        let ctx = ToolContext::new("inst", dir.path());

        let result = GetInfoTool
            .execute(&ctx, serde_json::json!({"name": "f", "path": "missing.py"}))
            .await;
        assert!(result.to_content().contains("does not exist"));

        let result = GetInfoTool
            .execute(&ctx, serde_json::json!({"path": "missing.py"}))
            .await;
        assert!(!result.success);
    }
}
