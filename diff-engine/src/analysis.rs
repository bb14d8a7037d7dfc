//! Tag inference and smart context expansion.
//!
//! Path tags (config/routing/security), content tags (imports/comments/
//! logging only), scope tags (in_single_function) and the expansion
//! heuristics that widen a hunk to its surrounding structure.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tree_sitter::Tree;

use crate::ast::{self, CodeStructure};
use crate::language::Language;
use crate::parser::DiffHunk;
use crate::units::SymbolInfo;

/// Gap (in lines) under which clustered changed lines are pulled into one
/// expanded span.
const CLUSTER_MAX_GAP: u32 = 10;
/// Medium-importance structures are expanded only when shorter than this.
const MEDIUM_STRUCTURE_MAX_LINES: u32 = 15;

/// Tags derived from the file path alone.
pub fn infer_file_level_tags(file_path: &str) -> Vec<String> {
    let mut tags = Vec::new();
    let lower_path = file_path.to_lowercase();
    let file_name = Path::new(&lower_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_string();

    let config_names = [
        "pyproject.toml",
        "setup.cfg",
        "requirements.txt",
        "package.json",
        "tsconfig.json",
        "cargo.toml",
    ];
    if ["config", "settings", "conf"].iter().any(|k| file_name.contains(k))
        || config_names.contains(&file_name.as_str())
    {
        tags.push("config_file".to_string());
    }

    if ["router", "routes", "routing"].iter().any(|k| file_name.contains(k))
        || file_name == "urls.py"
    {
        tags.push("routing_file".to_string());
    }

    let security_markers = ["auth", "login", "permission", "acl", "security", "oauth", "sso"];
    if security_markers.iter().any(|k| lower_path.contains(k)) {
        tags.push("security_sensitive".to_string());
    }

    tags
}

fn is_import_line(content: &str, language: Language) -> bool {
    let stripped = content.trim();
    if stripped.is_empty() {
        return false;
    }
    match language {
        Language::Python => stripped.starts_with("import ") || stripped.starts_with("from "),
        Language::JavaScript | Language::TypeScript => {
            stripped.starts_with("import ") || stripped.starts_with("require(")
        }
        Language::Go => stripped.starts_with("import "),
        Language::Rust => stripped.starts_with("use "),
        _ => false,
    }
}

fn is_comment_line(content: &str, language: Language) -> bool {
    let stripped = content.trim();
    if stripped.is_empty() {
        return false;
    }
    match language {
        Language::Python | Language::Ruby | Language::Shell | Language::Yaml => {
            stripped.starts_with('#')
        }
        Language::JavaScript
        | Language::TypeScript
        | Language::Go
        | Language::Java
        | Language::Rust
        | Language::C
        | Language::Cpp => {
            stripped.starts_with("//") || stripped.starts_with("/*") || stripped.starts_with('*')
        }
        _ => false,
    }
}

fn is_logging_line(content: &str, language: Language) -> bool {
    let stripped = content.trim();
    if stripped.is_empty() {
        return false;
    }
    match language {
        Language::Python => ["logging.", "logger.", "log.info", "log.warning", "log.error", "log.debug"]
            .iter()
            .any(|needle| stripped.contains(needle)),
        Language::JavaScript | Language::TypeScript => stripped.starts_with("console."),
        Language::Go => stripped.contains("log.") || stripped.contains("logger."),
        Language::Rust => ["trace!", "debug!", "info!", "warn!", "error!"]
            .iter()
            .any(|needle| stripped.contains(needle)),
        _ => false,
    }
}

/// `only_imports` / `only_comments` / `only_logging` from the changed lines.
pub fn infer_simple_change_tags(hunk: &DiffHunk, language: Language) -> Vec<String> {
    let changed: Vec<&str> = hunk
        .lines
        .iter()
        .filter(|l| l.is_added() || l.is_removed())
        .map(|l| l.content())
        .collect();
    if changed.is_empty() {
        return Vec::new();
    }

    let mut has_code_like = false;
    let mut has_import = false;
    let mut has_comment = false;
    let mut has_logging = false;

    for content in changed {
        if content.trim().is_empty() {
            continue;
        }
        let import = is_import_line(content, language);
        let comment = is_comment_line(content, language);
        let logging = is_logging_line(content, language);
        has_import |= import;
        has_comment |= comment;
        has_logging |= logging;
        if !(import || comment || logging) {
            has_code_like = true;
        }
    }

    let mut tags = Vec::new();
    if has_import && !has_code_like {
        tags.push("only_imports".to_string());
    }
    if has_comment && !has_code_like && !has_import {
        tags.push("only_comments".to_string());
    }
    if has_logging && !has_code_like && !has_import {
        tags.push("only_logging".to_string());
    }
    tags
}

/// Declaration regexes for languages without AST support, tried in order.
fn symbol_regexes(language: Language) -> &'static [(&'static str, Regex)] {
    fn compile(pairs: &[(&'static str, &str)]) -> Vec<(&'static str, Regex)> {
        pairs
            .iter()
            .filter_map(|(kind, pattern)| Regex::new(pattern).ok().map(|re| (*kind, re)))
            .collect()
    }
    static GO: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    static JS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    static JAVA: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    static RUBY: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    static RUST: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();

    match language {
        Language::Go => GO.get_or_init(|| {
            compile(&[
                ("function", r"^func\s+(?:\([^)]*\)\s+)?(\w+)\s*\("),
            ])
        }),
        Language::JavaScript | Language::TypeScript => JS.get_or_init(|| {
            compile(&[
                ("function", r"^\s*(?:export\s+)?(?:async\s+)?function\s+(\w+)"),
                ("class", r"^\s*(?:export\s+)?class\s+(\w+)"),
                ("function", r"^\s*(?:export\s+)?(?:const|let)\s+(\w+)\s*=\s*(?:async\s*)?\("),
            ])
        }),
        Language::Java => JAVA.get_or_init(|| {
            compile(&[
                ("class", r"^\s*(?:public\s+|final\s+|abstract\s+)*(?:class|interface|enum)\s+(\w+)"),
                ("method", r"^\s*(?:public|protected|private)[\w<>\[\],\s]*\s(\w+)\s*\("),
            ])
        }),
        Language::Ruby => RUBY.get_or_init(|| {
            compile(&[
                ("method", r"^\s*def\s+(?:self\.)?(\w+[?!]?)"),
                ("class", r"^\s*(?:class|module)\s+(\w+)"),
            ])
        }),
        Language::Rust => RUST.get_or_init(|| {
            compile(&[
                ("function", r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?fn\s+(\w+)"),
                ("class", r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:struct|enum|trait)\s+(\w+)"),
            ])
        }),
        _ => {
            static EMPTY: Vec<(&'static str, Regex)> = Vec::new();
            &EMPTY
        }
    }
}

/// Regex fallback: nearest declaration at or above the hunk.
fn infer_symbol_regex(
    language: Language,
    source: &str,
    new_start: u32,
    new_end: u32,
) -> Option<SymbolInfo> {
    let regexes = symbol_regexes(language);
    if regexes.is_empty() {
        return None;
    }
    let lines: Vec<&str> = source.lines().collect();
    let start = (new_start.max(1) as usize).min(lines.len());
    for offset in (0..start).rev() {
        for (kind, regex) in regexes {
            if let Some(captures) = regex.captures(lines[offset]) {
                if let Some(name) = captures.get(1) {
                    let decl_line = offset as u32 + 1;
                    return Some(SymbolInfo {
                        kind: kind.to_string(),
                        name: name.as_str().to_string(),
                        start_line: decl_line,
                        end_line: new_end.max(decl_line),
                    });
                }
            }
        }
    }
    None
}

/// Symbol info plus scope tags (`in_single_function`) for the hunk span.
///
/// Python uses the AST; other languages fall back to declaration regexes
/// (which cannot prove the change stays inside one function, so they never
/// produce scope tags).
pub fn infer_symbol_and_scope(
    language: Language,
    tree: Option<&Tree>,
    source: &str,
    new_start: u32,
    new_end: u32,
) -> (Option<SymbolInfo>, Vec<String>) {
    if language != Language::Python || tree.is_none() {
        return (
            infer_symbol_regex(language, source, new_start, new_end),
            Vec::new(),
        );
    }
    let Some(tree) = tree else {
        return (None, Vec::new());
    };

    let Some(structure) = ast::structure_at(tree, source, new_start.max(1)) else {
        return (None, Vec::new());
    };

    let mut tags = Vec::new();
    let symbol = match structure.kind {
        ast::StructureKind::Function => {
            if structure.start_line <= new_start && new_end <= structure.end_line {
                tags.push("in_single_function".to_string());
            }
            Some(symbol_from(&structure, "function"))
        }
        ast::StructureKind::Class => Some(symbol_from(&structure, "class")),
        _ => {
            // The smallest node is a block; the enclosing function still
            // names the scope.
            ast::enclosing_function_span(tree, source, new_start, new_end).and_then(|(s, e)| {
                ast::structure_at(tree, source, s).map(|outer| {
                    if s <= new_start && new_end <= e
                        && outer.kind == ast::StructureKind::Function
                    {
                        tags.push("in_single_function".to_string());
                    }
                    SymbolInfo {
                        kind: outer.kind.as_str().to_string(),
                        name: outer.name.unwrap_or_default(),
                        start_line: s,
                        end_line: e,
                    }
                })
            })
        }
    };

    (symbol, tags)
}

fn symbol_from(structure: &CodeStructure, kind: &str) -> SymbolInfo {
    SymbolInfo {
        kind: kind.to_string(),
        name: structure.name.clone().unwrap_or_default(),
        start_line: structure.start_line,
        end_line: structure.end_line,
    }
}

/// Widen `[initial_start, initial_end]` using change clustering and the
/// enclosing structure. Returns the expanded span plus expansion tags.
pub fn smart_expand_context(
    file_lines: &[String],
    hunk: &DiffHunk,
    initial_start: u32,
    initial_end: u32,
    tree: Option<&Tree>,
    source: &str,
) -> (u32, u32, Vec<String>) {
    let mut tags = Vec::new();
    let mut start = initial_start;
    let mut end = initial_end;

    // Clustered small edits: cover them all when the spread is tight.
    let changed: Vec<u32> = hunk
        .lines
        .iter()
        .filter_map(|l| match l {
            crate::parser::DiffLine::Added { new_line, .. } => Some(*new_line),
            _ => None,
        })
        .collect();
    if let (Some(&min), Some(&max)) = (changed.iter().min(), changed.iter().max()) {
        if max - min <= CLUSTER_MAX_GAP {
            start = start.min(min);
            end = end.max(max);
            tags.push("clustered_changes".to_string());
        }
    }

    // Expand to the full enclosing structure when it is important enough.
    if let Some(tree) = tree {
        let mid = start + (end - start) / 2;
        if let Some(structure) = ast::structure_at(tree, source, mid) {
            let expand = structure.kind.is_high_importance()
                || structure.len_lines() < MEDIUM_STRUCTURE_MAX_LINES;
            if expand {
                start = start.min(structure.start_line);
                end = end.max(structure.end_line);
                tags.push(format!("complete_{}", structure.kind.as_str()));
            }
        }
    }

    start = start.max(1);
    end = end.min(file_lines.len() as u32).max(start);
    (start, end, tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_unified_diff;

    #[test]
    fn path_tags_cover_config_routing_security() {
        assert_eq!(infer_file_level_tags("config/app.yaml"), vec!["config_file"]);
        assert_eq!(infer_file_level_tags("web/routes.py"), vec!["routing_file"]);
        let tags = infer_file_level_tags("config/auth/oauth.py");
        assert!(tags.contains(&"config_file".to_string()));
        assert!(tags.contains(&"security_sensitive".to_string()));
        assert!(infer_file_level_tags("src/render.rs").is_empty());
    }

    #[test]
    fn comment_only_hunk_is_tagged() {
        let diff = "@@ -10,3 +10,3 @@\n ctx\n-# old\n+# new\n ctx";
        let hunk = &parse_unified_diff(diff)[0].hunks[0];
        assert_eq!(infer_simple_change_tags(hunk, Language::Python), vec!["only_comments"]);
    }

    #[test]
    fn mixed_hunk_gets_no_noise_tags() {
        let diff = "@@ -10,3 +10,3 @@\n ctx\n-# old\n+value = 1\n ctx";
        let hunk = &parse_unified_diff(diff)[0].hunks[0];
        assert!(infer_simple_change_tags(hunk, Language::Python).is_empty());
    }

    #[test]
    fn import_only_hunk_is_tagged() {
        let diff = "@@ -1,2 +1,2 @@\n-import os\n+import sys\n x = 1";
        let hunk = &parse_unified_diff(diff)[0].hunks[0];
        assert_eq!(infer_simple_change_tags(hunk, Language::Python), vec!["only_imports"]);
    }

    #[test]
    fn expansion_covers_enclosing_function() {
        let source = "\
def compute(x):
    a = x + 1
    b = a * 2
    c = b - 3
    return c
";
        let lines: Vec<String> = source.lines().map(str::to_string).collect();
        let tree = crate::ast::parse_source(Language::Python, source);
        let diff = "@@ -3,1 +3,1 @@\n-    b = a * 2\n+    b = a * 3";
        let hunk = &parse_unified_diff(diff)[0].hunks[0];
        let (start, end, tags) =
            smart_expand_context(&lines, hunk, 3, 3, tree.as_ref(), source);
        assert_eq!(start, 1);
        assert_eq!(end, 5);
        assert!(tags.contains(&"complete_function".to_string()));
    }

    #[test]
    fn regex_symbols_cover_non_python_languages() {
        let go = "package main\n\nfunc handleRequest(w http.ResponseWriter) {\n\tw.Write(nil)\n}\n";
        let (symbol, tags) = infer_symbol_and_scope(Language::Go, None, go, 4, 4);
        let symbol = symbol.unwrap();
        assert_eq!(symbol.kind, "function");
        assert_eq!(symbol.name, "handleRequest");
        assert_eq!(symbol.start_line, 3);
        assert!(tags.is_empty());

        let ruby = "class Invoice\n  def total\n    items.sum\n  end\nend\n";
        let (symbol, _) = infer_symbol_and_scope(Language::Ruby, None, ruby, 3, 3);
        assert_eq!(symbol.unwrap().name, "total");

        let rust = "pub struct Cache;\n\nimpl Cache {\n}\n";
        let (symbol, _) = infer_symbol_and_scope(Language::Rust, None, rust, 1, 1);
        assert_eq!(symbol.unwrap().kind, "class");
    }

    #[test]
    fn scope_tag_set_when_change_inside_one_function() {
        let source = "\
def handler(req):
    check(req)
    return ok(req)
";
        let tree = crate::ast::parse_source(Language::Python, source);
        let (symbol, tags) =
            infer_symbol_and_scope(Language::Python, tree.as_ref(), source, 2, 2);
        let symbol = symbol.unwrap();
        assert_eq!(symbol.kind, "function");
        assert_eq!(symbol.name, "handler");
        assert!(tags.contains(&"in_single_function".to_string()));
    }
}
