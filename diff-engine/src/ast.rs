//! Language-aware structure detection backed by Tree-sitter.
//!
//! Python gets a real AST (function/class/if/loop/try nodes); the pipeline
//! falls back to windowed slices for other languages. Anchoring always
//! picks the **smallest enclosing node**, and the same extractor serves
//! both the diff collector and the context scheduler.

use tree_sitter::{Node, Parser, Tree};

use crate::language::Language;

/// Structure kinds the expansion heuristics care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureKind {
    Function,
    Class,
    If,
    Loop,
    Try,
}

impl StructureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StructureKind::Function => "function",
            StructureKind::Class => "class",
            StructureKind::If => "if_statement",
            StructureKind::Loop => "loop",
            StructureKind::Try => "try_except",
        }
    }

    /// Functions, classes and exception handling always deserve their full
    /// span; conditionals and loops only when short.
    pub fn is_high_importance(&self) -> bool {
        matches!(
            self,
            StructureKind::Function | StructureKind::Class | StructureKind::Try
        )
    }
}

/// A structure node enclosing a change, with 1-based inclusive lines.
#[derive(Debug, Clone)]
pub struct CodeStructure {
    pub kind: StructureKind,
    pub name: Option<String>,
    pub start_line: u32,
    pub end_line: u32,
}

impl CodeStructure {
    pub fn len_lines(&self) -> u32 {
        self.end_line.saturating_sub(self.start_line) + 1
    }
}

/// Parse Python source; `None` for other languages or syntax errors.
pub fn parse_source(language: Language, source: &str) -> Option<Tree> {
    if language != Language::Python {
        return None;
    }
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .ok()?;
    let tree = parser.parse(source, None)?;
    if tree.root_node().has_error() {
        return None;
    }
    Some(tree)
}

fn classify(node: &Node) -> Option<StructureKind> {
    match node.kind() {
        "function_definition" => Some(StructureKind::Function),
        "class_definition" => Some(StructureKind::Class),
        "if_statement" => Some(StructureKind::If),
        "for_statement" | "while_statement" => Some(StructureKind::Loop),
        "try_statement" => Some(StructureKind::Try),
        _ => None,
    }
}

fn node_name(node: &Node, source: &str) -> Option<String> {
    node.child_by_field_name("name")
        .and_then(|n| n.utf8_text(source.as_bytes()).ok())
        .map(str::to_string)
}

fn to_structure(node: &Node, source: &str, kind: StructureKind) -> CodeStructure {
    CodeStructure {
        kind,
        name: node_name(node, source),
        start_line: node.start_position().row as u32 + 1,
        end_line: node.end_position().row as u32 + 1,
    }
}

/// Smallest classified structure containing `line` (1-based).
pub fn structure_at(tree: &Tree, source: &str, line: u32) -> Option<CodeStructure> {
    let mut best: Option<CodeStructure> = None;
    let mut stack = vec![tree.root_node()];
    while let Some(node) = stack.pop() {
        let start = node.start_position().row as u32 + 1;
        let end = node.end_position().row as u32 + 1;
        if line < start || line > end {
            continue;
        }
        if let Some(kind) = classify(&node) {
            let candidate = to_structure(&node, source, kind);
            let smaller = best
                .as_ref()
                .is_none_or(|b| candidate.len_lines() < b.len_lines());
            if smaller {
                best = Some(candidate);
            }
        }
        for i in 0..node.child_count() {
            if let Some(child) = node.child(i) {
                stack.push(child);
            }
        }
    }
    best
}

/// Smallest function or class overlapping `[start, end]` (1-based). Used by
/// the scheduler to slice function-level context.
pub fn enclosing_function_span(
    tree: &Tree,
    source: &str,
    start: u32,
    end: u32,
) -> Option<(u32, u32)> {
    let mut best: Option<CodeStructure> = None;
    let mut stack = vec![tree.root_node()];
    while let Some(node) = stack.pop() {
        let n_start = node.start_position().row as u32 + 1;
        let n_end = node.end_position().row as u32 + 1;
        if end < n_start || start > n_end {
            continue;
        }
        if let Some(kind @ (StructureKind::Function | StructureKind::Class)) = classify(&node) {
            let contains = (n_start <= start && start <= n_end) || (n_start <= end && end <= n_end);
            if contains {
                let candidate = to_structure(&node, source, kind);
                let smaller = best
                    .as_ref()
                    .is_none_or(|b| candidate.len_lines() < b.len_lines());
                if smaller {
                    best = Some(candidate);
                }
            }
        }
        for i in 0..node.child_count() {
            if let Some(child) = node.child(i) {
                stack.push(child);
            }
        }
    }
    best.map(|s| (s.start_line, s.end_line))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "\
import os


class Account:
    def balance(self):
        total = 0
        for entry in self.entries:
            total += entry
        return total

    def close(self):
        self.open = False


def main():
    acct = Account()
    print(acct.balance())
";

    #[test]
    fn smallest_enclosing_structure_wins() {
        let tree = parse_source(Language::Python, SOURCE).unwrap();
        // Line 8 is inside the for-loop inside `balance`.
        let structure = structure_at(&tree, SOURCE, 8).unwrap();
        assert_eq!(structure.kind, StructureKind::Loop);

        // Line 6 is inside `balance` but not the loop.
        let structure = structure_at(&tree, SOURCE, 6).unwrap();
        assert_eq!(structure.kind, StructureKind::Function);
        assert_eq!(structure.name.as_deref(), Some("balance"));
    }

    #[test]
    fn function_span_covers_whole_method() {
        let tree = parse_source(Language::Python, SOURCE).unwrap();
        let (start, end) = enclosing_function_span(&tree, SOURCE, 6, 6).unwrap();
        assert_eq!(start, 5);
        assert!(end >= 9);
    }

    #[test]
    fn non_python_and_broken_sources_yield_none() {
        assert!(parse_source(Language::Go, "func main() {}").is_none());
        assert!(parse_source(Language::Python, "def broken(:\n  pass").is_none());
    }
}
