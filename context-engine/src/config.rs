//! Scheduler knobs, all overridable by the caller.

/// Window sizes and budgets for context assembly.
#[derive(Debug, Clone, Copy)]
pub struct ContextConfig {
    /// Fallback window (± lines) when AST extraction is unavailable.
    pub function_window: u32,
    /// Window (± lines) for `file_context` level.
    pub file_context_window: u32,
    /// Whole files at most this long are inlined for `full_file`.
    pub full_file_max_lines: usize,
    /// Cap on caller/search hits.
    pub callers_max_hits: usize,
    /// Hard cap per returned text field.
    pub max_chars_per_field: usize,
    /// Snippet window (± lines) around each caller hit.
    pub callers_snippet_window: u32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            function_window: 30,
            file_context_window: 20,
            full_file_max_lines: 300,
            callers_max_hits: 5,
            max_chars_per_field: 8000,
            callers_snippet_window: 3,
        }
    }
}
