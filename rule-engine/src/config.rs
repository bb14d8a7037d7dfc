//! Shared thresholds and keyword tables for the rule layer.

/// Confidence bounds and defaults shared by all handlers.
pub mod defaults {
    /// Confidence attached to the terminal `default_fallback` suggestion.
    pub const CONFIDENCE_DEFAULT: f64 = 0.35;
    /// At or above this the rule is considered authoritative by fusion.
    pub const CONFIDENCE_HIGH: f64 = 0.8;
    /// Change size (added + removed) considered a large refactor.
    pub const LARGE_CHANGE_LINES: u32 = 80;
    /// Upper bound of a "medium" change confined to one function.
    pub const MODERATE_CHANGE_LINES: u32 = 20;
    /// Change size at which the `file_size` confidence adjuster kicks in.
    pub const FILE_SIZE_ADJUSTER_LINES: u32 = 40;
}

/// Tags marking pure-noise changes (no behavioural impact expected).
pub const NOISE_TAGS: &[&str] = &["only_imports", "only_comments", "only_logging"];

/// Tags marking documentation files.
pub const DOC_TAGS: &[&str] = &["doc_file"];

/// Tags that forbid skipping review regardless of planner output.
pub const HIGH_RISK_TAGS: &[&str] = &["security_sensitive", "config_file", "routing_file"];

/// Path fragments hinting at configuration surfaces.
pub const CONFIG_KEYWORDS: &[&str] = &[
    "config",
    "settings",
    "conf",
    ".env",
    "properties",
    "manifest",
];

/// Path/symbol fragments hinting at security-sensitive code. Matched as
/// plain substrings over `path + symbol + tags`.
pub const SECURITY_KEYWORDS: &[&str] = &[
    "auth",
    "login",
    "password",
    "token",
    "secret",
    "permission",
    "acl",
    "oauth",
    "sso",
    "crypto",
    "security",
];
