//! File-extension based language detection.

use std::path::Path;

use serde::{Serialize, Serializer};

/// Languages the pipeline distinguishes. Documentation formats map to
/// [`Language::Text`] and take the doc-light path; everything else the
/// tagger does not know becomes [`Language::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Go,
    Java,
    Ruby,
    C,
    Cpp,
    Rust,
    CSharp,
    Php,
    Swift,
    Kotlin,
    Scala,
    Shell,
    Sql,
    Json,
    Yaml,
    Toml,
    Html,
    Css,
    Text,
    Unknown,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Go => "go",
            Language::Java => "java",
            Language::Ruby => "ruby",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Rust => "rust",
            Language::CSharp => "csharp",
            Language::Php => "php",
            Language::Swift => "swift",
            Language::Kotlin => "kotlin",
            Language::Scala => "scala",
            Language::Shell => "shell",
            Language::Sql => "sql",
            Language::Json => "json",
            Language::Yaml => "yaml",
            Language::Toml => "toml",
            Language::Html => "html",
            Language::Css => "css",
            Language::Text => "text",
            Language::Unknown => "unknown",
        }
    }

    pub fn is_doc(&self) -> bool {
        matches!(self, Language::Text)
    }
}

impl Serialize for Language {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Guess the language from the file path.
pub fn guess_language(path: &str) -> Language {
    let file_name = Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_lowercase();

    // Well-known extensionless files first.
    match file_name.as_str() {
        "dockerfile" | "makefile" => return Language::Shell,
        "gemfile" | "rakefile" | "vagrantfile" => return Language::Ruby,
        _ => {}
    }

    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "py" => Language::Python,
        "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
        "ts" | "tsx" | "mts" => Language::TypeScript,
        "go" => Language::Go,
        "java" => Language::Java,
        "rb" => Language::Ruby,
        "c" => Language::C,
        "cpp" | "cc" | "cxx" | "h" | "hpp" => Language::Cpp,
        "rs" => Language::Rust,
        "cs" => Language::CSharp,
        "php" => Language::Php,
        "swift" => Language::Swift,
        "kt" | "kts" => Language::Kotlin,
        "scala" => Language::Scala,
        "sh" | "bash" | "zsh" | "fish" => Language::Shell,
        "sql" => Language::Sql,
        "json" | "jsonc" => Language::Json,
        "yaml" | "yml" => Language::Yaml,
        "toml" => Language::Toml,
        "html" | "htm" => Language::Html,
        "css" | "scss" | "sass" | "less" => Language::Css,
        "md" | "rst" | "txt" => Language::Text,
        _ => Language::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_extensions_resolve() {
        assert_eq!(guess_language("a/b/c.py"), Language::Python);
        assert_eq!(guess_language("src/main.rs"), Language::Rust);
        assert_eq!(guess_language("web/app.tsx"), Language::TypeScript);
        assert_eq!(guess_language("README.md"), Language::Text);
        assert_eq!(guess_language("Gemfile"), Language::Ruby);
        assert_eq!(guess_language("mystery.xyz"), Language::Unknown);
    }

    #[test]
    fn doc_formats_take_doc_path() {
        assert!(guess_language("docs/guide.rst").is_doc());
        assert!(!guess_language("src/app.py").is_doc());
    }
}
