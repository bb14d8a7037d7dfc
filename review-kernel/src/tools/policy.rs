//! Tool exposure and auto-approval policy.

use serde_json::Value;

use super::builtin::BUILTIN_SAFE_TOOLS;
use super::tool_schemas;

/// Schemas exposed to the model plus the names that run without approval.
pub struct ResolvedTools {
    pub schemas: Vec<Value>,
    pub auto_approve: Vec<String>,
}

/// With `auto_approve` everything requested is whitelisted; otherwise only
/// the harmless builtins run unattended and the rest goes through the
/// approver.
pub fn resolve_tools(tool_names: &[String], auto_approve: bool) -> ResolvedTools {
    let schemas = tool_schemas(tool_names);
    let auto_approve = if auto_approve {
        tool_names.to_vec()
    } else {
        tool_names
            .iter()
            .filter(|name| BUILTIN_SAFE_TOOLS.contains(&name.as_str()))
            .cloned()
            .collect()
    };
    ResolvedTools {
        schemas,
        auto_approve,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_safe_builtins_auto_approve_by_default() {
        let names = vec!["read_file_hunk".to_string(), "run_shell".to_string()];
        let resolved = resolve_tools(&names, false);
        assert_eq!(resolved.auto_approve, vec!["read_file_hunk"]);

        let resolved = resolve_tools(&names, true);
        assert_eq!(resolved.auto_approve, names);
    }
}
