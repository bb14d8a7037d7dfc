//! System prompts and message templates for the three agents.

/// Intent agent: one-paragraph business summary of the project.
pub const SYSTEM_PROMPT_INTENT: &str = "\
You are a senior engineer writing a short project brief for a code reviewer.
Given a project overview (file tree, README excerpt, recent commits,
dependency manifests), produce a concise Markdown summary of what the
project does, its main components, and anything a reviewer should keep in
mind. One or two short paragraphs, no headings, no code blocks.";

/// Planner agent: context planning over the review index, JSON only.
pub const SYSTEM_PROMPT_PLANNER: &str = "\
You plan a code review. You receive a lightweight index of review units
(positions, sizes, tags, rule suggestions) without code bodies. For each
unit decide how much surrounding context the reviewer needs and whether the
unit can be skipped. Respond with JSON only, no prose:
{\"plan\": [{\"unit_id\": str,
           \"llm_context_level\": \"diff_only\"|\"function\"|\"file_context\"|\"full_file\",
           \"extra_requests\": [{\"type\": \"callers\"|\"previous_version\"|\"search\",
                                 \"details\"?: str}],
           \"skip_review\": bool,
           \"reason\": str}]}
Trust high-confidence rule suggestions unless the tags say otherwise. Never
skip security-sensitive, config or routing changes.";

pub const PLANNER_USER_INSTRUCTIONS: &str = "\
Plan the review for the units below. Prefer the smallest context level that
still allows a correct judgement; ask for callers or previous versions only
when the change is hard to judge in isolation.";

/// Reviewer agent: the main review loop.
pub const SYSTEM_PROMPT_REVIEWER: &str = "\
You are a meticulous code reviewer. You receive a review index, a context
bundle with per-unit code context, and tools to read more of the project on
demand. Review the changed code for correctness, security, performance and
maintainability issues.

Rules:
- Cite exact positions using the line numbers from the diffs (e.g. L11-11).
- Only report issues you can ground in the code you have seen; use the
  tools to fetch context instead of guessing.
- Produce a Markdown report: a short title heading, a summary paragraph,
  then one section per finding with severity (High/Medium/Low), location
  and a concrete suggestion.
- If nothing is wrong, say so briefly.";

/// User message for the review loop: data only, instructions live in the
/// system prompt.
pub fn build_review_prompt(
    review_index_md: &str,
    context_bundle_json: &str,
    user_prompt: &str,
    intent_md: Option<&str>,
) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(intent) = intent_md {
        if !intent.trim().is_empty() {
            parts.push(format!("### Project intent\n\n{}\n\n---\n", intent.trim()));
        }
    }
    if !user_prompt.trim().is_empty() {
        parts.push(format!(
            "### Review instructions\n\n{}\n\n---\n",
            user_prompt.trim()
        ));
    }
    parts.push(format!("### Review index\n\n{review_index_md}\n"));
    parts.push(format!(
        "### Context bundle\n\n```json\n{context_bundle_json}\n```"
    ));
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn review_prompt_orders_sections() {
        let prompt = build_review_prompt("INDEX", "{}", "focus on auth", Some("intent here"));
        let intent = prompt.find("Project intent").unwrap();
        let instructions = prompt.find("Review instructions").unwrap();
        let index = prompt.find("Review index").unwrap();
        let bundle = prompt.find("Context bundle").unwrap();
        assert!(intent < instructions && instructions < index && index < bundle);
    }

    #[test]
    fn empty_intent_is_omitted() {
        let prompt = build_review_prompt("INDEX", "{}", "", None);
        assert!(!prompt.contains("Project intent"));
        assert!(!prompt.contains("Review instructions"));
    }
}
