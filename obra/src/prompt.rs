//! Prompt Assembler: builds the next Implementer prompt from a task record,
//! accumulated context, the prior iteration's feedback, and any pending
//! `to_impl` directive.
//!
//! Follows the teacher's own `render_prompt` in spirit — simple, readable
//! placeholder substitution rather than a full template engine, since the
//! sections here are a fixed, known set rather than a user-authored
//! template (see DESIGN.md for why this mirrors the teacher's actual usage
//! of its templating dependency rather than its nominal one).

use crate::domain::Task;
use crate::session_manager::estimate_tokens;

#[derive(Debug, Clone, Default)]
pub struct PromptSections {
    pub task_description: String,
    pub acceptance_criteria: Option<String>,
    pub epic_context_summary: Option<String>,
    pub prior_iteration_feedback: Option<String>,
    pub to_impl_directive: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub text: String,
    pub response_schema: serde_json::Value,
    pub estimated_tokens: u64,
    pub fingerprint: String,
}

const RESPONSE_SCHEMA_FIELDS: &[&str] = &["summary", "files_changed"];

fn response_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "required": RESPONSE_SCHEMA_FIELDS,
        "properties": {
            "summary": {"type": "string"},
            "files_changed": {"type": "array", "items": {"type": "string"}},
        }
    })
}

/// Assembles a prompt within `token_budget` (already reduced by the
/// configured safety margin). Truncates the prior-iteration section first,
/// then Epic-context bullets, and never the task description.
pub fn assemble_prompt(task: &Task, sections: &PromptSections, token_budget: u64) -> AssembledPrompt {
    let mut sections = sections.clone();

    let mut text = render(task, &sections);
    if estimate_tokens(&text) > token_budget {
        sections.prior_iteration_feedback = None;
        text = render(task, &sections);
    }
    if estimate_tokens(&text) > token_budget {
        sections.epic_context_summary = sections.epic_context_summary.map(|s| truncate_bullets(&s, token_budget));
        text = render(task, &sections);
    }

    let fingerprint = fingerprint(&text);
    let estimated_tokens = estimate_tokens(&text);
    AssembledPrompt { text, response_schema: response_schema(), estimated_tokens, fingerprint }
}

fn render(task: &Task, sections: &PromptSections) -> String {
    let mut out = String::new();
    out.push_str("## Task\n");
    out.push_str(&task.title);
    out.push('\n');
    out.push_str(&sections.task_description);
    out.push('\n');

    if let Some(criteria) = &sections.acceptance_criteria {
        out.push_str("\n## Acceptance Criteria\n");
        out.push_str(criteria);
        out.push('\n');
    }

    if let Some(summary) = &sections.epic_context_summary {
        out.push_str("\n## Epic Context\n");
        out.push_str(summary);
        out.push('\n');
    }

    if let Some(feedback) = &sections.prior_iteration_feedback {
        out.push_str("\n## Address These Concerns\n");
        out.push_str(feedback);
        out.push('\n');
    }

    if let Some(directive) = &sections.to_impl_directive {
        out.push_str("\n## User Guidance\n");
        out.push_str(directive);
        out.push('\n');
    }

    out.push_str("\n## Required Response Format\n");
    out.push_str("Reply with JSON matching: ");
    out.push_str(&response_schema().to_string());
    out.push('\n');

    out
}

fn truncate_bullets(text: &str, token_budget: u64) -> String {
    let char_budget = (token_budget * 4) as usize;
    if text.chars().count() <= char_budget {
        return text.to_string();
    }
    let mut lines: Vec<&str> = text.lines().collect();
    let mut joined = lines.join("\n");
    while joined.chars().count() > char_budget && !lines.is_empty() {
        lines.pop();
        joined = lines.join("\n");
    }
    joined
}

fn fingerprint(text: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Task, TaskType};

    fn sample_task() -> Task {
        Task::new("p1", TaskType::Task, "Print average age", "Read a CSV and print average age", 5)
    }

    #[test]
    fn always_includes_task_description() {
        let task = sample_task();
        let sections = PromptSections { task_description: task.description.clone(), ..Default::default() };
        let assembled = assemble_prompt(&task, &sections, 10_000);
        assert!(assembled.text.contains(&task.description));
    }

    #[test]
    fn truncates_prior_iteration_before_task_description() {
        let task = sample_task();
        let sections = PromptSections {
            task_description: task.description.clone(),
            prior_iteration_feedback: Some("x".repeat(10_000)),
            ..Default::default()
        };
        let assembled = assemble_prompt(&task, &sections, 50);
        assert!(assembled.text.contains(&task.description));
        assert!(!assembled.text.contains("Address These Concerns"));
    }

    #[test]
    fn fingerprint_is_stable_for_identical_input() {
        let task = sample_task();
        let sections = PromptSections { task_description: task.description.clone(), ..Default::default() };
        let a = assemble_prompt(&task, &sections, 10_000);
        let b = assemble_prompt(&task, &sections, 10_000);
        assert_eq!(a.fingerprint, b.fingerprint);
    }
}
