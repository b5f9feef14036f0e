//! Completeness check: syntactic predicates on the raw Implementer response,
//! no LLM call involved.

#[derive(Debug, Clone)]
pub struct CompletenessResult {
    pub complete: bool,
    pub issues: Vec<String>,
}

/// `required_fields` names the top-level keys the declared response schema
/// demands (e.g. `["summary", "files_changed"]`), checked against a JSON
/// object recovered from the response if one is present.
pub fn check_completeness(raw_response: &str, required_fields: &[&str]) -> CompletenessResult {
    let mut issues = Vec::new();

    if raw_response.trim().is_empty() {
        issues.push("response is empty".to_string());
    }

    if !has_balanced_fences(raw_response) {
        issues.push("unbalanced code fences".to_string());
    }

    match extract_json_object(raw_response) {
        Some(value) => {
            for field in required_fields {
                if value.get(*field).is_none() {
                    issues.push(format!("missing required field: {field}"));
                }
            }
        }
        None if !required_fields.is_empty() => {
            issues.push("no parseable JSON object found for the declared response schema".to_string());
        }
        None => {}
    }

    CompletenessResult { complete: issues.is_empty(), issues }
}

fn has_balanced_fences(text: &str) -> bool {
    text.matches("```").count() % 2 == 0
}

/// Recovers the first top-level JSON object embedded in `text`, tolerating
/// surrounding prose or a fenced code block.
fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_response_is_incomplete() {
        let result = check_completeness("", &[]);
        assert!(!result.complete);
    }

    #[test]
    fn unbalanced_fence_is_flagged() {
        let result = check_completeness("```rust\nfn main() {}\n", &[]);
        assert!(result.issues.iter().any(|i| i.contains("fence")));
    }

    #[test]
    fn missing_required_field_is_flagged() {
        let response = r#"Here you go: {"summary": "done"}"#;
        let result = check_completeness(response, &["summary", "files_changed"]);
        assert!(!result.complete);
        assert!(result.issues.iter().any(|i| i.contains("files_changed")));
    }

    #[test]
    fn well_formed_response_is_complete() {
        let response = r#"{"summary": "done", "files_changed": ["a.rs"]}"#;
        let result = check_completeness(response, &["summary", "files_changed"]);
        assert!(result.complete, "unexpected issues: {:?}", result.issues);
    }
}
