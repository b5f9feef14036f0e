//! Quality scoring: sends a deterministic-structure scoring request to the
//! Orchestrator LLM and parses a numeric score plus optional subscores.

use serde::Deserialize;

use crate::llm::{LlmError, LlmGateway, LlmRequest};

#[derive(Debug, Clone)]
pub struct QualityResult {
    pub score: f64,
    pub subscores: Vec<(String, f64)>,
    pub comment: Option<String>,
    /// `true` when the scoring response failed to parse — the Decision
    /// Engine must treat this as a validator-boundary RETRY, not a low score.
    pub validator_errored: bool,
}

impl QualityResult {
    fn errored() -> Self {
        Self { score: 0.0, subscores: Vec::new(), comment: None, validator_errored: true }
    }
}

#[derive(Deserialize)]
struct ScoringPayload {
    score: f64,
    #[serde(default)]
    subscores: std::collections::HashMap<String, f64>,
    #[serde(default)]
    comment: Option<String>,
}

/// Builds the deterministic scoring prompt: task description, the
/// Implementer's response, and any `to_orch` guidance already captured for
/// this iteration.
pub fn build_scoring_prompt(task_description: &str, response: &str, to_orch_guidance: Option<&str>) -> String {
    let mut prompt = String::new();
    prompt.push_str("You are scoring an engineering task response. Reply with JSON only: ");
    prompt.push_str(r#"{"score": <0..1>, "subscores": {...}, "comment": "<short>"}.\n\n"#);
    prompt.push_str("Task:\n");
    prompt.push_str(task_description);
    prompt.push_str("\n\nResponse:\n");
    prompt.push_str(response);
    if let Some(guidance) = to_orch_guidance {
        prompt.push_str("\n\nReviewer guidance:\n");
        prompt.push_str(guidance);
    }
    prompt
}

pub async fn score_quality(
    gateway: &dyn LlmGateway,
    task_description: &str,
    response: &str,
    to_orch_guidance: Option<&str>,
) -> QualityResult {
    let prompt = build_scoring_prompt(task_description, response, to_orch_guidance);
    let reply = match gateway.send(LlmRequest::new(prompt)).await {
        Ok(r) => r,
        Err(LlmError::Unavailable) | Err(LlmError::Transport(_)) | Err(LlmError::InvalidResponse(_)) => {
            return QualityResult::errored();
        }
    };

    match extract_json(&reply.content) {
        Some(payload) => QualityResult {
            score: payload.score.clamp(0.0, 1.0),
            subscores: payload.subscores.into_iter().collect(),
            comment: payload.comment,
            validator_errored: false,
        },
        None => QualityResult::errored(),
    }
}

/// Builds the short "why did quality drop" analysis a `feedback_request`
/// `to_orch` directive triggers after scoring — stored as a pending
/// `to_impl` directive for the next iteration.
pub async fn generate_feedback_analysis(
    gateway: &dyn LlmGateway,
    task_description: &str,
    response: &str,
    quality: &QualityResult,
) -> String {
    let mut prompt = String::new();
    prompt.push_str("In two or three sentences, explain what the response below is missing relative to the task, ");
    prompt.push_str("given it scored ");
    prompt.push_str(&quality.score.to_string());
    prompt.push_str(" out of 1. Reply with plain text, no JSON.\n\nTask:\n");
    prompt.push_str(task_description);
    prompt.push_str("\n\nResponse:\n");
    prompt.push_str(response);

    match gateway.send(LlmRequest::new(prompt)).await {
        Ok(reply) if !reply.content.trim().is_empty() => reply.content.trim().to_string(),
        _ => quality.comment.clone().unwrap_or_else(|| "no analysis available".to_string()),
    }
}

fn extract_json(text: &str) -> Option<ScoringPayload> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    serde_json::from_str(&text[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockLlmGateway;
    use crate::llm::LlmResponse;

    #[tokio::test]
    async fn parses_score_from_llm_response() {
        let gateway = MockLlmGateway::new(vec![Ok(LlmResponse {
            content: r#"{"score": 0.82, "subscores": {"correctness": 0.9}, "comment": "good"}"#.to_string(),
            input_tokens: 10,
            output_tokens: 5,
        })]);
        let result = score_quality(&gateway, "task", "response", None).await;
        assert!(!result.validator_errored);
        assert!((result.score - 0.82).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unparseable_response_yields_zero_and_error_flag() {
        let gateway = MockLlmGateway::new(vec![Ok(LlmResponse {
            content: "not json at all".to_string(),
            input_tokens: 10,
            output_tokens: 5,
        })]);
        let result = score_quality(&gateway, "task", "response", None).await;
        assert!(result.validator_errored);
        assert_eq!(result.score, 0.0);
    }

    #[tokio::test]
    async fn feedback_analysis_falls_back_to_comment_on_llm_failure() {
        let gateway = MockLlmGateway::new(vec![]);
        let quality = QualityResult { score: 0.4, subscores: Vec::new(), comment: Some("missing tests".into()), validator_errored: false };
        let analysis = generate_feedback_analysis(&gateway, "task", "response", &quality).await;
        assert_eq!(analysis, "missing tests");
    }

    #[tokio::test]
    async fn feedback_analysis_uses_llm_response_when_available() {
        let gateway = MockLlmGateway::new(vec![Ok(LlmResponse {
            content: "It never handles the empty-file case.".to_string(),
            input_tokens: 10,
            output_tokens: 10,
        })]);
        let quality = QualityResult { score: 0.4, subscores: Vec::new(), comment: None, validator_errored: false };
        let analysis = generate_feedback_analysis(&gateway, "task", "response", &quality).await;
        assert_eq!(analysis, "It never handles the empty-file case.");
    }
}
