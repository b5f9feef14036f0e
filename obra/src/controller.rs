//! Iteration Controller: the core loop. Drives one task from READY to a
//! terminal state by composing every other component, following the
//! algorithm. Grounded in the teacher's `LoopEngine::run()` —
//! same per-iteration step ordering, same "persist before looping again"
//! discipline — generalized from the teacher's single validation-command
//! model to Obra's full validate/score/decide pipeline.

use std::sync::Arc;

use obra_store::Store;
use tracing::{debug, info, warn};

use crate::agent::{AgentDriver, AgentError, SendPromptOptions};
use crate::decision::{decide, BreakpointTriggers, Decision, DecisionInput, DecisionThresholds, ValidationOutcome};
use crate::domain::{DirectiveIntent, DirectiveTarget, InjectedDirective, Iteration, Session, Task, TaskStatus, TokenUsage};
use crate::error::{ObraError, ObraResult};
use crate::events::EventEmitter;
use crate::llm::LlmGateway;
use crate::persistence::Persistence;
use crate::prompt::{assemble_prompt, PromptSections};
use crate::retry::{ErrorClass, RetryConfig, RetryCoordinator, RetryDecision};
use crate::session_manager::{ContextWindowConfig, SessionManager};
use crate::validator::{check_completeness, derive_confidence, generate_feedback_analysis, score_quality};

#[derive(Debug, Clone)]
pub struct ControllerResult {
    pub status: TaskStatus,
    pub iterations: u32,
    pub quality: f64,
    pub confidence: f64,
    pub decision: Decision,
}

pub struct IterationController {
    store: Store,
    persistence: Persistence,
    sessions: SessionManager,
    emitter: EventEmitter,
    decision_thresholds: DecisionThresholds,
    retry_config: RetryConfig,
    token_budget: u64,
}

impl IterationController {
    pub fn new(
        store: Store,
        sessions: SessionManager,
        emitter: EventEmitter,
        decision_thresholds: DecisionThresholds,
        retry_config: RetryConfig,
        token_budget: u64,
    ) -> Self {
        let persistence = Persistence::new(store.clone());
        Self { store, persistence, sessions, emitter, decision_thresholds, retry_config, token_budget }
    }

    /// Drives `task_id` from READY through to a terminal result. `agent` and
    /// `llm` are injected so callers can run a fully deterministic mock in
    /// tests; both are assumed already initialized.
    pub async fn run(
        &self,
        mut task: Task,
        max_iterations: u32,
        agent: &mut dyn AgentDriver,
        llm: &dyn LlmGateway,
    ) -> ObraResult<ControllerResult> {
        if task.status == TaskStatus::InProgress {
            return Err(ObraError::TaskAlreadyRunning { task_id: task.id.clone() });
        }
        task.status = TaskStatus::InProgress;
        task.touch();
        self.store.put(&task).await?;

        let (mut session, epic_context_summary) =
            self.sessions.open_for_epic(&task.project_id, task.epic_id.clone()).await?;

        let mut retry_coordinator = RetryCoordinator::new(self.retry_config);
        let mut prior_feedback: Option<String> = None;
        let mut consecutive_clarifies = 0u32;
        let mut previous_quality: Option<f64> = None;
        let mut last_decision = Decision::Retry;
        let mut last_quality = 0.0;
        let mut last_confidence = 0.0;

        let mut iteration_number = 0u32;
        'outer: while iteration_number < max_iterations {
            iteration_number += 1;

            session = self
                .sessions
                .maybe_refresh(session, llm, &format!("iteration {iteration_number}"), &task.description)
                .await?;

            // Apply any pending Injected-Directive captured before this
            // iteration's prompt assembly; directives arriving while the
            // agent/LLM calls below are in flight are left unapplied and
            // picked up at the top of the next iteration.
            let pending_directives = self.persistence.pending_directives(&task.id).await?;
            let mut to_impl_directive: Option<String> = None;
            let mut to_orch_guidance: Option<String> = None;
            let mut directive_intent: Option<DirectiveIntent> = None;
            let mut directive_text_is_accept_hint = false;
            for mut directive in pending_directives {
                match directive.target {
                    DirectiveTarget::Implementer => to_impl_directive = Some(directive.text.clone()),
                    DirectiveTarget::Orchestrator => {
                        directive_intent = Some(directive.intent);
                        directive_text_is_accept_hint =
                            directive.intent == DirectiveIntent::DecisionHint && directive.text.to_lowercase().contains("accept");
                        to_orch_guidance = Some(directive.text.clone());
                    }
                }
                self.persistence.mark_directive_applied(&mut directive).await?;
            }

            let sections = PromptSections {
                task_description: task.description.clone(),
                acceptance_criteria: None,
                epic_context_summary: epic_context_summary.clone(),
                prior_iteration_feedback: prior_feedback.take(),
                to_impl_directive: to_impl_directive.clone(),
            };
            let assembled = assemble_prompt(&task, &sections, self.token_budget);
            self.emitter.prompt_assembled(iteration_number, &assembled.fingerprint, assembled.estimated_tokens);
            self.emitter.iteration_started(iteration_number, &session.id);

            let opts = SendPromptOptions {
                max_turns: None,
                session_id: Some(session.id.clone()),
                structured_output: true,
                bypass_interactive_permissions: true,
            };

            let response = loop {
                match agent.send_prompt(&assembled.text, opts.clone()).await {
                    Ok(response) => break response,
                    Err(AgentError::MaxTurnsExhausted { max_turns }) => {
                        let doubled = (max_turns * 2).min(200);
                        let mut retried_opts = opts.clone();
                        retried_opts.max_turns = Some(doubled);
                        match agent.send_prompt(&assembled.text, retried_opts).await {
                            Ok(response) => break response,
                            Err(e) => {
                                task.status = TaskStatus::Failed;
                                self.store.put(&task).await?;
                                return Err(classify_and_wrap(&task.id, e));
                            }
                        }
                    }
                    Err(e @ AgentError::Transport(_)) => {
                        let (attempt, decision) = retry_coordinator.record_failure(&task.id);
                        match decision {
                            RetryDecision::RetryAfterMs(delay_ms) => {
                                self.emitter.retry_scheduled(attempt, delay_ms, "TransportError");
                                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                                continue;
                            }
                            RetryDecision::CapExceeded => {
                                task.status = TaskStatus::Failed;
                                self.store.put(&task).await?;
                                return Err(classify_and_wrap(&task.id, e));
                            }
                        }
                    }
                    Err(e) => {
                        task.status = TaskStatus::Failed;
                        self.store.put(&task).await?;
                        return Err(classify_and_wrap(&task.id, e));
                    }
                }
            };
            retry_coordinator.reset(&task.id);

            self.sessions.add_tokens(&mut session, response.usage.total()).await?;

            let completeness = check_completeness(&response.content, &["summary", "files_changed"]);
            let quality_result = score_quality(llm, &task.description, &response.content, to_orch_guidance.as_deref()).await;
            let trend = quality_result.score - previous_quality.unwrap_or(quality_result.score);
            let confidence = derive_confidence(completeness.complete, quality_result.score, trend);
            let quality_collapsed = previous_quality.is_some() && trend < -0.3;
            previous_quality = Some(quality_result.score);

            self.emitter.validation_completed(iteration_number, completeness.complete, quality_result.score, confidence);

            // A feedback_request to_orch directive queues a short analysis as
            // a fresh one-shot to_impl directive for the next iteration.
            if directive_intent == Some(DirectiveIntent::FeedbackRequest) {
                let analysis = generate_feedback_analysis(llm, &task.description, &response.content, &quality_result).await;
                let follow_up = InjectedDirective::to_impl(&task.project_id, &task.id, analysis);
                self.store.put(&follow_up).await?;
            }

            let decision_input = DecisionInput {
                validation: ValidationOutcome {
                    passed: completeness.complete,
                    quality: quality_result.score,
                    validator_errored: quality_result.validator_errored,
                },
                iteration: iteration_number,
                max_iterations,
                breakpoints: BreakpointTriggers {
                    hard_ceiling_reached: false,
                    three_consecutive_clarifies: consecutive_clarifies >= 3,
                    quality_collapsed,
                    user_requested: false,
                },
                directive_intent,
                directive_text_is_accept_hint,
            };
            let outcome = decide(decision_input, self.decision_thresholds);
            self.emitter.decision_made(iteration_number, outcome.decision, outcome.note.clone());

            let mut iteration = Iteration::new(
                &task.id,
                &session.id,
                iteration_number,
                &assembled.fingerprint,
                &response.content,
                response.usage,
                response.duration_ms,
            );
            iteration.decision = outcome.decision;
            iteration.completeness = completeness.complete;
            iteration.quality = quality_result.score;
            iteration.confidence = confidence;
            self.store.put(&iteration).await?;

            last_decision = outcome.decision;
            last_quality = quality_result.score;
            last_confidence = confidence;

            match outcome.decision {
                Decision::Proceed => {
                    task.status = TaskStatus::Completed;
                    task.touch();
                    self.store.put(&task).await?;
                    self.emitter.task_completed(iteration_number);
                    break 'outer;
                }
                Decision::Retry => {
                    task.retry_count += 1;
                    self.store.put(&task).await?;
                    consecutive_clarifies = 0;
                }
                Decision::Clarify => {
                    consecutive_clarifies += 1;
                    prior_feedback = quality_result.comment.clone();
                }
                Decision::Escalate => {
                    task.status = TaskStatus::Escalated;
                    task.touch();
                    self.store.put(&task).await?;
                    self.emitter.task_escalated(iteration_number, "quality or validation below threshold");
                    break 'outer;
                }
                Decision::Breakpoint => {
                    task.breakpoint = true;
                    task.touch();
                    self.store.put(&task).await?;
                    info!(task_id = %task.id, "controller: breakpoint reached, pausing");
                    break 'outer;
                }
            }
        }

        if task.status == TaskStatus::InProgress && iteration_number >= max_iterations {
            warn!(task_id = %task.id, "controller: exhausted max_iterations without terminating");
            task.status = TaskStatus::Failed;
            task.touch();
            self.store.put(&task).await?;
            self.emitter.task_failed("exhausted max_iterations");
        }

        debug!(task_id = %task.id, iterations = iteration_number, "controller: run complete");

        Ok(ControllerResult {
            status: task.status,
            iterations: iteration_number,
            quality: last_quality,
            confidence: last_confidence,
            decision: last_decision,
        })
    }
}

fn classify_and_wrap(task_id: &str, error: AgentError) -> ObraError {
    match &error {
        AgentError::MaxTurnsExhausted { max_turns } => {
            ObraError::AgentMaxTurns { task_id: task_id.to_string(), max_turns: *max_turns }
        }
        AgentError::Schema(reason) => ObraError::Schema { task_id: task_id.to_string(), reason: reason.clone() },
        _ => ObraError::Transport { component: "agent_driver", source: Box::new(error) },
    }
}

/// Maps an `ObraError` kind name through `crate::retry::classify`, used by
/// callers deciding whether a controller failure is worth a fresh attempt at
/// the orchestrator level (separate from the per-iteration retry above).
pub fn is_retryable(error: &ObraError) -> bool {
    crate::retry::classify(error.kind()) == ErrorClass::Retryable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::mock::MockAgentDriver;
    use crate::agent::StructuredResponse;
    use crate::domain::TaskType;
    use crate::llm::mock::MockLlmGateway;
    use crate::llm::LlmResponse;

    fn csv_task() -> Task {
        Task::new(
            "p1",
            TaskType::Task,
            "CSV average",
            "Read a CSV with columns name,age,city and print the average age.",
            5,
        )
    }

    fn structured(content: &str, total_tokens: u64) -> StructuredResponse {
        StructuredResponse {
            content: content.to_string(),
            session_id: "sess".into(),
            usage: TokenUsage { input: total_tokens / 2, cache_create: 0, cache_read: 0, output: total_tokens / 2 },
            duration_ms: 100,
            num_turns: 1,
            error_subtype: None,
        }
    }

    #[tokio::test]
    async fn two_iteration_clarify_then_proceed_completes_task() {
        let store = Store::open_in_memory().await.unwrap();
        let sessions = SessionManager::new(store.clone(), ContextWindowConfig::default());
        let emitter = crate::events::EventBus::new().emitter_for("t1");
        let controller =
            IterationController::new(store.clone(), sessions, emitter, DecisionThresholds::default(), RetryConfig::default(), 50_000);

        let mut agent = MockAgentDriver::new(vec![
            Ok(structured(r#"{"summary": "script without int cast", "files_changed": ["avg.py"]}"#, 1000)),
            Ok(structured(r#"{"summary": "fixed with int cast", "files_changed": ["avg.py"]}"#, 1000)),
        ]);
        let llm = MockLlmGateway::new(vec![
            Ok(LlmResponse { content: r#"{"score": 0.62, "comment": "missing int() cast"}"#.into(), input_tokens: 5, output_tokens: 5 }),
            Ok(LlmResponse { content: r#"{"score": 0.78}"#.into(), input_tokens: 5, output_tokens: 5 }),
        ]);

        let result = controller.run(csv_task(), 5, &mut agent, &llm).await.unwrap();
        assert_eq!(result.status, TaskStatus::Completed);
        assert_eq!(result.iterations, 2);
        assert_eq!(result.decision, Decision::Proceed);
    }

    #[tokio::test]
    async fn low_quality_escalates_after_one_iteration() {
        let store = Store::open_in_memory().await.unwrap();
        let sessions = SessionManager::new(store.clone(), ContextWindowConfig::default());
        let emitter = crate::events::EventBus::new().emitter_for("t1");
        let controller =
            IterationController::new(store.clone(), sessions, emitter, DecisionThresholds::default(), RetryConfig::default(), 50_000);

        let mut agent = MockAgentDriver::new(vec![Ok(structured(
            r#"{"summary": "bad attempt", "files_changed": ["x.py"]}"#,
            1000,
        ))]);
        let llm = MockLlmGateway::new(vec![Ok(LlmResponse {
            content: r#"{"score": 0.42}"#.into(),
            input_tokens: 5,
            output_tokens: 5,
        })]);

        let result = controller.run(csv_task(), 5, &mut agent, &llm).await.unwrap();
        assert_eq!(result.status, TaskStatus::Escalated);
        assert_eq!(result.decision, Decision::Escalate);
    }

    #[tokio::test]
    async fn to_orch_accept_directive_proceeds_past_a_clarify_quality_score() {
        let store = Store::open_in_memory().await.unwrap();
        let sessions = SessionManager::new(store.clone(), ContextWindowConfig::default());
        let emitter = crate::events::EventBus::new().emitter_for("t1");
        let controller = IterationController::new(
            store.clone(),
            sessions,
            emitter,
            DecisionThresholds::default(),
            RetryConfig::default(),
            50_000,
        );

        let task = csv_task();
        let directive = InjectedDirective::to_orch(&task.project_id, &task.id, "accept this, proceed anyway");
        store.put(&directive).await.unwrap();

        // Quality 0.62 is below the 0.70 proceed threshold but above
        // proceed_threshold - 0.1, so without the directive this would
        // resolve to CLARIFY rather than PROCEED.
        let mut agent = MockAgentDriver::new(vec![Ok(structured(
            r#"{"summary": "first pass", "files_changed": ["avg.py"]}"#,
            1000,
        ))]);
        let llm = MockLlmGateway::new(vec![Ok(LlmResponse {
            content: r#"{"score": 0.62}"#.into(),
            input_tokens: 5,
            output_tokens: 5,
        })]);

        let result = controller.run(task, 5, &mut agent, &llm).await.unwrap();
        assert_eq!(result.decision, Decision::Proceed);
        assert_eq!(result.status, TaskStatus::Completed);
        assert_eq!(result.iterations, 1);

        let applied: InjectedDirective = store.require(&directive.id).await.unwrap();
        assert!(applied.applied, "directive should be marked applied after being consumed");
    }

    #[tokio::test]
    async fn double_start_on_in_progress_task_fails() {
        let store = Store::open_in_memory().await.unwrap();
        let sessions = SessionManager::new(store.clone(), ContextWindowConfig::default());
        let emitter = crate::events::EventBus::new().emitter_for("t1");
        let controller =
            IterationController::new(store.clone(), sessions, emitter, DecisionThresholds::default(), RetryConfig::default(), 50_000);

        let mut task = csv_task();
        task.status = TaskStatus::InProgress;
        let mut agent = MockAgentDriver::new(vec![]);
        let llm = MockLlmGateway::new(vec![]);
        let err = controller.run(task, 5, &mut agent, &llm).await.unwrap_err();
        assert!(matches!(err, ObraError::TaskAlreadyRunning { .. }));
    }
}
