//! Decision Engine: a pure, synchronous function from validation outcome to
//! the next action. No I/O, no async — grounded in the routing switch the
//! teacher's `loop/engine.rs` performs after each validation pass, but
//! extracted here as a standalone, independently testable unit per the
//! contract's explicit ban on hiding this behind side effects.

use serde::{Deserialize, Serialize};

use crate::domain::DirectiveIntent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Proceed,
    Clarify,
    Retry,
    Escalate,
    Breakpoint,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Proceed => "proceed",
            Decision::Clarify => "clarify",
            Decision::Retry => "retry",
            Decision::Escalate => "escalate",
            Decision::Breakpoint => "breakpoint",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DecisionThresholds {
    pub quality_proceed_threshold: f64,
    pub quality_critical_threshold: f64,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            quality_proceed_threshold: 0.70,
            quality_critical_threshold: 0.50,
        }
    }
}

/// Breakpoint triggers the caller has already evaluated (iteration ceiling,
/// consecutive-CLARIFY streak, quality collapse, user request). The engine
/// itself stays pure by taking these as booleans rather than recomputing
/// history.
#[derive(Debug, Clone, Copy, Default)]
pub struct BreakpointTriggers {
    pub hard_ceiling_reached: bool,
    pub three_consecutive_clarifies: bool,
    pub quality_collapsed: bool,
    pub user_requested: bool,
}

impl BreakpointTriggers {
    pub fn any(&self) -> bool {
        self.hard_ceiling_reached || self.three_consecutive_clarifies || self.quality_collapsed || self.user_requested
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ValidationOutcome {
    pub passed: bool,
    pub quality: f64,
    /// `true` when the Orchestrator LLM's scoring response itself failed to
    /// parse; the failure is at the validator boundary, not the Implementer's.
    pub validator_errored: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct DecisionInput {
    pub validation: ValidationOutcome,
    pub iteration: u32,
    pub max_iterations: u32,
    pub breakpoints: BreakpointTriggers,
    pub directive_intent: Option<DirectiveIntent>,
    pub directive_text_is_accept_hint: bool,
}

/// A decision plus an optional human-readable note (used only for rule 2's
/// "PROCEED with a note" — every other rule leaves it `None`).
#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    pub decision: Decision,
    pub note: Option<String>,
}

impl DecisionOutcome {
    fn plain(decision: Decision) -> Self {
        Self { decision, note: None }
    }
}

/// Pure rule evaluation, checked in order — the first match wins.
pub fn decide(input: DecisionInput, thresholds: DecisionThresholds) -> DecisionOutcome {
    // Edge case: validator boundary failure is retried via the Retry
    // Coordinator, not routed through the normal quality rules.
    if input.validation.validator_errored {
        return DecisionOutcome::plain(Decision::Retry);
    }

    if input.breakpoints.any() {
        return DecisionOutcome::plain(Decision::Breakpoint);
    }

    if input.directive_intent == Some(DirectiveIntent::DecisionHint)
        && input.directive_text_is_accept_hint
        && input.validation.passed
        && input.validation.quality >= thresholds.quality_proceed_threshold - 0.1
    {
        return DecisionOutcome {
            decision: Decision::Proceed,
            note: Some("accepted via decision_hint directive".to_string()),
        };
    }

    let raw = if !input.validation.passed || input.validation.quality < thresholds.quality_critical_threshold {
        Decision::Escalate
    } else if input.validation.quality >= thresholds.quality_proceed_threshold {
        Decision::Proceed
    } else if input.validation.quality >= thresholds.quality_critical_threshold {
        Decision::Clarify
    } else {
        Decision::Retry
    };

    // At the iteration ceiling, RETRY/CLARIFY can't continue the loop; promote to ESCALATE.
    let final_decision = if input.iteration >= input.max_iterations && matches!(raw, Decision::Retry | Decision::Clarify) {
        Decision::Escalate
    } else {
        raw
    };

    DecisionOutcome::plain(final_decision)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_input(quality: f64, passed: bool) -> DecisionInput {
        DecisionInput {
            validation: ValidationOutcome { passed, quality, validator_errored: false },
            iteration: 1,
            max_iterations: 5,
            breakpoints: BreakpointTriggers::default(),
            directive_intent: None,
            directive_text_is_accept_hint: false,
        }
    }

    #[test]
    fn proceed_threshold_is_inclusive() {
        let out = decide(base_input(0.70, true), DecisionThresholds::default());
        assert_eq!(out.decision, Decision::Proceed);
    }

    #[test]
    fn critical_threshold_is_inclusive_toward_clarify() {
        let out = decide(base_input(0.50, true), DecisionThresholds::default());
        assert_eq!(out.decision, Decision::Clarify);
    }

    #[test]
    fn just_under_critical_escalates() {
        let out = decide(base_input(0.4999, true), DecisionThresholds::default());
        assert_eq!(out.decision, Decision::Escalate);
    }

    #[test]
    fn failed_validation_always_escalates_regardless_of_quality() {
        let out = decide(base_input(0.95, false), DecisionThresholds::default());
        assert_eq!(out.decision, Decision::Escalate);
    }

    #[test]
    fn mid_band_quality_clarifies() {
        let out = decide(base_input(0.60, true), DecisionThresholds::default());
        assert_eq!(out.decision, Decision::Clarify);
    }

    #[test]
    fn at_max_iteration_clarify_promotes_to_escalate() {
        let mut input = base_input(0.60, true);
        input.iteration = 5;
        input.max_iterations = 5;
        let out = decide(input, DecisionThresholds::default());
        assert_eq!(out.decision, Decision::Escalate);
    }

    #[test]
    fn breakpoint_trigger_wins_over_everything_else() {
        let mut input = base_input(0.95, true);
        input.breakpoints.hard_ceiling_reached = true;
        let out = decide(input, DecisionThresholds::default());
        assert_eq!(out.decision, Decision::Breakpoint);
    }

    #[test]
    fn validator_error_is_retried_not_escalated() {
        let mut input = base_input(0.0, false);
        input.validation.validator_errored = true;
        let out = decide(input, DecisionThresholds::default());
        assert_eq!(out.decision, Decision::Retry);
    }

    #[test]
    fn accept_decision_hint_proceeds_near_threshold() {
        let mut input = base_input(0.62, true);
        input.directive_intent = Some(DirectiveIntent::DecisionHint);
        input.directive_text_is_accept_hint = true;
        let out = decide(input, DecisionThresholds::default());
        assert_eq!(out.decision, Decision::Proceed);
        assert!(out.note.is_some());
    }

    #[test]
    fn accept_decision_hint_does_not_override_failed_validation() {
        let mut input = base_input(0.62, false);
        input.directive_intent = Some(DirectiveIntent::DecisionHint);
        input.directive_text_is_accept_hint = true;
        let out = decide(input, DecisionThresholds::default());
        assert_eq!(out.decision, Decision::Escalate);
    }
}
