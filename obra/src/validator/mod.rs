//! Validator Pipeline: completeness check → quality scoring (via the LLM
//! Gateway) → confidence derivation. Three independently testable stages
//! as three independently testable stages.

pub mod completeness;
pub mod confidence;
pub mod quality;

pub use completeness::{check_completeness, CompletenessResult};
pub use confidence::derive_confidence;
pub use quality::{generate_feedback_analysis, score_quality, QualityResult};
