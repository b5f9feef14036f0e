//! Confidence derivation: a bounded, deterministic combination of signals,
//! stored for observability only — it must never gate the Decision
//! Engine the way a historical "overall confidence" heuristic once did.

/// `recent_quality_trend` is the delta between this iteration's quality and
/// the previous one (positive = improving), or `0.0` on the first iteration.
pub fn derive_confidence(completeness: bool, quality: f64, recent_quality_trend: f64) -> f64 {
    let completeness_component = if completeness { 1.0 } else { 0.0 };
    let trend_component = (0.5 + recent_quality_trend).clamp(0.0, 1.0);

    let combined = 0.3 * completeness_component + 0.5 * quality + 0.2 * trend_component;
    combined.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_bounded() {
        assert!(derive_confidence(true, 1.0, 1.0) <= 1.0);
        assert!(derive_confidence(false, 0.0, -1.0) >= 0.0);
    }

    #[test]
    fn incomplete_response_lowers_confidence() {
        let complete = derive_confidence(true, 0.8, 0.0);
        let incomplete = derive_confidence(false, 0.8, 0.0);
        assert!(incomplete < complete);
    }

    #[test]
    fn improving_trend_raises_confidence() {
        let flat = derive_confidence(true, 0.7, 0.0);
        let improving = derive_confidence(true, 0.7, 0.2);
        assert!(improving > flat);
    }
}
