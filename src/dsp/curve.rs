//! Degradation parameter curves
//!
//! Maps normalized playback progress to target values for every
//! time-varying parameter of the degradation graph. The curves are
//! deliberately non-linear: degradation is imperceptible early and
//! accelerates toward the end of the session.

use serde::{Deserialize, Serialize};

/// Feedback gain at progress 0 (baseline slap echo)
pub const FEEDBACK_FLOOR: f64 = 0.08;

/// Feedback gain at progress 1, kept well below runaway gain
pub const FEEDBACK_CEILING: f64 = 0.63;

/// Noise bed level at progress 1
pub const NOISE_CEILING: f64 = 0.25;

/// Per-tick dropout probability at progress 1
pub const DROPOUT_PROBABILITY_CEILING: f64 = 0.05;

/// Target parameter values for one progress value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    /// Processed signal level
    pub wet: f64,
    /// Unprocessed signal level, always `1 - wet`
    pub dry: f64,
    /// Noise bed level
    pub noise: f64,
    /// Delay-line feedback gain
    pub feedback: f64,
    /// Probability of a dropout on a single control tick
    pub dropout_probability: f64,
}

/// Clamp progress into [0, 1]; NaN is treated as 0
#[inline]
pub fn clamp_progress(progress: f64) -> f64 {
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 1.0)
    }
}

/// Wet level: `p^1.5`
pub fn wet(progress: f64) -> f64 {
    clamp_progress(progress).powf(1.5).clamp(0.0, 1.0)
}

/// Dry level: `1 - wet(p)`
pub fn dry(progress: f64) -> f64 {
    1.0 - wet(progress)
}

/// Noise level: `0.25 * p^2.2`
pub fn noise(progress: f64) -> f64 {
    (NOISE_CEILING * clamp_progress(progress).powf(2.2)).clamp(0.0, NOISE_CEILING)
}

/// Feedback gain: `0.08 + 0.55 * p`
pub fn feedback(progress: f64) -> f64 {
    (FEEDBACK_FLOOR + (FEEDBACK_CEILING - FEEDBACK_FLOOR) * clamp_progress(progress))
        .clamp(FEEDBACK_FLOOR, FEEDBACK_CEILING)
}

/// Per-tick dropout probability: `0.05 * p^2`
pub fn dropout_probability(progress: f64) -> f64 {
    let p = clamp_progress(progress);
    (DROPOUT_PROBABILITY_CEILING * p * p).clamp(0.0, DROPOUT_PROBABILITY_CEILING)
}

/// Evaluate every curve at once
pub fn curve(progress: f64) -> CurvePoint {
    let wet = wet(progress);
    CurvePoint {
        wet,
        dry: 1.0 - wet,
        noise: noise(progress),
        feedback: feedback(progress),
        dropout_probability: dropout_probability(progress),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use test_case::test_case;

    #[test]
    fn test_curve_at_start() {
        let point = curve(0.0);
        assert_eq!(point.wet, 0.0);
        assert_eq!(point.dry, 1.0);
        assert_eq!(point.noise, 0.0);
        assert_relative_eq!(point.feedback, 0.08);
        assert_eq!(point.dropout_probability, 0.0);
    }

    #[test]
    fn test_curve_at_end() {
        let point = curve(1.0);
        assert_eq!(point.wet, 1.0);
        assert_eq!(point.dry, 0.0);
        assert_relative_eq!(point.noise, 0.25);
        assert_relative_eq!(point.feedback, 0.63);
        assert_relative_eq!(point.dropout_probability, 0.05);
    }

    #[test_case(0.25, 0.125, 0.01184, 0.2175, 0.003125 ; "quarter")]
    #[test_case(0.5, 0.35355, 0.05441, 0.355, 0.0125 ; "half")]
    #[test_case(0.75, 0.64952, 0.13267, 0.4925, 0.028125 ; "three quarters")]
    fn test_curve_midpoints(p: f64, wet: f64, noise: f64, feedback: f64, dropout: f64) {
        let point = curve(p);
        assert_relative_eq!(point.wet, wet, epsilon = 1e-4);
        assert_relative_eq!(point.noise, noise, epsilon = 1e-4);
        assert_relative_eq!(point.feedback, feedback, epsilon = 1e-9);
        assert_relative_eq!(point.dropout_probability, dropout, epsilon = 1e-9);
    }

    #[test]
    fn test_out_of_range_progress_is_clamped() {
        assert_eq!(curve(-3.0), curve(0.0));
        assert_eq!(curve(7.5), curve(1.0));
        assert_eq!(curve(f64::NAN), curve(0.0));
        assert_eq!(curve(f64::INFINITY), curve(1.0));
    }

    #[test]
    fn test_dry_is_exact_complement() {
        for i in 0..=100 {
            let p = i as f64 / 100.0;
            let point = curve(p);
            assert_eq!(point.dry, 1.0 - point.wet);
        }
    }

    #[test]
    fn test_curves_are_monotonic() {
        let mut previous = curve(0.0);
        for i in 1..=1000 {
            let point = curve(i as f64 / 1000.0);
            assert!(point.wet >= previous.wet);
            assert!(point.noise >= previous.noise);
            assert!(point.feedback >= previous.feedback);
            assert!(point.dropout_probability >= previous.dropout_probability);
            previous = point;
        }
    }

    #[test]
    fn test_degradation_is_back_loaded() {
        // Half way through, the wet share is still well under half
        assert!(wet(0.5) < 0.36);
        assert!(noise(0.5) < 0.06);
    }

    #[test]
    fn test_feedback_never_leaves_bounds() {
        for i in -100..=200 {
            let fb = feedback(i as f64 / 100.0);
            assert!((FEEDBACK_FLOOR..=FEEDBACK_CEILING).contains(&fb));
        }
    }
}
