//! Dropout Simulator
//!
//! Stochastic process deciding, once per control tick, whether the line
//! momentarily cuts out. A dropout has a hard onset and a linear release
//! back to full volume.

use std::collections::VecDeque;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use crate::dsp::curve::{clamp_progress, dropout_probability};

/// Shallowest possible dropout
pub const MIN_DEPTH: f64 = 0.1;

/// Deepest possible dropout
pub const MAX_DEPTH: f64 = 0.95;

/// Shortest release back to full volume
pub const MIN_RECOVERY_SECS: f64 = 0.05;

/// Longest release back to full volume
pub const MAX_RECOVERY_SECS: f64 = 0.20;

/// Source of uniform samples in [0, 1)
///
/// Injected into the simulator so tests can script exact draws.
pub trait RandomSource: Send {
    fn next_unit(&mut self) -> f64;
}

impl RandomSource for Pcg32 {
    fn next_unit(&mut self) -> f64 {
        self.gen::<f64>()
    }
}

/// Replays a fixed sequence of draws, cycling when exhausted
#[derive(Debug, Clone)]
pub struct SequenceRandom {
    values: VecDeque<f64>,
}

impl SequenceRandom {
    pub fn new(values: impl IntoIterator<Item = f64>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }
}

impl RandomSource for SequenceRandom {
    fn next_unit(&mut self) -> f64 {
        match self.values.pop_front() {
            Some(value) => {
                self.values.push_back(value);
                value.clamp(0.0, 1.0 - f64::EPSILON)
            }
            // An empty script never triggers
            None => 1.0 - f64::EPSILON,
        }
    }
}

/// One momentary attenuation of the wet path
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DropoutEvent {
    /// Index of the control tick that fired the event
    pub triggered_at_tick: u64,
    /// Context time of the onset in seconds
    pub triggered_at: f64,
    /// Attenuation depth in [0.1, 0.95]
    pub depth: f64,
    /// Release duration in [0.05, 0.20] seconds
    pub recovery_time_secs: f64,
    /// Gate level applied at the onset
    pub onset_volume: f64,
}

impl DropoutEvent {
    /// Gate level implied by the depth alone: `1 - depth`
    pub fn floor_volume(&self) -> f64 {
        1.0 - self.depth
    }

    /// Context time at which the gate is back at unity
    pub fn recovered_at(&self) -> f64 {
        self.triggered_at + self.recovery_time_secs
    }

    /// Gate level at context time `time`
    pub fn envelope_at(&self, time: f64) -> f64 {
        if time < self.triggered_at {
            return 1.0;
        }
        if time >= self.recovered_at() {
            return 1.0;
        }
        let fraction = (time - self.triggered_at) / self.recovery_time_secs;
        self.onset_volume + (1.0 - self.onset_volume) * fraction
    }
}

/// Per-tick dropout process
pub struct DropoutSimulator {
    rng: Box<dyn RandomSource>,
    ticks: u64,
    active: Option<DropoutEvent>,
}

impl std::fmt::Debug for DropoutSimulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DropoutSimulator")
            .field("ticks", &self.ticks)
            .field("active", &self.active)
            .finish()
    }
}

impl DropoutSimulator {
    /// Create a simulator drawing from the given source
    pub fn new(rng: Box<dyn RandomSource>) -> Self {
        Self {
            rng,
            ticks: 0,
            active: None,
        }
    }

    /// Create a simulator seeded from OS entropy
    pub fn from_entropy() -> Self {
        Self::new(Box::new(Pcg32::from_entropy()))
    }

    /// Create a reproducible simulator
    pub fn seeded(seed: u64) -> Self {
        Self::new(Box::new(Pcg32::seed_from_u64(seed)))
    }

    /// Number of ticks evaluated so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// The event whose release is still in progress, if any
    #[cfg(test)]
    pub(crate) fn active(&self) -> Option<&DropoutEvent> {
        self.active.as_ref()
    }

    /// Gate level the simulator expects at `time`
    pub fn attenuation_at(&self, time: f64) -> f64 {
        self.active.map_or(1.0, |event| event.envelope_at(time))
    }

    /// Evaluate one control tick at context time `now`
    ///
    /// Draws exactly one sample for the trigger decision and, when the
    /// trigger fires, one more for the recovery time.
    pub fn tick(&mut self, progress: f64, now: f64) -> Option<DropoutEvent> {
        let tick = self.ticks;
        self.ticks += 1;

        if self.active.is_some_and(|event| now >= event.recovered_at()) {
            self.active = None;
        }

        let p = clamp_progress(progress);
        if self.rng.next_unit() >= dropout_probability(p) {
            return None;
        }

        let depth = (MIN_DEPTH + (MAX_DEPTH - MIN_DEPTH) * p).clamp(MIN_DEPTH, MAX_DEPTH);
        let recovery_time_secs = (MIN_RECOVERY_SECS
            + (MAX_RECOVERY_SECS - MIN_RECOVERY_SECS) * self.rng.next_unit())
        .clamp(MIN_RECOVERY_SECS, MAX_RECOVERY_SECS);

        Some(self.trigger(tick, now, depth, recovery_time_secs))
    }

    /// Start a dropout now, restarting from the current gate level when a
    /// previous release is still running
    pub fn trigger(
        &mut self,
        tick: u64,
        now: f64,
        depth: f64,
        recovery_time_secs: f64,
    ) -> DropoutEvent {
        let depth = depth.clamp(MIN_DEPTH, MAX_DEPTH);
        let current = self.attenuation_at(now);
        let mut event = DropoutEvent {
            triggered_at_tick: tick,
            triggered_at: now,
            depth,
            recovery_time_secs: recovery_time_secs.clamp(MIN_RECOVERY_SECS, MAX_RECOVERY_SECS),
            onset_volume: 1.0,
        };
        event.onset_volume = current.min(event.floor_volume());
        self.active = Some(event);
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn scripted(values: &[f64]) -> DropoutSimulator {
        DropoutSimulator::new(Box::new(SequenceRandom::new(values.iter().copied())))
    }

    #[test]
    fn test_no_dropout_at_start() {
        let mut sim = scripted(&[0.0]);
        for i in 0..100 {
            assert!(sim.tick(0.0, i as f64 / 60.0).is_none());
        }
        assert_eq!(sim.ticks(), 100);
    }

    #[test]
    fn test_trigger_below_probability() {
        // p = 1.0 gives probability 0.05; 0.01 fires, second draw sets recovery
        let mut sim = scripted(&[0.01, 0.5]);
        let event = sim.tick(1.0, 3.0).expect("dropout should fire");
        assert_eq!(event.triggered_at_tick, 0);
        assert_relative_eq!(event.depth, 0.95);
        assert_relative_eq!(event.recovery_time_secs, 0.125);
        assert_relative_eq!(event.onset_volume, 0.05, epsilon = 1e-12);
    }

    #[test]
    fn test_draw_at_probability_does_not_fire() {
        let mut sim = scripted(&[0.05]);
        assert!(sim.tick(1.0, 0.0).is_none());
    }

    #[test]
    fn test_depth_scales_with_progress() {
        let mut sim = scripted(&[0.0, 0.0]);
        let event = sim.tick(0.5, 0.0).unwrap();
        assert_relative_eq!(event.depth, 0.525);
        assert_relative_eq!(event.recovery_time_secs, MIN_RECOVERY_SECS);
    }

    #[test]
    fn test_envelope_hard_onset_linear_release() {
        let mut sim = scripted(&[]);
        let event = sim.trigger(0, 1.0, 0.5, 0.1);

        assert_relative_eq!(event.envelope_at(1.0), 0.5);
        assert_relative_eq!(event.envelope_at(1.05), 0.75);
        assert_relative_eq!(event.envelope_at(1.1), 1.0);
        assert_relative_eq!(event.envelope_at(0.99), 1.0);
    }

    #[test]
    fn test_overlap_restarts_from_current_level() {
        let mut sim = scripted(&[]);
        sim.trigger(0, 0.0, 0.9, 0.2);

        // Half way through the release the gate sits at 0.55
        let second = sim.trigger(6, 0.1, 0.3, 0.1);
        assert_relative_eq!(second.onset_volume, 0.55, epsilon = 1e-12);
        // Never multiplied: 0.55 * 0.7 would be 0.385
        assert!(second.onset_volume > 0.385);
    }

    #[test]
    fn test_overlap_uses_new_floor_when_lower() {
        let mut sim = scripted(&[]);
        sim.trigger(0, 0.0, 0.2, 0.2);
        let second = sim.trigger(3, 0.05, 0.6, 0.1);
        assert_relative_eq!(second.onset_volume, 0.4, epsilon = 1e-12);
    }

    #[test]
    fn test_active_event_retired_after_recovery() {
        let mut sim = scripted(&[0.0, 0.0, 0.99]);
        sim.tick(1.0, 0.0).unwrap();
        assert!(sim.active().is_some());

        assert!(sim.tick(1.0, 0.5).is_none());
        assert!(sim.active().is_none());
        assert_relative_eq!(sim.attenuation_at(0.5), 1.0);
    }

    #[test]
    fn test_seeded_rate_matches_probability() {
        let mut sim = DropoutSimulator::seeded(7);
        let ticks = 60_000;
        let fired = (0..ticks)
            .filter(|i| sim.tick(1.0, *i as f64).is_some())
            .count();
        let rate = fired as f64 / ticks as f64;
        assert!((rate - 0.05).abs() < 0.01, "rate was {}", rate);
    }
}
