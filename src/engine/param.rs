//! Parameter Automation
//!
//! Every time-varying value in the render graph is an [`AudioParam`]. The
//! control side never writes a param directly: it schedules
//! [`AutomationEvent`]s, which the renderer evaluates sample by sample.

use std::collections::VecDeque;

/// Initial timeline capacity, sized so steady-state automation never reallocates
const EVENT_CAPACITY: usize = 32;

/// A scheduled change to a parameter, timed in context seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AutomationEvent {
    /// Jump to `value` at `time`
    SetValue { value: f32, time: f64 },
    /// Ramp linearly from the previous event to `value`, arriving at `end_time`
    LinearRamp { value: f32, end_time: f64 },
    /// Approach `target` exponentially from `start_time`
    SetTarget {
        target: f32,
        start_time: f64,
        time_constant: f64,
    },
    /// Drop every event scheduled at or after `time`
    CancelScheduled { time: f64 },
}

impl AutomationEvent {
    /// Time used to order the event on the timeline
    pub fn time(&self) -> f64 {
        match *self {
            AutomationEvent::SetValue { time, .. } => time,
            AutomationEvent::LinearRamp { end_time, .. } => end_time,
            AutomationEvent::SetTarget { start_time, .. } => start_time,
            AutomationEvent::CancelScheduled { time } => time,
        }
    }
}

/// Automatable, range-clamped render parameter
#[derive(Debug, Clone)]
pub struct AudioParam {
    value: f32,
    min: f32,
    max: f32,
    events: VecDeque<AutomationEvent>,
    /// Time and value the next linear ramp starts from
    anchor_time: f64,
    anchor_value: f32,
}

impl AudioParam {
    /// Create a param holding `default`, clamped to `[min, max]`
    pub fn new(default: f32, min: f32, max: f32) -> Self {
        let value = default.clamp(min, max);
        Self {
            value,
            min,
            max,
            events: VecDeque::with_capacity(EVENT_CAPACITY),
            anchor_time: 0.0,
            anchor_value: value,
        }
    }

    /// Current value
    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Number of events still waiting on the timeline
    #[cfg(test)]
    pub(crate) fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Insert an event on the timeline
    ///
    /// Events are kept in time order; events with equal times keep their
    /// scheduling order.
    pub fn schedule(&mut self, event: AutomationEvent) {
        let event = match event {
            AutomationEvent::CancelScheduled { time } => {
                self.events.retain(|e| e.time() < time);
                return;
            }
            AutomationEvent::SetValue { value, time } => AutomationEvent::SetValue {
                value: value.clamp(self.min, self.max),
                time,
            },
            AutomationEvent::LinearRamp { value, end_time } => AutomationEvent::LinearRamp {
                value: value.clamp(self.min, self.max),
                end_time,
            },
            AutomationEvent::SetTarget {
                target,
                start_time,
                time_constant,
            } => AutomationEvent::SetTarget {
                target: target.clamp(self.min, self.max),
                start_time,
                time_constant: time_constant.max(1e-6),
            },
        };

        let index = self
            .events
            .iter()
            .position(|e| e.time() > event.time())
            .unwrap_or(self.events.len());
        self.events.insert(index, event);
    }

    /// Advance to context time `time` and return the value for that sample
    ///
    /// `dt` is the sample period in seconds.
    #[inline]
    pub fn tick(&mut self, time: f64, dt: f64) -> f32 {
        while let Some(&front) = self.events.front() {
            match front {
                AutomationEvent::SetValue { value, time: at } => {
                    if at > time {
                        break;
                    }
                    self.settle(at, value);
                }
                AutomationEvent::LinearRamp { value, end_time } => {
                    if end_time <= time || end_time <= self.anchor_time {
                        self.settle(end_time.max(self.anchor_time), value);
                        continue;
                    }
                    let fraction = ((time - self.anchor_time) / (end_time - self.anchor_time))
                        .clamp(0.0, 1.0) as f32;
                    self.value = self.anchor_value + (value - self.anchor_value) * fraction;
                    break;
                }
                AutomationEvent::SetTarget {
                    target,
                    start_time,
                    time_constant,
                } => {
                    if start_time > time {
                        break;
                    }
                    let superseded = match self.events.get(1) {
                        Some(AutomationEvent::LinearRamp { .. }) => true,
                        Some(next) => next.time() <= time,
                        None => false,
                    };
                    if superseded {
                        self.settle(time, self.value);
                        continue;
                    }
                    let decay = (-dt / time_constant).exp() as f32;
                    self.value = target + (self.value - target) * decay;
                    break;
                }
                AutomationEvent::CancelScheduled { .. } => {
                    self.events.pop_front();
                }
            }
        }

        self.value = self.value.clamp(self.min, self.max);
        self.value
    }

    /// Pop the front event, leaving the param at `value` as of `time`
    fn settle(&mut self, time: f64, value: f32) {
        self.events.pop_front();
        self.value = value;
        self.anchor_time = time;
        self.anchor_value = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SR: f64 = 1000.0;
    const DT: f64 = 1.0 / SR;

    fn run(param: &mut AudioParam, from: f64, seconds: f64) -> Vec<f32> {
        let n = (seconds * SR).round() as usize;
        (0..n).map(|i| param.tick(from + i as f64 / SR, DT)).collect()
    }

    #[test]
    fn test_set_value_is_a_step() {
        let mut param = AudioParam::new(1.0, 0.0, 1.0);
        param.schedule(AutomationEvent::SetValue { value: 0.25, time: 0.1 });

        let values = run(&mut param, 0.0, 0.2);
        assert_eq!(values[99], 1.0);
        assert_eq!(values[100], 0.25);
        assert_eq!(param.pending_events(), 0);
    }

    #[test]
    fn test_linear_ramp_from_previous_event() {
        let mut param = AudioParam::new(1.0, 0.0, 1.0);
        param.schedule(AutomationEvent::SetValue { value: 0.0, time: 0.0 });
        param.schedule(AutomationEvent::LinearRamp { value: 1.0, end_time: 0.1 });

        let values = run(&mut param, 0.0, 0.2);
        assert_eq!(values[0], 0.0);
        assert_relative_eq!(values[50], 0.5, epsilon = 1e-6);
        assert_relative_eq!(values[100], 1.0);
        assert_relative_eq!(values[150], 1.0);
    }

    #[test]
    fn test_set_target_approaches_exponentially() {
        let mut param = AudioParam::new(0.0, 0.0, 1.0);
        param.schedule(AutomationEvent::SetTarget {
            target: 1.0,
            start_time: 0.0,
            time_constant: 0.1,
        });

        let values = run(&mut param, 0.0, 0.5);
        // One time constant reaches ~63%
        assert_relative_eq!(values[99], 1.0 - (-1.0_f32).exp(), epsilon = 0.01);
        assert!(values.windows(2).all(|w| w[1] >= w[0]));
        assert!(values[499] > 0.99);
    }

    #[test]
    fn test_newer_target_supersedes_older() {
        let mut param = AudioParam::new(0.0, 0.0, 1.0);
        param.schedule(AutomationEvent::SetTarget {
            target: 1.0,
            start_time: 0.0,
            time_constant: 0.01,
        });
        param.schedule(AutomationEvent::SetTarget {
            target: 0.2,
            start_time: 0.1,
            time_constant: 0.01,
        });

        let values = run(&mut param, 0.0, 0.3);
        assert!(values[99] > 0.99);
        assert_relative_eq!(values[299], 0.2, epsilon = 1e-3);
        assert_eq!(param.pending_events(), 1);
    }

    #[test]
    fn test_cancel_drops_future_events() {
        let mut param = AudioParam::new(1.0, 0.0, 1.0);
        param.schedule(AutomationEvent::SetValue { value: 0.0, time: 0.5 });
        param.schedule(AutomationEvent::LinearRamp { value: 1.0, end_time: 0.6 });
        param.schedule(AutomationEvent::CancelScheduled { time: 0.4 });
        assert_eq!(param.pending_events(), 0);

        let values = run(&mut param, 0.0, 1.0);
        assert!(values.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_values_clamped_to_range() {
        let mut param = AudioParam::new(0.5, 0.0, 0.95);
        param.schedule(AutomationEvent::SetValue { value: 4.0, time: 0.0 });
        assert_eq!(param.tick(0.0, DT), 0.95);

        let clamped = AudioParam::new(-1.0, 0.0, 1.0);
        assert_eq!(clamped.value(), 0.0);
    }

    #[test]
    fn test_past_events_apply_immediately() {
        let mut param = AudioParam::new(1.0, 0.0, 1.0);
        param.schedule(AutomationEvent::SetValue { value: 0.3, time: 0.0 });
        assert_eq!(param.tick(5.0, DT), 0.3);
    }

    #[test]
    fn test_ramp_after_target_starts_from_current_value() {
        let mut param = AudioParam::new(0.0, 0.0, 1.0);
        param.schedule(AutomationEvent::SetValue { value: 0.4, time: 0.0 });
        param.tick(0.0, DT);
        param.schedule(AutomationEvent::SetTarget {
            target: 0.4,
            start_time: 0.0,
            time_constant: 0.1,
        });
        param.schedule(AutomationEvent::LinearRamp { value: 1.0, end_time: 0.2 });

        let values = run(&mut param, 0.1, 0.1);
        assert_relative_eq!(values[0], 0.4, epsilon = 1e-6);
        assert!(values.windows(2).all(|w| w[1] >= w[0]));
        assert_relative_eq!(param.tick(0.2, DT), 1.0);
    }
}
