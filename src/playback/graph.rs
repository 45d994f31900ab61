//! Signal Graph
//!
//! One session's degradation topology. The render half ([`DegradeVoice`])
//! is built here, moved into the renderer on [`SignalGraph::connect`] and
//! dropped there on [`SignalGraph::disconnect`]. The control half keeps
//! nothing but the session id and talks to its nodes through automation.
//!
//! ```text
//! source ─┬─ dry ──────────────────────────────────────────┐
//!         ├─ wet ─ dropout ─ bandpass ─ delay ─┬───────────┤
//!         │                          ▲        │           ├─ master ─ out
//!         │                          └ fb ────┘           │
//! noise ──┴─ noise ────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::config::DegradeConfig;
use crate::dsp::biquad::Biquad;
use crate::dsp::curve::{clamp_progress, curve, CurvePoint};
use crate::dsp::delay::{FeedbackDelay, MAX_FEEDBACK};
use crate::dsp::dropout::{DropoutEvent, DropoutSimulator};
use crate::dsp::noise::NoiseLoop;
use crate::engine::buffer::SampleBuffer;
use crate::engine::context::{AudioContext, GraphCommand, ParamKind, RenderVoice, SessionId};
use crate::engine::param::{AudioParam, AutomationEvent};
use crate::error::{PhonelineError, Result};

// ============================================================================
// Source and output
// ============================================================================

/// One-shot player over a decoded buffer
pub struct SourceNode {
    samples: Arc<[f32]>,
    position: usize,
    ended: Arc<AtomicBool>,
}

/// Control-side view of a [`SourceNode`]
#[derive(Debug, Clone)]
pub struct SourceHandle {
    ended: Arc<AtomicBool>,
    duration_secs: f64,
}

impl SourceNode {
    pub fn new(buffer: &SampleBuffer) -> (Self, SourceHandle) {
        let ended = Arc::new(AtomicBool::new(buffer.is_empty()));
        let handle = SourceHandle {
            ended: Arc::clone(&ended),
            duration_secs: buffer.duration_secs(),
        };
        let node = Self {
            samples: buffer.shared_samples(),
            position: 0,
            ended,
        };
        (node, handle)
    }

    #[inline]
    fn next_sample(&mut self) -> f32 {
        match self.samples.get(self.position) {
            Some(&sample) => {
                self.position += 1;
                if self.position == self.samples.len() {
                    self.ended.store(true, Ordering::Release);
                }
                sample
            }
            None => 0.0,
        }
    }
}

impl SourceHandle {
    /// Whether the renderer has played the last sample
    pub fn has_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }
}

/// Session output stage carrying the master gain
#[derive(Debug, Clone)]
pub struct OutputBus {
    master: AudioParam,
}

impl OutputBus {
    pub fn new(gain: f32) -> Self {
        Self {
            master: AudioParam::new(gain, 0.0, 1.0),
        }
    }

    /// Output that starts muted, for fading in
    pub fn silent() -> Self {
        Self::new(0.0)
    }
}

impl Default for OutputBus {
    fn default() -> Self {
        Self::new(1.0)
    }
}

// ============================================================================
// Render side
// ============================================================================

/// Render-thread node set of one session
pub struct DegradeVoice {
    session: SessionId,
    source: SourceNode,
    master: AudioParam,
    dry: AudioParam,
    wet: AudioParam,
    dropout: AudioParam,
    feedback: AudioParam,
    noise_gain: AudioParam,
    bandpass: Biquad,
    delay: FeedbackDelay,
    noise: NoiseLoop,
}

impl DegradeVoice {
    fn new(
        session: SessionId,
        source: SourceNode,
        output: OutputBus,
        config: &DegradeConfig,
        sample_rate: u32,
    ) -> Self {
        let initial = curve(0.0);
        let noise_len = (config.noise_buffer_secs * sample_rate as f64).round() as usize;

        Self {
            session,
            source,
            master: output.master,
            dry: AudioParam::new(initial.dry as f32, 0.0, 1.0),
            wet: AudioParam::new(initial.wet as f32, 0.0, 1.0),
            dropout: AudioParam::new(1.0, 0.0, 1.0),
            feedback: AudioParam::new(initial.feedback as f32, 0.0, MAX_FEEDBACK),
            noise_gain: AudioParam::new(initial.noise as f32, 0.0, 1.0),
            bandpass: Biquad::bandpass(
                sample_rate as f64,
                config.filter_center_hz,
                config.filter_q,
            ),
            delay: FeedbackDelay::new(sample_rate, config.delay_time_secs, config.max_delay_secs),
            noise: NoiseLoop::generate(noise_len.max(1), config.noise_seed),
        }
    }
}

impl RenderVoice for DegradeVoice {
    fn session_id(&self) -> SessionId {
        self.session
    }

    fn render(&mut self, out: &mut [f32], start_time: f64, dt: f64) {
        for (i, sample) in out.iter_mut().enumerate() {
            let t = start_time + i as f64 * dt;
            let x = self.source.next_sample();

            let dry = x * self.dry.tick(t, dt);
            let gated = x * self.wet.tick(t, dt) * self.dropout.tick(t, dt);
            let echo = self
                .delay
                .process(self.bandpass.process(gated), self.feedback.tick(t, dt));
            let hiss = self.noise.next_sample() * self.noise_gain.tick(t, dt);

            *sample += (dry + echo + hiss) * self.master.tick(t, dt);
        }
    }

    fn param(&self, kind: ParamKind) -> Option<&AudioParam> {
        Some(match kind {
            ParamKind::Master => &self.master,
            ParamKind::Dry => &self.dry,
            ParamKind::Wet => &self.wet,
            ParamKind::Dropout => &self.dropout,
            ParamKind::Feedback => &self.feedback,
            ParamKind::Noise => &self.noise_gain,
        })
    }

    fn param_mut(&mut self, kind: ParamKind) -> Option<&mut AudioParam> {
        Some(match kind {
            ParamKind::Master => &mut self.master,
            ParamKind::Dry => &mut self.dry,
            ParamKind::Wet => &mut self.wet,
            ParamKind::Dropout => &mut self.dropout,
            ParamKind::Feedback => &mut self.feedback,
            ParamKind::Noise => &mut self.noise_gain,
        })
    }
}

// ============================================================================
// Control side
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wiring {
    Built,
    Connected,
    Disconnected,
}

/// Control handle for one session's topology
pub struct SignalGraph {
    context: Arc<AudioContext>,
    config: DegradeConfig,
    session: SessionId,
    dropout: DropoutSimulator,
    wiring: Wiring,
    targets: Option<CurvePoint>,
}

impl std::fmt::Debug for SignalGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalGraph")
            .field("session", &self.session)
            .field("wiring", &self.wiring)
            .field("targets", &self.targets)
            .finish()
    }
}

impl SignalGraph {
    pub fn new(context: Arc<AudioContext>, config: DegradeConfig, dropout: DropoutSimulator) -> Self {
        Self {
            context,
            config,
            session: Uuid::new_v4(),
            dropout,
            wiring: Wiring::Built,
            targets: None,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session
    }

    pub fn is_connected(&self) -> bool {
        self.wiring == Wiring::Connected
    }

    /// Last curve point applied by [`SignalGraph::update`]
    pub fn targets(&self) -> Option<CurvePoint> {
        self.targets
    }

    pub fn dropout(&self) -> &DropoutSimulator {
        &self.dropout
    }

    /// Wire the topology between `source` and `output` and start rendering
    ///
    /// # Errors
    /// * `GraphState` - already connected or torn down, or the context is closed
    pub fn connect(&mut self, source: SourceNode, output: OutputBus) -> Result<()> {
        if self.wiring != Wiring::Built {
            return Err(PhonelineError::GraphState {
                reason: format!("session {} cannot be connected twice", self.session),
            });
        }

        let voice = DegradeVoice::new(
            self.session,
            source,
            output,
            &self.config,
            self.context.sample_rate(),
        );
        if !self.context.send(GraphCommand::Insert(Box::new(voice))) {
            self.wiring = Wiring::Disconnected;
            return Err(PhonelineError::GraphState {
                reason: "audio context is closed".to_string(),
            });
        }

        self.wiring = Wiring::Connected;
        log::debug!("session {} connected", self.session);
        Ok(())
    }

    /// Move every parameter toward the curve at `progress` and run one
    /// dropout tick
    ///
    /// Does nothing unless connected.
    pub fn update(&mut self, progress: f64) -> Option<DropoutEvent> {
        if !self.is_connected() {
            log::debug!("update on unconnected session {} ignored", self.session);
            return None;
        }

        let p = clamp_progress(progress);
        let point = curve(p);
        let now = self.context.current_time();
        let tau = self.config.smoothing_time_constant_secs;

        for (kind, target) in [
            (ParamKind::Dry, point.dry),
            (ParamKind::Wet, point.wet),
            (ParamKind::Noise, point.noise),
            (ParamKind::Feedback, point.feedback),
        ] {
            self.send_automation(
                kind,
                AutomationEvent::SetTarget {
                    target: target as f32,
                    start_time: now,
                    time_constant: tau,
                },
            );
        }
        self.targets = Some(point);

        let event = self.dropout.tick(p, now)?;
        self.apply_dropout(&event);
        Some(event)
    }

    /// Force a dropout of the given shape now
    pub fn trigger_dropout(&mut self, depth: f64, recovery_time_secs: f64) -> Option<DropoutEvent> {
        if !self.is_connected() {
            return None;
        }
        let now = self.context.current_time();
        let event = self
            .dropout
            .trigger(self.dropout.ticks(), now, depth, recovery_time_secs);
        self.apply_dropout(&event);
        Some(event)
    }

    /// Hard cut to the event's onset level, then a linear release to unity
    pub fn apply_dropout(&self, event: &DropoutEvent) {
        let at = event.triggered_at;
        log::debug!(
            "dropout at {:.3}s: depth {:.2}, recovery {:.3}s",
            at,
            event.depth,
            event.recovery_time_secs
        );
        self.send_automation(ParamKind::Dropout, AutomationEvent::CancelScheduled { time: at });
        self.send_automation(
            ParamKind::Dropout,
            AutomationEvent::SetValue {
                value: event.onset_volume as f32,
                time: at,
            },
        );
        self.send_automation(
            ParamKind::Dropout,
            AutomationEvent::LinearRamp {
                value: 1.0,
                end_time: event.recovered_at(),
            },
        );
    }

    /// Schedule automation on one of this session's params
    ///
    /// # Errors
    /// * `GraphState` - the graph is not connected
    pub fn automate(&self, kind: ParamKind, event: AutomationEvent) -> Result<()> {
        if !self.is_connected() {
            return Err(PhonelineError::GraphState {
                reason: format!("session {} is not connected", self.session),
            });
        }
        self.send_automation(kind, event);
        Ok(())
    }

    /// Tear the topology down; later calls do nothing
    pub fn disconnect(&mut self) {
        if self.wiring == Wiring::Connected {
            self.context.send(GraphCommand::Remove(self.session));
            log::debug!("session {} disconnected", self.session);
        }
        self.wiring = Wiring::Disconnected;
    }

    fn send_automation(&self, param: ParamKind, event: AutomationEvent) {
        self.context.send(GraphCommand::Automate {
            session: self.session,
            param,
            event,
        });
    }
}

impl Drop for SignalGraph {
    fn drop(&mut self) {
        self.disconnect();
    }
}
