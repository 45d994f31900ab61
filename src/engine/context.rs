//! Audio Context
//!
//! Process-wide rendering state. The application creates exactly one
//! context at startup with [`AudioContext::new`], passes the returned
//! `Arc<AudioContext>` into every playback session, and hands the
//! [`Renderer`] to whatever drives rendering. [`AudioContext::close`] tears
//! everything down at shutdown.
//!
//! Control code talks to the renderer only through a lock-free command
//! queue; the renderer drains it between quanta and never blocks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::engine::param::{AudioParam, AutomationEvent};

/// Identity of one playback session's node set
pub type SessionId = Uuid;

/// Automatable parameters of a session's node set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// Overall output gain of the session
    Master,
    /// Unprocessed path level
    Dry,
    /// Processed path level
    Wet,
    /// Momentary attenuation gate on the processed path
    Dropout,
    /// Delay-line feedback gain
    Feedback,
    /// Noise bed level
    Noise,
}

/// A set of render nodes owned by one session
///
/// Implementors are built on the control side, moved to the render thread
/// with [`GraphCommand::Insert`], and dropped there on removal.
pub trait RenderVoice: Send {
    /// Session that owns this node set
    fn session_id(&self) -> SessionId;

    /// Mix this voice into `out`
    ///
    /// `start_time` is the context time of `out[0]` and `dt` the sample period.
    fn render(&mut self, out: &mut [f32], start_time: f64, dt: f64);

    fn param(&self, kind: ParamKind) -> Option<&AudioParam>;

    fn param_mut(&mut self, kind: ParamKind) -> Option<&mut AudioParam>;
}

/// Control to render messages
pub enum GraphCommand {
    /// Start rendering a session's nodes
    Insert(Box<dyn RenderVoice>),
    /// Schedule automation on one param of a session
    Automate {
        session: SessionId,
        param: ParamKind,
        event: AutomationEvent,
    },
    /// Drop a session's nodes
    Remove(SessionId),
    /// Drop everything and stop rendering
    Shutdown,
}

impl std::fmt::Debug for GraphCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphCommand::Insert(voice) => write!(f, "Insert({})", voice.session_id()),
            GraphCommand::Automate {
                session,
                param,
                event,
            } => write!(f, "Automate({}, {:?}, {:?})", session, param, event),
            GraphCommand::Remove(id) => write!(f, "Remove({})", id),
            GraphCommand::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// State visible to both sides
#[derive(Debug)]
struct ContextShared {
    sample_rate: u32,
    render_quantum: usize,
    frames_rendered: AtomicU64,
    closed: AtomicBool,
}

/// Control-side handle to the rendering engine
#[derive(Debug)]
pub struct AudioContext {
    shared: Arc<ContextShared>,
    commands: Sender<GraphCommand>,
}

impl AudioContext {
    /// Create the context and its renderer
    pub fn new(config: &EngineConfig) -> (Arc<AudioContext>, Renderer) {
        let shared = Arc::new(ContextShared {
            sample_rate: config.sample_rate.max(1),
            render_quantum: config.render_quantum.max(1),
            frames_rendered: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });
        let (tx, rx) = unbounded();

        log::info!(
            "audio context created: {} Hz, quantum {}",
            shared.sample_rate,
            shared.render_quantum
        );

        let context = Arc::new(AudioContext {
            shared: Arc::clone(&shared),
            commands: tx,
        });
        let renderer = Renderer {
            shared,
            commands: rx,
            voices: Vec::new(),
            running: true,
        };
        (context, renderer)
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate
    }

    pub fn render_quantum(&self) -> usize {
        self.shared.render_quantum
    }

    /// Frames rendered since the context was created
    pub fn frames_rendered(&self) -> u64 {
        self.shared.frames_rendered.load(Ordering::Acquire)
    }

    /// Seconds of audio rendered since the context was created
    pub fn current_time(&self) -> f64 {
        self.frames_rendered() as f64 / self.shared.sample_rate as f64
    }

    /// Queue a command for the renderer without blocking
    ///
    /// Returns `false` when the context is closed or the renderer is gone.
    pub fn send(&self, command: GraphCommand) -> bool {
        if self.is_closed() {
            log::debug!("context closed, dropping {:?}", command);
            return false;
        }
        match self.commands.send(command) {
            Ok(()) => true,
            Err(err) => {
                log::debug!("renderer gone, dropping {:?}", err.into_inner());
                false
            }
        }
    }

    /// Shut the renderer down; later commands are dropped
    pub fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            log::info!("audio context closing at {:.3}s", self.current_time());
            let _ = self.commands.send(GraphCommand::Shutdown);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

/// Render-side half of the context
pub struct Renderer {
    shared: Arc<ContextShared>,
    commands: Receiver<GraphCommand>,
    voices: Vec<Box<dyn RenderVoice>>,
    running: bool,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("voices", &self.voices.len())
            .field("running", &self.running)
            .finish()
    }
}

impl Renderer {
    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate
    }

    pub fn render_quantum(&self) -> usize {
        self.shared.render_quantum
    }

    /// Number of sessions currently rendering
    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Whether the renderer still accepts work
    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        self.running
    }

    /// Current value of a session's param
    pub fn param_value(&self, session: SessionId, kind: ParamKind) -> Option<f32> {
        self.voices
            .iter()
            .find(|v| v.session_id() == session)
            .and_then(|v| v.param(kind))
            .map(AudioParam::value)
    }

    /// Render `out.len()` frames, applying queued commands at each quantum
    ///
    /// Returns `false` once the context has shut down; `out` is then silent.
    pub fn render(&mut self, out: &mut [f32]) -> bool {
        out.fill(0.0);
        let sample_rate = self.shared.sample_rate as f64;
        let dt = 1.0 / sample_rate;

        for block in out.chunks_mut(self.shared.render_quantum) {
            self.drain_commands();
            if !self.running {
                return false;
            }

            let frames = self.shared.frames_rendered.load(Ordering::Relaxed);
            let start_time = frames as f64 / sample_rate;
            for voice in self.voices.iter_mut() {
                voice.render(block, start_time, dt);
            }
            self.shared
                .frames_rendered
                .store(frames + block.len() as u64, Ordering::Release);
        }

        self.running
    }

    fn drain_commands(&mut self) {
        loop {
            match self.commands.try_recv() {
                Ok(GraphCommand::Insert(voice)) => {
                    let id = voice.session_id();
                    self.voices.retain(|v| v.session_id() != id);
                    self.voices.push(voice);
                }
                Ok(GraphCommand::Automate {
                    session,
                    param,
                    event,
                }) => {
                    if let Some(target) = self
                        .voices
                        .iter_mut()
                        .find(|v| v.session_id() == session)
                        .and_then(|v| v.param_mut(param))
                    {
                        target.schedule(event);
                    }
                }
                Ok(GraphCommand::Remove(session)) => {
                    self.voices.retain(|v| v.session_id() != session);
                }
                Ok(GraphCommand::Shutdown) | Err(TryRecvError::Disconnected) => {
                    self.voices.clear();
                    self.running = false;
                    return;
                }
                Err(TryRecvError::Empty) => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Constant DC voice with a single gain param
    struct DcVoice {
        id: SessionId,
        level: f32,
        gain: AudioParam,
    }

    impl RenderVoice for DcVoice {
        fn session_id(&self) -> SessionId {
            self.id
        }

        fn render(&mut self, out: &mut [f32], start_time: f64, dt: f64) {
            for (i, sample) in out.iter_mut().enumerate() {
                *sample += self.level * self.gain.tick(start_time + i as f64 * dt, dt);
            }
        }

        fn param(&self, kind: ParamKind) -> Option<&AudioParam> {
            (kind == ParamKind::Master).then_some(&self.gain)
        }

        fn param_mut(&mut self, kind: ParamKind) -> Option<&mut AudioParam> {
            (kind == ParamKind::Master).then_some(&mut self.gain)
        }
    }

    fn dc(level: f32) -> (SessionId, Box<dyn RenderVoice>) {
        let id = Uuid::new_v4();
        let voice = DcVoice {
            id,
            level,
            gain: AudioParam::new(1.0, 0.0, 1.0),
        };
        (id, Box::new(voice))
    }

    fn config() -> EngineConfig {
        EngineConfig {
            sample_rate: 1000,
            render_quantum: 10,
            tick_rate_hz: 50.0,
        }
    }

    #[test]
    fn test_clock_advances_with_rendering() {
        let (context, mut renderer) = AudioContext::new(&config());
        assert_eq!(context.current_time(), 0.0);

        let mut block = vec![0.0; 250];
        assert!(renderer.render(&mut block));
        assert_eq!(context.frames_rendered(), 250);
        assert!((context.current_time() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_voices_are_summed() {
        let (context, mut renderer) = AudioContext::new(&config());
        let (_, a) = dc(0.25);
        let (_, b) = dc(0.5);
        context.send(GraphCommand::Insert(a));
        context.send(GraphCommand::Insert(b));

        let mut block = vec![0.0; 20];
        renderer.render(&mut block);
        assert_eq!(renderer.voice_count(), 2);
        assert!(block.iter().all(|&s| (s - 0.75).abs() < 1e-6));
    }

    #[test]
    fn test_automation_routed_to_session() {
        let (context, mut renderer) = AudioContext::new(&config());
        let (id, voice) = dc(1.0);
        context.send(GraphCommand::Insert(voice));
        context.send(GraphCommand::Automate {
            session: id,
            param: ParamKind::Master,
            event: AutomationEvent::SetValue { value: 0.5, time: 0.0 },
        });

        let mut block = vec![0.0; 10];
        renderer.render(&mut block);
        assert_eq!(renderer.param_value(id, ParamKind::Master), Some(0.5));
        assert_eq!(block[0], 0.5);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (context, mut renderer) = AudioContext::new(&config());
        let (id, voice) = dc(1.0);
        context.send(GraphCommand::Insert(voice));
        context.send(GraphCommand::Remove(id));
        context.send(GraphCommand::Remove(id));

        let mut block = vec![0.0; 10];
        assert!(renderer.render(&mut block));
        assert_eq!(renderer.voice_count(), 0);
        assert!(block.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_close_stops_renderer_and_drops_commands() {
        let (context, mut renderer) = AudioContext::new(&config());
        let (_, voice) = dc(1.0);
        context.send(GraphCommand::Insert(voice));
        context.close();
        context.close();

        let (_, late) = dc(1.0);
        assert!(!context.send(GraphCommand::Insert(late)));

        let mut block = vec![0.0; 10];
        assert!(!renderer.render(&mut block));
        assert!(!renderer.is_running());
        assert_eq!(renderer.voice_count(), 0);
    }

    #[test]
    fn test_commands_applied_at_quantum_boundaries() {
        let (context, mut renderer) = AudioContext::new(&config());
        let (id, voice) = dc(1.0);
        context.send(GraphCommand::Insert(voice));

        let mut block = vec![0.0; 10];
        renderer.render(&mut block);

        context.send(GraphCommand::Remove(id));
        let mut next = vec![0.0; 10];
        renderer.render(&mut next);
        assert!(block.iter().all(|&s| s == 1.0));
        assert!(next.iter().all(|&s| s == 0.0));
    }
}
