//! Playback Controller
//!
//! Owns at most one running session: decodes the recording, connects a
//! [`SignalGraph`], fades the output in, and drives the graph from a
//! repeating control tick until the source runs out or the safety bound
//! is crossed.
//!
//! Callbacks are always invoked with the controller's lock released, so
//! they may call back into [`PlaybackController::stop`] or
//! [`PlaybackController::play`]. They are serialized against each other:
//! once `on_ended` has run for a session, its `on_progress` never runs again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex};

use crate::config::PhonelineConfig;
use crate::dsp::dropout::DropoutSimulator;
use crate::engine::context::{AudioContext, ParamKind, SessionId};
use crate::engine::io::decode_audio;
use crate::engine::param::AutomationEvent;
use crate::engine::scheduler::{Scheduler, TaskHandle, TickFlow};
use crate::error::{PhonelineError, Result};
use crate::playback::graph::{OutputBus, SignalGraph, SourceHandle, SourceNode};
use crate::playback::state::{PlaybackState, ProgressClock};

/// Builds the dropout process for each new session
pub type DropoutFactory = Box<dyn Fn() -> DropoutSimulator + Send + Sync>;

/// Caller-supplied notifications
pub struct PlaybackCallbacks {
    on_progress: Box<dyn Fn(f64) + Send + Sync>,
    on_ended: Box<dyn Fn() + Send + Sync>,
}

impl PlaybackCallbacks {
    /// # Arguments
    /// * `on_progress` - Called once per tick with elapsed seconds
    /// * `on_ended` - Called exactly once when a session stops
    pub fn new<P, E>(on_progress: P, on_ended: E) -> Self
    where
        P: Fn(f64) + Send + Sync + 'static,
        E: Fn() + Send + Sync + 'static,
    {
        Self {
            on_progress: Box::new(on_progress),
            on_ended: Box::new(on_ended),
        }
    }
}

impl Default for PlaybackCallbacks {
    fn default() -> Self {
        Self::new(|_| {}, || {})
    }
}

/// Everything a running session owns
struct Session {
    graph: SignalGraph,
    source: SourceHandle,
    clock: ProgressClock,
    ticker: TaskHandle,
    stopped: Arc<AtomicBool>,
}

impl Session {
    fn id(&self) -> SessionId {
        self.graph.session_id()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.ticker.cancel();
    }
}

struct Inner {
    state: PlaybackState,
    session: Option<Session>,
    dropout_factory: DropoutFactory,
}

struct Shared {
    context: Arc<AudioContext>,
    scheduler: Arc<dyn Scheduler>,
    config: PhonelineConfig,
    callbacks: PlaybackCallbacks,
    /// Held while a callback runs; reentrant so callbacks can stop or replay
    callback_gate: ReentrantMutex<()>,
    inner: Mutex<Inner>,
}

/// Drives playback sessions against a shared [`AudioContext`]
#[derive(Clone)]
pub struct PlaybackController {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("state", &self.state())
            .field("session", &self.session_id())
            .finish()
    }
}

impl PlaybackController {
    pub fn new(
        context: Arc<AudioContext>,
        scheduler: Arc<dyn Scheduler>,
        config: PhonelineConfig,
        callbacks: PlaybackCallbacks,
    ) -> Self {
        let inner = Inner {
            state: PlaybackState::Idle,
            session: None,
            dropout_factory: Box::new(DropoutSimulator::from_entropy),
        };
        Self {
            shared: Arc::new(Shared {
                context,
                scheduler,
                config,
                callbacks,
                callback_gate: ReentrantMutex::new(()),
                inner: Mutex::new(inner),
            }),
        }
    }

    /// Replace how each session's dropout process is built
    pub fn with_dropout_factory<F>(self, factory: F) -> Self
    where
        F: Fn() -> DropoutSimulator + Send + Sync + 'static,
    {
        self.shared.inner.lock().dropout_factory = Box::new(factory);
        self
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.inner.lock().state
    }

    pub fn is_playing(&self) -> bool {
        self.state().is_playing()
    }

    /// Id of the running session, if any
    pub fn session_id(&self) -> Option<SessionId> {
        self.shared.inner.lock().session.as_ref().map(Session::id)
    }

    /// Decode `encoded` and start a new session, stopping any running one
    ///
    /// # Errors
    /// * `Config` - the configuration cannot drive a session; nothing changes
    /// * `DecodeFailure` - the bytes are not playable audio; state becomes `Stopped`
    /// * `GraphState` - the context is closed or a concurrent stop won the race
    pub fn play(&self, encoded: &[u8]) -> Result<SessionId> {
        let shared = &self.shared;
        shared.config.validate()?;

        let replaced = {
            let mut inner = shared.inner.lock();
            let replaced = Self::stop_locked(&mut inner);
            inner.state = PlaybackState::Decoding;
            replaced
        };
        if replaced {
            Self::notify_ended(shared);
        }

        let decoded = decode_audio(encoded, shared.context.sample_rate());

        let mut inner = shared.inner.lock();
        if inner.state != PlaybackState::Decoding {
            return Err(PhonelineError::GraphState {
                reason: format!("playback became {} while decoding", inner.state),
            });
        }
        let buffer = match decoded {
            Ok(buffer) => buffer,
            Err(err) => {
                log::warn!("decode failed: {}", err);
                inner.state = PlaybackState::Stopped;
                return Err(err);
            }
        };

        let dropout = (inner.dropout_factory)();
        let mut graph = SignalGraph::new(
            Arc::clone(&shared.context),
            shared.config.degrade.clone(),
            dropout,
        );
        let (source, handle) = SourceNode::new(&buffer);
        let started = graph
            .connect(source, OutputBus::silent())
            .and_then(|()| Self::fade_in(shared, &graph));
        if let Err(err) = started {
            inner.state = PlaybackState::Stopped;
            return Err(err);
        }

        let id = graph.session_id();
        let now = shared.context.current_time();
        let weak = Arc::downgrade(shared);
        let interval = Duration::from_secs_f64(shared.config.engine.tick_interval_secs());
        let ticker = shared.scheduler.schedule_repeating(
            interval,
            Box::new(move || Self::tick(&weak, id)),
        );

        inner.session = Some(Session {
            graph,
            source: handle,
            clock: ProgressClock::start(now, shared.config.playback.total_duration_secs),
            ticker,
            stopped: Arc::new(AtomicBool::new(false)),
        });
        inner.state = PlaybackState::Playing;
        log::info!(
            "session {} playing {:.2}s of audio (peak {:.1} dBFS, rms {:.1} dBFS)",
            id,
            buffer.duration_secs(),
            buffer.peak_db(),
            buffer.rms_db()
        );
        Ok(id)
    }

    /// Stop the running session
    ///
    /// Returns `true` if a session was stopped; `on_ended` fires only then.
    pub fn stop(&self) -> bool {
        let stopped = Self::stop_locked(&mut self.shared.inner.lock());
        if stopped {
            Self::notify_ended(&self.shared);
        }
        stopped
    }

    fn notify_ended(shared: &Shared) {
        let _gate = shared.callback_gate.lock();
        (shared.callbacks.on_ended)();
    }

    fn fade_in(shared: &Shared, graph: &SignalGraph) -> Result<()> {
        let now = shared.context.current_time();
        graph.automate(ParamKind::Master, AutomationEvent::SetValue { value: 0.0, time: now })?;
        graph.automate(
            ParamKind::Master,
            AutomationEvent::LinearRamp {
                value: 1.0,
                end_time: now + shared.config.playback.fade_in_secs,
            },
        )
    }

    /// Tear down the session, if any
    fn stop_locked(inner: &mut Inner) -> bool {
        match inner.session.take() {
            Some(mut session) => {
                session.stopped.store(true, Ordering::Release);
                session.ticker.cancel();
                session.graph.disconnect();
                inner.state = PlaybackState::Stopped;
                log::info!("session {} stopped", session.id());
                true
            }
            None => {
                if inner.state == PlaybackState::Decoding {
                    inner.state = PlaybackState::Stopped;
                }
                false
            }
        }
    }

    fn tick(weak: &Weak<Shared>, id: SessionId) -> TickFlow {
        let Some(shared) = weak.upgrade() else {
            return TickFlow::Stop;
        };

        let (elapsed, stopped) = {
            let mut inner = shared.inner.lock();
            match inner.session.as_mut() {
                Some(session) if session.id() == id => (
                    session.clock.elapsed(shared.context.current_time()),
                    Arc::clone(&session.stopped),
                ),
                _ => return TickFlow::Stop,
            }
        };

        {
            let _gate = shared.callback_gate.lock();
            // A stop that landed since the lock was released has already ended the session
            if stopped.load(Ordering::Acquire) {
                return TickFlow::Stop;
            }
            (shared.callbacks.on_progress)(elapsed);
        }

        let ended = {
            let mut inner = shared.inner.lock();
            let session = match inner.session.as_mut() {
                Some(session) if session.id() == id => session,
                // Stopped from inside on_progress
                _ => return TickFlow::Stop,
            };

            session.graph.update(session.clock.progress());

            let natural_end = session.source.has_ended();
            let over_bound = elapsed > shared.config.playback.safety_bound_secs();
            let context_gone = shared.context.is_closed();
            if over_bound && !natural_end {
                log::warn!(
                    "session {} forced to stop at {:.2}s without reaching the end of its source",
                    id,
                    elapsed
                );
            }
            if context_gone {
                log::warn!("audio context closed under session {}", id);
            }

            (natural_end || over_bound || context_gone) && Self::stop_locked(&mut inner)
        };

        if ended {
            Self::notify_ended(&shared);
            TickFlow::Stop
        } else {
            TickFlow::Continue
        }
    }
}
