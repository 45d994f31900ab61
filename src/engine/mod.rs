//! Audio Engine Module
//!
//! Rendering core shared by every playback session:
//! - Sample buffers and WAV I/O
//! - Parameter automation timelines
//! - The audio context, its renderer and the drivers that run it
//! - Periodic scheduling for the control loop

pub mod buffer;
pub mod context;
pub mod driver;
pub mod io;
pub mod param;
pub mod scheduler;

pub use buffer::SampleBuffer;
pub use context::{AudioContext, GraphCommand, ParamKind, RenderVoice, Renderer, SessionId};
pub use driver::{AudioSink, MemorySink, NullSink, OfflineDriver, RealtimeDriver, WavSink};
pub use io::{decode_audio, encode_wav, generate_test_tone};
pub use param::{AudioParam, AutomationEvent};
pub use scheduler::{ManualScheduler, Scheduler, TaskHandle, ThreadScheduler, TickFlow};
