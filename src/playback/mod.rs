//! Playback
//!
//! Session lifecycle on top of the engine: the degradation topology and
//! the controller that drives it over time.

pub mod controller;
pub mod graph;
pub mod state;

pub use controller::{DropoutFactory, PlaybackCallbacks, PlaybackController};
pub use graph::{DegradeVoice, OutputBus, SignalGraph, SourceHandle, SourceNode};
pub use state::{PlaybackState, ProgressClock};
