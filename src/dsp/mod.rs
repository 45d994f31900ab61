//! DSP Building Blocks
//!
//! The degradation curve, the dropout process, and the per-sample
//! processors the render graph is assembled from.

pub mod biquad;
pub mod curve;
pub mod delay;
pub mod dropout;
pub mod noise;

pub use biquad::{Biquad, BiquadCoeffs};
pub use curve::{curve, CurvePoint};
pub use delay::FeedbackDelay;
pub use dropout::{DropoutEvent, DropoutSimulator, RandomSource, SequenceRandom};
pub use noise::NoiseLoop;
