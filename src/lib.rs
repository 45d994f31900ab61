//! Phoneline - Failing Phone Line Playback
//!
//! Plays a short recording back through a real-time effect that degrades
//! it over the course of playback: rising line noise, bandpass coloration,
//! growing echo feedback and random volume dropouts, all driven by how far
//! into the session the listener is.
//!
//! # Architecture
//!
//! - [`engine`]: the process-wide [`engine::AudioContext`], its renderer,
//!   parameter automation, drivers and the periodic scheduler
//! - [`dsp`]: the degradation curve, the dropout process and the
//!   per-sample processors
//! - [`playback`]: the per-session signal graph and the controller that
//!   drives it
//! - [`capture`]: turns recorded samples into the bytes playback consumes

pub mod capture;
pub mod cli;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod playback;

pub use config::{PhonelineConfig, TOTAL_DURATION_SECS};
pub use error::{PhonelineError, Result};
