//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::bounded;
use log::{info, warn};

use crate::capture::{CaptureSource, FileCapture};
use crate::config::PhonelineConfig;
use crate::dsp::curve::curve;
use crate::engine::context::AudioContext;
use crate::engine::driver::{AudioSink, NullSink, RealtimeDriver, WavSink};
use crate::engine::scheduler::ThreadScheduler;
use crate::error::Result;
use crate::playback::{PlaybackCallbacks, PlaybackController};

/// Capture a recording from `input` and play it through the engine in real time.
pub fn play(input: &Path, out: Option<&Path>, config: &PhonelineConfig) -> Result<()> {
    let recording = capture_file(input, config)?;
    play_realtime(&recording, out, config)
}

/// Print the degradation curve table.
pub fn print_curve(steps: usize) -> Result<()> {
    let steps = steps.max(1);
    println!(
        "{:>8} {:>8} {:>8} {:>8} {:>8} {:>8}",
        "progress", "wet", "dry", "noise", "feedback", "dropout"
    );
    for i in 0..=steps {
        let p = i as f64 / steps as f64;
        let point = curve(p);
        println!(
            "{:>8.3} {:>8.4} {:>8.4} {:>8.4} {:>8.4} {:>8.5}",
            p, point.wet, point.dry, point.noise, point.feedback, point.dropout_probability
        );
    }
    Ok(())
}

/// Print the effective configuration.
pub fn print_config(config: &PhonelineConfig) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

fn capture_file(input: &Path, config: &PhonelineConfig) -> Result<Vec<u8>> {
    let source = FileCapture::new(input, config.engine.sample_rate, config.capture.clone());
    let mut session = source.start_capture()?;

    let patience = config.capture.max_duration_secs + config.capture.finalize_timeout_secs;
    let deadline = Instant::now() + Duration::from_secs_f64(patience);
    while !session.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }

    let bytes = session.stop()?;
    info!("captured {} bytes from {}", bytes.len(), input.display());
    Ok(bytes)
}

/// Progress callback printing whole seconds remaining
fn countdown(total_secs: f64) -> impl Fn(f64) + Send + Sync + 'static {
    let last_shown = AtomicU64::new(u64::MAX);
    move |elapsed| {
        let remaining = (total_secs - elapsed).max(0.0).ceil() as u64;
        if last_shown.swap(remaining, Ordering::Relaxed) != remaining {
            print!("\r{:>3}s remaining", remaining);
            let _ = std::io::stdout().flush();
        }
    }
}

fn play_realtime(recording: &[u8], out: Option<&Path>, config: &PhonelineConfig) -> Result<()> {
    let (context, renderer) = AudioContext::new(&config.engine);
    let sink: Box<dyn AudioSink> = match out {
        Some(path) => Box::new(WavSink::create(path, context.sample_rate())?),
        None => Box::new(NullSink),
    };
    let driver = RealtimeDriver::spawn(Arc::clone(&context), renderer, sink)?;

    let (ended_tx, ended_rx) = bounded(1);
    let controller = PlaybackController::new(
        Arc::clone(&context),
        Arc::new(ThreadScheduler),
        config.clone(),
        PlaybackCallbacks::new(countdown(config.playback.total_duration_secs), move || {
            let _ = ended_tx.try_send(());
        }),
    );
    controller.play(recording)?;

    let patience = Duration::from_secs_f64(config.playback.safety_bound_secs() + 1.0);
    if ended_rx.recv_timeout(patience).is_err() {
        warn!("playback never reported its end, stopping");
        controller.stop();
    }
    println!();

    driver.join()?;
    if let Some(path) = out {
        println!("Degraded output written: {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::io::{decode_audio, generate_test_tone, write_wav};
    use tempfile::tempdir;

    fn small_config() -> PhonelineConfig {
        let mut config = PhonelineConfig::default();
        config.engine.sample_rate = 8000;
        config
    }

    #[test]
    fn test_play_writes_degraded_file() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("voice.wav");
        let output = dir.path().join("degraded.wav");
        let tone = generate_test_tone(440.0, 0.3, 8000);
        write_wav(&input, tone.samples(), 8000).unwrap();

        play(&input, Some(&output), &small_config()).unwrap();

        let bytes = std::fs::read(&output).unwrap();
        let degraded = decode_audio(&bytes, 8000).unwrap();
        assert!(degraded.duration_secs() >= 0.3);
        assert!(degraded.duration_secs() < 5.0);
        assert!(degraded.is_finite());
    }

    #[test]
    fn test_play_missing_input_fails() {
        let err = play(Path::new("/nonexistent.wav"), None, &small_config()).unwrap_err();
        assert_eq!(err.error_code(), "DEVICE_UNAVAILABLE");
    }

    #[test]
    fn test_print_commands() {
        print_curve(4).unwrap();
        print_config(&PhonelineConfig::default()).unwrap();
    }
}
