//! Render Drivers and Sinks
//!
//! A driver owns the [`Renderer`] and decides when audio is produced:
//! [`RealtimeDriver`] renders on a dedicated thread paced to the wall
//! clock, [`OfflineDriver`] renders as fast as possible and interleaves
//! control ticks at the configured rate.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use hound::WavWriter;
use parking_lot::Mutex;

use crate::engine::context::{AudioContext, Renderer};
use crate::engine::io::{hound_to_io, pcm16_spec, to_i16};
use crate::engine::scheduler::ManualScheduler;
use crate::error::{PhonelineError, Result};

// ============================================================================
// Sinks
// ============================================================================

/// Destination for rendered blocks
pub trait AudioSink: Send {
    fn write(&mut self, block: &[f32]) -> Result<()>;

    /// Flush and close the sink
    fn finish(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Discards everything
#[derive(Debug, Default)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn write(&mut self, _block: &[f32]) -> Result<()> {
        Ok(())
    }
}

/// Collects rendered audio in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    samples: Arc<Mutex<Vec<f32>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the collected samples that outlives the sink
    pub fn samples(&self) -> Arc<Mutex<Vec<f32>>> {
        Arc::clone(&self.samples)
    }
}

impl AudioSink for MemorySink {
    fn write(&mut self, block: &[f32]) -> Result<()> {
        self.samples.lock().extend_from_slice(block);
        Ok(())
    }
}

/// Streams rendered audio to a 16-bit WAV file
pub struct WavSink {
    writer: WavWriter<BufWriter<File>>,
}

impl WavSink {
    pub fn create(path: &Path, sample_rate: u32) -> Result<Self> {
        let writer = WavWriter::create(path, pcm16_spec(sample_rate)).map_err(hound_to_io)?;
        Ok(Self { writer })
    }
}

impl AudioSink for WavSink {
    fn write(&mut self, block: &[f32]) -> Result<()> {
        for &sample in block {
            self.writer.write_sample(to_i16(sample)).map_err(hound_to_io)?;
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        self.writer.finalize().map_err(hound_to_io)
    }
}

// ============================================================================
// Realtime Driver
// ============================================================================

/// Renders on a dedicated thread at wall-clock pace
pub struct RealtimeDriver {
    context: Arc<AudioContext>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl RealtimeDriver {
    /// Move the renderer onto its own thread
    pub fn spawn(
        context: Arc<AudioContext>,
        mut renderer: Renderer,
        mut sink: Box<dyn AudioSink>,
    ) -> Result<Self> {
        let quantum = renderer.render_quantum();
        let period = Duration::from_secs_f64(quantum as f64 / renderer.sample_rate() as f64);

        let handle = thread::Builder::new()
            .name("phoneline-render".to_string())
            .spawn(move || {
                let mut block = vec![0.0_f32; quantum];
                let start = Instant::now();
                let mut quanta: u32 = 0;

                while renderer.render(&mut block) {
                    sink.write(&block)?;
                    quanta = quanta.saturating_add(1);
                    let deadline = start + period * quanta;
                    let now = Instant::now();
                    if deadline > now {
                        thread::sleep(deadline - now);
                    }
                }
                sink.finish()
            })?;

        Ok(Self {
            context,
            handle: Some(handle),
        })
    }

    /// Close the context and wait for the render thread to finish its sink
    pub fn join(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        self.context.close();
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| PhonelineError::GraphState {
                reason: "render thread panicked".to_string(),
            })?,
            None => Ok(()),
        }
    }
}

impl Drop for RealtimeDriver {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::warn!("render thread ended with error: {}", err);
        }
    }
}

// ============================================================================
// Offline Driver
// ============================================================================

/// Renders faster than real time, running control ticks in between
pub struct OfflineDriver {
    renderer: Renderer,
    scheduler: Arc<ManualScheduler>,
    tick_frames: usize,
}

impl OfflineDriver {
    /// # Arguments
    /// * `tick_interval_secs` - Render time between two control ticks
    pub fn new(renderer: Renderer, scheduler: Arc<ManualScheduler>, tick_interval_secs: f64) -> Self {
        let tick_frames = ((tick_interval_secs * renderer.sample_rate() as f64).round() as usize).max(1);
        Self {
            renderer,
            scheduler,
            tick_frames,
        }
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Render one tick's worth of audio into `sink`, then run pending ticks
    ///
    /// Returns `false` once the renderer has shut down.
    pub fn step(&mut self, sink: &mut dyn AudioSink) -> Result<bool> {
        let mut block = vec![0.0_f32; self.tick_frames];
        let running = self.renderer.render(&mut block);
        sink.write(&block)?;
        self.scheduler.run_pending();
        Ok(running)
    }

    /// Step until `done` returns true, the renderer shuts down, or
    /// `max_secs` of audio have been rendered
    ///
    /// Returns the rendered duration in seconds.
    pub fn run_until<F>(&mut self, sink: &mut dyn AudioSink, max_secs: f64, mut done: F) -> Result<f64>
    where
        F: FnMut() -> bool,
    {
        let sample_rate = self.renderer.sample_rate() as f64;
        let max_frames = (max_secs * sample_rate) as usize;
        let mut frames = 0;

        while frames < max_frames {
            let running = self.step(sink)?;
            frames += self.tick_frames;
            if !running || done() {
                break;
            }
        }
        Ok(frames as f64 / sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::scheduler::{Scheduler, TickFlow};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config() -> EngineConfig {
        EngineConfig {
            sample_rate: 8000,
            render_quantum: 64,
            tick_rate_hz: 100.0,
        }
    }

    #[test]
    fn test_memory_sink_collects() {
        let mut sink = MemorySink::new();
        let samples = sink.samples();
        sink.write(&[0.1, 0.2]).unwrap();
        sink.write(&[0.3]).unwrap();
        assert_eq!(*samples.lock(), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_offline_driver_interleaves_ticks() {
        let (context, renderer) = AudioContext::new(&config());
        let scheduler = Arc::new(ManualScheduler::new());
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        scheduler.schedule_repeating(
            Duration::from_millis(10),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                TickFlow::Continue
            }),
        );

        let mut driver = OfflineDriver::new(renderer, Arc::clone(&scheduler), 0.01);
        let mut sink = MemorySink::new();
        let rendered = driver.run_until(&mut sink, 1.0, || false).unwrap();

        assert!((rendered - 1.0).abs() < 1e-9);
        assert_eq!(ticks.load(Ordering::SeqCst), 100);
        assert_eq!(sink.samples().lock().len(), 8000);
        assert!((context.current_time() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_offline_driver_stops_on_close() {
        let (context, renderer) = AudioContext::new(&config());
        let mut driver = OfflineDriver::new(renderer, Arc::new(ManualScheduler::new()), 0.01);
        context.close();
        let rendered = driver.run_until(&mut NullSink, 10.0, || false).unwrap();
        assert!(rendered <= 0.011);
    }

    #[test]
    fn test_realtime_driver_renders_and_joins() {
        let (context, renderer) = AudioContext::new(&config());
        let sink = MemorySink::new();
        let samples = sink.samples();

        let driver = RealtimeDriver::spawn(Arc::clone(&context), renderer, Box::new(sink)).unwrap();
        thread::sleep(Duration::from_millis(60));
        driver.join().unwrap();

        assert!(context.is_closed());
        assert!(context.current_time() > 0.0);
        assert_eq!(samples.lock().len() as u64, context.frames_rendered());
    }

    #[test]
    fn test_wav_sink_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("render.wav");
        let mut sink = Box::new(WavSink::create(&path, 8000).unwrap());
        sink.write(&[0.0; 800]).unwrap();
        sink.finish().unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.len(), 800);
    }
}
