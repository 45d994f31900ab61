//! Capture
//!
//! Producer side of the pipeline: something records mono samples into a
//! [`CaptureSession`], and [`CaptureSession::stop`] turns them into the
//! WAV bytes [`PlaybackController::play`](crate::playback::PlaybackController::play)
//! consumes.
//!
//! Stopping never hangs. If the producer does not acknowledge the stop
//! within the finalize timeout, whatever has arrived so far is used.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::config::CaptureConfig;
use crate::engine::io::{decode_audio, encode_wav};
use crate::error::{PhonelineError, Result};

/// Frames per chunk pushed by [`FileCapture`]
const FILE_CHUNK_FRAMES: usize = 1024;

/// Anything that can start recording
pub trait CaptureSource {
    /// # Errors
    /// * `DeviceUnavailable` - the input cannot be opened
    fn start_capture(&self) -> Result<CaptureSession>;
}

enum CaptureMessage {
    Chunk(Vec<f32>),
    Finished,
}

/// Producer handle feeding a [`CaptureSession`]
#[derive(Clone)]
pub struct CaptureWriter {
    sender: Sender<CaptureMessage>,
    stop_requested: Arc<AtomicBool>,
}

impl CaptureWriter {
    /// Send a chunk of samples
    ///
    /// Returns `false` once the session has asked to stop or is gone.
    pub fn push(&self, samples: &[f32]) -> bool {
        if self.is_stop_requested() {
            return false;
        }
        self.sender
            .send(CaptureMessage::Chunk(samples.to_vec()))
            .is_ok()
    }

    /// Signal that no more samples will follow
    pub fn finish(self) {
        let _ = self.sender.send(CaptureMessage::Finished);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }
}

/// One recording in progress
pub struct CaptureSession {
    receiver: Receiver<CaptureMessage>,
    stop_requested: Arc<AtomicBool>,
    sample_rate: u32,
    max_samples: usize,
    finalize_timeout: Duration,
    collected: Vec<f32>,
    dropped: usize,
    finished: bool,
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("sample_rate", &self.sample_rate)
            .field("collected", &self.collected.len())
            .field("dropped", &self.dropped)
            .finish()
    }
}

impl CaptureSession {
    pub fn new(sample_rate: u32, config: &CaptureConfig) -> (Self, CaptureWriter) {
        let (sender, receiver) = unbounded();
        let stop_requested = Arc::new(AtomicBool::new(false));
        let session = Self {
            receiver,
            stop_requested: Arc::clone(&stop_requested),
            sample_rate,
            max_samples: (config.max_duration_secs * sample_rate as f64) as usize,
            finalize_timeout: Duration::from_secs_f64(config.finalize_timeout_secs.max(0.0)),
            collected: Vec::new(),
            dropped: 0,
            finished: false,
        };
        let writer = CaptureWriter {
            sender,
            stop_requested,
        };
        (session, writer)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Seconds of audio received so far
    pub fn collected_secs(&mut self) -> f64 {
        while let Ok(message) = self.receiver.try_recv() {
            match message {
                CaptureMessage::Chunk(chunk) => self.collect(&chunk),
                CaptureMessage::Finished => self.finished = true,
            }
        }
        self.collected.len() as f64 / self.sample_rate as f64
    }

    /// Whether the producer has signalled its last chunk
    pub fn is_finished(&mut self) -> bool {
        self.collected_secs();
        self.finished
    }

    /// Stop recording and encode what was captured
    ///
    /// # Errors
    /// * `DeviceUnavailable` - nothing was recorded
    pub fn stop(mut self) -> Result<Vec<u8>> {
        self.stop_requested.store(true, Ordering::Release);
        let deadline = Instant::now() + self.finalize_timeout;

        while !self.finished {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(CaptureMessage::Chunk(chunk)) => self.collect(&chunk),
                Ok(CaptureMessage::Finished) => self.finished = true,
                Err(RecvTimeoutError::Disconnected) => {
                    log::debug!("capture producer went away without finishing");
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {
                    log::warn!(
                        "capture did not finish within {:?}, finalizing collected audio",
                        self.finalize_timeout
                    );
                    break;
                }
            }
        }

        if self.collected.is_empty() {
            return Err(PhonelineError::DeviceUnavailable {
                reason: "recorder not active".to_string(),
            });
        }
        if self.dropped > 0 {
            log::warn!(
                "capture truncated to {:.1}s, dropped {} samples",
                self.max_samples as f64 / self.sample_rate as f64,
                self.dropped
            );
        }

        log::debug!(
            "capture finalized: {} samples @ {} Hz",
            self.collected.len(),
            self.sample_rate
        );
        encode_wav(&self.collected, self.sample_rate)
    }

    fn collect(&mut self, chunk: &[f32]) {
        let room = self.max_samples.saturating_sub(self.collected.len());
        let take = room.min(chunk.len());
        self.collected.extend_from_slice(&chunk[..take]);
        self.dropped += chunk.len() - take;
    }
}

// ============================================================================
// File-backed capture
// ============================================================================

/// Records from a WAV file instead of a microphone
#[derive(Debug, Clone)]
pub struct FileCapture {
    path: PathBuf,
    sample_rate: u32,
    config: CaptureConfig,
    paced: bool,
}

impl FileCapture {
    pub fn new(path: impl Into<PathBuf>, sample_rate: u32, config: CaptureConfig) -> Self {
        Self {
            path: path.into(),
            sample_rate,
            config,
            paced: false,
        }
    }

    /// Deliver chunks at the rate a live input would
    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }
}

impl CaptureSource for FileCapture {
    fn start_capture(&self) -> Result<CaptureSession> {
        let unavailable = |reason: String| PhonelineError::DeviceUnavailable { reason };

        let bytes = std::fs::read(&self.path)
            .map_err(|e| unavailable(format!("cannot open {}: {}", self.path.display(), e)))?;
        let buffer = decode_audio(&bytes, self.sample_rate)
            .map_err(|e| unavailable(format!("cannot read {}: {}", self.path.display(), e)))?;

        let (session, writer) = CaptureSession::new(self.sample_rate, &self.config);
        let samples = buffer.shared_samples();
        let chunk_period =
            Duration::from_secs_f64(FILE_CHUNK_FRAMES as f64 / self.sample_rate as f64);
        let paced = self.paced;

        thread::Builder::new()
            .name("phoneline-capture".to_string())
            .spawn(move || {
                for chunk in samples.chunks(FILE_CHUNK_FRAMES) {
                    if !writer.push(chunk) {
                        break;
                    }
                    if paced {
                        thread::sleep(chunk_period);
                    }
                }
                writer.finish();
            })
            .map_err(|e| unavailable(format!("cannot start capture thread: {}", e)))?;

        log::info!("capturing from {}", self.path.display());
        Ok(session)
    }
}
