//! Feedback Delay Line
//!
//! Single-tap delay whose output is fed back into its own input. The
//! feedback gain is supplied per sample so it can follow automation.

/// Hard ceiling on the loop gain; anything at or above 1.0 self-oscillates
pub const MAX_FEEDBACK: f32 = 0.95;

/// Circular buffer delay with a single feedback tap
#[derive(Debug, Clone)]
pub struct FeedbackDelay {
    /// Circular buffer
    buffer: Vec<f32>,
    /// Current write position in circular buffer
    write_pos: usize,
    /// Delay in samples
    delay_samples: usize,
}

impl FeedbackDelay {
    /// Create a delay line
    ///
    /// # Arguments
    /// * `sample_rate` - Sample rate in Hz
    /// * `delay_secs` - Delay time (clamped to the line capacity)
    /// * `max_delay_secs` - Capacity of the line
    pub fn new(sample_rate: u32, delay_secs: f64, max_delay_secs: f64) -> Self {
        let capacity = ((max_delay_secs * sample_rate as f64) as usize).max(1) + 1;
        let delay_samples = ((delay_secs * sample_rate as f64) as usize).clamp(1, capacity - 1);
        Self {
            buffer: vec![0.0; capacity],
            write_pos: 0,
            delay_samples,
        }
    }

    /// Delay in samples
    pub fn delay_samples(&self) -> usize {
        self.delay_samples
    }

    /// Read from circular buffer with wrapping
    #[inline]
    fn read(&self) -> f32 {
        let size = self.buffer.len();
        let read_pos = (self.write_pos + size - self.delay_samples) % size;
        self.buffer[read_pos]
    }

    /// Push one sample through the line and return the delayed output
    ///
    /// The value written back is `input + delayed * feedback`, with the
    /// feedback gain clamped to `[0, MAX_FEEDBACK]`.
    #[inline]
    pub fn process(&mut self, input: f32, feedback: f32) -> f32 {
        let delayed = self.read();
        let feedback = feedback.clamp(0.0, MAX_FEEDBACK);
        let mut written = input + delayed * feedback;
        if !written.is_finite() {
            written = 0.0;
        }
        self.buffer[self.write_pos] = written;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
        delayed
    }
}
