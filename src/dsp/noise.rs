//! Looping white noise bed

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

/// Uniform white noise buffer, generated once and looped forever
#[derive(Debug, Clone)]
pub struct NoiseLoop {
    buffer: Arc<[f32]>,
    position: usize,
}

impl NoiseLoop {
    /// Generate `length` samples of uniform noise in [-1, 1)
    pub fn generate(length: usize, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => Pcg32::seed_from_u64(seed),
            None => Pcg32::from_entropy(),
        };
        let buffer: Arc<[f32]> = (0..length.max(1))
            .map(|_| rng.gen_range(-1.0_f32..1.0))
            .collect();
        Self { buffer, position: 0 }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        let sample = self.buffer[self.position];
        self.position += 1;
        if self.position == self.buffer.len() {
            self.position = 0;
        }
        sample
    }
}
