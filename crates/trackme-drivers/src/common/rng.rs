//! Seeded RNG for reproducible synthetic samples.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seeded noise source for generated samples.
///
/// Owned by the sampling thread, so no locking is needed.
pub struct SampleRng {
    inner: ChaCha8Rng,
}

impl SampleRng {
    /// Create a new RNG with optional seed.
    /// If seed is None, uses a random seed from the OS.
    pub fn new(seed: Option<u64>) -> Self {
        let inner = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        };
        Self { inner }
    }

    /// Uniform noise in `[-amplitude, amplitude)`.
    pub fn noise(&mut self, amplitude: f32) -> f32 {
        if amplitude <= 0.0 {
            return 0.0;
        }
        self.inner.gen_range(-amplitude..amplitude)
    }
}

impl std::fmt::Debug for SampleRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleRng")
            .field("inner", &"<ChaCha8Rng>")
            .finish()
    }
}
