//! The single source of randomness for generation and invalidation.
//!
//! Every random choice made while synthesizing request data (enum picks,
//! array lengths, property sampling, relation selection, pattern expansion)
//! goes through [`Randomness`], so a fixed seed reproduces a whole test run.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore, SeedableRng};

/// Seedable random source shared by the generator, the invalidator and the
/// request builder.
#[derive(Debug, Clone)]
pub struct Randomness {
    rng: StdRng,
}

impl Randomness {
    /// Create a deterministic source from a fixed seed.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Create a source seeded from the operating system.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Pick one element uniformly, `None` for an empty slice.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        items.choose(&mut self.rng)
    }

    /// Pick `amount` distinct elements (fewer if the slice is shorter),
    /// keeping their original relative order.
    pub fn sample<T: Clone>(&mut self, items: &[T], amount: usize) -> Vec<T> {
        let amount = amount.min(items.len());
        let mut indices = rand::seq::index::sample(&mut self.rng, items.len(), amount).into_vec();
        indices.sort_unstable();
        indices.into_iter().map(|i| items[i].clone()).collect()
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rng);
    }

    /// Uniform integer in the inclusive range `[min, max]`.
    ///
    /// The bounds are swapped when given in the wrong order.
    pub fn int_in(&mut self, min: i64, max: i64) -> i64 {
        let (low, high) = if min <= max { (min, max) } else { (max, min) };
        self.rng.gen_range(low..=high)
    }

    /// Uniform count in the inclusive range `[min, max]`.
    pub fn usize_in(&mut self, min: usize, max: usize) -> usize {
        let (low, high) = if min <= max { (min, max) } else { (max, min) };
        self.rng.gen_range(low..=high)
    }

    /// Uniform float in `[min, max]`.
    ///
    /// Interpolates instead of delegating to `gen_range` so that ranges whose
    /// width overflows `f64` (e.g. `[-f64::MAX, f64::MAX]`) never panic.
    pub fn float_in(&mut self, min: f64, max: f64) -> f64 {
        let (low, high) = if min <= max { (min, max) } else { (max, min) };
        let t: f64 = self.rng.r#gen();
        let value = low.mul_add(1.0 - t, high * t);
        value.clamp(low, high)
    }

    pub fn coin(&mut self) -> bool {
        self.rng.r#gen()
    }

    pub fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest);
    }

    /// Random lowercase hexadecimal string of `len` characters.
    pub fn hex_string(&mut self, len: usize) -> String {
        const HEX: &[u8] = b"0123456789abcdef";
        (0..len)
            .map(|_| char::from(HEX[self.rng.gen_range(0..HEX.len())]))
            .collect()
    }
}

impl Default for Randomness {
    fn default() -> Self {
        Self::from_entropy()
    }
}
