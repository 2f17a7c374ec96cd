use rand_chacha::rand_core::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Deterministic stream for maze carving and decoration. Two instances built
/// from the same seed produce identical draws.
#[derive(Debug, Clone)]
pub(crate) struct SeededRng {
    inner: ChaCha8Rng,
}

impl SeededRng {
    pub(crate) fn new(seed: u64) -> Self {
        Self {
            inner: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Uniform draw in `[0, 1)` with 53 bits of precision.
    pub(crate) fn next_f64(&mut self) -> f64 {
        (self.inner.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// `floor(next_f64() * n)`, clamped so rounding can never yield `n`.
    /// Returns 0 for `n == 0`.
    pub(crate) fn below(&mut self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        let draw = (self.next_f64() * n as f64).floor() as usize;
        draw.min(n - 1)
    }

    pub(crate) fn range_f32(&mut self, min: f32, max: f32) -> f32 {
        if max <= min {
            return min;
        }
        min + (max - min) * self.next_f64() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_yields_same_stream() {
        let mut a = SeededRng::new(1);
        let mut b = SeededRng::new(1);
        for _ in 0..64 {
            assert_eq!(a.next_f64().to_bits(), b.next_f64().to_bits());
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = SeededRng::new(1);
        let mut b = SeededRng::new(2);
        let draws_a: Vec<u64> = (0..8).map(|_| a.next_f64().to_bits()).collect();
        let draws_b: Vec<u64> = (0..8).map(|_| b.next_f64().to_bits()).collect();
        assert_ne!(draws_a, draws_b);
    }

    #[test]
    fn draws_stay_in_unit_interval_and_below_bound() {
        let mut rng = SeededRng::new(99);
        for _ in 0..1000 {
            let value = rng.next_f64();
            assert!((0.0..1.0).contains(&value));
            assert!(rng.below(10) < 10);
        }
        assert_eq!(rng.below(0), 0);
        assert_eq!(rng.below(1), 0);
    }

    #[test]
    fn range_f32_handles_empty_range() {
        let mut rng = SeededRng::new(5);
        assert_eq!(rng.range_f32(3.0, 3.0), 3.0);
        let value = rng.range_f32(10.0, 20.0);
        assert!((10.0..20.0).contains(&value));
    }
}
