use rand::{RngCore, SeedableRng, rngs::StdRng};

/// Draws unbiased integers from a bounded range.
///
/// The sampler owns its generator, so a benchmark run threads one sampler through every
/// permutation it builds. Seed it with [`seeded`](Self::seeded) to reproduce a run exactly.
pub struct UniformSampler<R = StdRng> {
    rng: R,
}

impl UniformSampler<StdRng> {
    /// Seeds the generator once from the thread-local entropy source.
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_rng(&mut rand::rng()))
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: RngCore> UniformSampler<R> {
    pub fn new(rng: R) -> Self {
        UniformSampler { rng }
    }

    /// Returns a value uniformly distributed in `[0, bound)`.
    ///
    /// The 32-bit draw is scaled into the range with a widening multiply.
    /// Products whose low half falls below `2^32 mod bound` belong to the over-represented
    /// band and are rejected, so every result is equally likely for any `bound`.
    ///
    /// # Panics
    /// If `bound` is zero.
    pub fn draw(&mut self, bound: u32) -> u32 {
        assert!(bound > 0, "cannot draw from an empty range");
        let threshold = bound.wrapping_neg() % bound;
        loop {
            let product = u64::from(self.rng.next_u32()) * u64::from(bound);
            if product as u32 >= threshold {
                return (product >> 32) as u32;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Replays a fixed list of words.
    struct Script {
        words: Vec<u32>,
        pos: usize,
    }

    impl RngCore for Script {
        fn next_u32(&mut self) -> u32 {
            let w = self.words[self.pos];
            self.pos += 1;
            w
        }

        fn next_u64(&mut self) -> u64 {
            u64::from(self.next_u32()) | u64::from(self.next_u32()) << 32
        }

        fn fill_bytes(&mut self, dst: &mut [u8]) {
            for chunk in dst.chunks_mut(4) {
                let w = self.next_u32().to_le_bytes();
                chunk.copy_from_slice(&w[..chunk.len()]);
            }
        }
    }

    #[test]
    fn rejects_biased_band() {
        // 2^32 mod 3 == 1, so a raw 0 lands in the rejected band.
        let mut sampler = UniformSampler::new(Script {
            words: vec![0, u32::MAX],
            pos: 0,
        });
        assert_eq!(sampler.draw(3), 2);
        assert_eq!(sampler.rng.pos, 2);
    }

    #[test]
    fn power_of_two_never_rejects() {
        let mut sampler = UniformSampler::new(Script {
            words: vec![0, 1 << 31, u32::MAX],
            pos: 0,
        });
        assert_eq!(sampler.draw(4), 0);
        assert_eq!(sampler.draw(4), 2);
        assert_eq!(sampler.draw(4), 3);
        assert_eq!(sampler.rng.pos, 3);
    }

    #[test]
    fn bound_one_is_zero() {
        let mut sampler = UniformSampler::seeded(7);
        for _ in 0..100 {
            assert_eq!(sampler.draw(1), 0);
        }
    }

    #[test]
    fn stays_in_range() {
        let mut sampler = UniformSampler::seeded(1);
        for bound in [2, 3, 5, 1000, u32::MAX / 3 + 1, u32::MAX] {
            for _ in 0..1000 {
                assert!(sampler.draw(bound) < bound);
            }
        }
    }

    #[test]
    fn roughly_uniform() {
        let mut sampler = UniformSampler::seeded(0x5eed);
        let bound = 6;
        let draws = 60_000;
        let mut hist = [0u32; 6];
        for _ in 0..draws {
            hist[sampler.draw(bound) as usize] += 1;
        }
        let expected = draws as f64 / bound as f64;
        let chi2: f64 = hist
            .iter()
            .map(|&o| (o as f64 - expected).powi(2) / expected)
            .sum();
        // 5 degrees of freedom, p = 1e-4
        assert!(chi2 < 25.7, "chi2 = {chi2}, hist = {hist:?}");
    }

    #[test]
    fn seeded_is_reproducible() {
        let mut a = UniformSampler::seeded(42);
        let mut b = UniformSampler::seeded(42);
        let xs: Vec<u32> = (0..64).map(|_| a.draw(1 << 20)).collect();
        let ys: Vec<u32> = (0..64).map(|_| b.draw(1 << 20)).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    #[should_panic]
    fn zero_bound_panics() {
        UniformSampler::seeded(0).draw(0);
    }
}
