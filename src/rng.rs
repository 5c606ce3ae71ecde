//! Random number generation for the search engine.
//!
//! All randomized operators take an explicit `&mut SearchRng` so that two
//! runs with the same seed, instance, and parameters are bit-identical.

use rand::prelude::*;
use rand_xoshiro::Xoroshiro128Plus;
use std::time::{SystemTime, UNIX_EPOCH};

/// The engine used throughout the solver (xoroshiro128+).
pub type SearchRng = Xoroshiro128Plus;

/// Maps the user-supplied seed to the effective one: 0 means "seed from the
/// wall clock".
pub fn resolve_seed(seed: u64) -> u64 {
    if seed != 0 {
        return seed;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(1);
    nanos.max(1)
}

/// Creates the engine from a user-supplied seed (0 ⇒ wall clock).
pub fn seeded_rng(seed: u64) -> SearchRng {
    SearchRng::seed_from_u64(resolve_seed(seed))
}

/// Returns a random sample of `sample_size` distinct numbers from `0..n`,
/// uniform over all subsets of that size (reservoir sampling).
pub fn random_sample(n: usize, sample_size: usize, rng: &mut SearchRng) -> Vec<usize> {
    let sample_size = sample_size.min(n);
    let mut sample: Vec<usize> = (0..sample_size).collect();
    for i in sample_size..n {
        let r = rng.gen_range(0..=i);
        if r < sample_size {
            sample[r] = i;
        }
    }
    sample
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_seed_passthrough() {
        assert_eq!(resolve_seed(42), 42);
        assert_ne!(resolve_seed(0), 0);
    }

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = seeded_rng(7);
        let mut b = seeded_rng(7);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn test_random_sample_shape() {
        let mut rng = seeded_rng(13);
        for &(n, k) in &[(10usize, 4usize), (5, 5), (3, 8), (0, 4)] {
            let sample = random_sample(n, k, &mut rng);
            assert_eq!(sample.len(), k.min(n));
            let mut sorted = sample.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(sorted.len(), sample.len(), "values must be distinct");
            assert!(sample.iter().all(|&v| v < n));
        }
    }

    #[test]
    fn test_random_sample_is_uniform() {
        // Each of the 10 values should land in a 3-element sample with
        // probability 0.3; over 20k draws the counts stay close to that.
        let mut rng = seeded_rng(99);
        let draws = 20_000;
        let mut counts = [0u32; 10];
        for _ in 0..draws {
            for v in random_sample(10, 3, &mut rng) {
                counts[v] += 1;
            }
        }
        let expected = draws as f64 * 0.3;
        for &c in &counts {
            let ratio = c as f64 / expected;
            assert!(
                (0.9..1.1).contains(&ratio),
                "count {} too far from expected {}",
                c,
                expected
            );
        }
    }
}
