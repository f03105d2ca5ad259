use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of randomness for role assignment.
///
/// Wraps any [`Rng`]; production uses OS entropy, tests use a fixed seed.
#[derive(Debug, Clone)]
pub struct Randomizer<R = StdRng> {
    rng: R,
}

impl Randomizer<StdRng> {
    pub fn from_entropy() -> Self {
        Self { rng: StdRng::from_os_rng() }
    }

    pub fn seeded(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }
}

impl<R: Rng> Randomizer<R> {
    /// Uniform index in `0..upper`. `upper` must be non-zero.
    pub fn pick_index(&mut self, upper: usize) -> usize {
        debug_assert!(upper > 0, "pick_index over an empty range");
        self.rng.random_range(0..upper)
    }

    /// Fisher–Yates shuffle in place.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.pick_index(i + 1);
            items.swap(i, j);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn shuffle_keeps_every_element() {
        let mut r = Randomizer::seeded(1);
        let mut items: Vec<u32> = (0..50).collect();
        r.shuffle(&mut items);
        let mut sorted = items.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn shuffle_of_empty_and_single_is_noop() {
        let mut r = Randomizer::seeded(2);
        let mut empty: Vec<u8> = vec![];
        r.shuffle(&mut empty);
        let mut one = vec![9];
        r.shuffle(&mut one);
        assert_eq!(one, vec![9]);
    }

    #[test]
    fn same_seed_same_order() {
        let mut a: Vec<u32> = (0..10).collect();
        let mut b = a.clone();
        Randomizer::seeded(42).shuffle(&mut a);
        Randomizer::seeded(42).shuffle(&mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn shuffle_is_close_to_uniform_over_permutations() {
        // 3 elements -> 6 permutations, 60k trials -> 10k expected each.
        // Standard deviation is ~91, so +/-500 is well over 5 sigma.
        const TRIALS: usize = 60_000;
        let mut r = Randomizer::seeded(0xC0FFEE);
        let mut seen: HashMap<[u8; 3], usize> = HashMap::new();
        for _ in 0..TRIALS {
            let mut p = [0u8, 1, 2];
            r.shuffle(&mut p);
            *seen.entry(p).or_default() += 1;
        }
        assert_eq!(seen.len(), 6);
        let expected = TRIALS / 6;
        for (perm, count) in &seen {
            assert!(
                count.abs_diff(expected) < 500,
                "permutation {perm:?} drawn {count} times, expected about {expected}"
            );
        }
    }

    #[test]
    fn first_position_is_uniform() {
        const TRIALS: usize = 40_000;
        let mut r = Randomizer::seeded(7);
        let mut hits = [0usize; 4];
        for _ in 0..TRIALS {
            let mut p = [0usize, 1, 2, 3];
            r.shuffle(&mut p);
            hits[p[0]] += 1;
        }
        for h in hits {
            assert!(h.abs_diff(TRIALS / 4) < 500, "{hits:?}");
        }
    }
}
