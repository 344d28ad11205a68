use rand::prelude::StdRng;
use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};

pub(crate) mod bsearch;
pub(crate) mod cache;

/// Deterministic pseudo-random key-value pairs (8-byte keys and values) for tests and benchmarks.
pub fn data(count: usize, seed: u64) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            (
                rng.next_u64().to_be_bytes().to_vec(),
                rng.next_u64().to_be_bytes().to_vec(),
            )
        })
        .collect()
}

pub fn shuffle<T>(mut data: Vec<T>, seed: u64) -> Vec<T> {
    let mut rng = StdRng::seed_from_u64(seed);
    data.shuffle(&mut rng);
    data
}
