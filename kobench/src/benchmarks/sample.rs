//! Seeded sampling of benchmark splits

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::SampleSize;

/// Deterministic subset of `records`
///
/// When the requested size covers the whole split the records come back
/// untouched, in source order. Otherwise every index is shuffled with a
/// generator seeded from `seed` and the first `n` indices of that
/// permutation are kept, in permutation order. The same seed and split
/// length always select the same records.
pub fn sample<T>(records: Vec<T>, size: SampleSize, seed: u64) -> Vec<T> {
    let total = records.len();
    let n = size.resolve(total);
    if n >= total {
        return records;
    }

    let mut indices: Vec<usize> = (0..total).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let mut slots: Vec<Option<T>> = records.into_iter().map(Some).collect();
    indices[..n]
        .iter()
        .filter_map(|&idx| slots[idx].take())
        .collect()
}
