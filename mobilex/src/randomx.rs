// SPDX-License-Identifier: AGPL-3.0-only

//! RandomX light-mode primitive: build-cache and hash-with-cache.
//!
//! The engine treats RandomX as a black box with exactly two
//! operations. The cache is filled from an Argon2d-derived seed block
//! expanded with Blake2b; hashing mixes Blake2b state with
//! data-dependent cache line reads, light mode (no full dataset).
//!
//! The cache is built once per seed and shared read-only across VMs;
//! in multi-threaded mining each worker owns an independent VM over
//! the shared cache.

use crate::error::MobileXError;
use argon2::{Algorithm, Argon2, Params, Version};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Blake2b512, Digest};
use std::sync::Arc;

type Blake2b256 = Blake2b<U32>;

/// Cache line granularity, matching the ARM cache line.
const LINE_BYTES: usize = 64;

/// Light-mode mixing rounds per hash.
const MIX_ROUNDS: usize = 8;

/// Default light-mode cache size: 256 MiB, no full dataset.
pub const LIGHT_CACHE_BYTES: usize = 256 * 1024 * 1024;

/// Argon2d salt for cache seed derivation (protocol constant).
const CACHE_SALT: &[u8] = b"mobilex-rx-cache";

/// Read-only memory-hard cache shared across VMs.
pub struct RandomxCache {
    data: Vec<u8>,
}

impl RandomxCache {
    /// Build a cache of `size_bytes` (rounded up to a whole line) from
    /// `seed`. The Argon2d pass makes the fill memory-hard; Blake2b
    /// expansion makes it wide.
    pub fn build(seed: &[u8], size_bytes: usize) -> Result<Self, MobileXError> {
        let lines = size_bytes.div_ceil(LINE_BYTES).max(1);

        let params = Params::new(8 * 1024, 3, 1, Some(LINE_BYTES))
            .map_err(|e| MobileXError::InitFailed(format!("argon2 params: {e}")))?;
        let argon = Argon2::new(Algorithm::Argon2d, Version::V0x13, params);

        let mut seed_block = [0u8; LINE_BYTES];
        argon
            .hash_password_into(seed, CACHE_SALT, &mut seed_block)
            .map_err(|e| MobileXError::InitFailed(format!("argon2 fill: {e}")))?;

        let mut data = vec![0u8; lines * LINE_BYTES];
        for (index, line) in data.chunks_exact_mut(LINE_BYTES).enumerate() {
            let mut hasher = Blake2b512::new();
            hasher.update(seed_block);
            hasher.update((index as u64).to_le_bytes());
            line.copy_from_slice(&hasher.finalize());
        }

        Ok(Self { data })
    }

    /// Number of cache lines.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.data.len() / LINE_BYTES
    }

    /// Cache size in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    fn line(&self, index: usize) -> &[u8] {
        let start = index * LINE_BYTES;
        &self.data[start..start + LINE_BYTES]
    }
}

/// Light-mode VM: one per mining thread, over a shared cache.
pub struct RandomxVm {
    cache: Arc<RandomxCache>,
}

impl RandomxVm {
    /// VM over a shared read-only cache.
    #[must_use]
    pub fn new(cache: Arc<RandomxCache>) -> Self {
        Self { cache }
    }

    /// 32-byte light-mode hash of `input`.
    ///
    /// Deterministic for a given (cache seed, input) pair.
    #[must_use]
    pub fn hash(&self, input: &[u8]) -> [u8; 32] {
        let mut state: [u8; 64] = Blake2b512::digest(input).into();

        for _ in 0..MIX_ROUNDS {
            let selector = u64::from_le_bytes(
                state[..8].try_into().unwrap_or([0u8; 8]),
            );
            let line = self.cache.line((selector % self.cache.line_count() as u64) as usize);
            for (s, l) in state.iter_mut().zip(line) {
                *s ^= l;
            }
            state = Blake2b512::digest(state).into();
        }

        Blake2b256::digest(state).into()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn small_cache() -> Arc<RandomxCache> {
        Arc::new(RandomxCache::build(b"test-seed", 4096).expect("cache build"))
    }

    #[test]
    fn cache_rounds_up_to_whole_lines() {
        let cache = RandomxCache::build(b"s", 100).expect("cache build");
        assert_eq!(cache.size_bytes(), 128);
        assert_eq!(cache.line_count(), 2);
    }

    #[test]
    fn hash_is_deterministic() {
        let cache = small_cache();
        let vm = RandomxVm::new(Arc::clone(&cache));
        let a = vm.hash(b"block header");
        let b = vm.hash(b"block header");
        assert_eq!(a, b);
    }

    #[test]
    fn hash_is_deterministic_across_vms() {
        let a = RandomxVm::new(small_cache()).hash(b"header");
        let b = RandomxVm::new(small_cache()).hash(b"header");
        assert_eq!(a, b, "same seed and input must agree across VMs");
    }

    #[test]
    fn hash_depends_on_input() {
        let vm = RandomxVm::new(small_cache());
        assert_ne!(vm.hash(b"header-a"), vm.hash(b"header-b"));
    }

    #[test]
    fn hash_depends_on_cache_seed() {
        let a = RandomxVm::new(small_cache()).hash(b"header");
        let other = Arc::new(RandomxCache::build(b"other-seed", 4096).expect("cache build"));
        let b = RandomxVm::new(other).hash(b"header");
        assert_ne!(a, b);
    }

    #[test]
    fn shared_cache_across_threads() {
        let cache = small_cache();
        let expected = RandomxVm::new(Arc::clone(&cache)).hash(b"h");
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || RandomxVm::new(cache).hash(b"h"))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().expect("worker"), expected);
        }
    }

    #[test]
    fn empty_input_hashes() {
        let vm = RandomxVm::new(small_cache());
        let digest = vm.hash(b"");
        assert_eq!(digest.len(), 32);
    }
}
