//! Hash primitives shared by node identity, operation fingerprints, and the shape cache.
//!
//! Content hashes must be reproducible for identical graphs built in the same process, and
//! operation fingerprints must not depend on interning order, so names and literal payloads go
//! through FNV-1a while structured values go through [`FingerprintHasher`].

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

const FNV1A_OFFSET: u64 = 0xcbf29ce484222325;
const FNV1A_PRIME: u64 = 0x100000001b3;

const GOLDEN_RATIO: u64 = 0x9e3779b97f4a7c15;

/// Seed used by node constructors that do not fold extra state into their hash.
pub const DEFAULT_HASH_SEED: u64 = 0x5a2d296e9;

/// Domain separator for shape-cache keys, which must never coincide with node hashes.
pub const SHAPE_KEY_DOMAIN: u64 = 0x3f1b_5a2e_77c4_d109;

/// Order-sensitive combiner: `hash_combine(a, b) != hash_combine(b, a)` in general.
pub fn hash_combine(seed: u64, value: u64) -> u64 {
    seed ^ value
        .wrapping_add(GOLDEN_RATIO)
        .wrapping_add(seed << 6)
        .wrapping_add(seed >> 2)
}

/// Thin wrapper over the std SipHash with fixed keys.
pub struct FingerprintHasher {
    inner: DefaultHasher,
}

impl FingerprintHasher {
    pub fn new() -> Self {
        Self {
            inner: DefaultHasher::new(),
        }
    }

    pub fn write<T: Hash>(&mut self, value: &T) {
        value.hash(&mut self.inner);
    }

    pub fn finish(self) -> u64 {
        self.inner.finish()
    }
}

impl Default for FingerprintHasher {
    fn default() -> Self {
        Self::new()
    }
}

pub fn hash_value<T: Hash>(value: &T) -> u64 {
    let mut hasher = FingerprintHasher::new();
    hasher.write(value);
    hasher.finish()
}

pub fn fnv1a_init() -> u64 {
    FNV1A_OFFSET
}

pub fn fnv1a_bytes(mut hash: u64, bytes: &[u8]) -> u64 {
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV1A_PRIME);
    }
    hash
}

pub fn fnv1a_hash(bytes: &[u8]) -> u64 {
    fnv1a_bytes(fnv1a_init(), bytes)
}
