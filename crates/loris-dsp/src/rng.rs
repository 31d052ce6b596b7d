//! Deterministic RNG seeding.
//!
//! All randomness in the synthesizer flows through PCG32 generators seeded
//! here. Component seeds are derived from a base seed by BLAKE3 hashing, so
//! different components of one synthesizer (and synthesizers with
//! different base seeds) get independent, reproducible streams.

use rand::SeedableRng;
use rand_pcg::Pcg32;

/// Creates a PCG32 generator from a 64-bit seed.
pub fn create_rng(seed: u64) -> Pcg32 {
    Pcg32::seed_from_u64(seed)
}

/// Derives an independent seed for a named component from a base seed.
pub fn derive_component_seed(base_seed: u64, key: &str) -> u64 {
    let mut input = Vec::with_capacity(8 + key.len());
    input.extend_from_slice(&base_seed.to_le_bytes());
    input.extend_from_slice(key.as_bytes());

    let hash = blake3::hash(&input);
    let bytes: [u8; 8] = hash.as_bytes()[0..8]
        .try_into()
        .expect("BLAKE3 hashes are longer than 8 bytes");
    u64::from_le_bytes(bytes)
}
