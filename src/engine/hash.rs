//! Seed derivation from (salt, origin).
//!
//! FNV-1a 32-bit over UTF-16 code units, plus an iterated "strong" mode
//! that stretches the hash chain. Pure functions; every context that
//! derives from the same inputs lands on the same seed.

use std::fmt::Write;

use crate::config::FingerprintConfig;

pub const FNV_OFFSET_BASIS: u32 = 0x811C_9DC5;
pub const FNV_PRIME: u32 = 0x0100_0193;

/// FNV-1a over the UTF-16 code units of `input`.
///
/// ASCII input hashes exactly like its bytes.
#[inline]
pub fn hash_string(input: &str) -> u32 {
    input.encode_utf16().fold(FNV_OFFSET_BASIS, |h, unit| {
        (h ^ unit as u32).wrapping_mul(FNV_PRIME)
    })
}

/// Legacy derivation: `hash(salt) ^ hash(origin)`.
pub fn derive_seed_simple(salt: &str, origin: Option<&str>) -> u32 {
    hash_string(salt) ^ hash_string(origin.unwrap_or(""))
}

/// Iterated derivation.
///
/// `seed₀ = hash(salt ‖ origin)`, then `iterations` rounds of
/// `hash(decimal(seed) ‖ salt ‖ decimal(i))`. Zero rounds return the base
/// hash.
pub fn derive_strong_seed(salt: &str, origin: Option<&str>, iterations: u32) -> u32 {
    let mut buf = String::with_capacity(salt.len() + 32);
    buf.push_str(salt);
    buf.push_str(origin.unwrap_or(""));
    let mut seed = hash_string(&buf);

    for i in 0..iterations {
        buf.clear();
        // u32 Display writes the same digits as a JS number
        let _ = write!(buf, "{}{}{}", seed, salt, i);
        seed = hash_string(&buf);
    }
    seed
}

/// Seed for `origin` under the configured KDF.
pub fn derive_seed(salt: &str, origin: Option<&str>, config: &FingerprintConfig) -> u32 {
    if config.use_strong_kdf {
        derive_strong_seed(salt, origin, config.effective_kdf_iterations())
    } else {
        derive_seed_simple(salt, origin)
    }
}

/// Seed for a browsing context.
///
/// With `perOriginFingerprint` off every origin shares `hash(salt)`.
pub fn context_seed(salt: &str, origin: Option<&str>, config: &FingerprintConfig) -> u32 {
    if config.per_origin_fingerprint {
        derive_seed(salt, origin, config)
    } else {
        hash_string(salt)
    }
}
