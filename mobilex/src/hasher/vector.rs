// SPDX-License-Identifier: AGPL-3.0-only

//! ARM vector preprocessing and the mobile mixing transform.
//!
//! `vector_hash` is the NEON preprocessing stage: a 32-byte XOR fold
//! over 16-byte lanes. The NEON path and the scalar path are
//! byte-for-byte identical by contract; hosts without NEON intrinsics
//! get the scalar fold with the same semantics.
//!
//! `mobile_mix` is the post-RandomX mixing stage built from the ARM
//! instruction repertoire: rotate, shift-XOR, byte reverse (REV), and
//! a rotating core-state pass, finalized with SHA-256.

use sha2::{Digest, Sha256};

/// Core-state seed for the mixing pass (protocol constant).
pub const CORE_STATE_SEED: u32 = 0x1234_5678;

/// 32-byte XOR fold over 16-byte lanes.
///
/// Chunk `i` folds into lane `i % 2` of the result; trailing bytes
/// fold at their absolute index mod 32.
#[must_use]
pub fn vector_hash(data: &[u8]) -> [u8; 32] {
    #[cfg(target_arch = "aarch64")]
    {
        vector_hash_neon(data)
    }
    #[cfg(not(target_arch = "aarch64"))]
    {
        vector_hash_scalar(data)
    }
}

/// Scalar reference fold, identical semantics on every architecture.
#[must_use]
pub fn vector_hash_scalar(data: &[u8]) -> [u8; 32] {
    let mut result = [0u8; 32];
    let chunks = data.len() / 16;
    for i in 0..chunks {
        let lane = (i % 2) * 16;
        for j in 0..16 {
            result[lane + j] ^= data[i * 16 + j];
        }
    }
    for (index, byte) in data.iter().enumerate().skip(chunks * 16) {
        result[index % 32] ^= byte;
    }
    result
}

/// NEON fold: 16 bytes per `veorq_u8`, trailing bytes scalar.
#[cfg(target_arch = "aarch64")]
#[must_use]
fn vector_hash_neon(data: &[u8]) -> [u8; 32] {
    use core::arch::aarch64::{veorq_u8, vld1q_u8, vst1q_u8};

    let mut result = [0u8; 32];
    let chunks = data.len() / 16;
    // NEON is mandatory in ARMv8-A; no runtime dispatch needed here.
    unsafe {
        for i in 0..chunks {
            let lane = (i % 2) * 16;
            let chunk = vld1q_u8(data.as_ptr().add(i * 16));
            let acc = vld1q_u8(result.as_ptr().add(lane));
            vst1q_u8(result.as_mut_ptr().add(lane), veorq_u8(acc, chunk));
        }
    }
    for (index, byte) in data.iter().enumerate().skip(chunks * 16) {
        result[index % 32] ^= byte;
    }
    result
}

/// Mobile mixing over a 32-byte inner-hash output.
///
/// Words are little-endian u32. Each word is rotated left 13, folded
/// with its own shifts, byte-reversed, then XORed against the rotating
/// core state. SHA-256 finalizes the concatenation.
#[must_use]
pub fn mobile_mix(inner: &[u8; 32]) -> [u8; 32] {
    let mut words = [0u32; 8];
    for (word, chunk) in words.iter_mut().zip(inner.chunks_exact(4)) {
        *word = u32::from_le_bytes(chunk.try_into().unwrap_or([0u8; 4]));
    }

    for word in &mut words {
        let mut w = word.rotate_left(13);
        w ^= w >> 7;
        w ^= w << 17;
        *word = w.swap_bytes();
    }

    let mut core_state = CORE_STATE_SEED;
    for word in &mut words {
        *word ^= core_state;
        core_state = core_state.rotate_left(1);
    }

    let mut bytes = [0u8; 32];
    for (chunk, word) in bytes.chunks_exact_mut(4).zip(words.iter()) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    Sha256::digest(bytes).into()
}
