// SPDX-License-Identifier: AGPL-3.0-only

//! ARM64 feature detection and cache geometry.
//!
//! On aarch64 Linux/Android the feature bits come from
//! `getauxval(AT_HWCAP)` / `AT_HWCAP2`. Elsewhere the detection
//! degrades to architecture-level defaults: NEON is mandatory in
//! ARMv8-A, everything optional is reported absent.
//!
//! Cache geometry is tiered by core count; the values match typical
//! flagship / mid-range / budget mobile SoCs and are only used to size
//! working sets, never for correctness.

/// Immutable ARM64 feature snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmFeatures {
    /// 128-bit NEON/ASIMD vector support (mandatory in ARMv8-A).
    pub has_neon: bool,
    /// Scalable Vector Extension.
    pub has_sve: bool,
    /// SVE2 extensions.
    pub has_sve2: bool,
    /// Int8 dot product instructions (SDOT/UDOT).
    pub has_dot_product: bool,
    /// Half-precision floating point.
    pub has_fp16: bool,
    /// LSE atomic instructions (ARMv8.1-A).
    pub has_atomics: bool,
    /// AES crypto extensions.
    pub has_aes: bool,
    /// SHA-256 crypto extensions.
    pub has_sha256: bool,
    /// Cache line size in bytes (64 on every shipping ARM64 core).
    pub cache_line_size: usize,
    /// L1 data cache size in bytes.
    pub l1_cache_size: usize,
    /// L2 cache size in bytes.
    pub l2_cache_size: usize,
    /// L3 cache size in bytes, 0 when absent.
    pub l3_cache_size: usize,
}

// AT_HWCAP bits from the Linux arm64 ABI (asm/hwcap.h).
#[cfg(all(target_arch = "aarch64", any(target_os = "linux", target_os = "android")))]
mod hwcap {
    pub const ASIMD: u64 = 1 << 1;
    pub const AES: u64 = 1 << 3;
    pub const SHA2: u64 = 1 << 6;
    pub const ATOMICS: u64 = 1 << 8;
    pub const FPHP: u64 = 1 << 9;
    pub const ASIMDDP: u64 = 1 << 20;
    pub const SVE: u64 = 1 << 22;
    pub const HWCAP2_SVE2: u64 = 1 << 1;
}

impl ArmFeatures {
    /// Detect features for the running CPU.
    #[must_use]
    pub fn detect() -> Self {
        let cores = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self::from_hwcaps(read_hwcaps(), cores)
    }

    /// Build a feature set from raw hwcap words and a core count.
    ///
    /// `hwcaps` is `None` when the platform has no auxiliary vector;
    /// architecture defaults apply in that case (and on platforms
    /// where the words cannot be interpreted).
    #[must_use]
    pub fn from_hwcaps(hwcaps: Option<(u64, u64)>, cores: usize) -> Self {
        let (l1, l2, l3) = cache_tier(cores);
        let mut features = Self {
            has_neon: cfg!(target_arch = "aarch64"),
            has_sve: false,
            has_sve2: false,
            has_dot_product: false,
            has_fp16: false,
            has_atomics: false,
            has_aes: false,
            has_sha256: false,
            cache_line_size: 64,
            l1_cache_size: l1,
            l2_cache_size: l2,
            l3_cache_size: l3,
        };
        if let Some(caps) = hwcaps {
            features.apply_hwcaps(caps);
        }
        features
    }

    #[cfg(all(target_arch = "aarch64", any(target_os = "linux", target_os = "android")))]
    fn apply_hwcaps(&mut self, (cap, cap2): (u64, u64)) {
        self.has_neon = cap & hwcap::ASIMD != 0;
        self.has_sve = cap & hwcap::SVE != 0;
        self.has_sve2 = cap2 & hwcap::HWCAP2_SVE2 != 0;
        self.has_dot_product = cap & hwcap::ASIMDDP != 0;
        self.has_fp16 = cap & hwcap::FPHP != 0;
        self.has_atomics = cap & hwcap::ATOMICS != 0;
        self.has_aes = cap & hwcap::AES != 0;
        self.has_sha256 = cap & hwcap::SHA2 != 0;
    }

    // Hwcap words only carry arm64 Linux ABI meaning.
    #[cfg(not(all(target_arch = "aarch64", any(target_os = "linux", target_os = "android"))))]
    #[allow(clippy::unused_self)]
    fn apply_hwcaps(&mut self, _caps: (u64, u64)) {}

    /// Working set that fits comfortably in L2 (half, leaving room).
    #[must_use]
    pub const fn optimal_working_set(&self) -> usize {
        self.l2_cache_size / 2
    }
}

/// Cache sizes by core-count tier (flagship / mid-range / budget SoC).
const fn cache_tier(cores: usize) -> (usize, usize, usize) {
    if cores >= 8 {
        (64 * 1024, 512 * 1024, 3 * 1024 * 1024)
    } else if cores >= 4 {
        (32 * 1024, 256 * 1024, 1024 * 1024)
    } else {
        (32 * 1024, 128 * 1024, 0)
    }
}

#[cfg(all(target_arch = "aarch64", any(target_os = "linux", target_os = "android")))]
fn read_hwcaps() -> Option<(u64, u64)> {
    // getauxval returns 0 both for "no such entry" and an all-zero cap
    // word; an ARMv8 core always has at least ASIMD set, so 0 means the
    // auxiliary vector is not usable.
    let cap = unsafe { libc::getauxval(libc::AT_HWCAP) };
    if cap == 0 {
        return None;
    }
    let cap2 = unsafe { libc::getauxval(libc::AT_HWCAP2) };
    Some((cap, cap2))
}

#[cfg(not(all(target_arch = "aarch64", any(target_os = "linux", target_os = "android"))))]
fn read_hwcaps() -> Option<(u64, u64)> {
    None
}
