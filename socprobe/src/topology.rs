// SPDX-License-Identifier: AGPL-3.0-only

//! CPU topology detection — total cores and big/LITTLE split.
//!
//! Detected once at startup and immutable thereafter. The big/LITTLE
//! split is read from per-core `cpu_capacity` when the kernel exposes
//! it; when capacities are absent or uniform the lower half of core
//! indices is treated as little (the common mobile DT ordering).

use crate::sensors::SensorSource;
use log::debug;
use std::thread;

/// Immutable core topology snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreTopology {
    /// Total logical cores.
    pub total: usize,
    /// Performance core indices.
    pub big_ids: Vec<usize>,
    /// Efficiency core indices.
    pub little_ids: Vec<usize>,
}

impl CoreTopology {
    /// Detect topology from the running system.
    #[must_use]
    pub fn detect() -> Self {
        let total = thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self::detect_with(&crate::sensors::SysfsSource, total)
    }

    /// Detect with an explicit source and core count (capability seam).
    #[must_use]
    pub fn detect_with(source: &dyn SensorSource, total: usize) -> Self {
        let capacities: Vec<Option<i64>> = (0..total)
            .map(|i| source.read_int(&format!("/sys/devices/system/cpu/cpu{i}/cpu_capacity")))
            .collect();

        if let Some(split) = split_by_capacity(&capacities) {
            return Self {
                total,
                big_ids: split.1,
                little_ids: split.0,
            };
        }

        debug!("cpu_capacity unavailable or uniform, using lower-half little heuristic");
        Self::lower_half_little(total)
    }

    /// Fallback split: lower half of core indices little, upper half big.
    #[must_use]
    pub fn lower_half_little(total: usize) -> Self {
        let little = total / 2;
        Self {
            total,
            big_ids: (little..total).collect(),
            little_ids: (0..little).collect(),
        }
    }

    /// Number of performance cores.
    #[must_use]
    pub fn big_count(&self) -> usize {
        self.big_ids.len()
    }

    /// Number of efficiency cores.
    #[must_use]
    pub fn little_count(&self) -> usize {
        self.little_ids.len()
    }
}

/// Split core indices by reported capacity: max-capacity cores are big.
///
/// Returns `None` when any capacity is missing or all values are equal,
/// which means the kernel gave us nothing to discriminate on.
fn split_by_capacity(capacities: &[Option<i64>]) -> Option<(Vec<usize>, Vec<usize>)> {
    let values: Option<Vec<i64>> = capacities.iter().copied().collect();
    let values = values?;
    let max = *values.iter().max()?;
    let min = *values.iter().min()?;
    if max == min {
        return None;
    }

    let mut little = Vec::new();
    let mut big = Vec::new();
    for (id, cap) in values.iter().enumerate() {
        if *cap == max {
            big.push(id);
        } else {
            little.push(id);
        }
    }
    Some((little, big))
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct CapacitySource {
        caps: HashMap<String, i64>,
    }

    impl CapacitySource {
        fn new(caps: &[(usize, i64)]) -> Self {
            Self {
                caps: caps
                    .iter()
                    .map(|(i, c)| (format!("/sys/devices/system/cpu/cpu{i}/cpu_capacity"), *c))
                    .collect(),
            }
        }
    }

    impl SensorSource for CapacitySource {
        fn read_int(&self, path: &str) -> Option<i64> {
            self.caps.get(path).copied()
        }

        fn read_str(&self, _path: &str) -> Option<String> {
            None
        }
    }

    #[test]
    fn capacity_split_classifies_big_and_little() {
        let src = CapacitySource::new(&[
            (0, 512),
            (1, 512),
            (2, 512),
            (3, 512),
            (4, 1024),
            (5, 1024),
            (6, 1024),
            (7, 1024),
        ]);
        let topo = CoreTopology::detect_with(&src, 8);
        assert_eq!(topo.total, 8);
        assert_eq!(topo.little_ids, vec![0, 1, 2, 3]);
        assert_eq!(topo.big_ids, vec![4, 5, 6, 7]);
    }

    #[test]
    fn uniform_capacity_falls_back_to_lower_half() {
        let src = CapacitySource::new(&[(0, 1024), (1, 1024), (2, 1024), (3, 1024)]);
        let topo = CoreTopology::detect_with(&src, 4);
        assert_eq!(topo.little_ids, vec![0, 1]);
        assert_eq!(topo.big_ids, vec![2, 3]);
    }

    #[test]
    fn missing_capacity_falls_back_to_lower_half() {
        let src = CapacitySource::new(&[]);
        let topo = CoreTopology::detect_with(&src, 6);
        assert_eq!(topo.little_ids, vec![0, 1, 2]);
        assert_eq!(topo.big_ids, vec![3, 4, 5]);
    }

    #[test]
    fn lower_half_odd_core_count() {
        let topo = CoreTopology::lower_half_little(5);
        assert_eq!(topo.little_count(), 2);
        assert_eq!(topo.big_count(), 3);
        assert_eq!(topo.total, 5);
    }

    #[test]
    fn single_core_is_big() {
        let topo = CoreTopology::lower_half_little(1);
        assert_eq!(topo.little_count(), 0);
        assert_eq!(topo.big_count(), 1);
    }

    #[test]
    fn detect_runs_on_any_host() {
        let topo = CoreTopology::detect();
        assert!(topo.total >= 1);
        assert_eq!(topo.big_count() + topo.little_count(), topo.total);
    }

    #[test]
    fn three_tier_capacities_group_mid_with_little() {
        // Mid cores (prime variants) are not max capacity, so they land
        // in the little set; only the top tier is big.
        let src = CapacitySource::new(&[(0, 300), (1, 300), (2, 700), (3, 1024)]);
        let topo = CoreTopology::detect_with(&src, 4);
        assert_eq!(topo.big_ids, vec![3]);
        assert_eq!(topo.little_ids, vec![0, 1, 2]);
    }
}
