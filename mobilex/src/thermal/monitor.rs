// SPDX-License-Identifier: AGPL-3.0-only

//! Background thermal monitoring and state classification.
//!
//! A polling task samples every thermal zone once a second, keeps the
//! maximum reading as the current temperature, appends it to a bounded
//! history, and classifies the three-level thermal state:
//!
//! ```text
//! temp ≥ max_temp      → CRITICAL
//! temp ≥ throttle_temp → THROTTLE
//! otherwise            → NORMAL
//! ```
//!
//! Readers never block on I/O: `current_temp_c` / `current_state`
//! return the last completed poll under a mutex.

use log::info;
use socprobe::HardwareProbe;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

/// Bounded temperature history length, FIFO eviction.
pub const HISTORY_CAP: usize = 1000;

/// Default NORMAL → THROTTLE threshold.
pub const DEFAULT_THROTTLE_C: f32 = 40.0;
/// Default THROTTLE → CRITICAL threshold.
pub const DEFAULT_MAX_C: f32 = 45.0;

/// Three-level thermal state, ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ThermalState {
    /// Below the throttle threshold.
    Normal,
    /// At or above the throttle threshold.
    Throttle,
    /// At or above the maximum threshold.
    Critical,
}

impl ThermalState {
    /// Label for transition logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Throttle => "THROTTLE",
            Self::Critical => "CRITICAL",
        }
    }
}

/// Classify a temperature against `(throttle, max)` thresholds.
///
/// The boundary is inclusive: exactly `throttle_c` is THROTTLE.
#[must_use]
pub fn classify(temp_c: f32, throttle_c: f32, max_c: f32) -> ThermalState {
    if temp_c >= max_c {
        ThermalState::Critical
    } else if temp_c >= throttle_c {
        ThermalState::Throttle
    } else {
        ThermalState::Normal
    }
}

struct Limits {
    throttle_c: f32,
    max_c: f32,
}

struct Reading {
    temp_c: f32,
    state: ThermalState,
}

struct Shared {
    probe: HardwareProbe,
    reading: Mutex<Reading>,
    limits: Mutex<Limits>,
    history: Mutex<VecDeque<f32>>,
    running: AtomicBool,
}

impl Shared {
    fn poll_once(&self) {
        let temp_c = self
            .probe
            .read_zones()
            .into_iter()
            .map(|(_, t)| t)
            .fold(None::<f32>, |acc, t| Some(acc.map_or(t, |a| a.max(t))))
            .unwrap_or(socprobe::sensors::FALLBACK_TEMP_C);
        self.apply_reading(temp_c);
    }

    fn apply_reading(&self, temp_c: f32) {
        let (throttle_c, max_c) = {
            let limits = self.limits.lock().unwrap_or_else(PoisonError::into_inner);
            (limits.throttle_c, limits.max_c)
        };
        let new_state = classify(temp_c, throttle_c, max_c);

        {
            let mut reading = self.reading.lock().unwrap_or_else(PoisonError::into_inner);
            if new_state != reading.state {
                info!(
                    "thermal state changed: {} -> {} ({temp_c:.1}C)",
                    reading.state.label(),
                    new_state.label()
                );
            }
            reading.temp_c = temp_c;
            reading.state = new_state;
        }

        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        if history.len() == HISTORY_CAP {
            history.pop_front();
        }
        history.push_back(temp_c);
    }
}

/// Thermal monitor owning the polling task and temperature history.
pub struct ThermalMonitor {
    shared: Arc<Shared>,
    poll_interval: Duration,
    handle: Option<JoinHandle<()>>,
}

impl ThermalMonitor {
    /// Monitor over sysfs with the default thresholds.
    #[must_use]
    pub fn new(poll_interval: Duration) -> Self {
        Self::with_probe(HardwareProbe::new(), poll_interval)
    }

    /// Monitor over an explicit probe (platform variants, tests).
    #[must_use]
    pub fn with_probe(probe: HardwareProbe, poll_interval: Duration) -> Self {
        let zones = probe.zone_count();
        if zones == 0 {
            info!("no thermal zones readable, monitor will report the fallback temperature");
        } else {
            info!("detected {zones} thermal zones");
        }
        let shared = Arc::new(Shared {
            probe,
            reading: Mutex::new(Reading {
                temp_c: socprobe::sensors::FALLBACK_TEMP_C,
                state: ThermalState::Normal,
            }),
            limits: Mutex::new(Limits {
                throttle_c: DEFAULT_THROTTLE_C,
                max_c: DEFAULT_MAX_C,
            }),
            history: Mutex::new(VecDeque::with_capacity(HISTORY_CAP)),
            running: AtomicBool::new(false),
        });
        Self {
            shared,
            poll_interval,
            handle: None,
        }
    }

    /// Launch the background polling task. Idempotent.
    pub fn start(&mut self) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.poll_once();
        let shared = Arc::clone(&self.shared);
        let interval = self.poll_interval;
        self.handle = Some(std::thread::spawn(move || {
            while shared.running.load(Ordering::SeqCst) {
                std::thread::sleep(interval);
                if !shared.running.load(Ordering::SeqCst) {
                    break;
                }
                shared.poll_once();
            }
        }));
    }

    /// Request the polling task to exit and join it.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Temperature from the last completed poll.
    #[must_use]
    pub fn current_temp_c(&self) -> f32 {
        self.shared
            .reading
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .temp_c
    }

    /// State from the last completed poll.
    #[must_use]
    pub fn current_state(&self) -> ThermalState {
        self.shared
            .reading
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    /// Atomically update thresholds and re-evaluate the state.
    pub fn set_limits(&self, throttle_c: f32, max_c: f32) {
        let temp_c = {
            let mut limits = self.shared.limits.lock().unwrap_or_else(PoisonError::into_inner);
            limits.throttle_c = throttle_c;
            limits.max_c = max_c;
            self.current_temp_c()
        };
        info!("thermal limits updated: throttle={throttle_c:.1}C max={max_c:.1}C");
        self.shared.apply_reading(temp_c);
    }

    /// State ≥ THROTTLE.
    #[must_use]
    pub fn should_throttle(&self) -> bool {
        self.current_state() >= ThermalState::Throttle
    }

    /// State ≥ CRITICAL.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.current_state() >= ThermalState::Critical
    }

    /// Snapshot of the temperature history, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<f32> {
        self.shared
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }

    /// Feed a reading directly, bypassing the probe. Used by the test
    /// suite and by hosts that push platform thermal callbacks.
    pub fn ingest_reading(&self, temp_c: f32) {
        self.shared.apply_reading(temp_c);
    }
}

impl Drop for ThermalMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
