// SPDX-License-Identifier: AGPL-3.0-only

//! The mining session orchestrator.
//!
//! Owns the shared RandomX cache, the NPU engine, the thermal
//! monitor/verifier, the policy controller, and the worker threads —
//! one per active core, each with its own VM and hasher over the
//! shared cache. Workers observe the shutdown flag at every hash
//! boundary and exit within one hash.
//!
//! A control thread ticks once per poll interval: it feeds the
//! verifier the latest temperature, re-evaluates policy, records
//! metrics, and nudges the scheduler's intensity up or down with the
//! thermal picture.

use crate::config::MinerConfig;
use crate::error::MobileXError;
use crate::hasher::{MobileXHasher, StageNanos};
use crate::metrics::{MetricsCollector, MiningMetrics};
use crate::npu::{NeuralProvider, NpuEngine};
use crate::policy::{Intensity, PolicyController, PowerSnapshot};
use crate::randomx::RandomxCache;
use crate::scheduler::HeterogeneousScheduler;
use crate::thermal::{ThermalMonitor, ThermalVerifier};
use log::{debug, info};
use socprobe::{ArmFeatures, HardwareProbe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

/// Estimated CPU watts per active core while hashing.
const WATTS_PER_CORE: f64 = 0.5;

struct MiningRun {
    started: Instant,
    workers: Vec<JoinHandle<()>>,
    control: Option<JoinHandle<()>>,
}

/// Shared counters the workers and the control thread write into.
struct SessionCounters {
    shutdown: AtomicBool,
    hashes: AtomicU64,
    inner_nanos: AtomicU64,
    mobile_nanos: AtomicU64,
}

/// A full mining engine instance.
pub struct MobileXMiner {
    config: MinerConfig,
    features: ArmFeatures,
    cache: Arc<RandomxCache>,
    npu: Arc<NpuEngine>,
    npu_enabled: Arc<AtomicBool>,
    scheduler: Arc<HeterogeneousScheduler>,
    verifier: Arc<ThermalVerifier>,
    monitor: ThermalMonitor,
    policy: Arc<Mutex<PolicyController>>,
    collector: Arc<MetricsCollector>,
    counters: Arc<SessionCounters>,
    run: Option<MiningRun>,
}

impl MobileXMiner {
    /// Build the engine: detect hardware, fill the RandomX cache.
    ///
    /// Cache construction is the only hard init failure; an absent NPU
    /// or unreadable sensors degrade silently.
    pub fn new(config: MinerConfig) -> Result<Self, MobileXError> {
        Self::with_seed(config, b"mobilex-session")
    }

    /// Build with an explicit cache seed (epoch key in production).
    pub fn with_seed(config: MinerConfig, cache_seed: &[u8]) -> Result<Self, MobileXError> {
        let features = ArmFeatures::detect();
        let cache = Arc::new(RandomxCache::build(cache_seed, config.randomx_cache_bytes)?);
        info!(
            "randomx cache ready: {} MiB light mode, neon={}",
            cache.size_bytes() / (1024 * 1024),
            features.has_neon
        );

        let mut monitor = ThermalMonitor::new(config.poll_interval);
        monitor.set_limits(config.throttle_temp_c, config.max_temp_c);

        Ok(Self {
            npu: Arc::new(NpuEngine::new()),
            npu_enabled: Arc::new(AtomicBool::new(config.npu_enabled)),
            scheduler: Arc::new(HeterogeneousScheduler::detect()),
            verifier: Arc::new(ThermalVerifier::new(
                config.base_frequency_mhz,
                config.thermal_tolerance_pct,
            )),
            monitor,
            policy: Arc::new(Mutex::new(PolicyController::new())),
            collector: Arc::new(MetricsCollector::new()),
            counters: Arc::new(SessionCounters {
                shutdown: AtomicBool::new(false),
                hashes: AtomicU64::new(0),
                inner_nanos: AtomicU64::new(0),
                mobile_nanos: AtomicU64::new(0),
            }),
            run: None,
            config,
            features,
            cache,
        })
    }

    /// Start mining at `intensity`. Returns false when the intensity
    /// is `Disabled` or a session is already running.
    pub fn start_mining(&mut self, intensity: Intensity) -> bool {
        if self.run.is_some() {
            debug!("mining already active");
            return false;
        }
        let (big, little) = intensity.core_allocation();
        if big + little == 0 {
            return false;
        }

        let topology = self.scheduler.topology();
        let big = big.min(topology.big_count());
        let little = little.min(topology.little_count());
        self.scheduler.configure(big, little);
        info!(
            "starting mining: intensity={}, cores={}+{} (bitmap {:#010x})",
            intensity.label(),
            big,
            little,
            self.scheduler.active_core_bitmap()
        );

        self.counters.shutdown.store(false, Ordering::SeqCst);
        self.counters.hashes.store(0, Ordering::SeqCst);
        self.counters.inner_nanos.store(0, Ordering::SeqCst);
        self.counters.mobile_nanos.store(0, Ordering::SeqCst);

        self.monitor.start();

        let mut workers = Vec::with_capacity(big.max(1) + little);
        for worker_id in 0..big.max(1) {
            workers.push(self.spawn_worker(worker_id as u64, true));
        }
        for worker_id in 0..little {
            workers.push(self.spawn_worker((big + worker_id) as u64, false));
        }
        let control = Some(self.spawn_control());

        self.run = Some(MiningRun {
            started: Instant::now(),
            workers,
            control,
        });
        true
    }

    /// Request shutdown and join every thread in the session.
    pub fn stop_mining(&mut self) {
        self.counters.shutdown.store(true, Ordering::SeqCst);
        if let Some(run) = self.run.take() {
            for handle in run.workers {
                let _ = handle.join();
            }
            if let Some(handle) = run.control {
                let _ = handle.join();
            }
            info!(
                "mining stopped after {} hashes",
                self.counters.hashes.load(Ordering::Relaxed)
            );
        }
        self.monitor.stop();
    }

    /// Whether a mining session is active.
    #[must_use]
    pub const fn is_mining(&self) -> bool {
        self.run.is_some()
    }

    /// Total hash rate; 0.0 until mining is running.
    #[must_use]
    pub fn hash_rate(&self) -> f64 {
        self.run.as_ref().map_or(0.0, |run| {
            let elapsed = run.started.elapsed().as_secs_f64();
            if elapsed <= 0.0 {
                return 0.0;
            }
            self.counters.hashes.load(Ordering::Relaxed) as f64 / elapsed
        })
    }

    /// RandomX share of the hash rate, from measured stage time.
    #[must_use]
    pub fn randomx_hash_rate(&self) -> f64 {
        self.hash_rate() * self.stage_fraction().0
    }

    /// Mobile-stage share of the hash rate, from measured stage time.
    #[must_use]
    pub fn mobilex_hash_rate(&self) -> f64 {
        self.hash_rate() * self.stage_fraction().1
    }

    /// Hashes completed this session, including NPU skips.
    #[must_use]
    pub fn hashes_completed(&self) -> u64 {
        self.counters.hashes.load(Ordering::Relaxed)
    }

    /// Latest device temperature.
    #[must_use]
    pub fn current_temp_c(&self) -> f32 {
        self.monitor.current_temp_c()
    }

    /// NPU utilization estimate.
    #[must_use]
    pub fn npu_utilization_pct(&self) -> f32 {
        self.npu.metrics().utilization_pct
    }

    /// Evaluate policy against a fresh power snapshot.
    pub fn evaluate_policy(&self) -> Intensity {
        let snapshot = PowerSnapshot::from_probe(&HardwareProbe::new());
        self.policy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .evaluate(&snapshot)
    }

    /// Manual mining-permission override; reasserted on the next tick.
    pub fn set_mining_allowed(&self, allowed: bool) {
        self.policy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_mining_allowed(allowed);
    }

    /// Generate a thermal proof over `header` and return the u64.
    #[must_use]
    pub fn generate_thermal_proof(&self, header: &[u8]) -> u64 {
        self.verifier.generate(header)
    }

    /// The thermal verifier (proof history, statistics, validation).
    #[must_use]
    pub fn verifier(&self) -> &Arc<ThermalVerifier> {
        &self.verifier
    }

    /// The NPU engine (platform name, metrics).
    #[must_use]
    pub fn npu(&self) -> &Arc<NpuEngine> {
        &self.npu
    }

    /// The scheduler (core bitmap, intensity nudges).
    #[must_use]
    pub fn scheduler(&self) -> &Arc<HeterogeneousScheduler> {
        &self.scheduler
    }

    /// The metrics collector.
    #[must_use]
    pub fn collector(&self) -> &Arc<MetricsCollector> {
        &self.collector
    }

    /// Install a host neural provider (NNAPI / Core ML bridge).
    pub fn configure_npu_provider(&self, provider: Box<dyn NeuralProvider>) {
        self.npu.install_provider(provider);
    }

    /// Enable or disable the periodic NPU substep.
    pub fn set_npu_enabled(&self, enabled: bool) {
        self.npu_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Current metrics snapshot.
    #[must_use]
    pub fn metrics(&self) -> MiningMetrics {
        MiningMetrics {
            hash_rate: self.hash_rate(),
            hashes_completed: self.hashes_completed(),
            temperature_c: self.current_temp_c(),
            power_watts: self.estimate_power_watts(),
            npu_utilization_pct: self.npu_utilization_pct(),
            uptime_secs: self
                .run
                .as_ref()
                .map_or(0.0, |run| run.started.elapsed().as_secs_f64()),
        }
    }

    /// CPU watts from active cores plus the NPU backend estimate.
    #[must_use]
    pub fn estimate_power_watts(&self) -> f64 {
        let cpu = self.scheduler.active_cores() as f64 * WATTS_PER_CORE;
        cpu + f64::from(self.npu.metrics().power_watts)
    }

    fn stage_fraction(&self) -> (f64, f64) {
        let inner = self.counters.inner_nanos.load(Ordering::Relaxed) as f64;
        let mobile = self.counters.mobile_nanos.load(Ordering::Relaxed) as f64;
        let total = inner + mobile;
        if total <= 0.0 {
            return (0.0, 0.0);
        }
        (inner / total, mobile / total)
    }

    fn spawn_worker(&self, worker_id: u64, big: bool) -> JoinHandle<()> {
        let cache = Arc::clone(&self.cache);
        let npu = Arc::clone(&self.npu);
        let npu_enabled = Arc::clone(&self.npu_enabled);
        let scheduler = Arc::clone(&self.scheduler);
        let counters = Arc::clone(&self.counters);
        let collector = Arc::clone(&self.collector);
        let features = self.features;
        let npu_interval = self.config.npu_interval;
        let use_neon = self.config.use_neon;

        std::thread::spawn(move || {
            // Stripe the counter space so each worker's NPU substep
            // schedule is independent and deterministic.
            let mut hasher = MobileXHasher::new(
                cache,
                npu,
                npu_enabled,
                npu_interval,
                &features,
                use_neon,
                worker_id * npu_interval,
            );
            let loop_body = || worker_loop(&mut hasher, worker_id, &counters);
            let ((), bound) = if big {
                scheduler.run_on_big(loop_body)
            } else {
                scheduler.run_on_little(loop_body)
            };
            if !bound {
                collector.record_error("affinity_denied");
            }
        })
    }

    fn spawn_control(&self) -> JoinHandle<()> {
        let counters = Arc::clone(&self.counters);
        let scheduler = Arc::clone(&self.scheduler);
        let verifier = Arc::clone(&self.verifier);
        let collector = Arc::clone(&self.collector);
        let npu = Arc::clone(&self.npu);
        let policy = Arc::clone(&self.policy);
        let interval = self.config.poll_interval;
        let throttle_start = self.config.thermal_throttle_start_c;
        let throttle_stop = self.config.thermal_throttle_stop_c;
        let optimal = self.config.optimal_temp_c;
        let started = Instant::now();

        std::thread::spawn(move || {
            let probe = HardwareProbe::new();
            while !counters.shutdown.load(Ordering::SeqCst) {
                std::thread::sleep(interval);
                if counters.shutdown.load(Ordering::SeqCst) {
                    break;
                }

                let snapshot = PowerSnapshot::from_probe(&probe);
                verifier.update_temperature(snapshot.temp_c);
                let stop = {
                    let mut policy = policy.lock().unwrap_or_else(PoisonError::into_inner);
                    policy.evaluate(&snapshot);
                    policy.should_stop_mining(&snapshot)
                };

                if snapshot.temp_c > throttle_stop || stop {
                    info!(
                        "policy stop: battery={}%, charging={}, temp={:.1}C",
                        snapshot.battery_pct, snapshot.charging, snapshot.temp_c
                    );
                    counters.shutdown.store(true, Ordering::SeqCst);
                    break;
                } else if snapshot.temp_c > throttle_start {
                    scheduler.reduce_intensity();
                } else if snapshot.temp_c < optimal {
                    scheduler.increase_intensity();
                }

                let elapsed = started.elapsed().as_secs_f64();
                let hashes = counters.hashes.load(Ordering::Relaxed);
                collector.record(MiningMetrics {
                    hash_rate: if elapsed > 0.0 { hashes as f64 / elapsed } else { 0.0 },
                    hashes_completed: hashes,
                    temperature_c: snapshot.temp_c,
                    power_watts: scheduler.active_cores() as f64 * WATTS_PER_CORE
                        + f64::from(npu.metrics().power_watts),
                    npu_utilization_pct: npu.metrics().utilization_pct,
                    uptime_secs: elapsed,
                });
            }
        })
    }
}

impl Drop for MobileXMiner {
    fn drop(&mut self) {
        self.stop_mining();
    }
}

/// Per-worker hash loop. Exits within one hash of shutdown; stage
/// time folds into the shared counters as it accrues so the split
/// getters stay live mid-session.
fn worker_loop(hasher: &mut MobileXHasher, worker_id: u64, counters: &SessionCounters) {
    let mut header = [0u8; 32];
    header[..8].copy_from_slice(&worker_id.to_le_bytes());
    let mut nonce: u64 = 0;
    let mut folded = StageNanos::default();

    while !counters.shutdown.load(Ordering::Relaxed) {
        header[8..16].copy_from_slice(&nonce.to_le_bytes());
        let _digest = hasher.compute(&header);
        counters.hashes.fetch_add(1, Ordering::Relaxed);
        nonce = nonce.wrapping_add(1);

        let stages = hasher.stage_nanos();
        counters
            .inner_nanos
            .fetch_add(stages.inner - folded.inner, Ordering::Relaxed);
        counters
            .mobile_nanos
            .fetch_add(stages.mobile - folded.mobile, Ordering::Relaxed);
        folded = stages;
    }
}
