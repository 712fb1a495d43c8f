//! Resource snapshots and budget checks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use sysinfo::System;

use nd_domain::config::MonitorConfig;
use crate::LeakVerdict;
use nd_domain::error::{Error, Result};

use crate::leak::LeakState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GPU probe
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One VRAM sample from the accelerator, in megabytes.
#[derive(Debug, Clone, Copy)]
pub struct GpuSample {
    pub used_mb: f64,
    pub total_mb: f64,
}

/// Pluggable VRAM sampler. Hosts without an accelerator inject no probe
/// and every GPU field reads as absent.
pub trait GpuProbe: Send + Sync {
    fn sample(&self) -> Option<GpuSample>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pressure class
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Swap pressure classification used by the policy engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureClass {
    None,
    Moderate,
    Critical,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Status snapshot
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A point-in-time resource snapshot, also served by `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceStatus {
    pub ram_percent: f64,
    pub swap_mb: u64,
    pub gpu_vram_gb: Option<f64>,
    pub gpu_vram_percent: Option<f64>,
    pub healthy: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Resource monitor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Samples system memory, swap, and (if a probe is present) GPU VRAM.
///
/// The degraded flag is the only process-wide atomic state: it is set by
/// the leak watch and read by the policy engine on every request.
pub struct ResourceMonitor {
    config: MonitorConfig,
    system: Mutex<System>,
    gpu: Option<Arc<dyn GpuProbe>>,
    degraded: AtomicBool,
    leak: Mutex<LeakState>,
}

impl ResourceMonitor {
    pub fn new(config: MonitorConfig, gpu: Option<Arc<dyn GpuProbe>>) -> Self {
        Self {
            config,
            system: Mutex::new(System::new()),
            gpu,
            degraded: AtomicBool::new(false),
            leak: Mutex::new(LeakState::default()),
        }
    }

    /// Current resource snapshot. Healthy means RAM and VRAM are both
    /// under their ceilings.
    pub fn status(&self) -> ResourceStatus {
        let (ram_percent, swap_mb) = {
            let mut system = self.system.lock();
            system.refresh_memory();
            let total = system.total_memory().max(1);
            let ram_percent = system.used_memory() as f64 / total as f64 * 100.0;
            let swap_mb = system.used_swap() / (1024 * 1024);
            (ram_percent, swap_mb)
        };

        let gpu_sample = self.gpu.as_ref().and_then(|p| p.sample());
        let gpu_vram_gb = gpu_sample.map(|s| s.used_mb / 1024.0);
        let gpu_vram_percent = gpu_sample
            .filter(|s| s.total_mb > 0.0)
            .map(|s| s.used_mb / s.total_mb * 100.0);

        let healthy = ram_percent <= self.config.max_ram_percent
            && gpu_vram_percent.map_or(true, |p| p <= self.config.max_vram_percent);

        ResourceStatus {
            ram_percent,
            swap_mb,
            gpu_vram_gb,
            gpu_vram_percent,
            healthy,
        }
    }

    /// Reject a task when the system is unhealthy, or when a GPU-bound
    /// task would push VRAM past its stricter ceiling.
    pub fn check_budget(&self, task_name: &str, requires_gpu: bool) -> Result<()> {
        let status = self.status();

        if !status.healthy {
            let msg = format!(
                "cannot schedule '{task_name}': ram={:.1}%, vram={}",
                status.ram_percent,
                status
                    .gpu_vram_percent
                    .map(|p| format!("{p:.1}%"))
                    .unwrap_or_else(|| "n/a".into()),
            );
            tracing::error!(task = task_name, "resource budget exceeded");
            return Err(Error::ResourceExceeded(msg));
        }

        if requires_gpu {
            if let Some(pct) = status.gpu_vram_percent {
                if pct > self.config.gpu_task_vram_percent {
                    tracing::warn!(task = task_name, vram_percent = pct, "gpu constrained");
                    return Err(Error::ResourceExceeded(format!(
                        "gpu constrained: rejecting '{task_name}' at {pct:.1}% VRAM"
                    )));
                }
            }
        }

        tracing::debug!(task = task_name, ram_percent = status.ram_percent, "budget allowed");
        Ok(())
    }

    /// Classify swap pressure for the policy engine.
    pub fn pressure_class(&self, swap_mb: u64) -> PressureClass {
        if swap_mb > self.config.swap_critical_mb {
            PressureClass::Critical
        } else if swap_mb >= self.config.swap_moderate_mb {
            PressureClass::Moderate
        } else {
            PressureClass::None
        }
    }

    /// Current swap pressure from a fresh sample.
    pub fn current_pressure(&self) -> PressureClass {
        let swap_mb = self.status().swap_mb;
        self.pressure_class(swap_mb)
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    // ── Leak watch ─────────────────────────────────────────────────

    /// Take a pre-request VRAM sample.
    pub fn sample_before(&self) {
        if let Some(sample) = self.gpu.as_ref().and_then(|p| p.sample()) {
            self.leak.lock().record_before(sample.used_mb);
        }
    }

    /// Take a post-request sample and update the leak streak. Three
    /// consecutive growths above the threshold flip the degraded flag;
    /// one clean request clears the streak and the flag.
    pub fn sample_after(&self) {
        let Some(sample) = self.gpu.as_ref().and_then(|p| p.sample()) else {
            return;
        };
        let verdict = self
            .leak
            .lock()
            .record_after(sample.used_mb, self.config.leak_threshold_mb);

        match verdict {
            LeakVerdict::Degraded { streak, delta_mb } => {
                if !self.degraded.swap(true, Ordering::AcqRel) {
                    tracing::error!(
                        streak,
                        delta_mb,
                        "VRAM leak streak exceeded — entering degraded mode"
                    );
                }
            }
            LeakVerdict::Suspected { streak, delta_mb } => {
                tracing::warn!(streak, delta_mb, "VRAM grew during request");
            }
            LeakVerdict::Recovered { was_streak } => {
                if was_streak > 0 {
                    tracing::info!(was_streak, "VRAM stable — leak streak reset");
                }
                self.degraded.store(false, Ordering::Release);
            }
            LeakVerdict::NoBaseline => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    /// Scripted probe returning a queue of VRAM readings.
    struct ScriptedProbe {
        readings: PlMutex<Vec<f64>>,
        total_mb: f64,
    }

    impl ScriptedProbe {
        fn new(readings: Vec<f64>, total_mb: f64) -> Arc<Self> {
            Arc::new(Self {
                readings: PlMutex::new(readings),
                total_mb,
            })
        }
    }

    impl GpuProbe for ScriptedProbe {
        fn sample(&self) -> Option<GpuSample> {
            let mut readings = self.readings.lock();
            if readings.is_empty() {
                return None;
            }
            Some(GpuSample {
                used_mb: readings.remove(0),
                total_mb: self.total_mb,
            })
        }
    }

    fn monitor_with(readings: Vec<f64>) -> ResourceMonitor {
        ResourceMonitor::new(
            MonitorConfig::default(),
            Some(ScriptedProbe::new(readings, 8192.0)),
        )
    }

    #[test]
    fn pressure_class_thresholds() {
        let monitor = ResourceMonitor::new(MonitorConfig::default(), None);
        assert_eq!(monitor.pressure_class(0), PressureClass::None);
        assert_eq!(monitor.pressure_class(1499), PressureClass::None);
        assert_eq!(monitor.pressure_class(1500), PressureClass::Moderate);
        assert_eq!(monitor.pressure_class(2500), PressureClass::Moderate);
        assert_eq!(monitor.pressure_class(2501), PressureClass::Critical);
    }

    #[test]
    fn two_growths_do_not_degrade() {
        // before/after pairs: +101, +101 — only two consecutive growths.
        let monitor = monitor_with(vec![1000.0, 1101.0, 1101.0, 1202.0]);
        for _ in 0..2 {
            monitor.sample_before();
            monitor.sample_after();
        }
        assert!(!monitor.is_degraded());
    }

    #[test]
    fn three_growths_flip_degraded() {
        let monitor = monitor_with(vec![
            1000.0, 1101.0, // +101
            1101.0, 1202.0, // +101
            1202.0, 1303.0, // +101
        ]);
        for _ in 0..3 {
            monitor.sample_before();
            monitor.sample_after();
        }
        assert!(monitor.is_degraded());
    }

    #[test]
    fn clean_request_clears_degraded() {
        let monitor = monitor_with(vec![
            1000.0, 1101.0,
            1101.0, 1202.0,
            1202.0, 1303.0,
            1303.0, 1303.0, // stable
        ]);
        for _ in 0..3 {
            monitor.sample_before();
            monitor.sample_after();
        }
        assert!(monitor.is_degraded());

        monitor.sample_before();
        monitor.sample_after();
        assert!(!monitor.is_degraded());
    }

    #[test]
    fn growth_below_threshold_resets_streak() {
        let monitor = monitor_with(vec![
            1000.0, 1101.0, // +101 (streak 1)
            1101.0, 1150.0, // +49 (reset)
            1150.0, 1251.0, // +101 (streak 1)
            1251.0, 1352.0, // +101 (streak 2)
        ]);
        for _ in 0..4 {
            monitor.sample_before();
            monitor.sample_after();
        }
        assert!(!monitor.is_degraded());
    }

    #[test]
    fn no_gpu_probe_reports_absent_vram() {
        let monitor = ResourceMonitor::new(MonitorConfig::default(), None);
        let status = monitor.status();
        assert!(status.gpu_vram_gb.is_none());
        assert!(status.gpu_vram_percent.is_none());
        // Leak watch is inert without a probe.
        monitor.sample_before();
        monitor.sample_after();
        assert!(!monitor.is_degraded());
    }
}
