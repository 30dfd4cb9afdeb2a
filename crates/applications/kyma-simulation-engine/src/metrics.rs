//! Run metrics: wait samples, VM-time integral and control-tick snapshots

use kyma_core::{SimulationResult, TickSnapshot};

/// Waits above this many seconds count as a 60s SLA violation
pub const SLA_60_SECS: f64 = 60.0;

/// Waits above this many seconds count as a 120s SLA violation
pub const SLA_120_SECS: f64 = 120.0;

/// Accumulates everything a run reports
#[derive(Debug, Clone, Default)]
pub struct MetricsAggregator {
    waits: Vec<f64>,
    vm_seconds: f64,
    last_t: f64,
    snapshots: Vec<TickSnapshot>,
    partial_scale_downs: usize,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Charge the active count for the time elapsed since the last advance
    pub fn advance(&mut self, to_t: f64, active_count: usize) {
        let dt = to_t - self.last_t;
        if dt > 0.0 {
            self.vm_seconds += active_count as f64 * dt;
            self.last_t = to_t;
        }
    }

    pub fn record_wait(&mut self, wait: f64) {
        self.waits.push(wait);
    }

    pub fn record_snapshot(&mut self, snapshot: TickSnapshot) {
        self.snapshots.push(snapshot);
    }

    pub fn record_partial_scale_down(&mut self) {
        self.partial_scale_downs += 1;
    }

    pub fn vm_seconds(&self) -> f64 {
        self.vm_seconds
    }

    pub fn waits(&self) -> &[f64] {
        &self.waits
    }

    pub fn snapshots(&self) -> &[TickSnapshot] {
        &self.snapshots
    }

    /// Produce the result record for the run
    pub fn finish(
        self,
        policy: &str,
        tasks: usize,
        end_time_s: f64,
        final_active_count: usize,
    ) -> SimulationResult {
        let mut waits = if self.waits.is_empty() {
            vec![0.0]
        } else {
            self.waits
        };
        let n = waits.len() as f64;

        let mean_wait_s = waits.iter().sum::<f64>() / n;
        let sla60_violation = waits.iter().filter(|w| **w > SLA_60_SECS).count() as f64 / n;
        let sla120_violation = waits.iter().filter(|w| **w > SLA_120_SECS).count() as f64 / n;

        waits.sort_by(f64::total_cmp);

        SimulationResult {
            policy: policy.to_string(),
            tasks,
            mean_wait_s,
            p95_wait_s: quantile_sorted(&waits, 0.95),
            p99_wait_s: quantile_sorted(&waits, 0.99),
            sla60_violation,
            sla120_violation,
            vm_seconds: self.vm_seconds,
            end_time_s,
            final_active_count,
            partial_scale_downs: self.partial_scale_downs,
            ts: self.snapshots,
        }
    }
}

/// Linear-interpolation quantile over an ascending, non-empty sample.
///
/// Position `h = (n - 1) q`; the result interpolates between the samples at
/// `floor(h)` and `ceil(h)`.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let h = (n - 1) as f64 * q.clamp(0.0, 1.0);
            let lo = h.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            let frac = h - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}
