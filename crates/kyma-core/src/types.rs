//! Core types shared across Kyma components

use serde::{Deserialize, Serialize};

/// A unit of work replayed from a trace.
///
/// Resource requests are fractions of one VM's capacity. Tasks are immutable
/// once loaded; the engine never writes back into them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Arrival time in simulated seconds (trace origin shifted to 0)
    pub arrival: f64,
    /// Service time in seconds
    pub runtime: f64,
    /// CPU request, fraction of one VM
    pub cpu: f64,
    /// Memory request, fraction of one VM
    pub mem: f64,
}

impl Task {
    pub fn new(arrival: f64, runtime: f64, cpu: f64, mem: f64) -> Self {
        Task {
            arrival,
            runtime,
            cpu,
            mem,
        }
    }

    /// Dominant resource share: the binding constraint of the two requests.
    pub fn dominant(&self) -> f64 {
        self.cpu.max(self.mem)
    }

    /// Resource-seconds demand (`dominant × runtime`) used as backlog signal.
    pub fn work(&self) -> f64 {
        self.dominant() * self.runtime
    }

    /// Check the loader contract; returns the first violated constraint.
    pub fn validate(&self) -> Result<(), TaskDefect> {
        if !(self.arrival.is_finite()
            && self.runtime.is_finite()
            && self.cpu.is_finite()
            && self.mem.is_finite())
        {
            return Err(TaskDefect::NonFinite);
        }
        if self.arrival < 0.0 {
            return Err(TaskDefect::NegativeArrival);
        }
        if self.runtime <= 0.0 {
            return Err(TaskDefect::NonPositiveRuntime);
        }
        if self.cpu <= 0.0 || self.cpu > 1.0 {
            return Err(TaskDefect::CpuOutOfRange);
        }
        if self.mem <= 0.0 || self.mem > 1.0 {
            return Err(TaskDefect::MemOutOfRange);
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Reason a task record breaks the input contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskDefect {
    NonFinite,
    NegativeArrival,
    NonPositiveRuntime,
    CpuOutOfRange,
    MemOutOfRange,
}

impl std::fmt::Display for TaskDefect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskDefect::NonFinite => write!(f, "field is not a finite number"),
            TaskDefect::NegativeArrival => write!(f, "arrival time is negative"),
            TaskDefect::NonPositiveRuntime => write!(f, "runtime must be > 0"),
            TaskDefect::CpuOutOfRange => write!(f, "cpu request must be in (0, 1]"),
            TaskDefect::MemOutOfRange => write!(f, "mem request must be in (0, 1]"),
        }
    }
}

/// Fleet state sampled at a control tick, before the policy acts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickSnapshot {
    /// Tick time (seconds)
    pub t: f64,
    /// Active VM count in effect up to this tick
    #[serde(rename = "k")]
    pub active: usize,
    /// Number of tasks waiting in the backlog
    #[serde(rename = "q_tasks")]
    pub queued_tasks: usize,
    /// Backlog in resource-seconds
    #[serde(rename = "q_work")]
    pub queued_work: f64,
}

/// Result of a simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub policy: String,
    pub tasks: usize,
    pub mean_wait_s: f64,
    pub p95_wait_s: f64,
    pub p99_wait_s: f64,
    /// Fraction of waits above 60s
    pub sla60_violation: f64,
    /// Fraction of waits above 120s
    pub sla120_violation: f64,
    /// Integral of the active VM count over the run
    pub vm_seconds: f64,
    /// Time of the last processed event
    pub end_time_s: f64,
    /// Active VM count after the last control decision
    pub final_active_count: usize,
    /// Scale-down requests that stopped early on a busy VM
    pub partial_scale_downs: usize,
    /// One snapshot per control tick
    pub ts: Vec<TickSnapshot>,
}

impl SimulationResult {
    pub fn vm_hours(&self) -> f64 {
        self.vm_seconds / 3600.0
    }

    /// Rebuild the VM-seconds integral from the tick series.
    ///
    /// The active count only changes at ticks, and each snapshot records the
    /// count in effect since the previous tick. The segment after the last
    /// tick runs at `final_active_count` until `end_time_s`.
    pub fn reconstructed_vm_seconds(&self) -> f64 {
        let Some(last) = self.ts.last() else {
            return self.final_active_count as f64 * self.end_time_s;
        };

        let ticks: f64 = self
            .ts
            .windows(2)
            .map(|w| w[1].active as f64 * (w[1].t - w[0].t))
            .sum();

        ticks + self.final_active_count as f64 * (self.end_time_s - last.t)
    }

    /// Drop the time series, keeping the headline numbers.
    pub fn summary(&self) -> ResultSummary {
        ResultSummary {
            policy: self.policy.clone(),
            tasks: self.tasks,
            mean_wait_s: self.mean_wait_s,
            p95_wait_s: self.p95_wait_s,
            p99_wait_s: self.p99_wait_s,
            sla60_violation: self.sla60_violation,
            sla120_violation: self.sla120_violation,
            vm_seconds: self.vm_seconds,
        }
    }
}

/// Headline numbers of a run, without the tick series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub policy: String,
    pub tasks: usize,
    pub mean_wait_s: f64,
    pub p95_wait_s: f64,
    pub p99_wait_s: f64,
    pub sla60_violation: f64,
    pub sla120_violation: f64,
    pub vm_seconds: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(t: f64, active: usize) -> TickSnapshot {
        TickSnapshot {
            t,
            active,
            queued_tasks: 0,
            queued_work: 0.0,
        }
    }

    fn result_with(ts: Vec<TickSnapshot>, end: f64, final_active: usize) -> SimulationResult {
        SimulationResult {
            policy: "static".to_string(),
            tasks: 1,
            mean_wait_s: 0.0,
            p95_wait_s: 0.0,
            p99_wait_s: 0.0,
            sla60_violation: 0.0,
            sla120_violation: 0.0,
            vm_seconds: 0.0,
            end_time_s: end,
            final_active_count: final_active,
            partial_scale_downs: 0,
            ts,
        }
    }

    #[test]
    fn test_task_work_uses_dominant_resource() {
        let task = Task::new(0.0, 100.0, 0.2, 0.5);
        assert_eq!(task.dominant(), 0.5);
        assert_eq!(task.work(), 50.0);
    }

    #[test]
    fn test_task_validation() {
        assert!(Task::new(0.0, 10.0, 1.0, 1.0).is_valid());
        assert_eq!(
            Task::new(0.0, 0.0, 0.5, 0.5).validate(),
            Err(TaskDefect::NonPositiveRuntime)
        );
        assert_eq!(
            Task::new(0.0, 1.0, 0.0, 0.5).validate(),
            Err(TaskDefect::CpuOutOfRange)
        );
        assert_eq!(
            Task::new(0.0, 1.0, 0.5, 1.5).validate(),
            Err(TaskDefect::MemOutOfRange)
        );
        assert_eq!(
            Task::new(-1.0, 1.0, 0.5, 0.5).validate(),
            Err(TaskDefect::NegativeArrival)
        );
        assert_eq!(
            Task::new(0.0, f64::NAN, 0.5, 0.5).validate(),
            Err(TaskDefect::NonFinite)
        );
    }

    #[test]
    fn test_reconstructed_vm_seconds() {
        // k=2 on [0,60), k=4 on [60,120), k=3 on [120,150)
        let result = result_with(
            vec![snapshot(0.0, 2), snapshot(60.0, 2), snapshot(120.0, 4)],
            150.0,
            3,
        );
        assert_eq!(result.reconstructed_vm_seconds(), 120.0 + 240.0 + 90.0);
    }

    #[test]
    fn test_snapshot_serializes_with_short_keys() {
        let json = serde_json::to_value(snapshot(60.0, 7)).unwrap();
        assert_eq!(json["k"], 7);
        assert_eq!(json["q_tasks"], 0);
        assert!(json.get("active").is_none());
    }

    #[test]
    fn test_summary_drops_series() {
        let result = result_with(vec![snapshot(0.0, 1)], 10.0, 1);
        let summary = result.summary();
        assert_eq!(summary.policy, "static");
        assert_eq!(summary.tasks, 1);
    }
}
