//! Workload preparation: prepared-trace CSV loading, sampling and synthesis
//!
//! The engine consumes tasks sorted by arrival with the first arrival at 0.
//! Everything here produces exactly that shape.
//!
//! Trace tables are expected to be already cleaned and windowed, with columns:
//!
//! ```text
//! arrival_time_s,runtime_s,cpu_req,mem_req
//! 1024.5,37.0,0.0625,0.0159
//! ```

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};
use kyma_core::Task;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp, LogNormal, Uniform};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, SimulationError};

/// One row of a prepared trace table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub arrival_time_s: f64,
    pub runtime_s: f64,
    pub cpu_req: f64,
    pub mem_req: f64,
}

impl From<TaskRecord> for Task {
    fn from(record: TaskRecord) -> Self {
        Task::new(
            record.arrival_time_s,
            record.runtime_s,
            record.cpu_req,
            record.mem_req,
        )
    }
}

impl From<&Task> for TaskRecord {
    fn from(task: &Task) -> Self {
        TaskRecord {
            arrival_time_s: task.arrival,
            runtime_s: task.runtime,
            cpu_req: task.cpu,
            mem_req: task.mem,
        }
    }
}

/// How the loader treats rows that break the task contract
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Skip invalid rows (with a warning) instead of failing
    pub drop_invalid: bool,
}

/// Load a prepared trace table from a CSV file
pub fn load_csv(path: impl AsRef<Path>, options: LoadOptions) -> Result<Vec<Task>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let tasks = read_csv(file, options)?;
    info!(path = %path.display(), tasks = tasks.len(), "Loaded workload");
    Ok(tasks)
}

/// Read a prepared trace table from any reader
pub fn read_csv<R: Read>(reader: R, options: LoadOptions) -> Result<Vec<Task>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut tasks = Vec::new();
    let mut dropped = 0usize;

    for (idx, line) in rdr.deserialize::<TaskRecord>().enumerate() {
        let task = Task::from(line?);
        match task.validate() {
            Ok(()) => tasks.push(task),
            Err(_) if options.drop_invalid => dropped += 1,
            // Row numbers are 1-based and exclude the header
            Err(reason) => return Err(SimulationError::InvalidTask { row: idx + 1, reason }),
        }
    }

    if dropped > 0 {
        warn!(dropped, kept = tasks.len(), "Dropped invalid task rows");
    }

    normalize(tasks)
}

/// Sort by arrival (stable) and shift the time origin to the first arrival.
pub fn normalize(mut tasks: Vec<Task>) -> Result<Vec<Task>> {
    if tasks.is_empty() {
        return Err(SimulationError::invalid_input("workload contains no tasks"));
    }

    tasks.sort_by(|a, b| a.arrival.total_cmp(&b.arrival));
    let t0 = tasks[0].arrival;
    for task in &mut tasks {
        task.arrival -= t0;
    }
    Ok(tasks)
}

/// Write tasks as a prepared trace table
pub fn write_csv<W: Write>(writer: W, tasks: &[Task]) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(true).from_writer(writer);
    for task in tasks {
        wtr.serialize(TaskRecord::from(task))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Keep each task independently with probability `fraction`, seeded.
///
/// Order is preserved and the result is re-normalized to start at 0.
pub fn sample(tasks: &[Task], fraction: f64, seed: u64) -> Result<Vec<Task>> {
    if !(fraction > 0.0 && fraction <= 1.0) {
        return Err(SimulationError::config(format!(
            "sample fraction must be in (0, 1], got {fraction}"
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let kept: Vec<Task> = tasks
        .iter()
        .filter(|_| rng.gen_bool(fraction))
        .copied()
        .collect();

    normalize(kept)
}

/// Parameters of a seeded synthetic workload
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticWorkload {
    /// Number of tasks to generate
    pub tasks: usize,
    /// Mean arrivals per second (Poisson process)
    pub arrival_rate: f64,
    /// Median runtime in seconds (log-normal)
    pub median_runtime_s: f64,
    /// Log-space standard deviation of runtimes
    pub runtime_sigma: f64,
    /// Upper bound on per-task cpu/mem requests
    pub max_request: f64,
    pub seed: u64,
}

impl Default for SyntheticWorkload {
    fn default() -> Self {
        Self {
            tasks: 1000,
            arrival_rate: 0.5,
            median_runtime_s: 120.0,
            runtime_sigma: 1.0,
            max_request: 0.5,
            seed: 7,
        }
    }
}

impl SyntheticWorkload {
    /// Generate tasks; the same parameters always produce the same workload
    pub fn generate(&self) -> Result<Vec<Task>> {
        if self.tasks == 0 {
            return Err(SimulationError::invalid_input("synthetic workload needs at least one task"));
        }
        if !(self.max_request > 0.0 && self.max_request <= 1.0) {
            return Err(SimulationError::config(format!(
                "max request must be in (0, 1], got {}",
                self.max_request
            )));
        }

        if !(self.arrival_rate.is_finite() && self.arrival_rate > 0.0) {
            return Err(SimulationError::config(format!(
                "arrival rate must be positive, got {}",
                self.arrival_rate
            )));
        }

        if !(self.median_runtime_s.is_finite() && self.median_runtime_s > 0.0) {
            return Err(SimulationError::config(format!(
                "median runtime must be positive, got {}",
                self.median_runtime_s
            )));
        }
        if !(self.runtime_sigma.is_finite() && self.runtime_sigma >= 0.0) {
            return Err(SimulationError::config(format!(
                "runtime sigma must be non-negative, got {}",
                self.runtime_sigma
            )));
        }

        let inter_arrival = Exp::new(self.arrival_rate)
            .map_err(|e| SimulationError::config(format!("arrival rate: {e}")))?;
        let runtime = LogNormal::new(self.median_runtime_s.ln(), self.runtime_sigma)
            .map_err(|e| SimulationError::config(format!("runtime distribution: {e}")))?;
        // Requests are at least 1% of a VM so every task has a real footprint
        let request = Uniform::new_inclusive(0.01f64.min(self.max_request), self.max_request);

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut now = 0.0;
        let mut tasks = Vec::with_capacity(self.tasks);

        for i in 0..self.tasks {
            if i > 0 {
                now += inter_arrival.sample(&mut rng);
            }
            // Round to whole seconds like trace timestamps; keep runtimes positive
            let runtime_s = runtime.sample(&mut rng).round().max(1.0);
            tasks.push(Task::new(
                now,
                runtime_s,
                request.sample(&mut rng),
                request.sample(&mut rng),
            ));
        }

        Ok(tasks)
    }
}
