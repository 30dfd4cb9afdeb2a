//! Discrete-event simulator for autoscaling policy replay
//!
//! Replays task arrivals against a fleet of unit-capacity VMs. Time jumps to
//! the earliest of: next arrival, next completion, next control tick. At each
//! instant the work happens in a fixed order:
//!
//! ```text
//! t ──┬── 1. charge VM-seconds for [last_t, t)
//!     ├── 2. release every completion due at t
//!     ├── 3. enqueue every arrival due at t
//!     ├── 4. place from the backlog head (first-fit, FIFO)
//!     ├── 5. on a control tick: snapshot, decide, rescale
//!     └── 6. stop once nothing is queued, running or still to arrive
//! ```
//!
//! Capacity freed at `t` is visible to tasks arriving at `t`, and a policy at
//! `t` sees the backlog after that instant's arrivals and placements.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use kyma_core::{SimulationResult, Task, TickSnapshot};
use tracing::{debug, info, trace};

use crate::error::{Result, SimulationError};
use crate::fleet::{Fleet, ScaleBounds, SlotId};
use crate::metrics::MetricsAggregator;
use crate::placement::Backlog;
use crate::policies::{Decision, ScalingPolicy};

/// Event times closer than this are treated as simultaneous (seconds)
pub const TIME_EPSILON: f64 = 1e-9;

/// Fleet sizing and control cadence for a run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlSettings {
    pub bounds: ScaleBounds,
    /// Active VM count at t = 0
    pub initial_active: usize,
    /// Seconds between control ticks
    pub delta: f64,
}

impl ControlSettings {
    pub fn new(bounds: ScaleBounds, initial_active: usize, delta: f64) -> Result<Self> {
        if initial_active == 0 {
            return Err(SimulationError::config("initial active count must be at least 1"));
        }
        if !delta.is_finite() || delta <= 0.0 {
            return Err(SimulationError::config(format!(
                "control interval must be a positive number of seconds, got {delta}"
            )));
        }
        Ok(Self {
            bounds,
            initial_active,
            delta,
        })
    }
}

/// A placed task waiting to release its resources
#[derive(Debug, Clone, Copy)]
struct PendingCompletion {
    end_time: f64,
    /// Insertion order, breaks end-time ties
    seq: u64,
    slot: SlotId,
    cpu: f64,
    mem: f64,
}

// Priority queue orders by (end_time, seq), earliest first
impl Ord for PendingCompletion {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse comparison for min-heap (BinaryHeap is max-heap by default)
        other
            .end_time
            .total_cmp(&self.end_time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for PendingCompletion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for PendingCompletion {}

impl PartialEq for PendingCompletion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

/// Discrete-event simulator over a borrowed, arrival-ordered task slice
pub struct Simulator<'a> {
    tasks: &'a [Task],
    next_task: usize,
    now: f64,
    next_tick: f64,
    delta: f64,
    backlog: Backlog,
    completions: BinaryHeap<PendingCompletion>,
    next_seq: u64,
    fleet: Fleet,
    policy: ScalingPolicy,
    metrics: MetricsAggregator,
    finished: bool,
}

impl<'a> Simulator<'a> {
    /// Create a new simulator. Fails on an empty workload.
    pub fn new(tasks: &'a [Task], policy: ScalingPolicy, settings: ControlSettings) -> Result<Self> {
        if tasks.is_empty() {
            return Err(SimulationError::invalid_input("No tasks provided"));
        }
        debug_assert!(tasks.iter().all(Task::is_valid), "malformed task in input");
        debug_assert!(
            tasks.windows(2).all(|w| w[0].arrival <= w[1].arrival),
            "tasks not sorted by arrival"
        );

        Ok(Simulator {
            tasks,
            next_task: 0,
            now: 0.0,
            next_tick: 0.0,
            delta: settings.delta,
            backlog: Backlog::new(),
            completions: BinaryHeap::new(),
            next_seq: 0,
            fleet: Fleet::new(settings.initial_active, settings.bounds),
            policy,
            metrics: MetricsAggregator::new(),
            finished: false,
        })
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn fleet(&self) -> &Fleet {
        &self.fleet
    }

    pub fn backlog(&self) -> &Backlog {
        &self.backlog
    }

    pub fn pending_completions(&self) -> usize {
        self.completions.len()
    }

    pub fn metrics(&self) -> &MetricsAggregator {
        &self.metrics
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Run the simulation to completion
    pub fn run(mut self) -> SimulationResult {
        info!(
            policy = self.policy.name(),
            tasks = self.tasks.len(),
            initial_active = self.fleet.active_count(),
            k_min = self.fleet.bounds().k_min,
            k_max = self.fleet.bounds().k_max,
            delta = self.delta,
            "Starting simulation"
        );

        while self.step() {}

        let result = self.finish();
        info!(
            policy = %result.policy,
            vm_hours = result.vm_hours(),
            mean_wait_s = result.mean_wait_s,
            p95_wait_s = result.p95_wait_s,
            sla60 = result.sla60_violation,
            "Simulation complete"
        );
        result
    }

    /// Process one event instant. Returns false once the run is over.
    pub fn step(&mut self) -> bool {
        if self.finished {
            return false;
        }

        let Some(t) = self.next_event_time() else {
            self.finished = true;
            return false;
        };

        self.metrics.advance(t, self.fleet.active_count());
        self.now = t;

        self.release_completions();
        self.admit_arrivals();
        self.place_backlog();

        if (self.now - self.next_tick).abs() <= TIME_EPSILON {
            self.control_tick();
            self.next_tick += self.delta;
        }

        if self.is_drained() {
            self.finished = true;
        }
        !self.finished
    }

    /// Produce the result record (valid at any point, normally after `run`)
    pub fn finish(self) -> SimulationResult {
        let end_time = self.now;
        let final_active = self.fleet.active_count();
        self.metrics
            .finish(self.policy.name(), self.tasks.len(), end_time, final_active)
    }

    fn next_event_time(&self) -> Option<f64> {
        let next_arrival = self.tasks.get(self.next_task).map(|t| t.arrival);
        let next_finish = self.completions.peek().map(|c| c.end_time);

        [next_arrival, next_finish, Some(self.next_tick)]
            .into_iter()
            .flatten()
            .filter(|t| t.is_finite())
            .min_by(f64::total_cmp)
    }

    fn release_completions(&mut self) {
        while let Some(done) = self.completions.peek() {
            if done.end_time > self.now + TIME_EPSILON {
                break;
            }
            let Some(done) = self.completions.pop() else {
                break;
            };
            self.fleet.release(done.slot, done.cpu, done.mem);
        }
    }

    fn admit_arrivals(&mut self) {
        while let Some(task) = self.tasks.get(self.next_task) {
            if task.arrival > self.now + TIME_EPSILON {
                break;
            }
            self.backlog.push(*task);
            self.next_task += 1;
        }
    }

    fn place_backlog(&mut self) {
        for placement in self.backlog.place(self.now, &mut self.fleet) {
            self.metrics.record_wait(placement.wait);
            self.completions.push(PendingCompletion {
                end_time: placement.end_time,
                seq: self.next_seq,
                slot: placement.slot,
                cpu: placement.task.cpu,
                mem: placement.task.mem,
            });
            self.next_seq += 1;
        }
    }

    fn control_tick(&mut self) {
        let active = self.fleet.active_count();
        let queued_work = self.backlog.queued_work();

        self.metrics.record_snapshot(TickSnapshot {
            t: self.now,
            active,
            queued_tasks: self.backlog.len(),
            queued_work,
        });

        let Decision::Step(step) = self.policy.decide(active, queued_work) else {
            return;
        };

        let outcome = self.fleet.scale_to(active as i64 + step);
        if outcome.changed() {
            debug!(
                t = self.now,
                queued_work,
                from = outcome.previous,
                to = outcome.current,
                "Rescaled fleet"
            );
        } else {
            trace!(t = self.now, queued_work, active, "No fleet change");
        }
        if outcome.is_partial() {
            self.metrics.record_partial_scale_down();
        }
    }

    fn is_drained(&self) -> bool {
        self.next_task >= self.tasks.len() && self.backlog.is_empty() && self.completions.is_empty()
    }
}
