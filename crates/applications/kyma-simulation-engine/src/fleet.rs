//! VM fleet: slot arena and the scaler that resizes its active range
//!
//! ```text
//! slots:   [ s0 | s1 | s2 | s3 | s4 | s5 ]   append-only arena
//! active:  [ s0 , s1 , s4 , s5 ]             placement scans this, in order
//!                       ^ s2, s3 were idle when scaled down; never reused
//! ```
//!
//! Completion events hold a [`SlotId`], so a slot must stay addressable for as
//! long as any task runs on it. Shrinking therefore only pops handles off the
//! tail of the active list, and only while the popped slot is idle. Growing
//! appends brand-new slots.

use kyma_core::Task;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SimulationError};

/// Capacity of one VM in each resource dimension
pub const VM_CAPACITY: f64 = 1.0;

/// Stable handle of a VM slot in the fleet arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotId(pub usize);

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "vm-{}", self.0)
    }
}

/// Resource usage of a single unit-capacity VM
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VmSlot {
    pub used_cpu: f64,
    pub used_mem: f64,
    /// Tasks currently running on this slot
    pub running: usize,
}

impl VmSlot {
    /// Check whether the task fits in the remaining capacity
    pub fn can_fit(&self, task: &Task) -> bool {
        self.used_cpu + task.cpu <= VM_CAPACITY && self.used_mem + task.mem <= VM_CAPACITY
    }

    /// Attempt to assign a task to this slot
    /// Returns true if assignment succeeded, false if task doesn't fit
    pub fn assign_task(&mut self, task: &Task) -> bool {
        if !self.can_fit(task) {
            return false;
        }
        self.used_cpu += task.cpu;
        self.used_mem += task.mem;
        self.running += 1;
        true
    }

    /// Release the resources of a finished task
    pub fn release(&mut self, cpu: f64, mem: f64) {
        debug_assert!(self.running > 0, "release on a slot with no running task");
        self.running = self.running.saturating_sub(1);
        if self.running == 0 {
            // Drop float residue so an empty slot reads as exactly idle
            self.used_cpu = 0.0;
            self.used_mem = 0.0;
        } else {
            self.used_cpu = (self.used_cpu - cpu).max(0.0);
            self.used_mem = (self.used_mem - mem).max(0.0);
        }
    }

    pub fn is_idle(&self) -> bool {
        self.used_cpu == 0.0 && self.used_mem == 0.0
    }
}

/// Inclusive bounds on the active VM count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleBounds {
    pub k_min: usize,
    pub k_max: usize,
}

impl ScaleBounds {
    pub fn new(k_min: usize, k_max: usize) -> Result<Self> {
        if k_min == 0 {
            return Err(SimulationError::config("k_min must be at least 1"));
        }
        if k_min > k_max {
            return Err(SimulationError::config(format!(
                "k_min ({k_min}) exceeds k_max ({k_max})"
            )));
        }
        Ok(Self { k_min, k_max })
    }

    /// Clamp a (possibly negative) requested count into the bounds
    pub fn clamp(&self, requested: i64) -> usize {
        let lo = self.k_min as i64;
        let hi = self.k_max as i64;
        requested.max(lo).min(hi) as usize
    }
}

/// What a resize request actually did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleOutcome {
    /// Active count before the request
    pub previous: usize,
    /// Raw requested count
    pub requested: i64,
    /// Requested count after clamping to bounds
    pub target: usize,
    /// Active count after the request
    pub current: usize,
}

impl ScaleOutcome {
    /// A scale-down that stopped on a busy VM before reaching its target
    pub fn is_partial(&self) -> bool {
        self.current != self.target
    }

    pub fn changed(&self) -> bool {
        self.current != self.previous
    }
}

/// Append-only arena of VM slots with a resizable active prefix
#[derive(Debug, Clone)]
pub struct Fleet {
    slots: Vec<VmSlot>,
    active: Vec<SlotId>,
    bounds: ScaleBounds,
}

impl Fleet {
    /// Create a fleet with `initial` fresh active slots.
    ///
    /// The initial count is not clamped: a static run may start outside the
    /// bounds a scaling policy would use.
    pub fn new(initial: usize, bounds: ScaleBounds) -> Self {
        let mut fleet = Fleet {
            slots: Vec::with_capacity(initial),
            active: Vec::with_capacity(initial),
            bounds,
        };
        fleet.grow(initial);
        fleet
    }

    pub fn bounds(&self) -> ScaleBounds {
        self.bounds
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Every slot ever created, active or not
    pub fn slots(&self) -> &[VmSlot] {
        &self.slots
    }

    pub fn slot(&self, id: SlotId) -> &VmSlot {
        &self.slots[id.0]
    }

    /// Active slot handles in placement scan order
    pub fn active_ids(&self) -> &[SlotId] {
        &self.active
    }

    pub fn is_active(&self, id: SlotId) -> bool {
        // Handles are appended in increasing order, so the list stays sorted
        self.active.binary_search(&id).is_ok()
    }

    /// First active slot (in scan order) with room for the task
    pub fn first_fit(&self, task: &Task) -> Option<SlotId> {
        self.active
            .iter()
            .copied()
            .find(|id| self.slots[id.0].can_fit(task))
    }

    /// Place the task on the first slot that fits it
    pub fn assign_first_fit(&mut self, task: &Task) -> Option<SlotId> {
        let id = self.first_fit(task)?;
        let assigned = self.slots[id.0].assign_task(task);
        debug_assert!(assigned);
        Some(id)
    }

    /// Release a finished task's resources from its slot
    pub fn release(&mut self, id: SlotId, cpu: f64, mem: f64) {
        self.slots[id.0].release(cpu, mem);
    }

    /// Move the active count toward `requested`, clamped to the bounds.
    ///
    /// Growth appends fresh slots. Shrinking deactivates idle slots from the
    /// tail and stops at the first busy one, so the result may land above the
    /// target; see [`ScaleOutcome::is_partial`].
    pub fn scale_to(&mut self, requested: i64) -> ScaleOutcome {
        let previous = self.active.len();
        let target = self.bounds.clamp(requested);

        if target > previous {
            self.grow(target - previous);
        } else {
            while self.active.len() > target {
                let Some(&tail) = self.active.last() else {
                    break;
                };
                if !self.slots[tail.0].is_idle() {
                    break;
                }
                self.active.pop();
            }
        }

        let outcome = ScaleOutcome {
            previous,
            requested,
            target,
            current: self.active.len(),
        };

        if outcome.is_partial() {
            debug!(
                previous,
                target,
                current = outcome.current,
                "Scale-down stopped at a busy VM"
            );
        }

        outcome
    }

    fn grow(&mut self, count: usize) {
        for _ in 0..count {
            let id = SlotId(self.slots.len());
            self.slots.push(VmSlot::default());
            self.active.push(id);
        }
    }
}
