//! FIFO backlog and first-fit placement
//!
//! Only the head of the backlog is ever considered. If it fits nowhere the
//! engine stops, even when a later, smaller task would fit: strict
//! head-of-line blocking keeps admission order equal to arrival order.

use std::collections::VecDeque;

use kyma_core::Task;

use crate::fleet::{Fleet, SlotId};

/// A task admitted onto a VM slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub task: Task,
    pub slot: SlotId,
    /// Time spent queued (placement time − arrival)
    pub wait: f64,
    /// When the task will release its resources
    pub end_time: f64,
}

/// Tasks waiting for capacity, in arrival order
#[derive(Debug, Clone, Default)]
pub struct Backlog {
    queue: VecDeque<Task>,
}

impl Backlog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: Task) {
        self.queue.push_back(task);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn head(&self) -> Option<&Task> {
        self.queue.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.queue.iter()
    }

    /// Queued demand in resource-seconds: Σ max(cpu, mem) × runtime
    pub fn queued_work(&self) -> f64 {
        self.queue.iter().map(Task::work).sum()
    }

    /// Admit tasks from the head onto the fleet until the head does not fit.
    pub fn place(&mut self, now: f64, fleet: &mut Fleet) -> Vec<Placement> {
        let mut placed = Vec::new();

        while let Some(head) = self.queue.front() {
            let Some(slot) = fleet.assign_first_fit(head) else {
                break;
            };
            let Some(task) = self.queue.pop_front() else {
                break;
            };

            placed.push(Placement {
                task,
                slot,
                wait: now - task.arrival,
                end_time: now + task.runtime,
            });
        }

        placed
    }
}
