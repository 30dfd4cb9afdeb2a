//! Kyma Simulation Engine
//!
//! Discrete-event replay of workload traces for comparing VM autoscaling
//! policies.
//!
//! ## Architecture
//!
//! ```text
//! workload ──► Simulator (event loop) ──► MetricsAggregator ──► SimulationResult
//!                 │        │
//!                 │        └── control tick ──► ScalingPolicy ──► Fleet::scale_to
//!                 └── Backlog::place (FIFO, first-fit) ──► Fleet slots
//! ```
//!
//! Policies:
//! - Static: fixed fleet size
//! - Threshold: step up/down on queued-work thresholds
//! - TableLookup: externally trained `(active, backlog bin) -> step` table

pub mod artifact;
pub mod config;
pub mod error;
pub mod experiments;
pub mod fleet;
pub mod metrics;
pub mod placement;
pub mod policies;
pub mod simulator;
pub mod workload;

pub use artifact::{ActionEntry, PolicyArtifact};
pub use config::RunConfig;
pub use error::{Result, SimulationError};
pub use experiments::{compare_policies, run_parallel, static_sweep, RunSpec, SweepRow};
pub use fleet::{Fleet, ScaleBounds, ScaleOutcome, SlotId, VmSlot};
pub use metrics::MetricsAggregator;
pub use placement::{Backlog, Placement};
pub use policies::{
    ActionTable, BinEdges, Decision, PolicyKind, ScalingPolicy, TableLookupPolicy,
    ThresholdPolicy,
};
pub use simulator::{ControlSettings, Simulator, TIME_EPSILON};
pub use workload::{LoadOptions, SyntheticWorkload};

pub use kyma_core::{ResultSummary, SimulationResult, Task, TickSnapshot};
