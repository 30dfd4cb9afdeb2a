//! Scaling policies evaluated at control ticks
//!
//! Implements the policies to compare:
//! - Static: never rescale (fixed fleet baseline)
//! - Threshold: step up/down when queued work crosses fixed thresholds
//! - TableLookup: externally trained `(active, backlog bin) -> step` table
//!
//! Every policy only *requests* a new size. The fleet clamps the request to
//! its bounds and refuses to deactivate busy VMs.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimulationError};

/// What a policy wants done at a control tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// Leave the fleet alone (no resize request at all)
    Hold,
    /// Request `active_count + step`
    Step(i64),
}

/// Policy names accepted on the command line and in config files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    #[default]
    Static,
    Threshold,
    #[serde(alias = "mdp")]
    TableLookup,
}

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::Static => "static",
            PolicyKind::Threshold => "threshold",
            PolicyKind::TableLookup => "table-lookup",
        }
    }
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(PolicyKind::Static),
            "threshold" => Ok(PolicyKind::Threshold),
            "table-lookup" | "table_lookup" | "mdp" => Ok(PolicyKind::TableLookup),
            other => Err(SimulationError::config(format!("Unknown policy: {other}"))),
        }
    }
}

/// Threshold policy parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdPolicy {
    /// Scale up when queued work exceeds this (resource-seconds)
    pub up_threshold: f64,
    /// Scale down when queued work is below this (resource-seconds)
    pub down_threshold: f64,
    pub step_up: u32,
    pub step_down: u32,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            up_threshold: 3000.0,
            down_threshold: 500.0,
            step_up: 50,
            step_down: 20,
        }
    }
}

impl ThresholdPolicy {
    pub fn new(up_threshold: f64, down_threshold: f64, step_up: u32, step_down: u32) -> Self {
        Self {
            up_threshold,
            down_threshold,
            step_up,
            step_down,
        }
    }

    /// Up check wins when the thresholds overlap
    pub fn decide(&self, backlog: f64) -> Decision {
        if backlog > self.up_threshold {
            Decision::Step(i64::from(self.step_up))
        } else if backlog < self.down_threshold {
            Decision::Step(-i64::from(self.step_down))
        } else {
            Decision::Hold
        }
    }
}

/// Discretization of queued work into backlog bins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct BinEdges(Vec<f64>);

impl BinEdges {
    /// Edges must be finite, non-decreasing, and at least 3 long
    pub fn new(edges: Vec<f64>) -> Result<Self> {
        if edges.len() < 3 {
            return Err(SimulationError::config(format!(
                "bin edges need at least 3 values, got {}",
                edges.len()
            )));
        }
        if edges.iter().any(|e| !e.is_finite()) {
            return Err(SimulationError::config("bin edges must be finite"));
        }
        if edges.windows(2).any(|w| w[1] < w[0]) {
            return Err(SimulationError::config("bin edges must be ascending"));
        }
        Ok(Self(edges))
    }

    pub fn edges(&self) -> &[f64] {
        &self.0
    }

    /// Number of bins (`len(edges) - 1`)
    pub fn bin_count(&self) -> usize {
        self.0.len() - 1
    }

    /// Largest `i` with `edges[i] <= value`, clamped to `[0, bin_count - 1]`
    pub fn bin(&self, value: f64) -> usize {
        let at_or_below = self.0.partition_point(|edge| *edge <= value);
        at_or_below.saturating_sub(1).min(self.bin_count() - 1)
    }
}

impl TryFrom<Vec<f64>> for BinEdges {
    type Error = SimulationError;

    fn try_from(edges: Vec<f64>) -> Result<Self> {
        Self::new(edges)
    }
}

impl From<BinEdges> for Vec<f64> {
    fn from(edges: BinEdges) -> Self {
        edges.0
    }
}

/// Action table keyed by `(active_count, backlog_bin)`
pub type ActionTable = HashMap<(usize, usize), i64>;

/// Table-lookup policy produced by an external trainer
#[derive(Debug, Clone, PartialEq)]
pub struct TableLookupPolicy {
    actions: ActionTable,
    bins: BinEdges,
}

impl TableLookupPolicy {
    pub fn new(actions: ActionTable, bins: BinEdges) -> Self {
        Self { actions, bins }
    }

    pub fn bins(&self) -> &BinEdges {
        &self.bins
    }

    pub fn actions(&self) -> &ActionTable {
        &self.actions
    }

    /// Unknown states default to a zero step
    pub fn decide(&self, active_count: usize, backlog: f64) -> Decision {
        let state = (active_count, self.bins.bin(backlog));
        Decision::Step(self.actions.get(&state).copied().unwrap_or(0))
    }
}

/// Closed set of scaling policies
#[derive(Debug, Clone, PartialEq)]
pub enum ScalingPolicy {
    Static,
    Threshold(ThresholdPolicy),
    TableLookup(TableLookupPolicy),
}

impl ScalingPolicy {
    /// Build a policy from its name and whatever parameters were supplied.
    ///
    /// TableLookup needs both the action table and the bin edges.
    pub fn from_parts(
        kind: PolicyKind,
        threshold: ThresholdPolicy,
        actions: Option<ActionTable>,
        bins: Option<BinEdges>,
    ) -> Result<Self> {
        match kind {
            PolicyKind::Static => Ok(ScalingPolicy::Static),
            PolicyKind::Threshold => Ok(ScalingPolicy::Threshold(threshold)),
            PolicyKind::TableLookup => match (actions, bins) {
                (Some(actions), Some(bins)) => {
                    Ok(ScalingPolicy::TableLookup(TableLookupPolicy::new(actions, bins)))
                }
                _ => Err(SimulationError::config(
                    "table-lookup policy requires both an action table and bin edges",
                )),
            },
        }
    }

    /// Resolve a policy by name (see [`PolicyKind::from_str`])
    pub fn from_name(
        name: &str,
        threshold: ThresholdPolicy,
        actions: Option<ActionTable>,
        bins: Option<BinEdges>,
    ) -> Result<Self> {
        Self::from_parts(name.parse()?, threshold, actions, bins)
    }

    pub fn kind(&self) -> PolicyKind {
        match self {
            ScalingPolicy::Static => PolicyKind::Static,
            ScalingPolicy::Threshold(_) => PolicyKind::Threshold,
            ScalingPolicy::TableLookup(_) => PolicyKind::TableLookup,
        }
    }

    /// Get policy name
    pub fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Decide on a resize given the active count and queued work
    pub fn decide(&self, active_count: usize, backlog: f64) -> Decision {
        match self {
            ScalingPolicy::Static => Decision::Hold,
            ScalingPolicy::Threshold(policy) => policy.decide(backlog),
            ScalingPolicy::TableLookup(policy) => policy.decide(active_count, backlog),
        }
    }
}
