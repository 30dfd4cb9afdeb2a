//! Table-lookup policy artifacts
//!
//! A trainer outside this crate produces a state → action table over
//! `(active_count, backlog_bin)` plus the bin edges it discretized queued work
//! with. Both travel together in one JSON document, optionally alongside the
//! fleet bounds and control interval the table was trained for:
//!
//! ```json
//! {
//!   "k_min": 10, "k_max": 60, "delta": 60.0,
//!   "bin_edges": [0.0, 120.5, 900.0, 4200.0],
//!   "actions": [ { "active": 10, "bin": 2, "step": 50 } ]
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, SimulationError};
use crate::policies::{ActionTable, BinEdges, TableLookupPolicy};

/// One `(active, bin) -> step` entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEntry {
    pub active: usize,
    pub bin: usize,
    pub step: i64,
}

/// Serialized table-lookup policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyArtifact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k_min: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k_max: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
    pub bin_edges: BinEdges,
    pub actions: Vec<ActionEntry>,
}

impl PolicyArtifact {
    /// Load an artifact from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let artifact = Self::from_json(&raw)?;
        info!(
            path = %path.display(),
            states = artifact.actions.len(),
            bins = artifact.bin_edges.bin_count(),
            "Loaded policy artifact"
        );
        Ok(artifact)
    }

    /// Parse an artifact, rejecting duplicate states
    pub fn from_json(raw: &str) -> Result<Self> {
        let artifact: PolicyArtifact = serde_json::from_str(raw)?;
        artifact.action_table()?;
        Ok(artifact)
    }

    /// Write the artifact as pretty-printed JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Build the lookup table; a state listed twice is a configuration error
    pub fn action_table(&self) -> Result<ActionTable> {
        let mut table = ActionTable::with_capacity(self.actions.len());
        for entry in &self.actions {
            if table.insert((entry.active, entry.bin), entry.step).is_some() {
                return Err(SimulationError::config(format!(
                    "duplicate action for state (active={}, bin={})",
                    entry.active, entry.bin
                )));
            }
        }
        Ok(table)
    }

    pub fn into_policy(self) -> Result<TableLookupPolicy> {
        let table = self.action_table()?;
        Ok(TableLookupPolicy::new(table, self.bin_edges))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policies::Decision;

    const ARTIFACT: &str = r#"{
        "k_min": 2,
        "k_max": 8,
        "delta": 60.0,
        "bin_edges": [0.0, 100.0, 1000.0],
        "actions": [
            { "active": 2, "bin": 1, "step": 3 },
            { "active": 5, "bin": 0, "step": -1 }
        ]
    }"#;

    #[test]
    fn test_parse_artifact() {
        let artifact = PolicyArtifact::from_json(ARTIFACT).unwrap();
        assert_eq!(artifact.k_min, Some(2));
        assert_eq!(artifact.delta, Some(60.0));

        let policy = artifact.into_policy().unwrap();
        assert_eq!(policy.decide(2, 500.0), Decision::Step(3));
        assert_eq!(policy.decide(5, 50.0), Decision::Step(-1));
        assert_eq!(policy.decide(7, 50.0), Decision::Step(0));
    }

    #[test]
    fn test_bounds_are_optional() {
        let raw = r#"{ "bin_edges": [0.0, 1.0, 2.0], "actions": [] }"#;
        let artifact = PolicyArtifact::from_json(raw).unwrap();
        assert!(artifact.k_min.is_none());
        assert!(artifact.into_policy().unwrap().actions().is_empty());
    }

    #[test]
    fn test_short_bin_edges_rejected() {
        let raw = r#"{ "bin_edges": [0.0, 1.0], "actions": [] }"#;
        assert!(matches!(
            PolicyArtifact::from_json(raw),
            Err(SimulationError::Json(_))
        ));
    }

    #[test]
    fn test_duplicate_state_rejected() {
        let raw = r#"{
            "bin_edges": [0.0, 1.0, 2.0],
            "actions": [
                { "active": 1, "bin": 0, "step": 1 },
                { "active": 1, "bin": 0, "step": -1 }
            ]
        }"#;
        assert!(matches!(
            PolicyArtifact::from_json(raw),
            Err(SimulationError::Config(_))
        ));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");

        let artifact = PolicyArtifact::from_json(ARTIFACT).unwrap();
        artifact.save(&path).unwrap();
        assert_eq!(PolicyArtifact::load(&path).unwrap(), artifact);
    }
}
