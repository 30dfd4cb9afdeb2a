//! Run configuration
//!
//! A [`RunConfig`] can come from a JSON file, from CLI flags, or both (flags
//! override the file). Defaults follow the reference experiments: 30 initial
//! VMs, 60 s control ticks, threshold 3000/500 with steps +50/−20.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::artifact::PolicyArtifact;
use crate::error::{Result, SimulationError};
use crate::fleet::ScaleBounds;
use crate::policies::{PolicyKind, ScalingPolicy, ThresholdPolicy};
use crate::simulator::ControlSettings;

/// Default control interval (seconds)
pub const DEFAULT_DELTA_SECS: f64 = 60.0;

/// Default active VM count at t = 0
pub const DEFAULT_INITIAL_ACTIVE: usize = 30;

/// Default upper bound on the fleet
pub const DEFAULT_K_MAX: usize = 1200;

/// Configuration for a single simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub policy: PolicyKind,
    pub k_min: usize,
    pub k_max: usize,
    pub initial_active: usize,
    /// Control interval in seconds
    pub delta: f64,
    pub threshold: ThresholdPolicy,
    /// Table-lookup artifact (JSON), required for the table-lookup policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::Static,
            k_min: 1,
            k_max: DEFAULT_K_MAX,
            initial_active: DEFAULT_INITIAL_ACTIVE,
            delta: DEFAULT_DELTA_SECS,
            threshold: ThresholdPolicy::default(),
            artifact: None,
        }
    }
}

impl RunConfig {
    /// Load a configuration from a JSON file; missing fields take defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Set policy kind
    pub fn with_policy(mut self, policy: PolicyKind) -> Self {
        self.policy = policy;
        self
    }

    /// Set fleet bounds
    pub fn with_bounds(mut self, k_min: usize, k_max: usize) -> Self {
        self.k_min = k_min;
        self.k_max = k_max;
        self
    }

    /// Set initial active count
    pub fn with_initial_active(mut self, initial_active: usize) -> Self {
        self.initial_active = initial_active;
        self
    }

    /// Set control interval
    pub fn with_delta(mut self, delta: f64) -> Self {
        self.delta = delta;
        self
    }

    /// Set threshold policy parameters
    pub fn with_threshold(mut self, threshold: ThresholdPolicy) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set table-lookup artifact path
    pub fn with_artifact(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifact = Some(path.into());
        self
    }

    pub fn bounds(&self) -> Result<ScaleBounds> {
        ScaleBounds::new(self.k_min, self.k_max)
    }

    /// Validated fleet sizing and control cadence
    pub fn control_settings(&self) -> Result<ControlSettings> {
        ControlSettings::new(self.bounds()?, self.initial_active, self.delta)
    }

    /// Check everything that does not require reading the artifact
    pub fn validate(&self) -> Result<()> {
        self.control_settings()?;

        // Comparisons run a threshold policy whatever the configured kind
        let t = &self.threshold;
        if !(t.up_threshold.is_finite() && t.down_threshold.is_finite()) {
            return Err(SimulationError::config("thresholds must be finite"));
        }
        if self.policy == PolicyKind::Threshold && t.up_threshold < t.down_threshold {
            warn!(
                up = t.up_threshold,
                down = t.down_threshold,
                "Threshold bands overlap; scale-up takes precedence"
            );
        }
        Ok(())
    }

    /// Load the artifact named by this config, if any
    pub fn load_artifact(&self) -> Result<Option<PolicyArtifact>> {
        self.artifact
            .as_deref()
            .map(PolicyArtifact::load)
            .transpose()
    }

    /// Build the scaling policy, reading the artifact from disk if needed
    pub fn build_policy(&self) -> Result<ScalingPolicy> {
        let artifact = match self.policy {
            PolicyKind::TableLookup => self.load_artifact()?,
            _ => None,
        };
        self.build_policy_with(artifact)
    }

    /// Build the scaling policy from an already-loaded artifact
    pub fn build_policy_with(&self, artifact: Option<PolicyArtifact>) -> Result<ScalingPolicy> {
        let (actions, bins) = match artifact {
            Some(artifact) => (Some(artifact.action_table()?), Some(artifact.bin_edges)),
            None => (None, None),
        };
        ScalingPolicy::from_parts(self.policy, self.threshold, actions, bins)
    }

    /// Fill bounds and interval from an artifact where the caller left them unset
    pub fn fill_from_artifact(
        mut self,
        artifact: &PolicyArtifact,
        explicit: ExplicitFields,
    ) -> Self {
        if !explicit.k_min {
            if let Some(k_min) = artifact.k_min {
                self.k_min = k_min;
            }
        }
        if !explicit.k_max {
            if let Some(k_max) = artifact.k_max {
                self.k_max = k_max;
            }
        }
        if !explicit.delta {
            if let Some(delta) = artifact.delta {
                self.delta = delta;
            }
        }
        self
    }
}

/// Which run parameters the caller set explicitly
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExplicitFields {
    pub k_min: bool,
    pub k_max: bool,
    pub delta: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact() -> PolicyArtifact {
        PolicyArtifact::from_json(
            r#"{ "k_min": 4, "k_max": 40, "delta": 30.0,
                 "bin_edges": [0.0, 10.0, 20.0], "actions": [] }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = RunConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.delta, 60.0);
        assert_eq!(config.threshold.step_up, 50);
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config: RunConfig =
            serde_json::from_str(r#"{ "policy": "threshold", "k_max": 50, "threshold": { "step_up": 5 } }"#)
                .unwrap();
        assert_eq!(config.policy, PolicyKind::Threshold);
        assert_eq!(config.k_max, 50);
        assert_eq!(config.threshold.step_up, 5);
        assert_eq!(config.threshold.step_down, 20);
        assert_eq!(config.initial_active, 30);
    }

    #[test]
    fn test_mdp_alias_in_config() {
        let config: RunConfig = serde_json::from_str(r#"{ "policy": "mdp" }"#).unwrap();
        assert_eq!(config.policy, PolicyKind::TableLookup);
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let config = RunConfig::default().with_bounds(10, 5);
        assert!(matches!(config.validate(), Err(SimulationError::Config(_))));

        let config = RunConfig::default().with_bounds(0, 5);
        assert!(config.validate().is_err());

        let config = RunConfig::default().with_delta(-1.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_finite_thresholds_rejected_for_any_policy() {
        let mut config = RunConfig::default();
        config.threshold.up_threshold = f64::NAN;
        assert!(matches!(config.validate(), Err(SimulationError::Config(_))));

        let mut config = RunConfig::default().with_policy(PolicyKind::Threshold);
        config.threshold.down_threshold = f64::INFINITY;
        assert!(matches!(config.validate(), Err(SimulationError::Config(_))));
    }

    #[test]
    fn test_table_lookup_without_artifact_is_config_error() {
        let config = RunConfig::default().with_policy(PolicyKind::TableLookup);
        assert!(matches!(config.build_policy(), Err(SimulationError::Config(_))));
    }

    #[test]
    fn test_build_policy_with_artifact() {
        let config = RunConfig::default().with_policy(PolicyKind::TableLookup);
        let policy = config.build_policy_with(Some(artifact())).unwrap();
        assert_eq!(policy.kind(), PolicyKind::TableLookup);
    }

    #[test]
    fn test_fill_from_artifact_respects_explicit_fields() {
        let explicit = ExplicitFields {
            k_max: true,
            ..Default::default()
        };
        let config = RunConfig::default()
            .with_bounds(1, 99)
            .fill_from_artifact(&artifact(), explicit);

        assert_eq!(config.k_min, 4);
        assert_eq!(config.k_max, 99);
        assert_eq!(config.delta, 30.0);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, r#"{ "policy": "static", "initial_active": 12 }"#).unwrap();

        let config = RunConfig::load(&path).unwrap();
        assert_eq!(config.initial_active, 12);
    }
}
