//! Batch experiments: static-capacity sweeps and policy comparisons
//!
//! Every run owns its own [`Simulator`]; they only share the immutable task
//! slice. Runs are spread over the rayon pool and results come back in the
//! order the runs were requested, so a batch is as reproducible as one run.

use kyma_core::{SimulationResult, Task};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::artifact::PolicyArtifact;
use crate::config::RunConfig;
use crate::error::{Result, SimulationError};
use crate::policies::{PolicyKind, ScalingPolicy};
use crate::simulator::{ControlSettings, Simulator};

/// One simulation to launch
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub policy: ScalingPolicy,
    pub settings: ControlSettings,
}

/// Run independent simulations in parallel, returning results in input order
pub fn run_parallel(tasks: &[Task], runs: Vec<RunSpec>) -> Result<Vec<SimulationResult>> {
    if tasks.is_empty() {
        return Err(SimulationError::invalid_input("No tasks provided"));
    }

    runs.into_par_iter()
        .map(|run| Simulator::new(tasks, run.policy, run.settings).map(Simulator::run))
        .collect()
}

/// Cost and SLA numbers for one static fleet size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRow {
    pub static_k: usize,
    pub vm_hours: f64,
    pub mean_wait_s: f64,
    pub p95_wait_s: f64,
    pub p99_wait_s: f64,
    pub sla60_violation: f64,
    pub sla120_violation: f64,
}

impl SweepRow {
    fn from_result(static_k: usize, result: &SimulationResult) -> Self {
        Self {
            static_k,
            vm_hours: result.vm_hours(),
            mean_wait_s: result.mean_wait_s,
            p95_wait_s: result.p95_wait_s,
            p99_wait_s: result.p99_wait_s,
            sla60_violation: result.sla60_violation,
            sla120_violation: result.sla120_violation,
        }
    }
}

/// Run the static policy once per fleet size
pub fn static_sweep(tasks: &[Task], base: &RunConfig, sizes: &[usize]) -> Result<Vec<SweepRow>> {
    if sizes.is_empty() {
        return Err(SimulationError::config("sweep needs at least one fleet size"));
    }

    let runs = sizes
        .iter()
        .map(|&k| {
            let settings = base.clone().with_initial_active(k).control_settings()?;
            Ok(RunSpec {
                policy: ScalingPolicy::Static,
                settings,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    info!(sizes = sizes.len(), tasks = tasks.len(), "Starting static sweep");

    let results = run_parallel(tasks, runs)?;
    Ok(sizes
        .iter()
        .zip(&results)
        .map(|(&k, result)| SweepRow::from_result(k, result))
        .collect())
}

/// Initial fleet for the static baseline: middle of the bounds
pub fn static_baseline_size(config: &RunConfig) -> usize {
    ((config.k_min + config.k_max) / 2).clamp(config.k_min, config.k_max)
}

/// Compare static, threshold and (if an artifact is given) table-lookup.
///
/// Static starts at the middle of the bounds; the adaptive policies start at
/// `k_min` and have to grow into the load.
pub fn compare_policies(
    tasks: &[Task],
    base: &RunConfig,
    artifact: Option<PolicyArtifact>,
) -> Result<Vec<SimulationResult>> {
    base.validate()?;

    let mut runs = vec![RunSpec {
        policy: ScalingPolicy::Static,
        settings: base
            .clone()
            .with_initial_active(static_baseline_size(base))
            .control_settings()?,
    }];

    let adaptive = base.clone().with_initial_active(base.k_min);
    let adaptive_settings = adaptive.control_settings()?;

    runs.push(RunSpec {
        policy: adaptive
            .clone()
            .with_policy(PolicyKind::Threshold)
            .build_policy_with(None)?,
        settings: adaptive_settings,
    });

    match artifact {
        Some(artifact) => runs.push(RunSpec {
            policy: adaptive
                .with_policy(PolicyKind::TableLookup)
                .build_policy_with(Some(artifact))?,
            settings: adaptive_settings,
        }),
        None => warn!("No policy artifact given; skipping table-lookup run"),
    }

    run_parallel(tasks, runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::SyntheticWorkload;

    fn workload() -> Vec<Task> {
        SyntheticWorkload {
            tasks: 300,
            arrival_rate: 0.2,
            median_runtime_s: 60.0,
            ..Default::default()
        }
        .generate()
        .unwrap()
    }

    #[test]
    fn test_sweep_rows_follow_requested_order() {
        let tasks = workload();
        let config = RunConfig::default().with_bounds(1, 50);
        let rows = static_sweep(&tasks, &config, &[8, 2, 4]).unwrap();

        let ks: Vec<usize> = rows.iter().map(|r| r.static_k).collect();
        assert_eq!(ks, vec![8, 2, 4]);
        assert!(rows.iter().all(|r| r.vm_hours > 0.0));
    }

    #[test]
    fn test_parallel_runs_match_sequential_runs() {
        let tasks = workload();
        let config = RunConfig::default().with_bounds(1, 50);
        let rows = static_sweep(&tasks, &config, &[3, 6]).unwrap();

        for row in rows {
            let settings = config
                .clone()
                .with_initial_active(row.static_k)
                .control_settings()
                .unwrap();
            let single = Simulator::new(&tasks, ScalingPolicy::Static, settings)
                .unwrap()
                .run();
            assert_eq!(row.vm_hours, single.vm_hours());
            assert_eq!(row.p95_wait_s, single.p95_wait_s);
        }
    }

    #[test]
    fn test_empty_sweep_is_config_error() {
        let tasks = workload();
        let err = static_sweep(&tasks, &RunConfig::default(), &[]);
        assert!(matches!(err, Err(SimulationError::Config(_))));
    }

    #[test]
    fn test_compare_without_artifact_runs_two_policies() {
        let tasks = workload();
        let config = RunConfig::default().with_bounds(2, 20);
        let results = compare_policies(&tasks, &config, None).unwrap();

        let names: Vec<&str> = results.iter().map(|r| r.policy.as_str()).collect();
        assert_eq!(names, vec!["static", "threshold"]);
        assert_eq!(results[0].ts[0].active, 11);
        assert_eq!(results[1].ts[0].active, 2);
    }

    #[test]
    fn test_compare_rejects_non_finite_threshold() {
        let tasks = workload();
        let mut config = RunConfig::default().with_bounds(2, 20);
        config.threshold.up_threshold = f64::NAN;

        let err = compare_policies(&tasks, &config, None);
        assert!(matches!(err, Err(SimulationError::Config(_))));
    }

    #[test]
    fn test_compare_with_artifact_runs_table_lookup() {
        let tasks = workload();
        let artifact = PolicyArtifact::from_json(
            r#"{ "bin_edges": [0.0, 50.0, 500.0], "actions": [ { "active": 2, "bin": 2, "step": 3 } ] }"#,
        )
        .unwrap();
        let config = RunConfig::default().with_bounds(2, 20);
        let results = compare_policies(&tasks, &config, Some(artifact)).unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[2].policy, "table-lookup");
    }
}
