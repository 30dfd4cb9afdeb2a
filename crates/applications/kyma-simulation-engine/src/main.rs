//! Kyma Simulation Engine CLI
//!
//! Command-line interface for replaying workloads against autoscaling policies
//!
//! ```bash
//! # One policy on a prepared trace
//! kyma-sim run --workload tasks_2h.csv --policy threshold --k-min 186 --k-max 1200
//!
//! # Static fleet sizes, in parallel
//! kyma-sim sweep --workload tasks_2h.csv --sizes 200,300,400,500
//!
//! # Static vs threshold vs table-lookup
//! kyma-sim compare --workload tasks_24h.csv --artifact mdp_policy.json
//!
//! # Seeded synthetic workload
//! kyma-sim generate --tasks 5000 --seed 7 --output synthetic.csv
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use kyma_simulation_engine::{
    config::ExplicitFields,
    experiments::{compare_policies, static_sweep},
    workload::{self, LoadOptions, SyntheticWorkload},
    PolicyArtifact, PolicyKind, RunConfig, SimulationResult, Simulator, Task,
};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "kyma-sim")]
#[command(about = "Replay workload traces against VM autoscaling policies", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one policy on one workload
    Run {
        #[command(flatten)]
        workload: WorkloadArgs,

        #[command(flatten)]
        control: ControlArgs,

        /// Policy (static, threshold, table-lookup)
        #[arg(short, long)]
        policy: Option<String>,

        /// Output JSON file path (optional)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write only the summary, without the tick series
        #[arg(long)]
        summary_only: bool,
    },

    /// Run the static policy over a list of fleet sizes
    Sweep {
        #[command(flatten)]
        workload: WorkloadArgs,

        #[command(flatten)]
        control: ControlArgs,

        /// Fleet sizes to evaluate (comma-separated)
        #[arg(long, value_delimiter = ',', required = true)]
        sizes: Vec<usize>,

        /// Output JSON file path (optional)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compare static, threshold and table-lookup on the same workload
    Compare {
        #[command(flatten)]
        workload: WorkloadArgs,

        #[command(flatten)]
        control: ControlArgs,

        /// Summary JSON file path (optional)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Full results (with tick series) JSON file path (optional)
        #[arg(long)]
        full_output: Option<PathBuf>,
    },

    /// Write a seeded synthetic workload as CSV
    Generate {
        #[command(flatten)]
        synthetic: SyntheticArgs,

        /// Output CSV file path
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Where the tasks come from
#[derive(Args, Debug)]
struct WorkloadArgs {
    /// Prepared trace CSV (arrival_time_s,runtime_s,cpu_req,mem_req); synthetic if omitted
    #[arg(short, long)]
    workload: Option<PathBuf>,

    /// Skip invalid rows instead of failing
    #[arg(long)]
    drop_invalid: bool,

    /// Keep only this fraction of tasks (seeded)
    #[arg(long)]
    sample_frac: Option<f64>,

    /// Seed for --sample-frac
    #[arg(long, default_value_t = 7)]
    sample_seed: u64,

    #[command(flatten)]
    synthetic: SyntheticArgs,
}

#[derive(Args, Debug)]
struct SyntheticArgs {
    /// Number of synthetic tasks
    #[arg(long, default_value_t = 1000)]
    tasks: usize,

    /// Synthetic arrival rate (tasks per second)
    #[arg(long, default_value_t = 0.5)]
    arrival_rate: f64,

    /// Synthetic median runtime (seconds)
    #[arg(long, default_value_t = 120.0)]
    median_runtime: f64,

    /// Synthetic per-task request ceiling (fraction of a VM)
    #[arg(long, default_value_t = 0.5)]
    max_request: f64,

    /// Seed for synthetic generation
    #[arg(long, default_value_t = 7)]
    seed: u64,
}

/// Fleet bounds, control cadence and policy parameters
#[derive(Args, Debug)]
struct ControlArgs {
    /// Run configuration JSON (flags override it)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Minimum active VMs
    #[arg(long)]
    k_min: Option<usize>,

    /// Maximum active VMs
    #[arg(long)]
    k_max: Option<usize>,

    /// Active VMs at t=0
    #[arg(long)]
    initial: Option<usize>,

    /// Control interval (seconds)
    #[arg(long)]
    delta: Option<f64>,

    /// Threshold policy: scale up above this queued work
    #[arg(long)]
    up_threshold: Option<f64>,

    /// Threshold policy: scale down below this queued work
    #[arg(long)]
    down_threshold: Option<f64>,

    /// Threshold policy: VMs added per step
    #[arg(long)]
    step_up: Option<u32>,

    /// Threshold policy: VMs removed per step
    #[arg(long)]
    step_down: Option<u32>,

    /// Table-lookup policy artifact (JSON)
    #[arg(long)]
    artifact: Option<PathBuf>,
}

impl SyntheticArgs {
    fn params(&self) -> SyntheticWorkload {
        SyntheticWorkload {
            tasks: self.tasks,
            arrival_rate: self.arrival_rate,
            median_runtime_s: self.median_runtime,
            max_request: self.max_request,
            seed: self.seed,
            ..Default::default()
        }
    }
}

impl WorkloadArgs {
    fn load(&self) -> anyhow::Result<Vec<Task>> {
        let tasks = match &self.workload {
            Some(path) => workload::load_csv(
                path,
                LoadOptions {
                    drop_invalid: self.drop_invalid,
                },
            )
            .with_context(|| format!("loading workload {}", path.display()))?,
            None => {
                let params = self.synthetic.params();
                info!(tasks = params.tasks, seed = params.seed, "Generating synthetic workload");
                params.generate()?
            }
        };

        match self.sample_frac {
            Some(frac) => {
                let sampled = workload::sample(&tasks, frac, self.sample_seed)?;
                info!(input = tasks.len(), kept = sampled.len(), "Sampled workload");
                Ok(sampled)
            }
            None => Ok(tasks),
        }
    }
}

impl ControlArgs {
    /// Config file (or defaults), then artifact bounds, then explicit flags
    fn resolve(&self) -> anyhow::Result<(RunConfig, Option<PolicyArtifact>)> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => RunConfig::default(),
        };

        if let Some(path) = &self.artifact {
            config = config.with_artifact(path);
        }
        let artifact = config.load_artifact().context("loading policy artifact")?;

        if let Some(artifact) = &artifact {
            let explicit = ExplicitFields {
                k_min: self.k_min.is_some(),
                k_max: self.k_max.is_some(),
                delta: self.delta.is_some(),
            };
            config = config.fill_from_artifact(artifact, explicit);
        }

        if let Some(k_min) = self.k_min {
            config.k_min = k_min;
        }
        if let Some(k_max) = self.k_max {
            config.k_max = k_max;
        }
        if let Some(initial) = self.initial {
            config.initial_active = initial;
        }
        if let Some(delta) = self.delta {
            config.delta = delta;
        }
        if let Some(up) = self.up_threshold {
            config.threshold.up_threshold = up;
        }
        if let Some(down) = self.down_threshold {
            config.threshold.down_threshold = down;
        }
        if let Some(step) = self.step_up {
            config.threshold.step_up = step;
        }
        if let Some(step) = self.step_down {
            config.threshold.step_down = step;
        }

        Ok((config, artifact))
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kyma=info,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            workload,
            control,
            policy,
            output,
            summary_only,
        } => {
            let tasks = workload.load()?;
            let (mut config, artifact) = control.resolve()?;
            if let Some(name) = policy {
                config.policy = name.parse::<PolicyKind>()?;
            }
            config.validate()?;

            let policy = config.build_policy_with(artifact)?;
            let result = Simulator::new(&tasks, policy, config.control_settings()?)?.run();

            print_results(std::slice::from_ref(&result));

            if let Some(path) = output {
                if summary_only {
                    write_json(&path, &result.summary())?;
                } else {
                    write_json(&path, &result)?;
                }
            }
        }

        Commands::Sweep {
            workload,
            control,
            sizes,
            output,
        } => {
            let tasks = workload.load()?;
            let (config, _) = control.resolve()?;
            config.validate()?;

            let rows = static_sweep(&tasks, &config, &sizes)?;

            println!(
                "{:>10} {:>12} {:>12} {:>12} {:>12} {:>10} {:>10}",
                "Static k", "VM hours", "Mean wait", "P95 wait", "P99 wait", "SLA60", "SLA120"
            );
            println!("{}", "-".repeat(84));
            for row in &rows {
                println!(
                    "{:>10} {:>12.2} {:>12.2} {:>12.2} {:>12.2} {:>10.4} {:>10.4}",
                    row.static_k,
                    row.vm_hours,
                    row.mean_wait_s,
                    row.p95_wait_s,
                    row.p99_wait_s,
                    row.sla60_violation,
                    row.sla120_violation,
                );
            }

            if let Some(path) = output {
                write_json(&path, &rows)?;
            }
        }

        Commands::Compare {
            workload,
            control,
            output,
            full_output,
        } => {
            let tasks = workload.load()?;
            let (config, artifact) = control.resolve()?;
            config.validate()?;

            info!(k_min = config.k_min, k_max = config.k_max, "Comparing policies");
            let results = compare_policies(&tasks, &config, artifact)?;

            print_results(&results);

            if let Some(path) = output {
                let summaries: Vec<_> = results.iter().map(SimulationResult::summary).collect();
                write_json(&path, &summaries)?;
            }
            if let Some(path) = full_output {
                write_json(&path, &results)?;
            }
        }

        Commands::Generate { synthetic, output } => {
            let tasks = synthetic.params().generate()?;
            let file = fs::File::create(&output)
                .with_context(|| format!("creating {}", output.display()))?;
            workload::write_csv(file, &tasks)?;
            info!(tasks = tasks.len(), path = %output.display(), "Wrote synthetic workload");
        }
    }

    Ok(())
}

fn print_results(results: &[SimulationResult]) {
    println!(
        "{:<14} {:>8} {:>12} {:>12} {:>12} {:>10} {:>10} {:>12}",
        "Policy", "Tasks", "Mean wait", "P95 wait", "P99 wait", "SLA60", "SLA120", "VM hours"
    );
    println!("{}", "-".repeat(96));

    for result in results {
        println!(
            "{:<14} {:>8} {:>12.2} {:>12.2} {:>12.2} {:>10.4} {:>10.4} {:>12.2}",
            result.policy,
            result.tasks,
            result.mean_wait_s,
            result.p95_wait_s,
            result.p99_wait_s,
            result.sla60_violation,
            result.sla120_violation,
            result.vm_hours(),
        );
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "Results saved");
    Ok(())
}
