//! Property tests for fleet and scheduling invariants

use kyma_simulation_engine::{
    ControlSettings, ScaleBounds, ScalingPolicy, SimulationResult, Simulator, SlotId, Task,
    ThresholdPolicy, TIME_EPSILON,
};
use proptest::prelude::*;

fn arb_tasks() -> impl Strategy<Value = Vec<Task>> {
    prop::collection::vec(
        (0.0f64..40.0, 1.0f64..300.0, 0.01f64..=1.0, 0.01f64..=1.0),
        1..120,
    )
    .prop_map(|rows| {
        let mut arrival = 0.0;
        rows.into_iter()
            .map(|(gap, runtime, cpu, mem)| {
                arrival += gap;
                Task::new(arrival, runtime, cpu, mem)
            })
            .collect()
    })
}

fn arb_threshold() -> impl Strategy<Value = ThresholdPolicy> {
    (0.0f64..2000.0, 0.0f64..500.0, 0u32..8, 0u32..8)
        .prop_map(|(up, down, step_up, step_down)| ThresholdPolicy::new(up, down, step_up, step_down))
}

fn arb_settings() -> impl Strategy<Value = ControlSettings> {
    (1usize..4, 0usize..12, 0usize..12, 10.0f64..120.0).prop_map(|(k_min, span, offset, delta)| {
        let k_max = k_min + span;
        let initial = k_min + offset.min(span);
        ControlSettings::new(ScaleBounds::new(k_min, k_max).unwrap(), initial, delta).unwrap()
    })
}

/// Step through a run, checking fleet invariants after every event instant
fn run_checked(tasks: &[Task], policy: ScalingPolicy, settings: ControlSettings) -> SimulationResult {
    let bounds = settings.bounds;
    let mut sim = Simulator::new(tasks, policy, settings).unwrap();

    let mut steps = 0usize;
    loop {
        let more = sim.step();
        steps += 1;
        assert!(steps < 1_000_000, "simulation did not terminate");

        let fleet = sim.fleet();
        let active = fleet.active_count();
        assert!(active >= bounds.k_min && active <= bounds.k_max);

        for (index, slot) in fleet.slots().iter().enumerate() {
            assert!(slot.used_cpu <= 1.0 + TIME_EPSILON, "cpu over capacity: {}", slot.used_cpu);
            assert!(slot.used_mem <= 1.0 + TIME_EPSILON, "mem over capacity: {}", slot.used_mem);
            assert!(slot.used_cpu >= -TIME_EPSILON && slot.used_mem >= -TIME_EPSILON);

            if !fleet.is_active(SlotId(index)) {
                assert_eq!(slot.running, 0, "retired slot {} still running tasks", index);
            }
        }

        if !more {
            break;
        }
    }

    assert!(sim.backlog().is_empty());
    assert_eq!(sim.pending_completions(), 0);
    sim.finish()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn threshold_runs_respect_capacity_and_bounds(
        tasks in arb_tasks(),
        threshold in arb_threshold(),
        settings in arb_settings(),
    ) {
        run_checked(&tasks, ScalingPolicy::Threshold(threshold), settings);
    }

    #[test]
    fn every_task_placed_in_arrival_order(
        tasks in arb_tasks(),
        threshold in arb_threshold(),
        settings in arb_settings(),
    ) {
        let mut sim = Simulator::new(&tasks, ScalingPolicy::Threshold(threshold), settings).unwrap();
        while sim.step() {}

        let waits = sim.metrics().waits().to_vec();
        prop_assert_eq!(waits.len(), tasks.len());
        prop_assert!(waits.iter().all(|w| *w >= 0.0));

        let starts: Vec<f64> = tasks.iter().zip(&waits).map(|(t, w)| t.arrival + w).collect();
        for pair in starts.windows(2) {
            prop_assert!(pair[0] <= pair[1] + TIME_EPSILON, "start times out of order: {:?}", pair);
        }
    }

    #[test]
    fn vm_seconds_match_reconstruction(
        tasks in arb_tasks(),
        threshold in arb_threshold(),
        settings in arb_settings(),
    ) {
        let result = run_checked(&tasks, ScalingPolicy::Threshold(threshold), settings);
        let reconstructed = result.reconstructed_vm_seconds();
        prop_assert!(
            (reconstructed - result.vm_seconds).abs() <= 1e-6 * result.vm_seconds.max(1.0),
            "vm_seconds {} vs reconstructed {}",
            result.vm_seconds,
            reconstructed
        );
    }

    #[test]
    fn static_fleet_never_changes(tasks in arb_tasks(), settings in arb_settings()) {
        let initial = settings.initial_active;
        let result = run_checked(&tasks, ScalingPolicy::Static, settings);
        prop_assert!(result.ts.iter().all(|s| s.active == initial));
        prop_assert_eq!(result.final_active_count, initial);
        prop_assert_eq!(result.partial_scale_downs, 0);
    }
}
