// ─────────────────────────────────────────────────────────────────────
// Equilibrium Kernel — End-to-end Scenarios
// ─────────────────────────────────────────────────────────────────────

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use equilibrium_core::{BlockList, CancellationToken, EngineHandle, LogOnly};
use equilibrium_dynamics::{ExternalDynamics, ProportionalStep, StaticEquilibrium};
use equilibrium_types::{
    DynamicsQuantity, EngineConfig, EntityId, EquilibriumError, HarmRecord, RunStatus,
};

fn halving_engine(state: f64) -> EngineHandle {
    EngineHandle::builder(Arc::new(StaticEquilibrium::uniform(0.0)))
        .entity("solo", state)
        .step_policy(Arc::new(ProportionalStep::new(0.5).unwrap()))
        .build()
        .unwrap()
}

#[test]
fn single_entity_halves_to_convergence() {
    let mut engine = halving_engine(10.0);
    let report = engine.run(10_000, 1e-9, &CancellationToken::new()).unwrap();

    assert_eq!(report.status, RunStatus::Converged);
    assert!(report.iterations_run <= 35);
    assert_eq!(report.iterations_run, 34);
    let harms: Vec<f64> = std::iter::once(report.initial_potential)
        .chain(report.potential_history.iter().copied())
        .take(4)
        .map(|p| -p)
        .collect();
    assert_eq!(harms, [10.0, 5.0, 2.5, 1.25]);
    assert!(report.final_harm() <= 1e-9);
}

#[test]
fn empty_set_converges_immediately() {
    let mut engine =
        EngineHandle::initialize(Vec::<(&str, f64)>::new(), Arc::new(StaticEquilibrium::new()))
            .unwrap();
    let report = engine.run(10_000, 1e-9, &CancellationToken::new()).unwrap();

    assert_eq!(report.status, RunStatus::Converged);
    assert_eq!(report.iterations_run, 0);
    assert_eq!(report.final_potential, 0.0);
    assert!(engine.snapshot().unwrap().is_empty());
}

#[test]
fn single_iteration_budget_is_non_convergent() {
    let mut engine = halving_engine(10.0);
    let report = engine.run(1, 1e-9, &CancellationToken::new()).unwrap();

    assert_eq!(report.status, RunStatus::NonConvergent);
    assert_eq!(report.iterations_run, 1);
    assert_eq!(report.final_potential, -5.0);
}

#[test]
fn nan_equilibrium_aborts_with_entity_id() {
    let dynamics = ExternalDynamics::new(
        |e, _| e.state,
        |e, _| if e.id.as_str() == "broken" { f64::NAN } else { 0.0 },
    );
    let mut engine =
        EngineHandle::initialize([("fine", 1.0), ("broken", 1.0)], Arc::new(dynamics)).unwrap();

    let err = engine.run(10_000, 1e-9, &CancellationToken::new()).unwrap_err();
    match err {
        EquilibriumError::Dynamics {
            entity_id,
            quantity,
            value,
        } => {
            assert_eq!(entity_id, EntityId::from("broken"));
            assert_eq!(quantity, DynamicsQuantity::EquilibriumField);
            assert!(value.is_nan());
        }
        other => panic!("expected dynamics error, got {other}"),
    }
    assert_eq!(engine.tick(), 0);
    assert!(engine.store().snapshot().iter().all(|e| e.state == 1.0));
}

#[test]
fn guard_blocks_only_harmful_entity() {
    let dynamics = StaticEquilibrium::new()
        .with_target("steady", 2.0)
        .with_target("drifting", 0.0);
    let engine =
        EngineHandle::initialize([("steady", 2.0), ("drifting", 3.0)], Arc::new(dynamics))
            .unwrap();

    let list = BlockList::new();
    let report = engine.enforce(0.0, &list).unwrap();

    assert_eq!(report.blocked.len(), 1);
    assert!(report.is_blocked(&EntityId::from("drifting")));
    assert!(list.is_blocked(&EntityId::from("drifting")));
    assert!(!list.is_blocked(&EntityId::from("steady")));
}

#[test]
fn guard_hook_failures_are_collected() {
    let engine = EngineHandle::initialize(
        [("a", 1.0), ("b", 2.0), ("c", 3.0)],
        Arc::new(StaticEquilibrium::uniform(0.0)),
    )
    .unwrap();
    let hook = |r: &HarmRecord| {
        if r.harm > 1.5 {
            Err(format!("no actuator for {}", r.entity_id))
        } else {
            Ok(())
        }
    };
    let report = engine.enforce(0.0, &hook).unwrap();

    assert_eq!(report.blocked.len(), 3);
    let failed: Vec<&str> = report.failures.iter().map(|f| f.entity_id.as_str()).collect();
    assert_eq!(failed, ["b", "c"]);
    assert!(report.ensure_no_failures().is_err());
}

#[test]
fn cancellation_from_another_thread() {
    // Target moves every tick, so the run cannot converge on its own.
    let dynamics = ExternalDynamics::new(|e, _| e.state, |_, ctx| ctx.tick as f64);
    let mut engine = EngineHandle::builder(Arc::new(dynamics))
        .config(EngineConfig {
            max_iterations: u64::MAX,
            damping_window: 0,
            ..Default::default()
        })
        .entity("chaser", 0.5)
        .build()
        .unwrap();

    let token = CancellationToken::new();
    let remote = token.clone();
    let reader = engine.store();
    let watcher = thread::spawn(move || {
        // Cancel anyway after the deadline so a stalled run fails the
        // assertions below instead of hanging.
        let deadline = Instant::now() + Duration::from_secs(10);
        while reader.generation() < 100 && Instant::now() < deadline {
            thread::yield_now();
        }
        remote.cancel();
    });

    let report = engine.run_default(&token).unwrap();
    watcher.join().unwrap();

    assert_eq!(report.status, RunStatus::Cancelled);
    assert!(report.iterations_run >= 100);
    assert_eq!(engine.tick(), report.iterations_run);
}

#[test]
fn independent_engines_run_concurrently() {
    let handles: Vec<_> = (1..=4)
        .map(|k| {
            thread::spawn(move || {
                let mut engine = halving_engine(k as f64 * 10.0);
                engine.run(10_000, 1e-9, &CancellationToken::new()).unwrap()
            })
        })
        .collect();
    for handle in handles {
        let report = handle.join().unwrap();
        assert_eq!(report.status, RunStatus::Converged);
    }
}

#[test]
fn guard_after_convergence_uses_tolerance_as_threshold() {
    let mut engine = EngineHandle::initialize(
        [("a", 5.0), ("b", -5.0)],
        Arc::new(StaticEquilibrium::uniform(1.0)),
    )
    .unwrap();
    let report = engine.run_default(&CancellationToken::new()).unwrap();
    assert!(report.converged());

    let strict = engine.enforce(0.0, &LogOnly).unwrap();
    let relaxed = engine.enforce(1e-9, &LogOnly).unwrap();
    assert!(relaxed.blocked.is_empty());
    assert!(strict.blocked.len() <= 2);
}

#[cfg(feature = "parallel")]
#[test]
fn parallel_pass_matches_sequential() {
    use equilibrium_dynamics::MeanFieldEquilibrium;

    let run = |parallel: bool| {
        let mut engine = EngineHandle::builder(Arc::new(MeanFieldEquilibrium))
            .config(EngineConfig {
                parallel,
                ..Default::default()
            })
            .entities((0..64u64).map(|i| equilibrium_types::Entity::new(i, i as f64 * 1.5)))
            .build()
            .unwrap();
        let report = engine.run(50, 0.0, &CancellationToken::new()).unwrap();
        (report.potential_history, engine.snapshot().unwrap())
    };
    assert_eq!(run(false), run(true));
}

#[test]
fn reports_serialize_for_logging() {
    let mut engine = EngineHandle::initialize(
        [("b", 3.0), ("a", 0.0), ("c", 5.0)],
        Arc::new(StaticEquilibrium::uniform(0.0)),
    )
    .unwrap();
    let guard = engine.enforce(0.0, &LogOnly).unwrap();
    let json = serde_json::to_value(&guard).unwrap();
    assert_eq!(json["blocked"], serde_json::json!(["b", "c"]));
    assert_eq!(json["evaluated"], 3);

    let report = engine.run(1, 1e-9, &CancellationToken::new()).unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["status"], "NON_CONVERGENT");
    assert_eq!(json["iterations_run"], 1);
    assert_eq!(json["potential_history"], serde_json::json!([-4.0]));
}
