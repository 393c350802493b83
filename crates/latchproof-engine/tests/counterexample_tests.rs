mod common;

use common::*;
use latchproof_engine::{
    prove, verify_invariant, Counterexample, PdrConfig, PdrError, StateLit, Verdict,
};
use latchproof_ir::simulate::simulate;
use latchproof_ir::{Reset, TransitionSystem};
use latchproof_sat::backends::z3_backend::Z3Factory;

fn assert_replays(ts: &TransitionSystem, cex: &Counterexample) {
    let trace = simulate(ts, &cex.initial_state, &cex.inputs).expect("replay");
    assert_eq!(trace.states, cex.states);
    let last = trace.outputs.last().expect("at least one step");
    assert!(last[cex.output], "output {} does not assert", cex.output_name);
}

#[test]
fn one_reset_register_replays_on_the_original_system() {
    let mut ts = TransitionSystem::new();
    let q = ts.add_register("q", Reset::One).expect("fresh name");
    ts.set_next(q, !q).expect("register");
    ts.add_output("low", !q).expect("fresh name");
    let report = prove(&ts, &quick_config()).expect("run should complete");
    let cex = report
        .verdict(0)
        .and_then(Verdict::counterexample)
        .unwrap_or_else(|| panic!("Expected a counterexample, got: {report}"));
    assert_eq!(cex.initial_state, vec![true]);
    assert_eq!(cex.depth, 1);
    assert_replays(&ts, cex);
}

#[test]
fn free_register_picks_its_initial_value() {
    let mut ts = TransitionSystem::new();
    let f = ts.add_register("f", Reset::Free).expect("fresh name");
    let g = ts.add_register("g", Reset::Zero).expect("fresh name");
    ts.set_next(f, f).expect("register");
    ts.set_next(g, f).expect("register");
    ts.add_output("copied", g).expect("fresh name");
    let report = prove(&ts, &quick_config()).expect("run should complete");
    let cex = report
        .verdict(0)
        .and_then(Verdict::counterexample)
        .unwrap_or_else(|| panic!("Expected a counterexample, got: {report}"));
    assert_eq!(cex.depth, 1);
    assert_eq!(cex.initial_state, vec![true, false]);
    assert_replays(&ts, cex);
}

#[test]
fn free_register_outside_the_output_cone_is_harmless() {
    // g only ever copies f & !f
    let mut ts = TransitionSystem::new();
    let f = ts.add_register("f", Reset::Free).expect("fresh name");
    let g = ts.add_register("g", Reset::Zero).expect("fresh name");
    ts.set_next(f, !f).expect("register");
    let never = ts.and(f, !f);
    ts.set_next(g, never).expect("register");
    ts.add_output("copied", g).expect("fresh name");
    let report = prove(&ts, &quick_config()).expect("run should complete");
    assert!(report.all_proven(), "{report}");
}

#[test]
fn every_generalization_mode_yields_inductive_invariants() {
    let modes = [
        PdrConfig::default(),
        PdrConfig {
            simple: true,
            ..PdrConfig::default()
        },
        PdrConfig {
            skip_generalization: true,
            ..PdrConfig::default()
        },
        PdrConfig {
            ctg_handling: true,
            ..PdrConfig::default()
        },
        PdrConfig {
            two_round: true,
            flop_priority_order: true,
            ..PdrConfig::default()
        },
        PdrConfig {
            use_abstraction: true,
            ..PdrConfig::default()
        },
        PdrConfig {
            minimize_invariant: true,
            recycle_threshold: 4,
            restart_limit: 3,
            ..PdrConfig::default()
        },
    ];
    let safe = shift_chain(5);
    let unsafe_counter = counter(3, 5);
    for mode in modes {
        let config = PdrConfig {
            timeout_secs: 60,
            ..mode
        };
        let report = prove(&safe, &config).expect("safe run");
        let invariant = report
            .verdict(0)
            .and_then(Verdict::invariant)
            .unwrap_or_else(|| panic!("{config:?}: expected proven, got {report}"));
        verify_invariant(&safe, invariant, &Z3Factory)
            .unwrap_or_else(|e| panic!("{config:?}: {e}"));

        let report = prove(&unsafe_counter, &config).expect("unsafe run");
        let cex = report
            .verdict(0)
            .and_then(Verdict::counterexample)
            .unwrap_or_else(|| panic!("{config:?}: expected a counterexample, got {report}"));
        assert_eq!(cex.depth, 5, "{config:?}");
        assert_replays(&unsafe_counter, cex);
    }
}

#[test]
fn tampered_invariants_are_rejected() {
    let ts = shift_chain(4);
    let report = prove(&ts, &quick_config()).expect("run should complete");
    let invariant = report
        .verdict(0)
        .and_then(Verdict::invariant)
        .unwrap_or_else(|| panic!("Expected proven, got: {report}"))
        .clone();
    verify_invariant(&ts, &invariant, &Z3Factory).expect("untouched invariant holds");

    let mut emptied = invariant.clone();
    emptied.cubes.clear();
    assert!(matches!(
        verify_invariant(&ts, &emptied, &Z3Factory),
        Err(PdrError::InternalInvariantViolation(_))
    ));

    // "some stage is high" excludes the initial state
    let mut init_breaking = invariant.clone();
    init_breaking
        .cubes
        .push((0..4).map(|r| StateLit::new(r, true).code()).collect());
    assert!(matches!(
        verify_invariant(&ts, &init_breaking, &Z3Factory),
        Err(PdrError::InternalInvariantViolation(_))
    ));

    let mut unknown_register = invariant;
    unknown_register.cubes.push(vec![StateLit::new(40, false).code()]);
    assert!(matches!(
        verify_invariant(&ts, &unknown_register, &Z3Factory),
        Err(PdrError::MalformedInput(_))
    ));
}
