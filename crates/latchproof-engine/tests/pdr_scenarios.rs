mod common;

use common::*;
use latchproof_engine::{
    prove, prove_incremental, verify_invariant, PdrConfig, UndecidedReason, Verdict,
};
use latchproof_sat::backends::z3_backend::Z3Factory;

#[test]
fn toggling_flop_is_proven_with_a_single_clause() {
    let ts = toggle_flop();
    let report = prove(&ts, &quick_config()).expect("run should complete");
    match report.verdict(0) {
        Some(Verdict::Proven { invariant }) => {
            assert_eq!(invariant.clauses.len(), 1, "invariant: {invariant:?}");
            assert!(invariant.verified);
            assert_eq!(invariant.clauses[0].to_string(), "!hi");
        }
        other => panic!("Expected proven, got: {other:?}"),
    }
    assert!(report.all_proven());
    assert_eq!(report.overall_verdict(), "proven");
}

#[test]
fn counter_reaching_fifteen_is_disproven() {
    let ts = counter(4, 15);
    let report = prove(&ts, &quick_config()).expect("run should complete");
    let cex = report
        .verdict(0)
        .and_then(Verdict::counterexample)
        .unwrap_or_else(|| panic!("Expected a counterexample, got: {report}"));
    assert_eq!(cex.depth, 15);
    assert_eq!(cex.inputs.len(), 16);
    assert_eq!(bits_value(&cex.states[cex.depth]), 15);
    assert_eq!(bits_value(&cex.initial_state), 0);
    assert_eq!(report.stats.failed_outputs, 1);
}

#[test]
fn warm_start_from_three_frames_reaches_the_scratch_verdict() {
    let ts = shift_chain(6);
    let scratch = prove(&ts, &quick_config()).expect("scratch run");
    assert!(scratch.all_proven(), "scratch: {scratch}");

    let shallow = PdrConfig {
        frame_max: 2,
        deepening_rounds: 0,
        ..quick_config()
    };
    let first = prove_incremental(&ts, &shallow, &Z3Factory, None).expect("shallow run");
    assert_eq!(
        undecided_reason(&first.report, 0),
        Some(&UndecidedReason::FrameLimit)
    );
    let db = first.database.expect("three frames were explored");
    assert_eq!(db.num_frames(), 3);

    let resumed =
        prove_incremental(&ts, &quick_config(), &Z3Factory, Some(&db)).expect("warm run");
    assert!(resumed.report.revalidation_failures.is_empty());
    for (warm, cold) in resumed.report.outputs.iter().zip(&scratch.outputs) {
        assert_eq!(warm.verdict.verdict_class(), cold.verdict.verdict_class());
    }
    let invariant = resumed
        .report
        .verdict(0)
        .and_then(Verdict::invariant)
        .expect("proven after the warm start");
    verify_invariant(&ts, invariant, &Z3Factory).expect("warm invariant is inductive");
}

#[test]
fn conflict_limit_of_one_ends_undecided() {
    let ts = counter(8, 200);
    let config = PdrConfig {
        sat_conflict_limit: 1,
        frame_max: 1000,
        deepening_rounds: 0,
        ..quick_config()
    };
    let report = prove(&ts, &config).expect("run should complete");
    match report.verdict(0) {
        Some(Verdict::Undecided { reason, .. }) => assert!(
            matches!(reason, UndecidedReason::ResourceLimit(_)),
            "unexpected reason {reason}"
        ),
        other => panic!("Expected undecided, got: {other:?}"),
    }
    assert!(report.stats.sat_unknown >= 1, "{:?}", report.stats);
    assert_eq!(report.overall_verdict(), "undecided");
}

#[test]
fn frame_limit_without_deepening_is_reported() {
    let ts = counter(8, 200);
    let config = PdrConfig {
        frame_max: 3,
        ..quick_config()
    };
    let report = prove(&ts, &config).expect("run should complete");
    assert_eq!(undecided_reason(&report, 0), Some(&UndecidedReason::FrameLimit));
    assert_eq!(report.frames_explored, 3);
}

#[test]
fn deepening_doubles_the_frame_limit_until_the_counterexample() {
    let ts = counter(3, 6);
    let config = PdrConfig {
        frame_max: 2,
        deepening_rounds: 3,
        ..quick_config()
    };
    let outcome = prove_incremental(&ts, &config, &Z3Factory, None).expect("deepening run");
    let cex = outcome
        .report
        .verdict(0)
        .and_then(Verdict::counterexample)
        .unwrap_or_else(|| panic!("Expected a counterexample, got: {}", outcome.report));
    assert_eq!(cex.depth, 6);
    assert_eq!(bits_value(&cex.states[6]), 6);
}
