//! Property-directed reachability for latchproof.
//!
//! The engine proves or refutes that the monitored outputs of a
//! [`TransitionSystem`] never assert. It keeps a sequence of frames, each an
//! over-approximation of the states reachable within that many steps, blocks
//! bad states through recursively scheduled proof obligations, and pushes the
//! learned clauses forward until two frames coincide. The result is a
//! verified inductive invariant, a counterexample replayed on the user's
//! system, or an undecided verdict naming the limit that stopped the search.
//!
//! Clause databases can be saved and reloaded across runs; reloaded clauses
//! are revalidated before use.

pub mod config;
pub mod cube;
pub mod design;
pub mod error;
pub mod incremental;
pub mod result;
pub mod stats;

mod abstraction;
mod block;
mod driver;
mod extract;
mod generalize;
mod manager;
mod obligation;
mod oracle;
mod push;
mod ternary;
mod timeout;

use latchproof_ir::TransitionSystem;
use latchproof_sat::backends::z3_backend::Z3Factory;
use latchproof_sat::SolverFactory;
use tracing::info;

pub use config::PdrConfig;
pub use cube::{Cube, StateLit};
pub use design::Design;
pub use error::PdrError;
pub use extract::render_pla;
pub use incremental::{ClauseDatabase, IncrementalOutcome};
pub use result::{
    ClauseLiteral, Counterexample, Invariant, InvariantClause, OutputVerdict, PdrReport,
    RevalidationFailure, UndecidedReason, Verdict,
};
pub use stats::PdrStats;

use crate::manager::{deadline_after_secs, PdrManager};

/// Checks every output of `ts` with the Z3 backend.
pub fn prove(ts: &TransitionSystem, config: &PdrConfig) -> Result<PdrReport, PdrError> {
    prove_with(ts, config, &Z3Factory)
}

/// Checks every output of `ts`, creating frame solvers with `factory`.
pub fn prove_with<F: SolverFactory>(
    ts: &TransitionSystem,
    config: &PdrConfig,
    factory: &F,
) -> Result<PdrReport, PdrError> {
    config.validate()?;
    let design = Design::new(ts)?;
    info!(
        registers = design.num_registers(),
        inputs = design.num_inputs(),
        outputs = design.num_outputs(),
        "pdr: starting"
    );
    let mut mgr = PdrManager::new(&design, config, factory);
    let explored = mgr.run(1)?;
    let report = mgr.report(explored);
    info!(
        verdict = report.overall_verdict(),
        stats = %report.stats,
        "pdr: finished"
    );
    Ok(report)
}

/// Checks `ts` starting from a saved clause database, if any.
///
/// When the frame limit stops the search, the clauses are saved without
/// their last frame and the search restarts from them with twice the limit,
/// at most `config.deepening_rounds` times. The overall deadline spans every
/// round. The outcome carries the final clause database for the next run.
pub fn prove_incremental<F: SolverFactory>(
    ts: &TransitionSystem,
    config: &PdrConfig,
    factory: &F,
    database: Option<&ClauseDatabase>,
) -> Result<IncrementalOutcome, PdrError> {
    config.validate()?;
    let design = Design::new(ts)?;
    let deadline = deadline_after_secs(config.timeout_secs);
    let mut round_config = config.clone();
    let mut saved = database.cloned();
    let mut stats = PdrStats::default();
    let mut revalidation_failures = None;
    let mut round = 0;
    loop {
        let mut mgr = PdrManager::with_deadline(&design, &round_config, factory, deadline);
        let (failures, explored) = match &saved {
            Some(db) => mgr.resume(db)?,
            None => (Vec::new(), mgr.run(1)?),
        };
        if revalidation_failures.is_none() {
            revalidation_failures = Some(failures);
        }
        let mut report = mgr.report(explored);
        stats.absorb(&report.stats);

        let frame_limited = report.outputs.iter().any(|o| {
            matches!(
                o.verdict,
                Verdict::Undecided {
                    reason: UndecidedReason::FrameLimit,
                    ..
                }
            )
        });
        if frame_limited && round < config.deepening_rounds && round_config.frame_max > 0 {
            saved = mgr.save_clauses(true);
            drop(mgr);
            round += 1;
            round_config.frame_max = round_config.frame_max.saturating_mul(2);
            info!(round, frame_max = round_config.frame_max, "pdr: deepening");
            continue;
        }

        let database = mgr.save_clauses(false);
        report.stats = stats;
        report.revalidation_failures = revalidation_failures.unwrap_or_default();
        info!(
            verdict = report.overall_verdict(),
            rounds = round + 1,
            stats = %report.stats,
            "pdr: finished"
        );
        return Ok(IncrementalOutcome { report, database });
    }
}

/// Independently checks that `invariant` holds initially, is preserved by
/// the transition relation and excludes every output it names.
pub fn verify_invariant<F: SolverFactory>(
    ts: &TransitionSystem,
    invariant: &Invariant,
    factory: &F,
) -> Result<(), PdrError> {
    let design = Design::new(ts)?;
    let mut cubes = Vec::with_capacity(invariant.cubes.len());
    for codes in &invariant.cubes {
        let cube = Cube::from_codes(codes)?;
        if cube
            .lits()
            .iter()
            .any(|l| l.register() >= design.num_registers())
        {
            return Err(PdrError::MalformedInput(format!(
                "invariant clause {cube} mentions an unknown register"
            )));
        }
        cubes.push(cube);
    }
    if let Some(&o) = invariant.outputs.iter().find(|&&o| o >= design.num_outputs()) {
        return Err(PdrError::MalformedInput(format!(
            "invariant names unknown output {o}"
        )));
    }
    let limits = extract::QueryLimits::default();
    extract::verify_clauses(&design, &cubes, &invariant.outputs, factory, limits)
}
