//! Engine state shared by every PDR component.

use std::time::Instant;

use latchproof_ir::{Edge, NodeId, TransitionSystem};
use latchproof_sat::{ConeEncoder, Lit, SatResult, SatSolver, SolveBudget, SolverFactory, Var};
use tracing::{debug, warn};

use crate::config::PdrConfig;
use crate::cube::{Cube, StateLit};
use crate::design::Design;
use crate::error::PdrError;
use crate::obligation::ObligationQueue;
use crate::result::{Counterexample, Invariant, UndecidedReason};
use crate::stats::PdrStats;
use crate::ternary::TernarySim;
use crate::timeout::{deadline_from_millis, earliest, remaining_timeout_ms};

/// One solver together with the part of the system encoded into it.
pub(crate) struct SatContext<S> {
    pub solver: S,
    pub encoder: ConeEncoder,
    /// Activation variables created since the last rebuild.
    pub activations: usize,
}

impl<S: SatSolver> SatContext<S> {
    fn new(solver: S) -> Self {
        Self {
            solver,
            encoder: ConeEncoder::new(),
            activations: 0,
        }
    }

    pub fn lit(&mut self, ts: &TransitionSystem, edge: Edge) -> Result<Lit, PdrError> {
        self.encoder
            .lit_for(&mut self.solver, ts, edge)
            .map_err(PdrError::from)
    }

    pub fn add_clause(&mut self, lits: &[Lit]) -> Result<(), PdrError> {
        self.solver.add_clause(lits).map_err(PdrError::solver)
    }

    pub fn new_activation(&mut self) -> Var {
        self.activations += 1;
        self.solver.new_var()
    }

    /// Model value of an encoded node; nodes outside the encoded cone read false.
    pub fn model_value(&self, node: NodeId) -> bool {
        self.encoder
            .var_of(node)
            .and_then(|v| self.solver.value(v.positive()))
            .unwrap_or(false)
    }

    pub fn is_encoded(&self, node: NodeId) -> bool {
        self.encoder.var_of(node).is_some()
    }

    fn reset(&mut self) -> Result<(), PdrError> {
        self.solver.reset().map_err(PdrError::solver)?;
        self.encoder.clear();
        self.activations = 0;
        Ok(())
    }
}

/// Clauses first proven at one frame, plus the solver for the union of
/// this frame and every later one.
pub(crate) struct Frame<S> {
    pub clauses: Vec<Cube>,
    pub ctx: SatContext<S>,
    /// Outputs whose negation was asserted when the frame was closed.
    pub constrained_outputs: Vec<usize>,
}

#[derive(Debug, Clone)]
pub(crate) enum OutputStatus {
    Open,
    Proven(Invariant),
    Failed(Counterexample),
    Undecided { frame: usize, reason: UndecidedReason },
}

impl OutputStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, OutputStatus::Open)
    }
}

/// Deadline `secs` seconds from now; none for 0.
pub(crate) fn deadline_after_secs(secs: u64) -> Option<Instant> {
    deadline_from_millis(Instant::now(), secs.saturating_mul(1000))
}

pub(crate) struct PdrManager<'a, F: SolverFactory> {
    pub design: &'a Design,
    pub config: &'a PdrConfig,
    factory: &'a F,
    pub frames: Vec<Frame<F::Solver>>,
    pub queue: ObligationQueue,
    /// Generalization priority per register.
    pub prio: Vec<u64>,
    pub shift: u32,
    obligation_counter: u64,
    pub restart_limit: usize,
    pub stats: PdrStats,
    pub current_output: usize,
    pub status: Vec<OutputStatus>,
    /// Registers made visible by refinement; empty unless abstraction is on.
    pub refined: Vec<bool>,
    pub pruned: Vec<bool>,
    /// Core of the last blocked query, as cube literals.
    pub core: Vec<StateLit>,
    pub ternary: TernarySim,
    pub started: Instant,
    pub deadline: Option<Instant>,
    pub gap_deadline: Option<Instant>,
    pub output_deadline: Option<Instant>,
}

impl<'a, F: SolverFactory> PdrManager<'a, F> {
    pub fn new(design: &'a Design, config: &'a PdrConfig, factory: &'a F) -> Self {
        Self::with_deadline(design, config, factory, deadline_after_secs(config.timeout_secs))
    }

    pub fn with_deadline(
        design: &'a Design,
        config: &'a PdrConfig,
        factory: &'a F,
        deadline: Option<Instant>,
    ) -> Self {
        let n = design.num_registers();
        let shift = usize::BITS - n.leading_zeros();
        let prio = if config.flop_priority_order {
            design.structural_rank(shift)
        } else {
            vec![0; n]
        };
        let abstraction = if config.use_abstraction { n } else { 0 };
        Self {
            design,
            config,
            factory,
            frames: Vec::new(),
            queue: ObligationQueue::new(),
            prio,
            shift,
            obligation_counter: 0,
            restart_limit: config.restart_limit,
            stats: PdrStats::default(),
            current_output: 0,
            status: vec![OutputStatus::Open; design.num_outputs()],
            refined: vec![false; abstraction],
            pruned: vec![false; abstraction],
            core: Vec::new(),
            ternary: TernarySim::new(),
            started: Instant::now(),
            deadline,
            gap_deadline: deadline_after_secs(config.gap_timeout_secs),
            output_deadline: None,
        }
    }

    pub fn factory(&self) -> &'a F {
        self.factory
    }

    pub fn last_frame(&self) -> usize {
        self.frames.len().saturating_sub(1)
    }

    pub fn next_obligation_priority(&mut self) -> u64 {
        self.obligation_counter += 1;
        self.obligation_counter
    }

    pub fn is_visible(&self, reg: usize) -> bool {
        !self.config.use_abstraction
            || self.refined.get(reg).copied().unwrap_or(true)
            || self.prio[reg] >> self.shift > 0
    }

    /// Opens a new frame with an empty clause list.
    pub fn push_frame(&mut self) -> Result<(), PdrError> {
        let k = self.frames.len();
        self.frames.push(Frame {
            clauses: Vec::new(),
            ctx: SatContext::new(self.factory.create()),
            constrained_outputs: Vec::new(),
        });
        self.populate(k)
    }

    /// Loads the solver of frame `k` from the clause database.
    fn populate(&mut self, k: usize) -> Result<(), PdrError> {
        let ts = self.design.system();
        if k == 0 {
            for r in 0..self.design.num_registers() {
                let edge = self.design.register_edge(r);
                let ctx = &mut self.frames[0].ctx;
                let lit = ctx.lit(ts, edge)?;
                ctx.add_clause(&[!lit])?;
            }
            return Ok(());
        }
        let clauses: Vec<Cube> = self.frames[k..]
            .iter()
            .flat_map(|f| f.clauses.iter().cloned())
            .collect();
        for cube in &clauses {
            self.add_clause_to_solver(k, cube)?;
        }
        for o in self.frames[k].constrained_outputs.clone() {
            self.assert_output_negation(k, o)?;
        }
        Ok(())
    }

    /// Rebuilds the solver of frame `k`.
    pub fn rebuild(&mut self, k: usize) -> Result<(), PdrError> {
        self.frames[k].ctx.reset()?;
        self.populate(k)
    }

    /// Frame `k`'s context, rebuilt first if it has collected too many
    /// activation variables.
    pub fn fetch_context(&mut self, k: usize) -> Result<&mut SatContext<F::Solver>, PdrError> {
        let threshold = self.config.recycle_threshold;
        if threshold > 0 && self.frames[k].ctx.activations > threshold {
            warn!(
                frame = k,
                activations = self.frames[k].ctx.activations,
                "pdr: recycling frame solver"
            );
            self.stats.recycles += 1;
            self.rebuild(k)?;
        }
        Ok(&mut self.frames[k].ctx)
    }

    /// Solver literal stating that `lit` holds, now or after one step.
    pub fn state_lit(&mut self, k: usize, lit: StateLit, next: bool) -> Result<Lit, PdrError> {
        let edge = if next {
            self.design.next_edge(lit.register())
        } else {
            self.design.register_edge(lit.register())
        };
        let ts = self.design.system();
        let solver_lit = self.frames[k].ctx.lit(ts, edge)?;
        Ok(solver_lit.xor_sign(lit.is_negated()))
    }

    pub fn add_clause_to_solver(&mut self, k: usize, cube: &Cube) -> Result<(), PdrError> {
        let mut clause = Vec::with_capacity(cube.len());
        for &lit in cube.lits() {
            clause.push(!self.state_lit(k, lit, false)?);
        }
        self.frames[k].ctx.add_clause(&clause)
    }

    fn assert_output_negation(&mut self, k: usize, output: usize) -> Result<(), PdrError> {
        let edge = self.design.output_edge(output);
        let ts = self.design.system();
        let ctx = &mut self.frames[k].ctx;
        let lit = ctx.lit(ts, edge)?;
        ctx.add_clause(&[!lit])
    }

    /// Asserts `!output` in frame `k`, where the output is known to be blocked.
    pub fn constrain_output(&mut self, k: usize, output: usize) -> Result<(), PdrError> {
        if self.frames[k].constrained_outputs.contains(&output) {
            return Ok(());
        }
        self.frames[k].constrained_outputs.push(output);
        self.assert_output_negation(k, output)
    }

    /// Adds the clause excluding `cube` to the solvers of frames 1..=k
    /// without recording it in the clause database.
    pub fn strengthen_solvers(&mut self, k: usize, cube: &Cube) -> Result<(), PdrError> {
        for j in 1..=k {
            self.add_clause_to_solver(j, cube)?;
        }
        Ok(())
    }

    /// Records `cube` as blocked at frame `k` and strengthens frames 1..=k.
    pub fn store_clause(&mut self, k: usize, cube: &Cube) -> Result<(), PdrError> {
        let cube = cube.strip_witness();
        self.strengthen_solvers(k, &cube)?;
        self.frames[k].clauses.push(cube);
        Ok(())
    }

    pub fn bump_priorities(&mut self, cube: &Cube) {
        for lit in cube.lits() {
            self.prio[lit.register()] += 1 << self.shift;
        }
    }

    pub fn add_learned_clause(&mut self, k: usize, cube: &Cube) -> Result<(), PdrError> {
        debug!(frame = k, clause = %cube, "pdr: learned clause");
        self.bump_priorities(cube);
        self.stats.learned_clauses += 1;
        self.store_clause(k, cube)
    }

    /// True when a clause stored at `k` or later already excludes `cube`.
    pub fn subsumed_at(&self, k: usize, cube: &Cube) -> bool {
        self.frames[k..]
            .iter()
            .any(|f| f.clauses.iter().any(|c| c.subsumes(cube)))
    }

    pub fn budget(&self, limited: bool) -> Result<SolveBudget, PdrError> {
        let timeout_ms = remaining_timeout_ms(self.search_deadline());
        if timeout_ms == Some(0) {
            return Err(PdrError::ResourceExhausted(
                "deadline passed before the SAT query".into(),
            ));
        }
        Ok(SolveBudget {
            conflict_limit: if limited {
                self.config.sat_conflict_limit
            } else {
                0
            },
            timeout_ms,
        })
    }

    /// Solves frame `k` under `assumptions`; true on SAT.
    pub fn solve(&mut self, k: usize, assumptions: &[Lit], limited: bool) -> Result<bool, PdrError> {
        let budget = self.budget(limited)?;
        self.stats.sat_calls += 1;
        match self.frames[k]
            .ctx
            .solver
            .solve(assumptions, &budget)
            .map_err(PdrError::solver)?
        {
            SatResult::Sat => Ok(true),
            SatResult::Unsat => Ok(false),
            SatResult::Unknown(reason) => {
                self.stats.sat_unknown += 1;
                Err(PdrError::ResourceExhausted(format!(
                    "SAT query at frame {k} gave up: {reason}"
                )))
            }
        }
    }

    /// Soonest of the global, gap and per-output deadlines.
    pub fn search_deadline(&self) -> Option<Instant> {
        earliest(&[self.deadline, self.gap_deadline, self.output_deadline])
    }

    pub fn any_deadline_passed(&self) -> bool {
        remaining_timeout_ms(self.search_deadline()) == Some(0)
    }

    pub fn total_clauses(&self) -> usize {
        self.frames.iter().map(|f| f.clauses.len()).sum()
    }

    /// Number of outputs still being worked on.
    pub fn open_outputs(&self) -> usize {
        self.status.iter().filter(|s| s.is_open()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use latchproof_ir::Reset;
    use latchproof_sat::backends::z3_backend::Z3Factory;
    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn two_registers() -> Result<Design, PdrError> {
        let mut ts = TransitionSystem::new();
        let a = ts.add_register("a", Reset::Zero)?;
        let b = ts.add_register("b", Reset::Zero)?;
        ts.set_next(a, b)?;
        ts.set_next(b, a)?;
        ts.add_output("bad", a)?;
        Design::new(&ts)
    }

    #[test]
    fn frame_zero_holds_only_the_initial_state() -> TestResult {
        let design = two_registers()?;
        let config = PdrConfig::default();
        let mut mgr = PdrManager::new(&design, &config, &Z3Factory);
        mgr.push_frame()?;
        let a = mgr.state_lit(0, StateLit::new(0, false), false)?;
        assert!(!mgr.solve(0, &[a], false)?);
        let not_a = mgr.state_lit(0, StateLit::new(0, true), false)?;
        assert!(mgr.solve(0, &[not_a], false)?);
        Ok(())
    }

    #[test]
    fn stored_clauses_reach_every_lower_frame() -> TestResult {
        let design = two_registers()?;
        let config = PdrConfig::default();
        let mut mgr = PdrManager::new(&design, &config, &Z3Factory);
        for _ in 0..3 {
            mgr.push_frame()?;
        }
        let cube = Cube::new([StateLit::new(0, false)])?;
        mgr.add_learned_clause(2, &cube)?;
        assert_eq!(mgr.total_clauses(), 1);
        assert!(mgr.subsumed_at(1, &Cube::new([StateLit::new(0, false), StateLit::new(1, true)])?));
        assert!(!mgr.subsumed_at(3, &cube));
        for k in 1..=2 {
            let a = mgr.state_lit(k, StateLit::new(0, false), false)?;
            assert!(!mgr.solve(k, &[a], false)?);
        }
        let a = mgr.state_lit(3, StateLit::new(0, false), false)?;
        assert!(mgr.solve(3, &[a], false)?);
        assert_eq!(mgr.prio[0], 1 << mgr.shift);
        Ok(())
    }

    #[test]
    fn recycled_context_keeps_clauses_and_constraints() -> TestResult {
        let design = two_registers()?;
        let config = PdrConfig {
            recycle_threshold: 1,
            ..PdrConfig::default()
        };
        let mut mgr = PdrManager::new(&design, &config, &Z3Factory);
        mgr.push_frame()?;
        mgr.push_frame()?;
        mgr.store_clause(1, &Cube::new([StateLit::new(1, false)])?)?;
        mgr.constrain_output(1, 0)?;
        mgr.frames[1].ctx.new_activation();
        mgr.frames[1].ctx.new_activation();
        mgr.fetch_context(1)?;
        assert_eq!(mgr.stats.recycles, 1);
        assert_eq!(mgr.frames[1].ctx.activations, 0);
        let a = mgr.state_lit(1, StateLit::new(0, false), false)?;
        let b = mgr.state_lit(1, StateLit::new(1, false), false)?;
        assert!(!mgr.solve(1, &[a], false)?);
        assert!(!mgr.solve(1, &[b], false)?);
        Ok(())
    }

    #[test]
    fn expired_deadline_is_resource_exhaustion() -> TestResult {
        let design = two_registers()?;
        let config = PdrConfig::default();
        let past = Instant::now() - std::time::Duration::from_secs(1);
        let mut mgr = PdrManager::with_deadline(&design, &config, &Z3Factory, Some(past));
        mgr.push_frame()?;
        let err = mgr.solve(0, &[], true).err();
        assert!(err.is_some_and(|e| e.is_resource_exhausted()));
        Ok(())
    }
}
