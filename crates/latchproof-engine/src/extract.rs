//! Counterexample and invariant extraction.

use std::time::Instant;

use latchproof_ir::normalize::RegisterOrigin;
use latchproof_ir::simulate::simulate;
use latchproof_ir::Edge;
use latchproof_sat::{ConeEncoder, Lit, SatResult, SatSolver, SolveBudget, SolverFactory};
use tracing::info;

use crate::cube::Cube;
use crate::design::Design;
use crate::error::PdrError;
use crate::manager::PdrManager;
use crate::push::remove_subsumed;
use crate::result::{ClauseLiteral, Counterexample, Invariant, InvariantClause};
use crate::timeout::remaining_timeout_ms;

/// Budget shared by every query of one invariant check.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct QueryLimits {
    pub deadline: Option<Instant>,
    /// Effort limit per query (0 = none).
    pub conflict_limit: u64,
}

impl QueryLimits {
    fn budget(&self) -> Result<SolveBudget, PdrError> {
        let timeout_ms = remaining_timeout_ms(self.deadline);
        if timeout_ms == Some(0) {
            return Err(PdrError::ResourceExhausted(
                "deadline passed during the invariant check".into(),
            ));
        }
        Ok(SolveBudget {
            conflict_limit: self.conflict_limit,
            timeout_ms,
        })
    }
}

impl<'a, F: SolverFactory> PdrManager<'a, F> {
    /// Maps a trace over normalized inputs back to the user's system and
    /// replays it there.
    pub fn build_counterexample(
        &self,
        output: usize,
        inputs: &[Vec<bool>],
    ) -> Result<Counterexample, PdrError> {
        let design = self.design;
        let (initial_state, original_inputs) =
            design.map().lift_trace(design.original(), inputs)?;
        let trace = simulate(design.original(), &initial_state, &original_inputs)?;
        let asserted = trace
            .outputs
            .last()
            .and_then(|o| o.get(output).copied())
            .unwrap_or(false);
        if !asserted {
            return Err(PdrError::InternalInvariantViolation(format!(
                "counterexample for output '{}' does not assert on the original system",
                design.output_name(output)
            )));
        }
        Ok(Counterexample {
            output,
            output_name: design.output_name(output).to_string(),
            initial_state,
            depth: original_inputs.len().saturating_sub(1),
            inputs: original_inputs,
            states: trace.states,
        })
    }

    /// Invariant made of the clauses at frames `k` and later.
    pub fn extract_invariant(&mut self, k: usize, outputs: &[usize]) -> Result<Invariant, PdrError> {
        let mut cubes: Vec<Cube> = self.frames[k..]
            .iter()
            .flat_map(|f| f.clauses.iter().cloned())
            .collect();
        remove_subsumed(&mut cubes);
        let design = self.design;
        let deadline = self.search_deadline();
        if self.config.minimize_invariant {
            let limits = QueryLimits {
                deadline,
                conflict_limit: self.config.sat_conflict_limit,
            };
            let before = cubes.len();
            cubes = minimize_invariant(design, cubes, outputs, self.factory(), limits)?;
            info!(before, after = cubes.len(), "pdr: minimized invariant");
        }
        if self.config.verify_invariant {
            let limits = QueryLimits {
                deadline,
                conflict_limit: 0,
            };
            verify_clauses(design, &cubes, outputs, self.factory(), limits)?;
        }
        let invariant = Invariant {
            frame: k,
            clauses: cubes.iter().map(|c| invariant_clause(design, c)).collect(),
            cubes: cubes.iter().map(Cube::codes).collect(),
            outputs: outputs.to_vec(),
            verified: self.config.verify_invariant,
        };
        if self.config.dump_invariant {
            let pla = render_pla(design.num_registers(), &cubes);
            match &self.config.invariant_path {
                Some(path) => std::fs::write(path, pla)?,
                None => info!(%pla, "pdr: invariant"),
            }
        }
        Ok(invariant)
    }
}

/// Clause excluding `cube`, over the user's register names.
fn invariant_clause(design: &Design, cube: &Cube) -> InvariantClause {
    let literals = cube
        .lits()
        .iter()
        .map(|lit| {
            let (register, complemented) = match design.map().registers[lit.register()] {
                RegisterOrigin::Direct {
                    original,
                    complemented,
                } => (
                    design.original().registers()[original].name.clone(),
                    complemented,
                ),
                RegisterOrigin::Initialized => {
                    (design.system().registers()[lit.register()].name.clone(), false)
                }
            };
            ClauseLiteral {
                register,
                value: lit.is_negated() ^ complemented,
            }
        })
        .collect();
    InvariantClause { literals }
}

/// Two-level cover of the invariant's cubes over the normalized registers.
pub fn render_pla(num_registers: usize, cubes: &[Cube]) -> String {
    let mut out = format!(".i {num_registers}\n.o 1\n.p {}\n", cubes.len());
    for cube in cubes {
        let mut row = vec!['-'; num_registers];
        for lit in cube.lits() {
            row[lit.register()] = if lit.is_negated() { '0' } else { '1' };
        }
        out.extend(row);
        out.push_str(" 1\n");
    }
    out.push_str(".e\n");
    out
}

/// Solver loaded with the clauses of `cubes`, each behind its own activation
/// literal when `guarded`.
struct InvariantSolver<S> {
    solver: S,
    encoder: ConeEncoder,
    activations: Vec<Lit>,
    limits: QueryLimits,
}

impl<S: SatSolver> InvariantSolver<S> {
    fn new(
        design: &Design,
        cubes: &[Cube],
        solver: S,
        guarded: bool,
        limits: QueryLimits,
    ) -> Result<Self, PdrError> {
        let mut this = Self {
            solver,
            encoder: ConeEncoder::new(),
            activations: Vec::new(),
            limits,
        };
        for cube in cubes {
            let mut clause = Vec::with_capacity(cube.len() + 1);
            if guarded {
                let act = this.solver.new_var();
                clause.push(act.negative());
                this.activations.push(act.positive());
            }
            for &lit in cube.lits() {
                let l = this.lit(design, design.register_edge(lit.register()))?;
                clause.push(!l.xor_sign(lit.is_negated()));
            }
            this.solver.add_clause(&clause).map_err(PdrError::solver)?;
        }
        Ok(this)
    }

    fn lit(&mut self, design: &Design, edge: Edge) -> Result<Lit, PdrError> {
        self.encoder
            .lit_for(&mut self.solver, design.system(), edge)
            .map_err(PdrError::from)
    }

    /// True on SAT.
    fn sat(&mut self, assumptions: &[Lit]) -> Result<bool, PdrError> {
        let budget = self.limits.budget()?;
        match self
            .solver
            .solve(assumptions, &budget)
            .map_err(PdrError::solver)?
        {
            SatResult::Sat => Ok(true),
            SatResult::Unsat => Ok(false),
            SatResult::Unknown(reason) => Err(PdrError::ResourceExhausted(format!(
                "invariant check gave up: {reason}"
            ))),
        }
    }
}

/// Why `cubes` fails to be an inductive invariant for `outputs`, if it does.
fn invariant_defect<F: SolverFactory>(
    design: &Design,
    cubes: &[Cube],
    outputs: &[usize],
    factory: &F,
    limits: QueryLimits,
) -> Result<Option<String>, PdrError> {
    if let Some(i) = cubes.iter().position(|c| c.is_init_intersecting(None)) {
        return Ok(Some(format!("clause {i} is violated by the initial state")));
    }
    let mut checker = InvariantSolver::new(design, cubes, factory.create(), false, limits)?;
    let mut safe = Vec::with_capacity(outputs.len());
    for &o in outputs {
        let bad = checker.lit(design, design.output_edge(o))?;
        if checker.sat(&[bad])? {
            return Ok(Some(format!(
                "invariant admits a state asserting '{}'",
                design.output_name(o)
            )));
        }
        safe.push(!bad);
    }
    for (i, cube) in cubes.iter().enumerate() {
        let mut assumptions = safe.clone();
        for &lit in cube.lits() {
            let next = checker.lit(design, design.next_edge(lit.register()))?;
            assumptions.push(next.xor_sign(lit.is_negated()));
        }
        if checker.sat(&assumptions)? {
            return Ok(Some(format!("clause {i} is not preserved by the transition relation")));
        }
    }
    Ok(None)
}

pub(crate) fn verify_clauses<F: SolverFactory>(
    design: &Design,
    cubes: &[Cube],
    outputs: &[usize],
    factory: &F,
    limits: QueryLimits,
) -> Result<(), PdrError> {
    match invariant_defect(design, cubes, outputs, factory, limits)? {
        None => Ok(()),
        Some(defect) => Err(PdrError::InternalInvariantViolation(defect)),
    }
}

/// Clauses needed to exclude the outputs, read off an assumption core.
fn property_core<F: SolverFactory>(
    design: &Design,
    cubes: &[Cube],
    outputs: &[usize],
    factory: &F,
    limits: QueryLimits,
) -> Result<Vec<Cube>, PdrError> {
    let mut checker = InvariantSolver::new(design, cubes, factory.create(), true, limits)?;
    let mut needed = vec![false; cubes.len()];
    for &o in outputs {
        let bad = checker.lit(design, design.output_edge(o))?;
        let mut assumptions = checker.activations.clone();
        assumptions.push(bad);
        if checker.sat(&assumptions)? {
            return Ok(cubes.to_vec());
        }
        let failed = checker.solver.failed_assumptions();
        for (i, act) in checker.activations.iter().enumerate() {
            if failed.contains(act) {
                needed[i] = true;
            }
        }
    }
    Ok(cubes
        .iter()
        .zip(needed)
        .filter(|(_, n)| *n)
        .map(|(c, _)| c.clone())
        .collect())
}

/// Drops clauses the invariant does not need, keeping it inductive.
pub(crate) fn minimize_invariant<F: SolverFactory>(
    design: &Design,
    cubes: Vec<Cube>,
    outputs: &[usize],
    factory: &F,
    limits: QueryLimits,
) -> Result<Vec<Cube>, PdrError> {
    let core = property_core(design, &cubes, outputs, factory, limits)?;
    let mut current = if core.len() < cubes.len()
        && invariant_defect(design, &core, outputs, factory, limits)?.is_none()
    {
        core
    } else {
        cubes
    };
    let mut changed = true;
    while changed {
        changed = false;
        let mut i = 0;
        while i < current.len() {
            let mut candidate = current.clone();
            candidate.remove(i);
            if invariant_defect(design, &candidate, outputs, factory, limits)?.is_none() {
                current = candidate;
                changed = true;
            } else {
                i += 1;
            }
        }
    }
    Ok(current)
}
