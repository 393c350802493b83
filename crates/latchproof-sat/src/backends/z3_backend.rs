use thiserror::Error;
use z3::ast::Bool;
use z3::SatResult as Z3SatResult;

use crate::lit::{Lit, Var};
use crate::solver::{SatResult, SatSolver, SolveBudget, SolverFactory};

#[derive(Debug, Error)]
pub enum Z3Error {
    #[error("Z3 error: {0}")]
    Internal(String),
    #[error("Unknown variable: {0}")]
    UnknownVariable(u32),
}

/// [`SatSolver`] over a Z3 solver instance, one Boolean constant per variable.
pub struct Z3SatSolver {
    solver: z3::Solver,
    vars: Vec<Bool>,
    model: Option<z3::Model>,
    last_assumptions: Vec<Lit>,
    last_assumption_terms: Vec<Bool>,
    failed: Vec<Lit>,
    /// Budget currently installed on the solver; `None` after a reset.
    applied_budget: Option<SolveBudget>,
}

impl Z3SatSolver {
    pub fn new() -> Self {
        Self {
            solver: z3::Solver::new(),
            vars: Vec::new(),
            model: None,
            last_assumptions: Vec::new(),
            last_assumption_terms: Vec::new(),
            failed: Vec::new(),
            applied_budget: None,
        }
    }

    fn term(&self, lit: Lit) -> Result<Bool, Z3Error> {
        let var = self
            .vars
            .get(lit.var().index())
            .ok_or(Z3Error::UnknownVariable(lit.var().0))?;
        Ok(if lit.is_negated() { var.not() } else { var.clone() })
    }

    /// Installs `budget` unless it is already in place. The conflict limit
    /// maps to Z3's deterministic `rlimit` effort counter.
    fn apply_budget(&mut self, budget: &SolveBudget) {
        if self.applied_budget == Some(*budget) {
            return;
        }
        let mut params = z3::Params::new();
        let rlimit = u32::try_from(budget.conflict_limit).unwrap_or(u32::MAX);
        params.set_u32("rlimit", rlimit);
        let timeout = budget
            .timeout_ms
            .map(|ms| u32::try_from(ms.max(1)).unwrap_or(u32::MAX))
            .unwrap_or(u32::MAX);
        params.set_u32("timeout", timeout);
        self.solver.set_params(&params);
        self.applied_budget = Some(*budget);
    }
}

impl Default for Z3SatSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SatSolver for Z3SatSolver {
    type Error = Z3Error;

    fn new_var(&mut self) -> Var {
        let var = Var(self.vars.len() as u32);
        self.vars.push(Bool::new_const(format!("v{}", var.0)));
        var
    }

    fn num_vars(&self) -> usize {
        self.vars.len()
    }

    fn add_clause(&mut self, lits: &[Lit]) -> Result<(), Z3Error> {
        let terms = lits
            .iter()
            .map(|&lit| self.term(lit))
            .collect::<Result<Vec<_>, _>>()?;
        let clause = match terms.as_slice() {
            [] => Bool::from_bool(false),
            [single] => single.clone(),
            _ => {
                let refs: Vec<&Bool> = terms.iter().collect();
                Bool::or(&refs)
            }
        };
        self.solver.assert(&clause);
        Ok(())
    }

    fn solve(&mut self, assumptions: &[Lit], budget: &SolveBudget) -> Result<SatResult, Z3Error> {
        self.apply_budget(budget);
        self.model = None;
        self.failed.clear();
        let terms = assumptions
            .iter()
            .map(|&lit| self.term(lit))
            .collect::<Result<Vec<_>, _>>()?;
        self.last_assumptions = assumptions.to_vec();
        self.last_assumption_terms = terms;
        match self.solver.check_assumptions(&self.last_assumption_terms) {
            Z3SatResult::Sat => {
                let model = self
                    .solver
                    .get_model()
                    .ok_or_else(|| Z3Error::Internal("SAT but no model available".into()))?;
                self.model = Some(model);
                Ok(SatResult::Sat)
            }
            Z3SatResult::Unsat => {
                for core_lit in self.solver.get_unsat_core() {
                    if let Some(idx) = self
                        .last_assumption_terms
                        .iter()
                        .position(|term| *term == core_lit)
                    {
                        self.failed.push(self.last_assumptions[idx]);
                    }
                }
                Ok(SatResult::Unsat)
            }
            Z3SatResult::Unknown => Ok(SatResult::Unknown(
                self.solver
                    .get_reason_unknown()
                    .unwrap_or_else(|| "Z3 returned unknown".into()),
            )),
        }
    }

    fn value(&self, lit: Lit) -> Option<bool> {
        let model = self.model.as_ref()?;
        let var = self.vars.get(lit.var().index())?;
        let value = model.eval::<Bool>(var, true)?.as_bool()?;
        Some(value ^ lit.is_negated())
    }

    fn failed_assumptions(&self) -> Vec<Lit> {
        self.failed.clone()
    }

    fn reset(&mut self) -> Result<(), Z3Error> {
        self.solver.reset();
        self.applied_budget = None;
        self.vars.clear();
        self.model = None;
        self.last_assumptions.clear();
        self.last_assumption_terms.clear();
        self.failed.clear();
        Ok(())
    }
}

/// Hands out fresh [`Z3SatSolver`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct Z3Factory;

impl SolverFactory for Z3Factory {
    type Solver = Z3SatSolver;

    fn create(&self) -> Z3SatSolver {
        Z3SatSolver::new()
    }
}
