use crate::lit::{Lit, Var};

/// Result of a satisfiability check.
#[derive(Debug, Clone, PartialEq)]
pub enum SatResult {
    Sat,
    Unsat,
    Unknown(String),
}

/// Limits handed to a single `solve` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SolveBudget {
    /// Backend search-effort limit (0 = none).
    pub conflict_limit: u64,
    /// Wall-clock limit in milliseconds.
    pub timeout_ms: Option<u64>,
}

impl SolveBudget {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn is_unlimited(&self) -> bool {
        self.conflict_limit == 0 && self.timeout_ms.is_none()
    }
}

/// Incremental CNF solver with assumptions.
pub trait SatSolver {
    type Error: std::error::Error + Send + Sync + 'static;

    fn new_var(&mut self) -> Var;

    fn num_vars(&self) -> usize;

    /// Adds a permanent clause. An empty clause makes the solver unsatisfiable.
    fn add_clause(&mut self, lits: &[Lit]) -> Result<(), Self::Error>;

    /// Solves under `assumptions`, which hold for this call only.
    fn solve(&mut self, assumptions: &[Lit], budget: &SolveBudget) -> Result<SatResult, Self::Error>;

    /// Value of `lit` in the model of the last SAT answer.
    fn value(&self, lit: Lit) -> Option<bool>;

    /// Assumptions of the last UNSAT answer that took part in the refutation.
    fn failed_assumptions(&self) -> Vec<Lit>;

    /// Forgets every variable and clause.
    fn reset(&mut self) -> Result<(), Self::Error>;

    fn solve_unbounded(&mut self, assumptions: &[Lit]) -> Result<SatResult, Self::Error> {
        self.solve(assumptions, &SolveBudget::unlimited())
    }
}

/// Creates fresh solver instances, one per frame.
pub trait SolverFactory {
    type Solver: SatSolver;

    fn create(&self) -> Self::Solver;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct MockSolver {
        answer: SatResult,
        budgets: Vec<SolveBudget>,
        vars: usize,
    }

    impl SatSolver for MockSolver {
        type Error = io::Error;

        fn new_var(&mut self) -> Var {
            self.vars += 1;
            Var(self.vars as u32 - 1)
        }

        fn num_vars(&self) -> usize {
            self.vars
        }

        fn add_clause(&mut self, _lits: &[Lit]) -> Result<(), Self::Error> {
            Ok(())
        }

        fn solve(
            &mut self,
            _assumptions: &[Lit],
            budget: &SolveBudget,
        ) -> Result<SatResult, Self::Error> {
            self.budgets.push(*budget);
            Ok(self.answer.clone())
        }

        fn value(&self, _lit: Lit) -> Option<bool> {
            None
        }

        fn failed_assumptions(&self) -> Vec<Lit> {
            Vec::new()
        }

        fn reset(&mut self) -> Result<(), Self::Error> {
            self.vars = 0;
            Ok(())
        }
    }

    #[test]
    fn unbounded_solve_passes_an_unlimited_budget() -> Result<(), io::Error> {
        let mut solver = MockSolver {
            answer: SatResult::Unsat,
            budgets: Vec::new(),
            vars: 0,
        };
        let v = solver.new_var();
        assert_eq!(solver.solve_unbounded(&[v.positive()])?, SatResult::Unsat);
        assert_eq!(solver.budgets, vec![SolveBudget::unlimited()]);
        assert!(solver.budgets[0].is_unlimited());
        solver.reset()?;
        assert_eq!(solver.num_vars(), 0);
        Ok(())
    }

    #[test]
    fn budget_with_timeout_is_limited() {
        let budget = SolveBudget {
            conflict_limit: 0,
            timeout_ms: Some(10),
        };
        assert!(!budget.is_unlimited());
    }
}
