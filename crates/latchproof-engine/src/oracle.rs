//! Relative-induction queries against the frame solvers.

use std::collections::HashSet;

use latchproof_ir::Edge;
use latchproof_sat::SolverFactory;

use crate::cube::{Cube, InputLit, StateLit};
use crate::error::PdrError;
use crate::manager::PdrManager;

#[derive(Debug, Clone)]
pub(crate) enum CheckResult {
    /// No successor of `F_k ∧ ¬cube` lands in the cube; the core is kept.
    Blocked,
    /// A minimized state of `F_k` with a successor in the target.
    Predecessor(Cube),
}

impl CheckResult {
    pub fn is_blocked(&self) -> bool {
        matches!(self, CheckResult::Blocked)
    }
}

impl<'a, F: SolverFactory> PdrManager<'a, F> {
    /// Checks `F_k ∧ ¬cube ∧ T ∧ cube'`, or `F_k ∧ output` when `cube` is
    /// `None`.
    ///
    /// `limited` applies the configured conflict budget; deadlines always
    /// apply. An unknown answer is `ResourceExhausted`.
    pub fn check_cube(
        &mut self,
        k: usize,
        cube: Option<&Cube>,
        limited: bool,
    ) -> Result<CheckResult, PdrError> {
        let design = self.design;
        let ts = design.system();
        self.fetch_context(k)?;

        let mut assumptions = Vec::new();
        let mut assumed = Vec::new();
        let mut targets: Vec<(Edge, bool)> = Vec::new();
        let mut activation = None;
        match cube {
            Some(cube) => {
                let mut clause = Vec::with_capacity(cube.len() + 1);
                let act = self.frames[k].ctx.new_activation();
                clause.push(act.negative());
                for &lit in cube.lits() {
                    clause.push(!self.state_lit(k, lit, false)?);
                }
                self.frames[k].ctx.add_clause(&clause)?;
                assumptions.push(act.positive());
                activation = Some(act);
                for lit in self.assumption_order(cube) {
                    assumptions.push(self.state_lit(k, lit, true)?);
                    assumed.push(lit);
                    targets.push((design.next_edge(lit.register()), !lit.is_negated()));
                }
            }
            None => {
                let edge = design.output_edge(self.current_output);
                assumptions.push(self.frames[k].ctx.lit(ts, edge)?);
                targets.push((edge, true));
            }
        }

        let sat = self.solve(k, &assumptions, limited)?;
        let result = if sat {
            CheckResult::Predecessor(self.extract_predecessor(k, &targets))
        } else {
            let failed: HashSet<_> = self.frames[k]
                .ctx
                .solver
                .failed_assumptions()
                .into_iter()
                .collect();
            let offset = assumptions.len() - assumed.len();
            let mut core: Vec<StateLit> = assumed
                .iter()
                .enumerate()
                .filter(|(i, _)| failed.contains(&assumptions[offset + i]))
                .map(|(_, l)| *l)
                .collect();
            core.sort_unstable();
            self.core = core;
            CheckResult::Blocked
        };
        if let Some(act) = activation {
            self.frames[k].ctx.add_clause(&[act.negative()])?;
        }
        Ok(result)
    }

    /// Next-state assumptions in the order the solver should see them.
    fn assumption_order(&self, cube: &Cube) -> Vec<StateLit> {
        let mut lits = cube.lits().to_vec();
        if self.config.flop_priority_order {
            lits.sort_by(|a, b| {
                self.prio[b.register()]
                    .cmp(&self.prio[a.register()])
                    .then(a.cmp(b))
            });
        }
        lits
    }

    /// Registers in the order ternary simulation tries to drop them.
    fn ternary_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.design.num_registers()).collect();
        order.sort_by_key(|&r| (self.prio[r], r));
        order
    }

    fn extract_predecessor(&mut self, k: usize, targets: &[(Edge, bool)]) -> Cube {
        let design = self.design;
        let ts = design.system();
        let ctx = &self.frames[k].ctx;
        let registers: Vec<bool> = (0..design.num_registers())
            .map(|r| ctx.model_value(design.register_edge(r).node()))
            .collect();
        let mut inputs = vec![false; design.num_inputs()];
        let mut witness = Vec::new();
        for (i, input) in ts.inputs().iter().enumerate() {
            if ctx.is_encoded(input.node) {
                inputs[i] = ctx.model_value(input.node);
                witness.push(InputLit {
                    input: i,
                    value: inputs[i],
                });
            }
        }

        let order = self.ternary_order();
        let kept = self.ternary.minimize(
            ts,
            design.fanouts(),
            &registers,
            &inputs,
            targets,
            &order,
        );
        let mut lits = Vec::new();
        let mut hidden = Vec::new();
        for (r, &keep) in kept.iter().enumerate() {
            if !keep {
                continue;
            }
            if self.is_visible(r) {
                lits.push(StateLit::new(r, !registers[r]));
            } else {
                hidden.push(r);
            }
        }
        Cube::from_sorted(lits, witness, hidden)
    }

    /// Shrinks `cube` to the literals of the last core. Returns `None` when
    /// nothing can be dropped.
    pub fn reduce_clause(&self, cube: &Cube) -> Option<Cube> {
        let mut lits: Vec<StateLit> = cube
            .lits()
            .iter()
            .copied()
            .filter(|l| self.core.binary_search(l).is_ok())
            .collect();
        if lits.iter().all(|l| l.is_negated()) {
            if let Some(pos) = cube.first_positive() {
                let at = lits.partition_point(|l| *l < pos);
                lits.insert(at, pos);
            }
        }
        if lits.len() >= cube.len() {
            return None;
        }
        Some(Cube::from_sorted(lits, Vec::new(), Vec::new()))
    }

    /// True when the clauses of frame `k` alone exclude every state of `cube`.
    pub fn blocked_by_frame(&mut self, k: usize, cube: &Cube) -> Result<bool, PdrError> {
        self.fetch_context(k)?;
        let mut assumptions = Vec::with_capacity(cube.len());
        for &lit in cube.lits() {
            assumptions.push(self.state_lit(k, lit, false)?);
        }
        match self.solve(k, &assumptions, true) {
            Ok(sat) => Ok(!sat),
            // an inconclusive shortcut just falls through to generalization
            Err(PdrError::ResourceExhausted(_)) if !self.any_deadline_passed() => Ok(false),
            Err(err) => Err(err),
        }
    }
}
