//! Inductive generalization of blocked cubes.

use std::collections::HashSet;

use latchproof_sat::SolverFactory;
use tracing::debug;

use crate::cube::{Cube, StateLit};
use crate::error::PdrError;
use crate::manager::PdrManager;
use crate::oracle::CheckResult;

/// Counterexamples to generalization tried per dropped literal.
const MAX_CTG_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub(crate) enum Generalized {
    /// A cube, contained in the input cube's literals, blocked at the frame.
    Blocked(Cube),
    Predecessor(Cube),
}

impl<'a, F: SolverFactory> PdrManager<'a, F> {
    /// Positions of `cube`'s literals, lowest priority first.
    pub fn drop_order(&self, cube: &Cube) -> Vec<usize> {
        let mut order: Vec<usize> = (0..cube.len()).collect();
        order.sort_by_key(|&i| (self.prio[cube.lits()[i].register()], i));
        order
    }

    /// Generalizes `cube` relative to frame `k`, or returns a predecessor
    /// when the cube is not blocked there.
    pub fn generalize(&mut self, k: usize, cube: &Cube) -> Result<Generalized, PdrError> {
        let cube = cube.strip_witness();
        if let CheckResult::Predecessor(pred) = self.check_cube(k, Some(&cube), true)? {
            return Ok(Generalized::Predecessor(pred));
        }
        let mut min = self.reduce_clause(&cube).unwrap_or(cube);
        if self.config.skip_generalization {
            return Ok(Generalized::Blocked(min));
        }
        if self.config.simple {
            return self.simple_mic(k, &min).map(Generalized::Blocked);
        }

        let mut keep: HashSet<StateLit> = HashSet::new();
        let mut added = false;
        let mut order = self.drop_order(&min);
        let mut j = 0;
        while j < order.len() {
            let i = order[j];
            let lit = min.lits()[i];
            if keep.contains(&lit) || min.is_init_intersecting(Some(i)) {
                j += 1;
                continue;
            }
            let candidate = min.without(i);
            match self.check_cube(k, Some(&candidate), true)? {
                CheckResult::Blocked => {
                    min = candidate;
                    added = false;
                    order = self.drop_order(&min);
                }
                CheckResult::Predecessor(_) if !self.config.ctg_handling => j += 1,
                CheckResult::Predecessor(pred) => {
                    match self.down(k, &candidate, pred, &mut keep, &min, &mut added)? {
                        None => {
                            keep.insert(lit);
                            order = self.drop_order(&min);
                            j += 1;
                        }
                        Some(joined) => {
                            min = joined;
                            added = false;
                            order = self.drop_order(&min);
                            j = 0;
                        }
                    }
                }
            }
        }

        if self.config.two_round {
            min = self.simple_mic(k, &min)?;
        }
        debug!(frame = k, literals = min.len(), "pdr: generalized clause");
        Ok(Generalized::Blocked(min))
    }

    /// Plain literal dropping without counterexamples to generalization.
    pub fn simple_mic(&mut self, k: usize, cube: &Cube) -> Result<Cube, PdrError> {
        if self.config.skip_generalization {
            return Ok(cube.clone());
        }
        let mut min = cube.clone();
        let mut order = self.drop_order(&min);
        let mut j = 0;
        while j < order.len() {
            let i = order[j];
            if min.is_init_intersecting(Some(i)) {
                j += 1;
                continue;
            }
            let candidate = min.without(i);
            if self.check_cube(k, Some(&candidate), true)?.is_blocked() {
                min = candidate;
                order = self.drop_order(&min);
            } else {
                j += 1;
            }
        }
        Ok(min)
    }

    /// Tries to make `cube` blocked at `k` by first blocking the states that
    /// lead into it, then by intersecting it with its predecessor.
    ///
    /// `ind` is the cube being generalized, known to be blocked at `k`.
    fn down(
        &mut self,
        k: usize,
        cube: &Cube,
        mut pred: Cube,
        keep: &mut HashSet<StateLit>,
        ind: &Cube,
        added: &mut bool,
    ) -> Result<Option<Cube>, PdrError> {
        let kmax = self.last_frame();
        let mut cube = cube.clone();
        let mut ctgs = 0;
        loop {
            while ctgs < MAX_CTG_ATTEMPTS && k > 1 && !pred.is_init_intersecting(None) {
                // the solvers may assume `ind` while the CTGs are blocked
                if !*added {
                    self.strengthen_solvers(k, &ind.strip_witness())?;
                    *added = true;
                }
                let ctg = pred.strip_witness();
                if !self.check_cube(k - 1, Some(&ctg), true)?.is_blocked() {
                    break;
                }
                let ctg_min = self.reduce_clause(&ctg).unwrap_or(ctg);
                let mut l = k;
                while l < kmax && self.check_cube(l, Some(&ctg_min), false)?.is_blocked() {
                    l += 1;
                }
                let learned = self.simple_mic(l - 1, &ctg_min)?;
                debug!(frame = l, clause = %learned, "pdr: blocked counterexample to generalization");
                self.add_learned_clause(l, &learned)?;
                self.stats.ctg_clauses += 1;
                ctgs += 1;
                match self.check_cube(k, Some(&cube), true)? {
                    CheckResult::Blocked => return Ok(Some(cube)),
                    CheckResult::Predecessor(next) => pred = next,
                }
            }
            ctgs = 0;

            match cube.intersection(&pred, keep) {
                Some(joined) if !joined.is_init_intersecting(None) => cube = joined,
                _ => return Ok(None),
            }
            match self.check_cube(k, Some(&cube), true)? {
                CheckResult::Blocked => return Ok(Some(cube)),
                CheckResult::Predecessor(_) if cube.len() == 1 => return Ok(None),
                CheckResult::Predecessor(next) => pred = next,
            }
        }
    }
}
