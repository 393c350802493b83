//! Forward propagation of clauses between frames.

use latchproof_sat::SolverFactory;
use tracing::debug;

use crate::cube::Cube;
use crate::error::PdrError;
use crate::manager::PdrManager;

/// Canonical order with every clause subsumed by another one removed.
pub(crate) fn remove_subsumed(clauses: &mut Vec<Cube>) {
    clauses.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    let mut kept: Vec<Cube> = Vec::with_capacity(clauses.len());
    for cube in clauses.drain(..) {
        if !kept.iter().any(|k| k.subsumes(&cube)) {
            kept.push(cube);
        }
    }
    kept.sort();
    *clauses = kept;
}

impl<'a, F: SolverFactory> PdrManager<'a, F> {
    /// Moves every clause that holds one frame later forward.
    ///
    /// Returns the first frame left without clauses: frames from there on
    /// form an inductive invariant.
    pub fn push_clauses(&mut self) -> Result<Option<usize>, PdrError> {
        let kmax = self.last_frame();
        for k in 1..kmax {
            remove_subsumed(&mut self.frames[k].clauses);
            let mut j = 0;
            while j < self.frames[k].clauses.len() {
                let cube = self.frames[k].clauses[j].clone();
                if !self.check_cube(k, Some(&cube), false)?.is_blocked() {
                    j += 1;
                    continue;
                }
                let reduced = self.reduce_clause(&cube).unwrap_or(cube);
                self.add_clause_to_solver(k + 1, &reduced)?;
                self.frames[k + 1].clauses.retain(|c| !reduced.subsumes(c));
                self.frames[k + 1].clauses.push(reduced);
                self.frames[k].clauses.remove(j);
                self.stats.pushed_clauses += 1;
            }
            if self.frames[k].clauses.is_empty() {
                debug!(frame = k, "pdr: frame emptied by propagation");
                return Ok(Some(k));
            }
        }
        if kmax > 0 {
            remove_subsumed(&mut self.frames[kmax].clauses);
        }
        Ok(None)
    }

    /// Clause lists of every frame, for comparing states.
    pub fn frame_snapshot(&self) -> Vec<Vec<Vec<u32>>> {
        self.frames
            .iter()
            .map(|f| f.clauses.iter().map(Cube::codes).collect())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PdrConfig;
    use crate::cube::StateLit;
    use crate::design::Design;
    use latchproof_ir::{Reset, TransitionSystem};
    use latchproof_sat::backends::z3_backend::Z3Factory;
    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn cube(lits: &[(usize, bool)]) -> Cube {
        Cube::new(lits.iter().map(|&(r, n)| StateLit::new(r, n))).unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn subsumed_clauses_are_removed_in_any_order() {
        let mut clauses = vec![
            cube(&[(0, false), (1, true)]),
            cube(&[(2, false)]),
            cube(&[(0, false)]),
            cube(&[(0, false)]),
        ];
        remove_subsumed(&mut clauses);
        let codes: Vec<Vec<u32>> = clauses.iter().map(Cube::codes).collect();
        assert_eq!(codes, vec![vec![0], vec![4]]);
    }

    #[test]
    fn invariant_clause_travels_to_an_empty_frame() -> TestResult {
        // r never rises
        let mut ts = TransitionSystem::new();
        let r = ts.add_register("r", Reset::Zero)?;
        ts.set_next(r, r)?;
        ts.add_output("bad", r)?;
        let design = Design::new(&ts)?;
        let config = PdrConfig::default();
        let mut mgr = PdrManager::new(&design, &config, &Z3Factory);
        for _ in 0..3 {
            mgr.push_frame()?;
        }
        mgr.add_learned_clause(1, &cube(&[(0, false)]))?;
        assert_eq!(mgr.push_clauses()?, Some(1));
        assert_eq!(mgr.frames[2].clauses.len(), 1);
        Ok(())
    }

    #[test]
    fn second_pass_without_new_clauses_is_a_no_op() -> TestResult {
        // i -> s0 -> s1 -> s2 -> s3 with s0 gated by itself, so nothing rises
        let mut ts = TransitionSystem::new();
        let i = ts.add_input("i")?;
        let stages = (0..4)
            .map(|n| ts.add_register(format!("s{n}"), Reset::Zero))
            .collect::<Result<Vec<_>, _>>()?;
        let feed = ts.and(stages[0], i);
        ts.set_next(stages[0], feed)?;
        for n in 1..4 {
            ts.set_next(stages[n], stages[n - 1])?;
        }
        ts.add_output("bad", stages[3])?;
        let design = Design::new(&ts)?;
        let config = PdrConfig {
            frame_max: 3,
            recycle_threshold: 0,
            ..PdrConfig::default()
        };
        let mut mgr = PdrManager::new(&design, &config, &Z3Factory);
        mgr.run(1)?;
        let first = mgr.push_clauses()?;
        let once = mgr.frame_snapshot();
        assert_eq!(mgr.push_clauses()?, first);
        assert_eq!(mgr.frame_snapshot(), once);
        Ok(())
    }
}
