//! Obligation-chain replay and register-visibility refinement.

use std::rc::Rc;

use latchproof_ir::simulate::simulate;
use latchproof_sat::SolverFactory;
use tracing::info;

use crate::cube::Cube;
use crate::error::PdrError;
use crate::manager::PdrManager;
use crate::obligation::ProofObligation;
use crate::result::Counterexample;

#[derive(Debug)]
pub(crate) enum Replay {
    Real(Counterexample),
    /// The chain did not replay; the visible register set grew.
    Spurious,
}

fn cube_holds(cube: &Cube, state: &[bool]) -> bool {
    cube.lits()
        .iter()
        .all(|l| state.get(l.register()).copied().unwrap_or(false) != l.is_negated())
}

impl<'a, F: SolverFactory> PdrManager<'a, F> {
    /// Replays the obligation chain starting at `head` on the normalized
    /// system.
    pub fn replay_chain(&mut self, head: &Rc<ProofObligation>) -> Result<Replay, PdrError> {
        let design = self.design;
        let chain = head.chain();
        let inputs: Vec<Vec<bool>> = chain
            .iter()
            .map(|o| {
                let mut step = vec![false; design.num_inputs()];
                for w in o.cube.witness() {
                    step[w.input] = w.value;
                }
                step
            })
            .collect();
        let zero = vec![false; design.num_registers()];
        let trace = simulate(design.system(), &zero, &inputs)?;

        let mismatch = (0..chain.len()).find(|&j| !cube_holds(&chain[j].cube, &trace.states[j]));
        let asserted = trace
            .outputs
            .last()
            .and_then(|o| o.get(self.current_output).copied())
            .unwrap_or(false);
        if mismatch.is_none() && asserted {
            return self
                .build_counterexample(self.current_output, &inputs)
                .map(Replay::Real);
        }
        if !self.config.use_abstraction {
            return Err(PdrError::InternalInvariantViolation(format!(
                "obligation chain for output '{}' does not replay (step {mismatch:?})",
                design.output_name(self.current_output)
            )));
        }
        let culprits = match mismatch {
            Some(j) if j > 0 => chain[j - 1].cube.hidden_support().to_vec(),
            Some(_) => Vec::new(),
            None => chain[chain.len() - 1].cube.hidden_support().to_vec(),
        };
        self.refine(&culprits);
        Ok(Replay::Spurious)
    }

    /// Makes `registers` visible, or every register when none of them is new.
    pub fn refine(&mut self, registers: &[usize]) {
        let mut added = 0;
        for &r in registers {
            if !self.is_visible(r) {
                self.refined[r] = true;
                added += 1;
            }
        }
        if added == 0 {
            self.refined.iter_mut().for_each(|v| *v = true);
        }
        self.stats.refinements += 1;
        info!(added, visible = self.visible_count(), "pdr: refined abstraction");
    }

    /// Hides refined registers that no learned clause mentions. Each register
    /// is hidden at most once.
    pub fn prune_abstraction(&mut self) {
        if !self.config.use_abstraction {
            return;
        }
        for r in 0..self.refined.len() {
            if self.refined[r] && !self.pruned[r] && self.prio[r] >> self.shift == 0 {
                self.refined[r] = false;
                self.pruned[r] = true;
            }
        }
    }

    pub fn visible_count(&self) -> usize {
        (0..self.design.num_registers())
            .filter(|&r| self.is_visible(r))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PdrConfig;
    use crate::cube::{InputLit, StateLit};
    use crate::design::Design;
    use latchproof_ir::{Reset, TransitionSystem};
    use latchproof_sat::backends::z3_backend::Z3Factory;
    type TestResult = Result<(), Box<dyn std::error::Error>>;

    /// `a' = i`, `b' = a`, output `b`.
    fn pipeline() -> Result<Design, PdrError> {
        let mut ts = TransitionSystem::new();
        let i = ts.add_input("i")?;
        let a = ts.add_register("a", Reset::Zero)?;
        let b = ts.add_register("b", Reset::Zero)?;
        ts.set_next(a, i)?;
        ts.set_next(b, a)?;
        ts.add_output("bad", b)?;
        Design::new(&ts)
    }

    fn obligation(
        frame: usize,
        lits: &[(usize, bool)],
        input: bool,
        hidden: Vec<usize>,
        parent: Option<Rc<ProofObligation>>,
    ) -> Rc<ProofObligation> {
        let lits = lits.iter().map(|&(r, n)| StateLit::new(r, n)).collect();
        let witness = vec![InputLit {
            input: 0,
            value: input,
        }];
        let cube = Cube::from_sorted(lits, witness, hidden);
        ProofObligation::new(frame, 0, cube, parent)
    }

    #[test]
    fn genuine_chain_becomes_a_counterexample() -> TestResult {
        let design = pipeline()?;
        let config = PdrConfig::default();
        let mut mgr = PdrManager::new(&design, &config, &Z3Factory);
        let root = obligation(2, &[(1, false)], false, Vec::new(), None);
        let mid = obligation(1, &[(0, false)], false, Vec::new(), Some(root));
        let head = obligation(0, &[], true, Vec::new(), Some(mid));
        match mgr.replay_chain(&head)? {
            Replay::Real(cex) => {
                assert_eq!(cex.depth, 2);
                assert_eq!(cex.states[2], vec![false, true]);
            }
            Replay::Spurious => panic!("chain replays"),
        }
        Ok(())
    }

    #[test]
    fn broken_chain_refines_hidden_support() -> TestResult {
        let design = pipeline()?;
        let config = PdrConfig {
            use_abstraction: true,
            ..PdrConfig::default()
        };
        let mut mgr = PdrManager::new(&design, &config, &Z3Factory);
        // the bad cube hid `b`, so the output never asserts on replay
        let root = obligation(1, &[], false, vec![1], None);
        let head = obligation(0, &[], false, vec![0], Some(root));
        assert!(matches!(mgr.replay_chain(&head)?, Replay::Spurious));
        assert!(mgr.refined[1]);
        assert_eq!(mgr.visible_count(), 1);
        Ok(())
    }

    #[test]
    fn broken_chain_without_abstraction_is_an_internal_error() -> TestResult {
        let design = pipeline()?;
        let config = PdrConfig::default();
        let mut mgr = PdrManager::new(&design, &config, &Z3Factory);
        let head = obligation(0, &[], false, Vec::new(), None);
        assert!(matches!(
            mgr.replay_chain(&head),
            Err(PdrError::InternalInvariantViolation(_))
        ));
        Ok(())
    }
}
