//! Recursive blocking of bad cubes through proof obligations.

use std::rc::Rc;

use latchproof_sat::SolverFactory;
use tracing::debug;

use crate::cube::Cube;
use crate::error::PdrError;
use crate::generalize::Generalized;
use crate::manager::PdrManager;
use crate::obligation::ProofObligation;
use crate::oracle::CheckResult;

#[derive(Debug)]
pub(crate) enum BlockOutcome {
    /// Every obligation was discharged up to the last frame.
    Blocked,
    /// An obligation chain reaching the initial state; the head is the
    /// earliest step.
    Counterexample(Rc<ProofObligation>),
    /// The queue outgrew the restart limit and was dropped.
    Restart,
}

impl<'a, F: SolverFactory> PdrManager<'a, F> {
    /// Blocks `bad` at the last frame, recursively blocking its
    /// predecessors.
    pub fn block_cube(&mut self, bad: Cube) -> Result<BlockOutcome, PdrError> {
        let kmax = self.last_frame();
        let priority = self.next_obligation_priority();
        self.queue.push(ProofObligation::new(kmax, priority, bad, None));

        while let Some(head) = self.queue.head().cloned() {
            if head.frame == 0 || head.cube.is_init_intersecting(None) {
                return Ok(BlockOutcome::Counterexample(head));
            }
            if head.frame > kmax {
                break;
            }
            if self.restart_limit > 0 && self.queue.len() >= self.restart_limit {
                self.restart_limit = (self.restart_limit * 3 / 2).max(self.restart_limit + 1);
                self.queue.clear();
                self.stats.restarts += 1;
                debug!(limit = self.restart_limit, "pdr: obligation queue restart");
                return Ok(BlockOutcome::Restart);
            }
            self.queue.pop();
            self.stats.obligations += 1;
            debug!(frame = head.frame, cube = %head.cube, "pdr: obligation");

            if self.subsumed_at(head.frame, &head.cube) {
                self.stats.containment_hits += 1;
                continue;
            }
            if self.blocked_by_frame(head.frame, &head.cube)? {
                self.stats.frame_hits += 1;
                continue;
            }

            match self.generalize(head.frame - 1, &head.cube)? {
                Generalized::Blocked(min) => {
                    let mut k = head.frame;
                    while k < kmax && self.check_cube(k, Some(&min), false)?.is_blocked() {
                        k += 1;
                    }
                    self.add_learned_clause(k, &min)?;
                    if k < kmax && !self.config.shortest {
                        let priority = self.next_obligation_priority();
                        self.queue.push(head.rescheduled(k + 1, priority));
                    }
                }
                Generalized::Predecessor(pred) => {
                    let priority = self.next_obligation_priority();
                    self.queue.push(head.rescheduled(head.frame, priority));
                    let priority = self.next_obligation_priority();
                    self.queue.push(ProofObligation::new(
                        head.frame - 1,
                        priority,
                        pred,
                        Some(Rc::clone(&head)),
                    ));
                }
            }

            if self.any_deadline_passed() {
                return Err(PdrError::ResourceExhausted(
                    "deadline passed while blocking obligations".into(),
                ));
            }
        }
        Ok(BlockOutcome::Blocked)
    }

    /// Bad cube for the current output at frame `k`, if any.
    pub fn find_bad_cube(&mut self, k: usize) -> Result<Option<Cube>, PdrError> {
        match self.check_cube(k, None, true)? {
            CheckResult::Blocked => Ok(None),
            CheckResult::Predecessor(bad) => Ok(Some(bad)),
        }
    }
}
