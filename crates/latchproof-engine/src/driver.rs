//! Frame-by-frame search over every monitored output.

use std::time::Instant;

use latchproof_ir::Edge;
use latchproof_sat::SolverFactory;
use tracing::{debug, info};

use crate::abstraction::Replay;
use crate::block::BlockOutcome;
use crate::error::PdrError;
use crate::manager::{deadline_after_secs, OutputStatus, PdrManager};
use crate::result::{
    Counterexample, Invariant, OutputVerdict, PdrReport, UndecidedReason, Verdict,
};
use crate::timeout::{deadline_from_millis, remaining_timeout_ms};

/// Solver timeouts may fire a little before the wall clock reaches the
/// deadline they were derived from.
const DEADLINE_SLACK_MS: u64 = 25;

enum OutputPass {
    Blocked,
    Refined,
    Failed(Counterexample),
}

/// What to do after a budget ran out.
enum Exhaustion {
    DropOutput,
    Stop(UndecidedReason),
}

fn reached(deadline: Option<Instant>) -> bool {
    remaining_timeout_ms(deadline).is_some_and(|ms| ms <= DEADLINE_SLACK_MS)
}

impl<'a, F: SolverFactory> PdrManager<'a, F> {
    /// Searches from frame `start` until every output is decided or a limit
    /// is hit. Returns the last frame explored.
    pub fn run(&mut self, start: usize) -> Result<usize, PdrError> {
        let design = self.design;
        let solve_all = self.config.solve_all_outputs;
        let output_budgets = solve_all && self.config.output_timeout_ms > 0;
        let mut budgets = vec![self.config.output_timeout_ms; design.num_outputs()];

        if self.settle_constant_outputs(start)? {
            return Ok(start);
        }
        let mut i_frame = start;
        while self.frames.len() <= i_frame {
            self.push_frame()?;
        }
        loop {
            let mut refined = false;
            let mut blocked = Vec::new();
            for o in 0..design.num_outputs() {
                if !self.status[o].is_open() {
                    continue;
                }
                self.current_output = o;
                let started = Instant::now();
                self.output_deadline = if output_budgets {
                    deadline_from_millis(started, budgets[o])
                } else {
                    None
                };
                match self.pass_output(i_frame) {
                    Ok(OutputPass::Blocked) => blocked.push(o),
                    Ok(OutputPass::Refined) => refined = true,
                    Ok(OutputPass::Failed(cex)) => {
                        if self.record_failure(o, cex, i_frame) {
                            return Ok(i_frame);
                        }
                    }
                    Err(PdrError::ResourceExhausted(msg)) => match self.classify(msg) {
                        Exhaustion::DropOutput => {
                            self.queue.clear();
                            self.drop_output(o, i_frame);
                        }
                        Exhaustion::Stop(reason) => {
                            self.close_open_outputs(i_frame, reason);
                            return Ok(i_frame);
                        }
                    },
                    Err(err) => return Err(err),
                }
                self.output_deadline = None;
                if output_budgets {
                    let spent = started.elapsed().as_millis() as u64;
                    budgets[o] = budgets[o].saturating_sub(spent);
                    if budgets[o] == 0 && self.status[o].is_open() {
                        blocked.retain(|&b| b != o);
                        self.drop_output(o, i_frame);
                    }
                }
                if refined {
                    break;
                }
            }
            if refined {
                continue;
            }

            self.prune_abstraction();
            self.restart_limit = self.config.restart_limit;
            for o in blocked {
                if self.status[o].is_open() {
                    self.constrain_output(i_frame, o)?;
                }
            }
            if self.open_outputs() == 0 {
                return Ok(i_frame);
            }

            self.push_frame()?;
            let fixed_point = match self.push_clauses() {
                Ok(found) => found,
                Err(PdrError::ResourceExhausted(msg)) => {
                    let reason = self.stop_reason(msg);
                    self.close_open_outputs(i_frame, reason);
                    return Ok(i_frame);
                }
                Err(err) => return Err(err),
            };
            i_frame += 1;
            if let Some(k) = fixed_point {
                return match self.prove_open_outputs(k) {
                    Err(PdrError::ResourceExhausted(msg)) => {
                        let reason = self.stop_reason(msg);
                        self.close_open_outputs(i_frame, reason);
                        Ok(i_frame)
                    }
                    other => other.map(|_| i_frame),
                };
            }
            info!(
                frame = i_frame,
                clauses = self.total_clauses(),
                obligations = self.stats.obligations,
                "pdr: frame completed"
            );

            if remaining_timeout_ms(self.deadline) == Some(0) {
                self.close_open_outputs(i_frame, UndecidedReason::Timeout);
                return Ok(i_frame);
            }
            if remaining_timeout_ms(self.gap_deadline) == Some(0) {
                self.close_open_outputs(i_frame, UndecidedReason::GapTimeout);
                return Ok(i_frame);
            }
            if self.config.frame_max > 0 && i_frame >= self.config.frame_max {
                self.close_open_outputs(i_frame, UndecidedReason::FrameLimit);
                return Ok(i_frame);
            }
        }
    }

    /// Decides the outputs tied to a constant. True when the run should
    /// stop.
    pub fn settle_constant_outputs(&mut self, frame: usize) -> Result<bool, PdrError> {
        let design = self.design;
        for o in 0..design.num_outputs() {
            if !self.status[o].is_open() {
                continue;
            }
            let edge = design.output_edge(o);
            if edge == Edge::FALSE {
                self.mark_proven(o, Invariant {
                    frame: 0,
                    clauses: Vec::new(),
                    cubes: Vec::new(),
                    outputs: vec![o],
                    verified: true,
                });
            } else if edge == Edge::TRUE {
                let cex = self.build_counterexample(o, &[vec![false; design.num_inputs()]])?;
                if self.record_failure(o, cex, frame) {
                    return Ok(true);
                }
            }
        }
        Ok(self.open_outputs() == 0)
    }

    /// Blocks every bad state of the current output at frame `i_frame`.
    fn pass_output(&mut self, i_frame: usize) -> Result<OutputPass, PdrError> {
        loop {
            if self.any_deadline_passed() {
                return Err(PdrError::ResourceExhausted(format!(
                    "deadline passed at frame {i_frame}"
                )));
            }
            let Some(bad) = self.find_bad_cube(i_frame)? else {
                return Ok(OutputPass::Blocked);
            };
            debug!(frame = i_frame, cube = %bad, "pdr: bad cube");
            match self.block_cube(bad)? {
                BlockOutcome::Blocked | BlockOutcome::Restart => {}
                BlockOutcome::Counterexample(head) => {
                    let replay = self.replay_chain(&head)?;
                    self.queue.clear();
                    return Ok(match replay {
                        Replay::Real(cex) => OutputPass::Failed(cex),
                        Replay::Spurious => OutputPass::Refined,
                    });
                }
            }
        }
    }

    fn classify(&self, msg: String) -> Exhaustion {
        if !reached(self.deadline) && !reached(self.gap_deadline) && reached(self.output_deadline)
        {
            Exhaustion::DropOutput
        } else {
            Exhaustion::Stop(self.stop_reason(msg))
        }
    }

    pub fn stop_reason(&self, msg: String) -> UndecidedReason {
        if reached(self.deadline) {
            UndecidedReason::Timeout
        } else if reached(self.gap_deadline) {
            UndecidedReason::GapTimeout
        } else {
            UndecidedReason::ResourceLimit(msg)
        }
    }

    fn output_solved(&mut self) {
        self.gap_deadline = deadline_after_secs(self.config.gap_timeout_secs);
    }

    fn mark_proven(&mut self, output: usize, invariant: Invariant) {
        info!(
            output = self.design.output_name(output),
            clauses = invariant.clauses.len(),
            "pdr: output proven"
        );
        if matches!(
            self.status[output],
            OutputStatus::Undecided {
                reason: UndecidedReason::OutputTimeout,
                ..
            }
        ) {
            self.stats.dropped_outputs -= 1;
        }
        self.status[output] = OutputStatus::Proven(invariant);
        self.stats.proven_outputs += 1;
        self.output_solved();
    }

    /// Records a counterexample; true when the run should stop.
    fn record_failure(&mut self, output: usize, cex: Counterexample, frame: usize) -> bool {
        info!(
            output = %cex.output_name,
            depth = cex.depth,
            "pdr: output disproven"
        );
        self.status[output] = OutputStatus::Failed(cex);
        self.stats.failed_outputs += 1;
        self.output_solved();
        if !self.config.solve_all_outputs {
            self.close_open_outputs(frame, UndecidedReason::EarlierFailure);
            return true;
        }
        false
    }

    fn drop_output(&mut self, output: usize, frame: usize) {
        info!(
            output = self.design.output_name(output),
            frame, "pdr: output ran out of time"
        );
        self.status[output] = OutputStatus::Undecided {
            frame,
            reason: UndecidedReason::OutputTimeout,
        };
        self.stats.dropped_outputs += 1;
    }

    pub fn close_open_outputs(&mut self, frame: usize, reason: UndecidedReason) {
        for status in self.status.iter_mut().filter(|s| s.is_open()) {
            *status = OutputStatus::Undecided {
                frame,
                reason: reason.clone(),
            };
        }
    }

    /// Extracts the invariant at fixed point `k` and proves every output it
    /// excludes.
    pub fn prove_open_outputs(&mut self, k: usize) -> Result<(), PdrError> {
        let mut outputs: Vec<usize> = (0..self.status.len())
            .filter(|&o| self.status[o].is_open())
            .collect();
        for frame in &self.frames[k..] {
            outputs.extend(frame.constrained_outputs.iter().copied());
        }
        outputs.retain(|&o| {
            !matches!(
                self.status[o],
                OutputStatus::Failed(_) | OutputStatus::Proven(_)
            )
        });
        outputs.sort_unstable();
        outputs.dedup();
        let invariant = self.extract_invariant(k, &outputs)?;
        for o in outputs {
            self.mark_proven(o, invariant.clone());
        }
        Ok(())
    }

    pub fn report(&self, frames_explored: usize) -> PdrReport {
        let mut stats = self.stats.clone();
        stats.elapsed_ms = self.started.elapsed().as_millis() as u64;
        let outputs = self
            .status
            .iter()
            .enumerate()
            .map(|(o, status)| OutputVerdict {
                output: o,
                name: self.design.output_name(o).to_string(),
                verdict: match status {
                    OutputStatus::Proven(invariant) => Verdict::Proven {
                        invariant: invariant.clone(),
                    },
                    OutputStatus::Failed(cex) => Verdict::Disproven {
                        counterexample: cex.clone(),
                    },
                    OutputStatus::Undecided { frame, reason } => Verdict::Undecided {
                        frame: *frame,
                        reason: reason.clone(),
                    },
                    OutputStatus::Open => Verdict::Undecided {
                        frame: frames_explored,
                        reason: UndecidedReason::FrameLimit,
                    },
                },
            })
            .collect();
        PdrReport {
            outputs,
            stats,
            frames_explored,
            revalidation_failures: Vec::new(),
        }
    }
}
