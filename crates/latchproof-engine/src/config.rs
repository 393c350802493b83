use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::PdrError;

/// Options for a PDR run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdrConfig {
    /// Activation variables a frame solver may accumulate before it is
    /// rebuilt from the clause database (0 = never).
    pub recycle_threshold: usize,
    /// Deepest frame to open (0 = unlimited).
    pub frame_max: usize,
    /// Per-query solver effort budget (0 = none).
    pub sat_conflict_limit: u64,
    /// Wall-clock budget for the whole run (0 = none).
    pub timeout_secs: u64,
    /// Budget measured from the last solved output (0 = none).
    pub gap_timeout_secs: u64,
    /// Per-output budget in solve-all mode (0 = none).
    pub output_timeout_ms: u64,
    /// Obligation queue size that triggers a restart of the frame (0 = off).
    pub restart_limit: usize,
    pub skip_generalization: bool,
    pub two_round: bool,
    pub simple: bool,
    pub flop_priority_order: bool,
    pub ctg_handling: bool,
    pub use_abstraction: bool,
    pub solve_all_outputs: bool,
    pub dump_invariant: bool,
    pub invariant_path: Option<PathBuf>,
    pub minimize_invariant: bool,
    pub verify_invariant: bool,
    /// Never reschedule a blocked obligation at a later frame.
    pub shortest: bool,
    /// Warm restarts with a doubled frame limit in incremental mode.
    pub deepening_rounds: usize,
}

impl Default for PdrConfig {
    fn default() -> Self {
        Self {
            recycle_threshold: 300,
            frame_max: 10_000,
            sat_conflict_limit: 0,
            timeout_secs: 0,
            gap_timeout_secs: 0,
            output_timeout_ms: 0,
            restart_limit: 0,
            skip_generalization: false,
            two_round: false,
            simple: false,
            flop_priority_order: false,
            ctg_handling: false,
            use_abstraction: false,
            solve_all_outputs: false,
            dump_invariant: false,
            invariant_path: None,
            minimize_invariant: false,
            verify_invariant: true,
            shortest: false,
            deepening_rounds: 4,
        }
    }
}

impl PdrConfig {
    pub fn validate(&self) -> Result<(), PdrError> {
        if self.simple && self.skip_generalization {
            return Err(PdrError::MalformedInput(
                "`simple` and `skip_generalization` are mutually exclusive".into(),
            ));
        }
        if self.output_timeout_ms > 0 && !self.solve_all_outputs {
            return Err(PdrError::MalformedInput(
                "`output_timeout_ms` requires `solve_all_outputs`".into(),
            ));
        }
        Ok(())
    }
}
