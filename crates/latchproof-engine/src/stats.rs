use std::fmt;

use serde::Serialize;

/// Counters collected over one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PdrStats {
    pub sat_calls: u64,
    pub sat_unknown: u64,
    pub obligations: u64,
    pub learned_clauses: u64,
    pub ctg_clauses: u64,
    pub containment_hits: u64,
    pub frame_hits: u64,
    pub pushed_clauses: u64,
    pub recycles: u64,
    pub restarts: u64,
    pub refinements: u64,
    pub failed_outputs: usize,
    pub dropped_outputs: usize,
    pub proven_outputs: usize,
    pub elapsed_ms: u64,
}

impl PdrStats {
    /// Adds the counters of a later round.
    pub fn absorb(&mut self, other: &PdrStats) {
        self.sat_calls += other.sat_calls;
        self.sat_unknown += other.sat_unknown;
        self.obligations += other.obligations;
        self.learned_clauses += other.learned_clauses;
        self.ctg_clauses += other.ctg_clauses;
        self.containment_hits += other.containment_hits;
        self.frame_hits += other.frame_hits;
        self.pushed_clauses += other.pushed_clauses;
        self.recycles += other.recycles;
        self.restarts += other.restarts;
        self.refinements += other.refinements;
        self.elapsed_ms += other.elapsed_ms;
        // verdict counts describe the final round only
        self.failed_outputs = other.failed_outputs;
        self.dropped_outputs = other.dropped_outputs;
        self.proven_outputs = other.proven_outputs;
    }
}

impl fmt::Display for PdrStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sat_calls={} obligations={} clauses={} (ctg={}) pushed={} recycles={} restarts={} \
             proven={} failed={} dropped={} time={}ms",
            self.sat_calls,
            self.obligations,
            self.learned_clauses,
            self.ctg_clauses,
            self.pushed_clauses,
            self.recycles,
            self.restarts,
            self.proven_outputs,
            self.failed_outputs,
            self.dropped_outputs,
            self.elapsed_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorb_sums_work_and_keeps_latest_verdicts() {
        let mut total = PdrStats {
            sat_calls: 10,
            proven_outputs: 0,
            ..PdrStats::default()
        };
        let round = PdrStats {
            sat_calls: 5,
            restarts: 1,
            proven_outputs: 2,
            ..PdrStats::default()
        };
        total.absorb(&round);
        assert_eq!(total.sat_calls, 15);
        assert_eq!(total.restarts, 1);
        assert_eq!(total.proven_outputs, 2);
        assert!(total.to_string().contains("proven=2"));
    }
}
