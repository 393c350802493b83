use std::fmt;

use serde::Serialize;

use crate::stats::PdrStats;

/// Why a run stopped without deciding an output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UndecidedReason {
    FrameLimit,
    Timeout,
    GapTimeout,
    OutputTimeout,
    ResourceLimit(String),
    /// Another output failed first and the run was not asked to continue.
    EarlierFailure,
}

impl fmt::Display for UndecidedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UndecidedReason::FrameLimit => write!(f, "frame limit reached"),
            UndecidedReason::Timeout => write!(f, "timeout"),
            UndecidedReason::GapTimeout => write!(f, "gap timeout"),
            UndecidedReason::OutputTimeout => write!(f, "per-output timeout"),
            UndecidedReason::ResourceLimit(msg) => write!(f, "resource limit: {msg}"),
            UndecidedReason::EarlierFailure => write!(f, "stopped after an earlier failure"),
        }
    }
}

/// Input sequence driving the user's system from an initial state into an
/// assertion of `output`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Counterexample {
    pub output: usize,
    pub output_name: String,
    /// Register values before the first step, in register order.
    pub initial_state: Vec<bool>,
    /// One input vector per step; the output asserts during the last one.
    pub inputs: Vec<Vec<bool>>,
    /// Visited states, `inputs.len() + 1` entries.
    pub states: Vec<Vec<bool>>,
    /// Index of the asserting step.
    pub depth: usize,
}

impl fmt::Display for Counterexample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Counterexample for '{}' ({} steps):",
            self.output_name,
            self.inputs.len()
        )?;
        for (step, inputs) in self.inputs.iter().enumerate() {
            writeln!(
                f,
                "  step {step}: state {} inputs {}",
                bits(&self.states[step]),
                bits(inputs)
            )?;
        }
        Ok(())
    }
}

fn bits(values: &[bool]) -> String {
    values.iter().map(|&b| if b { '1' } else { '0' }).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClauseLiteral {
    pub register: String,
    pub value: bool,
}

/// Disjunction over the user's registers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvariantClause {
    pub literals: Vec<ClauseLiteral>,
}

impl fmt::Display for InvariantClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.literals.is_empty() {
            return write!(f, "false");
        }
        for (i, lit) in self.literals.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            if !lit.value {
                write!(f, "!")?;
            }
            write!(f, "{}", lit.register)?;
        }
        Ok(())
    }
}

/// Inductive strengthening of the proven outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invariant {
    /// Frame at which the fixed point was reached.
    pub frame: usize,
    pub clauses: Vec<InvariantClause>,
    /// The same clauses as blocked cubes over the normalized registers.
    pub cubes: Vec<Vec<u32>>,
    /// Outputs the invariant was checked against.
    pub outputs: Vec<usize>,
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Verdict {
    Proven { invariant: Invariant },
    Disproven { counterexample: Counterexample },
    Undecided { frame: usize, reason: UndecidedReason },
}

impl Verdict {
    pub fn verdict_class(&self) -> &'static str {
        match self {
            Verdict::Proven { .. } => "proven",
            Verdict::Disproven { .. } => "disproven",
            Verdict::Undecided { .. } => "undecided",
        }
    }

    pub fn is_proven(&self) -> bool {
        matches!(self, Verdict::Proven { .. })
    }

    pub fn is_disproven(&self) -> bool {
        matches!(self, Verdict::Disproven { .. })
    }

    pub fn counterexample(&self) -> Option<&Counterexample> {
        match self {
            Verdict::Disproven { counterexample } => Some(counterexample),
            _ => None,
        }
    }

    pub fn invariant(&self) -> Option<&Invariant> {
        match self {
            Verdict::Proven { invariant } => Some(invariant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputVerdict {
    pub output: usize,
    pub name: String,
    pub verdict: Verdict,
}

/// A reloaded clause that no longer holds where it was stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevalidationFailure {
    pub frame: usize,
    pub index: usize,
    pub literals: Vec<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PdrReport {
    /// Per-output verdicts in output order.
    pub outputs: Vec<OutputVerdict>,
    pub stats: PdrStats,
    pub frames_explored: usize,
    pub revalidation_failures: Vec<RevalidationFailure>,
}

impl PdrReport {
    pub fn verdict(&self, output: usize) -> Option<&Verdict> {
        self.outputs.get(output).map(|o| &o.verdict)
    }

    pub fn all_proven(&self) -> bool {
        self.outputs.iter().all(|o| o.verdict.is_proven())
    }

    pub fn any_disproven(&self) -> bool {
        self.outputs.iter().any(|o| o.verdict.is_disproven())
    }

    /// "disproven" if any output failed, "proven" if all hold, else "undecided".
    pub fn overall_verdict(&self) -> &'static str {
        if self.any_disproven() {
            "disproven"
        } else if self.all_proven() {
            "proven"
        } else {
            "undecided"
        }
    }
}

impl fmt::Display for PdrReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "RESULT: {}", self.overall_verdict().to_uppercase())?;
        writeln!(f, "Frames explored: {}", self.frames_explored)?;
        for o in &self.outputs {
            match &o.verdict {
                Verdict::Proven { invariant } => writeln!(
                    f,
                    "  {}: PROVEN (invariant of {} clauses at frame {})",
                    o.name,
                    invariant.clauses.len(),
                    invariant.frame
                )?,
                Verdict::Disproven { counterexample } => writeln!(
                    f,
                    "  {}: DISPROVEN at depth {}",
                    o.name, counterexample.depth
                )?,
                Verdict::Undecided { frame, reason } => {
                    writeln!(f, "  {}: UNDECIDED at frame {frame} ({reason})", o.name)?
                }
            }
        }
        if !self.revalidation_failures.is_empty() {
            writeln!(
                f,
                "Discarded {} reloaded clauses",
                self.revalidation_failures.len()
            )?;
        }
        write!(f, "Stats: {}", self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn undecided(name: &str) -> OutputVerdict {
        OutputVerdict {
            output: 0,
            name: name.into(),
            verdict: Verdict::Undecided {
                frame: 3,
                reason: UndecidedReason::FrameLimit,
            },
        }
    }

    #[test]
    fn overall_verdict_prefers_failures() {
        let cex = Counterexample {
            output: 1,
            output_name: "b".into(),
            initial_state: vec![false],
            inputs: vec![vec![true]],
            states: vec![vec![false], vec![true]],
            depth: 0,
        };
        let mut report = PdrReport {
            outputs: vec![undecided("a")],
            stats: PdrStats::default(),
            frames_explored: 3,
            revalidation_failures: Vec::new(),
        };
        assert_eq!(report.overall_verdict(), "undecided");
        report.outputs.push(OutputVerdict {
            output: 1,
            name: "b".into(),
            verdict: Verdict::Disproven {
                counterexample: cex,
            },
        });
        assert_eq!(report.overall_verdict(), "disproven");
        assert!(report.to_string().contains("b: DISPROVEN at depth 0"));
        assert!(report.to_string().contains("a: UNDECIDED at frame 3"));
    }

    #[test]
    fn verdicts_serialize_with_kind_tags() -> Result<(), serde_json::Error> {
        let json = serde_json::to_value(undecided("p").verdict)?;
        assert_eq!(json["kind"], "undecided");
        assert_eq!(json["reason"], "frame_limit");
        Ok(())
    }

    #[test]
    fn clause_display_marks_negative_literals() {
        let clause = InvariantClause {
            literals: vec![
                ClauseLiteral {
                    register: "a".into(),
                    value: true,
                },
                ClauseLiteral {
                    register: "b".into(),
                    value: false,
                },
            ],
        };
        assert_eq!(clause.to_string(), "a | !b");
    }
}
