use thiserror::Error;

/// Structural problems in a transition system handed to the checker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IrError {
    #[error("node {node} uses fanin node {fanin}, which is not defined before it")]
    ForwardReference { node: u32, fanin: u32 },
    #[error("edge {0} refers to a node outside the graph")]
    DanglingEdge(u32),
    #[error("edge {0} does not refer to a register")]
    NotARegister(u32),
    #[error("register '{0}' has no next-state function")]
    MissingNextState(String),
    #[error("duplicate signal name '{0}'")]
    DuplicateName(String),
    #[error("transition system has no monitored outputs")]
    NoOutputs,
    #[error("node table disagrees with the {0} list")]
    InconsistentTable(&'static str),
    #[error("expected {expected} values for {what}, got {actual}")]
    ArityMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
}
