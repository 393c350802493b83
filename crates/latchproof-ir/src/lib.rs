//! Sequential circuit representation for latchproof.
//!
//! A [`TransitionSystem`](transition_system::TransitionSystem) is an
//! and-inverter graph with registers, primary inputs and monitored outputs.
//! It is produced by an elaboration front end (or built directly through the
//! API in tests) and consumed read-only by the model checker. The crate also
//! provides structural validation, reset normalization and a concrete
//! cycle-accurate simulator used to replay counterexamples.

pub mod error;
pub mod normalize;
pub mod simulate;
pub mod transition_system;

#[cfg(any(test, feature = "proptest"))]
pub mod proptest_generators;

pub use error::IrError;
pub use transition_system::{Edge, Node, NodeId, Reset, TransitionSystem};
