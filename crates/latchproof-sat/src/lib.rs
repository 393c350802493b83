//! SAT layer for latchproof.
//!
//! This crate defines the literal types and the incremental [`SatSolver`]
//! interface the model checker drives, a Z3-backed implementation, and a
//! lazy Tseitin encoder that translates only the fanin cone of the signals a
//! query actually mentions.

pub mod backends;
pub mod encoder;
pub mod lit;
pub mod solver;

pub use encoder::{ConeEncoder, EncodeError};
pub use lit::{Lit, Var};
pub use solver::{SatResult, SatSolver, SolveBudget, SolverFactory};
