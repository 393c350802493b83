//! Reset normalization.
//!
//! The checker assumes every register starts at zero. [`normalize`] rewrites
//! a system so that holds: registers resetting to one are stored
//! complemented, and registers with a free initial value read a fresh input
//! until a shared zero-reset `initialized` register rises after the first
//! step. [`NormalizationMap`] carries traces of the rewritten system back to
//! the original one.

use serde::{Deserialize, Serialize};

use crate::error::IrError;
use crate::transition_system::{Edge, Node, Reset, TransitionSystem};

const INITIALIZED_NAME: &str = "$initialized";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegisterOrigin {
    /// Stands for an original register; `complemented` when it reset to one.
    Direct { original: usize, complemented: bool },
    /// The helper register that is low only in the initial state.
    Initialized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputOrigin {
    Original(usize),
    /// Supplies the initial value of a free-reset original register.
    InitValue(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationMap {
    pub registers: Vec<RegisterOrigin>,
    pub inputs: Vec<InputOrigin>,
    pub original_registers: usize,
    pub original_inputs: usize,
}

impl NormalizationMap {
    /// True when the rewrite changed nothing.
    pub fn is_identity(&self) -> bool {
        self.inputs.len() == self.original_inputs
            && self
                .registers
                .iter()
                .all(|o| matches!(o, RegisterOrigin::Direct { complemented: false, .. }))
    }

    /// Splits a trace over the normalized inputs into the original initial
    /// state and original input vectors.
    pub fn lift_trace(
        &self,
        original: &TransitionSystem,
        inputs: &[Vec<bool>],
    ) -> Result<(Vec<bool>, Vec<Vec<bool>>), IrError> {
        let mut init: Vec<bool> = original
            .registers()
            .iter()
            .map(|r| r.reset == Reset::One)
            .collect();
        let mut lifted = Vec::with_capacity(inputs.len());
        for (step, vector) in inputs.iter().enumerate() {
            if vector.len() != self.inputs.len() {
                return Err(IrError::ArityMismatch {
                    what: "inputs",
                    expected: self.inputs.len(),
                    actual: vector.len(),
                });
            }
            let mut orig = vec![false; self.original_inputs];
            for (value, origin) in vector.iter().zip(&self.inputs) {
                match *origin {
                    InputOrigin::Original(i) => orig[i] = *value,
                    InputOrigin::InitValue(r) if step == 0 => init[r] = *value,
                    InputOrigin::InitValue(_) => {}
                }
            }
            lifted.push(orig);
        }
        Ok((init, lifted))
    }
}

#[derive(Debug, Clone)]
pub struct NormalizedSystem {
    pub system: TransitionSystem,
    pub map: NormalizationMap,
}

/// Rewrites `ts` so that every register resets to zero.
pub fn normalize(ts: &TransitionSystem) -> Result<NormalizedSystem, IrError> {
    ts.validate()?;
    let mut out = TransitionSystem::new();
    let mut value_of = vec![Edge::FALSE; ts.num_nodes()];
    let mut input_origin = Vec::new();
    let mut register_origin = Vec::new();

    for (i, input) in ts.inputs().iter().enumerate() {
        value_of[input.node.index()] = out.add_input(input.name.clone())?;
        input_origin.push(InputOrigin::Original(i));
    }

    let needs_init_flag = ts.registers().iter().any(|r| r.reset == Reset::Free);
    let mut stored = Vec::with_capacity(ts.num_registers());
    for (r, reg) in ts.registers().iter().enumerate() {
        let edge = out.add_register(reg.name.clone(), Reset::Zero)?;
        register_origin.push(RegisterOrigin::Direct {
            original: r,
            complemented: reg.reset == Reset::One,
        });
        stored.push(edge);
    }
    let initialized = if needs_init_flag {
        let flag = out.add_register(INITIALIZED_NAME, Reset::Zero)?;
        out.set_next(flag, Edge::TRUE)?;
        register_origin.push(RegisterOrigin::Initialized);
        Some(flag)
    } else {
        None
    };

    for (r, reg) in ts.registers().iter().enumerate() {
        let value = match (reg.reset, initialized) {
            (Reset::Zero, _) => stored[r],
            (Reset::One, _) => !stored[r],
            (Reset::Free, Some(flag)) => {
                let init = out.add_input(format!("{}$init", reg.name))?;
                input_origin.push(InputOrigin::InitValue(r));
                out.mux(flag, stored[r], init)
            }
            (Reset::Free, None) => return Err(IrError::InconsistentTable("register")),
        };
        value_of[reg.node.index()] = value;
    }

    for (idx, node) in ts.nodes().iter().enumerate() {
        if let Node::And(a, b) = *node {
            let a = value_of[a.node().index()].xor_complement(a.is_complemented());
            let b = value_of[b.node().index()].xor_complement(b.is_complemented());
            value_of[idx] = out.and(a, b);
        }
    }
    let lift = |edge: Edge| value_of[edge.node().index()].xor_complement(edge.is_complemented());

    for (r, reg) in ts.registers().iter().enumerate() {
        let next = reg
            .next
            .ok_or_else(|| IrError::MissingNextState(reg.name.clone()))?;
        let next = lift(next);
        let next = if reg.reset == Reset::One { !next } else { next };
        out.set_next(stored[r], next)?;
    }
    for output in ts.outputs() {
        out.add_output(output.name.clone(), lift(output.edge))?;
    }
    out.validate()?;

    Ok(NormalizedSystem {
        system: out,
        map: NormalizationMap {
            registers: register_origin,
            inputs: input_origin,
            original_registers: ts.num_registers(),
            original_inputs: ts.num_inputs(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proptest_generators::arb_transition_system;
    use crate::simulate::simulate;
    use proptest::prelude::*;

    #[test]
    fn zero_reset_system_is_left_alone() -> Result<(), IrError> {
        let mut ts = TransitionSystem::new();
        let r = ts.add_register("r", Reset::Zero)?;
        ts.set_next(r, !r)?;
        ts.add_output("o", r)?;
        let norm = normalize(&ts)?;
        assert!(norm.map.is_identity());
        assert_eq!(norm.system.num_registers(), 1);
        Ok(())
    }

    #[test]
    fn one_reset_register_is_stored_complemented() -> Result<(), IrError> {
        let mut ts = TransitionSystem::new();
        let r = ts.add_register("r", Reset::One)?;
        ts.set_next(r, r)?;
        ts.add_output("low", !r)?;
        let norm = normalize(&ts)?;
        assert_eq!(
            norm.map.registers,
            vec![RegisterOrigin::Direct {
                original: 0,
                complemented: true
            }]
        );
        let trace = simulate(&norm.system, &[false], &vec![Vec::new(); 4])?;
        assert_eq!(trace.first_assertion(0), None);
        Ok(())
    }

    #[test]
    fn free_register_reads_init_input_once() -> Result<(), IrError> {
        let mut ts = TransitionSystem::new();
        let r = ts.add_register("r", Reset::Free)?;
        ts.set_next(r, r)?;
        ts.add_output("o", r)?;
        let norm = normalize(&ts)?;
        assert_eq!(norm.system.num_registers(), 2);
        assert_eq!(norm.map.inputs, vec![InputOrigin::InitValue(0)]);
        let steps = vec![vec![true], vec![false], vec![false]];
        let trace = simulate(&norm.system, &[false, false], &steps)?;
        assert_eq!(trace.outputs, vec![vec![true], vec![true], vec![true]]);
        let (init, lifted) = norm.map.lift_trace(&ts, &steps)?;
        assert_eq!(init, vec![true]);
        assert_eq!(lifted, vec![Vec::<bool>::new(); 3]);
        Ok(())
    }

    proptest! {
        #[test]
        fn normalized_system_matches_original_outputs(
            ts in arb_transition_system(),
            raw in proptest::collection::vec(proptest::collection::vec(any::<bool>(), 8), 1..6),
        ) {
            let norm = normalize(&ts)?;
            let width = norm.system.num_inputs();
            let steps: Vec<Vec<bool>> = raw.iter().map(|v| v.iter().copied().cycle().take(width).collect()).collect();
            let zero = vec![false; norm.system.num_registers()];
            let normalized = simulate(&norm.system, &zero, &steps)?;
            let (init, lifted) = norm.map.lift_trace(&ts, &steps)?;
            let original = simulate(&ts, &init, &lifted)?;
            prop_assert_eq!(normalized.outputs, original.outputs);
        }
    }
}
