//! Concrete two-valued simulation.

use serde::{Deserialize, Serialize};

use crate::error::IrError;
use crate::transition_system::{Edge, Node, Reset, TransitionSystem};

/// States visited and outputs observed while simulating a fixed input sequence.
///
/// `states[j]` is the register valuation before step `j`; `states` therefore
/// holds one more entry than `outputs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimTrace {
    pub states: Vec<Vec<bool>>,
    pub outputs: Vec<Vec<bool>>,
}

impl SimTrace {
    /// First step at which `output` asserts.
    pub fn first_assertion(&self, output: usize) -> Option<usize> {
        self.outputs
            .iter()
            .position(|step| step.get(output).copied().unwrap_or(false))
    }
}

/// Evaluates every node for one valuation of registers and inputs.
pub fn eval_nodes(
    ts: &TransitionSystem,
    state: &[bool],
    inputs: &[bool],
) -> Result<Vec<bool>, IrError> {
    if state.len() != ts.num_registers() {
        return Err(IrError::ArityMismatch {
            what: "registers",
            expected: ts.num_registers(),
            actual: state.len(),
        });
    }
    if inputs.len() != ts.num_inputs() {
        return Err(IrError::ArityMismatch {
            what: "inputs",
            expected: ts.num_inputs(),
            actual: inputs.len(),
        });
    }
    let mut values = Vec::with_capacity(ts.num_nodes());
    for node in ts.nodes() {
        let v = match *node {
            Node::Const => false,
            Node::Input(i) => inputs[i],
            Node::Register(r) => state[r],
            Node::And(a, b) => edge_value(&values, a) && edge_value(&values, b),
        };
        values.push(v);
    }
    Ok(values)
}

pub fn edge_value(values: &[bool], edge: Edge) -> bool {
    values[edge.node().index()] ^ edge.is_complemented()
}

/// Initial register valuation; `free` supplies values for `Reset::Free`
/// registers in register order.
pub fn initial_state(ts: &TransitionSystem, free: &[bool]) -> Vec<bool> {
    let mut free = free.iter().copied();
    ts.registers()
        .iter()
        .map(|r| match r.reset {
            Reset::Zero => false,
            Reset::One => true,
            Reset::Free => free.next().unwrap_or(false),
        })
        .collect()
}

/// Runs the system from `init`, one step per input vector.
pub fn simulate(
    ts: &TransitionSystem,
    init: &[bool],
    inputs: &[Vec<bool>],
) -> Result<SimTrace, IrError> {
    let mut state = init.to_vec();
    let mut states = Vec::with_capacity(inputs.len() + 1);
    let mut outputs = Vec::with_capacity(inputs.len());
    for step in inputs {
        let values = eval_nodes(ts, &state, step)?;
        outputs.push(
            ts.outputs()
                .iter()
                .map(|o| edge_value(&values, o.edge))
                .collect(),
        );
        let mut next = Vec::with_capacity(state.len());
        for reg in ts.registers() {
            let edge = reg
                .next
                .ok_or_else(|| IrError::MissingNextState(reg.name.clone()))?;
            next.push(edge_value(&values, edge));
        }
        states.push(std::mem::replace(&mut state, next));
    }
    states.push(state);
    Ok(SimTrace { states, outputs })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter(width: usize) -> Result<TransitionSystem, IrError> {
        let mut ts = TransitionSystem::new();
        let bits: Vec<Edge> = (0..width)
            .map(|i| ts.add_register(format!("c{i}"), Reset::Zero))
            .collect::<Result<_, _>>()?;
        let mut carry = Edge::TRUE;
        for &bit in &bits {
            let next = ts.xor(bit, carry);
            ts.set_next(bit, next)?;
            carry = ts.and(carry, bit);
        }
        let all = ts.and_all(bits.iter().copied());
        ts.add_output("saturated", all)?;
        Ok(ts)
    }

    #[test]
    fn counter_saturates_after_two_to_the_width_minus_one_steps() -> Result<(), IrError> {
        let ts = counter(3)?;
        let init = initial_state(&ts, &[]);
        let trace = simulate(&ts, &init, &vec![Vec::new(); 9])?;
        assert_eq!(trace.first_assertion(0), Some(7));
        assert_eq!(trace.states[7], vec![true, true, true]);
        assert_eq!(trace.states[8], vec![false, false, false]);
        assert_eq!(trace.states.len(), 10);
        Ok(())
    }

    #[test]
    fn wrong_input_width_is_reported() -> Result<(), IrError> {
        let mut ts = TransitionSystem::new();
        let a = ts.add_input("a")?;
        let r = ts.add_register("r", Reset::One)?;
        ts.set_next(r, a)?;
        ts.add_output("o", r)?;
        let err = simulate(&ts, &[true], &[vec![]]);
        assert_eq!(
            err,
            Err(IrError::ArityMismatch {
                what: "inputs",
                expected: 1,
                actual: 0
            })
        );
        Ok(())
    }

    #[test]
    fn initial_state_uses_free_values_in_order() -> Result<(), IrError> {
        let mut ts = TransitionSystem::new();
        for (name, reset) in [("a", Reset::Free), ("b", Reset::One), ("c", Reset::Free)] {
            let r = ts.add_register(name, reset)?;
            ts.set_next(r, r)?;
        }
        assert_eq!(initial_state(&ts, &[true, false]), vec![true, true, false]);
        Ok(())
    }
}
