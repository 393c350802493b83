//! Proptest strategies for generating well-formed `TransitionSystem` instances.

use proptest::prelude::*;

use crate::transition_system::{Edge, Reset, TransitionSystem};

/// Fanin choice: index into the signals built so far plus a complement bit.
type Pick = (usize, bool);

fn pick(pool: &[Edge], (idx, neg): Pick) -> Edge {
    let edge = pool[idx % pool.len()];
    if neg {
        !edge
    } else {
        edge
    }
}

fn build(
    num_inputs: usize,
    resets: Vec<Reset>,
    gates: Vec<(Pick, Pick)>,
    nexts: Vec<Pick>,
    outputs: Vec<Pick>,
) -> TransitionSystem {
    let mut ts = TransitionSystem::new();
    let mut pool = vec![Edge::FALSE];
    for i in 0..num_inputs {
        if let Ok(edge) = ts.add_input(format!("i{i}")) {
            pool.push(edge);
        }
    }
    let mut regs = Vec::with_capacity(resets.len());
    for (r, reset) in resets.into_iter().enumerate() {
        if let Ok(edge) = ts.add_register(format!("r{r}"), reset) {
            pool.push(edge);
            regs.push(edge);
        }
    }
    for (a, b) in gates {
        let a = pick(&pool, a);
        let b = pick(&pool, b);
        let g = ts.and(a, b);
        pool.push(g);
    }
    for (reg, choice) in regs.iter().zip(nexts.into_iter().chain(std::iter::repeat((0, true)))) {
        let _ = ts.set_next(*reg, pick(&pool, choice));
    }
    for (o, choice) in outputs.into_iter().enumerate() {
        let _ = ts.add_output(format!("o{o}"), pick(&pool, choice));
    }
    ts
}

fn arb_pick() -> impl Strategy<Value = Pick> {
    (0..64usize, any::<bool>())
}

fn arb_system_with(reset: BoxedStrategy<Reset>) -> impl Strategy<Value = TransitionSystem> {
    (0..=3usize, 1..=5usize, 0..=16usize, 1..=2usize)
        .prop_flat_map(move |(ninputs, nregs, ngates, nouts)| {
            (
                Just(ninputs),
                proptest::collection::vec(reset.clone(), nregs..=nregs),
                proptest::collection::vec((arb_pick(), arb_pick()), ngates..=ngates),
                proptest::collection::vec(arb_pick(), nregs..=nregs),
                proptest::collection::vec(arb_pick(), nouts..=nouts),
            )
        })
        .prop_map(|(ninputs, resets, gates, nexts, outputs)| {
            build(ninputs, resets, gates, nexts, outputs)
        })
}

/// Strategy for a valid system with mixed reset kinds.
///
/// Generated systems have 0–3 inputs, 1–5 registers, up to 16 AND gates over
/// earlier signals and 1–2 outputs. Every register has a next-state edge.
pub fn arb_transition_system() -> impl Strategy<Value = TransitionSystem> {
    arb_system_with(
        prop_oneof![Just(Reset::Zero), Just(Reset::One), Just(Reset::Free)].boxed(),
    )
}

/// Same shape as [`arb_transition_system`], with every register resetting to zero.
pub fn arb_zero_reset_system() -> impl Strategy<Value = TransitionSystem> {
    arb_system_with(Just(Reset::Zero).boxed())
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_systems_validate(ts in arb_transition_system()) {
            prop_assert!(ts.validate().is_ok());
        }
    }
}
