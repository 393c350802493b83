#![allow(dead_code)]

use latchproof_engine::{PdrConfig, PdrReport, UndecidedReason, Verdict};
use latchproof_ir::{Edge, Reset, TransitionSystem};

/// Free-reset flop `t` that toggles every cycle, read together with a
/// zero-reset high bit `hi` as a two-bit value. `hi` only holds, so the
/// value never exceeds 1. Output `too_big` fires when it does.
pub fn toggle_flop() -> TransitionSystem {
    let mut ts = TransitionSystem::new();
    let t = ts.add_register("t", Reset::Free).expect("fresh name");
    let hi = ts.add_register("hi", Reset::Zero).expect("fresh name");
    ts.set_next(t, !t).expect("register");
    let held = ts.and(hi, t);
    ts.set_next(hi, held).expect("register");
    ts.add_output("too_big", hi).expect("fresh name");
    ts
}

/// Bits of a free-running counter, least significant first.
pub fn add_counter(ts: &mut TransitionSystem, prefix: &str, width: usize) -> Vec<Edge> {
    let bits: Vec<Edge> = (0..width)
        .map(|i| {
            ts.add_register(format!("{prefix}{i}"), Reset::Zero)
                .expect("fresh name")
        })
        .collect();
    let mut carry = Edge::TRUE;
    for &bit in &bits {
        let next = ts.xor(bit, carry);
        ts.set_next(bit, next).expect("register");
        carry = ts.and(carry, bit);
    }
    bits
}

/// Signal that is high when `bits` hold `value`.
pub fn equals(ts: &mut TransitionSystem, bits: &[Edge], value: u64) -> Edge {
    let lits: Vec<Edge> = bits
        .iter()
        .enumerate()
        .map(|(i, &b)| if (value >> i) & 1 == 1 { b } else { !b })
        .collect();
    ts.and_all(lits)
}

/// `width`-bit counter from zero; output `hit` fires at `target`.
pub fn counter(width: usize, target: u64) -> TransitionSystem {
    let mut ts = TransitionSystem::new();
    let bits = add_counter(&mut ts, "c", width);
    let hit = equals(&mut ts, &bits, target);
    ts.add_output("hit", hit).expect("fresh name");
    ts
}

/// Shift chain `s0 -> s1 -> ... -> s{len-1}` fed by `s0 & in`; every stage
/// stays low. `armed` rises after the first cycle and is not part of the
/// chain. Output `leak` fires when the last stage goes high.
pub fn shift_chain(len: usize) -> TransitionSystem {
    let mut ts = TransitionSystem::new();
    let input = ts.add_input("in").expect("fresh name");
    let stages: Vec<Edge> = (0..len)
        .map(|i| ts.add_register(format!("s{i}"), Reset::Zero).expect("fresh name"))
        .collect();
    let armed = ts.add_register("armed", Reset::Zero).expect("fresh name");
    let feed = ts.and(stages[0], input);
    ts.set_next(stages[0], feed).expect("register");
    for i in 1..len {
        ts.set_next(stages[i], stages[i - 1]).expect("register");
    }
    ts.set_next(armed, Edge::TRUE).expect("register");
    ts.add_output("leak", stages[len - 1]).expect("fresh name");
    ts
}

/// Index of the `armed` register of [`shift_chain`].
pub fn armed_register(len: usize) -> usize {
    len
}

/// A shift chain (output 0) next to a 2-bit counter that reaches 3
/// (output 1).
pub fn chain_and_counter(len: usize) -> TransitionSystem {
    let mut ts = shift_chain(len);
    let bits = add_counter(&mut ts, "k", 2);
    let hit = equals(&mut ts, &bits, 3);
    ts.add_output("hit", hit).expect("fresh name");
    ts
}

pub fn bits_value(bits: &[bool]) -> u64 {
    bits.iter()
        .enumerate()
        .fold(0, |acc, (i, &b)| acc | (u64::from(b) << i))
}

pub fn quick_config() -> PdrConfig {
    PdrConfig {
        timeout_secs: 60,
        ..PdrConfig::default()
    }
}

pub fn undecided_reason(report: &PdrReport, output: usize) -> Option<&UndecidedReason> {
    match report.verdict(output)? {
        Verdict::Undecided { reason, .. } => Some(reason),
        _ => None,
    }
}
