//! Liveness analysis over a function's instruction list.
//!
//! Backward dataflow to a fixpoint over the control-flow graph built from
//! label positions and jump targets, with an implicit fall-through edge for
//! every instruction that is not an unconditional jump.  Results live in a
//! side table keyed by instruction index; instructions stay immutable.
//!
//! ```text
//! live_in(i)  = uses(i) ∪ (live_out(i) − defs(i))
//! live_out(i) = ⋃ { live_in(s) : s ∈ successors(i) }
//! ```
//!
//! Sets start empty and only grow, over a finite temporary universe, so the
//! iteration terminates.  Total over well-formed instruction lists.

use std::collections::{HashMap, HashSet};

use crate::frame::Frame;
use crate::temp::{Label, Temp};

use super::instruction::Instr;

/// Per-instruction live-in/live-out sets, indexed by position.
#[derive(Debug, PartialEq, Eq)]
pub struct LivenessInfo {
    live_in: Vec<HashSet<Temp>>,
    live_out: Vec<HashSet<Temp>>,
}

impl LivenessInfo {
    pub fn live_in(&self, i: usize) -> &HashSet<Temp> {
        &self.live_in[i]
    }

    pub fn live_out(&self, i: usize) -> &HashSet<Temp> {
        &self.live_out[i]
    }

    pub fn len(&self) -> usize {
        self.live_in.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live_in.is_empty()
    }
}

/// Successor indices for every instruction.
///
/// Jump targets resolve against labels defined in this fragment; a target
/// outside the fragment (a call to another function) contributes no edge.
/// Everything except an unconditional `JMP` also falls through.
pub fn successors(instrs: &[Instr]) -> Vec<Vec<usize>> {
    let label_at: HashMap<&Label, usize> = instrs
        .iter()
        .enumerate()
        .filter_map(|(i, ins)| match ins {
            Instr::Label(l) => Some((l, i)),
            _ => None,
        })
        .collect();

    instrs
        .iter()
        .enumerate()
        .map(|(i, ins)| {
            let mut succ = Vec::new();
            for target in ins.jumps() {
                if let Some(&j) = label_at.get(target) {
                    succ.push(j);
                }
            }
            let next = i + 1;
            if next < instrs.len() && !ins.is_unconditional_jump() && !succ.contains(&next) {
                succ.push(next);
            }
            succ
        })
        .collect()
}

/// Annotate every instruction with its live-in and live-out sets.
///
/// Exit instructions (no successors) are seeded with the frame's
/// return-value temporary so the result survives to the epilogue.
pub fn analyze(instrs: &[Instr], frame: &Frame) -> LivenessInfo {
    let n = instrs.len();
    let succ = successors(instrs);

    let mut live_in: Vec<HashSet<Temp>> = vec![HashSet::new(); n];
    let mut live_out: Vec<HashSet<Temp>> = vec![HashSet::new(); n];

    let mut changed = true;
    while changed {
        changed = false;
        for i in (0..n).rev() {
            let mut out = HashSet::new();
            for &s in &succ[i] {
                out.extend(live_in[s].iter().copied());
            }
            if succ[i].is_empty() {
                out.insert(frame.return_value);
            }

            let defs = instrs[i].defs();
            let mut inn: HashSet<Temp> = instrs[i].uses().iter().copied().collect();
            inn.extend(out.iter().copied().filter(|t| !defs.contains(t)));

            if out != live_out[i] {
                live_out[i] = out;
                changed = true;
            }
            if inn != live_in[i] {
                live_in[i] = inn;
                changed = true;
            }
        }
    }

    LivenessInfo { live_in, live_out }
}
