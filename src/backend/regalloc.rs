//! Register allocation by iterated register coalescing.
//!
//! The textbook Chaitin/Briggs/George allocator: build the interference
//! graph from liveness, partition nodes into worklists, then interleave
//! simplify / coalesce / freeze / select-spill until every node is either on
//! the select stack or coalesced away.  Colours are assigned popping the
//! stack; if any node fails to colour, the spilled temporaries are rewritten
//! into stack traffic and the whole attempt restarts from liveness.
//!
//! All state belongs to one [`Attempt`] per iteration — nothing is shared
//! across functions or across retries.

use std::collections::{HashMap, HashSet};
use std::mem;

use crate::frame::Frame;
use crate::temp::{Temp, TempPool};
use crate::CompileError;

use super::instruction::Instr;
use super::liveness::{self, LivenessInfo};
use super::target::{op, FRAME_POINTER, STACK_POINTER};

type MoveId = usize;

/// Result of a successful allocation: the (possibly spill-rewritten)
/// instruction list and the temporary → register-index map.
#[derive(Debug)]
pub struct Allocation {
    pub instrs: Vec<Instr>,
    pub colors: HashMap<Temp, usize>,
}

/// Allocate registers for one function.
///
/// Loops liveness → build → colour → rewrite until a spill-free colouring
/// is found.  Each retry retires the spilled temporaries into fixed memory
/// traffic, so the loop terminates.
pub fn allocate(
    mut instrs: Vec<Instr>,
    frame: &mut Frame,
    pool: &mut TempPool,
    k: usize,
) -> Result<Allocation, CompileError> {
    loop {
        let live = liveness::analyze(&instrs, frame);
        let mut attempt = Attempt::new(k, frame);
        attempt.build(&instrs, &live);
        attempt.make_worklist();
        attempt.process()?;
        attempt.assign_colors()?;

        if attempt.spilled_nodes.is_empty() {
            let colors = attempt.into_colors();
            let instrs = strip_redundant_moves(instrs, &colors);
            return Ok(Allocation { instrs, colors });
        }

        let spilled = mem::take(&mut attempt.spilled_nodes);
        instrs = rewrite_spills(instrs, &spilled, frame, pool);
    }
}

/// The interference edges a build pass derives for an instruction list.
/// Symmetric: `(u, v)` present iff `(v, u)` is.  Exposed for property
/// checks; [`allocate`] runs the same builder internally.
pub fn interference_edges(
    instrs: &[Instr],
    frame: &Frame,
    k: usize,
) -> HashSet<(Temp, Temp)> {
    let live = liveness::analyze(instrs, frame);
    let mut attempt = Attempt::new(k, frame);
    attempt.build(instrs, &live);
    attempt.adj_set
}

// ============================================================================
// One allocation attempt
// ============================================================================

/// Worklists, move sets and graph structures for a single attempt.
///
/// Between algorithm steps every non-precoloured node sits in exactly one of
/// simplify / freeze / spill / select-stack∪coalesced / colored.
struct Attempt {
    k: usize,
    precolored: HashSet<Temp>,

    initial: Vec<Temp>,
    simplify_worklist: Vec<Temp>,
    freeze_worklist: HashSet<Temp>,
    spill_worklist: HashSet<Temp>,
    spilled_nodes: HashSet<Temp>,
    coalesced_nodes: HashSet<Temp>,
    colored_nodes: HashSet<Temp>,
    select_stack: Vec<Temp>,

    /// Move instructions as (dst, src), indexed by [`MoveId`].
    moves: Vec<(Temp, Temp)>,
    coalesced_moves: HashSet<MoveId>,
    constrained_moves: HashSet<MoveId>,
    frozen_moves: HashSet<MoveId>,
    worklist_moves: HashSet<MoveId>,
    active_moves: HashSet<MoveId>,

    adj_set: HashSet<(Temp, Temp)>,
    adj_list: HashMap<Temp, HashSet<Temp>>,
    degree: HashMap<Temp, usize>,
    move_list: HashMap<Temp, HashSet<MoveId>>,
    alias: HashMap<Temp, Temp>,
    color: HashMap<Temp, usize>,
    /// Static use+def counts, for the spill heuristic.
    occurrences: HashMap<Temp, usize>,
}

impl Attempt {
    fn new(k: usize, frame: &Frame) -> Self {
        let mut attempt = Attempt {
            k,
            precolored: HashSet::new(),
            initial: Vec::new(),
            simplify_worklist: Vec::new(),
            freeze_worklist: HashSet::new(),
            spill_worklist: HashSet::new(),
            spilled_nodes: HashSet::new(),
            coalesced_nodes: HashSet::new(),
            colored_nodes: HashSet::new(),
            select_stack: Vec::new(),
            moves: Vec::new(),
            coalesced_moves: HashSet::new(),
            constrained_moves: HashSet::new(),
            frozen_moves: HashSet::new(),
            worklist_moves: HashSet::new(),
            active_moves: HashSet::new(),
            adj_set: HashSet::new(),
            adj_list: HashMap::new(),
            degree: HashMap::new(),
            move_list: HashMap::new(),
            alias: HashMap::new(),
            color: HashMap::new(),
            occurrences: HashMap::new(),
        };
        // The reserved machine temporaries are precoloured with their
        // dedicated register indices and carry effectively infinite degree.
        for (temp, reg) in [
            (frame.frame_pointer, FRAME_POINTER),
            (frame.stack_pointer, STACK_POINTER),
        ] {
            attempt.precolored.insert(temp);
            attempt.color.insert(temp, reg);
            attempt.degree.insert(temp, usize::MAX);
        }
        attempt
    }

    // ── Build ───────────────────────────────────────────────────────────

    fn build(&mut self, instrs: &[Instr], live: &LivenessInfo) {
        for (i, ins) in instrs.iter().enumerate() {
            for &t in ins.defs().iter().chain(ins.uses()) {
                *self.occurrences.entry(t).or_insert(0) += 1;
                if !self.precolored.contains(&t) && !self.adj_list.contains_key(&t) {
                    self.adj_list.insert(t, HashSet::new());
                    self.degree.insert(t, 0);
                    self.initial.push(t);
                }
            }

            if let Instr::Move { src, dst, .. } = ins {
                let id = self.moves.len();
                self.moves.push((*dst, *src));
                self.move_list.entry(*dst).or_default().insert(id);
                self.move_list.entry(*src).or_default().insert(id);
                self.worklist_moves.insert(id);
            }

            let mut live_here: HashSet<Temp> = live.live_out(i).clone();
            if let Instr::Move { src, .. } = ins {
                live_here.remove(src);
            }
            live_here.extend(ins.defs().iter().copied());
            for &d in ins.defs() {
                for &l in &live_here {
                    self.add_edge(l, d);
                }
            }
        }
    }

    fn add_edge(&mut self, u: Temp, v: Temp) {
        if u == v || self.adj_set.contains(&(u, v)) {
            return;
        }
        self.adj_set.insert((u, v));
        self.adj_set.insert((v, u));
        if !self.precolored.contains(&u) {
            self.adj_list.entry(u).or_default().insert(v);
            *self.degree.entry(u).or_insert(0) += 1;
        }
        if !self.precolored.contains(&v) {
            self.adj_list.entry(v).or_default().insert(u);
            *self.degree.entry(v).or_insert(0) += 1;
        }
    }

    // ── Worklist management ─────────────────────────────────────────────

    fn make_worklist(&mut self) {
        for t in mem::take(&mut self.initial) {
            let degree = self.degree.get(&t).copied().unwrap_or(0);
            if degree >= self.k {
                self.spill_worklist.insert(t);
            } else if self.move_related(t) {
                self.freeze_worklist.insert(t);
            } else {
                self.simplify_worklist.push(t);
            }
        }
    }

    /// Run simplify / coalesce / freeze / select-spill until every worklist
    /// drains.
    fn process(&mut self) -> Result<(), CompileError> {
        loop {
            if !self.simplify_worklist.is_empty() {
                self.simplify()?;
            } else if !self.worklist_moves.is_empty() {
                self.coalesce()?;
            } else if !self.freeze_worklist.is_empty() {
                self.freeze()?;
            } else if !self.spill_worklist.is_empty() {
                self.select_spill()?;
            } else {
                return Ok(());
            }
        }
    }

    fn degree_of(&self, t: Temp) -> Result<usize, CompileError> {
        self.degree
            .get(&t)
            .copied()
            .ok_or_else(|| CompileError::MissingNode {
                temp: t.to_string(),
            })
    }

    /// Neighbours still in play: adjacency minus the select stack and the
    /// coalesced set.
    fn adjacent(&self, n: Temp) -> Result<Vec<Temp>, CompileError> {
        let list = self
            .adj_list
            .get(&n)
            .ok_or_else(|| CompileError::MissingNode {
                temp: n.to_string(),
            })?;
        Ok(list
            .iter()
            .copied()
            .filter(|t| !self.select_stack.contains(t) && !self.coalesced_nodes.contains(t))
            .collect())
    }

    fn node_moves(&self, n: Temp) -> Vec<MoveId> {
        match self.move_list.get(&n) {
            Some(ids) => ids
                .iter()
                .copied()
                .filter(|m| self.active_moves.contains(m) || self.worklist_moves.contains(m))
                .collect(),
            None => Vec::new(),
        }
    }

    fn move_related(&self, n: Temp) -> bool {
        !self.node_moves(n).is_empty()
    }

    fn push_simplify(&mut self, t: Temp) {
        if !self.simplify_worklist.contains(&t) {
            self.simplify_worklist.push(t);
        }
    }

    // ── Simplify ────────────────────────────────────────────────────────

    fn simplify(&mut self) -> Result<(), CompileError> {
        while let Some(n) = self.simplify_worklist.pop() {
            if self.coalesced_nodes.contains(&n) || self.select_stack.contains(&n) {
                continue;
            }
            self.select_stack.push(n);
            for m in self.adjacent(n)? {
                self.decrement_degree(m)?;
            }
            break;
        }
        Ok(())
    }

    fn decrement_degree(&mut self, m: Temp) -> Result<(), CompileError> {
        let d = self.degree_of(m)?;
        self.degree.insert(m, d.saturating_sub(1));
        if d == self.k {
            let mut nodes = self.adjacent(m)?;
            nodes.push(m);
            self.enable_moves(&nodes);
            self.spill_worklist.remove(&m);
            if self.move_related(m) {
                self.freeze_worklist.insert(m);
            } else {
                self.push_simplify(m);
            }
        }
        Ok(())
    }

    fn enable_moves(&mut self, nodes: &[Temp]) {
        for &n in nodes {
            for m in self.node_moves(n) {
                if self.active_moves.remove(&m) {
                    self.worklist_moves.insert(m);
                }
            }
        }
    }

    // ── Coalesce ────────────────────────────────────────────────────────

    fn coalesce(&mut self) -> Result<(), CompileError> {
        let Some(&m) = self.worklist_moves.iter().next() else {
            return Ok(());
        };
        self.worklist_moves.remove(&m);

        let (dst, src) = self.moves[m];
        let x = self.get_alias(dst);
        let y = self.get_alias(src);
        let (u, v) = if self.precolored.contains(&y) {
            (y, x)
        } else {
            (x, y)
        };

        if u == v {
            self.coalesced_moves.insert(m);
            self.add_work_list(u)?;
        } else if self.precolored.contains(&v) || self.adj_set.contains(&(u, v)) {
            self.constrained_moves.insert(m);
            self.add_work_list(u)?;
            self.add_work_list(v)?;
        } else if self.can_combine(u, v)? {
            self.coalesced_moves.insert(m);
            self.combine(u, v)?;
            self.add_work_list(u)?;
        } else {
            self.active_moves.insert(m);
        }
        Ok(())
    }

    /// George's test against a precoloured survivor, Briggs' conservative
    /// test otherwise.
    fn can_combine(&self, u: Temp, v: Temp) -> Result<bool, CompileError> {
        if self.precolored.contains(&u) {
            for t in self.adjacent(v)? {
                let safe = self.degree_of(t)? < self.k
                    || self.precolored.contains(&t)
                    || self.adj_set.contains(&(t, u));
                if !safe {
                    return Ok(false);
                }
            }
            Ok(true)
        } else {
            let mut nodes: HashSet<Temp> = self.adjacent(u)?.into_iter().collect();
            nodes.extend(self.adjacent(v)?);
            let mut significant = 0;
            for n in nodes {
                if self.degree_of(n)? >= self.k {
                    significant += 1;
                }
            }
            Ok(significant < self.k)
        }
    }

    fn add_work_list(&mut self, u: Temp) -> Result<(), CompileError> {
        if !self.precolored.contains(&u) && !self.move_related(u) && self.degree_of(u)? < self.k {
            self.freeze_worklist.remove(&u);
            self.push_simplify(u);
        }
        Ok(())
    }

    fn combine(&mut self, u: Temp, v: Temp) -> Result<(), CompileError> {
        if !self.freeze_worklist.remove(&v) {
            self.spill_worklist.remove(&v);
        }
        self.coalesced_nodes.insert(v);
        self.alias.insert(v, u);

        if let Some(vmoves) = self.move_list.get(&v).cloned() {
            self.move_list.entry(u).or_default().extend(vmoves);
        }
        self.enable_moves(&[v]);

        for t in self.adjacent(v)? {
            self.add_edge(t, u);
            self.decrement_degree(t)?;
        }
        if self.degree_of(u)? >= self.k && self.freeze_worklist.remove(&u) {
            self.spill_worklist.insert(u);
        }
        Ok(())
    }

    fn get_alias(&self, n: Temp) -> Temp {
        let mut n = n;
        while self.coalesced_nodes.contains(&n) {
            match self.alias.get(&n) {
                Some(&a) => n = a,
                None => break,
            }
        }
        n
    }

    // ── Freeze ──────────────────────────────────────────────────────────

    fn freeze(&mut self) -> Result<(), CompileError> {
        let Some(&u) = self.freeze_worklist.iter().next() else {
            return Ok(());
        };
        self.freeze_worklist.remove(&u);
        self.push_simplify(u);
        self.freeze_moves(u)?;
        Ok(())
    }

    /// Abandon every move associated with `u`; they are never coalesced.
    fn freeze_moves(&mut self, u: Temp) -> Result<(), CompileError> {
        for m in self.node_moves(u) {
            let (x, y) = self.moves[m];
            let v = if self.get_alias(y) == self.get_alias(u) {
                self.get_alias(x)
            } else {
                self.get_alias(y)
            };
            self.active_moves.remove(&m);
            self.worklist_moves.remove(&m);
            self.frozen_moves.insert(m);
            if !self.precolored.contains(&v)
                && self.node_moves(v).is_empty()
                && self.degree_of(v)? < self.k
                && self.freeze_worklist.remove(&v)
            {
                self.push_simplify(v);
            }
        }
        Ok(())
    }

    // ── Select spill ────────────────────────────────────────────────────

    /// Offer the worst spill candidate to simplify; the real decision falls
    /// out of colouring.  Heuristic: highest degree per static occurrence.
    fn select_spill(&mut self) -> Result<(), CompileError> {
        let mut best: Option<(Temp, f64)> = None;
        for &t in &self.spill_worklist {
            let occurrences = self.occurrences.get(&t).copied().unwrap_or(1).max(1);
            let metric = self.degree_of(t)? as f64 / occurrences as f64;
            if best.map_or(true, |(_, b)| metric > b) {
                best = Some((t, metric));
            }
        }
        let Some((m, _)) = best else {
            return Ok(());
        };
        self.spill_worklist.remove(&m);
        self.push_simplify(m);
        self.freeze_moves(m)?;
        Ok(())
    }

    // ── Assign colours ──────────────────────────────────────────────────

    fn assign_colors(&mut self) -> Result<(), CompileError> {
        while let Some(n) = self.select_stack.pop() {
            if self.coalesced_nodes.contains(&n) {
                continue;
            }
            let mut ok_colors: Vec<usize> = (0..self.k).collect();
            let neighbours = self
                .adj_list
                .get(&n)
                .ok_or_else(|| CompileError::MissingNode {
                    temp: n.to_string(),
                })?;
            for &w in neighbours {
                let w = self.get_alias(w);
                if self.colored_nodes.contains(&w) || self.precolored.contains(&w) {
                    if let Some(&c) = self.color.get(&w) {
                        ok_colors.retain(|&x| x != c);
                    }
                }
            }
            match ok_colors.first() {
                Some(&c) => {
                    self.colored_nodes.insert(n);
                    self.color.insert(n, c);
                }
                None => {
                    self.spilled_nodes.insert(n);
                }
            }
        }

        let coalesced: Vec<Temp> = self.coalesced_nodes.iter().copied().collect();
        for n in coalesced {
            let rep = self.get_alias(n);
            if let Some(&c) = self.color.get(&rep) {
                self.color.insert(n, c);
            }
        }
        Ok(())
    }

    fn into_colors(self) -> HashMap<Temp, usize> {
        self.color
    }
}

// ============================================================================
// Spill rewriting
// ============================================================================

/// Rewrite every reference to a spilled temporary into stack traffic.
///
/// Each spilled temporary gets a fixed slot in the frame's spill area.
/// Every use loads the slot into a fresh temporary first; every def stores a
/// fresh temporary back afterwards.  The fresh temporaries live only across
/// the one instruction they serve.
fn rewrite_spills(
    instrs: Vec<Instr>,
    spilled: &HashSet<Temp>,
    frame: &mut Frame,
    pool: &mut TempPool,
) -> Vec<Instr> {
    let mut slots: HashMap<Temp, i64> = HashMap::new();
    for &t in spilled {
        slots.insert(t, frame.alloc_spill_slot());
    }
    let sp = frame.stack_pointer;

    let mut out = Vec::with_capacity(instrs.len());
    for ins in instrs {
        let spilled_uses: Vec<Temp> = dedup(ins.uses().iter().filter(|t| slots.contains_key(*t)));
        let spilled_defs: Vec<Temp> = dedup(ins.defs().iter().filter(|t| slots.contains_key(*t)));
        if spilled_uses.is_empty() && spilled_defs.is_empty() {
            out.push(ins);
            continue;
        }

        let mut use_map: HashMap<Temp, Temp> = HashMap::new();
        for t in spilled_uses {
            let fresh = pool.fresh();
            out.push(Instr::oper(
                format!("{} `d0,`s0,{}", op::LDO, slots[&t]),
                vec![sp],
                vec![fresh],
            ));
            use_map.insert(t, fresh);
        }

        let mut def_map: HashMap<Temp, Temp> = HashMap::new();
        let mut stores: Vec<Temp> = Vec::new();
        for t in spilled_defs {
            def_map.insert(t, pool.fresh());
            stores.push(t);
        }

        out.push(ins.rewrite(
            |t| use_map.get(&t).copied().unwrap_or(t),
            |t| def_map.get(&t).copied().unwrap_or(t),
        ));

        for t in stores {
            out.push(Instr::oper(
                format!("{} `s0,`s1,{}", op::STO, slots[&t]),
                vec![def_map[&t], sp],
                Vec::new(),
            ));
        }
    }
    out
}

fn dedup<'a>(temps: impl Iterator<Item = &'a Temp>) -> Vec<Temp> {
    let mut seen = HashSet::new();
    temps.copied().filter(|t| seen.insert(*t)).collect()
}

/// Drop moves whose endpoints ended up in the same register — the payoff of
/// coalescing.
fn strip_redundant_moves(instrs: Vec<Instr>, colors: &HashMap<Temp, usize>) -> Vec<Instr> {
    instrs
        .into_iter()
        .filter(|ins| match ins {
            Instr::Move { src, dst, .. } => match (colors.get(src), colors.get(dst)) {
                (Some(a), Some(b)) => a != b,
                _ => true,
            },
            _ => true,
        })
        .collect()
}
