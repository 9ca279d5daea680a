//! Instruction model shared by selection, liveness and allocation.
//!
//! Three shapes: label markers, general operations, and register-to-register
//! moves.  An operation's `asm` field is the target template with positional
//! operand placeholders — `` `s0``,`` `s1``,… for uses and `` `d0``,… for
//! defs; labels and immediates are spelled literally.  Rendering substitutes
//! register names for placeholders once colours are known.

use crate::temp::{Label, Temp};
use std::fmt;

use super::target::op;

/// A target instruction over temporaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instr {
    /// Defines a jump target.  Uses nothing, defines nothing.
    Label(Label),
    /// A general operation.  `jumps` is non-empty only for control
    /// transfers.
    Oper {
        asm: String,
        uses: Vec<Temp>,
        defs: Vec<Temp>,
        jumps: Vec<Label>,
    },
    /// `dst = src`, rendered as `ADD `d0,`s0,0`.  Distinguished so the
    /// allocator can try to unify the two temporaries and drop the
    /// instruction.
    Move { asm: String, src: Temp, dst: Temp },
}

// ── Convenience constructors ────────────────────────────────────────────

impl Instr {
    /// An operation with no jump targets.
    pub fn oper(asm: impl Into<String>, uses: Vec<Temp>, defs: Vec<Temp>) -> Self {
        Instr::Oper {
            asm: asm.into(),
            uses,
            defs,
            jumps: Vec::new(),
        }
    }

    /// A control transfer.
    pub fn branch(asm: impl Into<String>, uses: Vec<Temp>, jumps: Vec<Label>) -> Self {
        Instr::Oper {
            asm: asm.into(),
            uses,
            defs: Vec::new(),
            jumps,
        }
    }

    /// A coalescable register-to-register move.
    pub fn mov(dst: Temp, src: Temp) -> Self {
        Instr::Move {
            asm: format!("{} `d0,`s0,0", op::ADD),
            src,
            dst,
        }
    }
}

// ── Accessors ───────────────────────────────────────────────────────────

impl Instr {
    pub fn uses(&self) -> &[Temp] {
        match self {
            Instr::Label(_) => &[],
            Instr::Oper { uses, .. } => uses,
            Instr::Move { src, .. } => std::slice::from_ref(src),
        }
    }

    pub fn defs(&self) -> &[Temp] {
        match self {
            Instr::Label(_) => &[],
            Instr::Oper { defs, .. } => defs,
            Instr::Move { dst, .. } => std::slice::from_ref(dst),
        }
    }

    pub fn jumps(&self) -> &[Label] {
        match self {
            Instr::Oper { jumps, .. } => jumps,
            _ => &[],
        }
    }

    pub fn is_move(&self) -> bool {
        matches!(self, Instr::Move { .. })
    }

    /// Control never falls through an unconditional jump.
    pub fn is_unconditional_jump(&self) -> bool {
        matches!(self, Instr::Oper { asm, .. } if asm.starts_with(op::JMP))
    }

    /// Calls transfer control but return: they fall through like ordinary
    /// instructions.
    pub fn is_call(&self) -> bool {
        matches!(self, Instr::Oper { asm, .. } if asm.starts_with(op::PUSHJ))
    }

    /// Rebuild the instruction with every use passed through `ruse` and
    /// every def through `rdef`.  Used by spill rewriting.
    pub fn rewrite(self, ruse: impl Fn(Temp) -> Temp, rdef: impl Fn(Temp) -> Temp) -> Instr {
        match self {
            Instr::Label(_) => self,
            Instr::Oper {
                asm,
                uses,
                defs,
                jumps,
            } => Instr::Oper {
                asm,
                uses: uses.into_iter().map(ruse).collect(),
                defs: defs.into_iter().map(rdef).collect(),
                jumps,
            },
            Instr::Move { asm, src, dst } => Instr::Move {
                asm,
                src: ruse(src),
                dst: rdef(dst),
            },
        }
    }
}

// ── Rendering ───────────────────────────────────────────────────────────

impl Instr {
    /// Substitute operand placeholders using `name_of`.
    ///
    /// Malformed placeholders and out-of-range indices are left verbatim so
    /// a broken template stays visible in dumps instead of vanishing.
    pub fn render(&self, name_of: &dyn Fn(Temp) -> String) -> String {
        let (asm, uses, defs): (&str, &[Temp], &[Temp]) = match self {
            Instr::Label(l) => return format!("{l}:"),
            Instr::Oper {
                asm, uses, defs, ..
            } => (asm, uses, defs),
            Instr::Move { asm, src, dst } => {
                (asm, std::slice::from_ref(src), std::slice::from_ref(dst))
            }
        };

        let mut out = String::with_capacity(asm.len());
        let mut chars = asm.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '`' {
                out.push(c);
                continue;
            }
            let kind = chars.next();
            let mut index = 0usize;
            let mut any_digit = false;
            while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
                index = index * 10 + d as usize;
                any_digit = true;
                chars.next();
            }
            let operand = match kind {
                Some('s') if any_digit => uses.get(index),
                Some('d') if any_digit => defs.get(index),
                _ => None,
            };
            match operand {
                Some(&t) => out.push_str(&name_of(t)),
                None => {
                    out.push('`');
                    if let Some(k) = kind {
                        out.push(k);
                    }
                    if any_digit {
                        out.push_str(&index.to_string());
                    }
                }
            }
        }
        out
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(&|t| t.to_string()))
    }
}
