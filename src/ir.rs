//! Canonical intermediate representation consumed by the backend.
//!
//! The IR arrives from the upstream translation and linearization phases
//! already in canonical form: statements are a flat sequence, every statement
//! performs at most one complex operation, and a call only appears as a bare
//! statement or as the source of a move into a temporary.  The backend never
//! validates these properties; violating them is a bug in the producer and
//! surfaces as a fatal selection error.

use crate::frame::Frame;
use crate::temp::{Label, Temp};
use std::fmt;

/// Binary operators.  Relational operators produce 0/1; booleans are 0/1
/// integers, so `And`/`Or` are bitwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Equ,
    Neq,
    Lth,
    Gth,
    Leq,
    Geq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Not,
    Neg,
}

/// An expression over temporaries, labels and memory.
#[derive(Debug, Clone)]
pub enum Expr {
    /// 64-bit integer constant.
    Const(i64),
    /// Address of a label.
    Name(Label),
    /// Value of a temporary.
    Temp(Temp),
    /// Word at the given address.
    Mem(Box<Expr>),
    Binop(BinOp, Box<Expr>, Box<Expr>),
    Unop(UnOp, Box<Expr>),
    /// Function call.  Only canonical as a bare statement or as the source
    /// of a `Move` into a temporary; arguments have already been stored to
    /// the outgoing area by earlier statements.
    Call(Label, Vec<Expr>),
}

impl Expr {
    pub fn binop(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binop(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn unop(op: UnOp, sub: Expr) -> Self {
        Expr::Unop(op, Box::new(sub))
    }

    pub fn mem(addr: Expr) -> Self {
        Expr::Mem(Box::new(addr))
    }
}

/// A linearized statement.
#[derive(Debug, Clone)]
pub enum Stmt {
    /// Defines a jump target.
    Label(Label),
    /// Unconditional jump.
    Jump(Label),
    /// Conditional jump: to `pos` when `cond` is non-zero, otherwise to
    /// `neg`.  Linearization guarantees `neg` immediately follows.
    CJump { cond: Expr, pos: Label, neg: Label },
    /// `dst = src`.  `dst` is a temporary or a memory location.
    Move { dst: Expr, src: Expr },
    /// Evaluate for side effects, discard the value.
    Expr(Expr),
}

/// One function's worth of canonical IR: its frame descriptor plus the
/// linearized body.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub frame: Frame,
    pub body: Vec<Stmt>,
}

// ── Textual dumps ───────────────────────────────────────────────────────

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Equ => "==",
            BinOp::Neq => "!=",
            BinOp::Lth => "<",
            BinOp::Gth => ">",
            BinOp::Leq => "<=",
            BinOp::Geq => ">=",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(v) => write!(f, "{v}"),
            Expr::Name(l) => write!(f, "&{l}"),
            Expr::Temp(t) => write!(f, "{t}"),
            Expr::Mem(addr) => write!(f, "MEM[{addr}]"),
            Expr::Binop(op, lhs, rhs) => write!(f, "({lhs} {op} {rhs})"),
            Expr::Unop(UnOp::Not, sub) => write!(f, "!{sub}"),
            Expr::Unop(UnOp::Neg, sub) => write!(f, "-{sub}"),
            Expr::Call(func, args) => {
                write!(f, "{func}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Label(l) => write!(f, "{l}:"),
            Stmt::Jump(l) => write!(f, "  GOTO {l}"),
            Stmt::CJump { cond, pos, neg } => {
                write!(f, "  if {cond}: GOTO {pos} else GOTO {neg}")
            }
            Stmt::Move { dst, src } => write!(f, "  {dst} = {src}"),
            Stmt::Expr(e) => write!(f, "  {e}"),
        }
    }
}

impl Fragment {
    /// Render the fragment line by line, for logs and tests.
    pub fn to_lines(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.body.len() + 1);
        out.push(format!("FRAGMENT {}", self.frame.label));
        for stmt in &self.body {
            out.push(stmt.to_string());
        }
        out
    }
}
