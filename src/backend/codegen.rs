//! Instruction selection: canonical IR → target instructions.
//!
//! A purely local, deterministic tiling of each statement and its
//! subexpressions.  Every expression visit returns the temporary holding its
//! value; emitted instructions accumulate in order and are never retracted.
//! The selector trusts the linearizer: IR shapes outside the canonical
//! contract are reported as fatal errors, not repaired.

use crate::frame::Frame;
use crate::ir::{BinOp, Expr, Stmt, UnOp};
use crate::temp::{Temp, TempPool};
use crate::CompileError;

use super::instruction::Instr;
use super::target::{op, NUM_REGS};

/// Select instructions for one function body.
pub fn select(frame: &Frame, body: &[Stmt], pool: &mut TempPool) -> Result<Vec<Instr>, CompileError> {
    let mut gen = CodeGen {
        frame,
        pool,
        out: Vec::new(),
    };
    for stmt in body {
        gen.stmt(stmt)?;
    }
    Ok(gen.out)
}

struct CodeGen<'a> {
    frame: &'a Frame,
    pool: &'a mut TempPool,
    out: Vec<Instr>,
}

impl CodeGen<'_> {
    fn emit(&mut self, instr: Instr) {
        self.out.push(instr);
    }

    fn fresh(&mut self) -> Temp {
        self.pool.fresh()
    }

    // ── Statements ──────────────────────────────────────────────────────

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Label(l) => self.emit(Instr::Label(l.clone())),
            Stmt::Jump(l) => {
                self.emit(Instr::branch(
                    format!("{} {l}", op::JMP),
                    Vec::new(),
                    vec![l.clone()],
                ));
            }
            Stmt::CJump { cond, pos, neg } => {
                let c = self.expr(cond)?;
                // Condition is 0/1; branch on positive.  Both targets are
                // listed so the CFG sees the fall-through arm too.
                self.emit(Instr::branch(
                    format!("{} `s0,{pos}", op::BP),
                    vec![c],
                    vec![pos.clone(), neg.clone()],
                ));
            }
            Stmt::Move { dst, src } => self.mov(dst, src)?,
            Stmt::Expr(e) => {
                self.expr_or_call(e)?;
            }
        }
        Ok(())
    }

    fn mov(&mut self, dst: &Expr, src: &Expr) -> Result<(), CompileError> {
        match dst {
            Expr::Temp(t) => {
                let s = self.expr_or_call(src)?;
                self.emit(Instr::mov(*t, s));
            }
            Expr::Mem(addr) => {
                let (base, offset) = self.address(addr)?;
                let s = self.expr(src)?;
                self.emit(Instr::oper(
                    format!("{} `s0,`s1,{offset}", op::STO),
                    vec![s, base],
                    Vec::new(),
                ));
            }
            other => {
                return Err(CompileError::BadMoveTarget {
                    expr: other.to_string(),
                })
            }
        }
        Ok(())
    }

    // ── Expressions ─────────────────────────────────────────────────────

    /// Evaluate an expression into a temporary.  Calls are not canonical
    /// here; they only appear hoisted (see [`Self::expr_or_call`]).
    fn expr(&mut self, expr: &Expr) -> Result<Temp, CompileError> {
        match expr {
            Expr::Const(v) => Ok(self.constant(*v)),
            Expr::Name(l) => {
                let d = self.fresh();
                self.emit(Instr::oper(
                    format!("{} `d0,{l}", op::LDA),
                    Vec::new(),
                    vec![d],
                ));
                Ok(d)
            }
            Expr::Temp(t) => Ok(*t),
            Expr::Mem(addr) => {
                let (base, offset) = self.address(addr)?;
                let d = self.fresh();
                self.emit(Instr::oper(
                    format!("{} `d0,`s0,{offset}", op::LDO),
                    vec![base],
                    vec![d],
                ));
                Ok(d)
            }
            Expr::Binop(bin, lhs, rhs) => self.binop(*bin, lhs, rhs),
            Expr::Unop(un, sub) => self.unop(*un, sub),
            Expr::Call(..) => Err(CompileError::NestedCall {
                expr: expr.to_string(),
            }),
        }
    }

    /// Like [`Self::expr`] but accepts a call, for the two positions the
    /// canonical form allows one: a bare statement and a move source.
    fn expr_or_call(&mut self, expr: &Expr) -> Result<Temp, CompileError> {
        match expr {
            Expr::Call(func, _args) => {
                // Arguments already sit in the outgoing area; linearization
                // stored them before the call site.
                self.emit(Instr::branch(
                    format!("{} ${NUM_REGS},{func}", op::PUSHJ),
                    Vec::new(),
                    vec![func.clone()],
                ));
                // Capture the SP-relative slot holding the call's result.
                let d = self.fresh();
                let sp = self.frame.stack_pointer;
                self.emit(Instr::oper(
                    format!("{} `d0,`s0,0", op::ADD),
                    vec![sp],
                    vec![d],
                ));
                Ok(d)
            }
            _ => self.expr(expr),
        }
    }

    /// Recognize the addressed-access idiom `base + constant`; anything else
    /// evaluates the whole address and uses offset 0.
    fn address(&mut self, addr: &Expr) -> Result<(Temp, i64), CompileError> {
        if let Expr::Binop(BinOp::Add, base, off) = addr {
            if let Expr::Const(k) = **off {
                let b = self.expr(base)?;
                return Ok((b, k));
            }
        }
        Ok((self.expr(addr)?, 0))
    }

    /// Load a 64-bit immediate by composing its four 16-bit fields.  Always
    /// four instructions, regardless of the value.
    fn constant(&mut self, value: i64) -> Temp {
        let d = self.fresh();
        let fields = [
            (op::SETL, value & 0xFFFF),
            (op::INCML, (value >> 16) & 0xFFFF),
            (op::INCMH, (value >> 32) & 0xFFFF),
            (op::INCH, (value >> 48) & 0xFFFF),
        ];
        for (mnemonic, field) in fields {
            self.emit(Instr::oper(
                format!("{mnemonic} `d0,{field}"),
                Vec::new(),
                vec![d],
            ));
        }
        d
    }

    fn binop(&mut self, bin: BinOp, lhs: &Expr, rhs: &Expr) -> Result<Temp, CompileError> {
        let a = self.expr(lhs)?;
        let b = self.expr(rhs)?;
        let d = match bin {
            BinOp::Add => self.three(op::ADD, a, b),
            BinOp::Sub => self.three(op::SUB, a, b),
            BinOp::Mul => self.three(op::MUL, a, b),
            BinOp::Div => self.three(op::DIV, a, b),
            BinOp::And => self.three(op::AND, a, b),
            BinOp::Or => self.three(op::OR, a, b),
            // a - (a/b)*b, no remainder opcode on this machine.
            BinOp::Mod => {
                let t = self.fresh();
                self.emit(Instr::oper(
                    format!("{} `d0,`s0,`s1", op::DIV),
                    vec![a, b],
                    vec![t],
                ));
                self.emit(Instr::oper(
                    format!("{} `d0,`s0,`s1", op::MUL),
                    vec![t, b],
                    vec![t],
                ));
                self.emit(Instr::oper(
                    format!("{} `d0,`s0,`s1", op::SUB),
                    vec![a, t],
                    vec![t],
                ));
                t
            }
            BinOp::Equ => self.relational(op::ZSZ, a, b),
            BinOp::Neq => self.relational(op::ZSNZ, a, b),
            BinOp::Lth => self.relational(op::ZSN, a, b),
            BinOp::Gth => self.relational(op::ZSP, a, b),
            BinOp::Leq => self.relational(op::ZSNP, a, b),
            BinOp::Geq => self.relational(op::ZSNN, a, b),
        };
        Ok(d)
    }

    fn three(&mut self, mnemonic: &str, a: Temp, b: Temp) -> Temp {
        let d = self.fresh();
        self.emit(Instr::oper(
            format!("{mnemonic} `d0,`s0,`s1"),
            vec![a, b],
            vec![d],
        ));
        d
    }

    /// Compare to a signed tri-state, then materialize 0/1 with the
    /// operator's condition variant.
    fn relational(&mut self, zs: &str, a: Temp, b: Temp) -> Temp {
        let c = self.fresh();
        self.emit(Instr::oper(
            format!("{} `d0,`s0,`s1", op::CMP),
            vec![a, b],
            vec![c],
        ));
        let d = self.fresh();
        self.emit(Instr::oper(format!("{zs} `d0,`s0,1"), vec![c], vec![d]));
        d
    }

    fn unop(&mut self, un: UnOp, sub: &Expr) -> Result<Temp, CompileError> {
        let s = self.expr(sub)?;
        let d = match un {
            UnOp::Not => {
                let c = self.fresh();
                self.emit(Instr::oper(
                    format!("{} `d0,`s0,0", op::CMP),
                    vec![s],
                    vec![c],
                ));
                let d = self.fresh();
                self.emit(Instr::oper(format!("{} `d0,`s0,1", op::ZSZ), vec![c], vec![d]));
                d
            }
            UnOp::Neg => {
                let z = self.constant(0);
                self.three(op::SUB, z, s)
            }
        };
        Ok(d)
    }
}
