//! Backend pipeline: instruction selection → liveness → register allocation.
//!
//! One fragment (function) at a time: the selector emits instructions over
//! temporaries, then the allocator loops liveness analysis and graph
//! colouring — rewriting spills between rounds — until every temporary has a
//! register.  The downstream emission stage substitutes register names for
//! operand placeholders and wraps the code in prologue/epilogue text; this
//! module only offers the substitution itself.

pub mod codegen;
pub mod instruction;
pub mod liveness;
pub mod regalloc;
pub mod target;

use std::collections::HashMap;

use crate::frame::Frame;
use crate::ir::Stmt;
use crate::temp::{Temp, TempPool};
use crate::CompileError;

use instruction::Instr;

/// A function's worth of register-allocated code.
#[derive(Debug)]
pub struct AllocatedCode {
    /// Final frame, including the grown spill area.
    pub frame: Frame,
    pub instrs: Vec<Instr>,
    /// Temporary → register index.  General temporaries map into `[0, K)`;
    /// the reserved frame and stack pointers map to their dedicated
    /// registers.
    pub colors: HashMap<Temp, usize>,
}

impl AllocatedCode {
    /// Render the code with registers substituted for placeholders.
    pub fn to_lines(&self) -> Vec<String> {
        self.instrs
            .iter()
            .map(|ins| match ins {
                Instr::Label(_) => ins.render(&|t| t.to_string()),
                _ => format!("\t{}", ins.render(&|t| self.reg_of(t))),
            })
            .collect()
    }

    fn reg_of(&self, t: Temp) -> String {
        match self.colors.get(&t) {
            Some(&c) => target::reg_name(c),
            None => t.to_string(),
        }
    }
}

/// Run the full pipeline over one fragment.
pub fn compile_fragment(
    frame: &mut Frame,
    body: &[Stmt],
    pool: &mut TempPool,
    k: usize,
) -> Result<AllocatedCode, CompileError> {
    let instrs = codegen::select(frame, body, pool)?;
    let allocation = regalloc::allocate(instrs, frame, pool, k)?;
    Ok(AllocatedCode {
        frame: frame.clone(),
        instrs: allocation.instrs,
        colors: allocation.colors,
    })
}
