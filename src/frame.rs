//! Stack-frame descriptors handed down by the memory-layout phase.
//!
//! The backend treats a frame as read-only except for the spill-area
//! counter, which the register allocator grows as it retires temporaries to
//! memory.

use crate::temp::{Label, Temp, TempPool};

/// Bytes per machine word.
pub const WORD_SIZE: i64 = 8;

/// Per-function frame descriptor.
///
/// `frame_pointer` and `stack_pointer` are machine-reserved temporaries:
/// they are never candidates for general colouring and render as the
/// dedicated registers.  `return_value` is the temporary the function's
/// result is moved into; liveness keeps it alive to the epilogue.
#[derive(Debug, Clone)]
pub struct Frame {
    pub label: Label,
    pub frame_pointer: Temp,
    pub stack_pointer: Temp,
    pub return_value: Temp,
    /// Size of the locals area, fixed by the memory-layout phase.
    pub locals_size: i64,
    /// Size of the outgoing-arguments area, fixed by the memory-layout phase.
    pub args_size: i64,
    /// Size of the spill area.  Starts at zero; grown only by the register
    /// allocator.
    pub temps_size: i64,
}

impl Frame {
    pub fn new(label: Label, pool: &mut TempPool, locals_size: i64, args_size: i64) -> Self {
        Self {
            label,
            frame_pointer: pool.fresh(),
            stack_pointer: pool.fresh(),
            return_value: pool.fresh(),
            locals_size,
            args_size,
            temps_size: 0,
        }
    }

    /// Reserve the next spill slot and return its SP-relative offset.
    ///
    /// Slots sit above the outgoing-arguments area, one word each.
    pub fn alloc_spill_slot(&mut self) -> i64 {
        let offset = self.args_size + self.temps_size;
        self.temps_size += WORD_SIZE;
        offset
    }
}
