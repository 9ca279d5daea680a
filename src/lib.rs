pub mod backend;
pub mod frame;
pub mod ir;
pub mod temp;

use thiserror::Error;

/// Fatal backend failures.
///
/// Every variant is programmer-error-class: it indicates a contract
/// violation by an upstream phase or corrupted allocator state, never a user
/// error.  Compilation of the offending function stops immediately; there is
/// no partial output.
#[derive(Error, Debug)]
pub enum CompileError {
    /// A call appeared nested inside an expression instead of hoisted into
    /// a move by linearization.
    #[error("call in expression position (not hoisted by linearization): {expr}")]
    NestedCall { expr: String },

    /// A move destination that is neither a temporary nor a memory
    /// location.
    #[error("unsupported move destination: {expr}")]
    BadMoveTarget { expr: String },

    /// The allocator referenced a temporary with no interference-graph
    /// entry.
    #[error("temporary {temp} has no interference-graph entry")]
    MissingNode { temp: String },
}

/// Compile every fragment of a program, in order.
pub fn compile_fragments(
    fragments: Vec<ir::Fragment>,
    pool: &mut temp::TempPool,
) -> Result<Vec<backend::AllocatedCode>, CompileError> {
    fragments
        .into_iter()
        .map(|fragment| {
            let mut frame = fragment.frame;
            backend::compile_fragment(&mut frame, &fragment.body, pool, backend::target::NUM_REGS)
        })
        .collect()
}
