//! Call frames
//!
//! One [`CallFrame`] per active guest function. Frames live on the
//! executor's frame stack rather than the Rust call stack so guest
//! recursion depth is bounded only by the context's stack budget.

use super::{control::Label, Value};

#[derive(Debug)]
pub struct CallFrame {
    /// Function index in the module's combined index space
    pub func_idx: u32,
    /// Index of the next instruction in the function body
    pub ip: usize,
    /// Parameters followed by declared locals
    pub locals: Vec<Value>,
    pub labels: Vec<Label>,
    /// Operand stack height at entry, below the arguments
    pub stack_height: usize,
    /// Number of results the function returns
    pub arity: usize,
    /// Bytes charged against the stack budget for this activation
    pub frame_bytes: usize,
}
