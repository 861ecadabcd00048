use thiserror::Error;

/// Runtime fault raised while executing guest code
///
/// A trap aborts the in-flight call only. Its `Display` text is what gets
/// recorded as the instance's exception.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Trap {
    #[error("unreachable")]
    Unreachable,
    #[error("out of bounds memory access")]
    OutOfBounds,
    #[error("integer divide by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    IntegerOverflow,
    #[error("invalid conversion to integer")]
    InvalidConversion,
    #[error("call stack exhausted")]
    StackOverflow,
    #[error("undefined element")]
    UndefinedElement,
    #[error("uninitialized element {0}")]
    UninitializedElement(u32),
    #[error("indirect call type mismatch: expected {expected}, got {actual}")]
    IndirectCallTypeMismatch { expected: String, actual: String },
    #[error("instruction budget exhausted")]
    InstructionBudgetExhausted,
    #[error("operand stack underflow")]
    StackUnderflow,
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },
    #[error("{0}")]
    Host(String),
    /// Raised by the WASI `proc_exit` import to end the guest program
    #[error("process exited with code {0}")]
    Exit(i32),
}

impl Trap {
    pub fn type_mismatch(expected: impl ToString, actual: impl ToString) -> Trap {
        Trap::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}
