//! Emulation error types.

use std::fmt;

use crate::metadata::token::Token;

/// Errors that stop the reference interpreter.
///
/// Managed exceptions thrown and caught inside the emulated code are not errors; an
/// exception that leaves the outermost frame is reported as
/// [`EmulationError::UnhandledException`].
#[derive(Debug, Clone, PartialEq)]
pub enum EmulationError {
    /// Evaluation stack underflow (pop from empty stack).
    StackUnderflow,
    /// Operand types do not fit the operation.
    TypeMismatch {
        /// Operation being performed.
        operation: &'static str,
        /// Kind of the value found.
        found: &'static str,
    },
    /// Local variable index out of bounds.
    LocalIndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// Number of locals available.
        count: usize,
    },
    /// Argument index out of bounds.
    ArgumentIndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// Number of arguments available.
        count: usize,
    },
    /// A method was invoked with the wrong number of arguments.
    ArgumentCount {
        /// The invoked method.
        method: Token,
        /// Arguments its signature declares, `this` included.
        expected: usize,
        /// Arguments supplied.
        found: usize,
    },
    /// A managed pointer outlived the frame it points into.
    DanglingReference,
    /// Null reference access.
    NullReference,
    /// Division by zero.
    DivisionByZero,
    /// Arithmetic overflow in a checked operation.
    ArithmeticOverflow,
    /// `castclass` to a type the object is not.
    InvalidCast {
        /// Type of the object.
        from: Token,
        /// Requested type.
        to: Token,
    },
    /// A branch names a label no instruction declares.
    InvalidBranchTarget {
        /// The missing label id.
        label: u32,
    },
    /// Execution ran past the last instruction.
    InvalidInstructionPointer {
        /// The instruction index.
        index: usize,
    },
    /// Field not found.
    FieldNotFound {
        /// Token of the field.
        token: Token,
    },
    /// Call depth limit exceeded.
    CallDepthExceeded {
        /// Current call depth.
        depth: usize,
        /// Maximum allowed depth.
        limit: usize,
    },
    /// Instruction count limit exceeded.
    InstructionLimitExceeded {
        /// Number of instructions executed.
        executed: u64,
        /// Maximum allowed.
        limit: u64,
    },
    /// Unsupported opcode.
    UnsupportedOpcode {
        /// Instruction mnemonic.
        mnemonic: &'static str,
    },
    /// A handler block ended with the wrong instruction.
    InvalidExceptionHandler {
        /// Description of the problem.
        description: String,
    },
    /// A managed exception left the outermost frame.
    UnhandledException {
        /// Type of the exception object.
        class: Token,
    },
}

impl fmt::Display for EmulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmulationError::StackUnderflow => write!(f, "evaluation stack underflow"),
            EmulationError::TypeMismatch { operation, found } => {
                write!(f, "type mismatch in {operation}: found {found}")
            }
            EmulationError::LocalIndexOutOfBounds { index, count } => {
                write!(f, "local variable index {index} out of bounds (count: {count})")
            }
            EmulationError::ArgumentIndexOutOfBounds { index, count } => {
                write!(f, "argument index {index} out of bounds (count: {count})")
            }
            EmulationError::ArgumentCount {
                method,
                expected,
                found,
            } => write!(f, "{method} takes {expected} argument(s), {found} given"),
            EmulationError::DanglingReference => {
                write!(f, "managed pointer into a frame that has returned")
            }
            EmulationError::NullReference => write!(f, "null reference"),
            EmulationError::DivisionByZero => write!(f, "division by zero"),
            EmulationError::ArithmeticOverflow => write!(f, "arithmetic overflow"),
            EmulationError::InvalidCast { from, to } => {
                write!(f, "invalid cast from {from} to {to}")
            }
            EmulationError::InvalidBranchTarget { label } => {
                write!(f, "branch to undeclared label L{label}")
            }
            EmulationError::InvalidInstructionPointer { index } => {
                write!(f, "invalid instruction pointer: {index}")
            }
            EmulationError::FieldNotFound { token } => write!(f, "field not found: {token}"),
            EmulationError::CallDepthExceeded { depth, limit } => {
                write!(f, "call depth {depth} exceeds limit {limit}")
            }
            EmulationError::InstructionLimitExceeded { executed, limit } => {
                write!(f, "executed {executed} instructions (limit: {limit})")
            }
            EmulationError::UnsupportedOpcode { mnemonic } => {
                write!(f, "unsupported opcode: {mnemonic}")
            }
            EmulationError::InvalidExceptionHandler { description } => {
                write!(f, "invalid exception handler: {description}")
            }
            EmulationError::UnhandledException { class } => {
                write!(f, "unhandled exception of type {class}")
            }
        }
    }
}

impl std::error::Error for EmulationError {}
