use thiserror::Error;

use crate::{assembly::OperandKind, emulation::EmulationError, metadata::token::Token};

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! decode_error {
    ($offset:expr, $raw_byte:expr, $msg:expr) => {
        crate::Error::Decode {
            offset: $offset,
            raw_byte: $raw_byte,
            message: $msg.to_string(),
        }
    };

    ($offset:expr, $raw_byte:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::Decode {
            offset: $offset,
            raw_byte: $raw_byte,
            message: format!($fmt, $($arg)*),
        }
    };
}

/// The structural invariant a transformed instruction sequence broke.
///
/// Reported through [`Error::InvariantViolation`] together with the name of the
/// transpiler whose output was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantKind {
    /// A branch references a label that no instruction declares.
    DanglingLabel,
    /// More than one instruction declares the same label.
    DuplicateLabel,
    /// Exception markers do not form properly nested begin/end pairs.
    UnbalancedRegion,
    /// A label uses the last value of the label space, which is reserved for allocation.
    LabelOverflow,
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every failure that can occur while decoding, transforming, re-encoding or executing a
/// method body is represented here. Errors raised inside a patch build never escape the
/// [`crate::patch::PatchCoordinator`]: they are logged and turned into
/// [`crate::patch::BuildResult::Failed`], leaving the previously installed method in place.
///
/// # Error Categories
///
/// ## Build Errors
/// - [`Error::Decode`] - Unknown opcode, truncated operand or misaligned boundary
/// - [`Error::TokenResolution`] - A metadata token could not be resolved
/// - [`Error::InvariantViolation`] - A transpiler produced a broken sequence
/// - [`Error::EncodeOverflow`] - A branch distance does not fit the long form
/// - [`Error::StackImbalance`] - Inconsistent evaluation stack at a join point
/// - [`Error::PatchSignature`] - A prefix or suffix cannot be bound to the target
///
/// ## Structural Errors
/// - [`Error::Malformed`] - Corrupted method body or metadata
/// - [`Error::OutOfBounds`] - Attempted to read beyond the input
///
/// # Examples
///
/// ```rust,no_run
/// use dotpatch::{Error, patch::BuildResult};
///
/// fn report(result: &BuildResult) {
///     if let BuildResult::Failed { reason, offset } = result {
///         match reason {
///             Error::Decode { raw_byte, .. } => eprintln!("bad byte 0x{raw_byte:02X} at {offset:?}"),
///             other => eprintln!("build failed: {other}"),
///         }
///     }
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The input is damaged and could not be parsed.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// The instruction stream of a method could not be decoded.
    ///
    /// Raised for unknown opcodes, truncated operands, and branch targets or protected
    /// region boundaries that do not land on an instruction boundary. The decoder never
    /// skips bytes to resynchronize.
    #[error("Decode error at IL_{offset:04X} (byte 0x{raw_byte:02X}): {message}")]
    Decode {
        /// Offset within the code where decoding failed
        offset: u32,
        /// The raw byte found at that offset
        raw_byte: u8,
        /// What went wrong
        message: String,
    },

    /// A metadata token embedded in an operand could not be resolved.
    #[error("Unresolvable token {token} in method '{method}'")]
    TokenResolution {
        /// The raw token as found in the instruction stream
        token: Token,
        /// Identity of the method being decoded or encoded
        method: String,
    },

    /// A transpiler produced a sequence that breaks label or region invariants.
    #[error("Transpiler '{transpiler}' broke an invariant ({kind:?}): {detail}")]
    InvariantViolation {
        /// Which invariant was broken
        kind: InvariantKind,
        /// Name of the transpiler whose output was rejected
        transpiler: String,
        /// Human readable detail
        detail: String,
    },

    /// A branch distance cannot be represented even in the long form.
    #[error("Branch at IL_{offset:04X} cannot be encoded")]
    EncodeOverflow {
        /// Final offset of the offending branch instruction
        offset: u32,
    },

    /// An operand does not match the kind its opcode expects.
    #[error("Operand of '{mnemonic}' must be {expected:?}")]
    InvalidOperand {
        /// Mnemonic of the offending instruction
        mnemonic: &'static str,
        /// The operand kind the opcode declares
        expected: OperandKind,
    },

    /// The evaluation stack does not balance.
    #[error("Stack imbalance at instruction {index}: {message}")]
    StackImbalance {
        /// Index of the instruction in the final sequence
        index: usize,
        /// What went wrong
        message: String,
    },

    /// A prefix or suffix signature does not fit the patched method.
    #[error("Invalid patch signature: {0}")]
    PatchSignature(String),

    /// A transpiler returned an error of its own.
    #[error("Transpiler '{name}' failed: {source}")]
    Transpiler {
        /// Name of the failing transpiler
        name: String,
        /// The error it returned
        #[source]
        source: Box<Error>,
    },

    /// The requested method does not exist in the module.
    #[error("Method not found - {0}")]
    MethodNotFound(Token),

    /// The requested method has no IL body (it is implemented natively).
    #[error("Method {0} has no IL body")]
    NotIl(Token),

    /// A transpiler panicked; the payload message is kept.
    #[error("Panicked: {0}")]
    Panicked(String),

    /// Error raised while executing a method in the reference interpreter.
    #[error("{0}")]
    Emulation(#[from] EmulationError),
}

impl Error {
    /// Returns the IL offset this error is attached to, if it has one.
    #[must_use]
    pub fn offset(&self) -> Option<u32> {
        match self {
            Error::Decode { offset, .. } | Error::EncodeOverflow { offset } => Some(*offset),
            Error::Transpiler { source, .. } => source.offset(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_carries_offset_and_byte() {
        let err = decode_error!(0x12, 0xFF, "unknown opcode");
        assert_eq!(err.offset(), Some(0x12));
        assert_eq!(
            err.to_string(),
            "Decode error at IL_0012 (byte 0xFF): unknown opcode"
        );
    }

    #[test]
    fn transpiler_error_forwards_offset() {
        let err = Error::Transpiler {
            name: "strip".to_string(),
            source: Box::new(Error::EncodeOverflow { offset: 7 }),
        };
        assert_eq!(err.offset(), Some(7));
        assert!(err.to_string().contains("strip"));
    }

    #[test]
    fn malformed_records_location() {
        let err = malformed_error!("bad header {}", 3);
        match err {
            Error::Malformed { message, file, .. } => {
                assert_eq!(message, "bad header 3");
                assert!(file.ends_with("error.rs"));
            }
            _ => panic!("expected Malformed"),
        }
    }
}
