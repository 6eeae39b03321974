//! Exception handling clauses of CIL method bodies.
//!
//! A clause describes one protected `try` range and one handler. Several clauses may share a
//! try range (a `try` with multiple `catch` blocks); the decoder groups those into a single
//! region when it turns the table into markers, and the encoder splits them back into one
//! clause per handler.

use bitflags::bitflags;

use crate::metadata::token::Token;

bitflags! {
    /// Exception handler flags defining the type of exception handling clause.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause; the class token names the caught type.
        const EXCEPTION = 0x0000;
        /// A filter clause; filter code decides whether the handler runs.
        const FILTER = 0x0001;
        /// A finally clause, run on every exit from the try block.
        const FINALLY = 0x0002;
        /// A fault clause, run only when an exception leaves the try block.
        const FAULT = 0x0004;
    }
}

/// One exception handling clause, with offsets relative to the start of the code.
///
/// # Layout in IL
///
/// ```text
/// try {
///     // try_offset -> try_offset + try_length
/// }
/// filter {
///     // filter_offset -> handler_offset (FILTER clauses only)
/// }
/// catch/finally/fault {
///     // handler_offset -> handler_offset + handler_length
/// }
/// ```
///
/// # References
/// - ECMA-335 6th Edition, Partition II, Section 25.4.6 - Exception Handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Flags describing the type of exception handler (catch, filter, finally, fault).
    pub flags: ExceptionHandlerFlags,
    /// Offset in bytes of try block from start of method body.
    pub try_offset: u32,
    /// Length in bytes of the try block.
    pub try_length: u32,
    /// Location of the handler for this try block.
    pub handler_offset: u32,
    /// Size of the handler code in bytes.
    pub handler_length: u32,
    /// Class token for `EXCEPTION` clauses, filter offset for `FILTER` clauses, zero otherwise.
    pub filter_offset: u32,
}

impl ExceptionHandler {
    /// End offset (exclusive) of the protected range.
    #[must_use]
    pub fn try_end(&self) -> u32 {
        self.try_offset + self.try_length
    }

    /// End offset (exclusive) of the handler.
    #[must_use]
    pub fn handler_end(&self) -> u32 {
        self.handler_offset + self.handler_length
    }

    /// The caught type of an `EXCEPTION` clause.
    #[must_use]
    pub fn class_token(&self) -> Option<Token> {
        if self.is_catch() {
            Some(Token(self.filter_offset))
        } else {
            None
        }
    }

    /// Start of the filter block of a `FILTER` clause.
    #[must_use]
    pub fn filter_start(&self) -> Option<u32> {
        if self.flags.contains(ExceptionHandlerFlags::FILTER) {
            Some(self.filter_offset)
        } else {
            None
        }
    }

    /// Offset where the clause's handling code begins, which is the filter block for
    /// `FILTER` clauses.
    #[must_use]
    pub fn block_start(&self) -> u32 {
        self.filter_start().unwrap_or(self.handler_offset)
    }

    /// Returns `true` for a typed `catch` clause.
    #[must_use]
    pub fn is_catch(&self) -> bool {
        !self.flags.intersects(
            ExceptionHandlerFlags::FILTER
                | ExceptionHandlerFlags::FINALLY
                | ExceptionHandlerFlags::FAULT,
        )
    }

    /// Returns `true` if every field fits the 12-byte small clause layout.
    #[must_use]
    pub fn fits_small(&self) -> bool {
        self.try_offset <= u32::from(u16::MAX)
            && self.try_length <= u32::from(u8::MAX)
            && self.handler_offset <= u32::from(u16::MAX)
            && self.handler_length <= u32::from(u8::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catch_clause_accessors() {
        let clause = ExceptionHandler {
            flags: ExceptionHandlerFlags::EXCEPTION,
            try_offset: 2,
            try_length: 10,
            handler_offset: 12,
            handler_length: 4,
            filter_offset: 0x0200_0003,
        };
        assert!(clause.is_catch());
        assert_eq!(clause.try_end(), 12);
        assert_eq!(clause.handler_end(), 16);
        assert_eq!(clause.class_token(), Some(Token(0x0200_0003)));
        assert_eq!(clause.filter_start(), None);
        assert_eq!(clause.block_start(), 12);
        assert!(clause.fits_small());
    }

    #[test]
    fn filter_clause_accessors() {
        let clause = ExceptionHandler {
            flags: ExceptionHandlerFlags::FILTER,
            try_offset: 0,
            try_length: 300,
            handler_offset: 320,
            handler_length: 6,
            filter_offset: 300,
        };
        assert!(!clause.is_catch());
        assert_eq!(clause.class_token(), None);
        assert_eq!(clause.block_start(), 300);
        assert!(!clause.fits_small());
    }
}
