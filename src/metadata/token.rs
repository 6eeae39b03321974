//! Metadata tokens.
//!
//! A token is the 32-bit handle CIL operands use to reference metadata: the high byte names
//! the table, the low 24 bits the 1-based row. Synthesized methods reuse the same layout for
//! their dynamic scope, so a token read from any instruction stream can be classified by
//! [`Token::table`] alone.

use std::fmt;

/// A metadata token representing a reference to a metadata table entry.
///
/// Tokens in .NET metadata consist of a 32-bit value where:
/// - The high byte (bits 24-31) indicates the table type
/// - The low 24 bits (bits 0-23) indicate the row index within that table
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub u32);

impl Token {
    /// `TypeDef` table
    pub const TYPE_DEF: u8 = 0x02;
    /// `Field` table
    pub const FIELD: u8 = 0x04;
    /// `MethodDef` table
    pub const METHOD_DEF: u8 = 0x06;
    /// `StandAloneSig` table
    pub const STANDALONE_SIG: u8 = 0x11;
    /// User string heap
    pub const USER_STRING: u8 = 0x70;

    /// Creates a new token from a raw 32-bit value
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Builds a token from a table byte and a 1-based row.
    #[must_use]
    pub fn from_parts(table: u8, row: u32) -> Self {
        Token((u32::from(table) << 24) | (row & 0x00FF_FFFF))
    }

    /// Returns the raw token value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Extracts the table type from the token (high byte)
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Extracts the row index from the token (low 24 bits)
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Zero-based index of the row, or `None` for row 0.
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        self.row().checked_sub(1).map(|row| row as usize)
    }

    /// Returns true if this is a null token (value 0)
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_parts() {
        let token = Token::from_parts(Token::METHOD_DEF, 3);
        assert_eq!(token.value(), 0x0600_0003);
        assert_eq!(token.table(), Token::METHOD_DEF);
        assert_eq!(token.row(), 3);
        assert_eq!(token.index(), Some(2));
    }

    #[test]
    fn test_token_row_zero() {
        let token = Token::from_parts(Token::FIELD, 0);
        assert_eq!(token.index(), None);
        assert!(!token.is_null());
        assert!(Token(0).is_null());
    }

    #[test]
    fn test_token_row_is_masked() {
        let token = Token::from_parts(Token::USER_STRING, 0x0100_0001);
        assert_eq!(token.table(), Token::USER_STRING);
        assert_eq!(token.row(), 1);
    }

    #[test]
    fn test_token_display() {
        assert_eq!(format!("{}", Token(0x0600_0001)), "0x06000001");
        let debug_str = format!("{:?}", Token(0x0200_0005));
        assert!(debug_str.contains("table: 0x02"));
        assert!(debug_str.contains("row: 5"));
    }
}
