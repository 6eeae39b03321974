//! Bounds-checked access to binary data.
//!
//! - [`crate::file::io`] - Little-endian primitive reads and writes
//! - [`crate::file::parser::Parser`] - Cursor over a byte slice

pub mod io;
pub mod parser;
