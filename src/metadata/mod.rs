//! Metadata consumed by the patching engine.
//!
//! The engine works against an in-memory [`crate::metadata::module::Module`]: its tables
//! supply the methods, fields, types, strings and signatures that instruction operands
//! reference, and its method bodies are the input of every patch build.

/// Implementation of the method body format and method handles
pub mod method;
/// In-memory module image and its builder
pub mod module;
/// Token resolution for original and synthesized methods
pub mod resolver;
/// Implementation of method and type signatures
pub mod signatures;
/// Commonly used metadata token type
pub mod token;
