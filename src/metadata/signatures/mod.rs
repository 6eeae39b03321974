//! Structured signatures for types, methods and stand-alone signature rows.
//!
//! # Key Components
//!
//! - [`crate::metadata::signatures::TypeSig`] - Type of a value, local, field or parameter
//! - [`crate::metadata::signatures::MethodSig`] - Calling convention, return type and named parameters
//! - [`crate::metadata::signatures::StandAloneSig`] - Local variable lists and `calli` call sites

mod types;

pub use types::*;
