//! Method bodies, exception clauses and method handles.
//!
//! # Key Components
//!
//! - [`crate::metadata::method::MethodBody`] - Tiny/fat method body with its exception table
//! - [`crate::metadata::method::ExceptionHandler`] - One exception handling clause
//! - [`crate::metadata::method::MethodHandle`] - Identity of a method being patched

mod body;
mod exceptions;
mod handle;
mod types;

pub use body::MethodBody;
pub use exceptions::{ExceptionHandler, ExceptionHandlerFlags};
pub use handle::MethodHandle;
pub use types::*;
