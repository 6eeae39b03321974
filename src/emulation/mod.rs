//! Reference interpreter for CIL method bodies.
//!
//! The interpreter exists to observe patches: it executes the module's methods and
//! dispatches every call through the [`crate::patch::InstallTable`], so a committed
//! [`crate::patch::SynthesizedMethod`] replaces the original for all subsequent calls.
//!
//! # Key Components
//!
//! - [`Interpreter`] - Executes methods, shared across threads
//! - [`Value`] - Evaluation stack and slot values, including managed pointers
//! - [`NativeCall`] - What a host-implemented method sees when it is called
//! - [`EmulationLimits`] - Instruction and call depth bounds
//! - [`EmulationError`] - Runtime failures
//!
//! # Execution Model
//!
//! Methods are decoded once and cached; branch targets and exception regions are resolved
//! to instruction indices. Exceptions thrown with `throw` unwind through catch, filter,
//! finally and fault clauses. Runtime faults such as division by zero or a null
//! dereference are reported as [`EmulationError`]s instead of managed exceptions.

mod config;
mod error;
mod interpreter;
mod ops;
mod program;
mod value;

pub use config::EmulationLimits;
pub use error::EmulationError;
pub use interpreter::{Interpreter, NativeCall};
pub use value::{HeapObject, ObjectRef, Value, ValueRef};
