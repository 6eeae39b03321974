//! # dotpatch Prelude
//!
//! This module provides a convenient prelude for the most commonly used types of the
//! dotpatch library. Import it to get the module builder, the instruction model, the patch
//! coordinator and the interpreter in one line.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotpatch operations
pub use crate::Error;

/// The result type used throughout dotpatch
pub use crate::Result;

// ================================================================================================
// Metadata
// ================================================================================================

/// Metadata token type for referencing table entries
pub use crate::metadata::token::Token;

/// In-memory module image and its builder
pub use crate::metadata::module::{Module, ModuleBuilder};

/// Structured signatures
pub use crate::metadata::signatures::{MethodSig, ParamSig, StandAloneSig, TypeSig};

/// Method identities
pub use crate::metadata::method::MethodHandle;

/// Token resolution for original and synthesized bodies
pub use crate::metadata::resolver::{DynamicScope, TokenResolver};

// ================================================================================================
// Instructions
// ================================================================================================

/// Editable instruction model
pub use crate::assembly::{ExceptionMarker, Instruction, Label, OpCode, Operand};

/// Conversion between binary bodies and instruction sequences
pub use crate::assembly::{decode_body, decode_method, encode};

// ================================================================================================
// Patching
// ================================================================================================

/// Patch plans, builds and installation
pub use crate::patch::{
    BuildResult, InstallTable, PatchConfig, PatchCoordinator, PatchPlan, PatchState,
    TranspileContext,
};

// ================================================================================================
// Emulation
// ================================================================================================

/// Reference interpreter
pub use crate::emulation::{EmulationLimits, Interpreter, NativeCall, Value};
