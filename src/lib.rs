// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![allow(clippy::too_many_arguments)]

//! # dotpatch
//!
//! [![License](https://img.shields.io/badge/license-Apache--2.0-blue.svg)](https://github.com/BinFlip/dotpatch/blob/main/LICENSE-APACHE)
//!
//! A method patching engine for .NET CIL, written in pure Rust. `dotpatch` decodes a method
//! body into an editable instruction sequence, lets independent patches rewrite it, wraps
//! it with prefix and suffix hooks, and re-encodes the result into a fresh body that is
//! installed in place of the original.
//!
//! ## Features
//!
//! - **Lossless decoding** - Branch targets become labels, exception clauses become region markers
//! - **Composable transpilers** - Priority-ordered rewrites, each validated before the next runs
//! - **Prefix/suffix hooks** - Argument binding by name, result override, skip-original
//! - **Branch widening** - Short branches are promoted until every distance fits
//! - **Fail-safe commits** - A failing build leaves the previously installed method untouched
//! - **Reference interpreter** - Observes patches by executing through the install table
//!
//! ## Quick Start
//!
//! ```rust
//! use dotpatch::prelude::*;
//!
//! let mut builder = ModuleBuilder::new("Game");
//! let ty = builder.add_type("Game", "Player");
//! let health = builder.add_il(
//!     ty,
//!     "MaxHealth",
//!     MethodSig::new_static(TypeSig::I4, Vec::new()),
//!     Vec::new(),
//!     vec![Instruction::ldc_i4(100), Instruction::ret()],
//! );
//!
//! let coordinator = PatchCoordinator::new(builder.build()?);
//! coordinator.add_transpiler(health, "double-health", |mut instructions, _context| {
//!     let ret = instructions.len() - 1;
//!     instructions.insert(ret, Instruction::ldc_i4(2));
//!     instructions.insert(ret + 1, Instruction::simple(OpCode::Mul));
//!     Ok(instructions)
//! })?;
//!
//! assert!(coordinator.commit(health)?.is_patched());
//! assert_eq!(coordinator.interpreter().invoke(health, Vec::new())?, Value::I4(200));
//! # Ok::<(), dotpatch::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`metadata`] - The in-memory module, signatures, method bodies and token resolution
//! - [`assembly`] - Instruction model, decoder, validation, stack analysis and encoder
//! - [`patch`] - Patch plans, wrapper composition, the coordinator and the install table
//! - [`emulation`] - Reference interpreter dispatching through the install table
//! - [`prelude`] - Re-exports of the commonly used types
//!
//! ## Standards Compliance
//!
//! Method bodies, opcodes and exception clauses follow the **ECMA-335 specification**
//! (6th edition), partition II.25.4 and partition III.
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T, Error>`](Result). Builds run by the
//! [`patch::PatchCoordinator`] never return their errors directly; they are recorded as
//! [`patch::BuildResult::Failed`] and remain available through
//! [`patch::PatchCoordinator::last_error`].
#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Bounds-checked byte parsing used by the method body reader and the decoder
pub mod file;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust
/// use dotpatch::prelude::*;
///
/// let mut builder = ModuleBuilder::new("Demo");
/// let ty = builder.add_type("", "Demo");
/// builder.add_il(ty, "Run", MethodSig::new_static(TypeSig::Void, Vec::new()), Vec::new(), vec![Instruction::ret()]);
/// let module = builder.build()?;
/// assert_eq!(module.methods().count(), 1);
/// # Ok::<(), dotpatch::Error>(())
/// ```
pub mod prelude;

/// Editable CIL instructions and their conversion from and to binary method bodies
pub mod assembly;

/// In-memory module metadata: methods, fields, signatures and token resolution
pub mod metadata;

/// Patch plans, the transform pipeline and the patch coordinator
pub mod patch;

/// Reference interpreter for observing installed patches
pub mod emulation;

/// `dotpatch` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dotpatch` Error type
///
/// The main error type for all operations in this crate.
pub use error::{Error, InvariantKind};

/// Cursor over a byte slice, used to read method bodies and instruction streams.
pub use file::parser::Parser;
