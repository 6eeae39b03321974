//! Method patching: plans, the transform pipeline and the coordinator.
//!
//! A patch is described by a [`PatchPlan`]: prefixes and suffixes (hook methods called
//! around the original body), transpilers (functions rewriting the original instruction
//! sequence) and post-transpilers (functions rewriting the composed wrapper). The
//! [`PatchCoordinator`] keeps one plan per method and turns it into a
//! [`SynthesizedMethod`] on commit, installing it in the [`InstallTable`] every call site
//! dispatches through.
//!
//! # Key Components
//!
//! - [`PatchCoordinator`] - Owns the plans, runs builds, installs results
//! - [`PatchPlan`] - Registrations for one method
//! - [`TranspileContext`] - Label and local allocation shared by one build's steps
//! - [`compose()`] - Prefix/suffix wrapper synthesis
//! - [`InstallTable`] - Replacement table read by the interpreter
//!
//! # Usage Examples
//!
//! ```rust
//! use dotpatch::prelude::*;
//!
//! let mut builder = ModuleBuilder::new("Game");
//! let ty = builder.add_type("Game", "Calc");
//! let hooks = builder.add_type("Mod", "Hooks");
//! let add = builder.add_il(
//!     ty,
//!     "Add",
//!     MethodSig::new_static(
//!         TypeSig::I4,
//!         vec![ParamSig::new("a", TypeSig::I4), ParamSig::new("b", TypeSig::I4)],
//!     ),
//!     Vec::new(),
//!     vec![
//!         Instruction::ldarg(0),
//!         Instruction::ldarg(1),
//!         Instruction::simple(OpCode::Add),
//!         Instruction::ret(),
//!     ],
//! );
//! // Doubles `a` before the original body sees it
//! let prefix = builder.add_il(
//!     hooks,
//!     "DoubleA",
//!     MethodSig::new_static(TypeSig::Void, vec![ParamSig::new("a", TypeSig::by_ref(TypeSig::I4))]),
//!     Vec::new(),
//!     vec![
//!         Instruction::ldarg(0),
//!         Instruction::ldarg(0),
//!         Instruction::simple(OpCode::LdindI4),
//!         Instruction::ldc_i4(2),
//!         Instruction::simple(OpCode::Mul),
//!         Instruction::simple(OpCode::StindI4),
//!         Instruction::ret(),
//!     ],
//! );
//!
//! let coordinator = PatchCoordinator::new(builder.build()?);
//! coordinator.add_prefix(add, prefix)?;
//! assert!(coordinator.commit(add)?.is_patched());
//!
//! let sum = coordinator.interpreter().invoke(add, vec![Value::I4(5), Value::I4(1)])?;
//! assert_eq!(sum, Value::I4(11));
//! # Ok::<(), dotpatch::Error>(())
//! ```

pub mod compose;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod install;
pub mod plan;
pub mod transpiler;

pub use compose::{compose, INSTANCE_PARAM, PREFIX_SKIP_PARAM, RESULT_PARAM};
pub use config::PatchConfig;
pub use context::TranspileContext;
pub use coordinator::{BuildResult, PatchCoordinator, PatchState, COMPOSITION_STAGE};
pub use install::{InstallTable, SynthesizedMethod};
pub use plan::{HookRegistration, PatchPlan};
pub use transpiler::{TranspilerFn, TranspilerRegistration, DEFAULT_PRIORITY};
