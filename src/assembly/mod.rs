//! CIL instruction processing: decoding, validation and re-encoding.
//!
//! This module owns the editable representation of a method body and both directions of
//! conversion between it and the binary ECMA-335 form.
//!
//! # Key Components
//!
//! - [`crate::assembly::opcodes`] - The opcode table with operand kinds, flow types and stack effects
//! - [`crate::assembly::instruction`] - Label- and marker-based instruction model
//! - [`crate::assembly::decoder`] - Binary body to instruction sequence
//! - [`crate::assembly::validation`] - Label and region invariants checked after every step
//! - [`crate::assembly::stack`] - Evaluation stack depth analysis
//! - [`crate::assembly::encoder`] - Instruction sequence to binary body, with branch widening
//!
//! # Usage Examples
//!
//! ```rust
//! use dotpatch::prelude::*;
//! use dotpatch::assembly::{decode_body, encode};
//!
//! let mut builder = ModuleBuilder::new("Demo");
//! let ty = builder.add_type("", "Demo");
//! let sig = MethodSig::new_static(TypeSig::Void, Vec::new());
//! let method = builder.add_il(ty, "Run", sig.clone(), Vec::new(), vec![Instruction::ret()]);
//! let module = builder.build()?;
//!
//! let body = module.method(method).unwrap().body().unwrap();
//! let resolver = TokenResolver::Static(&module);
//! let decoded = decode_body(body, &resolver, "Demo::Run")?;
//! let encoded = encode(&decoded.instructions, &sig, &resolver, "Demo::Run")?;
//! assert_eq!(encoded.code, body.code);
//! # Ok::<(), dotpatch::Error>(())
//! ```

pub mod decoder;
pub mod encoder;
pub mod instruction;
pub mod opcodes;
pub mod stack;
pub mod validation;

pub use decoder::{decode_body, decode_method, DecodedMethod};
pub use encoder::{encode, EncodedMethod};
pub use instruction::{listing, ExceptionMarker, Instruction, Label, LabelAllocator, Operand};
pub use opcodes::{FlowType, OpCode, OperandKind, StackBehavior};
pub use validation::validate;
