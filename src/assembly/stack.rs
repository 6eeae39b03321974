//! Evaluation stack depth analysis.
//!
//! Computes the `max_stack` value written into a method header by propagating stack depths
//! along every control flow edge of an instruction sequence. Each instruction must be
//! reached with one consistent depth; a mismatch at a join, a pop from an empty stack or
//! control falling off the end of the method fails with [`Error::StackImbalance`].
//!
//! Handler entry depths follow ECMA-335: catch and filter blocks start with the exception
//! object on the stack, finally and fault blocks start empty, and `leave` empties the stack
//! before transferring control.

use std::collections::HashMap;

use crate::{
    assembly::{
        instruction::{ExceptionMarker, Instruction, Label, Operand},
        opcodes::{FlowType, OpCode},
    },
    metadata::{
        module::Module,
        signatures::{MethodSig, StandAloneSig},
    },
    Error, Result,
};

fn imbalance(index: usize, message: impl Into<String>) -> Error {
    Error::StackImbalance {
        index,
        message: message.into(),
    }
}

/// Stack effect of one instruction as `(pops, pushes)`.
#[allow(clippy::cast_possible_truncation)]
fn effect(
    instruction: &Instruction,
    sig: &MethodSig,
    module: &Module,
    method: &str,
) -> Result<(u32, u32)> {
    let behavior = instruction.opcode.stack();
    if !behavior.is_variable() {
        return Ok((u32::from(behavior.pops), u32::from(behavior.pushes)));
    }

    let callee = |token| {
        module
            .method(token)
            .map(|def| &def.sig)
            .ok_or_else(|| Error::TokenResolution {
                token,
                method: method.to_string(),
            })
    };

    match (instruction.opcode, &instruction.operand) {
        (OpCode::Call | OpCode::Callvirt, Operand::Method(token)) => {
            let callee = callee(*token)?;
            Ok((callee.arg_count() as u32, u32::from(callee.returns_value())))
        }
        (OpCode::Newobj, Operand::Method(token)) => {
            let callee = callee(*token)?;
            Ok((callee.params.len() as u32, 1))
        }
        (OpCode::Calli, Operand::Signature(standalone)) => match standalone.as_ref() {
            StandAloneSig::Method(callee) => Ok((
                callee.arg_count() as u32 + 1,
                u32::from(callee.returns_value()),
            )),
            StandAloneSig::Locals(_) => Err(malformed_error!(
                "calli in {} references a local variable signature",
                method
            )),
        },
        (OpCode::Ret, _) => Ok((u32::from(sig.returns_value()), 0)),
        (OpCode::Jmp, _) => Ok((0, 0)),
        (opcode, _) => Err(malformed_error!(
            "No stack effect known for '{}' in {}",
            opcode.mnemonic(),
            method
        )),
    }
}

/// Compute the maximum evaluation stack depth of `instructions`.
///
/// `labels` maps every declared label to its instruction index, as produced by
/// [`crate::assembly::validation::label_map`]. Call effects come from the callee
/// signatures in `module`.
///
/// # Errors
/// Returns [`Error::StackImbalance`] for inconsistent depths and
/// [`Error::TokenResolution`] for calls to methods `module` does not define.
pub fn max_stack(
    instructions: &[Instruction],
    labels: &HashMap<Label, usize>,
    sig: &MethodSig,
    module: &Module,
    method: &str,
) -> Result<u16> {
    if instructions.is_empty() {
        return Ok(0);
    }

    let mut depths: Vec<Option<u32>> = vec![None; instructions.len()];
    let mut worklist: Vec<(usize, u32)> = vec![(0, 0)];

    for (index, instruction) in instructions.iter().enumerate() {
        for marker in &instruction.blocks {
            match marker {
                ExceptionMarker::CatchBegin(_)
                | ExceptionMarker::FilterBegin
                | ExceptionMarker::FilterHandlerBegin => worklist.push((index, 1)),
                ExceptionMarker::FinallyBegin | ExceptionMarker::FaultBegin => {
                    worklist.push((index, 0));
                }
                ExceptionMarker::TryBegin | ExceptionMarker::End => {}
            }
        }
    }

    let target = |label: &Label, from: usize| {
        labels
            .get(label)
            .copied()
            .ok_or_else(|| imbalance(from, format!("branch to undeclared {label}")))
    };

    let mut max = 0_u32;
    while let Some((index, depth)) = worklist.pop() {
        let Some(instruction) = instructions.get(index) else {
            return Err(imbalance(index, "control falls off the end of the method"));
        };

        match depths[index] {
            Some(known) if known == depth => continue,
            Some(known) => {
                return Err(imbalance(
                    index,
                    format!(
                        "'{}' reached with depth {} and {}",
                        instruction.opcode, known, depth
                    ),
                ))
            }
            None => depths[index] = Some(depth),
        }

        let (pops, pushes) = effect(instruction, sig, module, method)?;
        if depth < pops {
            return Err(imbalance(
                index,
                format!(
                    "'{}' pops {} values from a stack of depth {}",
                    instruction.opcode, pops, depth
                ),
            ));
        }
        let after = depth - pops + pushes;
        max = max.max(after).max(depth);

        match instruction.opcode.flow() {
            FlowType::Sequential | FlowType::Call => worklist.push((index + 1, after)),
            FlowType::ConditionalBranch => {
                worklist.push((index + 1, after));
                for label in instruction.branch_targets() {
                    worklist.push((target(&label, index)?, after));
                }
            }
            FlowType::Switch => {
                worklist.push((index + 1, after));
                for label in instruction.branch_targets() {
                    worklist.push((target(&label, index)?, after));
                }
            }
            FlowType::UnconditionalBranch => {
                for label in instruction.branch_targets() {
                    worklist.push((target(&label, index)?, after));
                }
            }
            FlowType::Leave => {
                for label in instruction.branch_targets() {
                    worklist.push((target(&label, index)?, 0));
                }
            }
            FlowType::Return | FlowType::Throw | FlowType::EndFinally | FlowType::EndFilter => {}
        }
    }

    u16::try_from(max).map_err(|_| imbalance(0, format!("stack depth {max} exceeds u16")))
}
