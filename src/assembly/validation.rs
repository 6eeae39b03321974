//! Structural checks run after every transformation step.
//!
//! A sequence is well formed when:
//!
//! - every label referenced by a branch or switch is declared by exactly one instruction,
//!   and no label is declared twice;
//! - exception markers nest: every region has at least one handler, handlers only start
//!   inside an open region, filter blocks are followed by their handler block, and every
//!   `TryBegin` is closed by an `End`;
//! - every operand matches its opcode.
//!
//! Failures carry the name of the step that produced the sequence so the coordinator can
//! report which transpiler broke it.

use std::collections::HashMap;

use crate::{
    assembly::instruction::{ExceptionMarker, Instruction, Label},
    Error, InvariantKind, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Try,
    Filter,
    Handler,
}

struct OpenRegion {
    phase: Phase,
    handlers: usize,
}

fn violation(kind: InvariantKind, stage: &str, detail: String) -> Error {
    Error::InvariantViolation {
        kind,
        transpiler: stage.to_string(),
        detail,
    }
}

/// Map every declared label to the index of its declaring instruction.
///
/// # Errors
/// Returns [`InvariantKind::DuplicateLabel`] if a label is declared more than once, and
/// [`InvariantKind::LabelOverflow`] if a label is `u32::MAX`.
pub fn label_map(instructions: &[Instruction], stage: &str) -> Result<HashMap<Label, usize>> {
    let mut declared = HashMap::new();
    for (index, instruction) in instructions.iter().enumerate() {
        for label in &instruction.labels {
            if label.0 == u32::MAX {
                return Err(violation(
                    InvariantKind::LabelOverflow,
                    stage,
                    format!("instruction {index} declares {label}, no label can follow it"),
                ));
            }
            if let Some(first) = declared.insert(*label, index) {
                return Err(violation(
                    InvariantKind::DuplicateLabel,
                    stage,
                    format!("{label} declared at instructions {first} and {index}"),
                ));
            }
        }
    }
    Ok(declared)
}

/// Check labels, markers and operands of `instructions`.
///
/// # Errors
/// Returns [`Error::InvariantViolation`] naming `stage` for label and region problems, and
/// [`Error::InvalidOperand`] for operands that do not match their opcode.
pub fn validate(instructions: &[Instruction], stage: &str) -> Result<()> {
    let declared = label_map(instructions, stage)?;

    for (index, instruction) in instructions.iter().enumerate() {
        if !instruction.operand.fits(instruction.opcode) {
            return Err(Error::InvalidOperand {
                mnemonic: instruction.opcode.mnemonic(),
                expected: instruction.opcode.operand_kind(),
            });
        }

        for target in instruction.branch_targets() {
            if !declared.contains_key(&target) {
                return Err(violation(
                    InvariantKind::DanglingLabel,
                    stage,
                    format!("instruction {index} ({}) targets undeclared {target}", instruction.opcode),
                ));
            }
        }
    }

    check_regions(instructions, stage)
}

/// Number of regions (balanced `TryBegin`/`End` pairs) in a sequence that passed
/// [`validate`].
#[must_use]
pub fn region_count(instructions: &[Instruction]) -> usize {
    instructions
        .iter()
        .flat_map(|instruction| &instruction.blocks)
        .filter(|marker| **marker == ExceptionMarker::TryBegin)
        .count()
}

fn check_regions(instructions: &[Instruction], stage: &str) -> Result<()> {
    let unbalanced = |index: usize, detail: &str| {
        violation(
            InvariantKind::UnbalancedRegion,
            stage,
            format!("instruction {index}: {detail}"),
        )
    };

    let mut open: Vec<OpenRegion> = Vec::new();
    for (index, instruction) in instructions.iter().enumerate() {
        for marker in &instruction.blocks {
            match marker {
                ExceptionMarker::TryBegin => open.push(OpenRegion {
                    phase: Phase::Try,
                    handlers: 0,
                }),
                ExceptionMarker::FilterHandlerBegin => {
                    let region = open
                        .last_mut()
                        .filter(|region| region.phase == Phase::Filter)
                        .ok_or_else(|| unbalanced(index, "filter handler outside a filter"))?;
                    region.phase = Phase::Handler;
                }
                marker if marker.is_handler_begin() => {
                    let region = open
                        .last_mut()
                        .ok_or_else(|| unbalanced(index, "handler outside a region"))?;
                    if region.phase == Phase::Filter {
                        return Err(unbalanced(index, "filter block without handler"));
                    }
                    region.handlers += 1;
                    region.phase = if *marker == ExceptionMarker::FilterBegin {
                        Phase::Filter
                    } else {
                        Phase::Handler
                    };
                }
                _ => {}
            }
        }

        for _ in instruction
            .blocks
            .iter()
            .filter(|marker| **marker == ExceptionMarker::End)
        {
            match open.pop() {
                Some(region) if region.handlers > 0 && region.phase == Phase::Handler => {}
                Some(_) => return Err(unbalanced(index, "region closed without a handler")),
                None => return Err(unbalanced(index, "end without an open region")),
            }
        }
    }

    if open.is_empty() {
        Ok(())
    } else {
        Err(violation(
            InvariantKind::UnbalancedRegion,
            stage,
            format!("{} region(s) never closed", open.len()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assembly::OpCode, metadata::token::Token};

    fn guarded() -> Vec<Instruction> {
        vec![
            Instruction::nop().with_block(ExceptionMarker::TryBegin),
            Instruction::leave(Label(0)),
            Instruction::simple(OpCode::Pop)
                .with_block(ExceptionMarker::CatchBegin(Token(0x0200_0001))),
            Instruction::leave(Label(0)).with_block(ExceptionMarker::End),
            Instruction::ret().with_label(Label(0)),
        ]
    }

    fn kind_of(result: Result<()>) -> Option<InvariantKind> {
        match result {
            Err(Error::InvariantViolation { kind, .. }) => Some(kind),
            _ => None,
        }
    }

    #[test]
    fn well_formed() {
        let instructions = guarded();
        validate(&instructions, "test").unwrap();
        assert_eq!(region_count(&instructions), 1);
    }

    #[test]
    fn dangling_label() {
        let mut instructions = guarded();
        instructions[4].labels.clear();
        assert_eq!(
            kind_of(validate(&instructions, "t")),
            Some(InvariantKind::DanglingLabel)
        );
    }

    #[test]
    fn duplicate_label() {
        let mut instructions = guarded();
        instructions[0].labels.push(Label(0));
        match validate(&instructions, "dup") {
            Err(Error::InvariantViolation {
                kind, transpiler, ..
            }) => {
                assert_eq!(kind, InvariantKind::DuplicateLabel);
                assert_eq!(transpiler, "dup");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn last_label_is_reserved() {
        let instructions = vec![
            Instruction::br(Label(u32::MAX)),
            Instruction::ret().with_label(Label(u32::MAX)),
        ];
        assert_eq!(
            kind_of(validate(&instructions, "t")),
            Some(InvariantKind::LabelOverflow)
        );
    }

    #[test]
    fn missing_end() {
        let mut instructions = guarded();
        instructions[3].blocks.clear();
        assert_eq!(
            kind_of(validate(&instructions, "t")),
            Some(InvariantKind::UnbalancedRegion)
        );
    }

    #[test]
    fn region_without_handler() {
        let mut instructions = guarded();
        instructions[2].blocks.clear();
        assert_eq!(
            kind_of(validate(&instructions, "t")),
            Some(InvariantKind::UnbalancedRegion)
        );
    }

    #[test]
    fn filter_needs_handler_block() {
        let instructions = vec![
            Instruction::nop().with_block(ExceptionMarker::TryBegin),
            Instruction::leave(Label(0)),
            Instruction::simple(OpCode::Pop).with_block(ExceptionMarker::FilterBegin),
            Instruction::ldc_i4(1),
            Instruction::simple(OpCode::Endfilter),
            Instruction::simple(OpCode::Pop).with_block(ExceptionMarker::FilterHandlerBegin),
            Instruction::leave(Label(0)).with_block(ExceptionMarker::End),
            Instruction::ret().with_label(Label(0)),
        ];
        validate(&instructions, "t").unwrap();

        let mut broken = instructions;
        broken[5].blocks.clear();
        assert_eq!(
            kind_of(validate(&broken, "t")),
            Some(InvariantKind::UnbalancedRegion)
        );
    }

    #[test]
    fn invalid_operand() {
        let instructions = vec![Instruction::simple(OpCode::Call), Instruction::ret()];
        assert!(matches!(
            validate(&instructions, "t"),
            Err(Error::InvalidOperand { .. })
        ));
    }
}
