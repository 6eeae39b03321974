//! CIL re-encoder.
//!
//! Lowers an instruction sequence back into binary form:
//!
//! 1. the sequence is validated again (labels, markers, operands);
//! 2. every branch starts in its short form if it has one, other short forms (`ldloc.s`,
//!    `ldc.i4.s`, ...) are widened only when their operand does not fit;
//! 3. offsets are assigned, and any short branch whose displacement does not fit a signed
//!    byte is widened. Sizes only grow, so repeating this reaches a fixed point;
//! 4. code is emitted, reference operands are re-referenced through the [`TokenResolver`]
//!    of the target scope;
//! 5. the exception handling table is rebuilt from the markers with final offsets, inner
//!    regions first;
//! 6. the maximum stack depth is computed by [`crate::assembly::stack::max_stack`].
//!
//! The rebuilt region count must match the number of `TryBegin`/`End` pairs. Nesting is
//! never repaired.

use std::collections::HashMap;

use crate::{
    assembly::{
        instruction::{ExceptionMarker, Instruction, Label, Operand},
        opcodes::{OpCode, OperandKind},
        stack, validation,
    },
    file::io::push_le,
    metadata::{
        method::{ExceptionHandler, ExceptionHandlerFlags, MethodBody},
        resolver::{ResolvedEntity, TokenResolver},
        signatures::MethodSig,
        token::Token,
    },
    Error, InvariantKind, Result,
};

const STAGE: &str = "encoder";

/// The binary form of an instruction sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedMethod {
    /// The encoded instruction stream
    pub code: Vec<u8>,
    /// Rebuilt exception handling table, innermost regions first
    pub exception_handlers: Vec<ExceptionHandler>,
    /// Computed maximum stack depth
    pub max_stack: u16,
    /// Final offset of every instruction, by index
    pub offsets: Vec<u32>,
}

impl EncodedMethod {
    /// Wrap the encoded code into a method body.
    #[must_use]
    pub fn into_body(self, local_var_sig_token: Token, init_locals: bool) -> MethodBody {
        MethodBody::new(
            self.code,
            self.max_stack,
            local_var_sig_token,
            init_locals,
            self.exception_handlers,
        )
    }
}

/// Pick the initial form of every instruction.
fn initial_forms(instructions: &[Instruction]) -> Result<Vec<OpCode>> {
    instructions
        .iter()
        .map(|instruction| {
            let opcode = instruction.opcode;
            if opcode.is_branch() {
                return Ok(opcode.short_form().unwrap_or(opcode));
            }

            let fits = match (opcode.operand_kind(), &instruction.operand) {
                (OperandKind::ShortVar, Operand::Local(index) | Operand::Argument(index)) => {
                    *index <= u16::from(u8::MAX)
                }
                (OperandKind::ShortInt, Operand::Int32(value)) => i8::try_from(*value).is_ok(),
                (OperandKind::ShortUInt, Operand::Int32(value)) => u8::try_from(*value).is_ok(),
                _ => true,
            };

            if fits {
                Ok(opcode)
            } else {
                opcode.long_form().ok_or(Error::InvalidOperand {
                    mnemonic: opcode.mnemonic(),
                    expected: opcode.operand_kind(),
                })
            }
        })
        .collect()
}

fn encoded_size(opcode: OpCode, operand: &Operand) -> u64 {
    let operand_size = match (opcode.operand_kind().size(), operand) {
        (Some(size), _) => size as u64,
        (None, Operand::Switch(labels)) => 4 + 4 * labels.len() as u64,
        (None, _) => 4,
    };
    opcode.size() as u64 + operand_size
}

fn assign_offsets(instructions: &[Instruction], forms: &[OpCode]) -> Result<Vec<u64>> {
    let mut offsets = Vec::with_capacity(instructions.len() + 1);
    let mut offset = 0_u64;
    for (instruction, form) in instructions.iter().zip(forms) {
        offsets.push(offset);
        offset += encoded_size(*form, &instruction.operand);
    }
    offsets.push(offset);

    if offset > u64::from(u32::MAX) {
        return Err(Error::EncodeOverflow {
            offset: u32::MAX,
        });
    }
    Ok(offsets)
}

#[allow(clippy::cast_possible_wrap)]
fn displacement(
    offsets: &[u64],
    labels: &HashMap<Label, usize>,
    label: Label,
    from_end: u64,
) -> Result<i64> {
    let index = labels.get(&label).copied().ok_or_else(|| Error::InvariantViolation {
        kind: InvariantKind::DanglingLabel,
        transpiler: STAGE.to_string(),
        detail: format!("{label} is not declared"),
    })?;
    Ok(offsets[index] as i64 - from_end as i64)
}

/// Widen short branches until every displacement fits.
fn fix_branches(
    instructions: &[Instruction],
    forms: &mut [OpCode],
    labels: &HashMap<Label, usize>,
) -> Result<Vec<u64>> {
    let mut rounds = 0;
    loop {
        let offsets = assign_offsets(instructions, forms)?;
        let mut widened = 0;

        for (index, instruction) in instructions.iter().enumerate() {
            if forms[index].operand_kind() != OperandKind::ShortBranch {
                continue;
            }
            let Operand::Label(label) = instruction.operand else {
                continue;
            };

            let distance = displacement(&offsets, labels, label, offsets[index + 1])?;
            if i8::try_from(distance).is_err() {
                if let Some(long) = forms[index].long_form() {
                    forms[index] = long;
                    widened += 1;
                }
            }
        }

        rounds += 1;
        if widened == 0 {
            log::trace!("Branch layout settled after {rounds} round(s)");
            return Ok(offsets);
        }
        log::trace!("Widened {widened} branch(es) in round {rounds}");
    }
}

fn entity_of(operand: &Operand) -> Option<ResolvedEntity> {
    match operand {
        Operand::Method(token) => Some(ResolvedEntity::Method(*token)),
        Operand::Field(token) => Some(ResolvedEntity::Field(*token)),
        Operand::Type(token) => Some(ResolvedEntity::Type(*token)),
        Operand::String(value) => Some(ResolvedEntity::String(value.clone())),
        Operand::Signature(sig) => Some(ResolvedEntity::Signature(sig.clone())),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn emit(
    instructions: &[Instruction],
    forms: &[OpCode],
    offsets: &[u64],
    labels: &HashMap<Label, usize>,
    resolver: &TokenResolver<'_>,
    method: &str,
) -> Result<Vec<u8>> {
    let mut code = Vec::with_capacity(offsets[offsets.len() - 1] as usize);

    for (index, (instruction, form)) in instructions.iter().zip(forms).enumerate() {
        let start = offsets[index] as u32;
        let end = offsets[index + 1];
        let value = form.code();
        if value > 0xFF {
            code.push((value >> 8) as u8);
        }
        code.push((value & 0xFF) as u8);

        match (form.operand_kind(), &instruction.operand) {
            (OperandKind::None, _) => {}
            (OperandKind::ShortInt, Operand::Int32(value)) => push_le(&mut code, *value as i8),
            (OperandKind::ShortUInt, Operand::Int32(value)) => push_le(&mut code, *value as u8),
            (OperandKind::Int, Operand::Int32(value)) => push_le(&mut code, *value),
            (OperandKind::Long, Operand::Int64(value)) => push_le(&mut code, *value),
            (OperandKind::ShortFloat, Operand::Float32(value)) => push_le(&mut code, *value),
            (OperandKind::Float, Operand::Float64(value)) => push_le(&mut code, *value),
            (OperandKind::ShortVar, Operand::Local(slot) | Operand::Argument(slot)) => {
                push_le(&mut code, *slot as u8);
            }
            (OperandKind::Var, Operand::Local(slot) | Operand::Argument(slot)) => {
                push_le(&mut code, *slot);
            }
            (OperandKind::ShortBranch, Operand::Label(label)) => {
                let distance = displacement(offsets, labels, *label, end)?;
                let distance =
                    i8::try_from(distance).map_err(|_| Error::EncodeOverflow { offset: start })?;
                push_le(&mut code, distance);
            }
            (OperandKind::Branch, Operand::Label(label)) => {
                let distance = displacement(offsets, labels, *label, end)?;
                let distance =
                    i32::try_from(distance).map_err(|_| Error::EncodeOverflow { offset: start })?;
                push_le(&mut code, distance);
            }
            (OperandKind::Switch, Operand::Switch(targets)) => {
                push_le(&mut code, targets.len() as u32);
                for label in targets {
                    let distance = displacement(offsets, labels, *label, end)?;
                    let distance = i32::try_from(distance)
                        .map_err(|_| Error::EncodeOverflow { offset: start })?;
                    push_le(&mut code, distance);
                }
            }
            (kind, operand) if kind.is_token() => {
                let entity = entity_of(operand).ok_or(Error::InvalidOperand {
                    mnemonic: form.mnemonic(),
                    expected: kind,
                })?;
                let token = resolver.token_for(&entity, method)?;
                push_le(&mut code, token.value());
            }
            (kind, _) => {
                return Err(Error::InvalidOperand {
                    mnemonic: form.mnemonic(),
                    expected: kind,
                })
            }
        }
    }

    Ok(code)
}

struct OpenHandler {
    flags: ExceptionHandlerFlags,
    class: u32,
    filter_start: u32,
    start: u32,
}

struct OpenRegion {
    try_start: u32,
    try_end: Option<u32>,
    handler: Option<OpenHandler>,
    clauses: Vec<ExceptionHandler>,
}

impl OpenRegion {
    fn close_handler(&mut self, end: u32) {
        if let Some(handler) = self.handler.take() {
            let try_end = self.try_end.unwrap_or(handler.start);
            self.clauses.push(ExceptionHandler {
                flags: handler.flags,
                try_offset: self.try_start,
                try_length: try_end - self.try_start,
                handler_offset: handler.start,
                handler_length: end - handler.start,
                filter_offset: if handler.flags.contains(ExceptionHandlerFlags::FILTER) {
                    handler.filter_start
                } else {
                    handler.class
                },
            });
        }
    }

    fn begin_handler(&mut self, flags: ExceptionHandlerFlags, class: u32, at: u32) {
        self.close_handler(at);
        if self.try_end.is_none() {
            self.try_end = Some(at);
        }
        self.handler = Some(OpenHandler {
            flags,
            class,
            filter_start: at,
            start: at,
        });
    }
}

/// Rebuild the exception handling table from region markers.
///
/// Returns the clauses, innermost first, and the number of closed regions that produced
/// at least one clause.
#[allow(clippy::cast_possible_truncation)]
fn build_handlers(
    instructions: &[Instruction],
    offsets: &[u64],
    resolver: &TokenResolver<'_>,
    method: &str,
) -> Result<(Vec<ExceptionHandler>, usize)> {
    let unbalanced = |detail: String| Error::InvariantViolation {
        kind: InvariantKind::UnbalancedRegion,
        transpiler: STAGE.to_string(),
        detail,
    };

    let mut open: Vec<OpenRegion> = Vec::new();
    let mut handlers = Vec::new();
    let mut rebuilt = 0;

    for (index, instruction) in instructions.iter().enumerate() {
        let start = offsets[index] as u32;
        let end = offsets[index + 1] as u32;

        for marker in &instruction.blocks {
            if *marker == ExceptionMarker::TryBegin {
                open.push(OpenRegion {
                    try_start: start,
                    try_end: None,
                    handler: None,
                    clauses: Vec::new(),
                });
                continue;
            }

            let region = open
                .last_mut()
                .ok_or_else(|| unbalanced(format!("{marker} at instruction {index} outside a region")))?;
            match marker {
                ExceptionMarker::CatchBegin(ty) => {
                    let class = resolver.token_for(&ResolvedEntity::Type(*ty), method)?;
                    region.begin_handler(ExceptionHandlerFlags::EXCEPTION, class.value(), start);
                }
                ExceptionMarker::FilterBegin => {
                    region.begin_handler(ExceptionHandlerFlags::FILTER, 0, start);
                }
                ExceptionMarker::FilterHandlerBegin => match region.handler.as_mut() {
                    Some(handler) if handler.flags.contains(ExceptionHandlerFlags::FILTER) => {
                        handler.start = start;
                    }
                    _ => return Err(unbalanced(format!("filter handler at {index} without filter"))),
                },
                ExceptionMarker::FinallyBegin => {
                    region.begin_handler(ExceptionHandlerFlags::FINALLY, 0, start);
                }
                ExceptionMarker::FaultBegin => {
                    region.begin_handler(ExceptionHandlerFlags::FAULT, 0, start);
                }
                ExceptionMarker::TryBegin | ExceptionMarker::End => {}
            }
        }

        for _ in instruction
            .blocks
            .iter()
            .filter(|marker| **marker == ExceptionMarker::End)
        {
            let mut region = open
                .pop()
                .ok_or_else(|| unbalanced(format!("end at instruction {index} without region")))?;
            region.close_handler(end);
            if !region.clauses.is_empty() {
                rebuilt += 1;
            }
            handlers.append(&mut region.clauses);
        }
    }

    if !open.is_empty() {
        return Err(unbalanced(format!("{} region(s) never closed", open.len())));
    }
    Ok((handlers, rebuilt))
}

/// Encode `instructions` as the body of a method with signature `sig`.
///
/// Reference operands are converted to tokens of `resolver`'s scope; for a synthesized
/// method this fills its dynamic scope.
///
/// # Arguments
///
/// * `instructions` - The sequence to encode
/// * `sig` - Signature of the method the body belongs to
/// * `resolver` - Target token scope
/// * `method` - Identity of the method, used in diagnostics
///
/// # Errors
/// Returns [`Error::InvariantViolation`] or [`Error::InvalidOperand`] for malformed
/// sequences, [`Error::EncodeOverflow`] if a displacement does not fit, [`Error::TokenResolution`]
/// if an entity has no token in the target scope, and [`Error::StackImbalance`] for an
/// inconsistent evaluation stack.
pub fn encode(
    instructions: &[Instruction],
    sig: &MethodSig,
    resolver: &TokenResolver<'_>,
    method: &str,
) -> Result<EncodedMethod> {
    validation::validate(instructions, STAGE)?;
    let labels = validation::label_map(instructions, STAGE)?;

    let mut forms = initial_forms(instructions)?;
    let offsets = fix_branches(instructions, &mut forms, &labels)?;
    let code = emit(instructions, &forms, &offsets, &labels, resolver, method)?;

    let (exception_handlers, rebuilt) = build_handlers(instructions, &offsets, resolver, method)?;
    let regions = validation::region_count(instructions);
    if rebuilt != regions {
        return Err(Error::InvariantViolation {
            kind: InvariantKind::UnbalancedRegion,
            transpiler: STAGE.to_string(),
            detail: format!("{regions} marked region(s), {rebuilt} rebuilt"),
        });
    }

    let max_stack = stack::max_stack(instructions, &labels, sig, resolver.module(), method)?;

    #[allow(clippy::cast_possible_truncation)]
    let offsets = offsets[..instructions.len()]
        .iter()
        .map(|offset| *offset as u32)
        .collect();

    Ok(EncodedMethod {
        code,
        exception_handlers,
        max_stack,
        offsets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::decoder::decode_body,
        metadata::{
            module::{Module, ModuleBuilder},
            resolver::DynamicScope,
            signatures::{ParamSig, TypeSig},
        },
    };
    use std::sync::Arc;

    fn module() -> Arc<Module> {
        let mut builder = ModuleBuilder::new("Test");
        let ty = builder.add_type("", "T");
        builder.add_native(
            ty,
            "Log",
            MethodSig::new_static(TypeSig::Void, vec![ParamSig::new("s", TypeSig::String)]),
            |_| Ok(crate::emulation::Value::Void),
        );
        builder.user_string("hi");
        builder.build().unwrap()
    }

    fn void_sig() -> MethodSig {
        MethodSig::new_static(TypeSig::Void, Vec::new())
    }

    #[test]
    fn short_branch_stays_short() {
        let module = module();
        let instructions = vec![
            Instruction::br(Label(0)),
            Instruction::nop(),
            Instruction::ret().with_label(Label(0)),
        ];
        let encoded = encode(
            &instructions,
            &void_sig(),
            &TokenResolver::Static(&module),
            "T::M",
        )
        .unwrap();
        // br.s +1, nop, ret
        assert_eq!(encoded.code, vec![0x2B, 0x01, 0x00, 0x2A]);
        assert_eq!(encoded.offsets, vec![0, 2, 3]);
        assert_eq!(encoded.max_stack, 0);
    }

    #[test]
    fn long_distance_widens() {
        let module = module();
        let mut instructions = vec![Instruction::br(Label(0))];
        instructions.extend((0..200).map(|_| Instruction::nop()));
        instructions.push(Instruction::ret().with_label(Label(0)));

        let encoded = encode(
            &instructions,
            &void_sig(),
            &TokenResolver::Static(&module),
            "T::M",
        )
        .unwrap();
        assert_eq!(encoded.code[0], 0x38);
        assert_eq!(&encoded.code[1..5], &200_i32.to_le_bytes());
        assert_eq!(encoded.offsets[201], 205);
    }

    #[test]
    fn backward_branch_at_boundary() {
        let module = module();
        // L0: 128 nops then br.s L0 needs -130, which does not fit
        let mut instructions: Vec<Instruction> = (0..128).map(|_| Instruction::nop()).collect();
        instructions[0].labels.push(Label(0));
        instructions.push(Instruction::br(Label(0)));

        let encoded = encode(
            &instructions,
            &void_sig(),
            &TokenResolver::Static(&module),
            "T::M",
        )
        .unwrap();
        assert_eq!(encoded.code[128], 0x38);
        assert_eq!(&encoded.code[129..133], &(-133_i32).to_le_bytes());
    }

    #[test]
    fn variable_forms_widen_only_when_needed() {
        let module = module();
        let instructions = vec![
            Instruction::new(OpCode::LdcI4S, Operand::Int32(1000)).unwrap(),
            Instruction::simple(OpCode::Pop),
            Instruction::ret(),
        ];
        let encoded = encode(
            &instructions,
            &void_sig(),
            &TokenResolver::Static(&module),
            "T::M",
        )
        .unwrap();
        assert_eq!(encoded.code[0], 0x20);
        assert_eq!(&encoded.code[1..5], &1000_i32.to_le_bytes());
    }

    #[test]
    fn tokens_go_through_dynamic_scope() {
        let module = module();
        let log = module.find_method("T", "Log").unwrap();
        let instructions = vec![Instruction::ldstr("hi"), Instruction::call(log), Instruction::ret()];

        let scope = DynamicScope::new();
        let resolver = TokenResolver::Synthesized {
            module: &module,
            scope: &scope,
        };
        let encoded = encode(&instructions, &void_sig(), &resolver, "T::M").unwrap();
        // ldstr 0x70000001, call 0x06000002
        assert_eq!(&encoded.code[1..5], &0x7000_0001_u32.to_le_bytes());
        assert_eq!(&encoded.code[6..10], &0x0600_0002_u32.to_le_bytes());
        assert_eq!(scope.len(), 2);
        assert_eq!(encoded.max_stack, 1);

        let body = encoded.into_body(Token(0), false);
        let decoded = decode_body(&body, &resolver, "T::M").unwrap();
        assert_eq!(decoded.instructions[1].operand, Operand::Method(log));
    }

    #[test]
    fn regions_are_rebuilt_inner_first() {
        let module = module();
        let exception = Token(0x0200_0001);
        let instructions = vec![
            Instruction::nop().with_block(ExceptionMarker::TryBegin),
            Instruction::nop().with_block(ExceptionMarker::TryBegin),
            Instruction::leave(Label(0)),
            Instruction::simple(OpCode::Endfinally)
                .with_block(ExceptionMarker::FinallyBegin)
                .with_block(ExceptionMarker::End),
            Instruction::leave(Label(1)).with_label(Label(0)),
            Instruction::simple(OpCode::Pop).with_block(ExceptionMarker::CatchBegin(exception)),
            Instruction::leave(Label(1)).with_block(ExceptionMarker::End),
            Instruction::ret().with_label(Label(1)),
        ];
        let encoded = encode(
            &instructions,
            &void_sig(),
            &TokenResolver::Static(&module),
            "T::M",
        )
        .unwrap();

        // nop nop leave.s endfinally leave.s pop leave.s ret
        assert_eq!(encoded.offsets, vec![0, 1, 2, 4, 5, 7, 8, 10]);
        let handlers = &encoded.exception_handlers;
        assert_eq!(handlers.len(), 2);
        assert!(handlers[0].flags.contains(ExceptionHandlerFlags::FINALLY));
        assert_eq!(
            (handlers[0].try_offset, handlers[0].try_length),
            (1, 3)
        );
        assert_eq!(
            (handlers[0].handler_offset, handlers[0].handler_length),
            (4, 1)
        );
        assert_eq!((handlers[1].try_offset, handlers[1].try_length), (0, 7));
        assert_eq!(
            (handlers[1].handler_offset, handlers[1].handler_length),
            (7, 3)
        );
        assert_eq!(handlers[1].class_token(), Some(exception));
        assert_eq!(encoded.max_stack, 1);
    }

    #[test]
    fn identical_empty_try_ranges_count_separately() {
        let module = module();
        let instructions = vec![
            Instruction::nop()
                .with_block(ExceptionMarker::TryBegin)
                .with_block(ExceptionMarker::FinallyBegin)
                .with_block(ExceptionMarker::TryBegin)
                .with_block(ExceptionMarker::FinallyBegin),
            Instruction::simple(OpCode::Endfinally).with_block(ExceptionMarker::End),
            Instruction::simple(OpCode::Endfinally).with_block(ExceptionMarker::End),
        ];
        validation::validate(&instructions, STAGE).unwrap();

        let (handlers, rebuilt) = build_handlers(
            &instructions,
            &[0, 1, 3, 5],
            &TokenResolver::Static(&module),
            "T::M",
        )
        .unwrap();
        assert_eq!(rebuilt, validation::region_count(&instructions));
        assert_eq!(handlers.len(), 2);
        assert!(handlers
            .iter()
            .all(|clause| (clause.try_offset, clause.try_length) == (0, 0)));
        assert_eq!(handlers[0].handler_length, 3);
        assert_eq!(handlers[1].handler_length, 5);
    }

    #[test]
    fn filter_clause() {
        let module = module();
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
        let encoded = encode(
            &instructions,
            &void_sig(),
            &TokenResolver::Static(&module),
            "T::M",
        )
        .unwrap();
        let clause = &encoded.exception_handlers[0];
        assert!(clause.flags.contains(ExceptionHandlerFlags::FILTER));
        // nop leave.s | pop ldc.i4.1 endfilter | pop leave.s | ret
        assert_eq!((clause.try_offset, clause.try_length), (0, 3));
        assert_eq!(clause.filter_offset, 3);
        assert_eq!((clause.handler_offset, clause.handler_length), (7, 3));
    }

    #[test]
    fn dangling_label_is_rejected() {
        let module = module();
        let instructions = vec![Instruction::br(Label(5)), Instruction::ret()];
        match encode(
            &instructions,
            &void_sig(),
            &TokenResolver::Static(&module),
            "T::M",
        ) {
            Err(Error::InvariantViolation {
                kind, transpiler, ..
            }) => {
                assert_eq!(kind, InvariantKind::DanglingLabel);
                assert_eq!(transpiler, "encoder");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn round_trip_through_decoder() {
        let module = module();
        let instructions = vec![
            Instruction::ldc_i4(0),
            Instruction::new(OpCode::Switch, Operand::Switch(vec![Label(0), Label(1)])).unwrap(),
            Instruction::br(Label(1)),
            Instruction::nop().with_label(Label(0)),
            Instruction::ret().with_label(Label(1)),
        ];
        let resolver = TokenResolver::Static(&module);
        let body = encode(&instructions, &void_sig(), &resolver, "T::M")
            .unwrap()
            .into_body(Token(0), false);
        let decoded = decode_body(&body, &resolver, "T::M").unwrap();

        let opcodes: Vec<OpCode> = decoded.instructions.iter().map(|i| i.opcode).collect();
        assert_eq!(
            opcodes,
            vec![OpCode::LdcI40, OpCode::Switch, OpCode::BrS, OpCode::Nop, OpCode::Ret]
        );
        let labels = decoded.label_map();
        match &decoded.instructions[1].operand {
            Operand::Switch(targets) => {
                assert_eq!(labels[&targets[0]], 3);
                assert_eq!(labels[&targets[1]], 4);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
