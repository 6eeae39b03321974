//! CIL method body decoder.
//!
//! Turns the binary form of a method body into the editable instruction model. Decoding is
//! a single linear sweep from offset 0 to the end of the code; it never resynchronizes past
//! a bad byte. The sweep records the start offset of every instruction, then:
//!
//! 1. replaces branch and switch displacements by [`Label`]s, one per distinct target
//!    offset, declared on the target instruction;
//! 2. turns the exception handling table into [`ExceptionMarker`]s. Clauses that share a
//!    try range form one region with their handlers in offset order; regions are emitted
//!    outermost first;
//! 3. resolves every token operand through the [`TokenResolver`] of the method.
//!
//! Any inconsistency (unknown opcode, truncated operand, a branch target or region boundary
//! that is not an instruction boundary, a region layout the marker model cannot express)
//! fails with [`crate::Error::Decode`].
//!
//! # Examples
//!
//! ```rust
//! use dotpatch::prelude::*;
//!
//! let mut builder = ModuleBuilder::new("Demo");
//! let ty = builder.add_type("", "Demo");
//! let method = builder.add_il(
//!     ty,
//!     "Answer",
//!     MethodSig::new_static(TypeSig::I4, Vec::new()),
//!     Vec::new(),
//!     vec![Instruction::ldc_i4(42), Instruction::ret()],
//! );
//! let module = builder.build()?;
//! let handle = MethodHandle::from_module(&module, method)?;
//!
//! let decoded = decode_method(&handle, &module, None)?;
//! assert_eq!(decoded.instructions.len(), 2);
//! assert_eq!(decoded.instructions[0].int_constant(), Some(42));
//! # Ok::<(), dotpatch::Error>(())
//! ```

use std::collections::{BTreeMap, HashMap};

use crate::{
    assembly::{
        instruction::{ExceptionMarker, Instruction, Label, LabelAllocator, Operand},
        opcodes::{OpCode, OperandKind, PREFIX_FE},
        validation,
    },
    file::parser::Parser,
    metadata::{
        method::{ExceptionHandler, ExceptionHandlerFlags, MethodBody, MethodHandle},
        module::Module,
        resolver::{DynamicScope, ResolvedEntity, TokenResolver},
        signatures::{StandAloneSig, TypeSig},
        token::Token,
    },
    Error, Result,
};

/// The result of decoding one method body.
#[derive(Debug, Clone)]
pub struct DecodedMethod {
    /// Instructions in code order, offsets set
    pub instructions: Vec<Instruction>,
    /// Local variable slots
    pub locals: Vec<TypeSig>,
    /// Allocator continuing after every label used by `instructions`
    pub labels: LabelAllocator,
    /// Max stack declared by the header
    pub max_stack: u16,
    /// Whether locals are zero-initialized
    pub init_locals: bool,
    /// The exception handling table as read from the body
    pub exception_handlers: Vec<ExceptionHandler>,
    /// Size of the code in bytes
    pub code_size: u32,
}

impl DecodedMethod {
    /// Index of the instruction declaring each label.
    #[must_use]
    pub fn label_map(&self) -> HashMap<Label, usize> {
        self.instructions
            .iter()
            .enumerate()
            .flat_map(|(index, instruction)| {
                instruction.labels.iter().map(move |label| (*label, index))
            })
            .collect()
    }

    /// Region markers by instruction index.
    #[must_use]
    pub fn marker_map(&self) -> BTreeMap<usize, Vec<ExceptionMarker>> {
        self.instructions
            .iter()
            .enumerate()
            .filter(|(_, instruction)| !instruction.blocks.is_empty())
            .map(|(index, instruction)| (index, instruction.blocks.clone()))
            .collect()
    }

    /// Index of the instruction starting at `offset`.
    #[must_use]
    pub fn index_of_offset(&self, offset: u32) -> Option<usize> {
        self.instructions
            .binary_search_by_key(&offset, |instruction| instruction.offset.unwrap_or(u32::MAX))
            .ok()
    }
}

enum RawOperand {
    Ready(Operand),
    Branch(i64),
    Switch(Vec<i64>),
}

struct Decoder<'a> {
    code: &'a [u8],
    resolver: &'a TokenResolver<'a>,
    method: &'a str,
    instructions: Vec<Instruction>,
    targets: Vec<(usize, RawOperand)>,
    by_offset: HashMap<u32, usize>,
}

impl<'a> Decoder<'a> {
    fn new(code: &'a [u8], resolver: &'a TokenResolver<'a>, method: &'a str) -> Self {
        Decoder {
            code,
            resolver,
            method,
            instructions: Vec::new(),
            targets: Vec::new(),
            by_offset: HashMap::new(),
        }
    }

    fn raw_byte(&self, offset: u32) -> u8 {
        self.code.get(offset as usize).copied().unwrap_or(0)
    }

    fn sweep(&mut self) -> Result<()> {
        let mut parser = Parser::new(self.code);
        while parser.has_more_data() {
            #[allow(clippy::cast_possible_truncation)]
            let start = parser.pos() as u32;
            let first = parser.read_le::<u8>()?;
            let opcode = if first == PREFIX_FE {
                let second = parser
                    .read_le::<u8>()
                    .map_err(|_| decode_error!(start, first, "truncated two-byte opcode"))?;
                OpCode::from_code(0xFE00 | u16::from(second)).ok_or_else(|| {
                    decode_error!(start + 1, second, "unknown opcode 0xFE 0x{:02X}", second)
                })?
            } else {
                OpCode::from_code(u16::from(first))
                    .ok_or_else(|| decode_error!(start, first, "unknown opcode"))?
            };

            let operand = self.read_operand(&mut parser, opcode, start, first)?;
            let index = self.instructions.len();
            self.by_offset.insert(start, index);

            let operand = match operand {
                RawOperand::Ready(operand) => operand,
                pending => {
                    self.targets.push((index, pending));
                    Operand::None
                }
            };

            self.instructions.push(Instruction {
                opcode,
                operand,
                offset: Some(start),
                labels: Vec::new(),
                blocks: Vec::new(),
            });
        }

        Ok(())
    }

    fn read_operand(
        &self,
        parser: &mut Parser,
        opcode: OpCode,
        start: u32,
        raw_byte: u8,
    ) -> Result<RawOperand> {
        let truncated =
            |_| decode_error!(start, raw_byte, "truncated operand of '{}'", opcode.mnemonic());

        let operand = match opcode.operand_kind() {
            OperandKind::None => Operand::None,
            OperandKind::ShortInt => Operand::Int32(i32::from(parser.read_le::<i8>().map_err(truncated)?)),
            OperandKind::ShortUInt => Operand::Int32(i32::from(parser.read_le::<u8>().map_err(truncated)?)),
            OperandKind::Int => Operand::Int32(parser.read_le::<i32>().map_err(truncated)?),
            OperandKind::Long => Operand::Int64(parser.read_le::<i64>().map_err(truncated)?),
            OperandKind::ShortFloat => Operand::Float32(parser.read_le::<f32>().map_err(truncated)?),
            OperandKind::Float => Operand::Float64(parser.read_le::<f64>().map_err(truncated)?),
            OperandKind::ShortVar => {
                let index = u16::from(parser.read_le::<u8>().map_err(truncated)?);
                Self::variable(opcode, index)
            }
            OperandKind::Var => {
                let index = parser.read_le::<u16>().map_err(truncated)?;
                Self::variable(opcode, index)
            }
            OperandKind::ShortBranch => {
                let displacement = i64::from(parser.read_le::<i8>().map_err(truncated)?);
                return Ok(RawOperand::Branch(parser.pos() as i64 + displacement));
            }
            OperandKind::Branch => {
                let displacement = i64::from(parser.read_le::<i32>().map_err(truncated)?);
                return Ok(RawOperand::Branch(parser.pos() as i64 + displacement));
            }
            OperandKind::Switch => {
                let count = parser.read_le::<u32>().map_err(truncated)? as usize;
                if count.saturating_mul(4) > parser.remaining() {
                    return Err(decode_error!(
                        start,
                        raw_byte,
                        "switch table of {} entries exceeds the code",
                        count
                    ));
                }
                let mut displacements = Vec::with_capacity(count);
                for _ in 0..count {
                    displacements.push(i64::from(parser.read_le::<i32>().map_err(truncated)?));
                }
                let end = parser.pos() as i64;
                return Ok(RawOperand::Switch(
                    displacements.into_iter().map(|d| end + d).collect(),
                ));
            }
            kind => {
                let token = Token(parser.read_le::<u32>().map_err(truncated)?);
                self.token_operand(kind, token)?
            }
        };

        Ok(RawOperand::Ready(operand))
    }

    fn variable(opcode: OpCode, index: u16) -> Operand {
        if opcode.uses_argument() {
            Operand::Argument(index)
        } else {
            Operand::Local(index)
        }
    }

    fn token_operand(&self, kind: OperandKind, token: Token) -> Result<Operand> {
        let entity = self.resolver.resolve(token, self.method)?;
        match (kind, entity) {
            (OperandKind::Method | OperandKind::Token, ResolvedEntity::Method(method)) => {
                Ok(Operand::Method(method))
            }
            (OperandKind::Field | OperandKind::Token, ResolvedEntity::Field(field)) => {
                Ok(Operand::Field(field))
            }
            (OperandKind::Type | OperandKind::Token, ResolvedEntity::Type(ty)) => {
                Ok(Operand::Type(ty))
            }
            (OperandKind::String, ResolvedEntity::String(value)) => Ok(Operand::String(value)),
            (OperandKind::Signature, ResolvedEntity::Signature(sig)) => {
                Ok(Operand::Signature(sig))
            }
            _ => Err(Error::TokenResolution {
                token,
                method: self.method.to_string(),
            }),
        }
    }

    fn index_at(&self, target: i64, at: u32, what: &str) -> Result<usize> {
        u32::try_from(target)
            .ok()
            .and_then(|offset| self.by_offset.get(&offset).copied())
            .ok_or_else(|| {
                decode_error!(
                    at,
                    self.raw_byte(at),
                    "{} IL_{:04X} is not an instruction boundary",
                    what,
                    target
                )
            })
    }

    fn bind_labels(&mut self, labels: &mut LabelAllocator) -> Result<()> {
        let mut by_target: BTreeMap<usize, Label> = BTreeMap::new();
        let targets = std::mem::take(&mut self.targets);

        for (index, raw) in targets {
            let at = self.instructions[index].offset.unwrap_or_default();
            let offsets = match raw {
                RawOperand::Branch(target) => vec![target],
                RawOperand::Switch(targets) => targets,
                RawOperand::Ready(_) => continue,
            };

            let mut resolved = Vec::with_capacity(offsets.len());
            for target in offsets {
                let target_index = self.index_at(target, at, "branch target")?;
                let label = *by_target
                    .entry(target_index)
                    .or_insert_with(|| labels.define());
                resolved.push(label);
            }

            self.instructions[index].operand = if self.instructions[index].opcode == OpCode::Switch {
                Operand::Switch(resolved)
            } else {
                Operand::Label(resolved[0])
            };
        }

        for (target_index, label) in by_target {
            self.instructions[target_index].labels.push(label);
        }

        Ok(())
    }

    fn region_end_index(&self, end: u32) -> Result<usize> {
        if end as usize == self.code.len() {
            return Ok(self.instructions.len() - 1);
        }
        Ok(self.index_at(i64::from(end), end, "region end")? - 1)
    }

    fn attach_markers(&mut self, handlers: &[ExceptionHandler]) -> Result<()> {
        let mut regions: BTreeMap<(u32, u32), Vec<&ExceptionHandler>> = BTreeMap::new();
        for handler in handlers {
            regions
                .entry((handler.try_offset, handler.try_length))
                .or_default()
                .push(handler);
        }

        let mut ordered = Vec::with_capacity(regions.len());
        for ((try_offset, try_length), mut clauses) in regions {
            clauses.sort_by_key(|clause| clause.block_start());

            let mut expected = try_offset + try_length;
            for clause in &clauses {
                if clause.block_start() != expected {
                    return Err(decode_error!(
                        clause.block_start(),
                        self.raw_byte(clause.block_start()),
                        "handler does not follow its try block or previous handler at IL_{:04X}",
                        expected
                    ));
                }
                if clause.filter_start().is_some_and(|filter| filter >= clause.handler_offset) {
                    return Err(decode_error!(
                        clause.block_start(),
                        self.raw_byte(clause.block_start()),
                        "filter block does not precede its handler"
                    ));
                }
                expected = clause.handler_end();
            }
            ordered.push((try_offset, expected, clauses));
        }
        ordered.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

        for (try_offset, region_end, clauses) in ordered {
            let try_index = self.index_at(i64::from(try_offset), try_offset, "try start")?;
            self.instructions[try_index]
                .blocks
                .push(ExceptionMarker::TryBegin);

            for clause in clauses {
                let start = clause.block_start();
                let start_index = self.index_at(i64::from(start), start, "handler start")?;
                let marker = if clause.flags.contains(ExceptionHandlerFlags::FILTER) {
                    let handler_index = self.index_at(
                        i64::from(clause.handler_offset),
                        clause.handler_offset,
                        "filter handler start",
                    )?;
                    self.instructions[handler_index]
                        .blocks
                        .push(ExceptionMarker::FilterHandlerBegin);
                    ExceptionMarker::FilterBegin
                } else if clause.flags.contains(ExceptionHandlerFlags::FINALLY) {
                    ExceptionMarker::FinallyBegin
                } else if clause.flags.contains(ExceptionHandlerFlags::FAULT) {
                    ExceptionMarker::FaultBegin
                } else {
                    let token = Token(clause.filter_offset);
                    match self.resolver.resolve(token, self.method)? {
                        ResolvedEntity::Type(ty) => ExceptionMarker::CatchBegin(ty),
                        _ => {
                            return Err(Error::TokenResolution {
                                token,
                                method: self.method.to_string(),
                            })
                        }
                    }
                };
                self.instructions[start_index].blocks.push(marker);
            }

            let end_index = self.region_end_index(region_end)?;
            self.instructions[end_index].blocks.push(ExceptionMarker::End);
        }

        validation::validate(&self.instructions, self.method).map_err(|error| {
            decode_error!(
                0,
                self.raw_byte(0),
                "exception regions are not properly nested: {}",
                error
            )
        })
    }
}

/// Decode the instructions of a method body.
///
/// # Arguments
///
/// * `body` - The parsed method body
/// * `resolver` - Token scope of the body
/// * `method` - Identity of the method, used in diagnostics
///
/// # Errors
/// Returns [`crate::Error::Decode`] for malformed code or regions, and
/// [`crate::Error::TokenResolution`] for tokens the resolver does not know.
pub fn decode_body(
    body: &MethodBody,
    resolver: &TokenResolver<'_>,
    method: &str,
) -> Result<DecodedMethod> {
    let mut decoder = Decoder::new(&body.code, resolver, method);
    decoder.sweep()?;

    let mut labels = LabelAllocator::new();
    decoder.bind_labels(&mut labels)?;
    if !body.exception_handlers.is_empty() {
        if decoder.instructions.is_empty() {
            return Err(decode_error!(0, 0, "exception clauses on an empty body"));
        }
        decoder.attach_markers(&body.exception_handlers)?;
    }

    let locals = if body.local_var_sig_token.is_null() {
        Vec::new()
    } else {
        match resolver.resolve(body.local_var_sig_token, method)? {
            ResolvedEntity::Signature(sig) => match sig.as_ref() {
                StandAloneSig::Locals(locals) => locals.clone(),
                StandAloneSig::Method(_) => {
                    return Err(malformed_error!(
                        "Local signature of {} is a method signature",
                        method
                    ))
                }
            },
            _ => {
                return Err(Error::TokenResolution {
                    token: body.local_var_sig_token,
                    method: method.to_string(),
                })
            }
        }
    };

    #[allow(clippy::cast_possible_truncation)]
    let code_size = body.code.len() as u32;

    Ok(DecodedMethod {
        instructions: decoder.instructions,
        locals,
        labels,
        max_stack: body.max_stack,
        init_locals: body.is_init_local,
        exception_handlers: body.exception_handlers.clone(),
        code_size,
    })
}

/// Decode the original body of the method `handle` identifies.
///
/// `scope` must be supplied for synthesized handles.
///
/// # Errors
/// Returns [`crate::Error::MethodNotFound`] or [`crate::Error::NotIl`] if the method has no IL
/// body, and any error of [`decode_body`].
pub fn decode_method(
    handle: &MethodHandle,
    module: &Module,
    scope: Option<&DynamicScope>,
) -> Result<DecodedMethod> {
    let method = module
        .method(handle.token())
        .ok_or(Error::MethodNotFound(handle.token()))?;
    let body = method.body().ok_or(Error::NotIl(handle.token()))?;
    let resolver = TokenResolver::for_method(handle, module, scope)?;
    decode_body(body, &resolver, handle.name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        module::ModuleBuilder,
        signatures::MethodSig,
    };

    fn module() -> std::sync::Arc<Module> {
        let mut builder = ModuleBuilder::new("Test");
        let ty = builder.add_type("", "T");
        builder.add_field(ty, "f", TypeSig::I4, true);
        builder.user_string("hello");
        builder.build().unwrap()
    }

    fn decode(code: Vec<u8>, handlers: Vec<ExceptionHandler>) -> Result<DecodedMethod> {
        let module = module();
        let body = MethodBody::new(code, 8, Token(0), false, handlers);
        decode_body(&body, &TokenResolver::Static(&module), "T::M")
    }

    #[test]
    fn simple_stream() {
        // ldarg.0 ldc.i4.s -3 ldsfld f ldstr "hello" ret
        let code = vec![
            0x02, 0x1F, 0xFD, 0x7E, 0x01, 0x00, 0x00, 0x04, 0x72, 0x01, 0x00, 0x00, 0x70, 0x2A,
        ];
        let decoded = decode(code, Vec::new()).unwrap();
        let ops: Vec<OpCode> = decoded.instructions.iter().map(|i| i.opcode).collect();
        assert_eq!(
            ops,
            vec![OpCode::Ldarg0, OpCode::LdcI4S, OpCode::Ldsfld, OpCode::Ldstr, OpCode::Ret]
        );
        assert_eq!(decoded.instructions[1].operand, Operand::Int32(-3));
        assert_eq!(decoded.instructions[2].operand, Operand::Field(Token(0x0400_0001)));
        assert_eq!(decoded.instructions[3].operand, Operand::String("hello".into()));
        assert_eq!(decoded.instructions[4].offset, Some(13));
        assert_eq!(decoded.index_of_offset(8), Some(3));
        assert_eq!(decoded.code_size, 14);
    }

    #[test]
    fn branches_become_labels() {
        // IL_0: ldarg.0  IL_1: brtrue.s IL_5  IL_3: ldc.i4.0  IL_4: ret  IL_5: ldc.i4.1  IL_6: ret
        let code = vec![0x02, 0x2D, 0x02, 0x16, 0x2A, 0x17, 0x2A];
        let decoded = decode(code, Vec::new()).unwrap();
        let label = match decoded.instructions[1].operand {
            Operand::Label(label) => label,
            ref other => panic!("unexpected operand {other:?}"),
        };
        assert_eq!(decoded.instructions[4].labels, vec![label]);
        assert_eq!(decoded.label_map()[&label], 4);
        assert_eq!(decoded.labels.count(), 1);
    }

    #[test]
    fn switch_targets_share_labels() {
        // IL_0: ldarg.0  IL_1: switch (IL_12, IL_12, IL_13)  IL_12: ret  IL_13: ret
        let mut code = vec![0x02, 0x45, 0x03, 0x00, 0x00, 0x00];
        code.extend_from_slice(&0_i32.to_le_bytes());
        code.extend_from_slice(&0_i32.to_le_bytes());
        code.extend_from_slice(&1_i32.to_le_bytes());
        code.extend_from_slice(&[0x2A, 0x2A]);

        let decoded = decode(code, Vec::new()).unwrap();
        match &decoded.instructions[1].operand {
            Operand::Switch(labels) => {
                assert_eq!(labels.len(), 3);
                assert_eq!(labels[0], labels[1]);
                assert_ne!(labels[1], labels[2]);
            }
            other => panic!("unexpected operand {other:?}"),
        }
        assert_eq!(decoded.labels.count(), 2);
    }

    #[test]
    fn unknown_opcode() {
        let err = decode(vec![0x00, 0x24, 0x2A], Vec::new()).unwrap_err();
        match err {
            Error::Decode {
                offset, raw_byte, ..
            } => {
                assert_eq!(offset, 1);
                assert_eq!(raw_byte, 0x24);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_two_byte_opcode() {
        let err = decode(vec![0xFE, 0x08], Vec::new()).unwrap_err();
        assert!(matches!(err, Error::Decode { offset: 1, raw_byte: 0x08, .. }));
    }

    #[test]
    fn truncated_operand() {
        let err = decode(vec![0x20, 0x01, 0x02], Vec::new()).unwrap_err();
        assert!(matches!(err, Error::Decode { offset: 0, raw_byte: 0x20, .. }));
    }

    #[test]
    fn misaligned_branch_target() {
        // br.s into the middle of ldc.i4
        let code = vec![0x2B, 0x01, 0x20, 0x00, 0x00, 0x00, 0x00, 0x2A];
        let err = decode(code, Vec::new()).unwrap_err();
        assert!(matches!(err, Error::Decode { offset: 0, .. }));
    }

    #[test]
    fn unresolvable_token() {
        let code = vec![0x28, 0x05, 0x00, 0x00, 0x06, 0x2A];
        let err = decode(code, Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            Error::TokenResolution { token: Token(0x0600_0005), .. }
        ));
    }

    #[test]
    fn exception_table_becomes_markers() {
        // IL_0: nop  IL_1: leave.s IL_7  IL_3: pop  IL_4: leave.s IL_7  IL_6: nop IL_7: ret
        // try [0, 3) catch [3, 6)
        let code = vec![0x00, 0xDE, 0x04, 0x26, 0xDE, 0x01, 0x00, 0x2A];
        let handlers = vec![ExceptionHandler {
            flags: ExceptionHandlerFlags::EXCEPTION,
            try_offset: 0,
            try_length: 3,
            handler_offset: 3,
            handler_length: 3,
            filter_offset: 0x0200_0001,
        }];
        let decoded = decode(code, handlers).unwrap();
        let markers = decoded.marker_map();
        assert_eq!(markers[&0], vec![ExceptionMarker::TryBegin]);
        assert_eq!(
            markers[&2],
            vec![ExceptionMarker::CatchBegin(Token(0x0200_0001))]
        );
        assert_eq!(markers[&3], vec![ExceptionMarker::End]);
        assert_eq!(markers.len(), 3);
    }

    #[test]
    fn shared_try_range_is_one_region() {
        // try [0,2) catch [2,4) finally-like second catch [4,6), then ret
        let code = vec![0x00, 0x00, 0x26, 0x00, 0x26, 0x00, 0x2A];
        let clause = |start: u32| ExceptionHandler {
            flags: ExceptionHandlerFlags::EXCEPTION,
            try_offset: 0,
            try_length: 2,
            handler_offset: start,
            handler_length: 2,
            filter_offset: 0x0200_0001,
        };
        // Table order does not matter
        let decoded = decode(code, vec![clause(4), clause(2)]).unwrap();
        let markers = decoded.marker_map();
        assert_eq!(markers[&0], vec![ExceptionMarker::TryBegin]);
        assert!(matches!(markers[&2][0], ExceptionMarker::CatchBegin(_)));
        assert!(matches!(markers[&4][0], ExceptionMarker::CatchBegin(_)));
        assert_eq!(markers[&5], vec![ExceptionMarker::End]);
    }

    #[test]
    fn non_adjacent_handler_is_rejected() {
        let code = vec![0x00, 0x00, 0x00, 0x26, 0x00, 0x2A];
        let handlers = vec![ExceptionHandler {
            flags: ExceptionHandlerFlags::FINALLY,
            try_offset: 0,
            try_length: 2,
            handler_offset: 3,
            handler_length: 2,
            filter_offset: 0,
        }];
        assert!(matches!(
            decode(code, handlers),
            Err(Error::Decode { offset: 3, .. })
        ));
    }

    #[test]
    fn region_boundary_must_be_aligned() {
        // ldc.i4 0; ret  with a try ending inside ldc.i4
        let code = vec![0x20, 0x00, 0x00, 0x00, 0x00, 0x26, 0x2A];
        let handlers = vec![ExceptionHandler {
            flags: ExceptionHandlerFlags::FAULT,
            try_offset: 0,
            try_length: 2,
            handler_offset: 2,
            handler_length: 4,
            filter_offset: 0,
        }];
        assert!(matches!(decode(code, handlers), Err(Error::Decode { .. })));
    }

    #[test]
    fn decode_method_requires_il() {
        let mut builder = ModuleBuilder::new("Test");
        let ty = builder.add_type("", "T");
        let native = builder.add_native(
            ty,
            "N",
            MethodSig::new_static(TypeSig::Void, Vec::new()),
            |_| Ok(crate::emulation::Value::Void),
        );
        let module = builder.build().unwrap();
        let handle = MethodHandle::from_module(&module, native).unwrap();
        assert!(matches!(
            decode_method(&handle, &module, None),
            Err(Error::NotIl(_))
        ));
    }
}
