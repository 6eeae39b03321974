//! Editable instruction model.
//!
//! Decoded method bodies are represented as a flat `Vec<Instruction>` in which control flow
//! no longer depends on byte offsets:
//!
//! - branch and switch operands reference [`Label`]s, and each label is declared by exactly
//!   one instruction (the branch target);
//! - protected regions are described by [`ExceptionMarker`]s attached to the instructions at
//!   their boundaries.
//!
//! Transpilers can therefore insert, remove and replace instructions freely. The encoder
//! assigns offsets again and resolves labels and markers at the end of a build.
//!
//! # Marker Semantics
//!
//! Begin markers take effect before the instruction they are attached to; [`ExceptionMarker::End`]
//! takes effect after it. A region is opened by [`ExceptionMarker::TryBegin`], each handler starts
//! with its handler-begin marker (which implicitly closes the try block or the previous handler),
//! and one `End` on the last instruction of the final handler closes the whole region.
//!
//! ```text
//! [TryBegin]        ldarg.0
//!                   call  Foo
//!                   leave L1
//! [CatchBegin(T)]   pop
//!                   leave L1        [End]
//! L1:               ret
//! ```
//!
//! # Thread Safety
//!
//! All types in this module are [`Send`] and [`Sync`]; instruction sequences are owned
//! by one build at a time.

use std::{fmt, sync::Arc};

use crate::{
    assembly::opcodes::{FlowType, OpCode, OperandKind},
    metadata::{signatures::StandAloneSig, token::Token},
    Error, Result,
};

/// A branch target identity that does not depend on byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Hands out unique labels for one build.
#[derive(Debug, Clone, Default)]
pub struct LabelAllocator {
    next: u32,
}

impl LabelAllocator {
    /// Create an allocator starting at label 0.
    #[must_use]
    pub fn new() -> Self {
        LabelAllocator { next: 0 }
    }

    /// Create an allocator that continues after every label in `instructions`.
    #[must_use]
    pub fn after(instructions: &[Instruction]) -> Self {
        let next = instructions
            .iter()
            .flat_map(|instruction| {
                instruction
                    .labels
                    .iter()
                    .copied()
                    .chain(instruction.branch_targets())
            })
            .map(|label| label.0.saturating_add(1))
            .max()
            .unwrap_or(0);
        LabelAllocator { next }
    }

    /// Allocate a fresh label.
    pub fn define(&mut self) -> Label {
        let label = Label(self.next);
        self.next = self.next.saturating_add(1);
        label
    }

    /// Number of labels handed out so far.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.next
    }
}

/// Boundary of a protected region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionMarker {
    /// Opens a region; the try block starts at this instruction
    TryBegin,
    /// Starts a typed catch handler
    CatchBegin(Token),
    /// Starts the filter block of a filter clause
    FilterBegin,
    /// Starts the handler block that follows a filter block
    FilterHandlerBegin,
    /// Starts a finally handler
    FinallyBegin,
    /// Starts a fault handler
    FaultBegin,
    /// Closes the region after this instruction
    End,
}

impl ExceptionMarker {
    /// Returns `true` for markers that start a handler of the innermost open region.
    #[must_use]
    pub fn is_handler_begin(self) -> bool {
        matches!(
            self,
            ExceptionMarker::CatchBegin(_)
                | ExceptionMarker::FilterBegin
                | ExceptionMarker::FinallyBegin
                | ExceptionMarker::FaultBegin
        )
    }
}

impl fmt::Display for ExceptionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExceptionMarker::TryBegin => write!(f, ".try"),
            ExceptionMarker::CatchBegin(token) => write!(f, "catch {token}"),
            ExceptionMarker::FilterBegin => write!(f, "filter"),
            ExceptionMarker::FilterHandlerBegin => write!(f, "handler"),
            ExceptionMarker::FinallyBegin => write!(f, "finally"),
            ExceptionMarker::FaultBegin => write!(f, "fault"),
            ExceptionMarker::End => write!(f, "end"),
        }
    }
}

/// The operand of an instruction.
///
/// Token operands carry the entity they resolved to (module tokens for methods, fields and
/// types; the content for strings and signatures), never the raw token of the body they
/// were read from.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand present
    None,
    /// 8-bit or 32-bit integer constant
    Int32(i32),
    /// 64-bit integer constant
    Int64(i64),
    /// 32-bit float constant
    Float32(f32),
    /// 64-bit float constant
    Float64(f64),
    /// User string content
    String(Arc<str>),
    /// Type definition
    Type(Token),
    /// Method definition
    Method(Token),
    /// Field definition
    Field(Token),
    /// Local variable slot
    Local(u16),
    /// Argument slot
    Argument(u16),
    /// Branch target
    Label(Label),
    /// Switch jump table
    Switch(Vec<Label>),
    /// Stand-alone signature
    Signature(Arc<StandAloneSig>),
}

impl Operand {
    /// Returns `true` if this operand is valid for an opcode.
    #[must_use]
    pub fn fits(&self, opcode: OpCode) -> bool {
        match (opcode.operand_kind(), self) {
            (OperandKind::None, Operand::None)
            | (OperandKind::ShortInt | OperandKind::Int | OperandKind::ShortUInt, Operand::Int32(_))
            | (OperandKind::Long, Operand::Int64(_))
            | (OperandKind::ShortFloat, Operand::Float32(_))
            | (OperandKind::Float, Operand::Float64(_))
            | (OperandKind::ShortBranch | OperandKind::Branch, Operand::Label(_))
            | (OperandKind::Switch, Operand::Switch(_))
            | (OperandKind::Method, Operand::Method(_))
            | (OperandKind::Field, Operand::Field(_))
            | (OperandKind::Type, Operand::Type(_))
            | (OperandKind::String, Operand::String(_))
            | (OperandKind::Signature, Operand::Signature(_))
            | (OperandKind::Token, Operand::Type(_) | Operand::Method(_) | Operand::Field(_)) => {
                true
            }
            (OperandKind::ShortVar | OperandKind::Var, Operand::Argument(_)) => {
                opcode.uses_argument()
            }
            (OperandKind::ShortVar | OperandKind::Var, Operand::Local(_)) => {
                !opcode.uses_argument()
            }
            _ => false,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Int32(value) => write!(f, "{value}"),
            Operand::Int64(value) => write!(f, "{value}"),
            Operand::Float32(value) => write!(f, "{value}"),
            Operand::Float64(value) => write!(f, "{value}"),
            Operand::String(value) => write!(f, "{value:?}"),
            Operand::Type(token) | Operand::Method(token) | Operand::Field(token) => {
                write!(f, "{token}")
            }
            Operand::Local(index) => write!(f, "V_{index}"),
            Operand::Argument(index) => write!(f, "A_{index}"),
            Operand::Label(label) => write!(f, "{label}"),
            Operand::Switch(labels) => {
                write!(f, "(")?;
                for (i, label) in labels.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{label}")?;
                }
                write!(f, ")")
            }
            Operand::Signature(sig) => write!(f, "{sig:?}"),
        }
    }
}

/// One operation of a method body.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The opcode
    pub opcode: OpCode,
    /// The operand, matching the opcode's operand kind
    pub operand: Operand,
    /// Offset in the original body, `None` for synthesized instructions
    pub offset: Option<u32>,
    /// Labels declared by this instruction
    pub labels: Vec<Label>,
    /// Region boundaries attached to this instruction
    pub blocks: Vec<ExceptionMarker>,
}

impl Instruction {
    /// Create an instruction, checking the operand against the opcode.
    ///
    /// # Errors
    /// Returns [`Error::InvalidOperand`] if the operand does not fit the opcode.
    pub fn new(opcode: OpCode, operand: Operand) -> Result<Self> {
        if !operand.fits(opcode) {
            return Err(Error::InvalidOperand {
                mnemonic: opcode.mnemonic(),
                expected: opcode.operand_kind(),
            });
        }

        Ok(Instruction {
            opcode,
            operand,
            offset: None,
            labels: Vec::new(),
            blocks: Vec::new(),
        })
    }

    /// An instruction without operand. The operand is checked again by the encoder, so
    /// using this with an opcode that needs one fails the build.
    #[must_use]
    pub fn simple(opcode: OpCode) -> Self {
        Instruction {
            opcode,
            operand: Operand::None,
            offset: None,
            labels: Vec::new(),
            blocks: Vec::new(),
        }
    }

    fn unchecked(opcode: OpCode, operand: Operand) -> Self {
        Instruction {
            operand,
            ..Self::simple(opcode)
        }
    }

    /// `nop`
    #[must_use]
    pub fn nop() -> Self {
        Self::simple(OpCode::Nop)
    }

    /// `ret`
    #[must_use]
    pub fn ret() -> Self {
        Self::simple(OpCode::Ret)
    }

    /// Load argument `index`, using the shortest form.
    #[must_use]
    pub fn ldarg(index: u16) -> Self {
        match index {
            0 => Self::simple(OpCode::Ldarg0),
            1 => Self::simple(OpCode::Ldarg1),
            2 => Self::simple(OpCode::Ldarg2),
            3 => Self::simple(OpCode::Ldarg3),
            4..=255 => Self::unchecked(OpCode::LdargS, Operand::Argument(index)),
            _ => Self::unchecked(OpCode::Ldarg, Operand::Argument(index)),
        }
    }

    /// Load the address of argument `index`.
    #[must_use]
    pub fn ldarga(index: u16) -> Self {
        if index <= 255 {
            Self::unchecked(OpCode::LdargaS, Operand::Argument(index))
        } else {
            Self::unchecked(OpCode::Ldarga, Operand::Argument(index))
        }
    }

    /// Store into argument `index`.
    #[must_use]
    pub fn starg(index: u16) -> Self {
        if index <= 255 {
            Self::unchecked(OpCode::StargS, Operand::Argument(index))
        } else {
            Self::unchecked(OpCode::Starg, Operand::Argument(index))
        }
    }

    /// Load local `index`, using the shortest form.
    #[must_use]
    pub fn ldloc(index: u16) -> Self {
        match index {
            0 => Self::simple(OpCode::Ldloc0),
            1 => Self::simple(OpCode::Ldloc1),
            2 => Self::simple(OpCode::Ldloc2),
            3 => Self::simple(OpCode::Ldloc3),
            4..=255 => Self::unchecked(OpCode::LdlocS, Operand::Local(index)),
            _ => Self::unchecked(OpCode::Ldloc, Operand::Local(index)),
        }
    }

    /// Load the address of local `index`.
    #[must_use]
    pub fn ldloca(index: u16) -> Self {
        if index <= 255 {
            Self::unchecked(OpCode::LdlocaS, Operand::Local(index))
        } else {
            Self::unchecked(OpCode::Ldloca, Operand::Local(index))
        }
    }

    /// Store into local `index`, using the shortest form.
    #[must_use]
    pub fn stloc(index: u16) -> Self {
        match index {
            0 => Self::simple(OpCode::Stloc0),
            1 => Self::simple(OpCode::Stloc1),
            2 => Self::simple(OpCode::Stloc2),
            3 => Self::simple(OpCode::Stloc3),
            4..=255 => Self::unchecked(OpCode::StlocS, Operand::Local(index)),
            _ => Self::unchecked(OpCode::Stloc, Operand::Local(index)),
        }
    }

    /// Load a 32-bit constant, using the shortest form.
    #[must_use]
    pub fn ldc_i4(value: i32) -> Self {
        match value {
            -1 => Self::simple(OpCode::LdcI4M1),
            0 => Self::simple(OpCode::LdcI40),
            1 => Self::simple(OpCode::LdcI41),
            2 => Self::simple(OpCode::LdcI42),
            3 => Self::simple(OpCode::LdcI43),
            4 => Self::simple(OpCode::LdcI44),
            5 => Self::simple(OpCode::LdcI45),
            6 => Self::simple(OpCode::LdcI46),
            7 => Self::simple(OpCode::LdcI47),
            8 => Self::simple(OpCode::LdcI48),
            -128..=127 => Self::unchecked(OpCode::LdcI4S, Operand::Int32(value)),
            _ => Self::unchecked(OpCode::LdcI4, Operand::Int32(value)),
        }
    }

    /// `ldstr`
    #[must_use]
    pub fn ldstr(value: &str) -> Self {
        Self::unchecked(OpCode::Ldstr, Operand::String(Arc::from(value)))
    }

    /// `call` a method.
    #[must_use]
    pub fn call(method: Token) -> Self {
        Self::unchecked(OpCode::Call, Operand::Method(method))
    }

    /// A branch to `target`. Short and long forms are interchangeable; the encoder picks
    /// the width.
    ///
    /// # Errors
    /// Returns [`Error::InvalidOperand`] if `opcode` is not a branch.
    pub fn branch(opcode: OpCode, target: Label) -> Result<Self> {
        Self::new(opcode, Operand::Label(target))
    }

    /// Unconditional branch to `target`.
    #[must_use]
    pub fn br(target: Label) -> Self {
        Self::unchecked(OpCode::Br, Operand::Label(target))
    }

    /// Leave a protected region towards `target`.
    #[must_use]
    pub fn leave(target: Label) -> Self {
        Self::unchecked(OpCode::Leave, Operand::Label(target))
    }

    /// Declare `label` on this instruction.
    #[must_use]
    pub fn with_label(mut self, label: Label) -> Self {
        self.labels.push(label);
        self
    }

    /// Attach a region marker to this instruction.
    #[must_use]
    pub fn with_block(mut self, marker: ExceptionMarker) -> Self {
        self.blocks.push(marker);
        self
    }

    /// Returns `true` for the `ldloc` family.
    #[must_use]
    pub fn is_local_load(&self) -> bool {
        matches!(
            self.opcode,
            OpCode::Ldloc0
                | OpCode::Ldloc1
                | OpCode::Ldloc2
                | OpCode::Ldloc3
                | OpCode::LdlocS
                | OpCode::Ldloc
        )
    }

    /// Returns `true` for the `stloc` family.
    #[must_use]
    pub fn is_local_store(&self) -> bool {
        matches!(
            self.opcode,
            OpCode::Stloc0
                | OpCode::Stloc1
                | OpCode::Stloc2
                | OpCode::Stloc3
                | OpCode::StlocS
                | OpCode::Stloc
        )
    }

    /// The local slot a local load, store or address instruction refers to.
    #[must_use]
    pub fn local_index(&self) -> Option<u16> {
        match (self.opcode, &self.operand) {
            (OpCode::Ldloc0 | OpCode::Stloc0, _) => Some(0),
            (OpCode::Ldloc1 | OpCode::Stloc1, _) => Some(1),
            (OpCode::Ldloc2 | OpCode::Stloc2, _) => Some(2),
            (OpCode::Ldloc3 | OpCode::Stloc3, _) => Some(3),
            (_, Operand::Local(index)) => Some(*index),
            _ => None,
        }
    }

    /// The argument slot an argument instruction refers to.
    #[must_use]
    pub fn argument_index(&self) -> Option<u16> {
        match (self.opcode, &self.operand) {
            (OpCode::Ldarg0, _) => Some(0),
            (OpCode::Ldarg1, _) => Some(1),
            (OpCode::Ldarg2, _) => Some(2),
            (OpCode::Ldarg3, _) => Some(3),
            (_, Operand::Argument(index)) => Some(*index),
            _ => None,
        }
    }

    /// Labels this instruction may transfer control to.
    #[must_use]
    pub fn branch_targets(&self) -> Vec<Label> {
        match &self.operand {
            Operand::Label(label) => vec![*label],
            Operand::Switch(labels) => labels.clone(),
            _ => Vec::new(),
        }
    }

    /// The constant pushed by an `ldc.i4` family instruction.
    #[must_use]
    pub fn int_constant(&self) -> Option<i32> {
        let code = self.opcode.code();
        if (OpCode::LdcI4M1.code()..=OpCode::LdcI48.code()).contains(&code) {
            return Some(i32::from(code) - i32::from(OpCode::LdcI40.code()));
        }
        match (self.opcode, &self.operand) {
            (OpCode::LdcI4S | OpCode::LdcI4, Operand::Int32(value)) => Some(*value),
            _ => None,
        }
    }

    /// Returns `true` if execution never falls through to the next instruction.
    #[must_use]
    pub fn ends_block(&self) -> bool {
        matches!(
            self.opcode.flow(),
            FlowType::UnconditionalBranch
                | FlowType::Return
                | FlowType::Throw
                | FlowType::EndFinally
                | FlowType::EndFilter
                | FlowType::Leave
        )
    }

    /// Move this instruction's labels onto `other`, so branches now land there.
    pub fn move_labels_to(&mut self, other: &mut Instruction) {
        other.labels.append(&mut self.labels);
    }

    /// Move this instruction's region markers onto `other`.
    pub fn move_blocks_to(&mut self, other: &mut Instruction) {
        other.blocks.append(&mut self.blocks);
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for marker in self.blocks.iter().filter(|m| **m != ExceptionMarker::End) {
            write!(f, "[{marker}] ")?;
        }
        match self.offset {
            Some(offset) => write!(f, "IL_{offset:04X}: ")?,
            None => write!(f, "IL_????: ")?,
        }
        for label in &self.labels {
            write!(f, "{label}: ")?;
        }
        write!(f, "{}", self.opcode)?;
        if self.operand != Operand::None {
            write!(f, " {}", self.operand)?;
        }
        for _ in self.blocks.iter().filter(|m| **m == ExceptionMarker::End) {
            write!(f, " [end]")?;
        }
        Ok(())
    }
}

/// Render a listing of `instructions`, one per line.
#[must_use]
pub fn listing(instructions: &[Instruction]) -> String {
    let mut out = String::new();
    for instruction in instructions {
        out.push_str(&instruction.to_string());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_checks_operand() {
        assert!(Instruction::new(OpCode::Call, Operand::Method(Token(0x0600_0001))).is_ok());
        assert!(matches!(
            Instruction::new(OpCode::Call, Operand::Field(Token(0x0400_0001))),
            Err(Error::InvalidOperand { mnemonic: "call", .. })
        ));
        assert!(Instruction::new(OpCode::LdlocS, Operand::Argument(1)).is_err());
        assert!(Instruction::new(OpCode::LdargS, Operand::Argument(1)).is_ok());
        assert!(Instruction::new(OpCode::Ldtoken, Operand::Field(Token(0x0400_0001))).is_ok());
        assert!(Instruction::branch(OpCode::Add, Label(0)).is_err());
    }

    #[test]
    fn shortest_forms() {
        assert_eq!(Instruction::ldloc(2).opcode, OpCode::Ldloc2);
        assert_eq!(Instruction::ldloc(40).opcode, OpCode::LdlocS);
        assert_eq!(Instruction::ldloc(300).opcode, OpCode::Ldloc);
        assert_eq!(Instruction::stloc(3).local_index(), Some(3));
        assert_eq!(Instruction::stloc(17).local_index(), Some(17));
        assert_eq!(Instruction::ldarg(1).argument_index(), Some(1));
        assert_eq!(Instruction::ldc_i4(-1).int_constant(), Some(-1));
        assert_eq!(Instruction::ldc_i4(8).int_constant(), Some(8));
        assert_eq!(Instruction::ldc_i4(100).opcode, OpCode::LdcI4S);
        assert_eq!(Instruction::ldc_i4(1000).int_constant(), Some(1000));
        assert!(Instruction::ldloc(0).is_local_load());
        assert!(Instruction::stloc(300).is_local_store());
    }

    #[test]
    fn move_labels_and_blocks() {
        let mut old = Instruction::ret()
            .with_label(Label(4))
            .with_block(ExceptionMarker::End);
        let mut new = Instruction::nop();
        old.move_labels_to(&mut new);
        old.move_blocks_to(&mut new);

        assert!(old.labels.is_empty());
        assert!(old.blocks.is_empty());
        assert_eq!(new.labels, vec![Label(4)]);
        assert_eq!(new.blocks, vec![ExceptionMarker::End]);
    }

    #[test]
    fn allocator_continues_after_existing() {
        let instructions = vec![
            Instruction::br(Label(7)),
            Instruction::ret().with_label(Label(2)),
        ];
        let mut labels = LabelAllocator::after(&instructions);
        assert_eq!(labels.define(), Label(8));
        assert_eq!(labels.count(), 9);
    }

    #[test]
    fn display() {
        let mut instruction = Instruction::br(Label(3)).with_label(Label(1));
        instruction.offset = Some(0x10);
        assert_eq!(instruction.to_string(), "IL_0010: L1: br L3");

        let guarded = Instruction::ldstr("x")
            .with_block(ExceptionMarker::TryBegin)
            .with_block(ExceptionMarker::End);
        assert_eq!(guarded.to_string(), "[.try] IL_????: ldstr \"x\" [end]");
        assert!(Instruction::leave(Label(0)).ends_block());
        assert!(!Instruction::nop().ends_block());
    }
}
