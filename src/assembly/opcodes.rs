//! The ECMA-335 Partition III opcode table.
//!
//! Every opcode carries its encoded value, mnemonic, operand kind, control flow type and
//! fixed stack effect. Opcodes with a variable stack effect (calls, `ret`, `newobj`) report
//! [`VARIABLE`] and are resolved from signatures by the stack analysis.
//!
//! Two-byte opcodes are represented by their full value (`0xFExx`).

use strum::{Display, EnumIter, IntoStaticStr};

/// Marker for a stack effect that depends on a signature.
pub const VARIABLE: u8 = u8::MAX;

/// Prefix byte of two-byte opcodes.
pub const PREFIX_FE: u8 = 0xFE;

/// The kind of inline operand an opcode takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    /// No operand present
    None,
    /// Signed 8-bit integer (`ldc.i4.s`)
    ShortInt,
    /// Unsigned 8-bit integer (`unaligned.`, `no.`)
    ShortUInt,
    /// Signed 32-bit integer
    Int,
    /// Signed 64-bit integer
    Long,
    /// 32-bit floating point
    ShortFloat,
    /// 64-bit floating point
    Float,
    /// 8-bit local or argument index
    ShortVar,
    /// 16-bit local or argument index
    Var,
    /// 8-bit signed branch displacement
    ShortBranch,
    /// 32-bit signed branch displacement
    Branch,
    /// Jump table of 32-bit displacements
    Switch,
    /// Method token
    Method,
    /// Field token
    Field,
    /// Type token
    Type,
    /// User string token
    String,
    /// Stand-alone signature token
    Signature,
    /// Type, method or field token (`ldtoken`)
    Token,
}

impl OperandKind {
    /// Encoded size of the operand in bytes, `None` for switch tables.
    #[must_use]
    pub fn size(self) -> Option<usize> {
        match self {
            OperandKind::None => Some(0),
            OperandKind::ShortInt
            | OperandKind::ShortUInt
            | OperandKind::ShortVar
            | OperandKind::ShortBranch => Some(1),
            OperandKind::Var => Some(2),
            OperandKind::Int
            | OperandKind::ShortFloat
            | OperandKind::Branch
            | OperandKind::Method
            | OperandKind::Field
            | OperandKind::Type
            | OperandKind::String
            | OperandKind::Signature
            | OperandKind::Token => Some(4),
            OperandKind::Long | OperandKind::Float => Some(8),
            OperandKind::Switch => None,
        }
    }

    /// Returns `true` for operands encoded as metadata tokens.
    #[must_use]
    pub fn is_token(self) -> bool {
        matches!(
            self,
            OperandKind::Method
                | OperandKind::Field
                | OperandKind::Type
                | OperandKind::String
                | OperandKind::Signature
                | OperandKind::Token
        )
    }
}

/// Control flow classification of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowType {
    /// Normal execution continues to next instruction
    Sequential,
    /// Conditional branch to another location
    ConditionalBranch,
    /// Always branches to another location (unconditional jump)
    UnconditionalBranch,
    /// Call to another method
    Call,
    /// Returns from current method
    Return,
    /// Multi-way branch (switch statement)
    Switch,
    /// Exception throwing
    Throw,
    /// End of finally or fault block
    EndFinally,
    /// End of filter block
    EndFilter,
    /// Leave protected region (try/catch/finally)
    Leave,
}

/// Fixed stack effect of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackBehavior {
    /// Number of items popped, or [`VARIABLE`]
    pub pops: u8,
    /// Number of items pushed, or [`VARIABLE`]
    pub pushes: u8,
}

impl StackBehavior {
    /// Returns `true` if either side depends on a signature.
    #[must_use]
    pub fn is_variable(self) -> bool {
        self.pops == VARIABLE || self.pushes == VARIABLE
    }
}

macro_rules! define_opcodes {
    ($( $variant:ident = $code:literal, $mnemonic:literal, $operand:ident, $flow:ident, $pops:expr, $pushes:expr; )*) => {
        /// A CIL opcode.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
        pub enum OpCode {
            $(
                #[doc = $mnemonic]
                #[strum(serialize = $mnemonic)]
                $variant,
            )*
        }

        impl OpCode {
            /// Encoded opcode value; two-byte opcodes include the `0xFE` prefix.
            #[must_use]
            pub const fn code(self) -> u16 {
                match self {
                    $( OpCode::$variant => $code, )*
                }
            }

            /// Look up an opcode by its encoded value.
            #[must_use]
            pub const fn from_code(code: u16) -> Option<OpCode> {
                match code {
                    $( $code => Some(OpCode::$variant), )*
                    _ => None,
                }
            }

            /// The inline operand kind.
            #[must_use]
            pub const fn operand_kind(self) -> OperandKind {
                match self {
                    $( OpCode::$variant => OperandKind::$operand, )*
                }
            }

            /// The control flow type.
            #[must_use]
            pub const fn flow(self) -> FlowType {
                match self {
                    $( OpCode::$variant => FlowType::$flow, )*
                }
            }

            /// The fixed stack effect.
            #[must_use]
            pub const fn stack(self) -> StackBehavior {
                match self {
                    $( OpCode::$variant => StackBehavior { pops: $pops, pushes: $pushes }, )*
                }
            }
        }
    };
}

const V: u8 = VARIABLE;

define_opcodes! {
    Nop = 0x00, "nop", None, Sequential, 0, 0;
    Break = 0x01, "break", None, Sequential, 0, 0;
    Ldarg0 = 0x02, "ldarg.0", None, Sequential, 0, 1;
    Ldarg1 = 0x03, "ldarg.1", None, Sequential, 0, 1;
    Ldarg2 = 0x04, "ldarg.2", None, Sequential, 0, 1;
    Ldarg3 = 0x05, "ldarg.3", None, Sequential, 0, 1;
    Ldloc0 = 0x06, "ldloc.0", None, Sequential, 0, 1;
    Ldloc1 = 0x07, "ldloc.1", None, Sequential, 0, 1;
    Ldloc2 = 0x08, "ldloc.2", None, Sequential, 0, 1;
    Ldloc3 = 0x09, "ldloc.3", None, Sequential, 0, 1;
    Stloc0 = 0x0A, "stloc.0", None, Sequential, 1, 0;
    Stloc1 = 0x0B, "stloc.1", None, Sequential, 1, 0;
    Stloc2 = 0x0C, "stloc.2", None, Sequential, 1, 0;
    Stloc3 = 0x0D, "stloc.3", None, Sequential, 1, 0;
    LdargS = 0x0E, "ldarg.s", ShortVar, Sequential, 0, 1;
    LdargaS = 0x0F, "ldarga.s", ShortVar, Sequential, 0, 1;
    StargS = 0x10, "starg.s", ShortVar, Sequential, 1, 0;
    LdlocS = 0x11, "ldloc.s", ShortVar, Sequential, 0, 1;
    LdlocaS = 0x12, "ldloca.s", ShortVar, Sequential, 0, 1;
    StlocS = 0x13, "stloc.s", ShortVar, Sequential, 1, 0;
    Ldnull = 0x14, "ldnull", None, Sequential, 0, 1;
    LdcI4M1 = 0x15, "ldc.i4.m1", None, Sequential, 0, 1;
    LdcI40 = 0x16, "ldc.i4.0", None, Sequential, 0, 1;
    LdcI41 = 0x17, "ldc.i4.1", None, Sequential, 0, 1;
    LdcI42 = 0x18, "ldc.i4.2", None, Sequential, 0, 1;
    LdcI43 = 0x19, "ldc.i4.3", None, Sequential, 0, 1;
    LdcI44 = 0x1A, "ldc.i4.4", None, Sequential, 0, 1;
    LdcI45 = 0x1B, "ldc.i4.5", None, Sequential, 0, 1;
    LdcI46 = 0x1C, "ldc.i4.6", None, Sequential, 0, 1;
    LdcI47 = 0x1D, "ldc.i4.7", None, Sequential, 0, 1;
    LdcI48 = 0x1E, "ldc.i4.8", None, Sequential, 0, 1;
    LdcI4S = 0x1F, "ldc.i4.s", ShortInt, Sequential, 0, 1;
    LdcI4 = 0x20, "ldc.i4", Int, Sequential, 0, 1;
    LdcI8 = 0x21, "ldc.i8", Long, Sequential, 0, 1;
    LdcR4 = 0x22, "ldc.r4", ShortFloat, Sequential, 0, 1;
    LdcR8 = 0x23, "ldc.r8", Float, Sequential, 0, 1;
    Dup = 0x25, "dup", None, Sequential, 1, 2;
    Pop = 0x26, "pop", None, Sequential, 1, 0;
    Jmp = 0x27, "jmp", Method, Return, 0, 0;
    Call = 0x28, "call", Method, Call, V, V;
    Calli = 0x29, "calli", Signature, Call, V, V;
    Ret = 0x2A, "ret", None, Return, V, 0;
    BrS = 0x2B, "br.s", ShortBranch, UnconditionalBranch, 0, 0;
    BrfalseS = 0x2C, "brfalse.s", ShortBranch, ConditionalBranch, 1, 0;
    BrtrueS = 0x2D, "brtrue.s", ShortBranch, ConditionalBranch, 1, 0;
    BeqS = 0x2E, "beq.s", ShortBranch, ConditionalBranch, 2, 0;
    BgeS = 0x2F, "bge.s", ShortBranch, ConditionalBranch, 2, 0;
    BgtS = 0x30, "bgt.s", ShortBranch, ConditionalBranch, 2, 0;
    BleS = 0x31, "ble.s", ShortBranch, ConditionalBranch, 2, 0;
    BltS = 0x32, "blt.s", ShortBranch, ConditionalBranch, 2, 0;
    BneUnS = 0x33, "bne.un.s", ShortBranch, ConditionalBranch, 2, 0;
    BgeUnS = 0x34, "bge.un.s", ShortBranch, ConditionalBranch, 2, 0;
    BgtUnS = 0x35, "bgt.un.s", ShortBranch, ConditionalBranch, 2, 0;
    BleUnS = 0x36, "ble.un.s", ShortBranch, ConditionalBranch, 2, 0;
    BltUnS = 0x37, "blt.un.s", ShortBranch, ConditionalBranch, 2, 0;
    Br = 0x38, "br", Branch, UnconditionalBranch, 0, 0;
    Brfalse = 0x39, "brfalse", Branch, ConditionalBranch, 1, 0;
    Brtrue = 0x3A, "brtrue", Branch, ConditionalBranch, 1, 0;
    Beq = 0x3B, "beq", Branch, ConditionalBranch, 2, 0;
    Bge = 0x3C, "bge", Branch, ConditionalBranch, 2, 0;
    Bgt = 0x3D, "bgt", Branch, ConditionalBranch, 2, 0;
    Ble = 0x3E, "ble", Branch, ConditionalBranch, 2, 0;
    Blt = 0x3F, "blt", Branch, ConditionalBranch, 2, 0;
    BneUn = 0x40, "bne.un", Branch, ConditionalBranch, 2, 0;
    BgeUn = 0x41, "bge.un", Branch, ConditionalBranch, 2, 0;
    BgtUn = 0x42, "bgt.un", Branch, ConditionalBranch, 2, 0;
    BleUn = 0x43, "ble.un", Branch, ConditionalBranch, 2, 0;
    BltUn = 0x44, "blt.un", Branch, ConditionalBranch, 2, 0;
    Switch = 0x45, "switch", Switch, Switch, 1, 0;
    LdindI1 = 0x46, "ldind.i1", None, Sequential, 1, 1;
    LdindU1 = 0x47, "ldind.u1", None, Sequential, 1, 1;
    LdindI2 = 0x48, "ldind.i2", None, Sequential, 1, 1;
    LdindU2 = 0x49, "ldind.u2", None, Sequential, 1, 1;
    LdindI4 = 0x4A, "ldind.i4", None, Sequential, 1, 1;
    LdindU4 = 0x4B, "ldind.u4", None, Sequential, 1, 1;
    LdindI8 = 0x4C, "ldind.i8", None, Sequential, 1, 1;
    LdindI = 0x4D, "ldind.i", None, Sequential, 1, 1;
    LdindR4 = 0x4E, "ldind.r4", None, Sequential, 1, 1;
    LdindR8 = 0x4F, "ldind.r8", None, Sequential, 1, 1;
    LdindRef = 0x50, "ldind.ref", None, Sequential, 1, 1;
    StindRef = 0x51, "stind.ref", None, Sequential, 2, 0;
    StindI1 = 0x52, "stind.i1", None, Sequential, 2, 0;
    StindI2 = 0x53, "stind.i2", None, Sequential, 2, 0;
    StindI4 = 0x54, "stind.i4", None, Sequential, 2, 0;
    StindI8 = 0x55, "stind.i8", None, Sequential, 2, 0;
    StindR4 = 0x56, "stind.r4", None, Sequential, 2, 0;
    StindR8 = 0x57, "stind.r8", None, Sequential, 2, 0;
    Add = 0x58, "add", None, Sequential, 2, 1;
    Sub = 0x59, "sub", None, Sequential, 2, 1;
    Mul = 0x5A, "mul", None, Sequential, 2, 1;
    Div = 0x5B, "div", None, Sequential, 2, 1;
    DivUn = 0x5C, "div.un", None, Sequential, 2, 1;
    Rem = 0x5D, "rem", None, Sequential, 2, 1;
    RemUn = 0x5E, "rem.un", None, Sequential, 2, 1;
    And = 0x5F, "and", None, Sequential, 2, 1;
    Or = 0x60, "or", None, Sequential, 2, 1;
    Xor = 0x61, "xor", None, Sequential, 2, 1;
    Shl = 0x62, "shl", None, Sequential, 2, 1;
    Shr = 0x63, "shr", None, Sequential, 2, 1;
    ShrUn = 0x64, "shr.un", None, Sequential, 2, 1;
    Neg = 0x65, "neg", None, Sequential, 1, 1;
    Not = 0x66, "not", None, Sequential, 1, 1;
    ConvI1 = 0x67, "conv.i1", None, Sequential, 1, 1;
    ConvI2 = 0x68, "conv.i2", None, Sequential, 1, 1;
    ConvI4 = 0x69, "conv.i4", None, Sequential, 1, 1;
    ConvI8 = 0x6A, "conv.i8", None, Sequential, 1, 1;
    ConvR4 = 0x6B, "conv.r4", None, Sequential, 1, 1;
    ConvR8 = 0x6C, "conv.r8", None, Sequential, 1, 1;
    ConvU4 = 0x6D, "conv.u4", None, Sequential, 1, 1;
    ConvU8 = 0x6E, "conv.u8", None, Sequential, 1, 1;
    Callvirt = 0x6F, "callvirt", Method, Call, V, V;
    Cpobj = 0x70, "cpobj", Type, Sequential, 2, 0;
    Ldobj = 0x71, "ldobj", Type, Sequential, 1, 1;
    Ldstr = 0x72, "ldstr", String, Sequential, 0, 1;
    Newobj = 0x73, "newobj", Method, Call, V, 1;
    Castclass = 0x74, "castclass", Type, Sequential, 1, 1;
    Isinst = 0x75, "isinst", Type, Sequential, 1, 1;
    ConvRUn = 0x76, "conv.r.un", None, Sequential, 1, 1;
    Unbox = 0x79, "unbox", Type, Sequential, 1, 1;
    Throw = 0x7A, "throw", None, Throw, 1, 0;
    Ldfld = 0x7B, "ldfld", Field, Sequential, 1, 1;
    Ldflda = 0x7C, "ldflda", Field, Sequential, 1, 1;
    Stfld = 0x7D, "stfld", Field, Sequential, 2, 0;
    Ldsfld = 0x7E, "ldsfld", Field, Sequential, 0, 1;
    Ldsflda = 0x7F, "ldsflda", Field, Sequential, 0, 1;
    Stsfld = 0x80, "stsfld", Field, Sequential, 1, 0;
    Stobj = 0x81, "stobj", Type, Sequential, 2, 0;
    ConvOvfI1Un = 0x82, "conv.ovf.i1.un", None, Sequential, 1, 1;
    ConvOvfI2Un = 0x83, "conv.ovf.i2.un", None, Sequential, 1, 1;
    ConvOvfI4Un = 0x84, "conv.ovf.i4.un", None, Sequential, 1, 1;
    ConvOvfI8Un = 0x85, "conv.ovf.i8.un", None, Sequential, 1, 1;
    ConvOvfU1Un = 0x86, "conv.ovf.u1.un", None, Sequential, 1, 1;
    ConvOvfU2Un = 0x87, "conv.ovf.u2.un", None, Sequential, 1, 1;
    ConvOvfU4Un = 0x88, "conv.ovf.u4.un", None, Sequential, 1, 1;
    ConvOvfU8Un = 0x89, "conv.ovf.u8.un", None, Sequential, 1, 1;
    ConvOvfIUn = 0x8A, "conv.ovf.i.un", None, Sequential, 1, 1;
    ConvOvfUUn = 0x8B, "conv.ovf.u.un", None, Sequential, 1, 1;
    Box = 0x8C, "box", Type, Sequential, 1, 1;
    Newarr = 0x8D, "newarr", Type, Sequential, 1, 1;
    Ldlen = 0x8E, "ldlen", None, Sequential, 1, 1;
    Ldelema = 0x8F, "ldelema", Type, Sequential, 2, 1;
    LdelemI1 = 0x90, "ldelem.i1", None, Sequential, 2, 1;
    LdelemU1 = 0x91, "ldelem.u1", None, Sequential, 2, 1;
    LdelemI2 = 0x92, "ldelem.i2", None, Sequential, 2, 1;
    LdelemU2 = 0x93, "ldelem.u2", None, Sequential, 2, 1;
    LdelemI4 = 0x94, "ldelem.i4", None, Sequential, 2, 1;
    LdelemU4 = 0x95, "ldelem.u4", None, Sequential, 2, 1;
    LdelemI8 = 0x96, "ldelem.i8", None, Sequential, 2, 1;
    LdelemI = 0x97, "ldelem.i", None, Sequential, 2, 1;
    LdelemR4 = 0x98, "ldelem.r4", None, Sequential, 2, 1;
    LdelemR8 = 0x99, "ldelem.r8", None, Sequential, 2, 1;
    LdelemRef = 0x9A, "ldelem.ref", None, Sequential, 2, 1;
    StelemI = 0x9B, "stelem.i", None, Sequential, 3, 0;
    StelemI1 = 0x9C, "stelem.i1", None, Sequential, 3, 0;
    StelemI2 = 0x9D, "stelem.i2", None, Sequential, 3, 0;
    StelemI4 = 0x9E, "stelem.i4", None, Sequential, 3, 0;
    StelemI8 = 0x9F, "stelem.i8", None, Sequential, 3, 0;
    StelemR4 = 0xA0, "stelem.r4", None, Sequential, 3, 0;
    StelemR8 = 0xA1, "stelem.r8", None, Sequential, 3, 0;
    StelemRef = 0xA2, "stelem.ref", None, Sequential, 3, 0;
    Ldelem = 0xA3, "ldelem", Type, Sequential, 2, 1;
    Stelem = 0xA4, "stelem", Type, Sequential, 3, 0;
    UnboxAny = 0xA5, "unbox.any", Type, Sequential, 1, 1;
    ConvOvfI1 = 0xB3, "conv.ovf.i1", None, Sequential, 1, 1;
    ConvOvfU1 = 0xB4, "conv.ovf.u1", None, Sequential, 1, 1;
    ConvOvfI2 = 0xB5, "conv.ovf.i2", None, Sequential, 1, 1;
    ConvOvfU2 = 0xB6, "conv.ovf.u2", None, Sequential, 1, 1;
    ConvOvfI4 = 0xB7, "conv.ovf.i4", None, Sequential, 1, 1;
    ConvOvfU4 = 0xB8, "conv.ovf.u4", None, Sequential, 1, 1;
    ConvOvfI8 = 0xB9, "conv.ovf.i8", None, Sequential, 1, 1;
    ConvOvfU8 = 0xBA, "conv.ovf.u8", None, Sequential, 1, 1;
    Refanyval = 0xC2, "refanyval", Type, Sequential, 1, 1;
    Ckfinite = 0xC3, "ckfinite", None, Sequential, 1, 1;
    Mkrefany = 0xC6, "mkrefany", Type, Sequential, 1, 1;
    Ldtoken = 0xD0, "ldtoken", Token, Sequential, 0, 1;
    ConvU2 = 0xD1, "conv.u2", None, Sequential, 1, 1;
    ConvU1 = 0xD2, "conv.u1", None, Sequential, 1, 1;
    ConvI = 0xD3, "conv.i", None, Sequential, 1, 1;
    ConvOvfI = 0xD4, "conv.ovf.i", None, Sequential, 1, 1;
    ConvOvfU = 0xD5, "conv.ovf.u", None, Sequential, 1, 1;
    AddOvf = 0xD6, "add.ovf", None, Sequential, 2, 1;
    AddOvfUn = 0xD7, "add.ovf.un", None, Sequential, 2, 1;
    MulOvf = 0xD8, "mul.ovf", None, Sequential, 2, 1;
    MulOvfUn = 0xD9, "mul.ovf.un", None, Sequential, 2, 1;
    SubOvf = 0xDA, "sub.ovf", None, Sequential, 2, 1;
    SubOvfUn = 0xDB, "sub.ovf.un", None, Sequential, 2, 1;
    Endfinally = 0xDC, "endfinally", None, EndFinally, 0, 0;
    Leave = 0xDD, "leave", Branch, Leave, 0, 0;
    LeaveS = 0xDE, "leave.s", ShortBranch, Leave, 0, 0;
    StindI = 0xDF, "stind.i", None, Sequential, 2, 0;
    ConvU = 0xE0, "conv.u", None, Sequential, 1, 1;
    Arglist = 0xFE00, "arglist", None, Sequential, 0, 1;
    Ceq = 0xFE01, "ceq", None, Sequential, 2, 1;
    Cgt = 0xFE02, "cgt", None, Sequential, 2, 1;
    CgtUn = 0xFE03, "cgt.un", None, Sequential, 2, 1;
    Clt = 0xFE04, "clt", None, Sequential, 2, 1;
    CltUn = 0xFE05, "clt.un", None, Sequential, 2, 1;
    Ldftn = 0xFE06, "ldftn", Method, Sequential, 0, 1;
    Ldvirtftn = 0xFE07, "ldvirtftn", Method, Sequential, 1, 1;
    Ldarg = 0xFE09, "ldarg", Var, Sequential, 0, 1;
    Ldarga = 0xFE0A, "ldarga", Var, Sequential, 0, 1;
    Starg = 0xFE0B, "starg", Var, Sequential, 1, 0;
    Ldloc = 0xFE0C, "ldloc", Var, Sequential, 0, 1;
    Ldloca = 0xFE0D, "ldloca", Var, Sequential, 0, 1;
    Stloc = 0xFE0E, "stloc", Var, Sequential, 1, 0;
    Localloc = 0xFE0F, "localloc", None, Sequential, 1, 1;
    Endfilter = 0xFE11, "endfilter", None, EndFilter, 1, 0;
    Unaligned = 0xFE12, "unaligned.", ShortUInt, Sequential, 0, 0;
    Volatile = 0xFE13, "volatile.", None, Sequential, 0, 0;
    Tail = 0xFE14, "tail.", None, Sequential, 0, 0;
    Initobj = 0xFE15, "initobj", Type, Sequential, 1, 0;
    Constrained = 0xFE16, "constrained.", Type, Sequential, 0, 0;
    Cpblk = 0xFE17, "cpblk", None, Sequential, 3, 0;
    Initblk = 0xFE18, "initblk", None, Sequential, 3, 0;
    No = 0xFE19, "no.", ShortUInt, Sequential, 0, 0;
    Rethrow = 0xFE1A, "rethrow", None, Throw, 0, 0;
    Sizeof = 0xFE1C, "sizeof", Type, Sequential, 0, 1;
    Refanytype = 0xFE1D, "refanytype", None, Sequential, 1, 1;
    Readonly = 0xFE1E, "readonly.", None, Sequential, 0, 0;
}

impl OpCode {
    /// The opcode's mnemonic, as written in IL assembly.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.into()
    }

    /// Number of bytes the opcode itself occupies.
    #[must_use]
    pub fn size(self) -> usize {
        if self.code() > 0xFF {
            2
        } else {
            1
        }
    }

    /// Returns `true` for opcodes whose operand is a branch target.
    #[must_use]
    pub fn is_branch(self) -> bool {
        matches!(
            self.operand_kind(),
            OperandKind::ShortBranch | OperandKind::Branch
        )
    }

    /// Returns `true` for opcodes whose variable operand is an argument index.
    #[must_use]
    pub fn uses_argument(self) -> bool {
        matches!(
            self,
            OpCode::LdargS | OpCode::LdargaS | OpCode::StargS | OpCode::Ldarg | OpCode::Ldarga | OpCode::Starg
        )
    }

    /// The long form of a short opcode (`br.s` to `br`, `ldloc.s` to `ldloc`, ...).
    #[must_use]
    pub fn long_form(self) -> Option<OpCode> {
        let long = match self {
            OpCode::LdargS => OpCode::Ldarg,
            OpCode::LdargaS => OpCode::Ldarga,
            OpCode::StargS => OpCode::Starg,
            OpCode::LdlocS => OpCode::Ldloc,
            OpCode::LdlocaS => OpCode::Ldloca,
            OpCode::StlocS => OpCode::Stloc,
            OpCode::LdcI4S => OpCode::LdcI4,
            OpCode::LeaveS => OpCode::Leave,
            // br.s .. blt.un.s and br .. blt.un are laid out in the same order
            short if (OpCode::BrS.code()..=OpCode::BltUnS.code()).contains(&short.code()) => {
                return OpCode::from_code(short.code() + 0x0D)
            }
            _ => return None,
        };
        Some(long)
    }

    /// The short form of a long opcode, the inverse of [`OpCode::long_form`].
    #[must_use]
    pub fn short_form(self) -> Option<OpCode> {
        let short = match self {
            OpCode::Ldarg => OpCode::LdargS,
            OpCode::Ldarga => OpCode::LdargaS,
            OpCode::Starg => OpCode::StargS,
            OpCode::Ldloc => OpCode::LdlocS,
            OpCode::Ldloca => OpCode::LdlocaS,
            OpCode::Stloc => OpCode::StlocS,
            OpCode::LdcI4 => OpCode::LdcI4S,
            OpCode::Leave => OpCode::LeaveS,
            long if (OpCode::Br.code()..=OpCode::BltUn.code()).contains(&long.code()) => {
                return OpCode::from_code(long.code() - 0x0D)
            }
            _ => return None,
        };
        Some(short)
    }
}
