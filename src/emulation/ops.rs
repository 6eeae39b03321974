//! Arithmetic, comparison and conversion on stack values.

use crate::{
    assembly::OpCode,
    emulation::{EmulationError, Value},
};

type OpResult = std::result::Result<Value, EmulationError>;

/// Operand pair after CLI binary numeric promotion.
enum Pair {
    I4(i32, i32),
    I8(i64, i64),
    F64(f64, f64),
}

fn promote(operation: &'static str, left: &Value, right: &Value) -> Result<Pair, EmulationError> {
    match (left, right) {
        (Value::I4(a), Value::I4(b)) => Ok(Pair::I4(*a, *b)),
        (Value::I8(a), Value::I8(b)) => Ok(Pair::I8(*a, *b)),
        (Value::I4(a), Value::I8(b)) => Ok(Pair::I8(i64::from(*a), *b)),
        (Value::I8(a), Value::I4(b)) => Ok(Pair::I8(*a, i64::from(*b))),
        (Value::F64(a), Value::F64(b)) => Ok(Pair::F64(*a, *b)),
        (Value::I4(_) | Value::I8(_) | Value::F64(_), other) | (other, _) => {
            Err(EmulationError::TypeMismatch {
                operation,
                found: other.kind(),
            })
        }
    }
}

fn overflow<T>(value: Option<T>) -> Result<T, EmulationError> {
    value.ok_or(EmulationError::ArithmeticOverflow)
}

/// Apply a binary arithmetic or bitwise opcode.
#[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
pub fn binary(opcode: OpCode, left: &Value, right: &Value) -> OpResult {
    let pair = promote(opcode.mnemonic(), left, right)?;

    let value = match (opcode, pair) {
        (OpCode::Add, Pair::I4(a, b)) => Value::I4(a.wrapping_add(b)),
        (OpCode::Add, Pair::I8(a, b)) => Value::I8(a.wrapping_add(b)),
        (OpCode::Add, Pair::F64(a, b)) => Value::F64(a + b),
        (OpCode::Sub, Pair::I4(a, b)) => Value::I4(a.wrapping_sub(b)),
        (OpCode::Sub, Pair::I8(a, b)) => Value::I8(a.wrapping_sub(b)),
        (OpCode::Sub, Pair::F64(a, b)) => Value::F64(a - b),
        (OpCode::Mul, Pair::I4(a, b)) => Value::I4(a.wrapping_mul(b)),
        (OpCode::Mul, Pair::I8(a, b)) => Value::I8(a.wrapping_mul(b)),
        (OpCode::Mul, Pair::F64(a, b)) => Value::F64(a * b),

        (OpCode::Div | OpCode::Rem | OpCode::DivUn | OpCode::RemUn, Pair::I4(_, 0))
        | (OpCode::Div | OpCode::Rem | OpCode::DivUn | OpCode::RemUn, Pair::I8(_, 0)) => {
            return Err(EmulationError::DivisionByZero)
        }
        (OpCode::Div, Pair::I4(a, b)) => Value::I4(overflow(a.checked_div(b))?),
        (OpCode::Div, Pair::I8(a, b)) => Value::I8(overflow(a.checked_div(b))?),
        (OpCode::Div, Pair::F64(a, b)) => Value::F64(a / b),
        (OpCode::Rem, Pair::I4(a, b)) => Value::I4(overflow(a.checked_rem(b))?),
        (OpCode::Rem, Pair::I8(a, b)) => Value::I8(overflow(a.checked_rem(b))?),
        (OpCode::Rem, Pair::F64(a, b)) => Value::F64(a % b),
        (OpCode::DivUn, Pair::I4(a, b)) => Value::I4(((a as u32) / (b as u32)) as i32),
        (OpCode::DivUn, Pair::I8(a, b)) => Value::I8(((a as u64) / (b as u64)) as i64),
        (OpCode::RemUn, Pair::I4(a, b)) => Value::I4(((a as u32) % (b as u32)) as i32),
        (OpCode::RemUn, Pair::I8(a, b)) => Value::I8(((a as u64) % (b as u64)) as i64),

        (OpCode::AddOvf, Pair::I4(a, b)) => Value::I4(overflow(a.checked_add(b))?),
        (OpCode::AddOvf, Pair::I8(a, b)) => Value::I8(overflow(a.checked_add(b))?),
        (OpCode::SubOvf, Pair::I4(a, b)) => Value::I4(overflow(a.checked_sub(b))?),
        (OpCode::SubOvf, Pair::I8(a, b)) => Value::I8(overflow(a.checked_sub(b))?),
        (OpCode::MulOvf, Pair::I4(a, b)) => Value::I4(overflow(a.checked_mul(b))?),
        (OpCode::MulOvf, Pair::I8(a, b)) => Value::I8(overflow(a.checked_mul(b))?),
        (OpCode::AddOvfUn, Pair::I4(a, b)) => {
            Value::I4(overflow((a as u32).checked_add(b as u32))? as i32)
        }
        (OpCode::AddOvfUn, Pair::I8(a, b)) => {
            Value::I8(overflow((a as u64).checked_add(b as u64))? as i64)
        }
        (OpCode::SubOvfUn, Pair::I4(a, b)) => {
            Value::I4(overflow((a as u32).checked_sub(b as u32))? as i32)
        }
        (OpCode::SubOvfUn, Pair::I8(a, b)) => {
            Value::I8(overflow((a as u64).checked_sub(b as u64))? as i64)
        }
        (OpCode::MulOvfUn, Pair::I4(a, b)) => {
            Value::I4(overflow((a as u32).checked_mul(b as u32))? as i32)
        }
        (OpCode::MulOvfUn, Pair::I8(a, b)) => {
            Value::I8(overflow((a as u64).checked_mul(b as u64))? as i64)
        }
        (OpCode::AddOvf | OpCode::SubOvf | OpCode::MulOvf, Pair::F64(a, b)) => {
            binary_float(opcode, a, b)
        }

        (OpCode::And, Pair::I4(a, b)) => Value::I4(a & b),
        (OpCode::And, Pair::I8(a, b)) => Value::I8(a & b),
        (OpCode::Or, Pair::I4(a, b)) => Value::I4(a | b),
        (OpCode::Or, Pair::I8(a, b)) => Value::I8(a | b),
        (OpCode::Xor, Pair::I4(a, b)) => Value::I4(a ^ b),
        (OpCode::Xor, Pair::I8(a, b)) => Value::I8(a ^ b),

        _ => {
            return Err(EmulationError::TypeMismatch {
                operation: opcode.mnemonic(),
                found: left.kind(),
            })
        }
    };

    Ok(value)
}

fn binary_float(opcode: OpCode, a: f64, b: f64) -> Value {
    match opcode {
        OpCode::SubOvf => Value::F64(a - b),
        OpCode::MulOvf => Value::F64(a * b),
        _ => Value::F64(a + b),
    }
}

/// Apply `shl`, `shr` or `shr.un`. The shift amount is an `int32`.
#[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
pub fn shift(opcode: OpCode, value: &Value, amount: &Value) -> OpResult {
    let amount = amount.as_i4().ok_or(EmulationError::TypeMismatch {
        operation: opcode.mnemonic(),
        found: amount.kind(),
    })? as u32;

    match (opcode, value) {
        (OpCode::Shl, Value::I4(v)) => Ok(Value::I4(v.wrapping_shl(amount))),
        (OpCode::Shl, Value::I8(v)) => Ok(Value::I8(v.wrapping_shl(amount))),
        (OpCode::Shr, Value::I4(v)) => Ok(Value::I4(v.wrapping_shr(amount))),
        (OpCode::Shr, Value::I8(v)) => Ok(Value::I8(v.wrapping_shr(amount))),
        (OpCode::ShrUn, Value::I4(v)) => Ok(Value::I4((*v as u32).wrapping_shr(amount) as i32)),
        (OpCode::ShrUn, Value::I8(v)) => Ok(Value::I8((*v as u64).wrapping_shr(amount) as i64)),
        _ => Err(EmulationError::TypeMismatch {
            operation: opcode.mnemonic(),
            found: value.kind(),
        }),
    }
}

/// Apply `neg` or `not`.
pub fn unary(opcode: OpCode, value: &Value) -> OpResult {
    match (opcode, value) {
        (OpCode::Neg, Value::I4(v)) => Ok(Value::I4(v.wrapping_neg())),
        (OpCode::Neg, Value::I8(v)) => Ok(Value::I8(v.wrapping_neg())),
        (OpCode::Neg, Value::F64(v)) => Ok(Value::F64(-v)),
        (OpCode::Not, Value::I4(v)) => Ok(Value::I4(!v)),
        (OpCode::Not, Value::I8(v)) => Ok(Value::I8(!v)),
        _ => Err(EmulationError::TypeMismatch {
            operation: opcode.mnemonic(),
            found: value.kind(),
        }),
    }
}

/// Equality as tested by `ceq` and `beq`.
#[must_use]
pub fn equals(left: &Value, right: &Value) -> bool {
    match promote("ceq", left, right) {
        Ok(Pair::I4(a, b)) => a == b,
        Ok(Pair::I8(a, b)) => a == b,
        Ok(Pair::F64(a, b)) => a == b,
        Err(_) => left == right,
    }
}

/// Evaluate a comparison. `opcode` is any of the `c*` or conditional branch opcodes.
///
/// Unsigned variants compare integers as unsigned and treat unordered floats as true.
#[allow(clippy::cast_sign_loss)]
pub fn compare(opcode: OpCode, left: &Value, right: &Value) -> Result<bool, EmulationError> {
    use std::cmp::Ordering;

    let opcode = opcode.long_form().unwrap_or(opcode);
    if matches!(opcode, OpCode::Ceq | OpCode::Beq) {
        return Ok(equals(left, right));
    }
    if opcode == OpCode::BneUn {
        return Ok(!equals(left, right));
    }

    let unsigned = matches!(
        opcode,
        OpCode::CgtUn | OpCode::CltUn | OpCode::BgeUn | OpCode::BgtUn | OpCode::BleUn | OpCode::BltUn
    );
    // Object references only support cgt.un against null
    if let (Value::Object(_) | Value::Str(_), Value::Null) = (left, right) {
        return Ok(opcode == OpCode::CgtUn);
    }

    let ordering = match promote(opcode.mnemonic(), left, right)? {
        Pair::I4(a, b) if unsigned => Some((a as u32).cmp(&(b as u32))),
        Pair::I4(a, b) => Some(a.cmp(&b)),
        Pair::I8(a, b) if unsigned => Some((a as u64).cmp(&(b as u64))),
        Pair::I8(a, b) => Some(a.cmp(&b)),
        Pair::F64(a, b) => a.partial_cmp(&b),
    };

    let Some(ordering) = ordering else {
        return Ok(unsigned);
    };

    Ok(match opcode {
        OpCode::Cgt | OpCode::CgtUn | OpCode::Bgt | OpCode::BgtUn => ordering == Ordering::Greater,
        OpCode::Clt | OpCode::CltUn | OpCode::Blt | OpCode::BltUn => ordering == Ordering::Less,
        OpCode::Bge | OpCode::BgeUn => ordering != Ordering::Less,
        OpCode::Ble | OpCode::BleUn => ordering != Ordering::Greater,
        _ => {
            return Err(EmulationError::UnsupportedOpcode {
                mnemonic: opcode.mnemonic(),
            })
        }
    })
}

/// Apply a `conv.*` or `conv.ovf.*` opcode.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss
)]
pub fn convert(opcode: OpCode, value: &Value) -> OpResult {
    let integer = match value {
        Value::I4(v) => Some(i64::from(*v)),
        Value::I8(v) => Some(*v),
        Value::F64(_) => None,
        other => {
            return Err(EmulationError::TypeMismatch {
                operation: opcode.mnemonic(),
                found: other.kind(),
            })
        }
    };
    let float = match value {
        Value::F64(v) => *v,
        _ => integer.unwrap_or_default() as f64,
    };
    // Truncating conversions go through i64 first
    let wide = integer.unwrap_or(float as i64);

    let checked = |ok: bool, result: Value| -> OpResult {
        if ok && !float.is_nan() {
            Ok(result)
        } else {
            Err(EmulationError::ArithmeticOverflow)
        }
    };

    match opcode {
        OpCode::ConvI1 => Ok(Value::I4(i32::from(wide as i8))),
        OpCode::ConvU1 => Ok(Value::I4(i32::from(wide as u8))),
        OpCode::ConvI2 => Ok(Value::I4(i32::from(wide as i16))),
        OpCode::ConvU2 => Ok(Value::I4(i32::from(wide as u16))),
        OpCode::ConvI4 | OpCode::ConvU4 => Ok(Value::I4(wide as i32)),
        OpCode::ConvI8 | OpCode::ConvI | OpCode::ConvU => Ok(Value::I8(wide)),
        OpCode::ConvU8 => Ok(Value::I8(match value {
            Value::I4(v) => i64::from(*v as u32),
            _ => wide,
        })),
        OpCode::ConvR4 => Ok(Value::F64(f64::from(float as f32))),
        OpCode::ConvR8 => Ok(Value::F64(float)),
        OpCode::ConvRUn => Ok(Value::F64(match value {
            Value::I4(v) => f64::from(*v as u32),
            Value::I8(v) => *v as u64 as f64,
            _ => float,
        })),

        OpCode::ConvOvfI1 => checked(i8::try_from(wide).is_ok(), Value::I4(wide as i32)),
        OpCode::ConvOvfU1 => checked(u8::try_from(wide).is_ok(), Value::I4(wide as i32)),
        OpCode::ConvOvfI2 => checked(i16::try_from(wide).is_ok(), Value::I4(wide as i32)),
        OpCode::ConvOvfU2 => checked(u16::try_from(wide).is_ok(), Value::I4(wide as i32)),
        OpCode::ConvOvfI4 => checked(i32::try_from(wide).is_ok(), Value::I4(wide as i32)),
        OpCode::ConvOvfU4 => checked(u32::try_from(wide).is_ok(), Value::I4(wide as i32)),
        OpCode::ConvOvfI8 | OpCode::ConvOvfI => checked(true, Value::I8(wide)),
        OpCode::ConvOvfU8 | OpCode::ConvOvfU => checked(wide >= 0, Value::I8(wide)),

        _ => Err(EmulationError::UnsupportedOpcode {
            mnemonic: opcode.mnemonic(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic() {
        assert_eq!(
            binary(OpCode::Add, &Value::I4(2), &Value::I4(3)).unwrap(),
            Value::I4(5)
        );
        assert_eq!(
            binary(OpCode::Add, &Value::I4(i32::MAX), &Value::I4(1)).unwrap(),
            Value::I4(i32::MIN)
        );
        assert_eq!(
            binary(OpCode::AddOvf, &Value::I4(i32::MAX), &Value::I4(1)),
            Err(EmulationError::ArithmeticOverflow)
        );
        assert_eq!(
            binary(OpCode::Div, &Value::I4(1), &Value::I4(0)),
            Err(EmulationError::DivisionByZero)
        );
        assert_eq!(
            binary(OpCode::DivUn, &Value::I4(-2), &Value::I4(2)).unwrap(),
            Value::I4(0x7FFF_FFFF)
        );
        assert_eq!(
            binary(OpCode::Mul, &Value::I4(3), &Value::I8(4)).unwrap(),
            Value::I8(12)
        );
        assert!(binary(OpCode::Add, &Value::I4(1), &Value::from("x")).is_err());
    }

    #[test]
    fn comparisons() {
        assert!(compare(OpCode::Clt, &Value::I4(-1), &Value::I4(0)).unwrap());
        assert!(!compare(OpCode::CltUn, &Value::I4(-1), &Value::I4(0)).unwrap());
        assert!(compare(OpCode::BgeS, &Value::I4(3), &Value::I4(3)).unwrap());
        assert!(compare(OpCode::BneUnS, &Value::I4(3), &Value::I4(4)).unwrap());
        assert!(compare(OpCode::CgtUn, &Value::F64(f64::NAN), &Value::F64(0.0)).unwrap());
        assert!(equals(&Value::Null, &Value::Null));
        assert!(compare(OpCode::CgtUn, &Value::from("s"), &Value::Null).unwrap());
    }

    #[test]
    fn conversions() {
        assert_eq!(convert(OpCode::ConvI1, &Value::I4(0x1FF)).unwrap(), Value::I4(-1));
        assert_eq!(convert(OpCode::ConvU1, &Value::I4(-1)).unwrap(), Value::I4(255));
        assert_eq!(convert(OpCode::ConvI8, &Value::I4(-5)).unwrap(), Value::I8(-5));
        assert_eq!(convert(OpCode::ConvU8, &Value::I4(-1)).unwrap(), Value::I8(0xFFFF_FFFF));
        assert_eq!(convert(OpCode::ConvI4, &Value::F64(3.9)).unwrap(), Value::I4(3));
        assert_eq!(convert(OpCode::ConvR8, &Value::I4(2)).unwrap(), Value::F64(2.0));
        assert_eq!(
            convert(OpCode::ConvOvfU1, &Value::I4(256)),
            Err(EmulationError::ArithmeticOverflow)
        );
        assert_eq!(
            convert(OpCode::ConvOvfI4, &Value::F64(f64::NAN)),
            Err(EmulationError::ArithmeticOverflow)
        );
    }
}
