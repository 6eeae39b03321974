//! Runtime values of the reference interpreter.
//!
//! Values follow the CLI evaluation stack model: `bool`, `int8` to `int32` widen to
//! [`Value::I4`], `float32` and `float64` to [`Value::F64`]. Objects live behind shared
//! references, and managed pointers ([`Value::Ref`]) address an argument, local, static
//! or instance field.

use std::{fmt, sync::Arc};

use dashmap::DashMap;

use crate::metadata::{signatures::TypeSig, token::Token};

/// An object instance.
#[derive(Debug)]
pub struct HeapObject {
    class: Token,
    fields: DashMap<Token, Value>,
}

impl HeapObject {
    /// The object's type.
    #[must_use]
    pub fn class(&self) -> Token {
        self.class
    }

    /// Value of an instance field, if it was ever written.
    #[must_use]
    pub fn field(&self, field: Token) -> Option<Value> {
        self.fields.get(&field).map(|value| value.value().clone())
    }

    /// Write an instance field.
    pub fn set_field(&self, field: Token, value: Value) {
        self.fields.insert(field, value);
    }
}

/// Shared reference to a [`HeapObject`]. Compares by identity.
#[derive(Debug, Clone)]
pub struct ObjectRef(Arc<HeapObject>);

impl ObjectRef {
    /// Allocate an object of type `class` with no fields set.
    #[must_use]
    pub fn new(class: Token) -> Self {
        ObjectRef(Arc::new(HeapObject {
            class,
            fields: DashMap::new(),
        }))
    }
}

impl std::ops::Deref for ObjectRef {
    type Target = HeapObject;

    fn deref(&self) -> &HeapObject {
        &self.0
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Target of a managed pointer.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueRef {
    /// Argument slot of a frame, by call depth
    Argument {
        /// Depth of the frame
        frame: usize,
        /// Argument slot
        index: u16,
    },
    /// Local slot of a frame, by call depth
    Local {
        /// Depth of the frame
        frame: usize,
        /// Local slot
        index: u16,
    },
    /// A static field
    Static(Token),
    /// An instance field
    Field(ObjectRef, Token),
}

/// A value on the evaluation stack or in a slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Result of a method returning void
    Void,
    /// `int32`, also `bool` and the small integer types
    I4(i32),
    /// `int64` and native integers
    I8(i64),
    /// Floating point
    F64(f64),
    /// The null reference
    Null,
    /// A string
    Str(Arc<str>),
    /// An object reference
    Object(ObjectRef),
    /// A managed pointer
    Ref(ValueRef),
}

impl Value {
    /// The zero value of a slot of type `sig`.
    #[must_use]
    pub fn default_for(sig: &TypeSig) -> Self {
        match sig {
            TypeSig::Boolean | TypeSig::I4 => Value::I4(0),
            TypeSig::I8 => Value::I8(0),
            TypeSig::R4 | TypeSig::R8 => Value::F64(0.0),
            TypeSig::Void => Value::Void,
            TypeSig::String | TypeSig::Object | TypeSig::Class(_) | TypeSig::ByRef(_) => {
                Value::Null
            }
        }
    }

    /// A boolean as the stack represents it.
    #[must_use]
    pub fn from_bool(value: bool) -> Self {
        Value::I4(i32::from(value))
    }

    /// Short name of the value's kind, used in diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::I4(_) => "int32",
            Value::I8(_) => "int64",
            Value::F64(_) => "float",
            Value::Null => "null",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
            Value::Ref(_) => "managed pointer",
        }
    }

    /// Truth value as tested by `brtrue`.
    #[must_use]
    pub fn is_true(&self) -> bool {
        match self {
            Value::I4(value) => *value != 0,
            Value::I8(value) => *value != 0,
            Value::F64(value) => *value != 0.0,
            Value::Void | Value::Null => false,
            Value::Str(_) | Value::Object(_) | Value::Ref(_) => true,
        }
    }

    /// The value as an `int32`, if it is one.
    #[must_use]
    pub fn as_i4(&self) -> Option<i32> {
        match self {
            Value::I4(value) => Some(*value),
            _ => None,
        }
    }

    /// The value as a string, if it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::I4(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::I8(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::F64(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::from_bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(Arc::from(value))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "void"),
            Value::I4(value) => write!(f, "{value}"),
            Value::I8(value) => write!(f, "{value}L"),
            Value::F64(value) => write!(f, "{value}"),
            Value::Null => write!(f, "null"),
            Value::Str(value) => write!(f, "{value:?}"),
            Value::Object(object) => write!(f, "object {}", object.class()),
            Value::Ref(target) => write!(f, "&{target:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_truth() {
        assert_eq!(Value::default_for(&TypeSig::Boolean), Value::I4(0));
        assert_eq!(Value::default_for(&TypeSig::R4), Value::F64(0.0));
        assert_eq!(Value::default_for(&TypeSig::String), Value::Null);
        assert!(Value::from(true).is_true());
        assert!(!Value::Null.is_true());
        assert!(Value::from("x").is_true());
    }

    #[test]
    fn objects_compare_by_identity() {
        let a = ObjectRef::new(Token(0x0200_0001));
        let b = ObjectRef::new(Token(0x0200_0001));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);

        a.set_field(Token(0x0400_0001), Value::I4(3));
        assert_eq!(a.field(Token(0x0400_0001)), Some(Value::I4(3)));
        assert_eq!(b.field(Token(0x0400_0001)), None);
    }
}
