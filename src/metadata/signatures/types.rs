//! Type, method and stand-alone signatures.
//!
//! Signatures here are kept in structured form rather than as compressed blobs: the module
//! image is assembled in memory, and what the engine needs from a signature is its shape
//! (parameter count, return kind, by-ref parameters and parameter names for hook binding).

use std::fmt;

use crate::metadata::token::Token;

/// The type of a value, parameter, local or field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSig {
    /// No value, only valid as a return type
    Void,
    /// `bool`
    Boolean,
    /// `int32`
    I4,
    /// `int64`
    I8,
    /// `float32`
    R4,
    /// `float64`
    R8,
    /// `string`
    String,
    /// `object`
    Object,
    /// A class defined in the module
    Class(Token),
    /// A managed pointer to the inner type
    ByRef(Box<TypeSig>),
}

impl TypeSig {
    /// Shorthand for `TypeSig::ByRef(Box::new(inner))`.
    #[must_use]
    pub fn by_ref(inner: TypeSig) -> Self {
        TypeSig::ByRef(Box::new(inner))
    }

    /// Returns `true` for [`TypeSig::Void`].
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, TypeSig::Void)
    }

    /// Returns `true` for managed pointers.
    #[must_use]
    pub fn is_by_ref(&self) -> bool {
        matches!(self, TypeSig::ByRef(_))
    }

    /// The pointee of a by-ref type, or the type itself.
    #[must_use]
    pub fn element(&self) -> &TypeSig {
        match self {
            TypeSig::ByRef(inner) => inner,
            other => other,
        }
    }
}

impl fmt::Display for TypeSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSig::Void => write!(f, "void"),
            TypeSig::Boolean => write!(f, "bool"),
            TypeSig::I4 => write!(f, "int32"),
            TypeSig::I8 => write!(f, "int64"),
            TypeSig::R4 => write!(f, "float32"),
            TypeSig::R8 => write!(f, "float64"),
            TypeSig::String => write!(f, "string"),
            TypeSig::Object => write!(f, "object"),
            TypeSig::Class(token) => write!(f, "class {token}"),
            TypeSig::ByRef(inner) => write!(f, "{inner}&"),
        }
    }
}

/// A named method parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamSig {
    /// Declared parameter name
    pub name: String,
    /// Declared parameter type
    pub sig: TypeSig,
}

impl ParamSig {
    /// Create a parameter.
    pub fn new(name: impl Into<String>, sig: TypeSig) -> Self {
        ParamSig {
            name: name.into(),
            sig,
        }
    }
}

/// The signature of a method: calling convention, return type and parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSig {
    /// Whether the method takes an implicit `this` as argument 0
    pub has_this: bool,
    /// The return type
    pub return_type: TypeSig,
    /// Declared parameters, excluding `this`
    pub params: Vec<ParamSig>,
}

impl MethodSig {
    /// A static method signature.
    #[must_use]
    pub fn new_static(return_type: TypeSig, params: Vec<ParamSig>) -> Self {
        MethodSig {
            has_this: false,
            return_type,
            params,
        }
    }

    /// An instance method signature.
    #[must_use]
    pub fn new_instance(return_type: TypeSig, params: Vec<ParamSig>) -> Self {
        MethodSig {
            has_this: true,
            return_type,
            params,
        }
    }

    /// Number of argument slots, `this` included.
    #[must_use]
    pub fn arg_count(&self) -> usize {
        self.params.len() + usize::from(self.has_this)
    }

    /// Argument slot of the parameter with the given name.
    #[must_use]
    pub fn arg_index_of(&self, name: &str) -> Option<u16> {
        self.params
            .iter()
            .position(|param| param.name == name)
            .and_then(|pos| u16::try_from(pos + usize::from(self.has_this)).ok())
    }

    /// Type of the argument in the given slot. Slot 0 of an instance method is `this`.
    #[must_use]
    pub fn arg_type(&self, index: u16) -> Option<&TypeSig> {
        let index = usize::from(index);
        if self.has_this {
            if index == 0 {
                return Some(&TypeSig::Object);
            }
            self.params.get(index - 1).map(|param| &param.sig)
        } else {
            self.params.get(index).map(|param| &param.sig)
        }
    }

    /// Returns `true` if the method returns a value.
    #[must_use]
    pub fn returns_value(&self) -> bool {
        !self.return_type.is_void()
    }
}

impl fmt::Display for MethodSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_this {
            write!(f, "instance ")?;
        }
        write!(f, "{} (", self.return_type)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", param.sig, param.name)?;
        }
        write!(f, ")")
    }
}

/// A signature stored in the `StandAloneSig` table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StandAloneSig {
    /// The local variable list of a method body
    Locals(Vec<TypeSig>),
    /// The call site signature of a `calli`
    Method(MethodSig),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MethodSig {
        MethodSig::new_instance(
            TypeSig::I4,
            vec![
                ParamSig::new("a", TypeSig::I4),
                ParamSig::new("b", TypeSig::by_ref(TypeSig::I4)),
            ],
        )
    }

    #[test]
    fn instance_argument_slots() {
        let sig = sample();
        assert_eq!(sig.arg_count(), 3);
        assert_eq!(sig.arg_index_of("a"), Some(1));
        assert_eq!(sig.arg_index_of("b"), Some(2));
        assert_eq!(sig.arg_index_of("c"), None);
        assert_eq!(sig.arg_type(0), Some(&TypeSig::Object));
        assert!(sig.arg_type(2).is_some_and(TypeSig::is_by_ref));
        assert_eq!(sig.arg_type(3), None);
    }

    #[test]
    fn static_argument_slots() {
        let sig = MethodSig::new_static(TypeSig::Void, vec![ParamSig::new("x", TypeSig::R8)]);
        assert_eq!(sig.arg_index_of("x"), Some(0));
        assert!(!sig.returns_value());
        assert_eq!(sig.to_string(), "void (float64 x)");
    }

    #[test]
    fn by_ref_element() {
        let sig = TypeSig::by_ref(TypeSig::String);
        assert_eq!(sig.element(), &TypeSig::String);
        assert_eq!(sig.to_string(), "string&");
        assert_eq!(sample().to_string(), "instance int32 (int32 a, int32& b)");
    }
}
