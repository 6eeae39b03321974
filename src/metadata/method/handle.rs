use crate::{
    metadata::{module::Module, signatures::MethodSig, token::Token},
    Error, Result,
};

/// Identity of a method that is being patched.
///
/// A handle is created once from the module and never changes. The
/// `is_synthesized` flag selects how tokens inside the method's body are resolved:
/// original methods read the module tables, synthesized methods read their own
/// dynamic scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodHandle {
    declaring_type: Token,
    token: Token,
    name: String,
    sig: MethodSig,
    is_synthesized: bool,
}

impl MethodHandle {
    /// Create the handle of a method defined in `module`.
    ///
    /// # Errors
    /// Returns [`Error::MethodNotFound`] if `token` does not name a method.
    pub fn from_module(module: &Module, token: Token) -> Result<Self> {
        let method = module.method(token).ok_or(Error::MethodNotFound(token))?;
        Ok(MethodHandle {
            declaring_type: method.declaring_type,
            token,
            name: method.full_name.clone(),
            sig: method.sig.clone(),
            is_synthesized: false,
        })
    }

    /// The handle of the synthesized replacement for this method.
    #[must_use]
    pub fn synthesized(&self) -> Self {
        MethodHandle {
            is_synthesized: true,
            ..self.clone()
        }
    }

    /// Token of the declaring type.
    #[must_use]
    pub fn declaring_type(&self) -> Token {
        self.declaring_type
    }

    /// Token of the original method.
    #[must_use]
    pub fn token(&self) -> Token {
        self.token
    }

    /// `Namespace.Type::Method`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The method's signature.
    #[must_use]
    pub fn sig(&self) -> &MethodSig {
        &self.sig
    }

    /// Whether this handle identifies a synthesized method.
    #[must_use]
    pub fn is_synthesized(&self) -> bool {
        self.is_synthesized
    }
}
