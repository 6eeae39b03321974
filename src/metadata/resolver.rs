//! Token resolution for original and synthesized method bodies.
//!
//! A token embedded in an instruction stream only has meaning relative to a scope. Bodies
//! of original methods are scoped to the module tables; bodies of synthesized methods are
//! scoped to their own [`DynamicScope`], an append-only table the encoder fills while it
//! emits the method. [`TokenResolver`] hides that difference behind one contract, and is
//! picked once per method from [`crate::metadata::method::MethodHandle::is_synthesized`].
//!
//! Resolution is strict: an unknown token, or a token of the wrong kind for its opcode,
//! is an error. No placeholder entity is ever substituted.
//!
//! # Thread Safety
//!
//! [`DynamicScope`] is backed by [`boxcar::Vec`], so lookups never block and concurrent
//! readers may observe a scope while it is still being filled. Once the synthesized
//! method is installed, the scope is no longer written.

use std::sync::Arc;

use crate::{
    metadata::{method::MethodHandle, module::Module, signatures::StandAloneSig, token::Token},
    Error, Result,
};

/// The metadata entity a token stands for.
///
/// Methods, fields and types are identified by their module token, so an entity resolved
/// through a dynamic scope compares equal to the same entity resolved from the module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResolvedEntity {
    /// A method definition
    Method(Token),
    /// A field definition
    Field(Token),
    /// A type definition
    Type(Token),
    /// A user string
    String(Arc<str>),
    /// A stand-alone signature
    Signature(Arc<StandAloneSig>),
}

impl ResolvedEntity {
    /// The table byte tokens for this kind of entity carry.
    #[must_use]
    pub fn table(&self) -> u8 {
        match self {
            ResolvedEntity::Method(_) => Token::METHOD_DEF,
            ResolvedEntity::Field(_) => Token::FIELD,
            ResolvedEntity::Type(_) => Token::TYPE_DEF,
            ResolvedEntity::String(_) => Token::USER_STRING,
            ResolvedEntity::Signature(_) => Token::STANDALONE_SIG,
        }
    }
}

/// Append-only token table of one synthesized method.
pub struct DynamicScope {
    entries: boxcar::Vec<ResolvedEntity>,
}

impl Default for DynamicScope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DynamicScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(_, entity)| entity))
            .finish()
    }
}

impl DynamicScope {
    /// Create an empty scope.
    #[must_use]
    pub fn new() -> Self {
        DynamicScope {
            entries: boxcar::Vec::new(),
        }
    }

    /// Return the token of `entity` in this scope, appending it on first use.
    ///
    /// The token's table byte matches the entity kind and its row is the entry's
    /// position plus one.
    pub fn token_for(&self, entity: &ResolvedEntity) -> Token {
        let index = self
            .entries
            .iter()
            .find(|(_, existing)| *existing == entity)
            .map_or_else(|| self.entries.push(entity.clone()), |(index, _)| index);

        #[allow(clippy::cast_possible_truncation)]
        Token::from_parts(entity.table(), index as u32 + 1)
    }

    /// Look up a dynamic token.
    #[must_use]
    pub fn resolve(&self, token: Token) -> Option<&ResolvedEntity> {
        let entity = self.entries.get(token.index()?)?;
        (entity.table() == token.table()).then_some(entity)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.count()
    }

    /// Returns `true` if nothing has been interned yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolves tokens in both directions for one method body.
#[derive(Debug, Clone, Copy)]
pub enum TokenResolver<'a> {
    /// Tokens are module table references
    Static(&'a Module),
    /// Tokens are entries of a dynamic scope
    Synthesized {
        /// The module the scope's entities live in
        module: &'a Module,
        /// The synthesized method's scope
        scope: &'a DynamicScope,
    },
}

impl<'a> TokenResolver<'a> {
    /// Pick the resolver variant for `handle`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a synthesized handle without a scope.
    pub fn for_method(
        handle: &MethodHandle,
        module: &'a Module,
        scope: Option<&'a DynamicScope>,
    ) -> Result<Self> {
        if !handle.is_synthesized() {
            return Ok(TokenResolver::Static(module));
        }

        match scope {
            Some(scope) => Ok(TokenResolver::Synthesized { module, scope }),
            None => Err(malformed_error!(
                "Synthesized method {} has no dynamic scope",
                handle.name()
            )),
        }
    }

    /// The module entities are defined in.
    #[must_use]
    pub fn module(&self) -> &'a Module {
        match self {
            TokenResolver::Static(module) | TokenResolver::Synthesized { module, .. } => module,
        }
    }

    /// Resolve a raw token found in the body of `method`.
    ///
    /// # Errors
    /// Returns [`Error::TokenResolution`] if the token does not name an entity in scope.
    pub fn resolve(&self, token: Token, method: &str) -> Result<ResolvedEntity> {
        let entity = match self {
            TokenResolver::Static(module) => Self::resolve_static(module, token),
            TokenResolver::Synthesized { scope, .. } => scope.resolve(token).cloned(),
        };

        entity.ok_or_else(|| Error::TokenResolution {
            token,
            method: method.to_string(),
        })
    }

    fn resolve_static(module: &Module, token: Token) -> Option<ResolvedEntity> {
        match token.table() {
            Token::METHOD_DEF => module.method(token).map(|_| ResolvedEntity::Method(token)),
            Token::FIELD => module.field(token).map(|_| ResolvedEntity::Field(token)),
            Token::TYPE_DEF => module.type_def(token).map(|_| ResolvedEntity::Type(token)),
            Token::USER_STRING => module
                .user_string(token)
                .map(|value| ResolvedEntity::String(value.clone())),
            Token::STANDALONE_SIG => module
                .signature(token)
                .map(|sig| ResolvedEntity::Signature(sig.clone())),
            _ => None,
        }
    }

    /// Produce the token that references `entity` from a body in this scope.
    ///
    /// # Errors
    /// Returns [`Error::TokenResolution`] if a static scope has no row for the entity.
    pub fn token_for(&self, entity: &ResolvedEntity, method: &str) -> Result<Token> {
        match self {
            TokenResolver::Static(module) => {
                let token = match entity {
                    ResolvedEntity::Method(token)
                    | ResolvedEntity::Field(token)
                    | ResolvedEntity::Type(token) => Some(*token)
                        .filter(|token| Self::resolve_static(module, *token).is_some()),
                    ResolvedEntity::String(value) => module.string_token(value),
                    ResolvedEntity::Signature(sig) => module.signature_token(sig),
                };
                token.ok_or_else(|| Error::TokenResolution {
                    token: Token::from_parts(entity.table(), 0),
                    method: method.to_string(),
                })
            }
            TokenResolver::Synthesized { scope, .. } => Ok(scope.token_for(entity)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        module::ModuleBuilder,
        signatures::{MethodSig, TypeSig},
    };

    #[test]
    fn dynamic_tokens_follow_entity_kind() {
        let scope = DynamicScope::new();
        let method = scope.token_for(&ResolvedEntity::Method(Token(0x0600_0007)));
        let string = scope.token_for(&ResolvedEntity::String(Arc::from("hi")));
        let again = scope.token_for(&ResolvedEntity::Method(Token(0x0600_0007)));

        assert_eq!(method, Token(0x0600_0001));
        assert_eq!(string, Token(0x7000_0002));
        assert_eq!(again, method);
        assert_eq!(scope.len(), 2);
        assert_eq!(
            scope.resolve(method),
            Some(&ResolvedEntity::Method(Token(0x0600_0007)))
        );
        assert_eq!(scope.resolve(Token(0x0400_0001)), None);
        assert_eq!(scope.resolve(Token(0x0600_0003)), None);
    }

    #[test]
    fn static_resolution() {
        let mut builder = ModuleBuilder::new("Test");
        let ty = builder.add_type("", "T");
        let field = builder.add_field(ty, "f", TypeSig::I4, true);
        let text = builder.user_string("text");
        let module = builder.build().unwrap();
        let resolver = TokenResolver::Static(&module);

        assert_eq!(
            resolver.resolve(field, "T::M").unwrap(),
            ResolvedEntity::Field(field)
        );
        assert_eq!(
            resolver.resolve(text, "T::M").unwrap(),
            ResolvedEntity::String(Arc::from("text"))
        );
        assert!(matches!(
            resolver.resolve(Token(0x0400_0002), "T::M"),
            Err(Error::TokenResolution { method, .. }) if method == "T::M"
        ));
        assert!(resolver
            .token_for(&ResolvedEntity::String(Arc::from("missing")), "T::M")
            .is_err());
        assert_eq!(
            resolver.token_for(&ResolvedEntity::Type(ty), "T::M").unwrap(),
            ty
        );
    }

    #[test]
    fn synthesized_round_trip() {
        let mut builder = ModuleBuilder::new("Test");
        let ty = builder.add_type("", "T");
        let target = builder.add_native(
            ty,
            "N",
            MethodSig::new_static(TypeSig::Void, Vec::new()),
            |_| Ok(crate::emulation::Value::Void),
        );
        let module = builder.build().unwrap();
        let handle = MethodHandle::from_module(&module, target).unwrap().synthesized();

        assert!(TokenResolver::for_method(&handle, &module, None).is_err());

        let scope = DynamicScope::new();
        let resolver = TokenResolver::for_method(&handle, &module, Some(&scope)).unwrap();
        let token = resolver
            .token_for(&ResolvedEntity::Method(target), handle.name())
            .unwrap();
        assert_eq!(
            resolver.resolve(token, handle.name()).unwrap(),
            ResolvedEntity::Method(target)
        );
    }
}
