//! Synthesized methods and the table the runtime dispatches through.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use crate::{
    assembly::{decode_body, DecodedMethod, Instruction},
    metadata::{
        method::{MethodBody, MethodHandle},
        module::Module,
        resolver::{DynamicScope, TokenResolver},
        signatures::TypeSig,
        token::Token,
    },
    Result,
};

/// The product of a successful build: a new body with its own token scope.
///
/// A synthesized method is immutable once built. Its body's tokens only have meaning
/// through [`SynthesizedMethod::scope`], which the runtime must use to resolve them.
#[derive(Debug)]
pub struct SynthesizedMethod {
    handle: MethodHandle,
    body: MethodBody,
    scope: DynamicScope,
    locals: Vec<TypeSig>,
    instructions: Vec<Instruction>,
    generation: u64,
    decoded: OnceLock<DecodedMethod>,
}

impl SynthesizedMethod {
    /// Bundle the parts of a finished build.
    ///
    /// # Arguments
    ///
    /// * `handle` - The synthesized handle of the patched method
    /// * `body` - Encoded body, tokens scoped to `scope`
    /// * `scope` - Dynamic token table filled by the encoder
    /// * `locals` - Final local slot table
    /// * `instructions` - The instruction sequence that was encoded
    /// * `generation` - Build counter of the owning plan
    #[must_use]
    pub fn new(
        handle: MethodHandle,
        body: MethodBody,
        scope: DynamicScope,
        locals: Vec<TypeSig>,
        instructions: Vec<Instruction>,
        generation: u64,
    ) -> Self {
        SynthesizedMethod {
            handle,
            body,
            scope,
            locals,
            instructions,
            generation,
            decoded: OnceLock::new(),
        }
    }

    /// Handle of the synthesized method. Its token is the original method's.
    #[must_use]
    pub fn handle(&self) -> &MethodHandle {
        &self.handle
    }

    /// Token of the method this replaces.
    #[must_use]
    pub fn original(&self) -> Token {
        self.handle.token()
    }

    /// The encoded body.
    #[must_use]
    pub fn body(&self) -> &MethodBody {
        &self.body
    }

    /// The body's token scope.
    #[must_use]
    pub fn scope(&self) -> &DynamicScope {
        &self.scope
    }

    /// Local slot types.
    #[must_use]
    pub fn locals(&self) -> &[TypeSig] {
        &self.locals
    }

    /// The instruction sequence handed to the encoder.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Which build of the plan produced this method, starting at 1.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The body decoded back through its own scope, cached after the first call.
    ///
    /// # Errors
    /// Returns a decode error if the body cannot be read back, which indicates an encoder
    /// bug.
    pub fn decoded(&self, module: &Module) -> Result<&DecodedMethod> {
        if let Some(decoded) = self.decoded.get() {
            return Ok(decoded);
        }

        let resolver = TokenResolver::for_method(&self.handle, module, Some(&self.scope))?;
        let decoded = decode_body(&self.body, &resolver, self.handle.name())?;
        Ok(self.decoded.get_or_init(|| decoded))
    }
}

/// Replacement table consulted on every call.
///
/// Swapping an entry is a single map write; a caller that already fetched the previous
/// [`Arc<SynthesizedMethod>`] keeps executing it until it returns.
#[derive(Debug, Default)]
pub struct InstallTable {
    methods: DashMap<Token, Arc<SynthesizedMethod>>,
}

impl InstallTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route calls of the method to `method`, returning the replacement it displaces.
    pub fn install(&self, method: Arc<SynthesizedMethod>) -> Option<Arc<SynthesizedMethod>> {
        self.methods.insert(method.original(), method)
    }

    /// Route calls of `token` back to the original body.
    pub fn uninstall(&self, token: Token) -> Option<Arc<SynthesizedMethod>> {
        self.methods.remove(&token).map(|(_, method)| method)
    }

    /// The replacement currently installed for `token`.
    #[must_use]
    pub fn get(&self, token: Token) -> Option<Arc<SynthesizedMethod>> {
        self.methods.get(&token).map(|entry| entry.value().clone())
    }

    /// Returns `true` if `token` is patched.
    #[must_use]
    pub fn contains(&self, token: Token) -> bool {
        self.methods.contains_key(&token)
    }

    /// Number of installed replacements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Returns `true` if nothing is installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
