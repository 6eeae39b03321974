//! In-memory module image.
//!
//! A [`Module`] holds the metadata tables the engine reads: type definitions, fields,
//! methods, stand-alone signatures and the user string heap. Methods are implemented
//! either by an IL body or by a native host callback. Once built, a module is immutable
//! and shared behind an [`Arc`]; everything that changes at runtime (installed patches,
//! static field values) lives outside of it.
//!
//! # Examples
//!
//! ```rust
//! use dotpatch::prelude::*;
//!
//! let mut builder = ModuleBuilder::new("Game");
//! let calc = builder.add_type("Game", "Calculator");
//! let add = builder.add_il(
//!     calc,
//!     "Add",
//!     MethodSig::new_static(
//!         TypeSig::I4,
//!         vec![ParamSig::new("a", TypeSig::I4), ParamSig::new("b", TypeSig::I4)],
//!     ),
//!     Vec::new(),
//!     vec![
//!         Instruction::ldarg(0),
//!         Instruction::ldarg(1),
//!         Instruction::simple(OpCode::Add),
//!         Instruction::ret(),
//!     ],
//! );
//! let module = builder.build()?;
//!
//! assert_eq!(module.method(add).unwrap().full_name, "Game.Calculator::Add");
//! # Ok::<(), dotpatch::Error>(())
//! ```

use std::{fmt, sync::Arc};

use crate::{
    assembly::{encoder::encode, Instruction, Operand},
    emulation::{NativeCall, Value},
    metadata::{
        method::MethodBody,
        resolver::TokenResolver,
        signatures::{MethodSig, StandAloneSig, TypeSig},
        token::Token,
    },
    Result,
};

/// Host callback implementing a native method.
pub type NativeMethod = Arc<dyn Fn(&mut NativeCall<'_>) -> Result<Value> + Send + Sync>;

/// A row of the `TypeDef` table.
#[derive(Debug, Clone)]
pub struct TypeDef {
    /// The type's token
    pub token: Token,
    /// Namespace, may be empty
    pub namespace: String,
    /// Simple name
    pub name: String,
}

impl TypeDef {
    /// `Namespace.Name`, or just `Name` without a namespace.
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

/// A row of the `Field` table.
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// The field's token
    pub token: Token,
    /// Owning type
    pub declaring_type: Token,
    /// Field name
    pub name: String,
    /// Field type
    pub sig: TypeSig,
    /// Whether the field is static
    pub is_static: bool,
}

/// How a method is implemented.
#[derive(Clone)]
pub enum MethodImpl {
    /// A CIL method body
    Il(MethodBody),
    /// A host callback
    Native(NativeMethod),
}

impl fmt::Debug for MethodImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodImpl::Il(body) => f.debug_tuple("Il").field(&body.size()).finish(),
            MethodImpl::Native(_) => f.write_str("Native"),
        }
    }
}

/// A row of the `MethodDef` table.
#[derive(Debug, Clone)]
pub struct MethodDef {
    /// The method's token
    pub token: Token,
    /// Owning type
    pub declaring_type: Token,
    /// Simple name
    pub name: String,
    /// `Namespace.Type::Name`, used in diagnostics
    pub full_name: String,
    /// Signature, including parameter names
    pub sig: MethodSig,
    /// Body or host callback
    pub implementation: MethodImpl,
}

impl MethodDef {
    /// The IL body, if the method has one.
    #[must_use]
    pub fn body(&self) -> Option<&MethodBody> {
        match &self.implementation {
            MethodImpl::Il(body) => Some(body),
            MethodImpl::Native(_) => None,
        }
    }
}

/// An immutable module image.
#[derive(Debug)]
pub struct Module {
    name: String,
    types: Vec<TypeDef>,
    fields: Vec<FieldDef>,
    methods: Vec<MethodDef>,
    user_strings: Vec<Arc<str>>,
    signatures: Vec<Arc<StandAloneSig>>,
}

fn row<T>(table: &[T], token: Token, expected: u8) -> Option<&T> {
    if token.table() != expected {
        return None;
    }
    token.index().and_then(|index| table.get(index))
}

impl Module {
    /// Name of the module.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a type definition.
    #[must_use]
    pub fn type_def(&self, token: Token) -> Option<&TypeDef> {
        row(&self.types, token, Token::TYPE_DEF)
    }

    /// Look up a field definition.
    #[must_use]
    pub fn field(&self, token: Token) -> Option<&FieldDef> {
        row(&self.fields, token, Token::FIELD)
    }

    /// Look up a method definition.
    #[must_use]
    pub fn method(&self, token: Token) -> Option<&MethodDef> {
        row(&self.methods, token, Token::METHOD_DEF)
    }

    /// Look up a user string.
    #[must_use]
    pub fn user_string(&self, token: Token) -> Option<&Arc<str>> {
        row(&self.user_strings, token, Token::USER_STRING)
    }

    /// Look up a stand-alone signature.
    #[must_use]
    pub fn signature(&self, token: Token) -> Option<&Arc<StandAloneSig>> {
        row(&self.signatures, token, Token::STANDALONE_SIG)
    }

    /// All method definitions in token order.
    pub fn methods(&self) -> impl Iterator<Item = &MethodDef> {
        self.methods.iter()
    }

    /// All field definitions in token order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter()
    }

    /// Find a method by declaring type full name and method name.
    #[must_use]
    pub fn find_method(&self, type_name: &str, method_name: &str) -> Option<Token> {
        self.methods
            .iter()
            .find(|method| {
                method.name == method_name
                    && self
                        .type_def(method.declaring_type)
                        .is_some_and(|ty| ty.full_name() == type_name)
            })
            .map(|method| method.token)
    }

    /// Token of an existing user string with the given content.
    #[must_use]
    pub fn string_token(&self, value: &str) -> Option<Token> {
        position_token(&self.user_strings, Token::USER_STRING, |s| &**s == value)
    }

    /// Token of an existing stand-alone signature equal to `sig`.
    #[must_use]
    pub fn signature_token(&self, sig: &StandAloneSig) -> Option<Token> {
        position_token(&self.signatures, Token::STANDALONE_SIG, |s| **s == *sig)
    }

    /// The local variable types declared by a method body.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the body's local signature token does not name a
    /// local variable list.
    pub fn locals_of(&self, body: &MethodBody) -> Result<Vec<TypeSig>> {
        if body.local_var_sig_token.is_null() {
            return Ok(Vec::new());
        }

        match self.signature(body.local_var_sig_token).map(AsRef::as_ref) {
            Some(StandAloneSig::Locals(locals)) => Ok(locals.clone()),
            _ => Err(malformed_error!(
                "Local signature {} is not a local variable list",
                body.local_var_sig_token
            )),
        }
    }
}

fn position_token<T>(table: &[T], kind: u8, predicate: impl Fn(&T) -> bool) -> Option<Token> {
    table
        .iter()
        .position(predicate)
        .and_then(|index| u32::try_from(index + 1).ok())
        .map(|row| Token::from_parts(kind, row))
}

fn next_token<T>(table: &[T], kind: u8) -> Token {
    #[allow(clippy::cast_possible_truncation)]
    Token::from_parts(kind, table.len() as u32 + 1)
}

enum PendingImpl {
    Ready(MethodImpl),
    Assemble {
        locals: Vec<TypeSig>,
        instructions: Vec<Instruction>,
    },
}

struct PendingMethod {
    def: MethodDef,
    pending: PendingImpl,
}

/// Builder assembling a [`Module`].
///
/// IL methods may be supplied as instruction sequences; they are encoded when
/// [`ModuleBuilder::build`] runs, so they can reference methods added later.
pub struct ModuleBuilder {
    name: String,
    types: Vec<TypeDef>,
    fields: Vec<FieldDef>,
    methods: Vec<PendingMethod>,
    user_strings: Vec<Arc<str>>,
    signatures: Vec<Arc<StandAloneSig>>,
}

impl ModuleBuilder {
    /// Start an empty module.
    pub fn new(name: impl Into<String>) -> Self {
        ModuleBuilder {
            name: name.into(),
            types: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            user_strings: Vec::new(),
            signatures: Vec::new(),
        }
    }

    /// Define a type.
    pub fn add_type(&mut self, namespace: impl Into<String>, name: impl Into<String>) -> Token {
        let token = next_token(&self.types, Token::TYPE_DEF);
        self.types.push(TypeDef {
            token,
            namespace: namespace.into(),
            name: name.into(),
        });
        token
    }

    /// Define a field on `declaring_type`.
    pub fn add_field(
        &mut self,
        declaring_type: Token,
        name: impl Into<String>,
        sig: TypeSig,
        is_static: bool,
    ) -> Token {
        let token = next_token(&self.fields, Token::FIELD);
        self.fields.push(FieldDef {
            token,
            declaring_type,
            name: name.into(),
            sig,
            is_static,
        });
        token
    }

    /// Intern a user string and return its token.
    pub fn user_string(&mut self, value: &str) -> Token {
        if let Some(token) = position_token(&self.user_strings, Token::USER_STRING, |s| &**s == value)
        {
            return token;
        }
        let token = next_token(&self.user_strings, Token::USER_STRING);
        self.user_strings.push(Arc::from(value));
        token
    }

    /// Intern a stand-alone signature and return its token.
    pub fn signature(&mut self, sig: StandAloneSig) -> Token {
        if let Some(token) = position_token(&self.signatures, Token::STANDALONE_SIG, |s| **s == sig)
        {
            return token;
        }
        let token = next_token(&self.signatures, Token::STANDALONE_SIG);
        self.signatures.push(Arc::new(sig));
        token
    }

    /// The token the next added method will receive.
    #[must_use]
    pub fn next_method_token(&self) -> Token {
        next_token(&self.methods, Token::METHOD_DEF)
    }

    /// Define a method with a ready implementation.
    pub fn add_method(
        &mut self,
        declaring_type: Token,
        name: impl Into<String>,
        sig: MethodSig,
        implementation: MethodImpl,
    ) -> Token {
        self.push_method(declaring_type, name.into(), sig, PendingImpl::Ready(implementation))
    }

    /// Define a method implemented by a host callback.
    pub fn add_native<F>(
        &mut self,
        declaring_type: Token,
        name: impl Into<String>,
        sig: MethodSig,
        callback: F,
    ) -> Token
    where
        F: Fn(&mut NativeCall<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.add_method(
            declaring_type,
            name,
            sig,
            MethodImpl::Native(Arc::new(callback)),
        )
    }

    /// Define an IL method from an instruction sequence, encoded at build time.
    pub fn add_il(
        &mut self,
        declaring_type: Token,
        name: impl Into<String>,
        sig: MethodSig,
        locals: Vec<TypeSig>,
        instructions: Vec<Instruction>,
    ) -> Token {
        for instruction in &instructions {
            if let Operand::String(value) = &instruction.operand {
                self.user_string(value);
            }
        }
        if !locals.is_empty() {
            self.signature(StandAloneSig::Locals(locals.clone()));
        }

        self.push_method(
            declaring_type,
            name.into(),
            sig,
            PendingImpl::Assemble {
                locals,
                instructions,
            },
        )
    }

    fn push_method(
        &mut self,
        declaring_type: Token,
        name: String,
        sig: MethodSig,
        pending: PendingImpl,
    ) -> Token {
        let token = next_token(&self.methods, Token::METHOD_DEF);
        let type_name = row(&self.types, declaring_type, Token::TYPE_DEF)
            .map_or_else(|| declaring_type.to_string(), TypeDef::full_name);
        let implementation = match &pending {
            PendingImpl::Ready(implementation) => implementation.clone(),
            PendingImpl::Assemble { .. } => {
                MethodImpl::Il(MethodBody::new(Vec::new(), 0, Token(0), false, Vec::new()))
            }
        };

        self.methods.push(PendingMethod {
            def: MethodDef {
                token,
                declaring_type,
                full_name: format!("{type_name}::{name}"),
                name,
                sig,
                implementation,
            },
            pending,
        });
        token
    }

    /// Finish the module, encoding every method supplied as instructions.
    ///
    /// # Errors
    /// Returns any error the encoder reports for an instruction-defined method, such as
    /// unresolvable operands, unbalanced regions or an inconsistent evaluation stack.
    pub fn build(self) -> Result<Arc<Module>> {
        let mut sources = Vec::new();
        let mut methods = Vec::with_capacity(self.methods.len());
        for (index, pending) in self.methods.into_iter().enumerate() {
            if let PendingImpl::Assemble {
                locals,
                instructions,
            } = pending.pending
            {
                sources.push((index, locals, instructions));
            }
            methods.push(pending.def);
        }

        let mut module = Module {
            name: self.name,
            types: self.types,
            fields: self.fields,
            methods,
            user_strings: self.user_strings,
            signatures: self.signatures,
        };

        let mut bodies = Vec::with_capacity(sources.len());
        {
            let resolver = TokenResolver::Static(&module);
            for (index, locals, instructions) in &sources {
                let method = &module.methods[*index];
                let local_sig = if locals.is_empty() {
                    Token(0)
                } else {
                    module
                        .signature_token(&StandAloneSig::Locals(locals.clone()))
                        .ok_or_else(|| malformed_error!("Locals of {} not interned", method.full_name))?
                };

                let encoded = encode(instructions, &method.sig, &resolver, &method.full_name)?;
                bodies.push((*index, encoded.into_body(local_sig, !locals.is_empty())));
            }
        }

        for (index, body) in bodies {
            module.methods[index].implementation = MethodImpl::Il(body);
        }

        Ok(Arc::new(module))
    }
}
