//! Prefix and suffix composition.
//!
//! Wraps a (possibly transpiled) method body into a new body that calls the registered
//! hooks around it:
//!
//! ```text
//!         <prefix 1 arguments> call prefix1        [brfalse SKIP if it returns bool]
//!         ...
//!         <body, every ret replaced by: stloc result; br/leave SUFFIX>
//! SKIP:   ldc.i4.1; stloc skipped                  (only if a prefix returns bool)
//! SUFFIX: <suffix 1 arguments> call suffix1        [pop if it returns a value]
//!         ...
//!         ldloc result; ret
//! ```
//!
//! # Parameter Binding
//!
//! Hooks are static methods whose parameters are bound by name:
//!
//! | Name | Binds to |
//! |------|----------|
//! | a parameter name of the target | that argument (its address if declared by-ref) |
//! | `__instance` | `this` of an instance target |
//! | `__result` | the return value slot (its address if declared by-ref) |
//! | `__prefixSkip` | in suffixes, whether a prefix skipped the original body |
//!
//! Anything that cannot be bound fails the build with [`Error::PatchSignature`].

use log::trace;

use crate::{
    assembly::{ExceptionMarker, Instruction, Label, OpCode},
    metadata::{
        module::{MethodDef, Module},
        signatures::{MethodSig, TypeSig},
        token::Token,
    },
    patch::{context::TranspileContext, plan::HookRegistration},
    Error, Result,
};

/// Hook parameter bound to `this`.
pub const INSTANCE_PARAM: &str = "__instance";
/// Hook parameter bound to the return value.
pub const RESULT_PARAM: &str = "__result";
/// Suffix parameter bound to whether the original body was skipped.
pub const PREFIX_SKIP_PARAM: &str = "__prefixSkip";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HookKind {
    Prefix,
    Suffix,
}

struct Slots {
    result: Option<u16>,
    skipped: Option<u16>,
}

fn signature_error(hook: &MethodDef, detail: impl std::fmt::Display) -> Error {
    Error::PatchSignature(format!("{}: {}", hook.full_name, detail))
}

fn compatible(expected: &TypeSig, declared: &TypeSig) -> bool {
    declared == expected || *declared == TypeSig::Object
}

fn hook_def(module: &Module, hook: Token) -> Result<&MethodDef> {
    module.method(hook).ok_or(Error::MethodNotFound(hook))
}

/// Argument loads and the call of one hook.
fn hook_call(
    hook: &MethodDef,
    target: &MethodSig,
    slots: &Slots,
    kind: HookKind,
) -> Result<Vec<Instruction>> {
    if hook.sig.has_this {
        return Err(signature_error(hook, "hooks must be static"));
    }

    let mut code = Vec::with_capacity(hook.sig.params.len() + 1);
    for param in &hook.sig.params {
        let by_ref = param.sig.is_by_ref();
        let declared = param.sig.element();

        let load = match param.name.as_str() {
            INSTANCE_PARAM => {
                if !target.has_this {
                    return Err(signature_error(hook, "__instance on a static method"));
                }
                if by_ref {
                    return Err(signature_error(hook, "__instance cannot be by-ref"));
                }
                Instruction::ldarg(0)
            }
            RESULT_PARAM => {
                let slot = slots
                    .result
                    .ok_or_else(|| signature_error(hook, "__result on a method returning void"))?;
                if !compatible(&target.return_type, declared) {
                    return Err(signature_error(
                        hook,
                        format!("__result is {declared}, method returns {}", target.return_type),
                    ));
                }
                if by_ref {
                    Instruction::ldloca(slot)
                } else {
                    Instruction::ldloc(slot)
                }
            }
            PREFIX_SKIP_PARAM => {
                if kind == HookKind::Prefix {
                    return Err(signature_error(hook, "__prefixSkip is only bound in suffixes"));
                }
                if by_ref || *declared != TypeSig::Boolean {
                    return Err(signature_error(hook, "__prefixSkip must be a bool by value"));
                }
                slots
                    .skipped
                    .map_or_else(|| Instruction::ldc_i4(0), Instruction::ldloc)
            }
            name => {
                let index = target.arg_index_of(name).ok_or_else(|| {
                    signature_error(hook, format!("no parameter named '{name}' to bind"))
                })?;
                let actual = target.arg_type(index).unwrap_or(&TypeSig::Object);
                if !compatible(actual, declared) {
                    return Err(signature_error(
                        hook,
                        format!("'{name}' is {declared}, argument is {actual}"),
                    ));
                }
                if by_ref {
                    Instruction::ldarga(index)
                } else {
                    Instruction::ldarg(index)
                }
            }
        };
        code.push(load);
    }

    code.push(Instruction::call(hook.token));
    Ok(code)
}

/// Replace every `ret` of `body` by a store of the return value and a jump to `target`.
///
/// Inside a protected region the jump is a `leave`. Labels and begin markers of the `ret`
/// move to the first replacement instruction, `End` markers to the last. A `tail.` prefix
/// on the call before a replaced `ret` is dropped.
fn redirect_returns(body: Vec<Instruction>, result: Option<u16>, target: Label) -> Vec<Instruction> {
    let mut out = Vec::with_capacity(body.len() + 4);
    let mut depth = 0_usize;

    for mut instruction in body {
        depth += instruction
            .blocks
            .iter()
            .filter(|marker| **marker == ExceptionMarker::TryBegin)
            .count();
        let closing = instruction
            .blocks
            .iter()
            .filter(|marker| **marker == ExceptionMarker::End)
            .count();

        if instruction.opcode == OpCode::Ret {
            drop_tail_prefix(&mut out);
            let mut replacement = Vec::with_capacity(2);
            if let Some(slot) = result {
                replacement.push(Instruction::stloc(slot));
            }
            replacement.push(if depth > 0 {
                Instruction::leave(target)
            } else {
                Instruction::br(target)
            });

            let (ends, begins): (Vec<ExceptionMarker>, Vec<ExceptionMarker>) = instruction
                .blocks
                .drain(..)
                .partition(|marker| *marker == ExceptionMarker::End);
            replacement[0].labels.append(&mut instruction.labels);
            replacement[0].blocks = begins;
            if let Some(last) = replacement.last_mut() {
                last.blocks.extend(ends);
            }
            out.extend(replacement);
        } else {
            out.push(instruction);
        }

        depth = depth.saturating_sub(closing);
    }

    out
}

/// `tail.` must be followed by `call` and `ret`; remove it once the `ret` goes away.
fn drop_tail_prefix(out: &mut Vec<Instruction>) {
    let len = out.len();
    if len < 2 || out[len - 2].opcode != OpCode::Tail {
        return;
    }

    let mut prefix = out.remove(len - 2);
    let call = &mut out[len - 2];
    prefix.blocks.append(&mut call.blocks);
    call.blocks = prefix.blocks;
    prefix.labels.append(&mut call.labels);
    call.labels = prefix.labels;
}

/// Wrap `body` with calls to `prefixes` and `suffixes`.
///
/// New locals (the return value slot and the skip flag) and labels are allocated through
/// `context`.
///
/// # Errors
/// Returns [`Error::PatchSignature`] if a hook cannot be bound to the target and
/// [`Error::MethodNotFound`] if a hook does not exist.
pub fn compose(
    body: Vec<Instruction>,
    prefixes: &[HookRegistration],
    suffixes: &[HookRegistration],
    context: &mut TranspileContext<'_>,
) -> Result<Vec<Instruction>> {
    let module = context.module();
    let target = context.method().sig().clone();

    let prefix_defs = prefixes
        .iter()
        .map(|hook| hook_def(module, hook.method))
        .collect::<Result<Vec<_>>>()?;
    let suffix_defs = suffixes
        .iter()
        .map(|hook| hook_def(module, hook.method))
        .collect::<Result<Vec<_>>>()?;

    let result = target
        .returns_value()
        .then(|| context.declare_local(target.return_type.clone()));
    let skipped = prefix_defs
        .iter()
        .any(|def| def.sig.return_type == TypeSig::Boolean)
        .then(|| context.declare_local(TypeSig::Boolean));
    let slots = Slots { result, skipped };

    let skip_label = context.define_label();
    let suffix_label = context.define_label();

    let mut code = Vec::new();
    for def in &prefix_defs {
        code.extend(hook_call(def, &target, &slots, HookKind::Prefix)?);
        match &def.sig.return_type {
            TypeSig::Void => {}
            TypeSig::Boolean => code.push(Instruction::branch(OpCode::Brfalse, skip_label)?),
            other => {
                return Err(signature_error(
                    def,
                    format!("prefix returns {other}, expected void or bool"),
                ))
            }
        }
    }

    code.extend(redirect_returns(body, result, suffix_label));

    if let Some(slot) = skipped {
        code.push(Instruction::ldc_i4(1).with_label(skip_label));
        code.push(Instruction::stloc(slot));
    }

    let mut tail = Vec::new();
    for def in &suffix_defs {
        tail.extend(hook_call(def, &target, &slots, HookKind::Suffix)?);
        if def.sig.returns_value() {
            tail.push(Instruction::simple(OpCode::Pop));
        }
    }
    if let Some(slot) = result {
        tail.push(Instruction::ldloc(slot));
    }
    tail.push(Instruction::ret());
    tail[0].labels.push(suffix_label);
    code.extend(tail);

    trace!(
        "Composed {} with {} prefix(es) and {} suffix(es)",
        context.method().name(),
        prefix_defs.len(),
        suffix_defs.len()
    );
    Ok(code)
}
