//! Transpiler registrations and the transform pipeline.
//!
//! A transpiler receives the full instruction sequence and the build's
//! [`TranspileContext`], and returns the sequence that replaces it. Transpilers run
//! strictly one after another; the output of every step is validated before the next one
//! sees it, and a violation is attributed to the step that produced it.
//!
//! # Ordering
//!
//! Registrations with a higher priority run first. Registrations with equal priority
//! (including all registrations without one, which count as [`DEFAULT_PRIORITY`]) run in
//! registration order.

use std::{
    any::Any,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use log::trace;

use crate::{
    assembly::{validation, Instruction},
    patch::context::TranspileContext,
    Error, Result,
};

/// Priority of registrations that do not set one.
pub const DEFAULT_PRIORITY: i32 = 0;

/// Signature of a transpiler function.
pub type TranspilerFn =
    Arc<dyn Fn(Vec<Instruction>, &mut TranspileContext<'_>) -> Result<Vec<Instruction>> + Send + Sync>;

/// A registered transformation.
#[derive(Clone)]
pub struct TranspilerRegistration {
    sequence: u64,
    priority: Option<i32>,
    name: String,
    function: TranspilerFn,
}

impl fmt::Debug for TranspilerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranspilerRegistration")
            .field("sequence", &self.sequence)
            .field("priority", &self.priority)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl TranspilerRegistration {
    /// Create a registration.
    pub fn new<F>(sequence: u64, name: impl Into<String>, priority: Option<i32>, function: F) -> Self
    where
        F: Fn(Vec<Instruction>, &mut TranspileContext<'_>) -> Result<Vec<Instruction>>
            + Send
            + Sync
            + 'static,
    {
        TranspilerRegistration {
            sequence,
            priority,
            name: name.into(),
            function: Arc::new(function),
        }
    }

    /// Registration order within the plan.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Explicit priority, if any.
    #[must_use]
    pub fn priority(&self) -> Option<i32> {
        self.priority
    }

    /// Name used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the transpiler on `instructions`.
    ///
    /// # Errors
    /// Returns whatever the transpiler function returns, and [`Error::Panicked`] if it
    /// panics.
    pub fn apply(
        &self,
        instructions: Vec<Instruction>,
        context: &mut TranspileContext<'_>,
    ) -> Result<Vec<Instruction>> {
        panic::catch_unwind(AssertUnwindSafe(move || (self.function)(instructions, context)))
            .unwrap_or_else(|payload| Err(Error::Panicked(panic_message(payload.as_ref()))))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Sort registrations into execution order.
#[must_use]
pub fn ordered(registrations: &[TranspilerRegistration]) -> Vec<&TranspilerRegistration> {
    let mut ordered: Vec<&TranspilerRegistration> = registrations.iter().collect();
    ordered.sort_by(|a, b| {
        let pa = a.priority.unwrap_or(DEFAULT_PRIORITY);
        let pb = b.priority.unwrap_or(DEFAULT_PRIORITY);
        pb.cmp(&pa).then(a.sequence.cmp(&b.sequence))
    });
    ordered
}

/// Run `registrations` over `instructions` in execution order, validating after each.
///
/// # Errors
/// Returns [`Error::Transpiler`] if a transpiler fails, and [`Error::InvariantViolation`]
/// or [`Error::InvalidOperand`] if its output is malformed.
pub fn run(
    mut instructions: Vec<Instruction>,
    registrations: &[TranspilerRegistration],
    context: &mut TranspileContext<'_>,
) -> Result<Vec<Instruction>> {
    for registration in ordered(registrations) {
        let before = instructions.len();
        instructions = registration
            .apply(instructions, context)
            .map_err(|error| match error {
                Error::InvariantViolation { .. } => error,
                other => Error::Transpiler {
                    name: registration.name.clone(),
                    source: Box::new(other),
                },
            })?;
        validation::validate(&instructions, &registration.name)?;
        context.reserve_labels(&instructions);

        trace!(
            "Transpiler '{}' on {}: {} -> {} instructions",
            registration.name,
            context.method().name(),
            before,
            instructions.len()
        );
    }

    Ok(instructions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{Label, LabelAllocator, OpCode},
        metadata::{
            method::MethodHandle,
            module::{Module, ModuleBuilder},
            signatures::{MethodSig, TypeSig},
        },
        InvariantKind,
    };
    use std::sync::Mutex;

    fn fixture() -> (Arc<Module>, MethodHandle) {
        let mut builder = ModuleBuilder::new("Test");
        let ty = builder.add_type("", "T");
        let method = builder.add_il(
            ty,
            "M",
            MethodSig::new_static(TypeSig::I4, Vec::new()),
            Vec::new(),
            vec![Instruction::ldc_i4(1), Instruction::ret()],
        );
        let module = builder.build().unwrap();
        let handle = MethodHandle::from_module(&module, method).unwrap();
        (module, handle)
    }

    fn body() -> Vec<Instruction> {
        vec![Instruction::ldc_i4(1), Instruction::ret()]
    }

    #[test]
    fn priority_then_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let make = |name: &'static str, sequence, priority| {
            let log = log.clone();
            TranspilerRegistration::new(sequence, name, priority, move |code, _| {
                log.lock().unwrap().push(name);
                Ok(code)
            })
        };
        let registrations = vec![
            make("a", 0, None),
            make("b", 1, Some(10)),
            make("c", 2, None),
            make("d", 3, Some(10)),
            make("e", 4, Some(-5)),
        ];

        let (module, handle) = fixture();
        let mut ctx = TranspileContext::new(&handle, &module, LabelAllocator::new(), Vec::new());
        run(body(), &registrations, &mut ctx).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["b", "d", "a", "c", "e"]);
    }

    #[test]
    fn each_step_sees_previous_output() {
        let registrations = vec![
            TranspilerRegistration::new(0, "double", None, |mut code, _| {
                code.insert(1, Instruction::ldc_i4(2));
                code.insert(2, Instruction::simple(OpCode::Mul));
                Ok(code)
            }),
            TranspilerRegistration::new(1, "count", None, |code, _| {
                assert_eq!(code.len(), 4);
                Ok(code)
            }),
        ];
        let (module, handle) = fixture();
        let mut ctx = TranspileContext::new(&handle, &module, LabelAllocator::new(), Vec::new());
        let out = run(body(), &registrations, &mut ctx).unwrap();
        assert_eq!(out[2].opcode, OpCode::Mul);
    }

    #[test]
    fn violation_names_the_transpiler() {
        let registrations = vec![TranspilerRegistration::new(0, "dangling", None, |mut code, _| {
            code.insert(0, Instruction::br(Label(42)));
            Ok(code)
        })];
        let (module, handle) = fixture();
        let mut ctx = TranspileContext::new(&handle, &module, LabelAllocator::new(), Vec::new());
        match run(body(), &registrations, &mut ctx) {
            Err(Error::InvariantViolation {
                kind, transpiler, ..
            }) => {
                assert_eq!(kind, InvariantKind::DanglingLabel);
                assert_eq!(transpiler, "dangling");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn failing_transpiler_is_wrapped() {
        let registrations = vec![TranspilerRegistration::new(0, "refuse", None, |_, _| {
            Err(Error::PatchSignature("nope".into()))
        })];
        let (module, handle) = fixture();
        let mut ctx = TranspileContext::new(&handle, &module, LabelAllocator::new(), Vec::new());
        assert!(matches!(
            run(body(), &registrations, &mut ctx),
            Err(Error::Transpiler { name, .. }) if name == "refuse"
        ));
    }

    #[test]
    fn panicking_transpiler_becomes_an_error() {
        let registrations = vec![TranspilerRegistration::new(0, "boom", None, |_, _| {
            panic!("index out of range")
        })];
        let (module, handle) = fixture();
        let mut ctx = TranspileContext::new(&handle, &module, LabelAllocator::new(), Vec::new());
        match run(body(), &registrations, &mut ctx) {
            Err(Error::Transpiler { name, source }) => {
                assert_eq!(name, "boom");
                assert!(matches!(*source, Error::Panicked(ref message) if message == "index out of range"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn labels_stay_unique_after_foreign_labels() {
        let registrations = vec![
            TranspilerRegistration::new(0, "manual", None, |mut code, _| {
                let last = code.len() - 1;
                code[last].labels.push(Label(3));
                code.insert(0, Instruction::br(Label(3)));
                Ok(code)
            }),
            TranspilerRegistration::new(1, "fresh", None, |code, ctx| {
                assert_eq!(ctx.define_label(), Label(4));
                Ok(code)
            }),
        ];
        let (module, handle) = fixture();
        let mut ctx = TranspileContext::new(&handle, &module, LabelAllocator::new(), Vec::new());
        run(body(), &registrations, &mut ctx).unwrap();
    }
}
