//! Per-build state handed to transpilers.

use crate::{
    assembly::{Instruction, Label, LabelAllocator},
    metadata::{method::MethodHandle, module::Module, signatures::TypeSig},
};

/// State shared by every transformation step of one build.
///
/// Labels and local slots allocated through the context are unique for the whole build,
/// so independent transpilers never collide. New locals are numbered after every local
/// the original body declares.
pub struct TranspileContext<'a> {
    method: &'a MethodHandle,
    module: &'a Module,
    labels: LabelAllocator,
    locals: Vec<TypeSig>,
}

impl<'a> TranspileContext<'a> {
    /// Create a context for a build of `method`.
    ///
    /// # Arguments
    ///
    /// * `method` - The method being patched
    /// * `module` - The module it lives in
    /// * `labels` - Allocator positioned after every label of the decoded body
    /// * `locals` - Local slots of the decoded body
    #[must_use]
    pub fn new(
        method: &'a MethodHandle,
        module: &'a Module,
        labels: LabelAllocator,
        locals: Vec<TypeSig>,
    ) -> Self {
        TranspileContext {
            method,
            module,
            labels,
            locals,
        }
    }

    /// The method being patched.
    #[must_use]
    pub fn method(&self) -> &'a MethodHandle {
        self.method
    }

    /// The module the method lives in.
    #[must_use]
    pub fn module(&self) -> &'a Module {
        self.module
    }

    /// Allocate a label no other instruction of this build uses.
    pub fn define_label(&mut self) -> Label {
        self.labels.define()
    }

    /// Make sure labels already present in `instructions` are never handed out again.
    ///
    /// The pipeline calls this after every step, so labels a transpiler picked on its own
    /// stay unique.
    pub fn reserve_labels(&mut self, instructions: &[Instruction]) {
        let after = LabelAllocator::after(instructions);
        if after.count() > self.labels.count() {
            self.labels = after;
        }
    }

    /// Declare a new local slot and return its index.
    pub fn declare_local(&mut self, sig: TypeSig) -> u16 {
        #[allow(clippy::cast_possible_truncation)]
        let index = self.locals.len() as u16;
        self.locals.push(sig);
        index
    }

    /// All local slots, original ones first.
    #[must_use]
    pub fn locals(&self) -> &[TypeSig] {
        &self.locals
    }

    /// Consume the context, returning the final local slot table.
    #[must_use]
    pub fn into_locals(self) -> Vec<TypeSig> {
        self.locals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{module::ModuleBuilder, signatures::MethodSig};

    #[test]
    fn locals_follow_existing_slots() {
        let mut builder = ModuleBuilder::new("Test");
        let ty = builder.add_type("", "T");
        let method = builder.add_il(
            ty,
            "M",
            MethodSig::new_static(TypeSig::Void, Vec::new()),
            vec![TypeSig::I4, TypeSig::String],
            vec![Instruction::ret()],
        );
        let module = builder.build().unwrap();
        let handle = MethodHandle::from_module(&module, method).unwrap();

        let mut ctx = TranspileContext::new(
            &handle,
            &module,
            LabelAllocator::new(),
            vec![TypeSig::I4, TypeSig::String],
        );
        assert_eq!(ctx.declare_local(TypeSig::Boolean), 2);
        assert_eq!(ctx.declare_local(TypeSig::I8), 3);
        assert_eq!(ctx.locals().len(), 4);
        assert_eq!(ctx.method().token(), method);
    }

    #[test]
    fn reserve_skips_foreign_labels() {
        let mut builder = ModuleBuilder::new("Test");
        let ty = builder.add_type("", "T");
        let method = builder.add_il(
            ty,
            "M",
            MethodSig::new_static(TypeSig::Void, Vec::new()),
            Vec::new(),
            vec![Instruction::ret()],
        );
        let module = builder.build().unwrap();
        let handle = MethodHandle::from_module(&module, method).unwrap();

        let mut ctx = TranspileContext::new(&handle, &module, LabelAllocator::new(), Vec::new());
        assert_eq!(ctx.define_label(), Label(0));
        ctx.reserve_labels(&[Instruction::br(Label(9)), Instruction::ret().with_label(Label(9))]);
        assert_eq!(ctx.define_label(), Label(10));
    }
}
