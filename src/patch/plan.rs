//! The set of registrations for one patched method.

use crate::{
    assembly::Instruction,
    metadata::{method::MethodHandle, token::Token},
    patch::{context::TranspileContext, transpiler::TranspilerRegistration},
    Result,
};

/// A prefix or suffix registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookRegistration {
    /// Registration order within the plan
    pub sequence: u64,
    /// The hook method, defined in the same module
    pub method: Token,
}

/// Every transformation registered for one method.
///
/// Registering never triggers a build; the coordinator rebuilds from the original body on
/// commit, so the order of calls on a plan is the only thing that matters.
#[derive(Debug, Clone)]
pub struct PatchPlan {
    target: MethodHandle,
    prefixes: Vec<HookRegistration>,
    suffixes: Vec<HookRegistration>,
    transpilers: Vec<TranspilerRegistration>,
    post_transpilers: Vec<TranspilerRegistration>,
    next_sequence: u64,
}

impl PatchPlan {
    /// An empty plan for `target`.
    #[must_use]
    pub fn new(target: MethodHandle) -> Self {
        PatchPlan {
            target,
            prefixes: Vec::new(),
            suffixes: Vec::new(),
            transpilers: Vec::new(),
            post_transpilers: Vec::new(),
            next_sequence: 0,
        }
    }

    fn sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    /// The method this plan patches.
    #[must_use]
    pub fn target(&self) -> &MethodHandle {
        &self.target
    }

    /// Register a prefix.
    pub fn add_prefix(&mut self, method: Token) -> &mut Self {
        let sequence = self.sequence();
        self.prefixes.push(HookRegistration { sequence, method });
        self
    }

    /// Register a suffix.
    pub fn add_suffix(&mut self, method: Token) -> &mut Self {
        let sequence = self.sequence();
        self.suffixes.push(HookRegistration { sequence, method });
        self
    }

    /// Register a transpiler applied to the original body.
    pub fn add_transpiler<F>(&mut self, name: impl Into<String>, function: F) -> &mut Self
    where
        F: Fn(Vec<Instruction>, &mut TranspileContext<'_>) -> Result<Vec<Instruction>>
            + Send
            + Sync
            + 'static,
    {
        let sequence = self.sequence();
        self.transpilers
            .push(TranspilerRegistration::new(sequence, name, None, function));
        self
    }

    /// Register a transpiler with an explicit priority. Higher priorities run first.
    pub fn add_transpiler_with_priority<F>(
        &mut self,
        name: impl Into<String>,
        priority: i32,
        function: F,
    ) -> &mut Self
    where
        F: Fn(Vec<Instruction>, &mut TranspileContext<'_>) -> Result<Vec<Instruction>>
            + Send
            + Sync
            + 'static,
    {
        let sequence = self.sequence();
        self.transpilers.push(TranspilerRegistration::new(
            sequence,
            name,
            Some(priority),
            function,
        ));
        self
    }

    /// Register a transpiler applied to the composed wrapper body.
    pub fn add_post_transpiler<F>(&mut self, name: impl Into<String>, function: F) -> &mut Self
    where
        F: Fn(Vec<Instruction>, &mut TranspileContext<'_>) -> Result<Vec<Instruction>>
            + Send
            + Sync
            + 'static,
    {
        let sequence = self.sequence();
        self.post_transpilers
            .push(TranspilerRegistration::new(sequence, name, None, function));
        self
    }

    /// Remove every registration of the hook method `method`. Returns `true` if any was
    /// removed.
    pub fn remove_hook(&mut self, method: Token) -> bool {
        let before = self.prefixes.len() + self.suffixes.len();
        self.prefixes.retain(|hook| hook.method != method);
        self.suffixes.retain(|hook| hook.method != method);
        before != self.prefixes.len() + self.suffixes.len()
    }

    /// Remove every transpiler and post-transpiler called `name`. Returns `true` if any
    /// was removed.
    pub fn remove_transpiler(&mut self, name: &str) -> bool {
        let before = self.transpilers.len() + self.post_transpilers.len();
        self.transpilers.retain(|t| t.name() != name);
        self.post_transpilers.retain(|t| t.name() != name);
        before != self.transpilers.len() + self.post_transpilers.len()
    }

    /// Drop every registration.
    pub fn clear(&mut self) {
        self.prefixes.clear();
        self.suffixes.clear();
        self.transpilers.clear();
        self.post_transpilers.clear();
    }

    /// Registered prefixes in registration order.
    #[must_use]
    pub fn prefixes(&self) -> &[HookRegistration] {
        &self.prefixes
    }

    /// Registered suffixes in registration order.
    #[must_use]
    pub fn suffixes(&self) -> &[HookRegistration] {
        &self.suffixes
    }

    /// Transpilers applied to the original body.
    #[must_use]
    pub fn transpilers(&self) -> &[TranspilerRegistration] {
        &self.transpilers
    }

    /// Transpilers applied to the composed body.
    #[must_use]
    pub fn post_transpilers(&self) -> &[TranspilerRegistration] {
        &self.post_transpilers
    }

    /// Returns `true` if the plan has prefixes or suffixes.
    #[must_use]
    pub fn has_hooks(&self) -> bool {
        !self.prefixes.is_empty() || !self.suffixes.is_empty()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.has_hooks() && self.transpilers.is_empty() && self.post_transpilers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        module::ModuleBuilder,
        signatures::{MethodSig, TypeSig},
    };

    fn plan() -> PatchPlan {
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
        PatchPlan::new(MethodHandle::from_module(&module, method).unwrap())
    }

    #[test]
    fn registrations_share_one_sequence() {
        let mut plan = plan();
        assert!(plan.is_empty());

        plan.add_prefix(Token(0x0600_0002))
            .add_transpiler("t", |code, _| Ok(code))
            .add_suffix(Token(0x0600_0003))
            .add_post_transpiler("p", |code, _| Ok(code));

        assert_eq!(plan.prefixes()[0].sequence, 0);
        assert_eq!(plan.transpilers()[0].sequence(), 1);
        assert_eq!(plan.suffixes()[0].sequence, 2);
        assert_eq!(plan.post_transpilers()[0].sequence(), 3);
        assert!(plan.has_hooks());
    }

    #[test]
    fn removal() {
        let mut plan = plan();
        plan.add_prefix(Token(0x0600_0002))
            .add_suffix(Token(0x0600_0002))
            .add_transpiler_with_priority("t", 5, |code, _| Ok(code));

        assert!(plan.remove_hook(Token(0x0600_0002)));
        assert!(!plan.remove_hook(Token(0x0600_0002)));
        assert!(!plan.has_hooks());
        assert_eq!(plan.transpilers()[0].priority(), Some(5));
        assert!(plan.remove_transpiler("t"));
        assert!(plan.is_empty());
    }
}
