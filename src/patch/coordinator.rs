//! The patch coordinator: per-method plans, builds and installation.
//!
//! Every patched method owns a slot holding its [`PatchPlan`] and build state, guarded by
//! its own mutex. Registrations only edit the plan; [`PatchCoordinator::commit`] rebuilds
//! the method from its original body:
//!
//! 1. decode the original body through the module tables,
//! 2. run the transpilers,
//! 3. compose prefixes and suffixes around the result,
//! 4. run the post-transpilers,
//! 5. encode into a fresh dynamic scope and install the synthesized method.
//!
//! Any failure is logged and reported as [`BuildResult::Failed`]; the install table is
//! left untouched, so the previously installed method (or the original) stays in effect.
//!
//! # Thread Safety
//!
//! Builds of one method are serialized by its slot mutex. Builds of different methods are
//! independent, and [`PatchCoordinator::commit_all`] runs them on the rayon pool.
//!
//! A build interrupted by a panic poisons its slot. The next access recovers it: the
//! state falls back to whatever the install table holds and the plan is rebuilt on the
//! next commit.

use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use log::{debug, error, warn};
use rayon::prelude::*;

use crate::{
    assembly::{decode_method, encode, listing, validation, DecodedMethod, Instruction},
    emulation::Interpreter,
    metadata::{
        method::MethodHandle,
        module::Module,
        resolver::{DynamicScope, ResolvedEntity, TokenResolver},
        signatures::StandAloneSig,
        token::Token,
    },
    patch::{
        compose::compose,
        config::PatchConfig,
        context::TranspileContext,
        install::{InstallTable, SynthesizedMethod},
        plan::PatchPlan,
        transpiler,
    },
    Error, Result,
};

/// Stage name reported for violations introduced by composition.
pub const COMPOSITION_STAGE: &str = "composition";

/// Build state of one method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum PatchState {
    /// Calls run the original body
    Unpatched,
    /// A build is in progress
    Building,
    /// Calls run an installed synthesized method
    Patched,
}

/// Outcome of a commit.
#[derive(Debug)]
pub enum BuildResult {
    /// The new method is installed
    Patched(Arc<SynthesizedMethod>),
    /// The build failed; whatever was installed before stays installed
    Failed {
        /// Why the build failed
        reason: Error,
        /// IL offset the failure is attached to, if any
        offset: Option<u32>,
    },
    /// The plan was empty; the original body is in effect again
    Reverted,
}

impl BuildResult {
    /// Returns `true` for [`BuildResult::Patched`].
    #[must_use]
    pub fn is_patched(&self) -> bool {
        matches!(self, BuildResult::Patched(_))
    }

    /// Returns `true` for [`BuildResult::Failed`].
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, BuildResult::Failed { .. })
    }

    /// The installed method of a successful build.
    #[must_use]
    pub fn method(&self) -> Option<&Arc<SynthesizedMethod>> {
        match self {
            BuildResult::Patched(method) => Some(method),
            _ => None,
        }
    }
}

struct PatchSlot {
    plan: PatchPlan,
    state: PatchState,
    generation: u64,
    last_error: Option<String>,
    dirty: bool,
}

impl PatchSlot {
    fn new(target: MethodHandle) -> Self {
        PatchSlot {
            plan: PatchPlan::new(target),
            state: PatchState::Unpatched,
            generation: 0,
            last_error: None,
            dirty: false,
        }
    }
}

type SharedSlot = Arc<Mutex<PatchSlot>>;

/// Owns the patch plans of a module and installs their builds.
///
/// # Examples
///
/// ```rust
/// use dotpatch::prelude::*;
///
/// let mut builder = ModuleBuilder::new("Game");
/// let ty = builder.add_type("Game", "Score");
/// let get = builder.add_il(
///     ty,
///     "Get",
///     MethodSig::new_static(TypeSig::I4, Vec::new()),
///     Vec::new(),
///     vec![Instruction::ldc_i4(10), Instruction::ret()],
/// );
/// let coordinator = PatchCoordinator::new(builder.build()?);
///
/// coordinator.add_transpiler(get, "double", |mut code, _| {
///     code.insert(1, Instruction::ldc_i4(2));
///     code.insert(2, Instruction::simple(OpCode::Mul));
///     Ok(code)
/// })?;
/// assert!(coordinator.commit(get)?.is_patched());
///
/// let result = coordinator.interpreter().invoke(get, Vec::new())?;
/// assert_eq!(result, Value::I4(20));
/// # Ok::<(), dotpatch::Error>(())
/// ```
pub struct PatchCoordinator {
    module: Arc<Module>,
    config: PatchConfig,
    slots: DashMap<Token, SharedSlot>,
    installs: Arc<InstallTable>,
}

impl PatchCoordinator {
    /// Create a coordinator with the default configuration.
    #[must_use]
    pub fn new(module: Arc<Module>) -> Self {
        Self::with_config(module, PatchConfig::default())
    }

    /// Create a coordinator with an explicit configuration.
    #[must_use]
    pub fn with_config(module: Arc<Module>, config: PatchConfig) -> Self {
        PatchCoordinator {
            module,
            config,
            slots: DashMap::new(),
            installs: Arc::new(InstallTable::new()),
        }
    }

    /// The module being patched.
    #[must_use]
    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &PatchConfig {
        &self.config
    }

    /// The table call sites dispatch through.
    #[must_use]
    pub fn install_table(&self) -> &Arc<InstallTable> {
        &self.installs
    }

    /// An interpreter that executes the module through this coordinator's install table.
    #[must_use]
    pub fn interpreter(&self) -> Interpreter {
        Interpreter::new(self.module.clone(), self.installs.clone())
    }

    fn slot(&self, method: Token) -> Result<SharedSlot> {
        if let Some(slot) = self.slots.get(&method) {
            return Ok(slot.value().clone());
        }

        let def = self.module.method(method).ok_or(Error::MethodNotFound(method))?;
        if def.body().is_none() {
            return Err(Error::NotIl(method));
        }
        let handle = MethodHandle::from_module(&self.module, method)?;

        Ok(self
            .slots
            .entry(method)
            .or_insert_with(|| Arc::new(Mutex::new(PatchSlot::new(handle))))
            .value()
            .clone())
    }

    fn existing_slot(&self, method: Token) -> Option<SharedSlot> {
        self.slots.get(&method).map(|slot| slot.value().clone())
    }

    /// Lock `slot`, recovering it from a build that never finished.
    fn lock_slot<'s>(&self, slot: &'s SharedSlot) -> MutexGuard<'s, PatchSlot> {
        let mut guard = lock!(slot);
        // Building only outlives a commit if the commit unwound.
        if guard.state == PatchState::Building {
            let token = guard.plan.target().token();
            warn!(
                "Recovering {} from an interrupted build",
                guard.plan.target().name()
            );
            guard.state = if self.installs.get(token).is_some() {
                PatchState::Patched
            } else {
                PatchState::Unpatched
            };
            guard.dirty = true;
            guard.last_error = Some("build interrupted by a panic".to_string());
        }
        guard
    }

    /// Edit the plan of `method` under its lock. The plan is built on the next commit.
    ///
    /// # Errors
    /// Returns [`Error::MethodNotFound`] or [`Error::NotIl`] if `method` cannot be patched.
    pub fn edit_plan<R>(&self, method: Token, edit: impl FnOnce(&mut PatchPlan) -> R) -> Result<R> {
        let slot = self.slot(method)?;
        let mut slot = self.lock_slot(&slot);
        slot.dirty = true;
        Ok(edit(&mut slot.plan))
    }

    /// A copy of the current plan of `method`, if it has one.
    #[must_use]
    pub fn plan(&self, method: Token) -> Option<PatchPlan> {
        let slot = self.existing_slot(method)?;
        let plan = self.lock_slot(&slot).plan.clone();
        Some(plan)
    }

    fn check_hook(&self, hook: Token) -> Result<()> {
        self.module
            .method(hook)
            .map(|_| ())
            .ok_or(Error::MethodNotFound(hook))
    }

    /// Register `hook` as a prefix of `method`.
    ///
    /// # Errors
    /// Returns [`Error::MethodNotFound`] if either method does not exist.
    pub fn add_prefix(&self, method: Token, hook: Token) -> Result<()> {
        self.check_hook(hook)?;
        self.edit_plan(method, |plan| {
            plan.add_prefix(hook);
        })
    }

    /// Register `hook` as a suffix of `method`.
    ///
    /// # Errors
    /// Returns [`Error::MethodNotFound`] if either method does not exist.
    pub fn add_suffix(&self, method: Token, hook: Token) -> Result<()> {
        self.check_hook(hook)?;
        self.edit_plan(method, |plan| {
            plan.add_suffix(hook);
        })
    }

    /// Register a transpiler on `method`.
    ///
    /// # Errors
    /// Returns [`Error::MethodNotFound`] or [`Error::NotIl`] if `method` cannot be patched.
    pub fn add_transpiler<F>(&self, method: Token, name: &str, function: F) -> Result<()>
    where
        F: Fn(Vec<Instruction>, &mut TranspileContext<'_>) -> Result<Vec<Instruction>>
            + Send
            + Sync
            + 'static,
    {
        self.edit_plan(method, |plan| {
            plan.add_transpiler(name, function);
        })
    }

    /// Register a post-transpiler on `method`.
    ///
    /// # Errors
    /// Returns [`Error::MethodNotFound`] or [`Error::NotIl`] if `method` cannot be patched.
    pub fn add_post_transpiler<F>(&self, method: Token, name: &str, function: F) -> Result<()>
    where
        F: Fn(Vec<Instruction>, &mut TranspileContext<'_>) -> Result<Vec<Instruction>>
            + Send
            + Sync
            + 'static,
    {
        self.edit_plan(method, |plan| {
            plan.add_post_transpiler(name, function);
        })
    }

    /// Rebuild `method` from its plan and install the result.
    ///
    /// Build failures are not errors of this call: they are reported as
    /// [`BuildResult::Failed`] and leave the install table unchanged.
    ///
    /// # Errors
    /// Returns [`Error::MethodNotFound`] or [`Error::NotIl`] if `method` cannot be patched.
    pub fn commit(&self, method: Token) -> Result<BuildResult> {
        let slot = self.slot(method)?;
        let mut slot = self.lock_slot(&slot);
        Ok(self.commit_slot(&mut slot))
    }

    /// Rebuild every plan edited since its last commit.
    ///
    /// With [`PatchConfig::parallel`] the builds run on the rayon pool. Results are sorted by
    /// method token.
    pub fn commit_all(&self) -> Vec<(Token, BuildResult)> {
        let slots: Vec<(Token, SharedSlot)> = self
            .slots
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let build = |(token, slot): &(Token, SharedSlot)| -> Option<(Token, BuildResult)> {
            let mut slot = self.lock_slot(slot);
            if !slot.dirty {
                return None;
            }
            Some((*token, self.commit_slot(&mut slot)))
        };

        let mut results: Vec<(Token, BuildResult)> = if self.config.parallel {
            slots.par_iter().filter_map(build).collect()
        } else {
            slots.iter().filter_map(build).collect()
        };
        results.sort_by_key(|(token, _)| *token);

        debug!("Committed {} plan(s)", results.len());
        results
    }

    /// Drop every registration of `method` and route its calls back to the original body.
    /// Returns `true` if a synthesized method was uninstalled.
    pub fn revert(&self, method: Token) -> bool {
        let Some(slot) = self.existing_slot(method) else {
            return false;
        };

        let mut slot = self.lock_slot(&slot);
        slot.plan.clear();
        slot.dirty = false;
        slot.state = PatchState::Unpatched;
        slot.last_error = None;

        let removed = self.installs.uninstall(method).is_some();
        if removed {
            debug!("Reverted {}", slot.plan.target().name());
        }
        removed
    }

    /// Build state of `method`.
    #[must_use]
    pub fn state(&self, method: Token) -> PatchState {
        let Some(slot) = self.existing_slot(method) else {
            return PatchState::Unpatched;
        };
        let state = self.lock_slot(&slot).state;
        state
    }

    /// The synthesized method installed for `method`.
    #[must_use]
    pub fn installed(&self, method: Token) -> Option<Arc<SynthesizedMethod>> {
        self.installs.get(method)
    }

    /// Message of the most recent failed build of `method`, cleared by a successful one.
    #[must_use]
    pub fn last_error(&self, method: Token) -> Option<String> {
        let slot = self.existing_slot(method)?;
        let last_error = self.lock_slot(&slot).last_error.clone();
        last_error
    }

    fn commit_slot(&self, slot: &mut PatchSlot) -> BuildResult {
        let token = slot.plan.target().token();
        let prior = slot.state;
        let generation = slot.generation + 1;

        slot.state = PatchState::Building;
        slot.dirty = false;
        debug!(
            "Building {} (generation {generation})",
            slot.plan.target().name()
        );

        match self.build(&slot.plan, generation) {
            Ok(Some(method)) => {
                slot.generation = generation;
                slot.state = PatchState::Patched;
                slot.last_error = None;
                self.installs.install(method.clone());
                debug!(
                    "Installed {} ({} bytes of IL)",
                    method.handle().name(),
                    method.body().size_code()
                );
                BuildResult::Patched(method)
            }
            Ok(None) => {
                self.installs.uninstall(token);
                slot.state = PatchState::Unpatched;
                slot.last_error = None;
                BuildResult::Reverted
            }
            Err(reason) => {
                error!(
                    "Patching {} failed: {reason}",
                    slot.plan.target().name()
                );
                slot.state = prior;
                slot.last_error = Some(reason.to_string());
                BuildResult::Failed {
                    offset: reason.offset(),
                    reason,
                }
            }
        }
    }

    fn build(&self, plan: &PatchPlan, generation: u64) -> Result<Option<Arc<SynthesizedMethod>>> {
        if plan.is_empty() {
            return Ok(None);
        }

        let target = plan.target();
        let module = self.module.as_ref();
        let DecodedMethod {
            instructions,
            locals,
            labels,
            init_locals,
            ..
        } = decode_method(target, module, None)?;

        let mut context = TranspileContext::new(target, module, labels, locals);
        let mut code = transpiler::run(instructions, plan.transpilers(), &mut context)?;
        if plan.has_hooks() {
            code = compose(code, plan.prefixes(), plan.suffixes(), &mut context)?;
            validation::validate(&code, COMPOSITION_STAGE)?;
            context.reserve_labels(&code);
        }
        code = transpiler::run(code, plan.post_transpilers(), &mut context)?;
        let locals = context.into_locals();

        let handle = target.synthesized();
        let scope = DynamicScope::new();
        let resolver = TokenResolver::Synthesized {
            module,
            scope: &scope,
        };
        let encoded = encode(&code, handle.sig(), &resolver, handle.name())?;
        let local_sig = if locals.is_empty() {
            Token(0)
        } else {
            scope.token_for(&ResolvedEntity::Signature(Arc::new(StandAloneSig::Locals(
                locals.clone(),
            ))))
        };
        let body = encoded.into_body(local_sig, init_locals || !locals.is_empty());

        if self.config.dump_il {
            debug!(
                "{} generation {generation}:\n{}",
                handle.name(),
                listing(&code)
            );
        }

        Ok(Some(Arc::new(SynthesizedMethod::new(
            handle, body, scope, locals, code, generation,
        ))))
    }
}
