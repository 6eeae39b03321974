//! The reference interpreter.
//!
//! Executes method bodies instruction by instruction. Every call, including the entry
//! call of [`Interpreter::invoke`], looks the callee up in the [`InstallTable`] first, so a
//! committed patch takes effect for the next call without touching callers.

use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, trace};

use crate::{
    assembly::{decode_method, Instruction, Label, OpCode, Operand},
    emulation::{
        config::EmulationLimits,
        ops,
        program::{ClauseKind, Program},
        EmulationError, ObjectRef, Value, ValueRef,
    },
    metadata::{
        method::MethodHandle,
        module::{MethodImpl, Module, NativeMethod},
        token::Token,
    },
    patch::{InstallTable, SynthesizedMethod},
    Error, Result,
};

/// Why execution of a block stopped abnormally.
enum Fault {
    /// A managed exception is propagating
    Throw(ObjectRef),
    /// The interpreter cannot continue
    Fatal(Error),
}

impl From<Error> for Fault {
    fn from(error: Error) -> Self {
        Fault::Fatal(error)
    }
}

impl From<EmulationError> for Fault {
    fn from(error: EmulationError) -> Self {
        Fault::Fatal(Error::Emulation(error))
    }
}

type Flow<T> = std::result::Result<T, Fault>;

/// How a block of code completed.
enum Exit {
    Return(Value),
    EndFinally,
    EndFilter(bool),
}

enum Step {
    Next,
    Jump(usize),
    Leave(usize),
    Exit(Exit),
}

enum Dispatch {
    Handler(usize),
    Exit(Exit),
}

enum Target {
    Il(Arc<Program>),
    Native(NativeMethod),
}

struct Slots {
    args: Vec<Value>,
    locals: Vec<Value>,
}

/// Per-invocation execution state.
#[derive(Default)]
struct Thread {
    frames: Vec<Slots>,
    executed: u64,
}

impl Thread {
    fn tick(&mut self, limits: &EmulationLimits) -> std::result::Result<(), EmulationError> {
        self.executed += 1;
        if limits.max_instructions > 0 && self.executed > limits.max_instructions {
            return Err(EmulationError::InstructionLimitExceeded {
                executed: self.executed,
                limit: limits.max_instructions,
            });
        }
        Ok(())
    }

    fn slot_mut(&mut self, target: &ValueRef) -> std::result::Result<&mut Value, EmulationError> {
        match target {
            ValueRef::Argument { frame, index } => {
                let args = &mut self
                    .frames
                    .get_mut(*frame)
                    .ok_or(EmulationError::DanglingReference)?
                    .args;
                let count = args.len();
                args.get_mut(usize::from(*index))
                    .ok_or(EmulationError::ArgumentIndexOutOfBounds {
                        index: usize::from(*index),
                        count,
                    })
            }
            ValueRef::Local { frame, index } => {
                let locals = &mut self
                    .frames
                    .get_mut(*frame)
                    .ok_or(EmulationError::DanglingReference)?
                    .locals;
                let count = locals.len();
                locals
                    .get_mut(usize::from(*index))
                    .ok_or(EmulationError::LocalIndexOutOfBounds {
                        index: usize::from(*index),
                        count,
                    })
            }
            ValueRef::Static(_) | ValueRef::Field(..) => Err(EmulationError::TypeMismatch {
                operation: "frame slot access",
                found: "field reference",
            }),
        }
    }
}

/// Arguments and services available to a native method.
pub struct NativeCall<'a> {
    interpreter: &'a Interpreter,
    thread: &'a mut Thread,
    method: Token,
    args: Vec<Value>,
}

impl NativeCall<'_> {
    /// Token of the method being called.
    #[must_use]
    pub fn method(&self) -> Token {
        self.method
    }

    /// All arguments, `this` first for instance methods.
    #[must_use]
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Argument `index`.
    ///
    /// # Errors
    /// Returns [`EmulationError::ArgumentIndexOutOfBounds`] for a missing argument.
    pub fn arg(&self, index: usize) -> Result<&Value> {
        self.args.get(index).ok_or_else(|| {
            EmulationError::ArgumentIndexOutOfBounds {
                index,
                count: self.args.len(),
            }
            .into()
        })
    }

    /// Read through a managed pointer, such as a by-ref argument.
    ///
    /// # Errors
    /// Returns an error if `pointer` is not a managed pointer or its target is gone.
    pub fn load(&self, pointer: &Value) -> Result<Value> {
        self.interpreter
            .load_ref(&*self.thread, &Interpreter::as_pointer(pointer)?)
    }

    /// Write through a managed pointer, such as a by-ref argument.
    ///
    /// # Errors
    /// Returns an error if `pointer` is not a managed pointer or its target is gone.
    pub fn store(&mut self, pointer: &Value, value: Value) -> Result<()> {
        let target = Interpreter::as_pointer(pointer)?;
        self.interpreter.store_ref(self.thread, &target, value)
    }

    /// Read a static field.
    ///
    /// # Errors
    /// Returns [`EmulationError::FieldNotFound`] for an unknown field.
    pub fn load_static(&self, field: Token) -> Result<Value> {
        self.interpreter.load_static(field)
    }

    /// Write a static field.
    ///
    /// # Errors
    /// Returns [`EmulationError::FieldNotFound`] for an unknown field.
    pub fn store_static(&self, field: Token, value: Value) -> Result<()> {
        self.interpreter.store_static(field, value)
    }

    /// Call another method of the module, through the install table.
    ///
    /// # Errors
    /// Returns any error of the callee; a managed exception escaping the callee is reported
    /// as [`EmulationError::UnhandledException`].
    pub fn invoke(&mut self, method: Token, args: Vec<Value>) -> Result<Value> {
        Interpreter::finish(self.interpreter.call(self.thread, method, args))
    }
}

/// Executes methods of a module, honoring installed patches.
///
/// The interpreter is `Sync`; any number of threads may invoke methods concurrently. Static
/// fields are shared by all invocations of one interpreter.
///
/// # Examples
///
/// ```rust
/// use dotpatch::prelude::*;
///
/// let mut builder = ModuleBuilder::new("Demo");
/// let ty = builder.add_type("Demo", "Math");
/// let square = builder.add_il(
///     ty,
///     "Square",
///     MethodSig::new_static(TypeSig::I4, vec![ParamSig::new("x", TypeSig::I4)]),
///     Vec::new(),
///     vec![
///         Instruction::ldarg(0),
///         Instruction::ldarg(0),
///         Instruction::simple(OpCode::Mul),
///         Instruction::ret(),
///     ],
/// );
///
/// let interpreter = Interpreter::new(builder.build()?, std::sync::Arc::new(InstallTable::new()));
/// assert_eq!(interpreter.invoke(square, vec![Value::I4(7)])?, Value::I4(49));
/// # Ok::<(), dotpatch::Error>(())
/// ```
#[derive(Debug)]
pub struct Interpreter {
    module: Arc<Module>,
    installs: Arc<InstallTable>,
    limits: EmulationLimits,
    statics: DashMap<Token, Value>,
    originals: DashMap<Token, Arc<Program>>,
    synthesized: DashMap<Token, (Arc<SynthesizedMethod>, Arc<Program>)>,
}

impl Interpreter {
    /// Create an interpreter over `module` dispatching through `installs`.
    #[must_use]
    pub fn new(module: Arc<Module>, installs: Arc<InstallTable>) -> Self {
        Interpreter {
            module,
            installs,
            limits: EmulationLimits::default(),
            statics: DashMap::new(),
            originals: DashMap::new(),
            synthesized: DashMap::new(),
        }
    }

    /// Replace the execution limits.
    #[must_use]
    pub fn with_limits(mut self, limits: EmulationLimits) -> Self {
        self.limits = limits;
        self
    }

    /// The active limits.
    #[must_use]
    pub fn limits(&self) -> &EmulationLimits {
        &self.limits
    }

    /// The module being executed.
    #[must_use]
    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    /// Call `method` with `args` (`this` first for instance methods) and return its result,
    /// [`Value::Void`] for void methods.
    ///
    /// # Errors
    /// Returns [`Error::MethodNotFound`] for an unknown method, [`Error::Emulation`] if
    /// execution fails or an exception escapes, and any error a native method returns.
    pub fn invoke(&self, method: Token, args: Vec<Value>) -> Result<Value> {
        let mut thread = Thread::default();
        let result = Self::finish(self.call(&mut thread, method, args));
        trace!("Invocation of {method} executed {} instructions", thread.executed);
        result
    }

    /// Current value of a static field.
    ///
    /// # Errors
    /// Returns [`EmulationError::FieldNotFound`] for an unknown field.
    pub fn load_static(&self, field: Token) -> Result<Value> {
        if let Some(value) = self.statics.get(&field) {
            return Ok(value.value().clone());
        }
        let def = self
            .module
            .field(field)
            .ok_or(EmulationError::FieldNotFound { token: field })?;
        Ok(Value::default_for(&def.sig))
    }

    /// Set a static field.
    ///
    /// # Errors
    /// Returns [`EmulationError::FieldNotFound`] for an unknown field.
    pub fn store_static(&self, field: Token, value: Value) -> Result<()> {
        if self.module.field(field).is_none() {
            return Err(EmulationError::FieldNotFound { token: field }.into());
        }
        self.statics.insert(field, value);
        Ok(())
    }

    fn finish(result: Flow<Value>) -> Result<Value> {
        match result {
            Ok(value) => Ok(value),
            Err(Fault::Throw(exception)) => {
                debug!("Unhandled exception of type {}", exception.class());
                Err(EmulationError::UnhandledException {
                    class: exception.class(),
                }
                .into())
            }
            Err(Fault::Fatal(error)) => Err(error),
        }
    }

    fn as_pointer(value: &Value) -> Result<ValueRef> {
        match value {
            Value::Ref(target) => Ok(target.clone()),
            Value::Null => Err(EmulationError::NullReference.into()),
            other => Err(EmulationError::TypeMismatch {
                operation: "indirect access",
                found: other.kind(),
            }
            .into()),
        }
    }

    fn field_default(&self, field: Token) -> Value {
        self.module
            .field(field)
            .map_or(Value::Null, |def| Value::default_for(&def.sig))
    }

    fn load_ref(&self, thread: &Thread, target: &ValueRef) -> Result<Value> {
        match target {
            ValueRef::Argument { frame, index } => {
                let args = &thread
                    .frames
                    .get(*frame)
                    .ok_or(EmulationError::DanglingReference)?
                    .args;
                Ok(args
                    .get(usize::from(*index))
                    .cloned()
                    .ok_or(EmulationError::ArgumentIndexOutOfBounds {
                        index: usize::from(*index),
                        count: args.len(),
                    })?)
            }
            ValueRef::Local { frame, index } => {
                let locals = &thread
                    .frames
                    .get(*frame)
                    .ok_or(EmulationError::DanglingReference)?
                    .locals;
                Ok(locals
                    .get(usize::from(*index))
                    .cloned()
                    .ok_or(EmulationError::LocalIndexOutOfBounds {
                        index: usize::from(*index),
                        count: locals.len(),
                    })?)
            }
            ValueRef::Static(field) => self.load_static(*field),
            ValueRef::Field(object, field) => Ok(object
                .field(*field)
                .unwrap_or_else(|| self.field_default(*field))),
        }
    }

    fn store_ref(&self, thread: &mut Thread, target: &ValueRef, value: Value) -> Result<()> {
        match target {
            ValueRef::Static(field) => self.store_static(*field, value),
            ValueRef::Field(object, field) => {
                object.set_field(*field, value);
                Ok(())
            }
            slot => {
                *thread.slot_mut(slot)? = value;
                Ok(())
            }
        }
    }

    fn resolve(&self, method: Token) -> Result<Target> {
        if let Some(installed) = self.installs.get(method) {
            if let Some(entry) = self.synthesized.get(&method) {
                if Arc::ptr_eq(&entry.0, &installed) {
                    return Ok(Target::Il(entry.1.clone()));
                }
            }

            let decoded = installed.decoded(&self.module)?;
            let handle = installed.handle();
            let program = Arc::new(Program::new(handle.name(), handle.sig(), decoded)?);
            self.synthesized
                .insert(method, (installed.clone(), program.clone()));
            return Ok(Target::Il(program));
        }

        let def = self
            .module
            .method(method)
            .ok_or(Error::MethodNotFound(method))?;
        match &def.implementation {
            MethodImpl::Native(callback) => Ok(Target::Native(callback.clone())),
            MethodImpl::Il(_) => {
                if let Some(program) = self.originals.get(&method) {
                    return Ok(Target::Il(program.value().clone()));
                }

                let handle = MethodHandle::from_module(&self.module, method)?;
                let decoded = decode_method(&handle, &self.module, None)?;
                let program = Arc::new(Program::new(&def.full_name, &def.sig, &decoded)?);
                self.originals.insert(method, program.clone());
                Ok(Target::Il(program))
            }
        }
    }

    fn call(&self, thread: &mut Thread, method: Token, args: Vec<Value>) -> Flow<Value> {
        let depth = thread.frames.len();
        if depth >= self.limits.max_call_depth {
            return Err(EmulationError::CallDepthExceeded {
                depth: depth + 1,
                limit: self.limits.max_call_depth,
            }
            .into());
        }

        let def = self
            .module
            .method(method)
            .ok_or(Error::MethodNotFound(method))?;
        let expected = def.sig.arg_count();
        if args.len() != expected {
            return Err(EmulationError::ArgumentCount {
                method,
                expected,
                found: args.len(),
            }
            .into());
        }

        match self.resolve(method)? {
            Target::Native(callback) => {
                let mut call = NativeCall {
                    interpreter: self,
                    thread,
                    method,
                    args,
                };
                Ok(callback(&mut call)?)
            }
            Target::Il(program) => self.execute(thread, &program, args),
        }
    }

    fn execute(&self, thread: &mut Thread, program: &Program, args: Vec<Value>) -> Flow<Value> {
        let locals = program.locals.iter().map(Value::default_for).collect();
        thread.frames.push(Slots { args, locals });
        let frame = thread.frames.len() - 1;
        trace!("Enter {} at depth {frame}", program.name);

        let result = self.run(thread, frame, program, 0, Vec::new());
        thread.frames.truncate(frame);

        match result? {
            Exit::Return(value) => Ok(value),
            Exit::EndFinally | Exit::EndFilter(_) => Err(EmulationError::InvalidExceptionHandler {
                description: format!("handler exit outside a handler in {}", program.name),
            }
            .into()),
        }
    }

    /// Run `program` from `start` until a block exit.
    fn run(
        &self,
        thread: &mut Thread,
        frame: usize,
        program: &Program,
        start: usize,
        mut stack: Vec<Value>,
    ) -> Flow<Exit> {
        let mut pc = start;
        let mut caught: Option<ObjectRef> = None;

        loop {
            thread.tick(&self.limits)?;
            let instruction = program
                .instructions
                .get(pc)
                .ok_or(EmulationError::InvalidInstructionPointer { index: pc })?;

            match self.step(thread, frame, program, instruction, &mut stack, caught.as_ref()) {
                Ok(Step::Next) => pc += 1,
                Ok(Step::Jump(target)) => pc = target,
                Ok(Step::Leave(target)) => {
                    stack.clear();
                    if let Some(exit) = self.leave(thread, frame, program, pc, target)? {
                        return Ok(exit);
                    }
                    pc = target;
                }
                Ok(Step::Exit(exit)) => return Ok(exit),
                Err(Fault::Throw(exception)) => {
                    match self.dispatch(thread, frame, program, pc, &exception)? {
                        Dispatch::Handler(handler) => {
                            stack.clear();
                            stack.push(Value::Object(exception.clone()));
                            caught = Some(exception);
                            pc = handler;
                        }
                        Dispatch::Exit(exit) => return Ok(exit),
                    }
                }
                Err(fatal) => return Err(fatal),
            }
        }
    }

    /// Run the handler of a finally or fault clause. Returns the exit if the handler left
    /// the method instead of completing.
    fn run_handler(
        &self,
        thread: &mut Thread,
        frame: usize,
        program: &Program,
        start: usize,
    ) -> Flow<Option<Exit>> {
        match self.run(thread, frame, program, start, Vec::new())? {
            Exit::EndFinally => Ok(None),
            Exit::EndFilter(_) => Err(EmulationError::InvalidExceptionHandler {
                description: format!("endfilter in a finally block of {}", program.name),
            }
            .into()),
            exit @ Exit::Return(_) => Ok(Some(exit)),
        }
    }

    /// Run the finally handlers a `leave` from `pc` to `target` exits, innermost first.
    fn leave(
        &self,
        thread: &mut Thread,
        frame: usize,
        program: &Program,
        pc: usize,
        target: usize,
    ) -> Flow<Option<Exit>> {
        for clause in &program.clauses {
            if clause.kind == ClauseKind::Finally && clause.protects(pc) && !clause.protects(target)
            {
                if let Some(exit) = self.run_handler(thread, frame, program, clause.handler_start)? {
                    return Ok(Some(exit));
                }
            }
        }
        Ok(None)
    }

    /// Find the handler for an exception raised at `pc`, running the finally and fault
    /// handlers it unwinds through. An unhandled exception propagates to the caller.
    fn dispatch(
        &self,
        thread: &mut Thread,
        frame: usize,
        program: &Program,
        pc: usize,
        exception: &ObjectRef,
    ) -> Flow<Dispatch> {
        let mut selected = None;
        for (position, clause) in program.clauses.iter().enumerate() {
            if !clause.protects(pc) {
                continue;
            }

            let handles = match clause.kind {
                ClauseKind::Catch(class) => class == exception.class(),
                ClauseKind::Filter(start) => {
                    let stack = vec![Value::Object(exception.clone())];
                    match self.run(thread, frame, program, start, stack) {
                        Ok(Exit::EndFilter(accept)) => accept,
                        Ok(_) | Err(Fault::Throw(_)) => false,
                        Err(fatal) => return Err(fatal),
                    }
                }
                ClauseKind::Finally | ClauseKind::Fault => false,
            };
            if handles {
                selected = Some(position);
                break;
            }
        }

        let unwound = selected.unwrap_or(program.clauses.len());
        for clause in &program.clauses[..unwound] {
            if clause.runs_on_unwind() && clause.protects(pc) {
                if let Some(exit) = self.run_handler(thread, frame, program, clause.handler_start)? {
                    return Ok(Dispatch::Exit(exit));
                }
            }
        }

        match selected {
            Some(position) => Ok(Dispatch::Handler(program.clauses[position].handler_start)),
            None => Err(Fault::Throw(exception.clone())),
        }
    }

    fn step(
        &self,
        thread: &mut Thread,
        frame: usize,
        program: &Program,
        instruction: &Instruction,
        stack: &mut Vec<Value>,
        caught: Option<&ObjectRef>,
    ) -> Flow<Step> {
        let opcode = instruction.opcode;
        if let Some(value) = instruction.int_constant() {
            stack.push(Value::I4(value));
            return Ok(Step::Next);
        }

        match opcode {
            OpCode::Nop
            | OpCode::Break
            | OpCode::Volatile
            | OpCode::Readonly
            | OpCode::Tail
            | OpCode::Unaligned
            | OpCode::Constrained => {}

            OpCode::Ldarg0
            | OpCode::Ldarg1
            | OpCode::Ldarg2
            | OpCode::Ldarg3
            | OpCode::LdargS
            | OpCode::Ldarg => {
                let target = ValueRef::Argument {
                    frame,
                    index: argument(instruction)?,
                };
                stack.push(self.load_ref(thread, &target)?);
            }
            OpCode::LdargaS | OpCode::Ldarga => stack.push(Value::Ref(ValueRef::Argument {
                frame,
                index: argument(instruction)?,
            })),
            OpCode::StargS | OpCode::Starg => {
                let value = pop(stack)?;
                let target = ValueRef::Argument {
                    frame,
                    index: argument(instruction)?,
                };
                self.store_ref(thread, &target, value)?;
            }
            OpCode::Ldloc0
            | OpCode::Ldloc1
            | OpCode::Ldloc2
            | OpCode::Ldloc3
            | OpCode::LdlocS
            | OpCode::Ldloc => {
                let target = ValueRef::Local {
                    frame,
                    index: local(instruction)?,
                };
                stack.push(self.load_ref(thread, &target)?);
            }
            OpCode::LdlocaS | OpCode::Ldloca => stack.push(Value::Ref(ValueRef::Local {
                frame,
                index: local(instruction)?,
            })),
            OpCode::Stloc0
            | OpCode::Stloc1
            | OpCode::Stloc2
            | OpCode::Stloc3
            | OpCode::StlocS
            | OpCode::Stloc => {
                let value = pop(stack)?;
                let target = ValueRef::Local {
                    frame,
                    index: local(instruction)?,
                };
                self.store_ref(thread, &target, value)?;
            }

            OpCode::Ldnull => stack.push(Value::Null),
            OpCode::LdcI8 => match instruction.operand {
                Operand::Int64(value) => stack.push(Value::I8(value)),
                _ => return Err(invalid_operand(opcode)),
            },
            OpCode::LdcR4 => match instruction.operand {
                Operand::Float32(value) => stack.push(Value::F64(f64::from(value))),
                _ => return Err(invalid_operand(opcode)),
            },
            OpCode::LdcR8 => match instruction.operand {
                Operand::Float64(value) => stack.push(Value::F64(value)),
                _ => return Err(invalid_operand(opcode)),
            },
            OpCode::Ldstr => match &instruction.operand {
                Operand::String(value) => stack.push(Value::Str(value.clone())),
                _ => return Err(invalid_operand(opcode)),
            },
            OpCode::Dup => {
                let top = stack.last().cloned().ok_or(EmulationError::StackUnderflow)?;
                stack.push(top);
            }
            OpCode::Pop => {
                pop(stack)?;
            }

            OpCode::Call | OpCode::Callvirt => {
                let method = method(instruction)?;
                let sig = &self
                    .module
                    .method(method)
                    .ok_or(Error::MethodNotFound(method))?
                    .sig;
                let args = pop_n(stack, sig.arg_count())?;
                let result = self.call(thread, method, args)?;
                if sig.returns_value() {
                    stack.push(result);
                }
            }
            OpCode::Newobj => {
                let ctor = method(instruction)?;
                let def = self
                    .module
                    .method(ctor)
                    .ok_or(Error::MethodNotFound(ctor))?;
                let object = ObjectRef::new(def.declaring_type);
                let mut args = Vec::with_capacity(def.sig.params.len() + 1);
                args.push(Value::Object(object.clone()));
                args.extend(pop_n(stack, def.sig.params.len())?);
                self.call(thread, ctor, args)?;
                stack.push(Value::Object(object));
            }
            OpCode::Ret => {
                let value = if program.sig.returns_value() {
                    pop(stack)?
                } else {
                    Value::Void
                };
                return Ok(Step::Exit(Exit::Return(value)));
            }

            OpCode::Br | OpCode::BrS => {
                return Ok(Step::Jump(program.target(label(instruction)?)?));
            }
            OpCode::Brfalse | OpCode::BrfalseS | OpCode::Brtrue | OpCode::BrtrueS => {
                let taken = pop(stack)?.is_true() == matches!(opcode, OpCode::Brtrue | OpCode::BrtrueS);
                if taken {
                    return Ok(Step::Jump(program.target(label(instruction)?)?));
                }
            }
            OpCode::Beq
            | OpCode::BeqS
            | OpCode::Bge
            | OpCode::BgeS
            | OpCode::Bgt
            | OpCode::BgtS
            | OpCode::Ble
            | OpCode::BleS
            | OpCode::Blt
            | OpCode::BltS
            | OpCode::BneUn
            | OpCode::BneUnS
            | OpCode::BgeUn
            | OpCode::BgeUnS
            | OpCode::BgtUn
            | OpCode::BgtUnS
            | OpCode::BleUn
            | OpCode::BleUnS
            | OpCode::BltUn
            | OpCode::BltUnS => {
                let right = pop(stack)?;
                let left = pop(stack)?;
                if ops::compare(opcode, &left, &right)? {
                    return Ok(Step::Jump(program.target(label(instruction)?)?));
                }
            }
            OpCode::Switch => {
                let Operand::Switch(labels) = &instruction.operand else {
                    return Err(invalid_operand(opcode));
                };
                let selector = pop(stack)?;
                let index = selector.as_i4().ok_or(EmulationError::TypeMismatch {
                    operation: "switch",
                    found: selector.kind(),
                })?;
                if let Some(target) = usize::try_from(index).ok().and_then(|i| labels.get(i)) {
                    return Ok(Step::Jump(program.target(*target)?));
                }
            }
            OpCode::Leave | OpCode::LeaveS => {
                return Ok(Step::Leave(program.target(label(instruction)?)?));
            }
            OpCode::Endfinally => return Ok(Step::Exit(Exit::EndFinally)),
            OpCode::Endfilter => {
                let accept = pop(stack)?.is_true();
                return Ok(Step::Exit(Exit::EndFilter(accept)));
            }
            OpCode::Throw => match pop(stack)? {
                Value::Object(exception) => return Err(Fault::Throw(exception)),
                Value::Null => return Err(EmulationError::NullReference.into()),
                other => {
                    return Err(EmulationError::TypeMismatch {
                        operation: "throw",
                        found: other.kind(),
                    }
                    .into())
                }
            },
            OpCode::Rethrow => {
                let exception = caught.cloned().ok_or_else(|| EmulationError::InvalidExceptionHandler {
                    description: "rethrow outside a catch handler".to_string(),
                })?;
                return Err(Fault::Throw(exception));
            }

            OpCode::LdindI1
            | OpCode::LdindU1
            | OpCode::LdindI2
            | OpCode::LdindU2
            | OpCode::LdindI4
            | OpCode::LdindU4
            | OpCode::LdindI8
            | OpCode::LdindI
            | OpCode::LdindR4
            | OpCode::LdindR8
            | OpCode::LdindRef => {
                let target = Self::as_pointer(&pop(stack)?)?;
                let value = self.load_ref(thread, &target)?;
                stack.push(narrow(opcode, value)?);
            }
            OpCode::StindRef
            | OpCode::StindI1
            | OpCode::StindI2
            | OpCode::StindI4
            | OpCode::StindI8
            | OpCode::StindR4
            | OpCode::StindR8
            | OpCode::StindI => {
                let value = narrow(opcode, pop(stack)?)?;
                let target = Self::as_pointer(&pop(stack)?)?;
                self.store_ref(thread, &target, value)?;
            }

            OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::DivUn
            | OpCode::Rem
            | OpCode::RemUn
            | OpCode::And
            | OpCode::Or
            | OpCode::Xor
            | OpCode::AddOvf
            | OpCode::AddOvfUn
            | OpCode::SubOvf
            | OpCode::SubOvfUn
            | OpCode::MulOvf
            | OpCode::MulOvfUn => {
                let right = pop(stack)?;
                let left = pop(stack)?;
                stack.push(ops::binary(opcode, &left, &right)?);
            }
            OpCode::Shl | OpCode::Shr | OpCode::ShrUn => {
                let amount = pop(stack)?;
                let value = pop(stack)?;
                stack.push(ops::shift(opcode, &value, &amount)?);
            }
            OpCode::Neg | OpCode::Not => {
                let value = pop(stack)?;
                stack.push(ops::unary(opcode, &value)?);
            }
            OpCode::Ceq | OpCode::Cgt | OpCode::CgtUn | OpCode::Clt | OpCode::CltUn => {
                let right = pop(stack)?;
                let left = pop(stack)?;
                stack.push(Value::from_bool(ops::compare(opcode, &left, &right)?));
            }
            OpCode::ConvI1
            | OpCode::ConvI2
            | OpCode::ConvI4
            | OpCode::ConvI8
            | OpCode::ConvR4
            | OpCode::ConvR8
            | OpCode::ConvU1
            | OpCode::ConvU2
            | OpCode::ConvU4
            | OpCode::ConvU8
            | OpCode::ConvI
            | OpCode::ConvU
            | OpCode::ConvRUn
            | OpCode::ConvOvfI1
            | OpCode::ConvOvfU1
            | OpCode::ConvOvfI2
            | OpCode::ConvOvfU2
            | OpCode::ConvOvfI4
            | OpCode::ConvOvfU4
            | OpCode::ConvOvfI8
            | OpCode::ConvOvfU8
            | OpCode::ConvOvfI
            | OpCode::ConvOvfU => {
                let value = pop(stack)?;
                stack.push(ops::convert(opcode, &value)?);
            }

            OpCode::Ldfld => {
                let field = field(instruction)?;
                let object = object(pop(stack)?)?;
                stack.push(object.field(field).unwrap_or_else(|| self.field_default(field)));
            }
            OpCode::Ldflda => {
                let field = field(instruction)?;
                let object = object(pop(stack)?)?;
                stack.push(Value::Ref(ValueRef::Field(object, field)));
            }
            OpCode::Stfld => {
                let field = field(instruction)?;
                let value = pop(stack)?;
                object(pop(stack)?)?.set_field(field, value);
            }
            OpCode::Ldsfld => stack.push(self.load_static(field(instruction)?)?),
            OpCode::Ldsflda => stack.push(Value::Ref(ValueRef::Static(field(instruction)?))),
            OpCode::Stsfld => {
                let value = pop(stack)?;
                self.store_static(field(instruction)?, value)?;
            }

            // Values carry their own representation; boxing is a no-op
            OpCode::Box | OpCode::UnboxAny | OpCode::Unbox => {}
            OpCode::Castclass | OpCode::Isinst => {
                let class = match instruction.operand {
                    Operand::Type(class) => class,
                    _ => return Err(invalid_operand(opcode)),
                };
                let value = pop(stack)?;
                let matches = match &value {
                    Value::Object(object) => object.class() == class,
                    Value::Null => true,
                    _ => false,
                };
                if matches {
                    stack.push(value);
                } else if opcode == OpCode::Isinst {
                    stack.push(Value::Null);
                } else {
                    let from = match &value {
                        Value::Object(object) => object.class(),
                        _ => Token(0),
                    };
                    return Err(EmulationError::InvalidCast { from, to: class }.into());
                }
            }

            _ => {
                return Err(EmulationError::UnsupportedOpcode {
                    mnemonic: opcode.mnemonic(),
                }
                .into())
            }
        }

        Ok(Step::Next)
    }
}

fn pop(stack: &mut Vec<Value>) -> std::result::Result<Value, EmulationError> {
    stack.pop().ok_or(EmulationError::StackUnderflow)
}

fn pop_n(stack: &mut Vec<Value>, count: usize) -> std::result::Result<Vec<Value>, EmulationError> {
    if stack.len() < count {
        return Err(EmulationError::StackUnderflow);
    }
    Ok(stack.split_off(stack.len() - count))
}

fn invalid_operand(opcode: OpCode) -> Fault {
    Fault::Fatal(Error::InvalidOperand {
        mnemonic: opcode.mnemonic(),
        expected: opcode.operand_kind(),
    })
}

fn argument(instruction: &Instruction) -> Flow<u16> {
    instruction
        .argument_index()
        .ok_or_else(|| invalid_operand(instruction.opcode))
}

fn local(instruction: &Instruction) -> Flow<u16> {
    instruction
        .local_index()
        .ok_or_else(|| invalid_operand(instruction.opcode))
}

fn label(instruction: &Instruction) -> Flow<Label> {
    match instruction.operand {
        Operand::Label(label) => Ok(label),
        _ => Err(invalid_operand(instruction.opcode)),
    }
}

fn method(instruction: &Instruction) -> Flow<Token> {
    match instruction.operand {
        Operand::Method(method) => Ok(method),
        _ => Err(invalid_operand(instruction.opcode)),
    }
}

fn field(instruction: &Instruction) -> Flow<Token> {
    match instruction.operand {
        Operand::Field(field) => Ok(field),
        _ => Err(invalid_operand(instruction.opcode)),
    }
}

fn object(value: Value) -> std::result::Result<ObjectRef, EmulationError> {
    match value {
        Value::Object(object) => Ok(object),
        Value::Null => Err(EmulationError::NullReference),
        other => Err(EmulationError::TypeMismatch {
            operation: "field access",
            found: other.kind(),
        }),
    }
}

/// Apply the width of a typed indirect load or store.
fn narrow(opcode: OpCode, value: Value) -> std::result::Result<Value, EmulationError> {
    let conversion = match opcode {
        OpCode::LdindI1 | OpCode::StindI1 => OpCode::ConvI1,
        OpCode::LdindU1 => OpCode::ConvU1,
        OpCode::LdindI2 | OpCode::StindI2 => OpCode::ConvI2,
        OpCode::LdindU2 => OpCode::ConvU2,
        OpCode::LdindR4 | OpCode::StindR4 => OpCode::ConvR4,
        _ => return Ok(value),
    };
    ops::convert(conversion, &value)
}
