//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::{collections::HashMap, sync::Arc};

use dotpatch::{assembly::validate, prelude::*};

/// Route `log` output through the test harness.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A small module with methods that exercise branches, regions, calls and hooks.
pub struct Calc {
    pub module: Arc<Module>,
    /// `static int Add(int a, int b) => a + b`
    pub add: Token,
    /// `static int Pick(int x) => x != 0 ? 1 : 2`, with eight `nop`s after the branch
    pub pick: Token,
    /// `static int Checked(int x)`: returns `x`, or -1 after catching `Oops` for negative
    /// input; a finally block counts calls in `calls`
    pub checked: Token,
    /// `static bool SkipAdd(ref int __result)`: sets the result to 42 and skips
    pub skip_prefix: Token,
    /// `static void Observe(bool __prefixSkip, int __result)`: records both in statics
    pub observe_suffix: Token,
    /// `static void Count()`: increments `prefix_calls`
    pub count_prefix: Token,
    /// `static void Scale(ref int __result)`: multiplies the result by ten
    pub scale_suffix: Token,
    pub oops: Token,
    pub calls: Token,
    pub skip_seen: Token,
    pub result_seen: Token,
    pub prefix_calls: Token,
}

impl Calc {
    pub fn new() -> Self {
        let mut builder = ModuleBuilder::new("Calc");
        let ty = builder.add_type("Demo", "Calc");
        let hooks = builder.add_type("Demo", "Hooks");
        let oops = builder.add_type("Demo", "Oops");

        let calls = builder.add_field(ty, "calls", TypeSig::I4, true);
        let skip_seen = builder.add_field(hooks, "skipSeen", TypeSig::Boolean, true);
        let result_seen = builder.add_field(hooks, "resultSeen", TypeSig::I4, true);
        let prefix_calls = builder.add_field(hooks, "prefixCalls", TypeSig::I4, true);

        let int = |name: &str| ParamSig::new(name, TypeSig::I4);

        let add = builder.add_il(
            ty,
            "Add",
            MethodSig::new_static(TypeSig::I4, vec![int("a"), int("b")]),
            Vec::new(),
            vec![
                Instruction::ldarg(0),
                Instruction::ldarg(1),
                Instruction::simple(OpCode::Add),
                Instruction::ret(),
            ],
        );

        let mut pick_code = vec![
            Instruction::ldarg(0),
            Instruction::branch(OpCode::BrtrueS, Label(0)).unwrap(),
        ];
        pick_code.extend((0..8).map(|_| Instruction::nop()));
        pick_code.extend([
            Instruction::ldc_i4(2),
            Instruction::ret(),
            Instruction::ldc_i4(1).with_label(Label(0)),
            Instruction::ret(),
        ]);
        let pick = builder.add_il(
            ty,
            "Pick",
            MethodSig::new_static(TypeSig::I4, vec![int("x")]),
            Vec::new(),
            pick_code,
        );

        let oops_ctor = builder.add_il(
            oops,
            ".ctor",
            MethodSig::new_instance(TypeSig::Void, Vec::new()),
            Vec::new(),
            vec![Instruction::ret()],
        );
        let ldsfld = || Instruction::new(OpCode::Ldsfld, Operand::Field(calls)).unwrap();
        let stsfld = || Instruction::new(OpCode::Stsfld, Operand::Field(calls)).unwrap();
        let (ok, end) = (Label(0), Label(1));
        let checked = builder.add_il(
            ty,
            "Checked",
            MethodSig::new_static(TypeSig::I4, vec![int("x")]),
            vec![TypeSig::I4],
            vec![
                Instruction::ldarg(0)
                    .with_block(ExceptionMarker::TryBegin)
                    .with_block(ExceptionMarker::TryBegin),
                Instruction::ldc_i4(0),
                Instruction::branch(OpCode::BgeS, ok).unwrap(),
                Instruction::new(OpCode::Newobj, Operand::Method(oops_ctor)).unwrap(),
                Instruction::simple(OpCode::Throw),
                Instruction::ldarg(0).with_label(ok),
                Instruction::stloc(0),
                Instruction::leave(end),
                Instruction::simple(OpCode::Pop).with_block(ExceptionMarker::CatchBegin(oops)),
                Instruction::ldc_i4(-1),
                Instruction::stloc(0),
                Instruction::leave(end).with_block(ExceptionMarker::End),
                ldsfld().with_block(ExceptionMarker::FinallyBegin),
                Instruction::ldc_i4(1),
                Instruction::simple(OpCode::Add),
                stsfld(),
                Instruction::simple(OpCode::Endfinally).with_block(ExceptionMarker::End),
                Instruction::ldloc(0).with_label(end),
                Instruction::ret(),
            ],
        );

        let skip_prefix = builder.add_il(
            hooks,
            "SkipAdd",
            MethodSig::new_static(
                TypeSig::Boolean,
                vec![ParamSig::new("__result", TypeSig::by_ref(TypeSig::I4))],
            ),
            Vec::new(),
            vec![
                Instruction::ldarg(0),
                Instruction::ldc_i4(42),
                Instruction::simple(OpCode::StindI4),
                Instruction::ldc_i4(0),
                Instruction::ret(),
            ],
        );

        let observe_suffix = builder.add_il(
            hooks,
            "Observe",
            MethodSig::new_static(
                TypeSig::Void,
                vec![
                    ParamSig::new("__prefixSkip", TypeSig::Boolean),
                    ParamSig::new("__result", TypeSig::I4),
                ],
            ),
            Vec::new(),
            vec![
                Instruction::ldarg(0),
                Instruction::new(OpCode::Stsfld, Operand::Field(skip_seen)).unwrap(),
                Instruction::ldarg(1),
                Instruction::new(OpCode::Stsfld, Operand::Field(result_seen)).unwrap(),
                Instruction::ret(),
            ],
        );

        let count_prefix = builder.add_il(
            hooks,
            "Count",
            MethodSig::new_static(TypeSig::Void, Vec::new()),
            Vec::new(),
            vec![
                Instruction::new(OpCode::Ldsfld, Operand::Field(prefix_calls)).unwrap(),
                Instruction::ldc_i4(1),
                Instruction::simple(OpCode::Add),
                Instruction::new(OpCode::Stsfld, Operand::Field(prefix_calls)).unwrap(),
                Instruction::ret(),
            ],
        );

        let scale_suffix = builder.add_il(
            hooks,
            "Scale",
            MethodSig::new_static(
                TypeSig::Void,
                vec![ParamSig::new("__result", TypeSig::by_ref(TypeSig::I4))],
            ),
            Vec::new(),
            vec![
                Instruction::ldarg(0),
                Instruction::ldarg(0),
                Instruction::simple(OpCode::LdindI4),
                Instruction::ldc_i4(10),
                Instruction::simple(OpCode::Mul),
                Instruction::simple(OpCode::StindI4),
                Instruction::ret(),
            ],
        );

        Calc {
            module: builder.build().unwrap(),
            add,
            pick,
            checked,
            skip_prefix,
            observe_suffix,
            count_prefix,
            scale_suffix,
            oops,
            calls,
            skip_seen,
            result_seen,
            prefix_calls,
        }
    }

    pub fn coordinator(&self) -> PatchCoordinator {
        PatchCoordinator::new(self.module.clone())
    }
}

/// Every branch target is declared exactly once, and region markers nest.
pub fn assert_well_formed(instructions: &[Instruction]) {
    validate(instructions, "check").unwrap();

    let mut declared: HashMap<Label, usize> = HashMap::new();
    for instruction in instructions {
        for label in &instruction.labels {
            *declared.entry(*label).or_default() += 1;
        }
    }
    for instruction in instructions {
        for target in instruction.branch_targets() {
            assert_eq!(declared.get(&target), Some(&1), "label {target:?} in {instruction:?}");
        }
    }

    let mut depth = 0_i64;
    for instruction in instructions {
        for marker in &instruction.blocks {
            match marker {
                ExceptionMarker::TryBegin => depth += 1,
                ExceptionMarker::End => {
                    depth -= 1;
                    assert!(depth >= 0, "region end before its begin");
                }
                _ => assert!(depth > 0, "handler outside a region"),
            }
        }
    }
    assert_eq!(depth, 0, "unterminated region");
}
