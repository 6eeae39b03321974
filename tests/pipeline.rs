//! Transpiler chains: ordering, structural invariants and fail-safe commits.

mod common;

use std::sync::{Arc, Mutex};

use common::{assert_well_formed, init_logging, Calc};
use dotpatch::{prelude::*, Error, InvariantKind, Result};

/// Put a `nop` in front of every instruction, carrying over its labels and begin markers.
fn pad(instructions: Vec<Instruction>, _context: &mut TranspileContext<'_>) -> Result<Vec<Instruction>> {
    let mut out = Vec::with_capacity(instructions.len() * 2);
    for mut instruction in instructions {
        let mut nop = Instruction::nop();
        instruction.move_labels_to(&mut nop);
        let (ends, begins): (Vec<ExceptionMarker>, Vec<ExceptionMarker>) = instruction
            .blocks
            .drain(..)
            .partition(|marker| *marker == ExceptionMarker::End);
        nop.blocks = begins;
        instruction.blocks = ends;
        out.push(nop);
        out.push(instruction);
    }
    Ok(out)
}

/// Jump over the first instruction through a freshly defined label.
fn detour(
    mut instructions: Vec<Instruction>,
    context: &mut TranspileContext<'_>,
) -> Result<Vec<Instruction>> {
    let label = context.define_label();
    let mut jump = Instruction::br(label);
    instructions[0].move_labels_to(&mut jump);
    instructions[0].move_blocks_to(&mut jump);
    instructions[0].labels.push(label);
    instructions.insert(0, jump);
    Ok(instructions)
}

#[test]
fn test_transform_chain_keeps_labels_and_regions() -> Result<()> {
    init_logging();
    let calc = Calc::new();
    let coordinator = calc.coordinator();
    for method in [calc.checked, calc.pick] {
        coordinator.add_transpiler(method, "pad", pad)?;
        coordinator.add_transpiler(method, "detour", detour)?;
        coordinator.add_transpiler(method, "detour-again", detour)?;
        coordinator.add_suffix(method, calc.observe_suffix)?;
        coordinator.add_post_transpiler(method, "pad-wrapper", pad)?;
    }

    for (method, input, expected) in [(calc.checked, -2, -1), (calc.checked, 4, 4), (calc.pick, 0, 2)] {
        let result = coordinator.commit(method)?;
        let installed = result.method().unwrap();
        assert_well_formed(installed.instructions());
        assert_well_formed(&installed.decoded(&calc.module)?.instructions);

        let interpreter = coordinator.interpreter();
        assert_eq!(
            interpreter.invoke(method, vec![Value::I4(input)])?,
            Value::I4(expected)
        );
        assert_eq!(interpreter.load_static(calc.result_seen)?, Value::I4(expected));
    }
    Ok(())
}

#[test]
fn test_priority_then_registration_order() -> Result<()> {
    init_logging();
    let calc = Calc::new();
    let coordinator = calc.coordinator();
    let order = Arc::new(Mutex::new(Vec::new()));

    let record = |name: &'static str| {
        let order = order.clone();
        move |instructions: Vec<Instruction>,
              _context: &mut TranspileContext<'_>|
              -> Result<Vec<Instruction>> {
            order.lock().unwrap().push(name);
            Ok(instructions)
        }
    };

    coordinator.edit_plan(calc.add, |plan| {
        plan.add_transpiler("first-default", record("first-default"));
        plan.add_transpiler_with_priority("low", -5, record("low"));
        plan.add_transpiler("second-default", record("second-default"));
        plan.add_transpiler_with_priority("high", 10, record("high"));
    })?;
    assert!(coordinator.commit(calc.add)?.is_patched());

    assert_eq!(
        *order.lock().unwrap(),
        vec!["high", "first-default", "second-default", "low"]
    );
    Ok(())
}

#[test]
fn test_invalid_transpiler_output_keeps_prior_method() -> Result<()> {
    init_logging();
    let calc = Calc::new();
    let coordinator = calc.coordinator();

    coordinator.add_transpiler(calc.add, "plus-one", |mut instructions, _context| {
        let ret = instructions.len() - 1;
        instructions.splice(
            ret..ret,
            [Instruction::ldc_i4(1), Instruction::simple(OpCode::Add)],
        );
        Ok(instructions)
    })?;
    let first = coordinator.commit(calc.add)?;
    let first = first.method().unwrap().clone();

    coordinator.add_transpiler(calc.add, "dangling", |mut instructions, _context| {
        instructions.insert(0, Instruction::br(Label(9_999)));
        Ok(instructions)
    })?;
    match coordinator.commit(calc.add)? {
        BuildResult::Failed {
            reason:
                Error::InvariantViolation {
                    kind, transpiler, ..
                },
            ..
        } => {
            assert_eq!(kind, InvariantKind::DanglingLabel);
            assert_eq!(transpiler, "dangling");
        }
        other => panic!("unexpected {other:?}"),
    }

    let installed = coordinator.installed(calc.add).unwrap();
    assert!(Arc::ptr_eq(&installed, &first));
    assert_eq!(coordinator.state(calc.add), PatchState::Patched);
    assert!(coordinator
        .last_error(calc.add)
        .is_some_and(|message| message.contains("dangling")));
    assert_eq!(
        coordinator
            .interpreter()
            .invoke(calc.add, vec![Value::I4(2), Value::I4(3)])?,
        Value::I4(6)
    );

    coordinator.edit_plan(calc.add, |plan| plan.remove_transpiler("dangling"))?;
    assert!(coordinator.commit(calc.add)?.is_patched());
    assert!(coordinator.last_error(calc.add).is_none());
    Ok(())
}

#[test]
fn test_last_label_value_fails_without_poisoning() -> Result<()> {
    init_logging();
    let calc = Calc::new();
    let coordinator = calc.coordinator();
    coordinator.add_transpiler(calc.add, "last-label", |mut instructions, _context| {
        let ret = instructions.len() - 1;
        instructions[ret].labels.push(Label(u32::MAX));
        instructions.insert(0, Instruction::br(Label(u32::MAX)));
        Ok(instructions)
    })?;

    match coordinator.commit(calc.add)? {
        BuildResult::Failed {
            reason: Error::InvariantViolation {
                kind, transpiler, ..
            },
            ..
        } => {
            assert_eq!(kind, InvariantKind::LabelOverflow);
            assert_eq!(transpiler, "last-label");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(coordinator.state(calc.add), PatchState::Unpatched);

    // The slot stays usable.
    coordinator.edit_plan(calc.add, |plan| plan.remove_transpiler("last-label"))?;
    coordinator.add_prefix(calc.add, calc.skip_prefix)?;
    assert!(coordinator.commit(calc.add)?.is_patched());
    assert_eq!(
        coordinator
            .interpreter()
            .invoke(calc.add, vec![Value::I4(2), Value::I4(3)])?,
        Value::I4(42)
    );
    Ok(())
}

#[test]
fn test_panicking_transpiler_fails_safely() -> Result<()> {
    init_logging();
    let calc = Calc::new();
    let coordinator = calc.coordinator();
    coordinator.add_transpiler(calc.pick, "indexes-past-end", |instructions, _context| {
        let _ = &instructions[instructions.len()];
        Ok(instructions)
    })?;

    match coordinator.commit(calc.pick)? {
        BuildResult::Failed {
            reason: Error::Transpiler { name, source },
            ..
        } => {
            assert_eq!(name, "indexes-past-end");
            assert!(matches!(*source, Error::Panicked(_)));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(coordinator.state(calc.pick), PatchState::Unpatched);
    assert!(coordinator.last_error(calc.pick).is_some());

    coordinator.edit_plan(calc.pick, |plan| plan.remove_transpiler("indexes-past-end"))?;
    coordinator.add_suffix(calc.pick, calc.observe_suffix)?;
    assert!(coordinator.commit(calc.pick)?.is_patched());
    Ok(())
}

#[test]
fn test_failing_transpiler_is_named() -> Result<()> {
    init_logging();
    let calc = Calc::new();
    let coordinator = calc.coordinator();
    coordinator.add_transpiler(calc.pick, "refuses", |_instructions, _context| {
        Err(Error::PatchSignature("not today".to_string()))
    })?;

    match coordinator.commit(calc.pick)? {
        BuildResult::Failed {
            reason: Error::Transpiler { name, source },
            ..
        } => {
            assert_eq!(name, "refuses");
            assert!(matches!(*source, Error::PatchSignature(_)));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(coordinator.installed(calc.pick).is_none());
    Ok(())
}

#[test]
fn test_revert_restores_original() -> Result<()> {
    init_logging();
    let calc = Calc::new();
    let coordinator = calc.coordinator();
    coordinator.add_prefix(calc.add, calc.skip_prefix)?;
    assert!(coordinator.commit(calc.add)?.is_patched());

    let interpreter = coordinator.interpreter();
    let args = || vec![Value::I4(2), Value::I4(3)];
    assert_eq!(interpreter.invoke(calc.add, args())?, Value::I4(42));

    assert!(coordinator.revert(calc.add));
    assert_eq!(interpreter.invoke(calc.add, args())?, Value::I4(5));
    assert_eq!(coordinator.state(calc.add), PatchState::Unpatched);
    assert!(!coordinator.revert(calc.add));
    Ok(())
}
