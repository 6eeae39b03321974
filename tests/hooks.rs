//! Prefix and suffix composition observed through the interpreter.

mod common;

use common::{assert_well_formed, init_logging, Calc};
use dotpatch::{prelude::*, Error, Result};

#[test]
fn test_prefix_skips_original_and_suffix_still_runs() -> Result<()> {
    init_logging();
    let calc = Calc::new();
    let coordinator = calc.coordinator();
    coordinator.add_prefix(calc.add, calc.skip_prefix)?;
    coordinator.add_suffix(calc.add, calc.observe_suffix)?;

    let result = coordinator.commit(calc.add)?;
    assert!(result.is_patched());
    assert_well_formed(result.method().unwrap().instructions());

    let interpreter = coordinator.interpreter();
    assert_eq!(
        interpreter.invoke(calc.add, vec![Value::I4(2), Value::I4(3)])?,
        Value::I4(42)
    );
    assert_eq!(interpreter.load_static(calc.skip_seen)?, Value::I4(1));
    assert_eq!(interpreter.load_static(calc.result_seen)?, Value::I4(42));
    Ok(())
}

#[test]
fn test_suffix_sees_original_result_without_skip() -> Result<()> {
    init_logging();
    let calc = Calc::new();
    let coordinator = calc.coordinator();
    coordinator.add_suffix(calc.add, calc.observe_suffix)?;
    assert!(coordinator.commit(calc.add)?.is_patched());

    let interpreter = coordinator.interpreter();
    assert_eq!(
        interpreter.invoke(calc.add, vec![Value::I4(2), Value::I4(3)])?,
        Value::I4(5)
    );
    assert_eq!(interpreter.load_static(calc.skip_seen)?, Value::I4(0));
    assert_eq!(interpreter.load_static(calc.result_seen)?, Value::I4(5));
    Ok(())
}

#[test]
fn test_suffix_overwrites_result_by_reference() -> Result<()> {
    init_logging();
    let calc = Calc::new();
    let coordinator = calc.coordinator();
    coordinator.add_suffix(calc.add, calc.scale_suffix)?;
    coordinator.add_suffix(calc.add, calc.observe_suffix)?;
    assert!(coordinator.commit(calc.add)?.is_patched());

    let interpreter = coordinator.interpreter();
    assert_eq!(
        interpreter.invoke(calc.add, vec![Value::I4(2), Value::I4(3)])?,
        Value::I4(50)
    );
    // Later suffixes see the overwritten value.
    assert_eq!(interpreter.load_static(calc.result_seen)?, Value::I4(50));
    Ok(())
}

#[test]
fn test_skipping_prefix_stops_later_prefixes() -> Result<()> {
    init_logging();
    let calc = Calc::new();
    let coordinator = calc.coordinator();
    coordinator.add_prefix(calc.add, calc.count_prefix)?;
    coordinator.add_prefix(calc.add, calc.skip_prefix)?;
    coordinator.add_prefix(calc.add, calc.count_prefix)?;
    coordinator.add_suffix(calc.add, calc.scale_suffix)?;
    assert!(coordinator.commit(calc.add)?.is_patched());

    let interpreter = coordinator.interpreter();
    assert_eq!(
        interpreter.invoke(calc.add, vec![Value::I4(2), Value::I4(3)])?,
        Value::I4(420)
    );
    assert_eq!(interpreter.load_static(calc.prefix_calls)?, Value::I4(1));

    // Without the skipping prefix both counters run, then the original body.
    coordinator.revert(calc.add);
    coordinator.add_prefix(calc.add, calc.count_prefix)?;
    coordinator.add_prefix(calc.add, calc.count_prefix)?;
    assert!(coordinator.commit(calc.add)?.is_patched());
    assert_eq!(
        interpreter.invoke(calc.add, vec![Value::I4(2), Value::I4(3)])?,
        Value::I4(5)
    );
    assert_eq!(interpreter.load_static(calc.prefix_calls)?, Value::I4(3));
    Ok(())
}

#[test]
fn test_hooks_around_protected_regions() -> Result<()> {
    init_logging();
    let calc = Calc::new();
    let coordinator = calc.coordinator();
    coordinator.add_suffix(calc.checked, calc.observe_suffix)?;

    let result = coordinator.commit(calc.checked)?;
    assert_well_formed(result.method().unwrap().instructions());

    let interpreter = coordinator.interpreter();
    assert_eq!(interpreter.invoke(calc.checked, vec![Value::I4(-8)])?, Value::I4(-1));
    assert_eq!(interpreter.load_static(calc.result_seen)?, Value::I4(-1));
    assert_eq!(interpreter.load_static(calc.calls)?, Value::I4(1));
    Ok(())
}

#[test]
fn test_unbindable_hook_fails_the_build() -> Result<()> {
    init_logging();
    let calc = Calc::new();
    let coordinator = calc.coordinator();

    // `Checked` has no parameter named `a`.
    coordinator.add_prefix(calc.checked, calc.add)?;

    let result = coordinator.commit(calc.checked)?;
    match result {
        BuildResult::Failed {
            reason: Error::PatchSignature(_),
            ..
        } => {}
        other => panic!("unexpected {other:?}"),
    }
    assert!(coordinator.installed(calc.checked).is_none());
    assert_eq!(coordinator.state(calc.checked), PatchState::Unpatched);
    assert!(coordinator.last_error(calc.checked).is_some());
    Ok(())
}
