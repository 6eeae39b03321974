/// Helper macro for locking items. A poisoned lock is cleared and its guard recovered,
/// so one panicking holder does not make the item unusable.
///
/// ```rust, ignore
///  let mut slot = lock!(my_mutex);
///  slot.generation += 1;
/// ```
macro_rules! lock {
    ($lock:expr) => {
        $lock.lock().unwrap_or_else(|poisoned| {
            $lock.clear_poison();
            poisoned.into_inner()
        })
    };
}
