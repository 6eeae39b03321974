//! Limits for the reference interpreter.

/// Limits for one [`crate::emulation::Interpreter::invoke`] call.
///
/// # Builder Pattern
///
/// ```rust
/// use dotpatch::emulation::EmulationLimits;
///
/// let limits = EmulationLimits::new()
///     .with_max_instructions(50_000)
///     .with_max_call_depth(32);
/// assert_eq!(limits.max_call_depth, 32);
/// ```
///
/// # Default Values
///
/// | Limit | Default Value |
/// |-------|---------------|
/// | `max_instructions` | 10,000,000 |
/// | `max_call_depth` | 256 |
#[derive(Clone, Debug)]
pub struct EmulationLimits {
    /// Maximum instructions to execute across all frames of one invocation.
    ///
    /// Set to 0 for unlimited execution.
    pub max_instructions: u64,

    /// Maximum call stack depth.
    ///
    /// Every emulated call also recurses on the host stack, so this bounds host stack
    /// usage as well.
    pub max_call_depth: usize,
}

impl Default for EmulationLimits {
    fn default() -> Self {
        EmulationLimits {
            max_instructions: 10_000_000,
            max_call_depth: 256,
        }
    }
}

impl EmulationLimits {
    /// Create limits with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the instruction limit, 0 for unlimited.
    #[must_use]
    pub fn with_max_instructions(mut self, max_instructions: u64) -> Self {
        self.max_instructions = max_instructions;
        self
    }

    /// Set the call depth limit.
    #[must_use]
    pub fn with_max_call_depth(mut self, max_call_depth: usize) -> Self {
        self.max_call_depth = max_call_depth;
        self
    }
}
