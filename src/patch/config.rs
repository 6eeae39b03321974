//! Configuration for the patch coordinator.

/// Configuration for [`crate::patch::PatchCoordinator`].
///
/// # Builder Pattern
///
/// ```rust
/// use dotpatch::patch::PatchConfig;
///
/// let config = PatchConfig::new()
///     .with_dump_il(true)
///     .with_parallel(false);
/// assert!(config.dump_il);
/// ```
///
/// # Default Values
///
/// | Setting | Default Value |
/// |---------|---------------|
/// | `dump_il` | false |
/// | `parallel` | true |
#[derive(Debug, Clone)]
pub struct PatchConfig {
    /// Log the final instruction listing of every successful build at `debug` level.
    pub dump_il: bool,

    /// Build dirty plans on the rayon thread pool in
    /// [`crate::patch::PatchCoordinator::commit_all`].
    pub parallel: bool,
}

impl Default for PatchConfig {
    fn default() -> Self {
        PatchConfig {
            dump_il: false,
            parallel: true,
        }
    }
}

impl PatchConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the instruction listing dump.
    #[must_use]
    pub fn with_dump_il(mut self, dump_il: bool) -> Self {
        self.dump_il = dump_il;
        self
    }

    /// Enable or disable parallel builds in `commit_all`.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}
