pub const DEFAULT_MAX_STEPS: usize = 1_000_000;
pub const DEFAULT_MAX_STACK_DEPTH: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    /// Instructions one `execute` call may dispatch before it is aborted.
    pub max_steps: usize,
    pub max_stack_depth: usize,
    /// Emit a `trace` event per dispatched instruction.
    pub trace: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            max_stack_depth: DEFAULT_MAX_STACK_DEPTH,
            trace: false,
        }
    }
}
