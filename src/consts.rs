//! VM and JIT tunable parameters

/// Maximum number of values allowed on the operand stack.
pub const DEFAULT_MAX_STACK_SIZE: usize = 65_536;

/// Maximum call-frame depth before a call-stack overflow is raised.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1_024;

/// Number of interpreted calls before a function becomes eligible for JIT compilation.
pub const DEFAULT_JIT_THRESHOLD: usize = 5;

/// Number of *additional* calls after a successful JIT compile before the
/// JIT reconsiders the function's specialization.
pub const DEFAULT_RECOMPILE_THRESHOLD: usize = 50;

/// Minimum bytecode length, in bytes, for a function to be worth compiling.
pub const DEFAULT_MIN_BYTECODE_SIZE: usize = 4;

/// Maximum number of JIT call arguments passed via a stack-allocated buffer;
/// larger argument counts fall back to a heap-allocated `Vec`.
pub const MAX_STACK_ARGS: usize = 8;

/// Embedder-tunable thresholds governing stack bounds, call depth, and the
/// JIT's warmup/recompile policy.
///
/// [`Default`] matches the thresholds used throughout this crate's own
/// tests; tests that want to exercise promotion or recompilation without
/// looping hundreds of times construct a shrunk [`VmConfig`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    /// Bound on the operand stack.
    pub max_stack_size: usize,
    /// Bound on call-frame nesting.
    pub max_call_depth: usize,
    /// Call count at which a cold function becomes eligible for compilation.
    pub jit_threshold: usize,
    /// Post-JIT call count at which recompilation is considered.
    pub recompile_threshold: usize,
    /// Minimum bytecode length worth compiling.
    pub min_bytecode_size: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_stack_size: DEFAULT_MAX_STACK_SIZE,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            jit_threshold: DEFAULT_JIT_THRESHOLD,
            recompile_threshold: DEFAULT_RECOMPILE_THRESHOLD,
            min_bytecode_size: DEFAULT_MIN_BYTECODE_SIZE,
        }
    }
}
