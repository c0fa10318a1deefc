//! Runtime error implementation.
//!
//! Errors come in two tiers, mirroring the distinction the interpreter loop
//! needs to make between "the program under execution did something wrong"
//! and "the VM itself cannot continue": [`RuntimeError`] is the former and
//! is always safe to report back to an embedder; [`VmError`] wraps it and
//! adds the latter, unrecoverable category.

use thiserror::Error;

/// Errors produced while executing a single opcode or evaluating an
/// expression. These are recoverable in the sense that the VM's internal
/// state remains consistent — the caller may inspect it, but execution of
/// the current program halts.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    /// A binary or unary operator was applied to operand types it isn't
    /// defined for.
    #[error("type mismatch: cannot apply `{op}` to {lhs} and {rhs}")]
    TypeMismatch {
        /// The operator or opcode name.
        op: &'static str,
        /// The left (or only, for unary ops) operand's type name.
        lhs: &'static str,
        /// The right operand's type name.
        rhs: &'static str,
    },
    /// Integer division or modulo by zero.
    #[error("division by zero")]
    DivisionByZero,
    /// `LOAD_LOCAL` referenced a slot index past the locals currently in
    /// scope. `STORE_LOCAL` never raises this: it grows the locals vector to
    /// fit whatever index it's given instead of bounds-checking against a
    /// declared count.
    #[error("undefined local variable at index {0}")]
    UndefinedVariable(u8),
    /// A global name was read before ever being written.
    #[error("undefined global `{0}`")]
    UndefinedGlobal(String),
    /// `CALL` named a function that was never registered with the VM.
    #[error("undefined function `{0}`")]
    UndefinedFunction(String),
    /// `CALL` supplied a different argument count than the callee's arity.
    #[error("function `{name}` expects {expected} argument(s), got {got}")]
    ArityMismatch {
        /// Callee name.
        name: String,
        /// Declared arity.
        expected: u8,
        /// Arguments actually supplied at the call site.
        got: u8,
    },
    /// An opcode tried to pop more values than are present on the operand
    /// stack.
    #[error("operand stack underflow")]
    StackUnderflow,
    /// The operand stack grew past [`crate::consts::VmConfig::max_stack_size`].
    #[error("operand stack overflow (limit {limit})")]
    StackOverflow {
        /// The configured limit that was exceeded.
        limit: usize,
    },
    /// Call nesting grew past [`crate::consts::VmConfig::max_call_depth`].
    #[error("call stack overflow (limit {limit})")]
    CallStackOverflow {
        /// The configured limit that was exceeded.
        limit: usize,
    },
    /// `JUMP`/`JUMP_IF_FALSE` targeted an offset outside the function's
    /// bytecode.
    #[error("jump target {target} out of bounds (bytecode length {len})")]
    InvalidJumpTarget {
        /// The decoded jump target.
        target: usize,
        /// Length of the bytecode being executed.
        len: usize,
    },
    /// The bytecode stream ended mid-instruction, or an operand could not
    /// be decoded (e.g. a string length prefix running past the buffer).
    #[error("malformed bytecode: {0}")]
    MalformedBytecode(String),
    /// A byte in opcode position did not correspond to any [`crate::bytecode::Opcode`].
    #[error("unknown opcode byte 0x{0:02x}")]
    UnknownOpcode(u8),
    /// `RETURN` executed outside of any call frame.
    #[error("return with no active call frame")]
    ReturnOutsideCall,
}

impl RuntimeError {
    /// Every [`RuntimeError`] is recoverable by definition; this exists so
    /// call sites that branch on the two-tier model read the same regardless
    /// of which tier produced the error in hand.
    pub const fn is_recoverable(&self) -> bool {
        true
    }
}

/// Top-level error type returned from [`crate::interpreter::Vm::execute`].
/// Wraps [`RuntimeError`] for the common case and adds an `Internal` tier
/// for failures the interpreter cannot attribute to the executing program.
///
/// JIT compilation failures are deliberately absent from this enum: a
/// `cranelift` codegen failure just marks the function Failed and falls
/// back to interpretation (see `jit::Jit::compile`), it never surfaces
/// through a `Result` to begin with.
#[derive(Debug, Error)]
pub enum VmError {
    /// The executing program produced a [`RuntimeError`].
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    /// An internal invariant was violated. Reaching this indicates a bug
    /// in the VM itself, not in the program it is executing.
    #[error("internal VM error: {0}")]
    Internal(String),
}

impl VmError {
    /// Returns the wrapped [`RuntimeError`] if this is the `Runtime` tier.
    pub const fn as_runtime(&self) -> Option<&RuntimeError> {
        match self {
            Self::Runtime(e) => Some(e),
            _ => None,
        }
    }

    /// True for errors that leave the VM itself reusable: the embedder may
    /// call `execute` again on a fresh program.
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}
